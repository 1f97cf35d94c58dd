//! Human-readable byte size parsing.
//!
//! The engine reports sizes in its log output as strings like `"4.0 GB"`
//! or `"630.5 MiB"`. Decimal units (KB, MB, ...) are 1000-based; binary
//! units (KiB, MiB, ...) are 1024-based. A bare number is taken as bytes.

/// Parse a human-readable byte string like `"4.0 GB"` into a byte count.
///
/// Returns 0 for empty, unparseable, or negative input.
pub fn parse_bytes(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return 0;
    }

    // Split the leading number from the unit suffix.
    let (num_str, unit) = match s.find(|c: char| c == ' ' || c.is_ascii_alphabetic()) {
        Some(i) => (s[..i].trim(), s[i..].trim()),
        None => (s, ""),
    };

    let num: f64 = match num_str.parse() {
        Ok(n) if n >= 0.0 => n,
        _ => return 0,
    };

    let factor: f64 = match unit.to_ascii_uppercase().as_str() {
        "" | "B" => 1.0,
        "K" | "KB" => 1000.0,
        "KIB" => 1024.0,
        "M" | "MB" => 1000.0 * 1000.0,
        "MIB" => 1024.0 * 1024.0,
        "G" | "GB" => 1000.0 * 1000.0 * 1000.0,
        "GIB" => 1024.0 * 1024.0 * 1024.0,
        "T" | "TB" => 1000.0 * 1000.0 * 1000.0 * 1000.0,
        "TIB" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };

    (num * factor) as i64
}

#[cfg(test)]
mod tests {
    use super::parse_bytes;

    #[test]
    fn empty_and_invalid_input() {
        assert_eq!(parse_bytes(""), 0);
        assert_eq!(parse_bytes("invalid"), 0);
        assert_eq!(parse_bytes("-5 GB"), 0);
    }

    #[test]
    fn bare_numbers_are_bytes() {
        assert_eq!(parse_bytes("0"), 0);
        assert_eq!(parse_bytes("1234"), 1234);
        assert_eq!(parse_bytes("500 B"), 500);
    }

    #[test]
    fn decimal_units() {
        assert_eq!(parse_bytes("1 KB"), 1000);
        assert_eq!(parse_bytes("1KB"), 1000);
        assert_eq!(parse_bytes("1.5 KB"), 1500);
        assert_eq!(parse_bytes("4.5 MB"), 4_500_000);
        assert_eq!(parse_bytes("4.5 GB"), 4_500_000_000);
        assert_eq!(parse_bytes("2.5 TB"), 2_500_000_000_000);
    }

    #[test]
    fn binary_units() {
        assert_eq!(parse_bytes("1 KiB"), 1024);
        assert_eq!(parse_bytes("1 MiB"), 1_048_576);
        assert_eq!(parse_bytes("1 GiB"), 1_073_741_824);
        assert_eq!(parse_bytes("1 TiB"), 1_099_511_627_776);
    }

    #[test]
    fn short_unit_forms() {
        assert_eq!(parse_bytes("5 K"), 5000);
        assert_eq!(parse_bytes("5 M"), 5_000_000);
        assert_eq!(parse_bytes("5 G"), 5_000_000_000);
        assert_eq!(parse_bytes("5 T"), 5_000_000_000_000);
    }

    #[test]
    fn case_insensitive_units() {
        assert_eq!(parse_bytes("1 kb"), 1000);
        assert_eq!(parse_bytes("1 mb"), 1_000_000);
        assert_eq!(parse_bytes("1 Gb"), 1_000_000_000);
    }

    #[test]
    fn surrounding_whitespace() {
        assert_eq!(parse_bytes(" 100 MB"), 100_000_000);
        assert_eq!(parse_bytes("100 MB "), 100_000_000);
    }

    #[test]
    fn decimal_precision() {
        assert_eq!(parse_bytes("1.234 GB"), 1_234_000_000);
        assert_eq!(parse_bytes("0.001 GB"), 1_000_000);
        assert_eq!(parse_bytes("999 TB"), 999_000_000_000_000);
    }
}
