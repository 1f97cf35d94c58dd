//! Server configuration loaded from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// All fields have defaults suitable for local use; override via
/// `DECLONE_*` environment variables. Invalid values log a warning and
/// fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Path of the SQLite database file (default: `./data/declone.db`).
    pub db_path: PathBuf,
    /// Data retention horizon in days, 1..=9999 (default: `30`).
    pub retention_days: i64,
    /// Whether retention was pinned via the environment. When false, the
    /// persisted `retention_days` setting takes precedence.
    pub retention_days_from_env: bool,
    /// Upper bound on a single scan's runtime (default: 30 minutes).
    pub scan_timeout: Duration,
    /// Absolute path prefixes scanning is restricted to; empty means
    /// unrestricted.
    pub allowed_paths: Vec<PathBuf>,
    /// Path override for the fclones binary (default: `fclones` on PATH).
    pub fclones_path: Option<String>,
    /// Enable the engine's persistent hash cache (default: `true`).
    pub fclones_cache: bool,
}

/// Bounds for the retention setting, shared with the settings endpoint.
pub const RETENTION_DAYS_RANGE: std::ops::RangeInclusive<i64> = 1..=9999;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_PATH: &str = "./data/declone.db";
const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 30 * 60;

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default             |
    /// |-----------------------------|---------------------|
    /// | `DECLONE_PORT`              | `8080`              |
    /// | `DECLONE_DB_PATH`           | `./data/declone.db` |
    /// | `DECLONE_RETENTION_DAYS`    | `30`                |
    /// | `DECLONE_SCAN_TIMEOUT_SECS` | `1800`              |
    /// | `DECLONE_ALLOWED_PATHS`     | (unrestricted)      |
    /// | `DECLONE_FCLONES_PATH`      | (PATH lookup)       |
    /// | `DECLONE_FCLONES_CACHE`     | `true`              |
    pub fn from_env() -> Self {
        let retention_raw = std::env::var("DECLONE_RETENTION_DAYS").ok();
        let retention_days_from_env = retention_raw.is_some();
        let retention_days = retention_raw
            .and_then(|v| parse_retention_days(&v))
            .unwrap_or(DEFAULT_RETENTION_DAYS);

        Self {
            port: env_parsed("DECLONE_PORT", DEFAULT_PORT),
            db_path: std::env::var("DECLONE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH)),
            retention_days,
            retention_days_from_env,
            scan_timeout: Duration::from_secs(env_parsed(
                "DECLONE_SCAN_TIMEOUT_SECS",
                DEFAULT_SCAN_TIMEOUT_SECS,
            )),
            allowed_paths: std::env::var("DECLONE_ALLOWED_PATHS")
                .map(|v| parse_allowed_paths(&v))
                .unwrap_or_default(),
            fclones_path: std::env::var("DECLONE_FCLONES_PATH")
                .ok()
                .filter(|v| !v.is_empty()),
            fclones_cache: env_bool("DECLONE_FCLONES_CACHE", true),
        }
    }

    /// Whether `path` falls under the allowlist. An empty allowlist means
    /// unrestricted.
    pub fn is_path_allowed(&self, path: &str) -> bool {
        if self.allowed_paths.is_empty() {
            return true;
        }
        let candidate = Path::new(path);
        self.allowed_paths
            .iter()
            .any(|allowed| candidate.starts_with(allowed))
    }
}

/// Parse and range-check a retention value; out-of-range input is
/// rejected the same as unparseable input.
pub fn parse_retention_days(raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(days) if RETENTION_DAYS_RANGE.contains(&days) => Some(days),
        _ => {
            tracing::warn!(value = raw, "invalid retention days value, ignoring");
            None
        }
    }
}

fn parse_allowed_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn env_parsed<T: std::str::FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = raw, %default, "invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => {
                tracing::warn!(key, value = raw, default, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_allowed(paths: &[&str]) -> Config {
        Config {
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            retention_days: DEFAULT_RETENTION_DAYS,
            retention_days_from_env: false,
            scan_timeout: Duration::from_secs(DEFAULT_SCAN_TIMEOUT_SECS),
            allowed_paths: paths.iter().map(PathBuf::from).collect(),
            fclones_path: None,
            fclones_cache: true,
        }
    }

    #[test]
    fn empty_allowlist_is_unrestricted() {
        let config = config_with_allowed(&[]);
        assert!(config.is_path_allowed("/anything/at/all"));
    }

    #[test]
    fn allowlist_matches_prefixes_component_wise() {
        let config = config_with_allowed(&["/data", "/media/library"]);
        assert!(config.is_path_allowed("/data"));
        assert!(config.is_path_allowed("/data/photos"));
        assert!(config.is_path_allowed("/media/library/tv"));
        assert!(!config.is_path_allowed("/media"));
        assert!(!config.is_path_allowed("/datasets"));
        assert!(!config.is_path_allowed("/etc"));
    }

    #[test]
    fn retention_days_are_range_checked() {
        assert_eq!(parse_retention_days("30"), Some(30));
        assert_eq!(parse_retention_days("1"), Some(1));
        assert_eq!(parse_retention_days("9999"), Some(9999));
        assert_eq!(parse_retention_days("0"), None);
        assert_eq!(parse_retention_days("10000"), None);
        assert_eq!(parse_retention_days("-5"), None);
        assert_eq!(parse_retention_days("soon"), None);
    }

    #[test]
    fn allowed_paths_parse_from_comma_separated_list() {
        let paths = parse_allowed_paths(" /data , /media/library ,, ");
        assert_eq!(paths, vec![PathBuf::from("/data"), PathBuf::from("/media/library")]);
    }
}
