//! Parsing of the engine's stderr stream into [`Progress`] events.
//!
//! Two interleaved line shapes arrive on stderr:
//!
//! 1. Log lines with embedded metrics, e.g.
//!    `[timestamp] fclones:  info: Scanned 45828 file entries`
//! 2. Progress-bar updates, e.g.
//!    `6/6: Grouping by contents [=====>    ] 4.0 GB / 59.3 GB`
//!
//! The grammar is not versioned, so parsing is deliberately forgiving:
//! malformed lines are ignored and unknown phase names degrade to
//! "processing". Phase numbers are not assumed to be monotone.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tokio::sync::mpsc;

use crate::bytesize::parse_bytes;

use super::types::{Progress, INDETERMINATE_PERCENT};

/// Minimum spacing between progress sends, so a chatty engine cannot
/// swamp slow subscribers.
const MIN_SEND_INTERVAL: Duration = Duration::from_millis(50);

/// Progress bars with a current/total ratio:
/// `6/6: Grouping by contents [...] 630.5 MB / 3.6 GB` or
/// `4/6: Grouping by prefix [...] 12027 / 60000`.
static BAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d)/(\d): ([^\[]+)\[([^\]]*)\]\s*(\S+(?:\s+[KMGT]i?B)?)\s*/\s*(\S+(?:\s+[KMGT]i?B)?)")
        .expect("progress bar regex")
});

/// The initial scanning phase reports a bare count with no total:
/// `1/6: Scanning files [...] 12345`.
static SCAN_BAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d)/(\d): ([^\[]+)\[([^\]]*)\]\s+(\d+)(?:\s|$)").expect("scan bar regex")
});

#[derive(Debug, PartialEq)]
pub(super) struct ProgressBarInfo {
    pub phase_num: u32,
    pub phase_total: u32,
    pub phase_name: String,
    pub phase_percent: f64,
}

/// Parse the *last* progress bar on a line. Carriage-return overwriting
/// means a single read can contain several concatenated bars; the last
/// one is the most recent.
pub(super) fn parse_progress_bar(line: &str) -> Option<ProgressBarInfo> {
    if let Some(caps) = BAR_RE.captures_iter(line).last() {
        let current = parse_bytes(&caps[5]);
        let total = parse_bytes(&caps[6]);
        let phase_percent = if total > 0 {
            (current.min(total) as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        return Some(ProgressBarInfo {
            phase_num: caps[1].parse().unwrap_or(0),
            phase_total: caps[2].parse().unwrap_or(0),
            phase_name: caps[3].trim().to_string(),
            phase_percent,
        });
    }

    if let Some(caps) = SCAN_BAR_RE.captures_iter(line).last() {
        return Some(ProgressBarInfo {
            phase_num: caps[1].parse().unwrap_or(0),
            phase_total: caps[2].parse().unwrap_or(0),
            phase_name: caps[3].trim().to_string(),
            phase_percent: INDETERMINATE_PERCENT,
        });
    }

    None
}

/// Map a human phase name to a short identifier for subscribers.
pub(super) fn phase_name_to_phase(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if lower.contains("scanning") {
        "scanning"
    } else if lower.contains("contents") {
        "hashing"
    } else if ["grouping", "prefix", "suffix", "size", "path"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "grouping"
    } else if lower.contains("initializing") {
        "initializing"
    } else {
        "processing"
    }
}

/// Incremental parser that accumulates counters across lines and posts
/// throttled snapshots to the progress sink.
pub(super) struct ProgressParser {
    progress: Progress,
    last_send: Option<Instant>,
    tx: mpsc::Sender<Progress>,
}

impl ProgressParser {
    pub(super) fn new(tx: mpsc::Sender<Progress>) -> Self {
        Self {
            progress: Progress::default(),
            last_send: None,
            tx,
        }
    }

    /// Parse one stderr line, updating internal counters and sending a
    /// snapshot when something changed.
    pub(super) fn parse_line(&mut self, line: &str) {
        let mut updated = false;

        if line.contains("Scanned") && line.contains("file entries") {
            // "Scanned 45828 file entries"
            if let Some(n) = number_after(line, "Scanned") {
                self.progress.files_scanned = n;
                updated = true;
            }
            self.progress.phase = "scanning".to_string();
        } else if line.contains("files matching selection criteria") {
            // "Found 45466 (180.4 GB) files matching selection criteria"
            if let Some(n) = number_after(line, "Found") {
                self.progress.files_matched = n;
                updated = true;
            }
            if let Some(bytes) = parenthesised_bytes(line) {
                self.progress.bytes_scanned = bytes;
                updated = true;
            }
            self.progress.phase = "filtering".to_string();
        } else if line.contains("candidates after") {
            // "Found 10047 (30.1 GB) candidates after grouping by size"
            if let Some(n) = number_after(line, "Found") {
                self.progress.groups_found = n;
                updated = true;
            }
            self.progress.phase = "grouping".to_string();
        } else if line.contains('/') && line.contains(':') && line.contains('[') {
            if let Some(bar) = parse_progress_bar(line) {
                self.progress.phase_num = bar.phase_num;
                self.progress.phase_total = bar.phase_total;
                self.progress.phase = phase_name_to_phase(&bar.phase_name).to_string();
                self.progress.phase_name = bar.phase_name;
                self.progress.phase_percent = bar.phase_percent;
                updated = true;
            }
        }

        if updated {
            self.send();
        }
    }

    fn send(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_send {
            if now.duration_since(last) < MIN_SEND_INTERVAL {
                return;
            }
        }
        self.last_send = Some(now);
        // Non-blocking: if the sink is full the event is dropped.
        let _ = self.tx.try_send(self.progress.clone());
    }
}

/// The integer immediately following `keyword` in a whitespace-split line.
fn number_after(line: &str, keyword: &str) -> Option<i64> {
    let mut fields = line.split_whitespace();
    while let Some(field) = fields.next() {
        if field == keyword {
            return fields.next().and_then(|n| n.parse().ok());
        }
    }
    None
}

/// The byte size inside the first parenthesised span, e.g. `"(180.4 GB)"`.
fn parenthesised_bytes(line: &str) -> Option<i64> {
    let start = line.find('(')?;
    let end = line[start..].find(')')?;
    let bytes = parse_bytes(&line[start + 1..start + end]);
    (bytes > 0).then_some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- parse_progress_bar ---------------------------------------------------

    #[test]
    fn bar_with_byte_sizes() {
        let bar = parse_progress_bar("6/6: Grouping by contents [##########] 630.5 MB / 3.6 GB")
            .unwrap();
        assert_eq!(bar.phase_num, 6);
        assert_eq!(bar.phase_total, 6);
        assert_eq!(bar.phase_name, "Grouping by contents");
        assert!(bar.phase_percent > 17.0 && bar.phase_percent < 18.0);
    }

    #[test]
    fn bar_with_plain_counts() {
        let bar =
            parse_progress_bar("4/6: Grouping by prefix [####------] 12027 / 60000").unwrap();
        assert_eq!(bar.phase_num, 4);
        assert_eq!(bar.phase_name, "Grouping by prefix");
        assert!((bar.phase_percent - 20.045).abs() < 0.01);
    }

    #[test]
    fn scanning_bar_is_indeterminate() {
        let bar = parse_progress_bar("1/6: Scanning files [----------] 12345").unwrap();
        assert_eq!(bar.phase_num, 1);
        assert_eq!(bar.phase_total, 6);
        assert_eq!(bar.phase_name, "Scanning files");
        assert_eq!(bar.phase_percent, INDETERMINATE_PERCENT);
    }

    #[test]
    fn complete_bar_is_one_hundred_percent() {
        let bar =
            parse_progress_bar("6/6: Grouping by contents [##########] 1 GB / 1 GB").unwrap();
        assert_eq!(bar.phase_percent, 100.0);
    }

    #[test]
    fn percent_is_capped_at_one_hundred() {
        let bar = parse_progress_bar("5/6: Grouping by size [##] 150 / 100").unwrap();
        assert_eq!(bar.phase_percent, 100.0);
    }

    #[test]
    fn non_bar_lines_yield_none() {
        assert!(parse_progress_bar("").is_none());
        assert!(parse_progress_bar("Some random text without progress").is_none());
    }

    #[test]
    fn concatenated_bars_use_the_last() {
        let bar =
            parse_progress_bar("1/6: Scanning [--] 100 2/6: Grouping [##] 50 / 100").unwrap();
        assert_eq!(bar.phase_num, 2);
        assert_eq!(bar.phase_percent, 50.0);
    }

    // -- phase_name_to_phase --------------------------------------------------

    #[test]
    fn phase_names_normalise() {
        assert_eq!(phase_name_to_phase("Scanning files"), "scanning");
        assert_eq!(phase_name_to_phase("SCANNING FILES"), "scanning");
        assert_eq!(phase_name_to_phase("Grouping by contents"), "hashing");
        assert_eq!(phase_name_to_phase("Grouping by prefix"), "grouping");
        assert_eq!(phase_name_to_phase("Grouping by suffix"), "grouping");
        assert_eq!(phase_name_to_phase("Grouping by size"), "grouping");
        assert_eq!(phase_name_to_phase("Grouping by path"), "grouping");
        assert_eq!(phase_name_to_phase("Initializing"), "initializing");
        assert_eq!(phase_name_to_phase("Something else"), "processing");
        assert_eq!(phase_name_to_phase(""), "processing");
    }

    // -- ProgressParser -------------------------------------------------------

    fn collect(lines: &[&str]) -> Vec<Progress> {
        let (tx, mut rx) = mpsc::channel(64);
        let mut parser = ProgressParser::new(tx);
        // Disable throttling effects by rewinding the send clock between lines.
        for line in lines {
            parser.parse_line(line);
            parser.last_send = parser
                .last_send
                .map(|t| t - MIN_SEND_INTERVAL - Duration::from_millis(1));
        }
        drop(parser);
        let mut events = Vec::new();
        while let Ok(p) = rx.try_recv() {
            events.push(p);
        }
        events
    }

    #[test]
    fn scanned_line_sets_files_scanned() {
        let events = collect(&["[ts] fclones:  info: Scanned 45828 file entries"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].files_scanned, 45828);
        assert_eq!(events[0].phase, "scanning");
    }

    #[test]
    fn matching_line_sets_matched_and_bytes() {
        let events =
            collect(&["[ts] fclones:  info: Found 45466 (180.4 GB) files matching selection criteria"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].files_matched, 45466);
        assert_eq!(events[0].bytes_scanned, 180_400_000_000);
        assert_eq!(events[0].phase, "filtering");
    }

    #[test]
    fn candidates_line_sets_groups_found() {
        let events =
            collect(&["[ts] fclones:  info: Found 10047 (30.1 GB) candidates after grouping by size"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].groups_found, 10047);
        assert_eq!(events[0].phase, "grouping");
    }

    #[test]
    fn counters_accumulate_across_lines() {
        let events = collect(&[
            "Scanned 100 file entries",
            "Found 80 (1 KB) files matching selection criteria",
            "6/6: Grouping by contents [#####-----] 500 / 1000",
        ]);
        assert_eq!(events.len(), 3);
        let last = events.last().unwrap();
        assert_eq!(last.files_scanned, 100);
        assert_eq!(last.files_matched, 80);
        assert_eq!(last.bytes_scanned, 1000);
        assert_eq!(last.phase, "hashing");
        assert_eq!(last.phase_percent, 50.0);
    }

    #[test]
    fn malformed_lines_are_ignored() {
        assert!(collect(&["", "no metrics here", "Scanned zero file entries"]).is_empty());
    }

    #[test]
    fn rapid_updates_are_throttled() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut parser = ProgressParser::new(tx);
        for n in 0..10 {
            parser.parse_line(&format!("Scanned {n} file entries"));
        }
        drop(parser);
        let mut events = Vec::new();
        while let Ok(p) = rx.try_recv() {
            events.push(p);
        }
        // Only the first update beats the 50ms spacing.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].files_scanned, 0);
    }
}
