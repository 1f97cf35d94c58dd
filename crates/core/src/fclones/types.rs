//! Wire types for the engine's JSON output and the options structs the
//! driver translates into CLI flags.

use serde::{Deserialize, Serialize};

/// Sentinel percentage for a phase whose total is not yet known.
/// Subscribers render this as an infinite-progress state.
pub const INDETERMINATE_PERCENT: f64 = -1.0;

/// Top-level JSON document emitted by `fclones group --format json` and
/// consumed on stdin by `link`, `dedupe`, and `remove`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupOutput {
    pub header: Header,
    pub groups: Vec<FileGroup>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    pub version: String,
    pub timestamp: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub base_dir: String,
    pub stats: Stats,
}

/// Group-level statistics from the header. These count files *inside*
/// duplicate groups; totals for the whole scan only appear in the
/// stderr progress stream.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub group_count: i64,
    pub total_file_count: i64,
    pub total_file_size: i64,
    pub redundant_file_count: i64,
    pub redundant_file_size: i64,
    #[serde(default)]
    pub missing_file_count: i64,
    #[serde(default)]
    pub missing_file_size: i64,
}

/// One equivalence class of identical files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileGroup {
    pub file_len: i64,
    pub file_hash: String,
    pub files: Vec<String>,
}

/// Options translated into `fclones group` flags.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub paths: Vec<String>,
    /// Minimum file size in bytes; 0 means the engine default.
    pub min_size: i64,
    /// Maximum file size in bytes; `None` means no limit.
    pub max_size: Option<i64>,
    /// Glob patterns matched against the full path.
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Hash function override (blake3, sha256, ...).
    pub hash_fn: Option<String>,
    pub include_hidden: bool,
    pub follow_links: bool,
    pub one_file_system: bool,
    pub no_ignore: bool,
    pub ignore_case: bool,
    pub max_depth: Option<i64>,
    /// Enable the engine's own persistent hash cache.
    pub cache: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions {
    pub dry_run: bool,
    /// Use symlinks instead of hardlinks.
    pub soft: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DedupeOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    pub dry_run: bool,
    /// Which replica survives: "newest", "oldest", "most-nested", ...
    pub priority: Option<String>,
}

/// A snapshot of scan progress parsed from the engine's stderr.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Progress {
    /// Normalised phase identifier: scanning, filtering, grouping,
    /// hashing, initializing, or processing.
    pub phase: String,
    pub files_scanned: i64,
    pub bytes_scanned: i64,
    pub files_matched: i64,
    pub groups_found: i64,
    pub wasted_bytes: i64,
    pub phase_num: u32,
    pub phase_total: u32,
    pub phase_name: String,
    /// 0..=100, or [`INDETERMINATE_PERCENT`] when the engine has not yet
    /// published a total for the current phase.
    pub phase_percent: f64,
}
