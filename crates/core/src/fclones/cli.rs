//! [`Executor`] implementation that shells out to the real `fclones` binary.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::progress::ProgressParser;
use super::types::{
    DedupeOptions, FileGroup, GroupOutput, Header, LinkOptions, Progress, RemoveOptions,
    ScanOptions, Stats,
};
use super::{EngineError, Executor};

/// Maximum bytes of a failing `group` run's stdout quoted in the error.
const DIAGNOSTIC_PREFIX_LEN: usize = 200;

/// Maximum stderr line length before the splitter force-flushes, so a
/// pathological stream cannot grow a line buffer without bound.
const MAX_LINE_LEN: usize = 64 * 1024;

/// Header version stamped on re-encoded input documents.
const INPUT_FORMAT_VERSION: &str = "0.35.0";

/// Runs fclones subcommands as child processes.
pub struct CliExecutor {
    binary_path: String,
}

impl CliExecutor {
    pub fn new() -> Self {
        Self {
            binary_path: "fclones".to_string(),
        }
    }

    /// Use a custom path to the fclones binary.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary_path: path.into(),
        }
    }

    async fn version_output(&self) -> Result<String, EngineError> {
        let output = Command::new(&self.binary_path)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(EngineError::Spawn)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a stdin-fed subcommand (link/dedupe/remove) and return its
    /// combined stdout+stderr text.
    async fn run_filter(
        &self,
        command: &'static str,
        extra_args: &[String],
        input: &str,
    ) -> Result<String, EngineError> {
        let mut child = Command::new(&self.binary_path)
            .arg(command)
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            // Best-effort write; the engine may close stdin early.
            let _ = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
        }

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(read_stream(stdout_handle));
        let stderr_task = tokio::spawn(read_stream(stderr_handle));

        let status = child.wait().await?;
        let mut output = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        output.push_str(&String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()));

        if !status.success() {
            return Err(EngineError::CommandFailed {
                command,
                exit_code: status.code(),
                output,
            });
        }
        Ok(output)
    }
}

impl Default for CliExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for CliExecutor {
    async fn check_installed(&self) -> Result<(), EngineError> {
        let output = self.version_output().await?;
        if !output.contains("fclones") {
            return Err(EngineError::UnrecognizedVersion(output));
        }
        Ok(())
    }

    async fn version(&self) -> Result<String, EngineError> {
        Ok(parse_version(&self.version_output().await?))
    }

    async fn group(
        &self,
        opts: ScanOptions,
        progress: mpsc::Sender<Progress>,
    ) -> Result<GroupOutput, EngineError> {
        let mut child = Command::new(&self.binary_path)
            .args(build_group_args(&opts))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(EngineError::Spawn)?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(read_stream(stdout_handle));
        let stderr_task = tokio::spawn(read_progress(stderr_handle, progress));

        let status = child.wait().await?;
        let stdout = stdout_task.await.unwrap_or_default();
        let _ = stderr_task.await;

        if !status.success() {
            return Err(EngineError::ExitFailure {
                exit_code: status.code(),
                diagnostic: diagnostic_prefix(&stdout),
            });
        }

        serde_json::from_slice(&stdout).map_err(|e| EngineError::Parse {
            source: e,
            diagnostic: diagnostic_prefix(&stdout),
        })
    }

    async fn link(&self, input: &str, opts: LinkOptions) -> Result<String, EngineError> {
        let mut args = Vec::new();
        if opts.dry_run {
            args.push("--dry-run".to_string());
        }
        if opts.soft {
            args.push("--soft".to_string());
        }
        self.run_filter("link", &args, input).await
    }

    async fn dedupe(&self, input: &str, opts: DedupeOptions) -> Result<String, EngineError> {
        let mut args = Vec::new();
        if opts.dry_run {
            args.push("--dry-run".to_string());
        }
        self.run_filter("dedupe", &args, input).await
    }

    async fn remove(&self, input: &str, opts: RemoveOptions) -> Result<String, EngineError> {
        let mut args = Vec::new();
        if opts.dry_run {
            args.push("--dry-run".to_string());
        }
        if let Some(priority) = &opts.priority {
            args.push("--priority".to_string());
            args.push(priority.clone());
        }
        self.run_filter("remove", &args, input).await
    }

    fn group_to_input(&self, groups: &[FileGroup]) -> String {
        group_to_input(groups)
    }
}

/// Translate [`ScanOptions`] into the `group` subcommand argument list.
fn build_group_args(opts: &ScanOptions) -> Vec<String> {
    let mut args = vec![
        "--progress=true".to_string(),
        "group".to_string(),
        "--format".to_string(),
        "json".to_string(),
    ];

    if opts.min_size > 0 {
        args.push("-s".to_string());
        args.push(opts.min_size.to_string());
    }
    if let Some(max) = opts.max_size {
        args.push("--max-size".to_string());
        args.push(max.to_string());
    }
    for pattern in &opts.include_patterns {
        args.push("--path".to_string());
        args.push(pattern.clone());
    }
    for pattern in &opts.exclude_patterns {
        args.push("--exclude".to_string());
        args.push(pattern.clone());
    }
    if let Some(hash_fn) = &opts.hash_fn {
        args.push("--hash-fn".to_string());
        args.push(hash_fn.clone());
    }
    if opts.include_hidden {
        args.push("--hidden".to_string());
    }
    if opts.follow_links {
        args.push("--follow-links".to_string());
    }
    if opts.one_file_system {
        args.push("--one-fs".to_string());
    }
    if opts.no_ignore {
        args.push("--no-ignore".to_string());
    }
    if opts.ignore_case {
        args.push("--ignore-case".to_string());
    }
    if let Some(depth) = opts.max_depth {
        args.push("--depth".to_string());
        args.push(depth.to_string());
    }
    if opts.cache {
        args.push("--cache".to_string());
    }

    args.extend(opts.paths.iter().cloned());
    args
}

/// Extract the semver token from `--version` output like `"fclones 0.35.0"`.
fn parse_version(output: &str) -> String {
    output
        .split_whitespace()
        .nth(1)
        .unwrap_or(output)
        .to_string()
}

/// Re-encode groups into the JSON document the stdin-fed subcommands
/// consume, keeping only groups with at least two files and recomputing
/// the header stats from what remains.
fn group_to_input(groups: &[FileGroup]) -> String {
    let mut valid = Vec::new();
    let mut stats = Stats::default();

    for group in groups {
        if group.files.len() < 2 {
            continue;
        }
        let count = group.files.len() as i64;
        stats.group_count += 1;
        stats.total_file_count += count;
        stats.total_file_size += group.file_len * count;
        stats.redundant_file_count += count - 1;
        stats.redundant_file_size += group.file_len * (count - 1);
        valid.push(group.clone());
    }

    let output = GroupOutput {
        header: Header {
            version: INPUT_FORMAT_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            command: vec![
                "fclones".to_string(),
                "group".to_string(),
                "--format".to_string(),
                "json".to_string(),
                "/".to_string(),
            ],
            base_dir: "/".to_string(),
            stats,
        },
        groups: valid,
    };

    match serde_json::to_string(&output) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode group input document");
            String::new()
        }
    }
}

fn diagnostic_prefix(stdout: &[u8]) -> String {
    let end = stdout.len().min(DIAGNOSTIC_PREFIX_LEN);
    String::from_utf8_lossy(&stdout[..end]).into_owned()
}

/// Read an entire output stream into a byte buffer.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

/// Feed stderr through the progress parser, splitting on both `\n` and
/// `\r` because the engine overwrites a single terminal line with
/// carriage returns while drawing progress bars.
async fn read_progress<R: AsyncRead + Unpin>(handle: Option<R>, tx: mpsc::Sender<Progress>) {
    let Some(mut reader) = handle else {
        return;
    };
    let mut parser = ProgressParser::new(tx);
    let mut line = Vec::with_capacity(256);
    let mut chunk = [0u8; 4096];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &chunk[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !line.is_empty() {
                    parser.parse_line(&String::from_utf8_lossy(&line));
                    line.clear();
                }
            } else {
                line.push(byte);
                if line.len() >= MAX_LINE_LEN {
                    parser.parse_line(&String::from_utf8_lossy(&line));
                    line.clear();
                }
            }
        }
    }

    if !line.is_empty() {
        parser.parse_line(&String::from_utf8_lossy(&line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- build_group_args -----------------------------------------------------

    #[test]
    fn minimal_args() {
        let opts = ScanOptions {
            paths: vec!["/data".to_string()],
            ..Default::default()
        };
        assert_eq!(
            build_group_args(&opts),
            vec!["--progress=true", "group", "--format", "json", "/data"]
        );
    }

    #[test]
    fn all_flags_compose() {
        let opts = ScanOptions {
            paths: vec!["/a".to_string(), "/b".to_string()],
            min_size: 1024,
            max_size: Some(1 << 30),
            include_patterns: vec!["**/*.iso".to_string()],
            exclude_patterns: vec!["**/.git/**".to_string()],
            hash_fn: Some("blake3".to_string()),
            include_hidden: true,
            follow_links: true,
            one_file_system: true,
            no_ignore: true,
            ignore_case: true,
            max_depth: Some(4),
            cache: true,
        };
        let args = build_group_args(&opts);
        let expected: Vec<&str> = vec![
            "--progress=true",
            "group",
            "--format",
            "json",
            "-s",
            "1024",
            "--max-size",
            "1073741824",
            "--path",
            "**/*.iso",
            "--exclude",
            "**/.git/**",
            "--hash-fn",
            "blake3",
            "--hidden",
            "--follow-links",
            "--one-fs",
            "--no-ignore",
            "--ignore-case",
            "--depth",
            "4",
            "--cache",
            "/a",
            "/b",
        ];
        assert_eq!(args, expected);
    }

    #[test]
    fn zero_min_size_emits_no_size_flag() {
        let opts = ScanOptions {
            paths: vec!["/data".to_string()],
            min_size: 0,
            ..Default::default()
        };
        assert!(!build_group_args(&opts).contains(&"-s".to_string()));
    }

    // -- parse_version --------------------------------------------------------

    #[test]
    fn version_is_second_field() {
        assert_eq!(parse_version("fclones 0.35.0"), "0.35.0");
    }

    #[test]
    fn bare_version_output_is_returned_whole() {
        assert_eq!(parse_version("0.35.0"), "0.35.0");
    }

    // -- group_to_input -------------------------------------------------------

    fn group(len: i64, hash: &str, files: &[&str]) -> FileGroup {
        FileGroup {
            file_len: len,
            file_hash: hash.to_string(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn input_drops_groups_with_fewer_than_two_files() {
        let groups = vec![
            group(1000, "aa", &["/a", "/b", "/c"]),
            group(2000, "bb", &["/only"]),
        ];
        let decoded: GroupOutput = serde_json::from_str(&group_to_input(&groups)).unwrap();
        assert_eq!(decoded.groups.len(), 1);
        assert_eq!(decoded.groups[0].file_hash, "aa");
    }

    #[test]
    fn input_header_stats_reflect_retained_groups() {
        let groups = vec![
            group(1000, "aa", &["/a", "/b", "/c"]),
            group(2000, "bb", &["/d", "/e"]),
        ];
        let decoded: GroupOutput = serde_json::from_str(&group_to_input(&groups)).unwrap();
        let stats = decoded.header.stats;
        assert_eq!(stats.group_count, 2);
        assert_eq!(stats.total_file_count, 5);
        assert_eq!(stats.total_file_size, 7000);
        assert_eq!(stats.redundant_file_count, 3);
        assert_eq!(stats.redundant_file_size, 4000);
        assert_eq!(decoded.header.command[0], "fclones");
    }

    #[test]
    fn group_output_round_trips_through_input_encoding() {
        let parsed: GroupOutput = serde_json::from_str(
            r#"{
                "header": {
                    "version": "0.35.0",
                    "timestamp": "2024-06-01T10:00:00Z",
                    "command": ["fclones", "group", "--format", "json", "/data"],
                    "base_dir": "/data",
                    "stats": {
                        "group_count": 1,
                        "total_file_count": 2,
                        "total_file_size": 2048,
                        "redundant_file_count": 1,
                        "redundant_file_size": 1024
                    }
                },
                "groups": [
                    {"file_len": 1024, "file_hash": "deadbeef", "files": ["/data/a", "/data/b"]}
                ]
            }"#,
        )
        .unwrap();

        let reencoded: GroupOutput =
            serde_json::from_str(&group_to_input(&parsed.groups)).unwrap();
        assert_eq!(reencoded.groups.len(), 1);
        assert_eq!(reencoded.groups[0].files, vec!["/data/a", "/data/b"]);
        assert_eq!(reencoded.header.stats.redundant_file_size, 1024);
    }

    // -- stderr splitting -----------------------------------------------------

    #[tokio::test]
    async fn progress_reader_splits_on_carriage_returns() {
        let stderr: &[u8] =
            b"Scanned 100 file entries\r1/6: Scanning files [----] 100\nleftover without newline";
        let (tx, mut rx) = mpsc::channel(16);
        read_progress(Some(stderr), tx).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.files_scanned, 100);
        assert_eq!(first.phase, "scanning");
        // The bar on the second line is inside the 50ms throttle window
        // and the trailing fragment carries no metrics.
        assert!(rx.recv().await.is_none());
    }
}
