//! Driver for the external `fclones` deduplication engine.
//!
//! The engine is shelled out to over a CLI contract: `group` finds
//! duplicates and emits JSON on stdout while streaming human-readable
//! progress on stderr; `link`, `dedupe`, and `remove` read that JSON on
//! stdin and write a plan or outcome on stdout/stderr. Everything the
//! rest of the system needs is behind the [`Executor`] trait so tests
//! can substitute a scripted implementation.

mod cli;
mod progress;
mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use cli::CliExecutor;
pub use types::{
    DedupeOptions, FileGroup, GroupOutput, Header, LinkOptions, Progress, RemoveOptions,
    ScanOptions, Stats, INDETERMINATE_PERCENT,
};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("fclones not found or not executable: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("unexpected output from fclones --version: {0}")]
    UnrecognizedVersion(String),

    /// `group` exited non-zero. `diagnostic` carries the first 200 bytes
    /// of whatever was captured on stdout, usually a partial JSON document.
    #[error("fclones exited with code {exit_code:?}: {diagnostic}")]
    ExitFailure {
        exit_code: Option<i32>,
        diagnostic: String,
    },

    /// A stdin-fed subcommand (link/dedupe/remove) exited non-zero.
    /// `output` carries the full combined stdout+stderr text.
    #[error("fclones {command} failed with code {exit_code:?}")]
    CommandFailed {
        command: &'static str,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("failed to parse fclones output: {source} (got: {diagnostic})")]
    Parse {
        #[source]
        source: serde_json::Error,
        diagnostic: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Operations the scanner needs from the engine.
///
/// Implemented by [`CliExecutor`] for the real binary and by scripted
/// fakes in tests. Cancellation is cooperative: dropping the future
/// returned by [`Executor::group`] terminates the child process.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Verify the engine binary is installed and identifies itself.
    async fn check_installed(&self) -> Result<(), EngineError>;

    /// The engine's semver string, e.g. `"0.35.0"`.
    async fn version(&self) -> Result<String, EngineError>;

    /// Run `group` over the configured paths, streaming progress events
    /// into `progress` as they are parsed from the engine's stderr.
    async fn group(
        &self,
        opts: ScanOptions,
        progress: mpsc::Sender<Progress>,
    ) -> Result<GroupOutput, EngineError>;

    /// Hardlink duplicates described by `input`; returns the engine's
    /// combined textual output verbatim.
    async fn link(&self, input: &str, opts: LinkOptions) -> Result<String, EngineError>;

    /// Reflink duplicates described by `input`.
    async fn dedupe(&self, input: &str, opts: DedupeOptions) -> Result<String, EngineError>;

    /// Delete duplicate replicas described by `input`, keeping one file
    /// per group chosen by the priority token.
    async fn remove(&self, input: &str, opts: RemoveOptions) -> Result<String, EngineError>;

    /// Re-encode a curated list of groups into the JSON the stdin-fed
    /// subcommands consume. Groups with fewer than two files are dropped
    /// and the header stats are recomputed from what remains.
    fn group_to_input(&self, groups: &[FileGroup]) -> String;
}
