use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed invocation — detected before any subprocess is spawned.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Working-directory precondition failed. Pass `skip_git_repo_check`
    /// or pick a different directory.
    #[error("{} is not inside a git working tree (pass --skip-git-repo-check to override)", .0.display())]
    NotARepository(PathBuf),

    /// Wall-clock budget exceeded. The session id survives the timeout and
    /// can be resumed.
    #[error("execution exceeded the {seconds}s timeout; increase --timeout or resume the session")]
    Timeout { seconds: u64 },

    /// Externally interrupted. Same resumability as [`BridgeError::Timeout`].
    #[error("cancelled before codex finished; resume the session to continue")]
    Cancelled,

    /// The resume id was rejected by codex.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// codex exited non-zero or never produced a usable result.
    #[error("codex failed: {0}")]
    Subprocess(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse event line: {source}\n  line: {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}
