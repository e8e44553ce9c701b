//! `codex-agent` — native Rust driver for the Codex CLI subprocess.
//!
//! This crate runs one `codex exec --json` invocation to completion or to a
//! bounded wall-clock timeout, decodes the JSONL event stream into typed
//! events, and reduces it to a single [`RunOutcome`] — never leaving an
//! orphaned subprocess behind on any exit path.
//!
//! # Architecture
//!
//! ```text
//! Invocation
//!     │  validate (prompt, cwd, images, git-repo precondition)
//!     ▼
//! CodexProcess   ← spawns `codex exec --json --sandbox … --cd …`
//!     │             reads JSONL from stdout, drains stderr
//!     ▼
//! run loop       ← select!: next event / timeout / external shutdown
//!     │             mirrors events to a ProgressSink (best-effort)
//!     ▼
//! RunOutcome     ← session id, final reply, optional full trace, error
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use codex_agent::{run, Invocation, NoopSink};
//!
//! let mut invocation = Invocation::new("summarise this repo", "/work/repo");
//! invocation.timeout_secs = 120;
//!
//! let outcome = run(invocation, &NoopSink).await;
//! if outcome.success() {
//!     println!("{}", outcome.agent_message);
//! }
//! ```
//!
//! Failures never surface as raised errors: every exit path, including
//! timeout and cancellation, folds into [`RunOutcome`] with whatever session
//! id was observed, so the caller can always resume the conversation.

pub mod bridge;
pub mod error;
pub mod progress;
pub mod types;

pub(crate) mod process;
pub mod stream;

#[cfg(test)]
mod tests;

pub use bridge::{run, run_with_shutdown};
pub use error::BridgeError;
pub use progress::{NoopSink, ProgressSink, TtySink};
pub use stream::EventStream;
pub use types::{
    AgentMessages, BridgeResult, Invocation, ItemEnvelope, RunOutcome, SandboxPolicy, ThreadEvent,
    ThreadItem, ThreadStarted, TokenUsage, TurnCompleted, TurnFailed, DEFAULT_TIMEOUT_SECS,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
