use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::BridgeError;

/// Default wall-clock budget for one invocation, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

// ─── ThreadEvent ──────────────────────────────────────────────────────────

/// Every event emitted by `codex exec --json`.
/// Discriminated by the JSON `"type"` field.
///
/// The stream is JSONL: one event per line, terminated by process exit.
/// A turn ends with `turn.completed` or `turn.failed`; the process may
/// linger briefly after that.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ThreadEvent {
    /// First event of a thread — carries the session identifier.
    #[serde(rename = "thread.started")]
    ThreadStarted(ThreadStarted),
    #[serde(rename = "turn.started")]
    TurnStarted,
    /// Terminal event of a successful turn.
    #[serde(rename = "turn.completed")]
    TurnCompleted(TurnCompleted),
    /// Terminal event of a failed turn.
    #[serde(rename = "turn.failed")]
    TurnFailed(TurnFailed),
    #[serde(rename = "item.started")]
    ItemStarted(ItemEnvelope),
    #[serde(rename = "item.updated")]
    ItemUpdated(ItemEnvelope),
    #[serde(rename = "item.completed")]
    ItemCompleted(ItemEnvelope),
    /// Stream-level error (auth failures, dropped connections, ...).
    #[serde(rename = "error")]
    StreamError(StreamErrorEvent),
}

impl ThreadEvent {
    /// The session identifier, if this event carries one.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            ThreadEvent::ThreadStarted(t) => Some(&t.thread_id),
            _ => None,
        }
    }

    /// `true` for the events that end a turn.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ThreadEvent::TurnCompleted(_) | ThreadEvent::TurnFailed(_)
        )
    }

    pub fn item(&self) -> Option<&ThreadItem> {
        match self {
            ThreadEvent::ItemStarted(e)
            | ThreadEvent::ItemUpdated(e)
            | ThreadEvent::ItemCompleted(e) => Some(&e.item),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThreadStarted {
    pub thread_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TurnCompleted {
    #[serde(default)]
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TurnFailed {
    #[serde(default)]
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamErrorEvent {
    #[serde(default)]
    pub message: String,
}

impl StreamErrorEvent {
    /// The CLI emits `Reconnecting... n/m` while it retries a dropped
    /// connection. Those are noise, not failures.
    pub fn is_transient(&self) -> bool {
        self.message.starts_with("Reconnecting...")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

// ─── ThreadItem ───────────────────────────────────────────────────────────

/// Envelope around the item payload of `item.started` / `item.updated` /
/// `item.completed` events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemEnvelope {
    pub item: ThreadItem,
}

/// One unit of work inside a turn, discriminated by the item `"type"` field.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadItem {
    /// The agent's reply text — the final-reply kind.
    AgentMessage {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    CommandExecution {
        #[serde(default)]
        command: String,
        #[serde(default)]
        aggregated_output: String,
        #[serde(default)]
        exit_code: Option<i64>,
        #[serde(default)]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(default)]
        name: String,
        /// Raw JSON-encoded argument string, exactly as the CLI emits it.
        #[serde(default)]
        arguments: String,
    },
    FunctionCallOutput {
        #[serde(default)]
        output: String,
    },
    /// Any item type we don't recognise (file changes, web searches, ...).
    /// Kept so a requested full trace stays faithful to the stream.
    #[serde(other)]
    Other,
}

// ─── SandboxPolicy ────────────────────────────────────────────────────────

/// Permission level granted to commands codex may execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SandboxPolicy {
    #[default]
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxPolicy::ReadOnly => "read-only",
            SandboxPolicy::WorkspaceWrite => "workspace-write",
            SandboxPolicy::DangerFullAccess => "danger-full-access",
        }
    }
}

impl FromStr for SandboxPolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(SandboxPolicy::ReadOnly),
            "workspace-write" => Ok(SandboxPolicy::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxPolicy::DangerFullAccess),
            other => Err(BridgeError::InvalidInput(format!(
                "unknown sandbox policy {other:?} (expected read-only, workspace-write or danger-full-access)"
            ))),
        }
    }
}

// ─── Invocation ───────────────────────────────────────────────────────────

/// One request to run a prompt against the codex CLI.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Instruction for the task. Must be non-empty.
    pub prompt: String,
    /// Workspace root codex operates in. Must exist.
    pub cd: PathBuf,
    pub sandbox: SandboxPolicy,
    /// Session identifier of a previous run to resume.
    pub resume: Option<String>,
    /// Model override. Opaque pass-through; must be non-empty when supplied.
    pub model: Option<String>,
    /// Configuration profile from `~/.codex/config.toml`. Opaque pass-through.
    pub profile: Option<String>,
    /// Image files attached to the initial prompt. Each must exist.
    pub images: Vec<PathBuf>,
    /// Wall-clock budget in seconds. 0 disables the timeout.
    pub timeout_secs: u64,
    /// Allow running in a directory that is not a git working tree.
    pub skip_git_repo_check: bool,
    /// Capture the full event trace instead of only the final reply.
    pub return_all_messages: bool,
    /// Custom path to the `codex` executable (default: `"codex"`).
    pub codex_bin: Option<String>,
}

impl Invocation {
    pub fn new(prompt: impl Into<String>, cd: impl Into<PathBuf>) -> Self {
        Invocation {
            prompt: prompt.into(),
            cd: cd.into(),
            sandbox: SandboxPolicy::default(),
            resume: None,
            model: None,
            profile: None,
            images: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            skip_git_repo_check: false,
            return_all_messages: false,
            codex_bin: None,
        }
    }
}

// ─── RunOutcome ───────────────────────────────────────────────────────────

/// The terminal state of one invocation.
///
/// All failures funnel into `error`; the caller never sees a raised fault.
/// `session_id` is populated whenever one was observed (or supplied), even
/// on timeout or cancellation, so the conversation can be resumed.
#[derive(Debug)]
pub struct RunOutcome {
    pub session_id: Option<String>,
    /// The last final-reply text observed (empty if none was).
    pub agent_message: String,
    /// Captured events in arrival order. Only populated when
    /// [`Invocation::return_all_messages`] was set.
    pub events: Vec<ThreadEvent>,
    pub error: Option<BridgeError>,
}

impl RunOutcome {
    pub fn failed(error: BridgeError) -> Self {
        RunOutcome {
            session_id: None,
            agent_message: String::new(),
            events: Vec::new(),
            error: Some(error),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

// ─── BridgeResult ─────────────────────────────────────────────────────────

/// The structured document printed on stdout by the `codex-bridge` binary.
///
/// Errors are reported in-band: the process exits 0 whenever this document
/// was produced, regardless of `success`.
#[derive(Debug, Serialize)]
pub struct BridgeResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub agent_messages: AgentMessages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Final reply text, or the full event trace when `--return-all-messages`
/// was requested.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AgentMessages {
    Text(String),
    Events(Vec<ThreadEvent>),
}

impl BridgeResult {
    pub fn from_outcome(outcome: RunOutcome, return_all_messages: bool) -> Self {
        BridgeResult {
            success: outcome.success(),
            session_id: outcome.session_id,
            error: outcome.error.as_ref().map(|e| e.to_string()),
            agent_messages: if return_all_messages {
                AgentMessages::Events(outcome.events)
            } else {
                AgentMessages::Text(outcome.agent_message)
            },
        }
    }
}
