use std::io::Write;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use regex::Regex;

use crate::types::{ThreadEvent, ThreadItem, TurnFailed};

// ─── ProgressSink ─────────────────────────────────────────────────────────

/// Fire-and-forget output for progress echo.
///
/// Progress is a side effect, not part of the functional result: writes are
/// best-effort, failures are swallowed, and concurrent invocations may
/// interleave lines freely.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Discards everything. Used in tests and when no terminal is attached.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _line: &str) {}
}

/// Writes to the controlling terminal (`/dev/tty`), bypassing the stdout
/// result document.
pub struct TtySink {
    tty: Mutex<std::fs::File>,
}

impl TtySink {
    /// Open the controlling terminal. `None` in CI or detached contexts;
    /// callers fall back to [`NoopSink`].
    pub fn open() -> Option<Self> {
        std::fs::OpenOptions::new()
            .write(true)
            .open("/dev/tty")
            .ok()
            .map(|f| TtySink { tty: Mutex::new(f) })
    }
}

impl ProgressSink for TtySink {
    fn emit(&self, line: &str) {
        if let Ok(mut tty) = self.tty.lock() {
            // Terminal closed mid-run: silently ignore.
            let _ = writeln!(tty, "{line}");
        }
    }
}

// ─── ANSI rendering ───────────────────────────────────────────────────────

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

static BOLD_STARS_RE: OnceLock<Regex> = OnceLock::new();
static BOLD_UNDERSCORES_RE: OnceLock<Regex> = OnceLock::new();
static CODE_RE: OnceLock<Regex> = OnceLock::new();
static HEADING_RE: OnceLock<Regex> = OnceLock::new();

/// Convert common markdown to ANSI terminal styles.
fn strip_md(text: &str) -> String {
    let bold = BOLD_STARS_RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
    let bold_u = BOLD_UNDERSCORES_RE.get_or_init(|| Regex::new(r"__(.+?)__").unwrap());
    let code = CODE_RE.get_or_init(|| Regex::new(r"`(.+?)`").unwrap());
    let heading = HEADING_RE.get_or_init(|| Regex::new(r"^#{1,6}\s+").unwrap());

    let text = bold.replace_all(text, format!("{BOLD}$1{RESET}").as_str());
    let text = bold_u.replace_all(&text, format!("{BOLD}$1{RESET}").as_str());
    let text = code.replace_all(&text, format!("{CYAN}$1{RESET}").as_str());
    heading.replace(&text, BOLD).into_owned()
}

/// Collapse text to a single line and convert markdown to ANSI.
fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    strip_md(&collapsed)
}

/// Render a raw JSON argument string as `k='v', k='v'`.
fn fmt_args(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
        Ok(map) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{k}={:?}", v.replace('\n', " "))
            })
            .collect::<Vec<_>>()
            .join(", "),
        Err(_) => raw.replace('\n', " "),
    }
}

// ─── Renderer ─────────────────────────────────────────────────────────────

/// Reduces [`ThreadEvent`]s to short `[codex]`-prefixed progress lines.
///
/// Holds the per-run echo state: elapsed clock and whether the session id
/// was already shown.
pub(crate) struct Renderer<'a> {
    sink: &'a dyn ProgressSink,
    start: Instant,
    session_shown: bool,
}

impl<'a> Renderer<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Renderer {
            sink,
            start: Instant::now(),
            session_shown: false,
        }
    }

    fn line(&self, rest: &str) {
        self.sink.emit(&format!("{DIM}[codex]{RESET} {rest}"));
    }

    pub(crate) fn event(&mut self, event: &ThreadEvent) {
        match event {
            ThreadEvent::ThreadStarted(t) => {
                if !self.session_shown {
                    let short: String = t.thread_id.chars().take(8).collect();
                    self.line(&format!("Session: {CYAN}{short}...{RESET}"));
                    self.session_shown = true;
                }
            }
            ThreadEvent::TurnStarted => {}
            ThreadEvent::TurnCompleted(_) => {
                let secs = self.start.elapsed().as_secs();
                self.line(&format!("{GREEN}Done.{RESET} ({secs}s)"));
            }
            ThreadEvent::TurnFailed(TurnFailed { error }) => {
                self.error(&error.message);
            }
            ThreadEvent::StreamError(e) => {
                if !e.is_transient() {
                    self.error(&e.message);
                }
            }
            ThreadEvent::ItemStarted(env) => self.item_started(&env.item),
            ThreadEvent::ItemUpdated(_) => {}
            ThreadEvent::ItemCompleted(env) => self.item_completed(&env.item),
        }
    }

    fn item_started(&self, item: &ThreadItem) {
        match item {
            ThreadItem::Reasoning { .. } => self.line(&format!("{DIM}Thinking...{RESET}")),
            ThreadItem::AgentMessage { .. } => self.line(&format!("{BOLD}Responding...{RESET}")),
            ThreadItem::CommandExecution { command, .. } if !command.is_empty() => {
                self.line(&format!("{GREEN}>>{RESET} shell({})", snippet(command)));
            }
            ThreadItem::FunctionCall { name, arguments } => {
                self.line(&format!("{GREEN}>>{RESET} {name}({})", fmt_args(arguments)));
            }
            _ => {}
        }
    }

    fn item_completed(&self, item: &ThreadItem) {
        match item {
            ThreadItem::AgentMessage { text } if !text.is_empty() => {
                self.line(&format!("{BOLD}Responding:{RESET} {}", snippet(text)));
            }
            ThreadItem::Reasoning { text } if !text.is_empty() => {
                self.line(&format!("{DIM}Thinking:{RESET} {}", snippet(text)));
            }
            ThreadItem::CommandExecution {
                aggregated_output,
                exit_code,
                ..
            } if !aggregated_output.is_empty() => {
                let prefix = match exit_code {
                    Some(code) if *code != 0 => format!("{RED}<< (exit={code}){RESET} "),
                    _ => format!("{YELLOW}<<{RESET} "),
                };
                self.line(&format!("{prefix}{}", snippet(aggregated_output)));
            }
            ThreadItem::FunctionCallOutput { output } => {
                if output.is_empty() {
                    self.line(&format!("{YELLOW}<<{RESET} {DIM}(no output){RESET}"));
                } else {
                    self.line(&format!("{YELLOW}<<{RESET} {}", snippet(output)));
                }
            }
            _ => {}
        }
    }

    pub(crate) fn error(&self, message: &str) {
        let short: String = message.chars().take(60).collect();
        self.line(&format!("{RED}Error:{RESET} {short}"));
    }

    pub(crate) fn timed_out(&self, seconds: u64) {
        self.line(&format!("{RED}Timed out after {seconds}s{RESET}"));
    }

    pub(crate) fn cancelled(&self) {
        self.line(&format!("{RED}Cancelled.{RESET}"));
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
