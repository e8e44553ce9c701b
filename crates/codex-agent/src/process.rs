use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::types::{Invocation, ThreadEvent};
use crate::{BridgeError, Result};

/// How long a terminated process gets to exit after SIGTERM before SIGKILL.
pub(crate) const GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Stderr is folded into error messages; cap the excerpt so a chatty failure
/// doesn't swamp the result document.
const STDERR_EXCERPT_MAX: usize = 2000;

// ─── CodexProcess ─────────────────────────────────────────────────────────

/// A running `codex exec --json` subprocess.
///
/// The prompt is passed on the command line; events are read as JSONL from
/// stdout. Stdin is never inherited. Stderr is drained by a background task
/// and surfaced when the process fails.
pub(crate) struct CodexProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    /// Stderr output collected by a background reader task.
    stderr_buf: Arc<Mutex<String>>,
    stderr_task: Option<tokio::task::JoinHandle<()>>,
}

impl CodexProcess {
    /// Spawn the real `codex` binary for the given invocation.
    pub(crate) fn spawn(invocation: &Invocation) -> Result<Self> {
        let cmd = build_command(invocation);
        debug!(cd = %invocation.cd.display(), sandbox = invocation.sandbox.as_str(), "spawning codex");
        Self::from_command(cmd)
    }

    /// Spawn an arbitrary command as a mock codex process.
    /// Used in unit tests to inject a command that emits fixed JSON lines.
    #[cfg(test)]
    pub(crate) fn spawn_command(cmd: Command) -> Result<Self> {
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(BridgeError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Subprocess("stdout not captured".into()))?;

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        let stderr_task = child.stderr.take().map(|stderr| {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            })
        });

        let lines = BufReader::new(stdout).lines();
        Ok(Self {
            child,
            lines,
            stderr_buf,
            stderr_task,
        })
    }

    /// Read the next non-empty JSONL line from stdout and decode it.
    ///
    /// Valid JSON with an unrecognised `"type"` is silently skipped so a
    /// newer codex cannot break the stream by adding event kinds.
    ///
    /// Returns `Ok(None)` on EOF (process exited).
    ///
    /// Cancel safety: the only await point is `next_line`, which is
    /// cancel-safe, so this can be raced against a timer in `select!`.
    pub(crate) async fn next_event(&mut self) -> Result<Option<ThreadEvent>> {
        loop {
            match self.lines.next_line().await {
                Err(e) => return Err(BridgeError::Io(e)),
                Ok(None) => return Ok(None),
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ThreadEvent>(trimmed) {
                        Ok(event) => return Ok(Some(event)),
                        Err(e) => {
                            if is_unknown_event_type(trimmed) {
                                debug!(line = trimmed, "skipping unknown event type");
                                continue;
                            }
                            return Err(BridgeError::Parse {
                                line: trimmed.to_owned(),
                                source: e,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Wait for the child to exit and return an error if the exit code is
    /// non-zero or the process was killed by a signal. Captured stderr is
    /// folded into the message.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<BridgeError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(BridgeError::Io(e)),
        };

        if status.success() {
            return None;
        }

        let stderr = self.stderr_excerpt().await;
        let msg = match status.code() {
            Some(code) if stderr.is_empty() => format!("codex exited with code {code}"),
            Some(code) => format!("codex exited with code {code}\nstderr: {stderr}"),
            None if stderr.is_empty() => "codex terminated by signal".to_string(),
            None => format!("codex terminated by signal\nstderr: {stderr}"),
        };

        Some(BridgeError::Subprocess(msg))
    }

    /// Wait for the child to exit on its own.
    pub(crate) async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        self.child.wait().await.map_err(BridgeError::Io)
    }

    /// Tear the subprocess down: SIGTERM, wait [`GRACE_PERIOD`], then
    /// SIGKILL. Idempotent; a no-op when the child already exited.
    pub(crate) async fn terminate(&mut self) {
        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                #[allow(clippy::cast_possible_wrap)]
                let ret = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
                if ret != 0 {
                    let err = std::io::Error::last_os_error();
                    warn!(pid, error = %err, "failed to send SIGTERM");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        if tokio::time::timeout(GRACE_PERIOD, self.child.wait())
            .await
            .is_err()
        {
            warn!("grace period expired, sending SIGKILL");
            let _ = self.child.kill().await;
        }
    }

    /// Stderr captured so far, capped at [`STDERR_EXCERPT_MAX`] characters.
    ///
    /// Gives the drain task a short window to reach EOF first, so a message
    /// written just before exit is not lost to the race.
    pub(crate) async fn stderr_excerpt(&mut self) -> String {
        if let Some(task) = self.stderr_task.take() {
            let _ = tokio::time::timeout(Duration::from_millis(200), task).await;
        }
        let buf = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();
        if buf.chars().count() > STDERR_EXCERPT_MAX {
            buf.chars().take(STDERR_EXCERPT_MAX).collect()
        } else {
            buf
        }
    }
}

/// Check if a JSON line has a `"type"` field with a value we don't
/// recognise. If it's valid JSON with a type field, it's an unknown event
/// and should be skipped. If it's not valid JSON, it's a genuine parse
/// error.
fn is_unknown_event_type(line: &str) -> bool {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(line) {
        v.get("type").is_some()
    } else {
        false
    }
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(invocation: &Invocation) -> Command {
    let exe = invocation.codex_bin.as_deref().unwrap_or("codex");
    let mut cmd = Command::new(exe);

    cmd.arg("exec")
        .arg("--json")
        .arg("--sandbox")
        .arg(invocation.sandbox.as_str())
        .arg("--cd")
        .arg(&invocation.cd);

    for image in &invocation.images {
        cmd.arg("--image").arg(image);
    }

    if let Some(model) = &invocation.model {
        cmd.arg("--model").arg(model);
    }

    if let Some(profile) = &invocation.profile {
        cmd.arg("--profile").arg(profile);
    }

    // The repository precondition is enforced before spawn, so codex's own
    // check is always bypassed.
    cmd.arg("--skip-git-repo-check");

    if let Some(session_id) = &invocation.resume {
        cmd.arg("resume").arg(session_id);
    }

    cmd.arg("--").arg(&invocation.prompt);
    cmd
}

// ─── Tests ────────────────────────────────────────────────────────────────
