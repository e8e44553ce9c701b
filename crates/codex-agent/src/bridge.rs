use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::process::CodexProcess;
use crate::progress::{ProgressSink, Renderer};
use crate::types::{Invocation, RunOutcome, ThreadEvent, ThreadItem};
use crate::{BridgeError, Result};

/// codex lingers briefly after reporting turn completion; give it this long
/// to exit on its own before the graceful teardown kicks in.
const POST_TURN_LINGER: Duration = Duration::from_millis(300);

// ─── Public API ───────────────────────────────────────────────────────────

/// Run one invocation to completion or to its wall-clock timeout.
///
/// Blocking from the caller's perspective: resolves only once the
/// subprocess has exited or been torn down. Never leaves an orphaned
/// subprocess behind, and never raises — every failure is folded into
/// [`RunOutcome::error`] together with whatever session id and output were
/// captured before the cutoff.
pub async fn run(invocation: Invocation, sink: &dyn ProgressSink) -> RunOutcome {
    run_with_shutdown(invocation, sink, std::future::pending()).await
}

/// Like [`run`], but tears the subprocess down and returns a
/// [`BridgeError::Cancelled`] outcome when `shutdown` resolves first
/// (typically wired to `ctrl_c`).
pub async fn run_with_shutdown(
    invocation: Invocation,
    sink: &dyn ProgressSink,
    shutdown: impl Future<Output = ()>,
) -> RunOutcome {
    if let Err(e) = validate(&invocation) {
        let mut outcome = RunOutcome::failed(e);
        outcome.session_id = invocation.resume.clone();
        return outcome;
    }

    let process = match CodexProcess::spawn(&invocation) {
        Ok(p) => p,
        Err(e) => {
            let mut outcome = RunOutcome::failed(e);
            outcome.session_id = invocation.resume.clone();
            return outcome;
        }
    };

    drive(process, &invocation, sink, shutdown).await
}

// ─── Validation ───────────────────────────────────────────────────────────

/// Check every invocation precondition. Violations are reported before any
/// subprocess exists, so there is no partial state to clean up.
pub(crate) fn validate(invocation: &Invocation) -> Result<()> {
    if invocation.prompt.trim().is_empty() {
        return Err(BridgeError::InvalidInput("prompt must not be empty".into()));
    }

    if !invocation.cd.is_dir() {
        return Err(BridgeError::InvalidInput(format!(
            "working directory {} does not exist",
            invocation.cd.display()
        )));
    }

    for image in &invocation.images {
        if !image.is_file() {
            return Err(BridgeError::InvalidInput(format!(
                "image {} does not exist",
                image.display()
            )));
        }
    }

    if invocation.model.as_deref() == Some("") {
        return Err(BridgeError::InvalidInput("model must not be empty".into()));
    }

    if invocation.profile.as_deref() == Some("") {
        return Err(BridgeError::InvalidInput(
            "profile must not be empty".into(),
        ));
    }

    if !invocation.skip_git_repo_check && !is_inside_git_worktree(&invocation.cd) {
        return Err(BridgeError::NotARepository(invocation.cd.clone()));
    }

    Ok(())
}

/// Walk upward from `dir` looking for a `.git` entry. A plain file counts:
/// linked worktrees keep a `.git` file instead of a directory.
pub(crate) fn is_inside_git_worktree(dir: &Path) -> bool {
    let mut dir = dir.to_path_buf();
    loop {
        if dir.join(".git").exists() {
            return true;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => return false,
        }
    }
}

// ─── Run loop ─────────────────────────────────────────────────────────────

/// Drive a spawned process to an outcome.
///
/// Exposed as `pub(crate)` so tests can inject fake subprocesses without
/// going through the real `codex` binary.
pub(crate) async fn drive(
    mut process: CodexProcess,
    invocation: &Invocation,
    sink: &dyn ProgressSink,
    shutdown: impl Future<Output = ()>,
) -> RunOutcome {
    let mut renderer = Renderer::new(sink);

    // Seed with the supplied id so a resumed run stays resumable even if
    // codex never re-emits it. Freshest observation wins.
    let mut session_id = invocation.resume.clone();
    let mut agent_message = String::new();
    let mut events: Vec<ThreadEvent> = Vec::new();
    let mut failure_notes: Vec<String> = Vec::new();
    let mut turn_done = false;

    let unbounded = invocation.timeout_secs == 0;
    let deadline = tokio::time::sleep(Duration::from_secs(invocation.timeout_secs));
    tokio::pin!(deadline);
    tokio::pin!(shutdown);

    let abort: Option<BridgeError> = loop {
        let next = tokio::select! {
            _ = &mut deadline, if !unbounded => {
                break Some(BridgeError::Timeout { seconds: invocation.timeout_secs });
            }
            _ = &mut shutdown => break Some(BridgeError::Cancelled),
            next = process.next_event() => next,
        };

        match next {
            Err(e) => break Some(e),
            Ok(None) => break None, // EOF — process exited on its own
            Ok(Some(event)) => {
                renderer.event(&event);

                match &event {
                    ThreadEvent::ThreadStarted(t) => session_id = Some(t.thread_id.clone()),
                    ThreadEvent::ItemCompleted(env) => {
                        if let ThreadItem::AgentMessage { text } = &env.item {
                            // The last final-reply wins.
                            agent_message = text.clone();
                        }
                    }
                    ThreadEvent::TurnFailed(f) => failure_notes.push(f.error.message.clone()),
                    ThreadEvent::StreamError(e) => {
                        if !e.is_transient() {
                            failure_notes.push(e.message.clone());
                        }
                    }
                    _ => {}
                }

                let terminal = event.is_terminal();
                if invocation.return_all_messages {
                    events.push(event);
                }
                if terminal {
                    turn_done = true;
                    break None;
                }
            }
        }
    };

    let error = match abort {
        Some(e) => {
            match &e {
                BridgeError::Timeout { seconds } => renderer.timed_out(*seconds),
                BridgeError::Cancelled => renderer.cancelled(),
                other => renderer.error(&other.to_string()),
            }
            process.terminate().await;
            Some(e)
        }
        None => finish(&mut process, invocation, turn_done, &session_id, &agent_message, &failure_notes).await,
    };

    debug!(success = error.is_none(), session = session_id.as_deref().unwrap_or(""), "run finished");

    RunOutcome {
        session_id,
        agent_message,
        events,
        error,
    }
}

/// Reap the subprocess after a natural end of stream and judge the run.
///
/// Success requires a clean exit, an observed session id and a non-empty
/// agent message; anything else is classified into the error taxonomy.
async fn finish(
    process: &mut CodexProcess,
    invocation: &Invocation,
    turn_done: bool,
    session_id: &Option<String>,
    agent_message: &str,
    failure_notes: &[String],
) -> Option<BridgeError> {
    let status = if turn_done {
        match tokio::time::timeout(POST_TURN_LINGER, process.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => {
                // Still lingering after the turn ended — we end it.
                process.terminate().await;
                None
            }
        }
    } else {
        process.wait().await.ok()
    };

    // A process we tore down ourselves after a completed turn counts as a
    // clean exit.
    let exited_cleanly = status.map_or(turn_done, |s| s.success());

    if !exited_cleanly {
        let mut detail = match status.and_then(|s| s.code()) {
            Some(code) => format!("codex exited with code {code}"),
            None => "codex terminated by signal".to_string(),
        };
        for note in failure_notes {
            detail.push('\n');
            detail.push_str(note);
        }
        let stderr = process.stderr_excerpt().await;
        if !stderr.is_empty() {
            detail.push_str("\nstderr: ");
            detail.push_str(&stderr);
        }
        return Some(classify_failure(invocation.resume.as_deref(), detail));
    }

    if agent_message.is_empty() && !failure_notes.is_empty() {
        return Some(classify_failure(
            invocation.resume.as_deref(),
            failure_notes.join("\n"),
        ));
    }

    if session_id.is_none() {
        return Some(BridgeError::Subprocess(
            "codex never reported a session id".into(),
        ));
    }

    if agent_message.is_empty() {
        return Some(BridgeError::Subprocess(
            "codex produced no agent message; pass --return-all-messages to inspect the full event trace".into(),
        ));
    }

    None
}

/// A rejected resume id is its own error kind; everything else is a plain
/// subprocess failure.
fn classify_failure(resume: Option<&str>, detail: String) -> BridgeError {
    if let Some(session_id) = resume {
        let lower = detail.to_lowercase();
        if lower.contains("not found") || lower.contains("no rollout") {
            return BridgeError::SessionNotFound(session_id.to_string());
        }
    }
    BridgeError::Subprocess(detail)
}

// ─── Tests ────────────────────────────────────────────────────────────────
