use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::bridge;
use crate::process::CodexProcess;
use crate::types::{Invocation, ThreadEvent};
use crate::Result;

// ─── EventStream ──────────────────────────────────────────────────────────

/// An async stream of raw [`ThreadEvent`]s from a codex subprocess.
///
/// For callers that want to do their own reduction instead of going through
/// [`crate::run`]. Backed by a Tokio mpsc channel: a background task owns
/// the [`CodexProcess`], forwards events until a terminal turn event or
/// EOF, and always tears the child down before exiting. Dropping the stream
/// closes the receiver, which stops the background task on its next send.
///
/// The stream applies no timeout; wall-clock budgets are the run loop's
/// concern.
pub struct EventStream {
    rx: mpsc::Receiver<Result<ThreadEvent>>,
}

impl EventStream {
    /// Validate `invocation` and spawn a codex subprocess for it.
    pub fn open(invocation: &Invocation) -> Result<Self> {
        bridge::validate(invocation)?;
        let process = CodexProcess::spawn(invocation)?;
        Ok(Self::from_process(process))
    }

    pub(crate) fn from_process(mut process: CodexProcess) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut got_terminal = false;
            loop {
                match process.next_event().await {
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    Ok(None) => break, // EOF — process exited
                    Ok(Some(event)) => {
                        let is_terminal = event.is_terminal();
                        if is_terminal {
                            got_terminal = true;
                        }
                        if tx.send(Ok(event)).await.is_err() {
                            break; // Receiver dropped
                        }
                        if is_terminal {
                            break;
                        }
                    }
                }
            }

            // If the process exited without a terminal turn event, surface a
            // non-zero exit code along with captured stderr.
            if !got_terminal {
                if let Some(exit_err) = process.wait_exit_error().await {
                    let _ = tx.send(Err(exit_err)).await;
                }
            }

            process.terminate().await;
        });

        EventStream { rx }
    }
}

impl Stream for EventStream {
    type Item = Result<ThreadEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::process::Command;

    /// Write JSON lines to a temp file, then `cat` it as the mock process.
    fn mock_stream(lines: &[&str]) -> EventStream {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        let path = f.path().to_owned();
        // Keep the file alive for the duration of the test
        std::mem::forget(f);

        let mut cmd = Command::new("cat");
        cmd.arg(&path);
        let process = CodexProcess::spawn_command(cmd).unwrap();
        EventStream::from_process(process)
    }

    const STARTED: &str = r#"{"type":"thread.started","thread_id":"s1"}"#;
    const REPLY: &str =
        r#"{"type":"item.completed","item":{"type":"agent_message","text":"hello"}}"#;
    const COMPLETED: &str =
        r#"{"type":"turn.completed","usage":{"input_tokens":10,"output_tokens":5}}"#;

    #[tokio::test]
    async fn stream_yields_all_events() {
        let stream = mock_stream(&[STARTED, REPLY, COMPLETED]);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.is_ok()));
    }

    #[tokio::test]
    async fn stream_terminates_after_turn_completed() {
        // An extra event after turn.completed must never be emitted.
        let stream = mock_stream(&[STARTED, COMPLETED, REPLY]);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.last().unwrap().as_ref().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn stream_surfaces_session_id() {
        let stream = mock_stream(&[STARTED, COMPLETED]);
        let events: Vec<_> = stream.collect().await;
        assert_eq!(events[0].as_ref().unwrap().session_id(), Some("s1"));
    }

    #[tokio::test]
    async fn stream_surfaces_nonzero_exit_without_terminal_event() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("echo '{STARTED}'; echo oops >&2; exit 7"));
        let process = CodexProcess::spawn_command(cmd).unwrap();
        let events: Vec<_> = EventStream::from_process(process).collect().await;

        assert!(events[0].is_ok());
        let err = events.last().unwrap().as_ref().unwrap_err().to_string();
        assert!(err.contains("code 7"), "{err}");
    }

    #[tokio::test]
    async fn open_rejects_invalid_invocations_without_spawning() {
        let invocation = Invocation::new("", std::env::temp_dir());
        assert!(EventStream::open(&invocation).is_err());
    }
}
