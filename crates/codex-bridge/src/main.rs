use std::path::PathBuf;

use clap::Parser;

use codex_agent::{
    BridgeResult, Invocation, NoopSink, ProgressSink, RunOutcome, SandboxPolicy, TtySink,
    DEFAULT_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(
    name = "codex-bridge",
    about = "Run a prompt through the Codex CLI and reduce its event stream to one JSON result",
    version
)]
struct Cli {
    /// Instruction for the task to send to codex
    prompt: String,

    /// Workspace root for codex before executing the task
    #[arg(long)]
    cd: PathBuf,

    /// Sandbox policy for model-generated commands
    /// (read-only, workspace-write or danger-full-access)
    #[arg(long, default_value = "read-only")]
    sandbox: String,

    /// Resume the specified codex session instead of starting a new one
    #[arg(long = "session-id")]
    session_id: Option<String>,

    /// Allow codex to run outside a git working tree
    #[arg(long)]
    skip_git_repo_check: bool,

    /// Return the full event trace (reasoning, tool calls, ...) instead of
    /// only the final reply
    #[arg(long)]
    return_all_messages: bool,

    /// Attach an image file to the initial prompt (repeatable)
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Model override for this session
    #[arg(long)]
    model: Option<String>,

    /// Configuration profile name from ~/.codex/config.toml
    #[arg(long)]
    profile: Option<String>,

    /// Maximum execution time in seconds (0 = no timeout)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Disable real-time progress output to the terminal (CI/CD environments)
    #[arg(long)]
    no_progress: bool,

    /// Custom path to the codex executable
    #[arg(long, env = "CODEX_BIN")]
    codex_bin: Option<String>,
}

impl Cli {
    fn into_invocation(self) -> codex_agent::Result<Invocation> {
        let sandbox: SandboxPolicy = self.sandbox.parse()?;
        let mut invocation = Invocation::new(self.prompt, self.cd);
        invocation.sandbox = sandbox;
        invocation.resume = self.session_id.filter(|s| !s.is_empty());
        invocation.model = self.model;
        invocation.profile = self.profile;
        invocation.images = self.images;
        invocation.timeout_secs = self.timeout;
        invocation.skip_git_repo_check = self.skip_git_repo_check;
        invocation.return_all_messages = self.return_all_messages;
        invocation.codex_bin = self.codex_bin;
        Ok(invocation)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays a clean JSON document.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let no_progress = cli.no_progress;
    let return_all_messages = cli.return_all_messages;

    let outcome = match cli.into_invocation() {
        Ok(invocation) => {
            let sink: Box<dyn ProgressSink> = if no_progress {
                Box::new(NoopSink)
            } else {
                // No controlling terminal: silent fallback.
                TtySink::open()
                    .map(|t| Box::new(t) as Box<dyn ProgressSink>)
                    .unwrap_or(Box::new(NoopSink))
            };
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            codex_agent::run_with_shutdown(invocation, sink.as_ref(), shutdown).await
        }
        Err(e) => RunOutcome::failed(e),
    };

    let result = BridgeResult::from_outcome(outcome, return_all_messages);
    println!("{}", serde_json::to_string_pretty(&result)?);

    // Errors are reported in-band; a produced result always exits 0.
    Ok(())
}
