//! klaro - autonomous README generator

mod config;
mod ignore;
mod knowledge;
mod prompts;
mod session;
mod sizing;
mod tools;
mod utils;

use anyhow::Context as _;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use klaro_agent::{AgentEvent, ProviderTransport, StepKind};
use klaro_ai::providers::openai::{API_KEY_ENV, OpenAIProvider};

use config::{FileConfig, Overrides, Settings};
use session::{Session, SessionError};
use utils::{format_elapsed, truncate_chars};

/// klaro - study a codebase and write its README
#[derive(Parser, Debug)]
#[command(name = "klaro")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project directory to document
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Model used when tier selection is off or sizing fails (default: gpt-4o-mini)
    #[arg(short, long, env = "KLARO_MODEL")]
    model: Option<String>,

    /// Model for small projects
    #[arg(long, env = "KLARO_MODEL_SMALL")]
    model_small: Option<String>,

    /// Model for medium projects
    #[arg(long, env = "KLARO_MODEL_MEDIUM")]
    model_medium: Option<String>,

    /// Model for large projects
    #[arg(long, env = "KLARO_MODEL_LARGE")]
    model_large: Option<String>,

    /// Pick the model from the project size (true/false)
    #[arg(long, env = "KLARO_AUTO_TIER")]
    auto_tier: Option<bool>,

    /// Reasoning plus tool steps allowed
    #[arg(long, env = "KLARO_RECURSION_LIMIT")]
    max_iterations: Option<u32>,

    /// Seconds allowed per model call
    #[arg(long, env = "KLARO_MODEL_TIMEOUT")]
    model_timeout: Option<u64>,

    /// Seconds allowed for the whole run
    #[arg(long, env = "KLARO_SESSION_TIMEOUT")]
    session_timeout: Option<u64>,

    /// Seconds allowed per tool call
    #[arg(long, env = "KLARO_TOOL_TIMEOUT")]
    tool_timeout: Option<u64>,

    /// Retries per model call
    #[arg(long, env = "KLARO_MODEL_RETRIES")]
    model_retries: Option<u32>,

    /// OpenAI-compatible endpoint
    #[arg(long, env = "KLARO_BASE_URL", hide = true)]
    base_url: Option<String>,

    /// Extra style guide to index (repeatable)
    #[arg(long = "guide", value_name = "FILE")]
    guides: Vec<PathBuf>,

    /// Write the README here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, env = "KLARO_DEBUG")]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            model_small: self.model_small.clone(),
            model_medium: self.model_medium.clone(),
            model_large: self.model_large.clone(),
            auto_tier: self.auto_tier,
            max_iterations: self.max_iterations,
            model_timeout: self.model_timeout,
            session_timeout: self.session_timeout,
            tool_timeout: self.tool_timeout,
            model_retries: self.model_retries,
            base_url: self.base_url.clone(),
            guides: self.guides.clone(),
            verbose: self.verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the README
    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("klaro=debug,klaro_agent=debug,klaro_ai=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.init_config {
        match FileConfig::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let file = FileConfig::load();
    let settings = Settings::resolve(args.overrides(), &file);

    let Some(api_key) = config::api_key(&file) else {
        fail(&SessionError::Configuration(format!(
            "no API key found; set {} or [api_keys] openai in {}",
            API_KEY_ENV,
            FileConfig::config_path().display()
        )));
    };
    let provider = Arc::new(OpenAIProvider::new(api_key));
    let transport = Arc::new(ProviderTransport::new(provider));

    let session = match Session::prepare(&args.target, &settings, transport) {
        Ok(session) => session,
        Err(e) => fail(&e),
    };
    eprintln!(
        "Documenting {} with {}{}",
        args.target.display(),
        session.model_id(),
        session
            .tier()
            .map(|t| format!(" ({} project)", t))
            .unwrap_or_default()
    );

    let printer = tokio::spawn(print_events(session.subscribe(), settings.verbose));
    let result = session.run().await;
    // Let the printer drain; on timeout the loop may still be winding down
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => fail(&e),
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, format!("{}\n", artifact.text))
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("README written to {}", path.display());
        }
        None => println!("{}", artifact.text),
    }

    eprintln!(
        "[done in {} | {}{} | {} reasoning, {} tool steps | {:?} completion]",
        format_elapsed(artifact.elapsed),
        artifact.model,
        artifact
            .tier
            .map(|t| format!(" ({})", t))
            .unwrap_or_default(),
        artifact.reasoning_steps,
        artifact.acting_steps,
        artifact.completion
    );
    if settings.verbose {
        eprintln!(
            "[Tokens: {} in, {} out | est. ${:.4}]",
            artifact.usage.input, artifact.usage.output, artifact.cost
        );
    }
    Ok(())
}

/// Report a failed session on stderr and exit: 1 for configuration
/// problems, 2 for runs that started but did not finish.
fn fail(error: &SessionError) -> ! {
    let (notice, code) = match error {
        SessionError::Timeout { .. } => ("Timed out", 2),
        SessionError::IterationLimit { .. } => ("Iteration limit reached", 2),
        SessionError::ModelFailure { .. } => ("Model API failure", 2),
        SessionError::Worker(_) => ("Internal error", 2),
        SessionError::Configuration(_) => ("Cannot start", 1),
    };
    eprintln!("\n{}: {}", notice, error);

    if let Some(partial) = error.partial() {
        eprintln!(
            "\n--- partial output (incomplete) ---\n{}\n--- end of partial output ---",
            partial
        );
    }
    std::process::exit(code);
}

/// Progress lines on stderr until the loop ends.
async fn print_events(mut events: broadcast::Receiver<AgentEvent>, verbose: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match &event {
            AgentEvent::StepStart { step, kind } if verbose => {
                let label = match kind {
                    StepKind::Reasoning => "thinking",
                    StepKind::Acting => "acting",
                };
                eprintln!("[step {}: {}]", step, label);
            }
            AgentEvent::ToolExecutionStart {
                tool_name,
                arguments,
                ..
            } => {
                eprintln!("[{} {}]", tool_name, truncate_chars(&arguments.to_string(), 80));
            }
            AgentEvent::ToolExecutionEnd {
                tool_name,
                result,
                is_error: true,
                ..
            } => {
                eprintln!("[{} failed: {}]", tool_name, truncate_chars(result, 120));
            }
            AgentEvent::ToolExecutionEnd { result, .. } if verbose => {
                let first_line = result.lines().next().unwrap_or_default();
                eprintln!("  -> {}", truncate_chars(first_line, 100));
            }
            AgentEvent::Recovering { error } => {
                eprintln!("[recovering: {}]", truncate_chars(error, 120));
            }
            AgentEvent::NearIterationLimit {
                steps,
                max_iterations,
            } => {
                eprintln!("[warning: {} of {} steps used]", steps, max_iterations);
            }
            AgentEvent::Error { message, .. } => {
                eprintln!("Error: {}", message);
            }
            AgentEvent::LoopEnd { .. } => break,
            _ => {}
        }
    }
}
