use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use storyboard_client::Session;
use storyboard_config::Settings;
use storyboard_orchestrator::{BatchOrchestrator, BatchRequest, OrchestratorConfig, PatchTarget};
use storyboard_workflow::InputPolicy;

/// Storyboard - batch image generation from story prompts
#[derive(Parser)]
#[command(name = "storyboard")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run every story prompt through a workflow, validation run first
  Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
  /// Path to the workflow template (API-format JSON)
  #[arg(long)]
  workflow: PathBuf,

  /// Directory of story JSON files
  #[arg(long)]
  stories: PathBuf,

  /// Root directory for downloaded images
  #[arg(long)]
  output: PathBuf,

  /// Settings file (JSON); flags below override it
  #[arg(long)]
  config: Option<PathBuf>,

  /// Base URL of the generation service
  #[arg(long)]
  server: Option<String>,

  /// Node that receives each prompt
  #[arg(long)]
  node: Option<String>,

  /// Input on the node that receives each prompt
  #[arg(long)]
  input: Option<String>,

  #[arg(long)]
  poll_interval_ms: Option<u64>,

  /// Per-job timeout; 0 waits forever
  #[arg(long)]
  timeout_secs: Option<u64>,

  /// Stop after the validation run
  #[arg(long)]
  validate_only: bool,

  /// Add the target input when the node does not declare it
  #[arg(long)]
  allow_new_inputs: bool,

  /// Abort a job on its first failed download
  #[arg(long)]
  abort_on_download_error: bool,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Some(Commands::Run(args)) => match run(args) {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => {
        error!(error = %format!("{:#}", e), "batch aborted");
        ExitCode::FAILURE
      }
    },
    None => {
      println!("storyboard - use --help to see available commands");
      ExitCode::SUCCESS
    }
  }
}

fn run(args: RunArgs) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async { run_async(args).await })
}

/// Failed prompts after the validation run are reported in the summary and
/// do not fail the command.
async fn run_async(args: RunArgs) -> Result<()> {
  let settings = load_settings(&args).await?;

  let session = Session::connect(&settings.server_address, settings.request_timeout())
    .context("failed to create service session")?;
  let config = OrchestratorConfig {
    validate_only: args.validate_only,
    ..OrchestratorConfig::from_settings(&settings)
  };
  let orchestrator = BatchOrchestrator::new(session, config);

  let policy = if settings.allow_new_inputs {
    InputPolicy::Permissive
  } else {
    InputPolicy::Strict
  };
  let request = BatchRequest {
    workflow_path: args.workflow,
    stories_dir: args.stories,
    target: PatchTarget::new(settings.node_id.clone(), settings.input_name.clone()).with_policy(policy),
    output_root: args.output,
  };

  let cancel = CancellationToken::new();
  let on_ctrl_c = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, finishing current prompt");
      on_ctrl_c.cancel();
    }
  });

  let result = orchestrator
    .run_with_cancel(&request, &cancel)
    .await
    .context("batch run failed")?;

  println!("{}", serde_json::to_string_pretty(&result)?);
  if !result.is_success() {
    warn!(failed = result.failed(), "some prompts failed");
  }

  Ok(())
}

async fn load_settings(args: &RunArgs) -> Result<Settings> {
  let mut settings = match &args.config {
    Some(path) => Settings::load(path)
      .await
      .with_context(|| format!("failed to load settings: {}", path.display()))?,
    None => Settings::default(),
  };

  if let Some(server) = &args.server {
    settings.server_address = server.clone();
  }
  if let Some(node) = &args.node {
    settings.node_id = node.clone();
  }
  if let Some(input) = &args.input {
    settings.input_name = input.clone();
  }
  if let Some(ms) = args.poll_interval_ms {
    settings.poll_interval_ms = ms;
  }
  if let Some(secs) = args.timeout_secs {
    settings.poll_timeout_secs = (secs > 0).then_some(secs);
  }
  settings.allow_new_inputs |= args.allow_new_inputs;
  settings.abort_on_download_error |= args.abort_on_download_error;

  Ok(settings)
}
