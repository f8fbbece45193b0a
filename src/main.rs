mod backend;
mod cache_lifecycle;
mod cli;
mod config;
mod error;
mod logging;
mod orchestrator;
mod progress;
mod ui;
mod workflow;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info};

use backend::{BackendClient, MapMatchRequest};
use cli::{Cli, Command, RunArgs};
use config::WizardConfig;
use orchestrator::{SubmissionOrchestrator, SubmitOutcome};
use ui::WorkflowProgress;
use workflow::{WorkflowContext, WorkflowStep};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("warning: {e}");
    }

    let mut config = WizardConfig::load()?;
    config.override_server_url(cli.server.clone());
    if let Some(max_retries) = cli.max_retries {
        config.max_retries = max_retries;
    }

    let client = BackendClient::with_settings(
        &config.server_url,
        config.retry_config(),
        config.connect_timeout(),
        config.request_timeout(),
    )
    .context("failed to build HTTP client")?;
    debug!(server = %client.base_url(), "backend client ready");

    let ui = WorkflowProgress::new();
    match cli.command {
        Command::Run(args) => run_wizard(client, &config, &args, &ui).await,
        Command::MapMatch { file, percentage } => {
            let req = MapMatchRequest::new(file, percentage)?;
            let response = client.map_match(&req).await?;
            ui.print_map_match(&response);
            Ok(())
        }
        Command::Download { name, output } => {
            let dest = output.unwrap_or_else(|| default_download_path(&name));
            let bytes = client
                .download_to(&name, &dest)
                .await
                .with_context(|| format!("failed to download {name}"))?;
            ui.print_download(&dest, bytes);
            Ok(())
        }
    }
}

/// Walks the three wizard steps with the values given on the command line.
async fn run_wizard(
    client: BackendClient,
    config: &WizardConfig,
    args: &RunArgs,
    ui: &WorkflowProgress,
) -> Result<()> {
    let orch =
        SubmissionOrchestrator::new(client, ui).with_max_upload_bytes(config.max_upload_bytes);
    let mut ctx = WorkflowContext::new(args.form(), config.notification_ttl_ms);

    // One handler for the whole run: every later step can be interrupted too.
    let interrupt = interrupted();
    tokio::pin!(interrupt);

    ui.step(WorkflowStep::Overview);
    orch.submit(&mut ctx).await?;

    ui.step(WorkflowStep::ModelStage);
    let outcome = orch.submit_with_teardown(&mut ctx, interrupt.as_mut()).await;
    flush_notification(ui, &mut ctx);
    match outcome? {
        SubmitOutcome::CacheOffered { cache_file } => {
            info!(%cache_file, "resolving trained cache");
            let resolved = orch
                .resolve_cache_with_teardown(
                    &mut ctx,
                    &args.cache_decision(),
                    interrupt.as_mut(),
                )
                .await;
            flush_notification(ui, &mut ctx);
            if resolved? == SubmitOutcome::TornDown {
                println!("Interrupted before the cache `{cache_file}` was settled.");
                return Ok(());
            }
        }
        SubmitOutcome::TornDown => {
            println!("Interrupted; the server may still be working on the model.");
            return Ok(());
        }
        SubmitOutcome::Advanced(_) | SubmitOutcome::Generated => {}
    }
    if let Some(stats) = &ctx.stats {
        ui.print_stats(stats);
    }
    if ctx.wizard.current() != WorkflowStep::GenerationStage {
        bail!("the model step did not complete");
    }

    ui.step(WorkflowStep::GenerationStage);
    let generated = orch.submit_with_teardown(&mut ctx, interrupt.as_mut()).await;
    flush_notification(ui, &mut ctx);
    if generated? == SubmitOutcome::TornDown {
        println!("Interrupted; no trajectories were generated.");
        return Ok(());
    }
    if let Some(result) = &ctx.generation {
        ui.print_generation(result);
    }
    debug!(history = ?ctx.wizard.history(), "wizard finished");
    Ok(())
}

/// Shows the pending notification once.
fn flush_notification(ui: &WorkflowProgress, ctx: &mut WorkflowContext) {
    if let Some(notification) = ctx.notifications.active() {
        ui.notify(notification);
    }
    ctx.notifications.dismiss();
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn default_download_path(name: &str) -> PathBuf {
    Path::new(name)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download"))
}
