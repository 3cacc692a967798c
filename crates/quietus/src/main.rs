use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quietus::{Config, OsController, RunOutcome, Supervisor, TokioClock};

#[derive(Parser, Debug)]
#[command(name = "quietus")]
#[command(version, about = "Start, poll and stop processes on a timed schedule")]
struct Args {
    /// Schedule description (YAML)
    #[arg(short, long, env = "QUIETUS_SCHEDULE")]
    file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("quietus=info")),
        )
        .init();

    let config = Config::load(&args.file)
        .await
        .with_context(|| format!("failed to load schedule from {}", args.file.display()))?;
    let schedule = config
        .resolve()
        .with_context(|| format!("invalid schedule in {}", args.file.display()))?;
    info!(processes = schedule.entries.len(), "Loaded schedule");

    let mut supervisor = Supervisor::new(schedule, OsController::new(), TokioClock);
    let token = supervisor.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        token.cancel();
    });

    match supervisor.run().await {
        RunOutcome::Completed => info!("Schedule completed"),
        RunOutcome::Interrupted => info!("Stopped all managed processes"),
        RunOutcome::HorizonReached => {}
    }

    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
