use std::sync::Arc;

use clap::Parser;
use stationd::memory::MemoryDriver;
use stationd::{MountDriver, Supervisor, load_stations, status};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let loaded = load_stations(&args.config, &args.default_key())?;
    info!(
        "loaded {} stations from {} ({} rejected)",
        loaded.stations.len(),
        args.config.display(),
        loaded.rejected.len()
    );

    let driver: Arc<dyn MountDriver> = if args.dry_run {
        warn!("dry run: nothing will actually be mounted");
        Arc::new(MemoryDriver::default())
    } else {
        Arc::new(args.sshfs_driver())
    };

    let shutdown = CancellationToken::new();
    let supervisor =
        Supervisor::new(loaded.stations, driver, args.supervisor_options()).spawn(shutdown.clone());

    let status = {
        let handle = supervisor.handle();
        let shutdown = shutdown.clone();
        let addr = args.status_addr;
        tokio::spawn(async move {
            if let Err(e) = status::serve(addr, handle, shutdown).await {
                error!("status surface stopped: {e:#}");
            }
        })
    };

    shutdown_signal().await;
    shutdown.cancel();
    supervisor.join().await;
    let _ = status.await;
    info!("stationd stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
