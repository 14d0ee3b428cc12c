use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;
use utils::cli::{Cli, Command, DatabaseArgs, ScanArgs, ServeArgs};
use utils::state::AppState;

use crate::config::Config;
use crate::domain::frame::PgFrameRepository;

mod api;
mod config;
mod domain;
mod error;
mod ingest;
mod service;
mod utils;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Scan(args) => scan(args).await,
    }
}

fn pool(db_url: &str, max_connections: u32, acquire_timeout: Duration) -> anyhow::Result<PgPool> {
    // Lazy so that the API comes up, and answers 503, while the catalog is down.
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect_lazy(db_url)
        .context("invalid DATABASE_URL")
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = Config::from_args(&args)?;
    let pool = pool(&config.db_url, config.max_connections, config.acquire_timeout)?;
    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, Arc::new(pool)));

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn scan(args: ScanArgs) -> anyhow::Result<()> {
    let errors = config::validate_database(&args.database);
    if !errors.is_empty() {
        anyhow::bail!("{}", errors.join("\n"));
    }

    let mount = args.mount.clone();
    let only = args.stations.clone();
    let scan = tokio::task::spawn_blocking(move || ingest::scan_mount(&mount, &only))
        .await?
        .with_context(|| format!("cannot read mount root {}", args.mount.display()))?;
    info!(
        "found {} frames under {} ({} unreadable entries)",
        scan.frames.len(),
        args.mount.display(),
        scan.unreadable
    );

    if scan.frames.is_empty() {
        info!("no files found under {}", args.mount.display());
        return Ok(());
    }
    if args.dry_run {
        for frame in &scan.frames {
            println!(
                "{}\t{}\t{}\t{}",
                frame.station,
                frame.resolution,
                frame.timestamp.to_rfc3339(),
                frame.key
            );
        }
        return Ok(());
    }

    let DatabaseArgs {
        database_url,
        max_connections,
        acquire_timeout_secs,
    } = &args.database;
    let pool = pool(
        database_url,
        *max_connections,
        Duration::from_secs(*acquire_timeout_secs),
    )?;
    let repo = PgFrameRepository::new(Arc::new(pool));
    let inserted = ingest::ingest(&repo, &scan.frames).await?;
    println!("inserted {inserted} rows");
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
