use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "frames")]
#[command(version, about = "Time-ranged lookups over the VLF frame catalog", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Serve the HTTP query API
    Serve(ServeArgs),
    /// Walk a mount tree and add every file found to the catalog
    Scan(ScanArgs),
}

#[derive(Args, Debug, Clone)]
pub(crate) struct DatabaseArgs {
    /// Postgres connection string of the catalog
    #[arg(long, env = "DATABASE_URL")]
    pub(crate) database_url: String,

    /// Upper bound on pooled connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 12)]
    pub(crate) max_connections: u32,

    /// Seconds to wait for a pooled connection before giving up
    #[arg(long, env = "DATABASE_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub(crate) acquire_timeout_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ServeArgs {
    /// Listening host
    #[arg(long, env = "FRAMES_HOST", default_value = "0.0.0.0")]
    pub(crate) host: String,

    /// Listening port
    #[arg(short, long, env = "FRAMES_PORT", default_value_t = 8000)]
    pub(crate) port: u16,

    /// Base URL of the file server that exposes the mount tree
    #[arg(long, env = "FILE_SERVER_URL", default_value = "http://localhost")]
    pub(crate) file_server_url: String,

    #[command(flatten)]
    pub(crate) database: DatabaseArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ScanArgs {
    /// Root of the mount tree, laid out as `<root>/<station>/<resolution>/...`
    #[arg(long, env = "MOUNT_BASE", default_value = "/mnt/vlf")]
    pub(crate) mount: PathBuf,

    /// Only scan these stations (repeatable)
    #[arg(long = "station")]
    pub(crate) stations: Vec<String>,

    /// Walk the tree and report what would be inserted
    #[arg(long)]
    pub(crate) dry_run: bool,

    #[command(flatten)]
    pub(crate) database: DatabaseArgs,
}
