use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use stationd::{SshfsDriver, SupervisorOptions};

#[derive(Parser, Debug)]
#[command(name = "stationd")]
#[command(version, about = "Mount remote VLF stations over sshfs and keep them mounted", long_about = None)]
pub(crate) struct Args {
    /// Station list document
    #[arg(short, long, env = "STATIONS_CONFIG", default_value = "ssh/stations.yaml")]
    pub(crate) config: PathBuf,

    /// Directory under which each station is mounted as `<mount-base>/<station>`
    #[arg(long, env = "MOUNT_BASE", default_value = "/mnt/vlf")]
    pub(crate) mount_base: PathBuf,

    /// Identity file for stations without their own `key_path`
    /// [default: ~/.ssh/id_rsa]
    #[arg(long, env = "SSH_KEY_PATH")]
    pub(crate) key_path: Option<PathBuf>,

    /// Seconds a single mount attempt may take
    #[arg(
        long,
        env = "MOUNT_TIMEOUT_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub(crate) mount_timeout_secs: u64,

    /// Seconds between liveness checks
    #[arg(
        long,
        env = "LIVENESS_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub(crate) liveness_interval_secs: u64,

    /// Seconds a liveness probe may wait for a mount to answer
    #[arg(
        long,
        env = "PROBE_TIMEOUT_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub(crate) probe_timeout_secs: u64,

    /// Address of the status endpoints
    #[arg(long, env = "STATUS_ADDR", default_value = "0.0.0.0:9100")]
    pub(crate) status_addr: SocketAddr,

    /// Keep retrying stations that have never mounted on every liveness tick.
    /// Off by default: a station that fails its first mount stays Failed
    /// until stationd restarts, while stations that mounted once are always
    /// remounted after a loss.
    #[arg(long, env = "RETRY_FAILED")]
    pub(crate) retry_failed: bool,

    /// Leave mounts in place when stationd exits
    #[arg(long)]
    pub(crate) keep_mounts: bool,

    /// sshfs executable
    #[arg(long, env = "SSHFS_BIN", default_value = "sshfs")]
    pub(crate) sshfs: PathBuf,

    /// fusermount executable used to unmount
    #[arg(long, env = "FUSERMOUNT_BIN", default_value = "fusermount")]
    pub(crate) fusermount: PathBuf,

    /// Use an in-memory driver instead of sshfs
    #[arg(long)]
    pub(crate) dry_run: bool,
}

impl Args {
    pub(crate) fn default_key(&self) -> PathBuf {
        self.key_path
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(".ssh").join("id_rsa")))
            .unwrap_or_else(|| PathBuf::from("/root/.ssh/id_rsa"))
    }

    pub(crate) fn sshfs_driver(&self) -> SshfsDriver {
        SshfsDriver::new(&self.sshfs, &self.fusermount)
            .with_probe_timeout(Duration::from_secs(self.probe_timeout_secs))
    }

    pub(crate) fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            mount_base: self.mount_base.clone(),
            mount_timeout: Duration::from_secs(self.mount_timeout_secs),
            liveness_interval: Duration::from_secs(self.liveness_interval_secs),
            retry_failed: self.retry_failed,
            unmount_on_shutdown: !self.keep_mounts,
        }
    }
}
