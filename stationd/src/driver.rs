//! sshfs mount driver.
//!
//! The driver is stateless: every call shells out or reads the mount table
//! and reports what it saw. Deciding what an outcome means for a station is
//! the supervisor's job.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::StationConfig;
use crate::mounts;

const SSH_OPTIONS: &[&str] = &[
    // Stations are only reachable over the already-authenticated VPN.
    "StrictHostKeyChecking=no",
    "UserKnownHostsFile=/dev/null",
    "reconnect",
    "ServerAliveInterval=15",
    "ServerAliveCountMax=3",
    "BatchMode=yes",
];

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mounting {path} timed out after {timeout:?}")]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} is still mounted after unmount")]
    StillMounted { path: PathBuf },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MountError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MountError::Timeout { .. })
    }
}

#[async_trait]
pub trait MountDriver: Send + Sync {
    /// Mount `station`'s remote base on `local`, giving up after `timeout`.
    async fn mount(
        &self,
        station: &StationConfig,
        local: &Path,
        timeout: Duration,
    ) -> Result<(), MountError>;

    /// Whether `local` is an active, responsive mount point.
    async fn is_alive(&self, local: &Path) -> bool;

    /// Detach whatever is mounted on `local`. Succeeds if nothing is.
    async fn unmount(&self, local: &Path) -> Result<(), MountError>;
}

#[derive(Debug, Clone)]
pub struct SshfsDriver {
    sshfs: PathBuf,
    fusermount: PathBuf,
    probe_timeout: Duration,
}

impl Default for SshfsDriver {
    fn default() -> Self {
        SshfsDriver {
            sshfs: PathBuf::from("sshfs"),
            fusermount: PathBuf::from("fusermount"),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

impl SshfsDriver {
    pub fn new(sshfs: impl Into<PathBuf>, fusermount: impl Into<PathBuf>) -> Self {
        SshfsDriver {
            sshfs: sshfs.into(),
            fusermount: fusermount.into(),
            ..Default::default()
        }
    }

    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// How long `is_alive` waits for a mount to answer a `stat`.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    async fn lazy_unmount(&self, local: &Path) -> Result<(), MountError> {
        let path = local.to_path_buf();
        tokio::task::spawn_blocking(move || detach(&path))
            .await
            .map_err(io::Error::other)??;
        Ok(())
    }
}

/// Arguments for `sshfs` mounting `station` on `local`.
pub fn sshfs_args(station: &StationConfig, local: &Path) -> Vec<OsString> {
    let mut options = SSH_OPTIONS.join(",");
    options.push_str(",IdentityFile=");
    options.push_str(&station.key_path.to_string_lossy());

    vec![
        station.remote_target().into(),
        local.as_os_str().to_owned(),
        "-p".into(),
        station.port.to_string().into(),
        "-o".into(),
        options.into(),
    ]
}

#[async_trait]
impl MountDriver for SshfsDriver {
    async fn mount(
        &self,
        station: &StationConfig,
        local: &Path,
        timeout: Duration,
    ) -> Result<(), MountError> {
        let program = self.sshfs.display().to_string();
        debug!(station = %station.name, target = %station.remote_target(), "running {program}");

        let child = Command::new(&self.sshfs)
            .args(sshfs_args(station, local))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MountError::Spawn {
                program: program.clone(),
                source,
            })?;

        // Dropping the child on timeout kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(MountError::Timeout {
                    path: local.to_path_buf(),
                    timeout,
                });
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(MountError::Command {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn is_alive(&self, local: &Path) -> bool {
        match mounts::is_mount_point(local).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!("failed to read mount table: {e}");
                return false;
            }
        }

        // A FUSE mount whose sshfs process died stays in the mount table but
        // fails every access with ENOTCONN.
        match tokio::time::timeout(self.probe_timeout, tokio::fs::metadata(local)).await {
            Ok(Ok(meta)) => meta.is_dir(),
            Ok(Err(e)) => {
                debug!("probe of {} failed: {e}", local.display());
                false
            }
            Err(_) => {
                warn!(
                    "probe of {} did not answer within {:?}",
                    local.display(),
                    self.probe_timeout
                );
                false
            }
        }
    }

    async fn unmount(&self, local: &Path) -> Result<(), MountError> {
        if !mounts::is_mount_point(local).await? {
            return Ok(());
        }

        let program = self.fusermount.display().to_string();
        match Command::new(&self.fusermount)
            .arg("-u")
            .arg("-z")
            .arg(local)
            .stdin(Stdio::null())
            .output()
            .await
        {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                warn!(
                    "`{program}` failed on {}: {}; falling back to lazy unmount",
                    local.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                self.lazy_unmount(local).await?;
            }
            Err(e) => {
                warn!("failed to run `{program}`: {e}; falling back to lazy unmount");
                self.lazy_unmount(local).await?;
            }
        }

        if mounts::is_mount_point(local).await? {
            return Err(MountError::StillMounted {
                path: local.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn detach(path: &Path) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::mount::{MntFlags, umount2};

    match umount2(path, MntFlags::MNT_DETACH) {
        // Already gone.
        Ok(()) | Err(Errno::EINVAL) | Err(Errno::ENOENT) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(target_os = "linux"))]
fn detach(_path: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "lazy unmount is only supported on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> StationConfig {
        StationConfig {
            name: "Alpha".to_string(),
            host: "10.8.0.2".to_string(),
            port: 2222,
            username: "vlf".to_string(),
            remote_base: "C:/Data/VLF".to_string(),
            key_path: PathBuf::from("/keys/alpha"),
        }
    }

    #[test]
    fn test_sshfs_args() {
        let args = sshfs_args(&station(), Path::new("/mnt/vlf/Alpha"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args[0], "vlf@10.8.0.2:C:/Data/VLF");
        assert_eq!(args[1], "/mnt/vlf/Alpha");
        assert_eq!(&args[2..4], &["-p", "2222"]);
        assert_eq!(args[4], "-o");
        let options: Vec<&str> = args[5].split(',').collect();
        assert!(options.contains(&"StrictHostKeyChecking=no"));
        assert!(options.contains(&"reconnect"));
        assert!(options.contains(&"IdentityFile=/keys/alpha"));
    }

    #[tokio::test]
    async fn test_mount_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-sshfs");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        make_executable(&script);

        let driver = SshfsDriver::new(&script, "fusermount");
        let started = std::time::Instant::now();
        let err = driver
            .mount(&station(), dir.path(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_mount_reports_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("failing-sshfs");
        std::fs::write(&script, "#!/bin/sh\necho 'connection refused' >&2\nexit 1\n").unwrap();
        make_executable(&script);

        let driver = SshfsDriver::new(&script, "fusermount");
        let err = driver
            .mount(&station(), dir.path(), Duration::from_secs(10))
            .await
            .unwrap_err();
        match err {
            MountError::Command { stderr, .. } => assert_eq!(stderr, "connection refused"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let driver = SshfsDriver::new(dir.path().join("no-such-sshfs"), "fusermount");
        let err = driver
            .mount(&station(), dir.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, MountError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_stale_directory_is_not_alive_and_unmount_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("Alpha");
        std::fs::create_dir(&stale).unwrap();
        std::fs::write(stale.join("old.jpg"), b"x").unwrap();

        let driver = SshfsDriver::default();
        assert!(!driver.is_alive(&stale).await);
        driver.unmount(&stale).await.unwrap();
        driver.unmount(&stale).await.unwrap();
    }

    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).unwrap();
    }
}
