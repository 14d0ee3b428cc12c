//! In-memory mount driver.
//!
//! Pretends to mount stations without touching the system. Used by
//! `stationd --dry-run` to exercise the supervisor and status surface on a
//! machine without sshfs, and by the test suites to script failures.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::StationConfig;
use crate::driver::{MountDriver, MountError};

#[derive(Debug, Default)]
pub struct MemoryDriver {
    mounted: Mutex<HashSet<PathBuf>>,
    unreachable: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    silent: Mutex<HashSet<String>>,
    mount_calls: AtomicUsize,
    unmount_calls: AtomicUsize,
}

fn toggle(set: &Mutex<HashSet<String>>, station: &str, on: bool) {
    let mut set = set.lock().unwrap_or_else(|e| e.into_inner());
    if on {
        set.insert(station.to_string());
    } else {
        set.remove(station);
    }
}

fn contains(set: &Mutex<HashSet<String>>, station: &str) -> bool {
    set.lock()
        .unwrap_or_else(|e| e.into_inner())
        .contains(station)
}

impl MemoryDriver {
    /// Make mounts of `station` fail with a connection error.
    pub fn set_reachable(&self, station: &str, reachable: bool) {
        toggle(&self.unreachable, station, !reachable);
    }

    /// Make mounts of `station` never complete.
    pub fn set_hanging(&self, station: &str, hanging: bool) {
        toggle(&self.hanging, station, hanging);
    }

    /// Make mounts of `station` report success without mounting anything.
    pub fn set_silent(&self, station: &str, silent: bool) {
        toggle(&self.silent, station, silent);
    }

    /// Simulate the remote end going away under an established mount.
    pub fn drop_connection(&self, local: &Path) {
        self.mounted_set().remove(local);
    }

    pub fn is_mounted(&self, local: &Path) -> bool {
        self.mounted_set().contains(local)
    }

    pub fn mount_calls(&self) -> usize {
        self.mount_calls.load(Ordering::SeqCst)
    }

    pub fn unmount_calls(&self) -> usize {
        self.unmount_calls.load(Ordering::SeqCst)
    }

    fn mounted_set(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.mounted.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MountDriver for MemoryDriver {
    async fn mount(
        &self,
        station: &StationConfig,
        local: &Path,
        _timeout: Duration,
    ) -> Result<(), MountError> {
        self.mount_calls.fetch_add(1, Ordering::SeqCst);

        if contains(&self.hanging, &station.name) {
            return std::future::pending().await;
        }
        if contains(&self.unreachable, &station.name) {
            return Err(MountError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} is unreachable", station.host),
            )));
        }
        if !contains(&self.silent, &station.name) {
            self.mounted_set().insert(local.to_path_buf());
        }
        Ok(())
    }

    async fn is_alive(&self, local: &Path) -> bool {
        self.is_mounted(local)
    }

    async fn unmount(&self, local: &Path) -> Result<(), MountError> {
        self.unmount_calls.fetch_add(1, Ordering::SeqCst);
        self.mounted_set().remove(local);
        Ok(())
    }
}
