//! Mount supervisor.
//!
//! Every station gets its own task, which is the only writer of that
//! station's [`MountState`]. The task performs the initial mount, then wakes
//! on every liveness tick to verify the mount and repair it when it is gone.
//! Since attempts and checks for a station all run inside that one task, they
//! can never overlap. Snapshots of each state are published on a `watch`
//! channel so health reporting can read them without locking.
//!
//! A coordinator task collects the outcome of each station's first attempt
//! to decide the supervisor phase: [`SupervisorPhase::Running`] when at least
//! one station mounted, [`SupervisorPhase::Degraded`] otherwise.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{StationConfig, StationMap};
use crate::driver::{MountDriver, MountError};

pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    Unmounted,
    Mounting,
    Mounted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountState {
    pub station: String,
    pub mount_path: PathBuf,
    pub status: MountStatus,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Once set, the station is checked on every liveness tick forever.
    pub ever_mounted: bool,
    pub last_error: Option<String>,
}

impl MountState {
    fn new(station: &str, mount_path: PathBuf) -> Self {
        MountState {
            station: station.to_string(),
            mount_path,
            status: MountStatus::Unmounted,
            last_attempt: None,
            consecutive_failures: 0,
            ever_mounted: false,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorPhase {
    /// Initial mount attempts are still running.
    Starting,
    /// At least one station is (or was) mounted.
    Running,
    /// No station mounted at startup. The process stays up for inspection
    /// but has nothing to serve.
    Degraded,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub mount_base: PathBuf,
    pub mount_timeout: Duration,
    pub liveness_interval: Duration,
    /// Also retry stations that have never mounted on every tick.
    pub retry_failed: bool,
    pub unmount_on_shutdown: bool,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        SupervisorOptions {
            mount_base: PathBuf::from("/mnt/vlf"),
            mount_timeout: DEFAULT_MOUNT_TIMEOUT,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            retry_failed: false,
            unmount_on_shutdown: true,
        }
    }
}

impl SupervisorOptions {
    pub fn mount_path(&self, station: &str) -> PathBuf {
        self.mount_base.join(station)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub phase: SupervisorPhase,
    pub stations: Vec<MountState>,
}

impl HealthReport {
    pub fn mounted(&self) -> usize {
        self.stations
            .iter()
            .filter(|s| s.status == MountStatus::Mounted)
            .count()
    }
}

pub struct Supervisor {
    stations: StationMap,
    driver: Arc<dyn MountDriver>,
    options: SupervisorOptions,
}

impl Supervisor {
    pub fn new(
        stations: StationMap,
        driver: Arc<dyn MountDriver>,
        options: SupervisorOptions,
    ) -> Self {
        Supervisor {
            stations,
            driver,
            options,
        }
    }

    /// Spawn the coordinator and one task per station. Everything stops when
    /// `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> SupervisorTasks {
        let (phase_tx, phase_rx) = watch::channel(SupervisorPhase::Starting);
        let (report_tx, report_rx) = mpsc::channel(self.stations.len().max(1));
        let mut tasks = JoinSet::new();
        let mut receivers = Vec::with_capacity(self.stations.len());

        let names: HashSet<String> = self.stations.keys().cloned().collect();
        for station in self.stations.into_values() {
            let mount_path = self.options.mount_path(&station.name);
            let (state_tx, state_rx) = watch::channel(MountState::new(&station.name, mount_path));
            receivers.push(state_rx);

            let worker = StationWorker::new(station, self.driver.clone(), self.options.clone(), state_tx);
            tasks.spawn(worker.run(report_tx.clone(), shutdown.clone()));
        }
        drop(report_tx);

        tasks.spawn(coordinate(report_rx, names, phase_tx, shutdown));

        SupervisorTasks {
            handle: SupervisorHandle {
                phase: phase_rx,
                stations: Arc::new(receivers),
            },
            tasks,
        }
    }
}

/// The running supervisor: a handle for health queries plus the tasks to
/// await on shutdown.
pub struct SupervisorTasks {
    handle: SupervisorHandle,
    tasks: JoinSet<()>,
}

impl SupervisorTasks {
    pub fn handle(&self) -> SupervisorHandle {
        self.handle.clone()
    }

    /// Wait for every supervisor task to finish.
    pub async fn join(mut self) {
        while let Some(res) = self.tasks.join_next().await {
            if let Err(e) = res {
                error!("supervisor task failed: {e}");
            }
        }
    }
}

/// Read-only view of the supervisor, cheap to clone.
#[derive(Clone)]
pub struct SupervisorHandle {
    phase: watch::Receiver<SupervisorPhase>,
    stations: Arc<Vec<watch::Receiver<MountState>>>,
}

impl SupervisorHandle {
    pub fn phase(&self) -> SupervisorPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SupervisorPhase> {
        self.phase.clone()
    }

    pub fn station(&self, name: &str) -> Option<MountState> {
        self.subscribe(name).map(|rx| rx.borrow().clone())
    }

    pub fn subscribe(&self, name: &str) -> Option<watch::Receiver<MountState>> {
        self.stations
            .iter()
            .find(|rx| rx.borrow().station == name)
            .cloned()
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            phase: self.phase(),
            stations: self.stations.iter().map(|rx| rx.borrow().clone()).collect(),
        }
    }
}

#[derive(Debug)]
struct StationReport {
    station: String,
    status: MountStatus,
}

async fn coordinate(
    mut reports: mpsc::Receiver<StationReport>,
    mut pending: HashSet<String>,
    phase: watch::Sender<SupervisorPhase>,
    shutdown: CancellationToken,
) {
    let total = pending.len();
    let mut mounted = 0usize;

    while !pending.is_empty() {
        tokio::select! {
            _ = shutdown.cancelled() => {
                phase.send_replace(SupervisorPhase::Stopped);
                return;
            }
            report = reports.recv() => match report {
                Some(report) => {
                    if pending.remove(&report.station) && report.status == MountStatus::Mounted {
                        mounted += 1;
                    }
                }
                None => break,
            }
        }
    }

    if mounted == 0 {
        warn!("none of {total} stations could be mounted; staying up in degraded mode");
        phase.send_replace(SupervisorPhase::Degraded);
    } else {
        info!("{mounted} of {total} stations mounted");
        phase.send_replace(SupervisorPhase::Running);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            report = reports.recv() => match report {
                Some(report) => {
                    if report.status == MountStatus::Mounted
                        && *phase.borrow() == SupervisorPhase::Degraded
                    {
                        info!(station = %report.station, "station mounted, leaving degraded mode");
                        phase.send_replace(SupervisorPhase::Running);
                    }
                }
                None => {
                    // No station tasks left, which happens with an empty
                    // station list. Stay in the current phase until shutdown.
                    shutdown.cancelled().await;
                    break;
                }
            }
        }
    }
    phase.send_replace(SupervisorPhase::Stopped);
}

struct StationWorker {
    station: StationConfig,
    driver: Arc<dyn MountDriver>,
    options: SupervisorOptions,
    state: MountState,
    publisher: watch::Sender<MountState>,
}

impl StationWorker {
    fn new(
        station: StationConfig,
        driver: Arc<dyn MountDriver>,
        options: SupervisorOptions,
        publisher: watch::Sender<MountState>,
    ) -> Self {
        let state = publisher.borrow().clone();
        StationWorker {
            station,
            driver,
            options,
            state,
            publisher,
        }
    }

    async fn run(mut self, reports: mpsc::Sender<StationReport>, shutdown: CancellationToken) {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = self.attempt_mount() => {}
        }
        self.report(&reports).await;

        let period = self.options.liveness_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let before = self.state.status;
                    self.tick().await;
                    if self.state.status != before {
                        self.report(&reports).await;
                    }
                }
            }
        }

        if self.options.unmount_on_shutdown && self.state.ever_mounted {
            self.release().await;
        }
    }

    async fn report(&self, reports: &mpsc::Sender<StationReport>) {
        let _ = reports
            .send(StationReport {
                station: self.station.name.clone(),
                status: self.state.status,
            })
            .await;
    }

    fn mount_path(&self) -> &Path {
        &self.state.mount_path
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }

    fn set_status(&mut self, status: MountStatus) {
        self.state.status = status;
        self.publish();
    }

    /// One liveness check. Healthy mounts are left alone; lost ones are
    /// unmounted and mounted again right away.
    async fn tick(&mut self) {
        if !self.state.ever_mounted {
            if self.options.retry_failed {
                self.attempt_mount().await;
            }
            return;
        }

        if self.state.status == MountStatus::Mounted {
            if self.driver.is_alive(self.mount_path()).await {
                return;
            }
            warn!(station = %self.station.name, "mount at {} was lost", self.mount_path().display());
            self.set_status(MountStatus::Unmounted);
        }

        if let Err(e) = self.driver.unmount(self.mount_path()).await {
            warn!(station = %self.station.name, "cleanup before remount failed: {e}");
        }
        self.attempt_mount().await;
    }

    #[tracing::instrument(level = "debug", skip_all, fields(station = %self.station.name))]
    async fn attempt_mount(&mut self) {
        self.state.last_attempt = Some(Utc::now());
        self.set_status(MountStatus::Mounting);

        let path = self.mount_path().to_path_buf();
        if let Err(e) = tokio::fs::create_dir_all(&path).await {
            self.on_failure(&format!("cannot create {}: {e}", path.display()))
                .await;
            return;
        }

        let timeout = self.options.mount_timeout;
        let result = match tokio::time::timeout(
            timeout,
            self.driver.mount(&self.station, &path, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MountError::Timeout {
                path: path.clone(),
                timeout,
            }),
        };

        match result {
            Ok(()) => {
                if self.driver.is_alive(&path).await {
                    self.on_mounted();
                } else {
                    self.on_failure("mount command succeeded but the path is not an active mount")
                        .await;
                }
            }
            Err(e) if e.is_timeout() => {
                // The command was abandoned; make sure nothing it may still
                // attach later is mistaken for a healthy mount.
                if let Err(cleanup) = self.driver.unmount(&path).await {
                    debug!("unmount after timeout failed: {cleanup}");
                }
                self.on_failure(&e.to_string()).await;
            }
            Err(e) => {
                if self.driver.is_alive(&path).await {
                    warn!("mount reported `{e}` but {} is mounted; keeping it", path.display());
                    self.on_mounted();
                } else {
                    self.on_failure(&e.to_string()).await;
                }
            }
        }
    }

    fn on_mounted(&mut self) {
        info!(station = %self.station.name, "mounted {} on {}", self.station.remote_target(), self.mount_path().display());
        self.state.consecutive_failures = 0;
        self.state.ever_mounted = true;
        self.state.last_error = None;
        self.set_status(MountStatus::Mounted);
    }

    async fn on_failure(&mut self, reason: &str) {
        error!(
            station = %self.station.name,
            failures = self.state.consecutive_failures + 1,
            "mount failed: {reason}"
        );
        self.state.consecutive_failures += 1;
        self.state.last_error = Some(reason.to_string());

        // Only removes the directory when it is empty.
        if let Err(e) = tokio::fs::remove_dir(self.mount_path()).await {
            debug!("left {} in place: {e}", self.mount_path().display());
        }

        let status = if self.state.ever_mounted {
            MountStatus::Unmounted
        } else {
            MountStatus::Failed
        };
        self.set_status(status);
    }

    async fn release(&mut self) {
        match self.driver.unmount(self.mount_path()).await {
            Ok(()) => {
                info!(station = %self.station.name, "unmounted {}", self.mount_path().display());
                self.set_status(MountStatus::Unmounted);
            }
            Err(e) => warn!(station = %self.station.name, "unmount on shutdown failed: {e}"),
        }
    }
}
