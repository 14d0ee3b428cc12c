pub mod config;
pub mod driver;
pub mod memory;
pub mod mounts;
pub mod status;
pub mod supervisor;

// re-export selected public API
pub use config::{ConfigError, LoadedStations, StationConfig, StationMap, load_stations};
pub use driver::{MountDriver, MountError, SshfsDriver};
pub use supervisor::{
    HealthReport, MountState, MountStatus, Supervisor, SupervisorHandle, SupervisorOptions,
    SupervisorPhase,
};
