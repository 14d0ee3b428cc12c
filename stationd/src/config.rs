//! Station list loader.
//!
//! The station document is a small YAML-like format:
//!
//! ```text
//! # comment
//! Alpha:
//!   host: 10.8.0.2
//!   port: 2222
//!   username: vlf
//!   remote_base: C:\Data\VLF
//!   key_path: /keys/alpha
//! ```
//!
//! Only the recognized keys are read; anything else inside a station block is
//! skipped so newer documents keep loading. Problems local to one station
//! (a missing field, a bad port) reject that station only. Problems with the
//! shape of the document itself reject the whole load.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use indexmap::IndexMap;
use tracing::warn;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Always uses forward slashes.
    pub remote_base: String,
    pub key_path: PathBuf,
}

impl StationConfig {
    /// The `user@host:path` argument understood by sshfs.
    pub fn remote_target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.remote_base)
    }
}

/// Stations in document order, keyed by name.
pub type StationMap = IndexMap<String, StationConfig>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("station config `{path}` does not exist")]
    Missing { path: PathBuf },

    #[error("failed to read station config `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: station `{name}` is defined more than once")]
    DuplicateStation { name: String, line: usize },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("station `{station}` is missing required key `{field}`")]
    MissingField {
        station: String,
        field: &'static str,
    },

    #[error("station `{station}` has an invalid port `{value}`")]
    InvalidPort { station: String, value: String },

    #[error("line {line}: station name `{station}` must be a single path component")]
    InvalidName { station: String, line: usize },
}

impl ConfigError {
    /// The station a per-station error was recorded against.
    pub fn station(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { station, .. }
            | ConfigError::InvalidPort { station, .. }
            | ConfigError::InvalidName { station, .. } => Some(station),
            ConfigError::DuplicateStation { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Result of a successful load: the usable stations plus the ones that were
/// rejected on their own.
#[derive(Debug, Default)]
pub struct LoadedStations {
    pub stations: StationMap,
    pub rejected: Vec<ConfigError>,
}

/// Read and parse the station document at `path`.
pub fn load_stations(path: &Path, default_key: &Path) -> Result<LoadedStations, ConfigError> {
    let doc = match std::fs::read_to_string(path) {
        Ok(doc) => doc,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    parse_stations(&doc, default_key)
}

#[derive(Default)]
struct PendingStation {
    name: String,
    line: usize,
    key_indent: Option<usize>,
    host: Option<String>,
    port: Option<String>,
    username: Option<String>,
    remote_base: Option<String>,
    key_path: Option<String>,
}

impl PendingStation {
    fn new(name: &str, line: usize) -> Self {
        PendingStation {
            name: name.to_string(),
            line,
            ..Default::default()
        }
    }

    fn set(&mut self, key: &str, value: String) {
        let slot = match key {
            "host" => &mut self.host,
            "port" => &mut self.port,
            "username" => &mut self.username,
            "remote_base" => &mut self.remote_base,
            "key_path" => &mut self.key_path,
            _ => return,
        };
        *slot = (!value.is_empty()).then_some(value);
    }

    fn finish(self, default_key: &Path) -> Result<StationConfig, ConfigError> {
        if !is_valid_name(&self.name) {
            return Err(ConfigError::InvalidName {
                station: self.name,
                line: self.line,
            });
        }
        let missing = |field| ConfigError::MissingField {
            station: self.name.clone(),
            field,
        };
        let host = self.host.clone().ok_or_else(|| missing("host"))?;
        let username = self.username.clone().ok_or_else(|| missing("username"))?;
        let remote_base = self
            .remote_base
            .as_deref()
            .map(common::to_forward_slashes)
            .ok_or_else(|| missing("remote_base"))?;

        let port = match self.port.as_deref() {
            None => DEFAULT_SSH_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => {
                    return Err(ConfigError::InvalidPort {
                        station: self.name,
                        value: raw.to_string(),
                    });
                }
            },
        };

        let key_path = self
            .key_path
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| default_key.to_path_buf());

        Ok(StationConfig {
            name: self.name,
            host,
            port,
            username,
            remote_base,
            key_path,
        })
    }
}

/// Parse a station document.
pub fn parse_stations(doc: &str, default_key: &Path) -> Result<LoadedStations, ConfigError> {
    let mut loaded = LoadedStations::default();
    let mut seen = HashSet::new();
    let mut current: Option<PendingStation> = None;

    for (idx, raw) in doc.lines().enumerate() {
        let line = idx + 1;
        let raw = raw.trim_end_matches('\r');
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let indent = raw.len() - raw.trim_start().len();
        if indent > 0 {
            let nested = current
                .as_ref()
                .and_then(|station| station.key_indent)
                .is_some_and(|key_indent| indent > key_indent);
            if nested {
                // List items or maps under an unrecognized key.
                continue;
            }
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(ConfigError::Malformed {
                line,
                reason: format!("expected `key: value`, found `{trimmed}`"),
            });
        };
        let key = key.trim();
        let value = clean_value(value);

        if indent == 0 {
            if !value.is_empty() {
                return Err(ConfigError::Malformed {
                    line,
                    reason: format!(
                        "top-level key `{key}` has a value; station headers must end with `:`"
                    ),
                });
            }
            if key.is_empty() {
                return Err(ConfigError::Malformed {
                    line,
                    reason: "station name is empty".to_string(),
                });
            }
            if !seen.insert(key.to_string()) {
                return Err(ConfigError::DuplicateStation {
                    name: key.to_string(),
                    line,
                });
            }
            if let Some(pending) = current.replace(PendingStation::new(key, line)) {
                finish_into(&mut loaded, pending, default_key);
            }
            continue;
        }

        let Some(station) = current.as_mut() else {
            return Err(ConfigError::Malformed {
                line,
                reason: format!("indented key `{key}` appears before any station"),
            });
        };
        let key_indent = *station.key_indent.get_or_insert(indent);
        if indent < key_indent {
            return Err(ConfigError::Malformed {
                line,
                reason: format!(
                    "key `{key}` is indented by {indent}, expected {key_indent} as in the rest of station `{}`",
                    station.name
                ),
            });
        }
        station.set(key, value);
    }

    if let Some(pending) = current.take() {
        finish_into(&mut loaded, pending, default_key);
    }
    Ok(loaded)
}

fn finish_into(loaded: &mut LoadedStations, pending: PendingStation, default_key: &Path) {
    match pending.finish(default_key) {
        Ok(station) => {
            loaded.stations.insert(station.name.clone(), station);
        }
        Err(e) => {
            warn!("skipping station: {e}");
            loaded.rejected.push(e);
        }
    }
}

/// Station names become the last component of the mount path, so they must
/// not be able to leave the mount base.
fn is_valid_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Strip an inline ` # comment` and surrounding quotes from a raw value.
fn clean_value(raw: &str) -> String {
    let mut value = raw;
    if let Some(pos) = value.find(" #").or_else(|| value.find("\t#")) {
        value = &value[..pos];
    }
    let value = value.trim();
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && (bytes[0] == b'"' || bytes[0] == b'\'')
        && bytes[bytes.len() - 1] == bytes[0]
    {
        return value[1..value.len() - 1].to_string();
    }
    value.to_string()
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
