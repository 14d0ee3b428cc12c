use chrono::{DateTime, Utc};
use common::Resolution;
use sqlx::FromRow;

/// One catalogued file.
///
/// `(station, resolution, timestamp)` is unique in the catalog. `key` is the
/// path of the file below `<station>/<resolution>/` on the file server.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Frame {
    pub station: String,
    pub resolution: String,
    pub timestamp: DateTime<Utc>,
    pub key: String,
}

impl Frame {
    pub fn new(
        station: &str,
        resolution: Resolution,
        timestamp: DateTime<Utc>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            station: station.to_owned(),
            resolution: resolution.as_str().to_owned(),
            timestamp,
            key: key.into(),
        }
    }
}

/// A validated range lookup: both bounds inclusive, `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameQuery {
    pub station: String,
    pub resolution: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
