use std::sync::Mutex;

use crate::domain::frame::{Frame, FrameQuery, FrameRepository};
use crate::error::QueryError;

/// Catalog kept in a vector, for handler and ingest tests.
#[derive(Default)]
pub struct MemoryFrameRepository {
    frames: Mutex<Vec<Frame>>,
    unavailable: bool,
}

impl MemoryFrameRepository {
    pub fn with_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames: Mutex::new(frames),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl FrameRepository for MemoryFrameRepository {
    async fn list_frames(&self, query: &FrameQuery) -> Result<Vec<Frame>, QueryError> {
        if self.unavailable {
            return Err(QueryError::Unavailable("connection refused".to_string()));
        }
        let mut found: Vec<Frame> = self
            .frames
            .lock()
            .unwrap()
            .iter()
            .filter(|frame| matches(query, frame))
            .cloned()
            .collect();
        found.sort_by_key(|frame| frame.timestamp);
        Ok(found)
    }

    async fn insert_frames(&self, frames: &[Frame]) -> Result<u64, QueryError> {
        if self.unavailable {
            return Err(QueryError::Unavailable("connection refused".to_string()));
        }
        let mut stored = self.frames.lock().unwrap();
        let mut inserted = 0;
        for frame in frames {
            let exists = stored.iter().any(|f| {
                f.station == frame.station
                    && f.resolution == frame.resolution
                    && f.timestamp == frame.timestamp
            });
            if !exists {
                stored.push(frame.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

fn matches(query: &FrameQuery, frame: &Frame) -> bool {
    frame.station == query.station
        && frame.resolution == query.resolution
        && frame.timestamp >= query.start
        && frame.timestamp <= query.end
}
