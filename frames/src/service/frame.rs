use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::frame::{Frame, FrameQuery, FrameRepository};
use crate::error::QueryError;
use crate::utils::state::AppState;
use crate::utils::validation::parse_timestamp;

/// Raw `/frames` query string. Every field is optional here so that a missing
/// parameter is reported as an invalid query, not as an extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct FrameParams {
    pub station: Option<String>,
    pub resolution: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl FrameParams {
    pub fn validate(self) -> Result<FrameQuery, QueryError> {
        let station = required("station", self.station)?;
        let resolution = required("resolution", self.resolution)?;
        let start = timestamp("start", self.start)?;
        let end = timestamp("end", self.end)?;
        if start > end {
            return Err(QueryError::Invalid(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(FrameQuery {
            station,
            resolution,
            start,
            end,
        })
    }
}

fn required(name: &str, value: Option<String>) -> Result<String, QueryError> {
    value.ok_or_else(|| QueryError::Invalid(format!("missing query parameter `{name}`")))
}

fn timestamp(name: &str, value: Option<String>) -> Result<DateTime<Utc>, QueryError> {
    let raw = required(name, value)?;
    parse_timestamp(&raw)
        .ok_or_else(|| QueryError::Invalid(format!("`{name}` is not a timestamp: {raw}")))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FrameView {
    pub station: String,
    pub resolution: String,
    pub timestamp: DateTime<Utc>,
    pub url: String,
}

impl FrameView {
    pub fn new(frame: Frame, file_server_url: &str) -> Self {
        let url = common::frame_url(file_server_url, &frame.resolution, &frame.key);
        FrameView {
            station: frame.station,
            resolution: frame.resolution,
            timestamp: frame.timestamp,
            url,
        }
    }
}

/// Frames in `[query.start, query.end]`, ascending, each with its file URL.
pub async fn list_frames(
    repo: &dyn FrameRepository,
    file_server_url: &str,
    query: &FrameQuery,
) -> Result<Vec<FrameView>, QueryError> {
    if query.start > query.end {
        return Err(QueryError::Invalid("start is after end".to_string()));
    }
    let frames = repo.list_frames(query).await?;
    tracing::debug!(
        station = %query.station,
        resolution = %query.resolution,
        count = frames.len(),
        "frame lookup"
    );
    Ok(frames
        .into_iter()
        .map(|frame| FrameView::new(frame, file_server_url))
        .collect())
}

pub async fn list_frames_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FrameParams>,
) -> Result<Json<Vec<FrameView>>, QueryError> {
    let query = params.validate()?;
    let frames = list_frames(
        state.frames.as_ref(),
        &state.config.file_server_url,
        &query,
    )
    .await?;
    Ok(Json(frames))
}
