use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::service::frame::list_frames_handler;
use crate::service::health;
use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/frames", get(list_frames_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use common::Resolution;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::domain::frame::memory::MemoryFrameRepository;
    use crate::domain::frame::{Frame, FrameRepository};

    fn config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8000,
            file_server_url: "http://files.vlf".to_string(),
            db_url: "postgres://vlf@db/vlf".to_string(),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(1),
        }
    }

    fn app(repo: impl FrameRepository + 'static) -> Router {
        create_router(Arc::new(AppState::with_repository(
            config(),
            Arc::new(repo),
        )))
    }

    fn three_frames() -> MemoryFrameRepository {
        let t = |minute| Utc.with_ymd_and_hms(2025, 4, 10, 14, minute, 0).unwrap();
        MemoryFrameRepository::with_frames(vec![
            Frame::new("Alpha", Resolution::LoRes, t(0), "Alpha/2025-04-10/1400.jpg"),
            Frame::new("Alpha", Resolution::LoRes, t(1), "Alpha/2025-04-10/1401.jpg"),
            Frame::new("Alpha", Resolution::LoRes, t(2), "Alpha/2025-04-10/1402.jpg"),
        ])
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(app(MemoryFrameRepository::default()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_frames_in_range() {
        let (status, body) = get(
            app(three_frames()),
            "/frames?station=Alpha&resolution=LoRes\
             &start=2025-04-10T14:00:00Z&end=2025-04-10T14:01:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let frames = body.as_array().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["station"], "Alpha");
        assert_eq!(frames[0]["resolution"], "LoRes");
        assert_eq!(frames[0]["timestamp"], "2025-04-10T14:00:00Z");
        assert_eq!(
            frames[0]["url"],
            "http://files.vlf/files/LoRes/Alpha/2025-04-10/1400.jpg"
        );
        assert_eq!(frames[1]["timestamp"], "2025-04-10T14:01:00Z");
    }

    #[tokio::test]
    async fn test_single_instant_range() {
        let (status, body) = get(
            app(three_frames()),
            "/frames?station=Alpha&resolution=LoRes\
             &start=2025-04-10T14:02:00&end=2025-04-10T14:02:00",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let frames = body.as_array().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["timestamp"], "2025-04-10T14:02:00Z");
    }

    #[tokio::test]
    async fn test_unknown_resolution_is_empty() {
        let (status, body) = get(
            app(three_frames()),
            "/frames?station=Alpha&resolution=MidRes\
             &start=2025-04-10T00:00:00Z&end=2025-04-11T00:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_reversed_range_is_bad_request() {
        let (status, body) = get(
            app(three_frames()),
            "/frames?station=Alpha&resolution=LoRes\
             &start=2025-04-10T14:02:00Z&end=2025-04-10T14:00:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_bad_request() {
        let (status, body) = get(app(three_frames()), "/frames?station=Alpha").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid");
        assert!(body["message"].as_str().unwrap().contains("resolution"));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_service_unavailable() {
        let (status, body) = get(
            app(MemoryFrameRepository::unavailable()),
            "/frames?station=Alpha&resolution=LoRes\
             &start=2025-04-10T14:00:00Z&end=2025-04-10T14:01:00Z",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "unavailable");
    }
}
