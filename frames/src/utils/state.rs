use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::domain::frame::{FrameRepository, PgFrameRepository};

#[derive(Clone)]
pub struct AppState {
    pub frames: Arc<dyn FrameRepository>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, pool: Arc<PgPool>) -> Self {
        AppState {
            frames: Arc::new(PgFrameRepository::new(pool)),
            config: Arc::new(config),
        }
    }

    #[cfg(test)]
    pub fn with_repository(config: Config, frames: Arc<dyn FrameRepository>) -> Self {
        AppState {
            frames,
            config: Arc::new(config),
        }
    }
}
