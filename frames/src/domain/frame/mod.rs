mod model;
mod repository;

#[cfg(test)]
pub mod memory;

pub use model::{Frame, FrameQuery};
pub use repository::{FrameRepository, PgFrameRepository};
