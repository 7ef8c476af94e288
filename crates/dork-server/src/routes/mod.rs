//! Route modules, one per subsystem. Each exposes a `router() -> Router<AppState>`
//! merged into the top-level router in [`crate::DorkServer::router`].

pub mod git;
pub mod logs;
pub mod mesh;
pub mod pulse;
pub mod relay;
pub mod sessions;
