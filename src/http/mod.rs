//! HTTP API for the UI layer
//!
//! This module exposes the call controller as a small JSON API:
//! - POST /call/start - Place the call
//! - POST /call/stop - Hang up (always succeeds)
//! - GET /call/status - Current call snapshot
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
