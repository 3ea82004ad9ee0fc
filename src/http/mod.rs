//! HTTP surface: live WebSocket transport plus the thin batch API
//!
//! - GET /stream - WebSocket upgrade for live audio/transcript streaming
//! - POST /recordings/transcribe - Batch transcribe an uploaded recording
//! - GET /recordings/:id/access - Time-limited access reference
//! - DELETE /recordings/:id - Remove a stored recording
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
