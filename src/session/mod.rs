//! Streaming session management
//!
//! This module provides the `StreamingSession` abstraction that manages:
//! - The per-connection lifecycle state machine (idle/active/restarting/closed)
//! - One exclusively-owned backend channel handle per session
//! - Silence and duration watchdogs driving silent channel rotation
//! - Outbound transcript/error delivery to the client connection
//! - The registry mapping connection identities to sessions

mod error;
mod events;
mod registry;
mod session;
mod watchdog;

pub use error::SessionError;
pub use events::{OutboundEvent, SessionMsg, TranscriptEvent};
pub use registry::SessionRegistry;
pub use session::{OutboundSender, SessionHandle, SessionTimeouts, StreamingSession};
