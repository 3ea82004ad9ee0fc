//! Speech recognition backend capability.
//!
//! Sessions consume the backend through the `SpeechBackend` trait so tests
//! can substitute an instrumented double. The shipped implementation speaks
//! newline-delimited JSON over TCP to a recognizer service.

mod client;
mod types;

pub use client::{SpeechBackend, StreamHandle, TcpSpeechBackend};
pub use types::{BackendEvent, RawRecognitionResult, RecognitionConfig, WordInfo};
