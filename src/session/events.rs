use serde::{Deserialize, Serialize};

use crate::backend::RecognitionConfig;

/// A transcript unit delivered to the client over the live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// Transcribed text
    pub text: String,

    /// Whether the backend considers this text final
    pub is_final: bool,

    /// When the event was forwarded (RFC3339, UTC)
    pub timestamp: String,

    /// Speaker attribution of the last word, when diarization ran
    pub speaker_tag: Option<u32>,
}

/// Events delivered to the client over the outbound side of the connection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Transcript(TranscriptEvent),
    Error { message: String },
}

/// Messages processed by a session actor, strictly in arrival order.
///
/// Client-driven events and watchdog firings land in the same queue, so no
/// two transitions on one session ever run concurrently.
#[derive(Debug)]
pub enum SessionMsg {
    Start(RecognitionConfig),
    Audio(Vec<u8>),
    ForceFlush(String),
    Stop,
    Close,
    /// Silence watchdog fired; the generation guards against stale timers
    SilenceFired(u64),
    /// Duration watchdog fired
    DurationFired(u64),
}
