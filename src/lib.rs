pub mod backend;
pub mod config;
pub mod diarize;
pub mod http;
pub mod session;
pub mod storage;

pub use backend::{
    BackendEvent, RawRecognitionResult, RecognitionConfig, SpeechBackend, StreamHandle,
    TcpSpeechBackend, WordInfo,
};
pub use config::Config;
pub use diarize::{merge_segments, TranscriptSegment};
pub use http::{create_router, AppState};
pub use session::{
    OutboundEvent, OutboundSender, SessionError, SessionHandle, SessionRegistry, SessionTimeouts,
    StreamingSession, TranscriptEvent,
};
pub use storage::{AccessRef, RecordingStore};
