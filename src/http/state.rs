use std::sync::Arc;

use crate::backend::SpeechBackend;
use crate::session::SessionRegistry;
use crate::storage::RecordingStore;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live streaming sessions, one per WebSocket connection
    pub registry: Arc<SessionRegistry>,

    /// Speech backend used by the batch transcription path
    pub backend: Arc<dyn SpeechBackend>,

    /// Recording storage for the batch path
    pub store: Arc<RecordingStore>,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn SpeechBackend>,
        store: Arc<RecordingStore>,
    ) -> Self {
        Self {
            registry,
            backend,
            store,
        }
    }
}
