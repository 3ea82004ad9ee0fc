use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::backend::SpeechBackend;

use super::session::{OutboundSender, SessionHandle, SessionTimeouts, StreamingSession};

/// Connection identity → streaming session, one entry per live connection.
///
/// Sessions are created lazily on the first start signal from a connection
/// and removed when the connection goes away. Sessions for different
/// connections share no mutable state, so lookups from one connection never
/// contend with another connection's traffic beyond the map lock itself.
pub struct SessionRegistry {
    backend: Arc<dyn SpeechBackend>,
    timeouts: SessionTimeouts,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn SpeechBackend>, timeouts: SessionTimeouts) -> Self {
        Self {
            backend,
            timeouts,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Session handle for a connection, spawning the session on first use.
    ///
    /// The write lock makes create-if-absent atomic: two racing calls for
    /// the same connection id can never spawn two sessions.
    pub async fn get_or_create(&self, conn_id: &str, outbound: OutboundSender) -> SessionHandle {
        let mut sessions = self.sessions.write().await;

        if let Some(handle) = sessions.get(conn_id) {
            return handle.clone();
        }

        let handle = StreamingSession::spawn(
            conn_id.to_string(),
            Arc::clone(&self.backend),
            outbound,
            self.timeouts,
        );
        sessions.insert(conn_id.to_string(), handle.clone());

        info!("Registered session for connection {}", conn_id);

        handle
    }

    /// Look up an existing session without creating one.
    pub async fn get(&self, conn_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(conn_id).cloned()
    }

    /// Close and remove the session for a gone connection. Safe to call
    /// for unknown ids and safe to call twice.
    pub async fn close(&self, conn_id: &str) {
        let handle = self.sessions.write().await.remove(conn_id);

        if let Some(handle) = handle {
            // A send failure just means the actor already shut down
            let _ = handle.close();
            info!("Removed session for connection {}", conn_id);
        }
    }

    /// Number of live sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
