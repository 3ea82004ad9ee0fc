use super::state::AppState;
use crate::backend::RecognitionConfig;
use crate::diarize::{merge_segments, TranscriptSegment};
use crate::session::{OutboundEvent, SessionError};
use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Inbound frames on the live streaming socket
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    /// Begin (or replace) a streaming session
    Start { config: RecognitionConfig },

    /// One audio chunk, base64-encoded PCM
    Audio { pcm: String },

    /// Commit an in-flight partial transcript as final
    ForceFlush { transcript: String },

    /// Tear down the session but keep the connection
    Stop,
}

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub audio_reference: String,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub audio_reference: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn generic_error() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
        }),
    )
}

fn not_found(id: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("recording {} not found", id),
        }),
    )
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
    })
}

// ============================================================================
// Live streaming transport
// ============================================================================

/// GET /stream
/// WebSocket upgrade for the live audio/transcript channel
pub async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = format!("conn-{}", uuid::Uuid::new_v4());
    info!("Connection {} established", conn_id);

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundEvent>();

    // Outbound pump: session events -> socket
    let send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Failed to serialize outbound event: {}", e);
                    continue;
                }
            };
            if ws_tx.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Connection {}: socket error: {}", conn_id, e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                let frame = match serde_json::from_str::<InboundFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Connection {}: malformed frame: {}", conn_id, e);
                        let _ = out_tx.send(OutboundEvent::Error {
                            message: format!("malformed frame: {}", e),
                        });
                        continue;
                    }
                };
                handle_frame(&state, &conn_id, &out_tx, frame).await;
            }
            // Raw binary frames are audio chunks without the JSON envelope
            Message::Binary(bytes) => {
                let session = state.registry.get_or_create(&conn_id, out_tx.clone()).await;
                let _ = session.write_audio(bytes);
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Disconnect: terminal close, registry entry removed, timers and
    // channel torn down even if a restart was mid-flight
    state.registry.close(&conn_id).await;
    send_task.abort();

    info!("Connection {} closed", conn_id);
}

async fn handle_frame(
    state: &AppState,
    conn_id: &str,
    out_tx: &mpsc::UnboundedSender<OutboundEvent>,
    frame: InboundFrame,
) {
    let session = state.registry.get_or_create(conn_id, out_tx.clone()).await;

    let result = match frame {
        InboundFrame::Start { config } => session.start(config),
        InboundFrame::Audio { pcm } => {
            match base64::engine::general_purpose::STANDARD.decode(&pcm) {
                Ok(chunk) => session.write_audio(chunk),
                Err(e) => {
                    let _ = out_tx.send(OutboundEvent::Error {
                        message: format!("invalid audio encoding: {}", e),
                    });
                    return;
                }
            }
        }
        InboundFrame::ForceFlush { transcript } => session.force_flush(transcript),
        InboundFrame::Stop => session.stop(),
    };

    if let Err(e) = result {
        // Config rejection keeps the session idle; a closed session means
        // the connection is going away anyway
        if matches!(e, SessionError::Config(_)) {
            let _ = out_tx.send(OutboundEvent::Error {
                message: e.to_string(),
            });
        }
    }
}

// ============================================================================
// Batch transcription surface
// ============================================================================

/// POST /recordings/transcribe
/// Store an uploaded recording, run long-running recognition, and return
/// the speaker-segmented transcript
pub async fn transcribe_recording(
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    if body.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "empty recording".to_string(),
            }),
        )
            .into_response();
    }

    let audio_reference = match state.store.save(&body).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to store recording: {:#}", e);
            return generic_error().into_response();
        }
    };

    let results = match state
        .backend
        .long_running_recognize(&body, &RecognitionConfig::default())
        .await
    {
        Ok(results) => results,
        Err(e) => {
            error!(
                "Recognition failed for recording {}: {:#}",
                audio_reference, e
            );
            // Best effort: do not keep a recording we could not transcribe
            let _ = state.store.delete(&audio_reference).await;
            return generic_error().into_response();
        }
    };

    let segments = merge_segments(&results);

    info!(
        "Transcribed recording {} into {} segments",
        audio_reference,
        segments.len()
    );

    (
        StatusCode::OK,
        Json(TranscribeResponse {
            audio_reference,
            segments,
        }),
    )
        .into_response()
}

/// GET /recordings/:id/access
/// Time-limited access reference for a stored recording
pub async fn recording_access(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.access_ref(&id).await {
        Ok(access) => (StatusCode::OK, Json(access)).into_response(),
        Err(e) if is_not_found(&e) => not_found(&id).into_response(),
        Err(e) => {
            error!("Failed to build access ref for {}: {:#}", id, e);
            generic_error().into_response()
        }
    }
}

/// DELETE /recordings/:id
/// Remove a stored recording
pub async fn delete_recording(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete(&id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(DeleteResponse {
                audio_reference: id,
                status: "deleted".to_string(),
            }),
        )
            .into_response(),
        Err(e) if is_not_found(&e) => not_found(&id).into_response(),
        Err(e) => {
            error!("Failed to delete recording {}: {:#}", id, e);
            generic_error().into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
