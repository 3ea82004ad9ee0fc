use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::types::{BackendEvent, RawRecognitionResult, RecognitionConfig};

/// Frames sent to the recognizer (newline-delimited JSON).
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    /// Opens a streaming channel with the given recognition parameters
    Config { config: &'a RecognitionConfig },

    /// One chunk of audio, base64-encoded
    Audio { pcm: String, timestamp: String },

    /// Batch request: recognize a whole recording in one shot
    Recognize {
        config: &'a RecognitionConfig,
        audio: String,
    },
}

/// Frames received from the recognizer.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerFrame {
    Result { result: RawRecognitionResult },
    Error { message: String },
    Done,
}

/// Handle for one open streaming request to the recognition backend.
///
/// A session owns its handle exclusively; it is never shared.
#[async_trait::async_trait]
pub trait StreamHandle: Send {
    /// Forward one audio chunk to the backend.
    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    /// Close the channel. Best-effort: the caller discards the handle
    /// regardless of the outcome.
    async fn close(&mut self) -> Result<()>;
}

/// Capability consumed by streaming sessions and the batch path.
#[async_trait::async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Open a streaming recognition channel.
    ///
    /// Returns the write/close handle and a receiver for asynchronous
    /// results and terminal errors.
    async fn open_stream(
        &self,
        config: &RecognitionConfig,
    ) -> Result<(Box<dyn StreamHandle>, mpsc::Receiver<BackendEvent>)>;

    /// Recognize a complete recording in long-running mode.
    async fn long_running_recognize(
        &self,
        audio: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Vec<RawRecognitionResult>>;
}

/// Speech backend speaking newline-delimited JSON over TCP.
pub struct TcpSpeechBackend {
    addr: String,
}

impl TcpSpeechBackend {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    async fn connect(&self) -> Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .with_context(|| format!("Failed to connect to speech backend at {}", self.addr))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

async fn send_frame(writer: &mut OwnedWriteHalf, frame: &ClientFrame<'_>) -> Result<()> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .context("Failed to write frame to speech backend")?;
    writer.flush().await?;
    Ok(())
}

/// Reads result frames and feeds them into the channel event receiver.
///
/// A malformed line is logged with its content and surfaced as a terminal
/// backend error rather than a raw parse failure.
async fn read_stream_results(reader: OwnedReadHalf, tx: mpsc::Sender<BackendEvent>) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ServerFrame>(&line) {
                    Ok(ServerFrame::Result { result }) => {
                        if tx.send(BackendEvent::Result(result)).await.is_err() {
                            break;
                        }
                    }
                    Ok(ServerFrame::Error { message }) => {
                        let _ = tx.send(BackendEvent::Error(message)).await;
                        break;
                    }
                    Ok(ServerFrame::Done) => break,
                    Err(e) => {
                        error!("Malformed backend response: {} (line: {})", e, line);
                        let _ = tx
                            .send(BackendEvent::Error(
                                "malformed backend response".to_string(),
                            ))
                            .await;
                        break;
                    }
                }
            }
            Ok(None) => {
                // Clean EOF without a Done frame: the server went away
                let _ = tx
                    .send(BackendEvent::Error("backend closed the channel".to_string()))
                    .await;
                break;
            }
            Err(e) => {
                warn!("Error reading from speech backend: {}", e);
                let _ = tx.send(BackendEvent::Error(e.to_string())).await;
                break;
            }
        }
    }
}

struct TcpStreamHandle {
    writer: OwnedWriteHalf,
    reader_task: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl StreamHandle for TcpStreamHandle {
    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let frame = ClientFrame::Audio {
            pcm: base64::engine::general_purpose::STANDARD.encode(chunk),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        send_frame(&mut self.writer, &frame).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        self.writer
            .shutdown()
            .await
            .context("Failed to shut down backend channel")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SpeechBackend for TcpSpeechBackend {
    async fn open_stream(
        &self,
        config: &RecognitionConfig,
    ) -> Result<(Box<dyn StreamHandle>, mpsc::Receiver<BackendEvent>)> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();

        send_frame(&mut writer, &ClientFrame::Config { config }).await?;

        let (tx, rx) = mpsc::channel(64);
        let reader_task = tokio::spawn(read_stream_results(reader, tx));

        info!("Opened streaming channel to {}", self.addr);

        Ok((
            Box::new(TcpStreamHandle {
                writer,
                reader_task: Some(reader_task),
            }),
            rx,
        ))
    }

    async fn long_running_recognize(
        &self,
        audio: &[u8],
        config: &RecognitionConfig,
    ) -> Result<Vec<RawRecognitionResult>> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();

        let frame = ClientFrame::Recognize {
            config,
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
        };
        send_frame(&mut writer, &frame).await?;
        writer.shutdown().await?;

        let mut results = Vec::new();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read recognition results")?
        {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ServerFrame>(&line) {
                Ok(ServerFrame::Result { result }) => results.push(result),
                Ok(ServerFrame::Done) => break,
                Ok(ServerFrame::Error { message }) => {
                    anyhow::bail!("Speech backend error: {}", message);
                }
                Err(e) => {
                    error!("Malformed backend response: {} (line: {})", e, line);
                    anyhow::bail!("Malformed response from speech backend");
                }
            }
        }

        Ok(results)
    }
}
