use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::backend::{
    BackendEvent, RawRecognitionResult, RecognitionConfig, SpeechBackend, StreamHandle,
};

use super::error::SessionError;
use super::events::{OutboundEvent, SessionMsg, TranscriptEvent};
use super::watchdog::Watchdog;

/// Sink for events delivered back to the client connection.
pub type OutboundSender = mpsc::UnboundedSender<OutboundEvent>;

/// Deadlines governing backend channel rotation.
///
/// The stream ceiling stays under the backend's hard ~300s lifetime limit
/// with margin; the silence deadline rotates the channel before the
/// backend's inactivity cutoff can produce a hard error.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SessionTimeouts {
    /// Rotate the channel after this long without audio
    #[serde(default = "default_silence_secs")]
    pub silence_secs: u64,

    /// Hard ceiling on one channel's lifetime, independent of traffic
    #[serde(default = "default_max_stream_secs")]
    pub max_stream_secs: u64,
}

fn default_silence_secs() -> u64 {
    10
}

fn default_max_stream_secs() -> u64 {
    290
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            silence_secs: default_silence_secs(),
            max_stream_secs: default_max_stream_secs(),
        }
    }
}

impl SessionTimeouts {
    fn silence(&self) -> Duration {
        Duration::from_secs(self.silence_secs)
    }

    fn max_stream(&self) -> Duration {
        Duration::from_secs(self.max_stream_secs)
    }
}

/// Lifecycle state of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No config, no channel
    Idle,
    /// Channel open, watchdogs running
    Active,
    /// Channel torn down mid-rotation; transient
    Restarting,
    /// Connection gone; terminal
    Closed,
}

/// Client-facing handle to a session actor.
///
/// All operations are message sends; the actor processes them strictly in
/// arrival order, so nothing here can race a watchdog firing or a backend
/// event on the same session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionMsg>,
}

impl SessionHandle {
    /// Begin (or replace) streaming with the given recognition parameters.
    ///
    /// Invalid parameters are rejected here, synchronously, and the session
    /// stays in its current state.
    pub fn start(&self, config: RecognitionConfig) -> Result<(), SessionError> {
        config.validate()?;
        self.send(SessionMsg::Start(config))
    }

    /// Forward one audio chunk. Chunks arriving while the session is not
    /// active are dropped and reported, never buffered.
    pub fn write_audio(&self, chunk: Vec<u8>) -> Result<(), SessionError> {
        self.send(SessionMsg::Audio(chunk))
    }

    /// Commit an in-flight partial transcript as final without waiting for
    /// the backend.
    pub fn force_flush(&self, partial: String) -> Result<(), SessionError> {
        self.send(SessionMsg::ForceFlush(partial))
    }

    /// Tear down the channel and return to idle. The session can be
    /// started again.
    pub fn stop(&self) -> Result<(), SessionError> {
        self.send(SessionMsg::Stop)
    }

    /// Terminal teardown for a gone connection.
    pub fn close(&self) -> Result<(), SessionError> {
        self.send(SessionMsg::Close)
    }

    fn send(&self, msg: SessionMsg) -> Result<(), SessionError> {
        self.tx.send(msg).map_err(|_| SessionError::Closed)
    }
}

/// One per-connection streaming session, run as a spawned actor task.
pub struct StreamingSession {
    conn_id: String,
    backend: Arc<dyn SpeechBackend>,
    outbound: OutboundSender,
    timeouts: SessionTimeouts,
    self_tx: mpsc::UnboundedSender<SessionMsg>,

    state: State,
    config: Option<RecognitionConfig>,
    channel: Option<Box<dyn StreamHandle>>,
    silence: Watchdog,
    duration: Watchdog,
}

enum Flow {
    Continue,
    Shutdown,
}

impl StreamingSession {
    /// Spawn the actor for one connection and return its handle.
    pub fn spawn(
        conn_id: String,
        backend: Arc<dyn SpeechBackend>,
        outbound: OutboundSender,
        timeouts: SessionTimeouts,
    ) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();

        let session = Self {
            conn_id,
            backend,
            outbound,
            timeouts,
            self_tx: tx.clone(),
            state: State::Idle,
            config: None,
            channel: None,
            silence: Watchdog::new(),
            duration: Watchdog::new(),
        };

        tokio::spawn(session.run(rx));

        SessionHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionMsg>) {
        // The backend event receiver lives here, not in the struct: it is
        // replaced wholesale on every channel rotation, and stale receivers
        // are dropped along with any late events from a dead channel.
        let mut events: Option<mpsc::Receiver<BackendEvent>> = None;

        info!("Session {} started", self.conn_id);

        loop {
            let input = tokio::select! {
                msg = rx.recv() => Input::Msg(msg),
                ev = recv_backend(&mut events) => Input::Backend(ev),
            };

            let flow = match input {
                Input::Msg(Some(msg)) => self.handle_msg(msg, &mut events).await,
                Input::Msg(None) => {
                    // Every handle dropped; treat like a gone connection
                    self.teardown(&mut events).await;
                    self.state = State::Closed;
                    Flow::Shutdown
                }
                Input::Backend(Some(ev)) => self.handle_backend_event(ev, &mut events).await,
                Input::Backend(None) => {
                    // Channel ended without a terminal error frame
                    self.handle_backend_event(
                        BackendEvent::Error("backend stream ended".to_string()),
                        &mut events,
                    )
                    .await
                }
            };

            if let Flow::Shutdown = flow {
                break;
            }
        }

        info!("Session {} closed", self.conn_id);
    }

    async fn handle_msg(
        &mut self,
        msg: SessionMsg,
        events: &mut Option<mpsc::Receiver<BackendEvent>>,
    ) -> Flow {
        if self.state == State::Closed {
            warn!("Session {}: event after close ignored", self.conn_id);
            return Flow::Shutdown;
        }

        match msg {
            SessionMsg::Start(config) => {
                // start while Active is stop-then-start with the new config
                self.teardown(events).await;
                self.config = Some(config);
                self.open_channel(events).await;
                Flow::Continue
            }
            SessionMsg::Audio(chunk) => {
                self.handle_audio(chunk, events).await;
                Flow::Continue
            }
            SessionMsg::ForceFlush(partial) => {
                // Channel state is irrelevant: synthesize the final event
                // from caller-supplied data and deliver immediately
                self.deliver(OutboundEvent::Transcript(TranscriptEvent {
                    text: partial,
                    is_final: true,
                    timestamp: Utc::now().to_rfc3339(),
                    speaker_tag: None,
                }));
                Flow::Continue
            }
            SessionMsg::SilenceFired(generation) => {
                if self.state == State::Active && self.silence.is_current(generation) {
                    self.restart(events, "silence deadline").await;
                }
                Flow::Continue
            }
            SessionMsg::DurationFired(generation) => {
                if self.state == State::Active && self.duration.is_current(generation) {
                    self.restart(events, "channel lifetime ceiling").await;
                }
                Flow::Continue
            }
            SessionMsg::Stop => {
                self.teardown(events).await;
                self.config = None;
                self.state = State::Idle;
                info!("Session {} stopped", self.conn_id);
                Flow::Continue
            }
            SessionMsg::Close => {
                self.teardown(events).await;
                self.state = State::Closed;
                Flow::Shutdown
            }
        }
    }

    async fn handle_audio(
        &mut self,
        chunk: Vec<u8>,
        events: &mut Option<mpsc::Receiver<BackendEvent>>,
    ) {
        if self.state != State::Active {
            warn!(
                "Session {}: dropping {}-byte audio chunk, session not active",
                self.conn_id,
                chunk.len()
            );
            self.deliver(OutboundEvent::Error {
                message: "audio chunk dropped: session is not active".to_string(),
            });
            return;
        }

        // Active implies a held channel; treat a missing one as a backend
        // failure rather than panicking in the dispatch loop
        let Some(channel) = self.channel.as_mut() else {
            error!("Session {}: active with no channel handle", self.conn_id);
            self.fail(events, SessionError::Backend("channel missing".into()))
                .await;
            return;
        };

        if let Err(e) = channel.write(&chunk).await {
            error!("Session {}: audio write failed: {:#}", self.conn_id, e);
            self.fail(events, SessionError::Backend(e.to_string())).await;
            return;
        }

        // Cancel-and-reschedule, not cumulative
        self.silence.arm(
            self.timeouts.silence(),
            self.self_tx.clone(),
            SessionMsg::SilenceFired,
        );
    }

    async fn handle_backend_event(
        &mut self,
        event: BackendEvent,
        events: &mut Option<mpsc::Receiver<BackendEvent>>,
    ) -> Flow {
        match event {
            BackendEvent::Result(result) => {
                // Forward unconditionally, interim repeats included
                self.deliver(OutboundEvent::Transcript(transform(&result)));
            }
            BackendEvent::Error(message) => {
                error!("Session {}: backend error: {}", self.conn_id, message);
                self.fail(events, SessionError::Backend(message)).await;
            }
        }
        Flow::Continue
    }

    /// Open a channel with the stored config and arm both watchdogs.
    /// Callers must have completed teardown first: at most one live channel
    /// handle exists per session at any instant.
    async fn open_channel(&mut self, events: &mut Option<mpsc::Receiver<BackendEvent>>) {
        debug_assert!(self.channel.is_none());

        let config = match &self.config {
            Some(config) => config.clone(),
            None => {
                self.state = State::Idle;
                return;
            }
        };

        match self.backend.open_stream(&config).await {
            Ok((handle, rx)) => {
                self.channel = Some(handle);
                *events = Some(rx);
                self.duration.arm(
                    self.timeouts.max_stream(),
                    self.self_tx.clone(),
                    SessionMsg::DurationFired,
                );
                self.silence.arm(
                    self.timeouts.silence(),
                    self.self_tx.clone(),
                    SessionMsg::SilenceFired,
                );
                self.state = State::Active;
                info!("Session {}: channel open", self.conn_id);
            }
            Err(e) => {
                error!("Session {}: failed to open channel: {:#}", self.conn_id, e);
                self.fail(events, SessionError::Backend(e.to_string())).await;
            }
        }
    }

    /// Silent channel rotation: no client-visible signal, operator log only.
    async fn restart(&mut self, events: &mut Option<mpsc::Receiver<BackendEvent>>, reason: &str) {
        info!("Session {}: restarting channel ({})", self.conn_id, reason);
        self.state = State::Restarting;
        self.teardown(events).await;
        self.open_channel(events).await;
    }

    /// Notify the client once, tear down, and revert to idle so the client
    /// may retry with a fresh start.
    async fn fail(
        &mut self,
        events: &mut Option<mpsc::Receiver<BackendEvent>>,
        error: SessionError,
    ) {
        self.deliver(OutboundEvent::Error {
            message: error.to_string(),
        });
        self.teardown(events).await;
        self.config = None;
        self.state = State::Idle;
    }

    /// Idempotent teardown: cancel both watchdogs, close and clear the
    /// channel handle. Never fails; close errors are logged and swallowed
    /// since the channel is being discarded anyway.
    async fn teardown(&mut self, events: &mut Option<mpsc::Receiver<BackendEvent>>) {
        self.silence.cancel();
        self.duration.cancel();
        *events = None;

        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                warn!(
                    "Session {}: channel close failed (ignored): {:#}",
                    self.conn_id, e
                );
            }
        }
    }

    fn deliver(&self, event: OutboundEvent) {
        // A gone client is handled at the transport layer; nothing to do here
        let _ = self.outbound.send(event);
    }
}

enum Input {
    Msg(Option<SessionMsg>),
    Backend(Option<BackendEvent>),
}

async fn recv_backend(events: &mut Option<mpsc::Receiver<BackendEvent>>) -> Option<BackendEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Forward a backend result verbatim, normalizing only the timestamp and
/// extracting the last word's speaker attribution.
fn transform(result: &RawRecognitionResult) -> TranscriptEvent {
    TranscriptEvent {
        text: result.transcript.clone(),
        is_final: result.is_final,
        timestamp: Utc::now().to_rfc3339(),
        speaker_tag: result.last_speaker_tag(),
    }
}
