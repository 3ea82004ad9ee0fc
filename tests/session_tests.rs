// Integration tests for the streaming session lifecycle
//
// These tests drive a session actor against an instrumented mock backend
// and verify the channel-ownership invariant, watchdog-driven restarts,
// and error recovery. Timer behavior runs under tokio's paused clock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, Mutex};

use voxrelay::{
    BackendEvent, OutboundEvent, RawRecognitionResult, RecognitionConfig, SessionError,
    SessionHandle, SessionRegistry, SessionTimeouts, SpeechBackend, StreamHandle,
    StreamingSession, WordInfo,
};

/// Backend double that counts channel opens/closes and records writes.
struct MockBackend {
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    peak_live: Arc<AtomicUsize>,
    /// Sender for the most recently opened channel, for injecting events
    event_tx: Mutex<Option<mpsc::Sender<BackendEvent>>>,
}

impl MockBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
            peak_live: Arc::new(AtomicUsize::new(0)),
            event_tx: Mutex::new(None),
        })
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn inject(&self, event: BackendEvent) {
        let tx = self.event_tx.lock().await;
        tx.as_ref()
            .expect("no open channel to inject into")
            .send(event)
            .await
            .expect("session dropped the event receiver");
    }
}

struct MockHandle {
    closes: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait::async_trait]
impl StreamHandle for MockHandle {
    async fn write(&mut self, _chunk: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SpeechBackend for MockBackend {
    async fn open_stream(
        &self,
        _config: &RecognitionConfig,
    ) -> Result<(Box<dyn StreamHandle>, mpsc::Receiver<BackendEvent>)> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_live.fetch_max(live, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(16);
        *self.event_tx.lock().await = Some(tx);

        Ok((
            Box::new(MockHandle {
                closes: Arc::clone(&self.closes),
                writes: Arc::clone(&self.writes),
                live: Arc::clone(&self.live),
                closed: false,
            }),
            rx,
        ))
    }

    async fn long_running_recognize(
        &self,
        _audio: &[u8],
        _config: &RecognitionConfig,
    ) -> Result<Vec<RawRecognitionResult>> {
        Ok(Vec::new())
    }
}

fn timeouts(silence_secs: u64, max_stream_secs: u64) -> SessionTimeouts {
    SessionTimeouts {
        silence_secs,
        max_stream_secs,
    }
}

fn spawn_session(
    backend: Arc<MockBackend>,
    timeouts: SessionTimeouts,
) -> (SessionHandle, mpsc::UnboundedReceiver<OutboundEvent>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let handle = StreamingSession::spawn("conn-test".to_string(), backend, out_tx, timeouts);
    (handle, out_rx)
}

/// Let the session actor drain its queue.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn drain(rx: &mut mpsc::UnboundedReceiver<OutboundEvent>) -> Vec<OutboundEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_channel_across_start_audio_stop() -> Result<()> {
    let backend = MockBackend::new();
    let (session, _out) = spawn_session(backend.clone(), timeouts(1000, 1000));

    session.start(RecognitionConfig::default())?;
    settle().await;

    for _ in 0..5 {
        session.write_audio(vec![0u8; 320])?;
    }
    settle().await;

    session.stop()?;
    settle().await;

    assert_eq!(backend.opens(), 1);
    assert_eq!(backend.closes(), 1);
    assert_eq!(backend.writes(), 5);
    assert_eq!(backend.peak_live(), 1, "never more than one open channel");
    assert_eq!(backend.live(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_while_active_replaces_channel() -> Result<()> {
    let backend = MockBackend::new();
    let (session, _out) = spawn_session(backend.clone(), timeouts(1000, 1000));

    session.start(RecognitionConfig::default())?;
    settle().await;

    let mut second = RecognitionConfig::default();
    second.language_code = "de-DE".to_string();
    session.start(second)?;
    settle().await;

    // Equivalent to stop-then-start: old channel closed before new open
    assert_eq!(backend.opens(), 2);
    assert_eq!(backend.closes(), 1);
    assert_eq!(backend.peak_live(), 1);
    assert_eq!(backend.live(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_silence_timeout_restarts_without_client_signal() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(10, 10_000));

    session.start(RecognitionConfig::default())?;
    settle().await;
    assert_eq!(backend.opens(), 1);

    // No audio for longer than the silence deadline
    tokio::time::sleep(Duration::from_secs(11)).await;
    settle().await;

    assert_eq!(backend.opens(), 2, "exactly one teardown+reopen cycle");
    assert_eq!(backend.closes(), 1);
    assert_eq!(backend.live(), 1);
    assert!(
        drain(&mut out).is_empty(),
        "restart must not be client-visible"
    );

    session.close()?;
    settle().await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_audio_resets_silence_deadline() -> Result<()> {
    let backend = MockBackend::new();
    let (session, _out) = spawn_session(backend.clone(), timeouts(10, 10_000));

    session.start(RecognitionConfig::default())?;
    settle().await;

    // Keep writing every 5s for 40s: the silence deadline never lapses
    for _ in 0..8 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        session.write_audio(vec![0u8; 320])?;
        settle().await;
    }

    assert_eq!(backend.opens(), 1, "no restart while audio keeps flowing");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_duration_ceiling_restarts_under_continuous_traffic() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(10, 30));

    session.start(RecognitionConfig::default())?;
    settle().await;

    // Audio every 2s keeps the silence watchdog quiet; the duration
    // ceiling fires regardless of traffic
    for _ in 0..18 {
        tokio::time::sleep(Duration::from_secs(2)).await;
        session.write_audio(vec![0u8; 320])?;
        settle().await;
    }

    assert!(
        backend.opens() >= 2,
        "duration ceiling must rotate the channel"
    );
    assert_eq!(backend.opens() - backend.closes(), 1);
    assert_eq!(backend.peak_live(), 1);
    assert!(drain(&mut out).is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_force_flush_on_idle_session() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(10, 290));

    // Never started: no channel exists, flush still works
    session.force_flush("committed partial".to_string())?;
    settle().await;

    let events = drain(&mut out);
    assert_eq!(events.len(), 1);
    match &events[0] {
        OutboundEvent::Transcript(ev) => {
            assert_eq!(ev.text, "committed partial");
            assert!(ev.is_final);
            assert!(ev.speaker_tag.is_none());
        }
        other => panic!("expected transcript, got {:?}", other),
    }
    assert_eq!(backend.opens(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_audio_while_idle_is_dropped_and_reported() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(10, 290));

    session.write_audio(vec![0u8; 320])?;
    settle().await;

    assert_eq!(backend.writes(), 0, "chunk must not be buffered or sent");
    let events = drain(&mut out);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], OutboundEvent::Error { .. }));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_notifies_once_and_reverts_to_idle() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(1000, 1000));

    session.start(RecognitionConfig::default())?;
    settle().await;

    backend
        .inject(BackendEvent::Error("stream broke".to_string()))
        .await;
    settle().await;

    let events = drain(&mut out);
    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, OutboundEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1, "client is notified exactly once");
    assert_eq!(backend.live(), 0, "channel torn down");

    // Not connection-fatal: a fresh start works
    session.start(RecognitionConfig::default())?;
    settle().await;
    assert_eq!(backend.opens(), 2);
    assert_eq!(backend.live(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_transcript_events_forwarded_with_speaker_tag() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(1000, 1000));

    session.start(RecognitionConfig::default())?;
    settle().await;

    backend
        .inject(BackendEvent::Result(RawRecognitionResult {
            transcript: "hello there".to_string(),
            is_final: false,
            words: vec![],
        }))
        .await;
    backend
        .inject(BackendEvent::Result(RawRecognitionResult {
            transcript: "hello there".to_string(),
            is_final: true,
            words: vec![
                WordInfo {
                    word: "hello".to_string(),
                    speaker_tag: Some(1),
                    start_secs: Some(0.0),
                },
                WordInfo {
                    word: "there".to_string(),
                    speaker_tag: Some(2),
                    start_secs: Some(0.4),
                },
            ],
        }))
        .await;
    settle().await;

    let events = drain(&mut out);
    assert_eq!(events.len(), 2, "interim results are forwarded too");
    match (&events[0], &events[1]) {
        (OutboundEvent::Transcript(interim), OutboundEvent::Transcript(fin)) => {
            assert!(!interim.is_final);
            assert!(interim.speaker_tag.is_none());
            assert!(fin.is_final);
            assert_eq!(fin.speaker_tag, Some(2), "tag comes from the last word");
        }
        other => panic!("expected two transcripts, got {:?}", other),
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_rejected_synchronously() -> Result<()> {
    let backend = MockBackend::new();
    let (session, _out) = spawn_session(backend.clone(), timeouts(10, 290));

    let mut config = RecognitionConfig::default();
    config.language_code = String::new();

    let err = session.start(config).expect_err("must reject empty language");
    assert!(matches!(err, SessionError::Config(_)));
    settle().await;

    assert_eq!(backend.opens(), 0, "session stayed idle");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_close_after_restart_leaves_no_resources() -> Result<()> {
    let backend = MockBackend::new();
    let (session, mut out) = spawn_session(backend.clone(), timeouts(5, 10_000));

    session.start(RecognitionConfig::default())?;
    settle().await;

    // Let the silence watchdog trigger a restart, then close right behind it
    tokio::time::sleep(Duration::from_secs(6)).await;
    session.close()?;
    settle().await;

    assert_eq!(backend.live(), 0, "no leaked channel handle");
    assert_eq!(backend.opens(), backend.closes());
    assert!(drain(&mut out).is_empty());

    // The actor is gone; further events report closed
    assert!(matches!(
        session.stop(),
        Err(SessionError::Closed)
    ));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_stop_then_start_again() -> Result<()> {
    let backend = MockBackend::new();
    let (session, _out) = spawn_session(backend.clone(), timeouts(1000, 1000));

    session.start(RecognitionConfig::default())?;
    settle().await;
    session.stop()?;
    settle().await;

    assert_eq!(backend.live(), 0);

    // stop does not destroy the session; it may be started again
    session.start(RecognitionConfig::default())?;
    settle().await;
    assert_eq!(backend.opens(), 2);
    assert_eq!(backend.live(), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_registry_one_session_per_connection() -> Result<()> {
    let backend = MockBackend::new();
    let registry = SessionRegistry::new(backend.clone(), timeouts(1000, 1000));

    let (out_tx, _out_rx) = mpsc::unbounded_channel();
    let first = registry.get_or_create("conn-a", out_tx.clone()).await;
    let _again = registry.get_or_create("conn-a", out_tx.clone()).await;
    assert_eq!(registry.active_count().await, 1);

    let (out_b, _out_b_rx) = mpsc::unbounded_channel();
    let _other = registry.get_or_create("conn-b", out_b).await;
    assert_eq!(registry.active_count().await, 2);

    first.start(RecognitionConfig::default())?;
    settle().await;
    assert_eq!(backend.opens(), 1);

    registry.close("conn-a").await;
    settle().await;
    assert_eq!(registry.active_count().await, 1);
    assert_eq!(backend.live(), 0, "close tears the channel down");
    assert!(registry.get("conn-a").await.is_none());

    // Closing twice is harmless
    registry.close("conn-a").await;
    assert_eq!(registry.active_count().await, 1);

    Ok(())
}
