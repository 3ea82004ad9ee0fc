use serde::{Deserialize, Serialize};

use crate::session::SessionError;

/// Recognition parameters supplied by the client at session start.
///
/// Immutable for the lifetime of the session: a new `start` replaces the
/// whole session rather than mutating this in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Audio encoding identifier (e.g., "LINEAR16", "OGG_OPUS")
    pub encoding: String,

    /// Sample rate of the incoming audio in Hz
    pub sample_rate_hertz: u32,

    /// Primary language code (e.g., "en-US")
    pub language_code: String,

    /// Additional candidate languages, if any
    #[serde(default)]
    pub alternative_language_codes: Vec<String>,

    /// Minimum expected number of distinct speakers
    pub min_speaker_count: u32,

    /// Maximum expected number of distinct speakers
    pub max_speaker_count: u32,

    /// Whether the backend should insert punctuation
    pub enable_automatic_punctuation: bool,

    /// Acoustic model name (backend-specific)
    pub model: String,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            encoding: "LINEAR16".to_string(),
            sample_rate_hertz: 16000,
            language_code: "en-US".to_string(),
            alternative_language_codes: Vec::new(),
            min_speaker_count: 1,
            max_speaker_count: 2,
            enable_automatic_punctuation: true,
            model: "default".to_string(),
        }
    }
}

impl RecognitionConfig {
    /// Validate start parameters. Rejections happen synchronously so the
    /// session never leaves `Idle` on bad input.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.encoding.trim().is_empty() {
            return Err(SessionError::Config("audio encoding is required".into()));
        }
        if self.sample_rate_hertz == 0 {
            return Err(SessionError::Config("sample rate must be non-zero".into()));
        }
        if self.language_code.trim().is_empty() {
            return Err(SessionError::Config("language code is required".into()));
        }
        if self.min_speaker_count == 0 || self.max_speaker_count < self.min_speaker_count {
            return Err(SessionError::Config(format!(
                "invalid speaker bounds: min={} max={}",
                self.min_speaker_count, self.max_speaker_count
            )));
        }
        Ok(())
    }
}

/// One recognized word with its diarization metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WordInfo {
    /// The word text
    pub word: String,

    /// Speaker attribution assigned by the backend, if diarization ran
    pub speaker_tag: Option<u32>,

    /// Offset of the word start from the beginning of the audio, in seconds
    pub start_secs: Option<f64>,
}

/// A flat recognition result as emitted by the speech backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecognitionResult {
    /// Full transcript text for this result
    pub transcript: String,

    /// Whether the backend considers this result final
    pub is_final: bool,

    /// Word-level detail (empty for interim results on most backends)
    #[serde(default)]
    pub words: Vec<WordInfo>,
}

impl RawRecognitionResult {
    /// Speaker tag of the last word, used when forwarding live events.
    pub fn last_speaker_tag(&self) -> Option<u32> {
        self.words.last().and_then(|w| w.speaker_tag)
    }
}

/// Asynchronous event emitted by an open streaming channel.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A partial or final recognition result
    Result(RawRecognitionResult),

    /// Terminal channel failure; no further events will arrive
    Error(String),
}
