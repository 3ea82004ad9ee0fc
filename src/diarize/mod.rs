//! Speaker-segmented transcript assembly.
//!
//! Turns the backend's flat list of recognition results into contiguous
//! per-speaker segments. Used by the batch transcription path; the live
//! path shares the segment type for force-flush output.

use serde::{Deserialize, Serialize};

use crate::backend::RawRecognitionResult;

/// A contiguous run of transcript text attributed to one speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Accumulated transcript text for this speaker run
    pub text: String,

    /// Speaker attribution for the whole segment
    pub speaker_tag: u32,

    /// Always true: segments are built from finalized results only
    pub is_final: bool,

    /// Offset of the segment start into the recording, formatted "HH:MM"
    pub timestamp: String,
}

/// Format a start offset in seconds as "HH:MM".
fn format_offset(start_secs: Option<f64>) -> String {
    match start_secs {
        Some(secs) if secs >= 0.0 => {
            let total = secs as u64;
            format!("{:02}:{:02}", total / 3600, (total % 3600) / 60)
        }
        _ => "00:00".to_string(),
    }
}

/// Merge an ordered sequence of recognition results into speaker segments.
///
/// Strict forward pass: results with empty transcripts or no word-level
/// data are skipped without disturbing speaker continuity. A change in the
/// first word's speaker tag closes the current segment and opens a new one;
/// a matching tag appends the transcript text with a separating space.
/// Segments are never reordered or merged non-adjacently.
pub fn merge_segments(results: &[RawRecognitionResult]) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = Vec::new();
    let mut last_speaker_tag: Option<u32> = None;

    for result in results {
        let text = result.transcript.trim();
        if text.is_empty() || result.words.is_empty() {
            continue;
        }

        // Attribution for the whole result comes from its first word
        let first = &result.words[0];
        let tag = first.speaker_tag.unwrap_or(0);

        match segments.last_mut() {
            Some(current) if last_speaker_tag == Some(tag) => {
                current.text.push(' ');
                current.text.push_str(text);
            }
            _ => {
                segments.push(TranscriptSegment {
                    text: text.to_string(),
                    speaker_tag: tag,
                    is_final: true,
                    timestamp: format_offset(first.start_secs),
                });
            }
        }

        last_speaker_tag = Some(tag);
    }

    segments
}
