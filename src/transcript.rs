use serde::{Deserialize, Serialize};

/// A single transcribed word with its time range in seconds.
///
/// Inside a checkpoint the offsets are relative to the chunk's own start;
/// inside a final [`Transcript`] they are relative to the whole recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

/// Transcription output for one audio chunk, as returned by the service.
///
/// Word offsets are relative to the chunk's own start. This is exactly what
/// gets persisted to a checkpoint file; it is never rewritten in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTranscription {
    pub text: String,
    pub words: Vec<Word>,
}

impl ChunkTranscription {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.text.trim().is_empty()
    }
}

/// One segment of the final transcript, covering exactly one chunk.
///
/// Word timestamps here are whole-media-relative. This is the contract every
/// downstream consumer (chapterization, knowledge base) relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub chunk_index: usize,
    pub text: String,
    pub words: Vec<Word>,
}

/// The final time-aligned transcript for one source recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Stable key derived from the source file stem.
    pub source_key: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Total number of words across all segments.
    pub fn word_count(&self) -> usize {
        self.segments.iter().map(|s| s.words.len()).sum()
    }

    /// End timestamp of the last word, in seconds.
    pub fn duration(&self) -> f64 {
        self.segments
            .iter()
            .flat_map(|s| s.words.iter())
            .map(|w| w.end)
            .fold(0.0, f64::max)
    }

    /// Full text of the transcript, segments joined in order.
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
