/// Video Analyst - resilient chunked transcription pipeline
///
/// Splits long-form recordings into bounded-duration audio chunks, fans them
/// out to an external speech-to-text service through a small worker pool with
/// retries and durable per-chunk checkpoints, and reassembles the results
/// into one globally time-aligned transcript.

pub mod assembler;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod media;
pub mod pipeline;
pub mod transcript;
pub mod transcription;

// Re-export main types for easy access
pub use crate::assembler::TimelineAssembler;
pub use crate::cache::PipelineCache;
pub use crate::chunker::{ChunkPlan, Chunker};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::media::{discover_media, source_key, AudioProbe, FfprobeAudioProbe, MediaExtractor};
pub use crate::pipeline::{TranscriptionPipeline, TranscriptionWorkerPool};
pub use crate::transcript::{ChunkTranscription, Transcript, TranscriptSegment, Word};
pub use crate::transcription::{OpenAiTranscriber, TranscribeError, TranscriptionService};
