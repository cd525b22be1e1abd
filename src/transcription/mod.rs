pub mod service;

pub use service::{OpenAiTranscriber, TranscribeError, TranscriptionService};
