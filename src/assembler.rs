use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::media::AudioProbe;
use crate::transcript::{ChunkTranscription, Transcript, TranscriptSegment, Word};

/// Reassembles per-chunk results into one globally time-aligned transcript.
///
/// Replay is strictly by ascending chunk index; the order in which workers
/// finished is irrelevant. Each chunk's contribution to the running offset is
/// its exact decoded duration, re-probed from the chunk file itself rather
/// than taken from the nominal slice length, so encoder rounding never
/// accumulates into timestamp drift.
pub struct TimelineAssembler<'a> {
    probe: &'a dyn AudioProbe,
}

impl<'a> TimelineAssembler<'a> {
    pub fn new(probe: &'a dyn AudioProbe) -> Self {
        Self { probe }
    }

    pub async fn assemble(
        &self,
        source_key: &str,
        chunk_paths: &[PathBuf],
        mut results: HashMap<usize, ChunkTranscription>,
    ) -> Result<Transcript> {
        let mut segments = Vec::with_capacity(chunk_paths.len());
        let mut global_offset = 0.0f64;

        for (index, chunk_path) in chunk_paths.iter().enumerate() {
            let result = results.remove(&index).ok_or_else(|| {
                anyhow!(
                    "missing transcription result for chunk {} of '{}'",
                    index,
                    source_key
                )
            })?;

            if result.is_empty() {
                warn!(
                    "⚠️ Chunk {} of '{}' produced no detected speech",
                    index, source_key
                );
            }

            let words: Vec<Word> = result
                .words
                .into_iter()
                .map(|w| Word {
                    word: w.word,
                    start: w.start + global_offset,
                    end: w.end + global_offset,
                })
                .collect();

            segments.push(TranscriptSegment {
                chunk_index: index,
                text: result.text,
                words,
            });

            let chunk_duration = self
                .probe
                .duration_secs(chunk_path)
                .await
                .with_context(|| format!("failed to probe chunk {}", chunk_path.display()))?;

            debug!(
                "🧩 Chunk {} spans [{:.2}s, {:.2}s)",
                index,
                global_offset,
                global_offset + chunk_duration
            );

            global_offset += chunk_duration;
        }

        info!(
            "🧩 Assembled {} segments covering {:.1}s for '{}'",
            segments.len(),
            global_offset,
            source_key
        );

        Ok(Transcript {
            source_key: source_key.to_string(),
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    /// Probe returning durations keyed by file name, no ffprobe involved.
    struct FixedProbe {
        durations: HashMap<String, f64>,
    }

    impl FixedProbe {
        fn new(pairs: &[(&str, f64)]) -> Self {
            Self {
                durations: pairs
                    .iter()
                    .map(|(name, d)| (name.to_string(), *d))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl AudioProbe for FixedProbe {
        async fn duration_secs(&self, audio_path: &Path) -> Result<f64> {
            let name = audio_path.file_name().unwrap().to_string_lossy().to_string();
            self.durations
                .get(&name)
                .copied()
                .ok_or_else(|| anyhow!("no duration for {}", name))
        }
    }

    fn result_with_word(text: &str, word: &str, start: f64, end: f64) -> ChunkTranscription {
        ChunkTranscription {
            text: text.to_string(),
            words: vec![Word {
                word: word.to_string(),
                start,
                end,
            }],
        }
    }

    #[tokio::test]
    async fn test_offsets_use_decoded_durations() {
        // Chunk 0 decodes to 598.2s, so a word at 5.0s into chunk 1 lands at 603.2s
        let probe = FixedProbe::new(&[("part0.flac", 598.2), ("part1.flac", 601.0)]);
        let assembler = TimelineAssembler::new(&probe);

        let chunk_paths = vec![PathBuf::from("part0.flac"), PathBuf::from("part1.flac")];
        let mut results = HashMap::new();
        results.insert(0, result_with_word("intro", "intro", 0.5, 1.0));
        results.insert(1, result_with_word("next", "next", 5.0, 5.4));

        let transcript = assembler
            .assemble("lecture", &chunk_paths, results)
            .await
            .unwrap();

        assert_eq!(transcript.segments.len(), 2);
        assert!((transcript.segments[0].words[0].start - 0.5).abs() < 1e-9);
        assert!((transcript.segments[1].words[0].start - 603.2).abs() < 1e-9);
        assert!((transcript.segments[1].words[0].end - 603.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_replay_is_by_index_not_completion_order() {
        let probe = FixedProbe::new(&[
            ("part0.flac", 100.0),
            ("part1.flac", 100.0),
            ("part2.flac", 50.0),
        ]);
        let assembler = TimelineAssembler::new(&probe);

        let chunk_paths = vec![
            PathBuf::from("part0.flac"),
            PathBuf::from("part1.flac"),
            PathBuf::from("part2.flac"),
        ];

        // Insert results in a scrambled order, as out-of-order workers would
        let mut results = HashMap::new();
        results.insert(2, result_with_word("c", "c", 1.0, 2.0));
        results.insert(0, result_with_word("a", "a", 1.0, 2.0));
        results.insert(1, result_with_word("b", "b", 1.0, 2.0));

        let transcript = assembler
            .assemble("lecture", &chunk_paths, results)
            .await
            .unwrap();

        let indices: Vec<_> = transcript.segments.iter().map(|s| s.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        // Timeline monotonicity: every word in segment i ends before any word
        // in segment j starts, for i < j
        for window in transcript.segments.windows(2) {
            let max_end = window[0].words.iter().map(|w| w.end).fold(0.0, f64::max);
            let min_start = window[1]
                .words
                .iter()
                .map(|w| w.start)
                .fold(f64::INFINITY, f64::min);
            assert!(max_end <= min_start);
        }
    }

    #[tokio::test]
    async fn test_missing_chunk_result_is_an_error() {
        let probe = FixedProbe::new(&[("part0.flac", 10.0), ("part1.flac", 10.0)]);
        let assembler = TimelineAssembler::new(&probe);

        let chunk_paths = vec![PathBuf::from("part0.flac"), PathBuf::from("part1.flac")];
        let mut results = HashMap::new();
        results.insert(0, result_with_word("a", "a", 0.0, 1.0));

        let err = assembler
            .assemble("lecture", &chunk_paths, results)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("chunk 1"));
    }

    #[tokio::test]
    async fn test_empty_chunk_is_kept_and_advances_offset() {
        let probe = FixedProbe::new(&[("part0.flac", 300.0), ("part1.flac", 300.0)]);
        let assembler = TimelineAssembler::new(&probe);

        let chunk_paths = vec![PathBuf::from("part0.flac"), PathBuf::from("part1.flac")];
        let mut results = HashMap::new();
        results.insert(
            0,
            ChunkTranscription {
                text: String::new(),
                words: vec![],
            },
        );
        results.insert(1, result_with_word("late", "late", 2.0, 2.5));

        let transcript = assembler
            .assemble("lecture", &chunk_paths, results)
            .await
            .unwrap();

        assert_eq!(transcript.segments.len(), 2);
        assert!(transcript.segments[0].words.is_empty());
        assert!((transcript.segments[1].words[0].start - 302.0).abs() < 1e-9);
    }
}
