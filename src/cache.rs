use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::transcript::{ChunkTranscription, Transcript};

/// Two-tier persistence for the pipeline.
///
/// Tier 1: final transcripts, keyed by source key. A hit short-circuits the
/// entire pipeline. Persist indefinitely.
///
/// Tier 2: per-chunk checkpoints, keyed by (source key, chunk index). A hit
/// skips the service call for that chunk. Deleted together with the chunk
/// audio once the whole pipeline succeeds; deliberately left in place on
/// failure so the next run resumes instead of restarting.
#[derive(Debug, Clone)]
pub struct PipelineCache {
    checkpoint_dir: PathBuf,
    transcript_dir: PathBuf,
}

impl PipelineCache {
    pub fn new(storage: &StorageConfig) -> Self {
        Self {
            checkpoint_dir: storage.checkpoint_dir.clone(),
            transcript_dir: storage.transcript_dir.clone(),
        }
    }

    /// Create the cache directories if they don't exist yet.
    pub async fn initialize(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.checkpoint_dir).await?;
        tokio::fs::create_dir_all(&self.transcript_dir).await?;
        debug!(
            "📁 Cache directories ready: {} / {}",
            self.checkpoint_dir.display(),
            self.transcript_dir.display()
        );
        Ok(())
    }

    pub fn transcript_path(&self, key: &str) -> PathBuf {
        self.transcript_dir.join(format!("{}.json", key))
    }

    pub fn checkpoint_path(&self, key: &str, index: usize) -> PathBuf {
        self.checkpoint_dir.join(format!("{}_part{}.json", key, index))
    }

    /// Load the final transcript for a source key, if one was persisted.
    pub async fn load_transcript(&self, key: &str) -> Option<Transcript> {
        let path = self.transcript_path(key);
        let transcript: Transcript = self.read_json(&path).await?;
        info!(
            "📚 Transcript cache hit for '{}': {} segments",
            key,
            transcript.segments.len()
        );
        Some(transcript)
    }

    /// Persist the final transcript (write-through on pipeline success).
    pub async fn store_transcript(&self, transcript: &Transcript) -> Result<()> {
        let path = self.transcript_path(&transcript.source_key);
        let json = serde_json::to_string_pretty(transcript)?;
        tokio::fs::write(&path, json).await?;
        info!("💾 Transcript saved: {}", path.display());
        Ok(())
    }

    /// Load the checkpointed result for one chunk, if present.
    ///
    /// A corrupt checkpoint is treated as a miss (the chunk just gets
    /// re-transcribed) rather than poisoning the whole run.
    pub async fn load_checkpoint(&self, key: &str, index: usize) -> Option<ChunkTranscription> {
        let path = self.checkpoint_path(key, index);
        let result = self.read_json(&path).await?;
        debug!("📋 Checkpoint hit for '{}' chunk {}", key, index);
        Some(result)
    }

    /// Persist one chunk's result. Written exactly once per chunk per run;
    /// each (key, index) pair owns a unique path, so writes never race.
    pub async fn store_checkpoint(
        &self,
        key: &str,
        index: usize,
        result: &ChunkTranscription,
    ) -> Result<()> {
        let path = self.checkpoint_path(key, index);
        let json = serde_json::to_string_pretty(result)?;
        tokio::fs::write(&path, json).await?;
        debug!("💾 Checkpoint saved: {}", path.display());
        Ok(())
    }

    /// Delete all transient state for a source key after pipeline success:
    /// every checkpoint and every chunk audio file. The extracted audio
    /// artifact and the final transcript are kept.
    pub async fn clear_transient_state(
        &self,
        key: &str,
        chunk_paths: &[PathBuf],
    ) -> Result<usize> {
        let mut removed = 0usize;

        for index in 0..chunk_paths.len() {
            let checkpoint = self.checkpoint_path(key, index);
            if checkpoint.exists() {
                if let Err(e) = tokio::fs::remove_file(&checkpoint).await {
                    warn!("Failed to remove checkpoint {}: {}", checkpoint.display(), e);
                } else {
                    removed += 1;
                }
            }
        }

        for chunk in chunk_paths {
            if chunk.exists() {
                if let Err(e) = tokio::fs::remove_file(chunk).await {
                    warn!("Failed to remove chunk file {}: {}", chunk.display(), e);
                } else {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!("🧹 Cleaned up {} transient files for '{}'", removed, key);
        }

        Ok(removed)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Option<T> {
        if !path.exists() {
            return None;
        }

        match tokio::fs::read_to_string(path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Failed to parse cache file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read cache file {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{TranscriptSegment, Word};
    use tempfile::TempDir;

    fn cache_in(dir: &Path) -> PipelineCache {
        PipelineCache::new(&StorageConfig {
            audio_dir: dir.join("audio"),
            checkpoint_dir: dir.join("checkpoints"),
            transcript_dir: dir.join("transcripts"),
        })
    }

    fn sample_result() -> ChunkTranscription {
        ChunkTranscription {
            text: "hello world".to_string(),
            words: vec![
                Word {
                    word: "hello".to_string(),
                    start: 0.1,
                    end: 0.5,
                },
                Word {
                    word: "world".to_string(),
                    start: 0.6,
                    end: 1.0,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(temp_dir.path());
        cache.initialize().await.unwrap();

        assert!(cache.load_checkpoint("lecture", 0).await.is_none());

        let result = sample_result();
        cache.store_checkpoint("lecture", 0, &result).await.unwrap();

        let loaded = cache.load_checkpoint("lecture", 0).await.unwrap();
        assert_eq!(loaded, result);

        // Other indices remain misses
        assert!(cache.load_checkpoint("lecture", 1).await.is_none());
    }

    #[tokio::test]
    async fn test_transcript_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(temp_dir.path());
        cache.initialize().await.unwrap();

        let transcript = Transcript {
            source_key: "lecture".to_string(),
            segments: vec![TranscriptSegment {
                chunk_index: 0,
                text: "hello world".to_string(),
                words: sample_result().words,
            }],
        };

        assert!(cache.load_transcript("lecture").await.is_none());
        cache.store_transcript(&transcript).await.unwrap();
        assert_eq!(cache.load_transcript("lecture").await.unwrap(), transcript);
    }

    #[test]
    fn test_corrupt_checkpoint_is_a_miss() {
        tokio_test::block_on(async {
            let temp_dir = TempDir::new().unwrap();
            let cache = cache_in(temp_dir.path());
            cache.initialize().await.unwrap();

            let path = cache.checkpoint_path("lecture", 2);
            tokio::fs::write(&path, "{ not json").await.unwrap();

            assert!(cache.load_checkpoint("lecture", 2).await.is_none());
        });
    }

    #[tokio::test]
    async fn test_clear_transient_state() {
        let temp_dir = TempDir::new().unwrap();
        let cache = cache_in(temp_dir.path());
        cache.initialize().await.unwrap();

        let result = sample_result();
        cache.store_checkpoint("lecture", 0, &result).await.unwrap();
        cache.store_checkpoint("lecture", 1, &result).await.unwrap();

        let chunk_a = temp_dir.path().join("lecture_part0.flac");
        let chunk_b = temp_dir.path().join("lecture_part1.flac");
        tokio::fs::write(&chunk_a, b"x").await.unwrap();
        tokio::fs::write(&chunk_b, b"x").await.unwrap();

        let removed = cache
            .clear_transient_state("lecture", &[chunk_a.clone(), chunk_b.clone()])
            .await
            .unwrap();

        assert_eq!(removed, 4);
        assert!(!chunk_a.exists());
        assert!(!chunk_b.exists());
        assert!(cache.load_checkpoint("lecture", 0).await.is_none());
        assert!(cache.load_checkpoint("lecture", 1).await.is_none());
    }
}
