use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::AudioConfig;
use crate::media::AudioProbe;

/// Time span of one chunk within the source audio, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start_secs: f64,
    pub len_secs: f64,
}

/// Deterministic split of a total duration into bounded-length spans.
///
/// Pure arithmetic, independent of the filesystem: `ceil(total / chunk)`
/// spans, each at most `chunk` seconds, indices in strict temporal order.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    spans: Vec<ChunkSpan>,
}

impl ChunkPlan {
    pub fn new(total_secs: f64, chunk_secs: f64) -> Result<Self> {
        if chunk_secs <= 0.0 {
            return Err(anyhow!("chunk duration must be positive"));
        }
        if total_secs < 0.0 {
            return Err(anyhow!("total duration must be non-negative"));
        }

        let count = (total_secs / chunk_secs).ceil() as usize;
        let spans = (0..count)
            .map(|i| {
                let start_secs = i as f64 * chunk_secs;
                let end_secs = ((i + 1) as f64 * chunk_secs).min(total_secs);
                ChunkSpan {
                    index: i,
                    start_secs,
                    len_secs: end_secs - start_secs,
                }
            })
            .collect();

        Ok(Self { spans })
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn spans(&self) -> &[ChunkSpan] {
        &self.spans
    }
}

/// Splits a normalized audio artifact into bounded-duration chunk files.
///
/// Chunk paths are deterministic, so a crash mid-split resumes where it left
/// off: existing chunk files are reused and only missing ones are encoded.
#[derive(Debug, Clone)]
pub struct Chunker {
    audio: AudioConfig,
}

impl Chunker {
    pub fn new(audio: AudioConfig) -> Self {
        Self { audio }
    }

    /// Deterministic path of chunk `index` for an artifact.
    pub fn chunk_path(&self, artifact_path: &Path, index: usize) -> PathBuf {
        let stem = artifact_path
            .file_stem()
            .unwrap_or_default()
            .to_string_lossy();
        let parent = artifact_path.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!("{}_part{}.{}", stem, index, self.audio.target_codec))
    }

    /// Split the artifact into chunks, returning the full ordered path list.
    ///
    /// Returns every chunk path even when all of them already existed (the
    /// full-cache-hit path issues no ffmpeg calls at all).
    pub async fn split(
        &self,
        artifact_path: &Path,
        probe: &dyn AudioProbe,
    ) -> Result<Vec<PathBuf>> {
        let total_secs = probe
            .duration_secs(artifact_path)
            .await
            .with_context(|| format!("failed to probe {}", artifact_path.display()))?;

        let plan = ChunkPlan::new(total_secs, self.audio.chunk_duration_secs as f64)?;
        info!(
            "✂️ Splitting {:.1}s of audio into {} chunks of ≤{}s",
            total_secs,
            plan.len(),
            self.audio.chunk_duration_secs
        );

        let mut chunk_paths = Vec::with_capacity(plan.len());
        let mut materialized = 0usize;

        for span in plan.spans() {
            let chunk_path = self.chunk_path(artifact_path, span.index);

            if chunk_path.exists() {
                debug!("📋 Reusing existing chunk: {}", chunk_path.display());
            } else {
                self.materialize_chunk(artifact_path, &chunk_path, span)
                    .await?;
                materialized += 1;
            }

            chunk_paths.push(chunk_path);
        }

        info!(
            "✅ {} chunks ready ({} newly encoded, {} reused)",
            chunk_paths.len(),
            materialized,
            chunk_paths.len() - materialized
        );

        Ok(chunk_paths)
    }

    /// Encode one chunk by slicing the artifact at the span boundaries.
    async fn materialize_chunk(
        &self,
        artifact_path: &Path,
        chunk_path: &Path,
        span: &ChunkSpan,
    ) -> Result<()> {
        let status = tokio::process::Command::new("ffmpeg")
            .args([
                "-y",
                "-i",
                artifact_path
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF8 path: {}", artifact_path.display()))?,
                "-ss",
                &format!("{:.3}", span.start_secs),
                "-t",
                &format!("{:.3}", span.len_secs),
                "-c:a",
                &self.audio.target_codec,
                chunk_path
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF8 path: {}", chunk_path.display()))?,
            ])
            .status()
            .await
            .context("failed to run ffmpeg (is it installed?)")?;

        if !status.success() {
            return Err(anyhow!(
                "ffmpeg failed to encode chunk {} of {} (exit: {})",
                span.index,
                artifact_path.display(),
                status
            ));
        }

        debug!("✂️ Encoded chunk {}: {}", span.index, chunk_path.display());
        Ok(())
    }
}
