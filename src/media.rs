use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::AudioConfig;

/// Media file extensions the pipeline accepts. Bare audio files are accepted
/// too; ffmpeg handles the demuxing either way.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "mp3", "wav", "flac", "m4a",
];

/// Stable key identifying a source media file across runs.
///
/// Derived from the filename stem with characters that are awkward in derived
/// filenames replaced. All artifact, checkpoint and transcript paths hang off
/// this key.
pub fn source_key(media_path: &Path) -> Result<String> {
    let stem = media_path
        .file_stem()
        .ok_or_else(|| anyhow!("invalid media filename: {}", media_path.display()))?
        .to_string_lossy();

    Ok(stem.replace(' ', "_").replace('.', "_"))
}

/// Probes decoded audio durations.
///
/// The chunker and the timeline assembler both need exact decoded durations;
/// this seam lets tests supply them without shelling out to ffprobe.
#[async_trait]
pub trait AudioProbe: Send + Sync {
    /// Exact decoded duration of an audio file, in seconds.
    async fn duration_secs(&self, audio_path: &Path) -> Result<f64>;
}

/// ffprobe-backed duration probe.
#[derive(Debug, Clone, Default)]
pub struct FfprobeAudioProbe;

#[async_trait]
impl AudioProbe for FfprobeAudioProbe {
    async fn duration_secs(&self, audio_path: &Path) -> Result<f64> {
        let output = tokio::process::Command::new("ffprobe")
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                audio_path
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF8 path: {}", audio_path.display()))?,
            ])
            .output()
            .await
            .context("failed to run ffprobe (is it installed?)")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed for {} (exit: {})",
                audio_path.display(),
                output.status
            ));
        }

        let probe: serde_json::Value = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("unparseable ffprobe output for {}", audio_path.display()))?;

        probe["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                anyhow!(
                    "no duration in ffprobe output for {}",
                    audio_path.display()
                )
            })
    }
}

/// Extracts a normalized audio artifact from an arbitrary media file.
///
/// One artifact per source file, at a deterministic path. The artifact's
/// existence on disk is the cache signal: a second extraction of the same
/// source returns immediately without invoking ffmpeg.
#[derive(Debug, Clone)]
pub struct MediaExtractor {
    audio: AudioConfig,
}

impl MediaExtractor {
    pub fn new(audio: AudioConfig) -> Self {
        Self { audio }
    }

    /// Deterministic artifact path for a source key.
    pub fn artifact_path(&self, output_dir: &Path, key: &str) -> PathBuf {
        output_dir.join(format!("{}.{}", key, self.audio.target_codec))
    }

    /// Extract mono, fixed-sample-rate, losslessly encoded audio from
    /// `media_path` into `output_dir`, returning the artifact path.
    ///
    /// Idempotent: if the artifact already exists it is returned as-is.
    /// A non-zero ffmpeg exit status is fatal and never retried.
    pub async fn extract(&self, media_path: &Path, output_dir: &Path) -> Result<PathBuf> {
        let key = source_key(media_path)?;
        let audio_path = self.artifact_path(output_dir, &key);

        if audio_path.exists() {
            debug!("📋 Audio artifact already on disk: {}", audio_path.display());
            return Ok(audio_path);
        }

        tokio::fs::create_dir_all(output_dir).await?;

        info!("🎵 Extracting audio: {}", media_path.display());

        let status = tokio::process::Command::new("ffmpeg")
            .args([
                "-y",
                "-i",
                media_path
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF8 path: {}", media_path.display()))?,
                "-vn", // No video stream
                "-ac",
                "1", // Mono
                "-ar",
                &self.audio.target_sample_rate.to_string(),
                "-c:a",
                &self.audio.target_codec,
                audio_path
                    .to_str()
                    .ok_or_else(|| anyhow!("non-UTF8 path: {}", audio_path.display()))?,
            ])
            .status()
            .await
            .context("failed to run ffmpeg (is it installed?)")?;

        if !status.success() {
            return Err(anyhow!(
                "ffmpeg audio extraction failed for {} (exit: {})",
                media_path.display(),
                status
            ));
        }

        info!("✅ Audio extracted: {}", audio_path.display());
        Ok(audio_path)
    }
}

/// Discover media files under a directory, sorted for deterministic batch order.
pub fn discover_media(input_dir: &Path) -> Vec<PathBuf> {
    let mut media: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
                })
                .unwrap_or(false)
        })
        .collect();

    media.sort();
    media
}
