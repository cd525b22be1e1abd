use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::assembler::TimelineAssembler;
use crate::cache::PipelineCache;
use crate::chunker::Chunker;
use crate::config::{Config, TranscriptionConfig};
use crate::media::{source_key, AudioProbe, FfprobeAudioProbe, MediaExtractor};
use crate::transcript::{ChunkTranscription, Transcript};
use crate::transcription::{OpenAiTranscriber, TranscribeError, TranscriptionService};

/// Call the transcription service for one chunk, retrying transient failures.
///
/// Attempt n (1-based) sleeps `base_delay * n` before the next try. The retry
/// history travels back with the result as data instead of being woven into
/// exception control flow, so callers and tests can inspect it.
pub(crate) async fn transcribe_with_retry(
    service: &dyn TranscriptionService,
    chunk_path: &Path,
    language: Option<&str>,
    max_attempts: u32,
    base_delay: Duration,
) -> (Result<ChunkTranscription, TranscribeError>, Vec<Duration>) {
    let mut delays = Vec::new();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match service.transcribe_chunk(chunk_path, language).await {
            Ok(result) => return (Ok(result), delays),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = base_delay * attempt;
                warn!(
                    "⏳ Transient failure on {} (attempt {}/{}), retrying in {:.1}s: {}",
                    chunk_path.display(),
                    attempt,
                    max_attempts,
                    delay.as_secs_f64(),
                    e
                );
                tokio::time::sleep(delay).await;
                delays.push(delay);
            }
            Err(e) => return (Err(e), delays),
        }
    }
}

/// Bounded pool of transcription workers.
///
/// A queue of chunk indices feeds `max_workers` tasks; each task owns exactly
/// one chunk at a time and writes only to that chunk's checkpoint path, so no
/// write ever races. Completion order is unconstrained; the assembler imposes
/// the final ordering.
pub struct TranscriptionWorkerPool {
    service: Arc<dyn TranscriptionService>,
    cache: PipelineCache,
    transcription: TranscriptionConfig,
    max_workers: usize,
}

impl TranscriptionWorkerPool {
    pub fn new(
        service: Arc<dyn TranscriptionService>,
        cache: PipelineCache,
        transcription: TranscriptionConfig,
        max_workers: usize,
    ) -> Self {
        Self {
            service,
            cache,
            transcription,
            max_workers,
        }
    }

    /// Transcribe every chunk, returning results keyed by chunk index.
    ///
    /// Per chunk: an existing checkpoint is loaded without any service call;
    /// otherwise the service is called with retries and the result is
    /// checkpointed before being reported. The first unrecoverable failure
    /// aborts outstanding and queued work, leaving all durable checkpoints in
    /// place for the next invocation to resume from.
    pub async fn transcribe_all(
        &self,
        key: &str,
        chunk_paths: &[PathBuf],
    ) -> Result<HashMap<usize, ChunkTranscription>> {
        if chunk_paths.is_empty() {
            return Ok(HashMap::new());
        }

        let total = chunk_paths.len();
        let workers = self.max_workers.min(total);
        info!(
            "🚀 Transcribing {} chunks with {} workers",
            total, workers
        );

        let (job_tx, job_rx) = mpsc::channel::<usize>(total);
        for index in 0..total {
            // Channel capacity covers every index, so this never blocks
            job_tx
                .send(index)
                .await
                .map_err(|_| anyhow!("job queue closed unexpectedly"))?;
        }
        drop(job_tx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) =
            mpsc::channel::<(usize, Result<ChunkTranscription>)>(total);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let service = Arc::clone(&self.service);
            let cache = self.cache.clone();
            let transcription = self.transcription.clone();
            let chunk_paths = chunk_paths.to_vec();
            let key = key.to_string();

            handles.push(tokio::spawn(async move {
                loop {
                    let index = { job_rx.lock().await.recv().await };
                    let Some(index) = index else { break };

                    let outcome = Self::process_chunk(
                        service.as_ref(),
                        &cache,
                        &transcription,
                        &key,
                        index,
                        &chunk_paths[index],
                    )
                    .await;

                    let fatal = outcome.is_err();
                    if result_tx.send((index, outcome)).await.is_err() || fatal {
                        // Coordinator gone or this worker hit an unrecoverable
                        // failure; stop pulling work either way
                        debug!("Worker {} stopping", worker_id);
                        break;
                    }
                }
            }));
        }
        drop(result_tx);

        let mut results = HashMap::with_capacity(total);
        let mut failure: Option<anyhow::Error> = None;

        while let Some((index, outcome)) = result_rx.recv().await {
            match outcome {
                Ok(result) => {
                    results.insert(index, result);
                    info!("📈 Progress: {}/{} chunks done", results.len(), total);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = failure {
            // Fail fast: cancel queued and in-flight work. Checkpoints already
            // written by other workers stay on disk untouched.
            for handle in &handles {
                handle.abort();
            }
            error!("❌ Transcription aborted for '{}': {:#}", key, e);
            return Err(e);
        }

        for handle in handles {
            let _ = handle.await;
        }

        if results.len() != total {
            return Err(anyhow!(
                "worker pool finished with {}/{} chunk results for '{}'",
                results.len(),
                total,
                key
            ));
        }

        Ok(results)
    }

    async fn process_chunk(
        service: &dyn TranscriptionService,
        cache: &PipelineCache,
        transcription: &TranscriptionConfig,
        key: &str,
        index: usize,
        chunk_path: &Path,
    ) -> Result<ChunkTranscription> {
        if let Some(result) = cache.load_checkpoint(key, index).await {
            return Ok(result);
        }

        let (result, delays) = transcribe_with_retry(
            service,
            chunk_path,
            transcription.language.as_deref(),
            transcription.max_attempts,
            transcription.retry_base_delay(),
        )
        .await;

        let result = result.map_err(|e| {
            anyhow::Error::new(e)
                .context(format!("transcription failed for chunk {} of '{}'", index, key))
        })?;

        if !delays.is_empty() {
            debug!(
                "Chunk {} succeeded after {} retries",
                index,
                delays.len()
            );
        }

        cache
            .store_checkpoint(key, index, &result)
            .await
            .with_context(|| format!("failed to checkpoint chunk {} of '{}'", index, key))?;

        Ok(result)
    }
}

/// The per-invocation pipeline context.
///
/// Owns the configuration, the storage directories, the service handle and
/// the duration probe; every stage receives what it needs from here instead
/// of reaching into shared module state.
pub struct TranscriptionPipeline {
    config: Config,
    extractor: MediaExtractor,
    chunker: Chunker,
    probe: Arc<dyn AudioProbe>,
    service: Arc<dyn TranscriptionService>,
    cache: PipelineCache,
}

impl TranscriptionPipeline {
    /// Build a pipeline backed by ffprobe and the configured remote service.
    pub fn new(config: Config) -> Result<Self> {
        let service = Arc::new(OpenAiTranscriber::new(config.transcription.clone())?);
        Self::with_backend(config, service, Arc::new(FfprobeAudioProbe))
    }

    /// Build a pipeline with explicit service and probe implementations.
    pub fn with_backend(
        config: Config,
        service: Arc<dyn TranscriptionService>,
        probe: Arc<dyn AudioProbe>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            extractor: MediaExtractor::new(config.audio.clone()),
            chunker: Chunker::new(config.audio.clone()),
            cache: PipelineCache::new(&config.storage),
            config,
            probe,
            service,
        })
    }

    /// Run the full pipeline for one media file.
    ///
    /// Extract → chunk → transcribe (parallel) → assemble → persist. Every
    /// stage is individually resumable: a cached transcript short-circuits
    /// everything, an existing audio artifact skips extraction, existing
    /// chunk files skip slicing and existing checkpoints skip service calls.
    /// On success all chunk files and checkpoints are removed; on failure
    /// they are left behind for the next invocation.
    pub async fn run(&self, media_path: &Path) -> Result<Transcript> {
        let start = Instant::now();
        let key = source_key(media_path)?;

        self.cache.initialize().await?;

        if let Some(transcript) = self.cache.load_transcript(&key).await {
            return Ok(transcript);
        }

        if !media_path.exists() {
            return Err(anyhow!("media file not found: {}", media_path.display()));
        }

        let artifact = self
            .extractor
            .extract(media_path, &self.config.storage.audio_dir)
            .await?;

        let chunk_paths = self.chunker.split(&artifact, self.probe.as_ref()).await?;

        let pool = TranscriptionWorkerPool::new(
            Arc::clone(&self.service),
            self.cache.clone(),
            self.config.transcription.clone(),
            self.config.performance.max_workers,
        );
        let results = pool.transcribe_all(&key, &chunk_paths).await?;

        let transcript = TimelineAssembler::new(self.probe.as_ref())
            .assemble(&key, &chunk_paths, results)
            .await?;

        self.cache.store_transcript(&transcript).await?;
        self.cache.clear_transient_state(&key, &chunk_paths).await?;

        info!(
            "🎉 Pipeline completed for '{}' in {:.1}s: {} segments, {} words",
            key,
            start.elapsed().as_secs_f64(),
            transcript.segments.len(),
            transcript.word_count()
        );

        Ok(transcript)
    }
}
