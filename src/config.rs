use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the video analyst pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Audio extraction and chunking settings
    pub audio: AudioConfig,

    /// Transcription service settings
    pub transcription: TranscriptionConfig,

    /// Worker pool settings
    pub performance: PerformanceConfig,

    /// On-disk layout for artifacts, checkpoints and transcripts
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate for extracted audio
    pub target_sample_rate: u32,

    /// Target audio codec (lossless, to avoid transcription artifacts)
    pub target_codec: String,

    /// Duration of each transcription chunk in seconds
    pub chunk_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// API endpoint for the transcription service
    pub api_endpoint: String,

    /// API key for the transcription service
    pub api_key: Option<String>,

    /// Model to use for transcription
    pub model: String,

    /// Language hint for transcription (None = auto-detect)
    pub language: Option<String>,

    /// Total attempts per chunk, including the first one
    pub max_attempts: u32,

    /// Base delay between retries in milliseconds; attempt n waits n * base
    pub retry_base_delay_ms: u64,

    /// Timeout per transcription request (seconds)
    pub request_timeout_secs: u64,
}

impl TranscriptionConfig {
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum number of concurrent transcription workers.
    /// This bounds in-flight requests to the external service, it is not a
    /// local resource limit.
    pub max_workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for extracted audio artifacts and chunk files
    pub audio_dir: PathBuf,

    /// Directory for per-chunk checkpoint files
    pub checkpoint_dir: PathBuf,

    /// Directory for final transcripts
    pub transcript_dir: PathBuf,
}

impl Config {
    /// Load configuration from file, falling back to environment variables
    pub fn load() -> Result<Self> {
        let config_paths = [
            "video-analyst.toml",
            "config/video-analyst.toml",
            "~/.config/video-analyst/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config.with_env_overrides());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Ok(Self::default().with_env_overrides())
    }

    /// Apply environment variable overrides on top of the current values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.transcription.api_key = Some(key);
        }

        if let Ok(workers) = std::env::var("VIDEO_ANALYST_WORKERS") {
            if let Ok(workers) = workers.parse() {
                self.performance.max_workers = workers;
            }
        }

        if let Ok(chunk_secs) = std::env::var("VIDEO_ANALYST_CHUNK_SECS") {
            if let Ok(chunk_secs) = chunk_secs.parse() {
                self.audio.chunk_duration_secs = chunk_secs;
            }
        }

        if let Ok(data_dir) = std::env::var("VIDEO_ANALYST_DATA_DIR") {
            self.set_data_dir(PathBuf::from(data_dir));
        }

        self
    }

    /// Point all storage directories at subdirectories of one base.
    pub fn set_data_dir(&mut self, base: PathBuf) {
        self.storage.audio_dir = base.join("audio");
        self.storage.checkpoint_dir = base.join("checkpoints");
        self.storage.transcript_dir = base.join("transcripts");
    }

    /// Validate configuration before running the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.performance.max_workers == 0 {
            return Err(anyhow!("max_workers must be greater than 0"));
        }

        if self.audio.target_sample_rate == 0 {
            return Err(anyhow!("target_sample_rate must be greater than 0"));
        }

        if self.audio.chunk_duration_secs == 0 {
            return Err(anyhow!("chunk_duration_secs must be greater than 0"));
        }

        if self.transcription.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be greater than 0"));
        }

        // Missing credentials are fatal before any network call is made
        if self.transcription.api_key.is_none() {
            return Err(anyhow!(
                "transcription API key not configured (set OPENAI_API_KEY)"
            ));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                target_sample_rate: 16000, // Optimal for Whisper
                target_codec: "flac".to_string(),
                // 10 minutes of 16kHz mono FLAC stays under the upload limit
                chunk_duration_secs: 600,
            },
            transcription: TranscriptionConfig {
                api_endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
                api_key: None,
                model: "whisper-1".to_string(),
                language: None,
                max_attempts: 3,
                retry_base_delay_ms: 2000,
                request_timeout_secs: 300,
            },
            performance: PerformanceConfig {
                max_workers: 3, // The service's concurrent-request ceiling
            },
            storage: StorageConfig {
                audio_dir: PathBuf::from("data/audio"),
                checkpoint_dir: PathBuf::from("data/checkpoints"),
                transcript_dir: PathBuf::from("data/transcripts"),
            },
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.performance.max_workers = workers;
        self
    }

    pub fn with_chunk_duration(mut self, secs: u64) -> Self {
        self.config.audio.chunk_duration_secs = secs;
        self
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.config.transcription.api_key = Some(api_key);
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.config.transcription.language = language;
        self
    }

    pub fn with_data_dir(mut self, base: PathBuf) -> Self {
        self.config.set_data_dir(base);
        self
    }

    pub fn with_retry_base_delay_ms(mut self, millis: u64) -> Self {
        self.config.transcription.retry_base_delay_ms = millis;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
