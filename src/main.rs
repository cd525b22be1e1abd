use anyhow::Result;
use clap::{Arg, Command};
use std::path::PathBuf;
use tracing::{error, info, warn};

mod assembler;
mod cache;
mod chunker;
mod config;
mod media;
mod pipeline;
mod transcript;
mod transcription;

use crate::config::Config;
use crate::media::discover_media;
use crate::pipeline::TranscriptionPipeline;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("Video Analyst")
        .version("0.1.0")
        .author("TigreRoll")
        .about("Resilient chunked transcription for long-form video and audio")
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("PATH")
                .help("Media file or directory of media files to transcribe")
                .required(true),
        )
        .arg(
            Arg::new("language")
                .short('l')
                .long("language")
                .value_name("LANG")
                .help("Language hint for transcription (default: auto-detect)"),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("NUM")
                .help("Concurrent transcription requests (service rate ceiling)"),
        )
        .arg(
            Arg::new("chunk-duration")
                .long("chunk-duration")
                .value_name("SECS")
                .help("Chunk duration in seconds"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Base directory for audio artifacts, checkpoints and transcripts"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Initialize logging
    let filter = if matches.get_flag("verbose") {
        "video_analyst=debug,info"
    } else {
        "video_analyst=info,warn"
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let input = PathBuf::from(matches.get_one::<String>("input").unwrap());

    // Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {}", e);
        Config::default().with_env_overrides()
    });

    if let Some(language) = matches.get_one::<String>("language") {
        config.transcription.language = Some(language.clone());
    }
    if let Some(workers) = matches.get_one::<String>("workers") {
        config.performance.max_workers = workers.parse()?;
    }
    if let Some(chunk_secs) = matches.get_one::<String>("chunk-duration") {
        config.audio.chunk_duration_secs = chunk_secs.parse()?;
    }
    if let Some(output_dir) = matches.get_one::<String>("output-dir") {
        config.set_data_dir(PathBuf::from(output_dir));
    }

    if !input.exists() {
        error!("Input does not exist: {}", input.display());
        return Err(anyhow::anyhow!("input not found"));
    }

    let media_files = if input.is_dir() {
        let found = discover_media(&input);
        if found.is_empty() {
            warn!("No media files found in {}", input.display());
            return Ok(());
        }
        found
    } else {
        vec![input]
    };

    info!("🚀 Video Analyst starting...");
    info!("🔧 Workers: {}", config.performance.max_workers);
    info!("✂️ Chunk duration: {}s", config.audio.chunk_duration_secs);
    info!("📹 {} file(s) to process", media_files.len());

    let pipeline = TranscriptionPipeline::new(config)?;

    let mut successful = 0usize;
    let mut failed = 0usize;
    let start = std::time::Instant::now();

    // Files run sequentially: the worker pool already saturates the
    // transcription service's concurrent-request ceiling for one file
    for media_path in &media_files {
        info!("📹 Processing: {}", media_path.display());
        match pipeline.run(media_path).await {
            Ok(transcript) => {
                successful += 1;
                info!(
                    "✅ {}: {} segments, {} words, {:.1}s of audio",
                    transcript.source_key,
                    transcript.segments.len(),
                    transcript.word_count(),
                    transcript.duration()
                );
            }
            Err(e) => {
                failed += 1;
                error!("❌ {}: {:#}", media_path.display(), e);
            }
        }
    }

    info!(
        "🎉 Done in {:.1}s: {} succeeded, {} failed",
        start.elapsed().as_secs_f64(),
        successful,
        failed
    );

    if failed > 0 {
        return Err(anyhow::anyhow!("{} file(s) failed", failed));
    }

    Ok(())
}
