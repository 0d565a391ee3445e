// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{Context, Result};
use clap::Parser;
use motion_clip_recorder::config::{load_config_with_env, RecorderConfig};
use motion_clip_recorder::control::{
    feed_chat_commands, ArmState, CommandQueue, FileCommandQueue, MemoryCommandQueue,
};
use motion_clip_recorder::motion::FrameDiffDetector;
use motion_clip_recorder::recorder::{ClipRecorder, ClipSettings};
use motion_clip_recorder::runner::Runner;
use motion_clip_recorder::source::SnapshotSource;
use motion_clip_recorder::upload::{ClipSink, SinkFactory};
use motion_clip_recorder::video::FfmpegWriterFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Motion Clip Recorder - record motion clips from a snapshot camera
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Clip directory (overrides config file)
    #[arg(long)]
    clip_dir: Option<String>,

    /// Start armed regardless of configuration
    #[arg(long)]
    armed: bool,
}

fn init_tracing(config: &RecorderConfig) -> Result<()> {
    let level = match config.logging.level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn build_command_queue(config: &RecorderConfig) -> Result<Arc<dyn CommandQueue>> {
    match config.commands.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryCommandQueue::new())),
        _ => {
            let queue = FileCommandQueue::new(&config.commands.file_path)
                .context("Failed to prepare command file")?;
            Ok(Arc::new(queue))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(clip_dir) = args.clip_dir {
        config.clips.clip_dir = clip_dir;
    }
    if args.armed {
        config.commands.armed_on_boot = true;
    }

    init_tracing(&config)?;

    info!("Starting Motion Clip Recorder");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Camera: {}", config.camera.snapshot_url);
    info!("Clip directory: {}", config.clips.clip_dir);

    let writers = Arc::new(FfmpegWriterFactory::new(config.clips.ffmpeg_binary.clone()));
    let recorder = ClipRecorder::new(ClipSettings::from(&config.clips), writers)
        .context("Failed to initialize clip recorder")?;

    let source = SnapshotSource::new(&config.camera).context("Failed to create frame source")?;
    let detector = FrameDiffDetector::new(&config.motion);
    let commands = build_command_queue(&config)?;

    // The in-memory queue has no other producer: take chat commands from stdin
    if config.commands.backend == "memory" {
        info!("Reading chat commands (/clip N, /arm, /disarm) from stdin");
        let queue = commands.clone();
        tokio::spawn(async move {
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            match feed_chat_commands(stdin, queue).await {
                Ok(count) => info!("stdin closed after {} chat commands", count),
                Err(e) => warn!("Stopped reading chat commands: {}", e),
            }
        });
    }
    let armed = ArmState::new(config.commands.armed_on_boot);

    let mut runner = Runner::new(
        Box::new(source),
        Box::new(detector),
        commands,
        armed,
        recorder,
    )
    .with_failures_before_recover(config.camera.failures_before_recover);

    if let Some(sink) = SinkFactory::create(&config.upload)? {
        info!("Clip sink initialized: {}", sink.sink_type());
        runner = runner.with_sink(sink, config.upload.max_retries);
    }

    // Run the loop (until Ctrl+C)
    tokio::select! {
        _ = runner.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    // Cleanup
    runner.shutdown().await;
    info!("Motion Clip Recorder shut down successfully");

    Ok(())
}
