//! Demo player: load a directory of sounds and play them through the
//! default backend.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polyvox::{AudioManager, BackendKind, BufferMode, EngineConfig, SourceMode};

/// Play audio files from a directory.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing audio files (ogg/wav/flac/spx)
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Sound names to play; defaults to everything found
    #[arg(short, long, value_name = "NAME")]
    sound: Vec<String>,

    /// Stream instead of preloading
    #[arg(long)]
    stream: bool,

    /// Fade-in time in seconds
    #[arg(short, long, default_value_t = 0.0)]
    fade: f32,

    /// Output device name (default device when omitted)
    #[arg(short, long)]
    device: Option<String>,

    /// Run without an audio device
    #[arg(long)]
    disabled: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("polyvox={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig {
        backend: if args.disabled {
            BackendKind::Disabled
        } else {
            BackendKind::Default
        },
        device_name: args.device.clone(),
        threaded: true,
        ..EngineConfig::default()
    };
    let manager = AudioManager::new(config)?;

    let buffer_mode = if args.stream {
        BufferMode::Streamed
    } else {
        BufferMode::Full
    };
    manager.create_category("demo", buffer_mode, SourceMode::Disk);
    let names = manager.create_sounds_from_path(&args.path, Some("demo"), "")?;
    info!("loaded {} sounds: {}", names.len(), names.join(", "));

    let to_play = if args.sound.is_empty() {
        names
    } else {
        args.sound.clone()
    };

    for name in &to_play {
        let info = manager.sound_info(name)?;
        info!(
            "playing '{}' ({:.2}s, {} Hz, {} ch)",
            name, info.duration, info.sample_rate, info.channels
        );
        manager.play(name, args.fade, false)?;
        // Wait for the managed player to be reclaimed.
        loop {
            std::thread::sleep(Duration::from_millis(50));
            if manager.playing_count(name) == 0 && manager.fading_count(name) == 0 {
                break;
            }
        }
    }

    Ok(())
}
