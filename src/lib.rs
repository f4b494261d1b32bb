//! # polyvox
//!
//! Cross-backend audio playback engine.
//!
//! Named sound assets on disk or in memory are decoded from OGG Vorbis,
//! WAV, FLAC and SPX containers and played through a host audio
//! subsystem, with per-sound, per-category and global controls for
//! gain, looping, pausing, fading and lifecycle suspend/resume.
//!
//! **Architecture:** an [`AudioManager`] owns arenas of categories,
//! sounds, buffers and players behind one mutex; an optional worker
//! thread ticks the engine, an async loader decodes in the background,
//! and backends plug in behind the traits in [`backend`].

pub mod backend;
pub mod buffer;
pub mod category;
pub mod config;
pub mod error;
pub mod manager;
pub mod sound;
pub mod source;
pub mod types;

mod loader;
mod player;

pub use backend::{has_backend, AudioBackend, BackendVoice};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use manager::{AudioManager, PlayerHandle};
pub use player::PlayerId;
pub use sound::SoundInfo;
pub use types::{AudioFormat, BackendKind, BufferMode, PcmSpec, SourceMode};
