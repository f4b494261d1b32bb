//! Error types for the playback engine.
//!
//! One crate-wide error enum using thiserror. Registry misses and destroy
//! conflicts are fatal to the calling operation; decode and backend
//! failures are handled locally by the state machines and only surface
//! here when the caller asked for the failing work directly.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Category lookup by name failed.
    #[error("category '{0}' does not exist")]
    CategoryNotFound(String),

    /// Sound lookup by name failed.
    #[error("sound '{0}' does not exist")]
    SoundNotFound(String),

    /// Operation on a player that has already been destroyed.
    #[error("player no longer exists")]
    PlayerNotFound,

    /// Destroy blocked because manual players still reference the sounds.
    #[error("sounds cannot be destroyed, manual players still exist: {}", sounds.join(", "))]
    Busy {
        /// Names of the sounds still held by manual players.
        sounds: Vec<String>,
    },

    /// No decoder is registered for the file's extension.
    #[error("unknown audio format: {}", path.display())]
    UnknownFormat { path: PathBuf },

    /// A decoder rejected or failed on its input.
    #[error("decode error: {0}")]
    Decode(String),

    /// Backend initialization or a backend call failed.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// Operation not valid for the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the engine Error.
pub type Result<T> = std::result::Result<T, Error>;
