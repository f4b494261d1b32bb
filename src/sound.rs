//! Sound metadata: the named handle tying a file (or memory payload) to a
//! category and its buffer.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::types::AudioFormat;

/// Stable handle to a buffer in the manager's arena.
pub type BufferId = Uuid;

/// A registered sound: identity and routing only, the PCM lives in the
/// buffer.
#[derive(Debug, Clone)]
pub struct Sound {
    name: String,
    filename: Option<PathBuf>,
    format: AudioFormat,
    category: String,
    buffer: BufferId,
}

impl Sound {
    pub fn from_file(
        name: String,
        filename: PathBuf,
        format: AudioFormat,
        category: &str,
        buffer: BufferId,
    ) -> Self {
        Self {
            name,
            filename: Some(filename),
            format,
            category: category.to_owned(),
            buffer,
        }
    }

    pub fn from_memory(name: String, category: &str, buffer: BufferId) -> Self {
        Self {
            name,
            filename: None,
            format: AudioFormat::Memory,
            category: category.to_owned(),
            buffer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }
}

/// Derive a sound's registered name: prefix plus the file's base name
/// without its extension. Path separators are normalized first.
pub fn derive_name(filename: &str, prefix: &str) -> String {
    let normalized = filename.replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or(&normalized);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    format!("{prefix}{stem}")
}

/// Snapshot of a sound's metadata, readable without holding the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundInfo {
    pub name: String,
    pub category: String,
    pub format: AudioFormat,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Total PCM size in bytes; 0 until the buffer has discovered it.
    pub size: u64,
    pub duration: f32,
    pub streamed: bool,
    pub loaded: bool,
}
