//! Format decoders.
//!
//! A [`Source`] is a decoder bound to one encoded file: it reports the
//! stream's PCM layout and yields interleaved 16-bit PCM either whole or
//! in fixed-size chunks. One source exists per open buffer; the manager
//! picks the implementation by file extension.

mod symphonia;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{AudioFormat, PcmSpec, SourceMode};

pub use self::symphonia::SymphoniaSource;

/// A decoder over one encoded audio file.
///
/// All byte counts are PCM bytes (16-bit little-endian interleaved).
pub trait Source: Send {
    /// Open the underlying stream and read the metadata. Idempotent.
    fn open(&mut self) -> Result<()>;

    /// Release the decoder state; `open` may be called again afterwards.
    fn close(&mut self);

    /// Seek back to the first PCM frame.
    fn rewind(&mut self) -> Result<()>;

    /// Decode everything from the current position to end of stream,
    /// appending to `output`. Returns the number of bytes appended.
    fn load(&mut self, output: &mut Vec<u8>) -> Result<usize>;

    /// Decode up to `size` bytes, appending to `output`. Returns the
    /// number of bytes appended; 0 signals end of stream.
    fn load_chunk(&mut self, output: &mut Vec<u8>, size: usize) -> Result<usize>;

    fn is_open(&self) -> bool;

    /// PCM layout of the decoded stream. Valid after `open`.
    fn spec(&self) -> PcmSpec;

    /// Total decoded size in bytes, when the container declares it.
    /// 0 until known (some streams only reveal it at end of stream).
    fn size(&self) -> u64;

    /// Decoded duration in seconds; 0 until the size is known.
    fn duration(&self) -> f32 {
        self.spec().duration_of(self.size())
    }
}

/// Construct the decoder for `format`.
///
/// Every supported container goes through the symphonia probe; the format
/// only selects the extension hint handed to it. Unknown formats (and the
/// Memory pseudo-format, which has no file) are rejected here.
pub fn create_source(
    path: &Path,
    format: AudioFormat,
    source_mode: SourceMode,
) -> Result<Box<dyn Source>> {
    match format {
        AudioFormat::Flac | AudioFormat::Ogg | AudioFormat::Spx | AudioFormat::Wav => Ok(
            Box::new(SymphoniaSource::new(path.to_path_buf(), format, source_mode)),
        ),
        AudioFormat::Memory | AudioFormat::Unknown => Err(Error::UnknownFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Resolve a sound filename against the registered extensions.
///
/// Tries the name as given, then the name with each extension appended,
/// then the same with any existing extension stripped. Returns the first
/// path that exists on disk.
pub fn find_audio_file(filename: &str, extensions: &[String]) -> Option<PathBuf> {
    let normalized = filename.replace('\\', "/");
    let direct = PathBuf::from(&normalized);
    if direct.is_file() {
        return Some(direct);
    }
    for ext in extensions {
        let candidate = PathBuf::from(format!("{normalized}{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if let Some((stem, _)) = normalized.rsplit_once('.') {
        if !stem.is_empty() && stem != normalized {
            for ext in extensions {
                let candidate = PathBuf::from(format!("{stem}{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}
