//! Shared value types: formats, load policies, backend kinds and PCM
//! descriptions.

use std::fmt;
use std::path::Path;

/// Size of one streaming chunk in PCM bytes.
pub const STREAM_BUFFER_SIZE: usize = 32768;

/// Number of chunks a streaming voice keeps queued.
pub const STREAM_BUFFER_COUNT: usize = 4;

/// Container format of a sound, inferred from its file extension.
///
/// `Memory` marks sounds constructed from raw PCM rather than a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioFormat {
    Flac,
    Ogg,
    Spx,
    Wav,
    Memory,
    Unknown,
}

impl AudioFormat {
    /// Infer the format from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("flac") => AudioFormat::Flac,
            Some("ogg") => AudioFormat::Ogg,
            Some("spx") => AudioFormat::Spx,
            Some("wav") => AudioFormat::Wav,
            _ => AudioFormat::Unknown,
        }
    }

    /// The extension handed to the decoder probe as a format hint.
    pub fn extension_hint(&self) -> Option<&'static str> {
        match self {
            AudioFormat::Flac => Some("flac"),
            AudioFormat::Ogg => Some("ogg"),
            // Speex lives in an Ogg container; the probe keys on content.
            AudioFormat::Spx => Some("spx"),
            AudioFormat::Wav => Some("wav"),
            AudioFormat::Memory | AudioFormat::Unknown => None,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Flac => "FLAC",
            AudioFormat::Ogg => "OGG",
            AudioFormat::Spx => "SPX",
            AudioFormat::Wav => "WAV",
            AudioFormat::Memory => "Memory",
            AudioFormat::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// When a buffer's PCM is decoded and when it is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// Decode at sound creation, keep until destroy.
    Full,
    /// Hand to the async loader at creation, keep until destroy.
    Async,
    /// Decode at first player bind, keep until destroy.
    Lazy,
    /// Decode at first bind, release after sitting idle and unbound.
    Managed,
    /// Decode at first bind, release when the last player unbinds.
    OnDemand,
    /// Keep the decoder open and feed fixed-size chunks on demand.
    Streamed,
}

/// Where the encoded bytes live while a source is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    /// The decoder reads from disk on demand.
    Disk,
    /// The entire encoded file is held in memory once opened.
    Ram,
}

/// Host audio subsystem selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Best available backend for the build target.
    Default,
    /// No-op backend: sound registry works, playback is silent.
    Disabled,
    DirectSound,
    OpenAL,
    OpenSles,
    Sdl,
    XAudio2,
}

/// Description of a PCM payload: layout, rate and sample width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl PcmSpec {
    /// Bytes per interleaved frame (all channels, one sample each).
    pub fn frame_size(&self) -> u64 {
        self.channels as u64 * (self.bits_per_sample as u64 / 8)
    }

    /// PCM bytes consumed per second of playback.
    pub fn byte_rate(&self) -> u64 {
        self.sample_rate as u64 * self.frame_size()
    }

    /// Playback length in seconds of `bytes` of PCM.
    pub fn duration_of(&self, bytes: u64) -> f32 {
        let rate = self.byte_rate();
        if rate == 0 {
            return 0.0;
        }
        bytes as f32 / rate as f32
    }
}

impl Default for PcmSpec {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn format_from_extension() {
        assert_eq!(AudioFormat::from_path(Path::new("a/b/beep.wav")), AudioFormat::Wav);
        assert_eq!(AudioFormat::from_path(Path::new("music.OGG")), AudioFormat::Ogg);
        assert_eq!(AudioFormat::from_path(Path::new("voice.spx")), AudioFormat::Spx);
        assert_eq!(AudioFormat::from_path(Path::new("track.flac")), AudioFormat::Flac);
        assert_eq!(AudioFormat::from_path(Path::new("track.mp3")), AudioFormat::Unknown);
        assert_eq!(AudioFormat::from_path(&PathBuf::from("noext")), AudioFormat::Unknown);
    }

    #[test]
    fn pcm_spec_math() {
        let spec = PcmSpec::default();
        assert_eq!(spec.frame_size(), 4);
        assert_eq!(spec.byte_rate(), 176_400);
        let half_second = spec.byte_rate() / 2;
        assert!((spec.duration_of(half_second) - 0.5).abs() < 1e-6);
    }
}
