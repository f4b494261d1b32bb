//! Backend seam: what the engine requires from a host audio subsystem.
//!
//! The core never branches on backend identity; it talks to a boxed
//! [`AudioBackend`] for system-level concerns and to one boxed
//! [`BackendVoice`] per player. Two implementations ship with the crate:
//! the cpal-based default output and a disabled no-op. The platform
//! kinds (DirectSound, OpenAL, OpenSLES, SDL, XAudio2) are driver
//! territory a host links in through [`AudioManager::with_backend`].
//!
//! [`AudioManager::with_backend`]: crate::AudioManager::with_backend

mod cpal;
mod null;

use tracing::warn;

use crate::buffer::Buffer;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::types::{BackendKind, PcmSpec};

pub use self::cpal::CpalBackend;
pub use self::null::NullBackend;

/// System-level contract of a host audio subsystem.
pub trait AudioBackend: Send {
    fn kind(&self) -> BackendKind;

    /// False for the disabled backend: sounds register but stay silent.
    fn is_enabled(&self) -> bool {
        true
    }

    fn sampling_rate(&self) -> u32;
    fn channels(&self) -> u16;
    fn bits_per_sample(&self) -> u16;

    /// Construct a voice for a new player. Cheap; the device voice is
    /// acquired later by [`BackendVoice::prepare_play`].
    fn create_voice(&mut self) -> Result<Box<dyn BackendVoice>>;

    /// Globally halt output (e.g. on focus loss).
    fn suspend(&mut self) {}

    /// Undo [`AudioBackend::suspend`].
    fn resume(&mut self) {}

    /// Per-tick system maintenance hook.
    fn update(&mut self, _dt: f32) {}

    /// Reserved in-place resampling/reformatting hook. The default
    /// leaves the stream untouched.
    fn convert_stream(&self, _spec: &PcmSpec, _stream: &mut Vec<u8>) {}
}

/// Per-voice contract of a host audio subsystem.
///
/// All positions and sizes are PCM bytes.
pub trait BackendVoice: Send {
    /// Acquire a device voice. May fail when the device is out of
    /// voices; the player then stays idle.
    fn prepare_play(&mut self) -> bool;

    /// Push the buffer's PCM (or prime the first streaming chunks) and
    /// seek to `offset_bytes`.
    fn prepare_buffer(&mut self, buffer: &mut Buffer, looping: bool, offset_bytes: u64)
        -> Result<()>;

    /// Push the player's effective gain.
    fn update_gain(&mut self, gain: f32);

    /// Push the player's pitch. Backends without pitch control no-op.
    fn update_pitch(&mut self, _pitch: f32) {}

    /// Start the voice.
    fn play(&mut self);

    /// Stop the voice and release it. Returns the bytes played, used to
    /// preserve the offset across a pause.
    fn stop(&mut self) -> u64;

    /// Per-tick maintenance for non-streamed playback (loop restarts,
    /// end-of-buffer reclaim).
    fn update_normal(&mut self, buffer: &mut Buffer, looping: bool, dt: f32);

    /// Per-tick maintenance for streamed playback: refill and re-enqueue
    /// chunks from the buffer. Returns the bytes consumed since the last
    /// call.
    fn update_stream(&mut self, buffer: &mut Buffer, looping: bool, dt: f32) -> u64;

    fn is_playing(&self) -> bool;

    /// Playback position in bytes within the queued PCM.
    fn get_buffer_position(&self) -> u64;

    /// True when [`BackendVoice::get_buffer_position`] only covers the
    /// current streaming window, so the engine must correct streamed
    /// offsets with its cumulative counter.
    fn needs_streamed_buffer_position_correction(&self) -> bool {
        false
    }
}

/// Whether this build can construct the given backend kind.
pub fn has_backend(kind: BackendKind) -> bool {
    matches!(kind, BackendKind::Default | BackendKind::Disabled)
}

/// Construct the backend selected by the configuration.
///
/// A default backend whose device cannot be opened degrades to the
/// disabled backend so the host keeps working without audio.
pub fn create_backend(config: &EngineConfig) -> Result<Box<dyn AudioBackend>> {
    match config.backend {
        BackendKind::Disabled => Ok(Box::new(NullBackend::new())),
        BackendKind::Default => match CpalBackend::new(config.device_name.clone()) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                warn!("audio device unavailable, running disabled: {e}");
                Ok(Box::new(NullBackend::new()))
            }
        },
        other => Err(crate::error::Error::Backend(format!(
            "backend {other:?} is not built into this crate"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_backends_only() {
        assert!(has_backend(BackendKind::Default));
        assert!(has_backend(BackendKind::Disabled));
        assert!(!has_backend(BackendKind::DirectSound));
        assert!(!has_backend(BackendKind::OpenAL));
        assert!(!has_backend(BackendKind::OpenSles));
        assert!(!has_backend(BackendKind::Sdl));
        assert!(!has_backend(BackendKind::XAudio2));
    }

    #[test]
    fn unavailable_kind_fails_construction() {
        let config = EngineConfig {
            backend: BackendKind::OpenAL,
            ..EngineConfig::default()
        };
        assert!(create_backend(&config).is_err());
    }
}
