//! Disabled backend: the whole registry works, playback is silent.

use crate::backend::{AudioBackend, BackendVoice};
use crate::buffer::Buffer;
use crate::error::Result;
use crate::types::BackendKind;

/// Backend used when audio is disabled or no device could be opened.
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Disabled
    }

    fn is_enabled(&self) -> bool {
        false
    }

    fn sampling_rate(&self) -> u32 {
        44100
    }

    fn channels(&self) -> u16 {
        2
    }

    fn bits_per_sample(&self) -> u16 {
        16
    }

    fn create_voice(&mut self) -> Result<Box<dyn BackendVoice>> {
        Ok(Box::new(NullVoice))
    }
}

/// Voice whose every operation is a no-op returning zero/false.
struct NullVoice;

impl BackendVoice for NullVoice {
    fn prepare_play(&mut self) -> bool {
        false
    }

    fn prepare_buffer(&mut self, _buffer: &mut Buffer, _looping: bool, _offset: u64) -> Result<()> {
        Ok(())
    }

    fn update_gain(&mut self, _gain: f32) {}

    fn play(&mut self) {}

    fn stop(&mut self) -> u64 {
        0
    }

    fn update_normal(&mut self, _buffer: &mut Buffer, _looping: bool, _dt: f32) {}

    fn update_stream(&mut self, _buffer: &mut Buffer, _looping: bool, _dt: f32) -> u64 {
        0
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn get_buffer_position(&self) -> u64 {
        0
    }
}
