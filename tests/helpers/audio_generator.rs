//! Deterministic WAV fixtures for engine tests.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Standard test sample rate (44.1 kHz).
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// Generate a stereo sine-wave WAV file.
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
    let amplitude_i16 = (amplitude * i16::MAX as f32) as i16;
    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / TEST_SAMPLE_RATE as f32;
        let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16 as f32) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Generate a silent stereo WAV file.
pub fn generate_silent_wav<P: AsRef<Path>>(path: P, duration_ms: u64) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let total_samples = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000 * 2;
    for _ in 0..total_samples {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}

/// Raw silent PCM for memory-backed sounds (stereo, 16-bit, 44.1 kHz).
pub fn silent_pcm(duration_ms: u64) -> Vec<u8> {
    let bytes = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000 * 4;
    vec![0u8; bytes as usize]
}
