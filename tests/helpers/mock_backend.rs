//! Simulated backend for scheduling tests.
//!
//! Voices advance by `dt × byte_rate` on every engine tick instead of
//! real time, so fade and lifecycle behavior can be asserted
//! deterministically without an audio device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use polyvox::backend::{AudioBackend, BackendVoice};
use polyvox::buffer::Buffer;
use polyvox::types::{BackendKind, STREAM_BUFFER_COUNT, STREAM_BUFFER_SIZE};
use polyvox::Result;

#[derive(Default)]
pub struct MockState {
    pub voices: HashMap<u64, VoiceState>,
    pub suspended: bool,
    next_id: u64,
}

impl MockState {
    /// Gain of the only live voice; panics when the test has several.
    pub fn single_gain(&self) -> f32 {
        assert_eq!(self.voices.len(), 1, "expected exactly one voice");
        self.voices.values().next().unwrap().gain
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

#[derive(Debug, Default)]
pub struct VoiceState {
    pub playing: bool,
    pub looping: bool,
    pub streamed: bool,
    pub gain: f32,
    pub byte_rate: u64,
    /// Total PCM bytes (non-streamed voices).
    pub len: u64,
    /// Position in bytes (non-streamed voices).
    pub pos: f64,
    /// Queued bytes not yet consumed (streamed voices).
    pub pending: f64,
    /// Cumulative consumed bytes (streamed voices).
    pub consumed: f64,
    pub feed_finished: bool,
}

pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> (Box<Self>, Arc<Mutex<MockState>>) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Box::new(Self {
                state: Arc::clone(&state),
            }),
            state,
        )
    }
}

impl AudioBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Default
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
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.voices.insert(id, VoiceState::default());
        Ok(Box::new(MockVoice {
            id,
            state: Arc::clone(&self.state),
            last_consumed: 0.0,
        }))
    }

    fn suspend(&mut self) {
        self.state.lock().unwrap().suspended = true;
    }

    fn resume(&mut self) {
        self.state.lock().unwrap().suspended = false;
    }
}

struct MockVoice {
    id: u64,
    state: Arc<Mutex<MockState>>,
    last_consumed: f64,
}

impl Drop for MockVoice {
    fn drop(&mut self) {
        self.state.lock().unwrap().voices.remove(&self.id);
    }
}

impl BackendVoice for MockVoice {
    fn prepare_play(&mut self) -> bool {
        true
    }

    fn prepare_buffer(&mut self, buffer: &mut Buffer, looping: bool, offset_bytes: u64) -> Result<()> {
        let spec = buffer.spec();
        let streamed = buffer.is_streamed();
        let mut primed = 0u64;
        let mut feed_finished = false;
        if streamed {
            for _ in 0..STREAM_BUFFER_COUNT {
                let read = buffer.load(looping, STREAM_BUFFER_SIZE)?;
                if read == 0 {
                    feed_finished = true;
                    break;
                }
                primed += read as u64;
            }
        }
        let mut state = self.state.lock().unwrap();
        let voice = state.voices.get_mut(&self.id).expect("voice exists");
        voice.byte_rate = spec.byte_rate();
        voice.looping = looping;
        voice.streamed = streamed;
        voice.feed_finished = feed_finished;
        if streamed {
            voice.pending = primed as f64;
            voice.consumed = 0.0;
            self.last_consumed = 0.0;
        } else {
            voice.len = buffer.pcm().len() as u64;
            voice.pos = offset_bytes as f64;
        }
        Ok(())
    }

    fn update_gain(&mut self, gain: f32) {
        if let Some(voice) = self.state.lock().unwrap().voices.get_mut(&self.id) {
            voice.gain = gain;
        }
    }

    fn play(&mut self) {
        if let Some(voice) = self.state.lock().unwrap().voices.get_mut(&self.id) {
            voice.playing = true;
        }
    }

    fn stop(&mut self) -> u64 {
        let mut state = self.state.lock().unwrap();
        match state.voices.get_mut(&self.id) {
            Some(voice) => {
                voice.playing = false;
                if voice.streamed {
                    voice.consumed as u64
                } else {
                    voice.pos as u64
                }
            }
            None => 0,
        }
    }

    fn update_normal(&mut self, _buffer: &mut Buffer, looping: bool, dt: f32) {
        let mut state = self.state.lock().unwrap();
        let Some(voice) = state.voices.get_mut(&self.id) else {
            return;
        };
        if !voice.playing {
            return;
        }
        voice.pos += dt as f64 * voice.byte_rate as f64;
        if voice.len > 0 && voice.pos >= voice.len as f64 {
            if looping {
                voice.pos %= voice.len as f64;
            } else {
                voice.pos = voice.len as f64;
                voice.playing = false;
            }
        }
    }

    fn update_stream(&mut self, buffer: &mut Buffer, looping: bool, dt: f32) -> u64 {
        let window = (STREAM_BUFFER_SIZE * STREAM_BUFFER_COUNT) as f64;
        let (needs_refill, finished) = {
            let mut state = self.state.lock().unwrap();
            let Some(voice) = state.voices.get_mut(&self.id) else {
                return 0;
            };
            if !voice.playing {
                return 0;
            }
            let consume = (dt as f64 * voice.byte_rate as f64).min(voice.pending);
            voice.pending -= consume;
            voice.consumed += consume;
            (voice.pending < window, voice.feed_finished)
        };
        let mut loaded = 0u64;
        let mut feed_finished = finished;
        if needs_refill && !finished {
            match buffer.load(looping, STREAM_BUFFER_SIZE) {
                Ok(0) => feed_finished = true,
                Ok(read) => loaded = read as u64,
                Err(_) => feed_finished = true,
            }
        }
        let mut state = self.state.lock().unwrap();
        let Some(voice) = state.voices.get_mut(&self.id) else {
            return 0;
        };
        voice.pending += loaded as f64;
        voice.feed_finished = feed_finished;
        if voice.feed_finished && voice.pending <= 0.0 && !looping {
            voice.playing = false;
        }
        let delta = voice.consumed - self.last_consumed;
        self.last_consumed = voice.consumed;
        delta as u64
    }

    fn is_playing(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .voices
            .get(&self.id)
            .map(|v| v.playing)
            .unwrap_or(false)
    }

    fn get_buffer_position(&self) -> u64 {
        let state = self.state.lock().unwrap();
        match state.voices.get(&self.id) {
            Some(voice) if voice.streamed => voice.consumed as u64,
            Some(voice) => voice.pos as u64,
            None => 0,
        }
    }

    fn needs_streamed_buffer_position_correction(&self) -> bool {
        true
    }
}
