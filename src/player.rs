//! Player: one active voice driving a backend through
//! prepare/play/fade/stop.
//!
//! The fade envelope runs on a normalized clock: `fade_time` in [0, 1],
//! `fade_speed = ±1/seconds`. Positive speed fades in, negative fades
//! out, zero means not fading. The envelope multiplies the player,
//! category and global gains into the effective gain pushed to the
//! backend voice.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::BackendVoice;
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::sound::BufferId;

/// Stable handle to a player in the manager's arena.
pub type PlayerId = Uuid;

pub(crate) struct Player {
    id: PlayerId,
    sound: String,
    category: String,
    buffer_id: BufferId,
    voice: Box<dyn BackendVoice>,
    gain: f32,
    pitch: f32,
    /// Byte position preserved across a pause.
    offset_bytes: u64,
    looping: bool,
    playing: bool,
    /// Sticky: a fade-out that reaches zero pauses instead of stopping.
    paused: bool,
    /// Holds a bind on the buffer while playing or paused.
    bound: bool,
    fade_time: f32,
    fade_speed: f32,
    /// Play requested while the buffer was still async-loading; the next
    /// tick retries with the stored fade.
    async_play_queued: bool,
    queued_fade: f32,
    streamed: bool,
    /// Cumulative streamed bytes consumed, for position correction.
    stream_consumed: u64,
}

impl Player {
    pub fn new(
        id: PlayerId,
        sound: &str,
        category: &str,
        buffer_id: BufferId,
        streamed: bool,
        voice: Box<dyn BackendVoice>,
    ) -> Self {
        Self {
            id,
            sound: sound.to_owned(),
            category: category.to_owned(),
            buffer_id,
            voice,
            gain: 1.0,
            pitch: 1.0,
            offset_bytes: 0,
            looping: false,
            playing: false,
            paused: false,
            bound: false,
            fade_time: 0.0,
            fade_speed: 0.0,
            async_play_queued: false,
            queued_fade: 0.0,
            streamed,
            stream_consumed: 0,
        }
    }

    pub fn sound(&self) -> &str {
        &self.sound
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn buffer_id(&self) -> BufferId {
        self.buffer_id
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn is_playing(&self) -> bool {
        self.playing && self.voice.is_playing()
    }

    /// Paused and settled: a fade still in flight reports false.
    pub fn is_paused(&self) -> bool {
        self.paused && !self.is_fading()
    }

    /// The raw sticky flag, needed while a pause fade is in flight.
    pub fn is_pause_pending(&self) -> bool {
        self.paused
    }

    pub fn is_fading(&self) -> bool {
        self.fade_speed != 0.0
    }

    pub fn is_fading_in(&self) -> bool {
        self.fade_speed > 0.0
    }

    pub fn is_fading_out(&self) -> bool {
        self.fade_speed < 0.0
    }

    pub fn is_async_play_queued(&self) -> bool {
        self.async_play_queued
    }

    pub fn queued_fade(&self) -> f32 {
        self.queued_fade
    }

    /// The gain actually sent to the backend voice.
    pub fn effective_gain(&self, category_gain: f32, global_gain: f32) -> f32 {
        self.fade_time.clamp(0.0, 1.0) * self.gain * category_gain * global_gain
    }

    pub fn set_gain(&mut self, gain: f32, category_gain: f32, global_gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
        self.push_gain(category_gain, global_gain);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
        self.voice.update_pitch(pitch);
    }

    /// Push the current effective gain to the backend voice.
    pub fn push_gain(&mut self, category_gain: f32, global_gain: f32) {
        let gain = self.effective_gain(category_gain, global_gain);
        self.voice.update_gain(gain);
    }

    /// Current playback position in frames.
    pub fn sample_offset(&self, buffer: &Buffer) -> u64 {
        let bytes = if self.streamed && self.voice.needs_streamed_buffer_position_correction() {
            let size = buffer.size();
            if size > 0 {
                self.stream_consumed % size
            } else {
                self.stream_consumed
            }
        } else if self.playing {
            self.voice.get_buffer_position()
        } else {
            self.offset_bytes
        };
        bytes / buffer.spec().frame_size().max(1)
    }

    /// Start (or resume) playback.
    ///
    /// Returns Ok(false) when the backend has no free voice or the
    /// buffer cannot decode; both leave the player idle. A buffer still
    /// async-loading queues the play for the next tick and reports true.
    pub fn play(
        &mut self,
        buffer: &mut Buffer,
        fade: f32,
        looping: bool,
        category_gain: f32,
        global_gain: f32,
    ) -> Result<bool> {
        if !self.paused {
            self.offset_bytes = 0;
            self.looping = looping;
        }
        if buffer.is_async_pending() {
            self.async_play_queued = true;
            self.queued_fade = fade;
            return Ok(true);
        }
        self.async_play_queued = false;
        if !self.voice.prepare_play() {
            debug!(player = %self.id, sound = %self.sound, "no backend voice available");
            return Ok(false);
        }
        match buffer.prepare() {
            Ok(()) => {}
            // Already logged once by the buffer; the play degrades to a
            // silent no-op.
            Err(Error::Decode(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        if !self.bound {
            buffer.bind();
            self.bound = true;
        }
        if self.streamed && !self.paused {
            buffer.rewind()?;
            self.stream_consumed = 0;
        }
        if let Err(e) = self.voice.prepare_buffer(buffer, self.looping, self.offset_bytes) {
            warn!(player = %self.id, sound = %self.sound, "backend rejected buffer: {e}");
            self.release(buffer);
            return Ok(false);
        }
        if fade > 0.0 {
            self.fade_time = 0.0;
            self.fade_speed = 1.0 / fade;
        } else {
            self.fade_time = 1.0;
            self.fade_speed = 0.0;
        }
        self.push_gain(category_gain, global_gain);
        self.voice.update_pitch(self.pitch);
        self.voice.play();
        self.playing = true;
        self.paused = false;
        Ok(true)
    }

    pub fn stop(&mut self, buffer: &mut Buffer, fade: f32) {
        self.async_play_queued = false;
        self.stop_inner(buffer, fade, false);
    }

    /// Stop with a sticky paused flag and the offset preserved.
    pub fn pause(&mut self, buffer: &mut Buffer, fade: f32) {
        self.stop_inner(buffer, fade, true);
    }

    fn stop_inner(&mut self, buffer: &mut Buffer, fade: f32, pause: bool) {
        if fade > 0.0 && self.playing {
            self.fade_speed = -1.0 / fade;
            self.paused = pause;
            return;
        }
        self.fade_time = 0.0;
        self.fade_speed = 0.0;
        let position = self.voice.stop();
        if pause {
            if self.playing {
                self.offset_bytes = if self.streamed {
                    self.stream_consumed
                } else {
                    position
                };
            }
            self.playing = false;
        } else {
            self.playing = false;
            self.offset_bytes = 0;
            self.stream_consumed = 0;
            self.release(buffer);
        }
        self.paused = pause;
    }

    /// Advance the state machine by one tick.
    pub fn update(&mut self, buffer: &mut Buffer, dt: f32, category_gain: f32, global_gain: f32) {
        // Reconcile with the backend: a voice that stopped on its own
        // means the sound ran out.
        if self.playing && !self.is_fading() && !self.voice.is_playing() {
            self.playing = false;
            self.offset_bytes = 0;
            self.stream_consumed = 0;
            self.release(buffer);
            return;
        }
        if self.is_fading() && self.playing {
            self.fade_time += self.fade_speed * dt;
            if self.fade_time >= 1.0 && self.fade_speed > 0.0 {
                self.fade_time = 1.0;
                self.fade_speed = 0.0;
                self.push_gain(category_gain, global_gain);
            } else if self.fade_time <= 0.0 && self.fade_speed < 0.0 {
                self.fade_time = 0.0;
                self.fade_speed = 0.0;
                let pause = self.paused;
                self.stop_inner(buffer, 0.0, pause);
            } else {
                self.push_gain(category_gain, global_gain);
            }
        }
        if self.playing {
            if self.streamed {
                let consumed = self.voice.update_stream(buffer, self.looping, dt);
                self.stream_consumed += consumed;
            } else {
                self.voice.update_normal(buffer, self.looping, dt);
            }
        }
    }

    /// Immediate teardown used by destroy paths.
    pub fn halt(&mut self, buffer: &mut Buffer) {
        self.async_play_queued = false;
        self.paused = false;
        self.stop_inner(buffer, 0.0, false);
    }

    fn release(&mut self, buffer: &mut Buffer) {
        if self.bound {
            buffer.unbind();
            self.bound = false;
        }
        if self.streamed {
            if let Err(e) = buffer.rewind() {
                debug!(player = %self.id, "rewind on release failed: {e}");
            }
        }
    }
}
