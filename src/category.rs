//! Sound categories: a named group sharing a gain, a gain fade and a
//! buffer/source load policy.

use crate::types::{BufferMode, SourceMode};

/// A linear gain fade from the current value to a target over a duration.
///
/// `t` runs 0..1; the effective value interpolates between the committed
/// gain and the target. At `t >= 1` the target is committed and the fade
/// clears.
#[derive(Debug, Clone, Copy, Default)]
pub struct GainFade {
    target: Option<f32>,
    speed: f32,
    t: f32,
}

impl GainFade {
    /// Begin a fade toward `target` over `seconds`. Zero or negative
    /// durations are ignored (callers commit the gain directly instead).
    pub fn start(&mut self, target: f32, seconds: f32) {
        if seconds > 0.0 {
            self.target = Some(target.clamp(0.0, 1.0));
            self.speed = 1.0 / seconds;
            self.t = 0.0;
        }
    }

    pub fn cancel(&mut self) {
        self.target = None;
        self.speed = 0.0;
        self.t = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<f32> {
        self.target
    }

    /// Interpolated gain given the committed `base` value.
    pub fn effective(&self, base: f32) -> f32 {
        match self.target {
            Some(target) => base + (target - base) * self.t,
            None => base,
        }
    }

    /// Advance by `dt` seconds. Returns the target when it was reached
    /// this step, which the caller commits as the new base gain.
    pub fn advance(&mut self, dt: f32) -> Option<f32> {
        let target = self.target?;
        self.t += self.speed * dt;
        if self.t >= 1.0 {
            self.cancel();
            return Some(target);
        }
        None
    }
}

/// A named group of sounds sharing a gain and a load policy.
///
/// Categories are created once by name and live until the manager is
/// cleared.
#[derive(Debug)]
pub struct Category {
    name: String,
    buffer_mode: BufferMode,
    source_mode: SourceMode,
    gain: f32,
    fade: GainFade,
}

impl Category {
    pub fn new(name: &str, buffer_mode: BufferMode, source_mode: SourceMode) -> Self {
        Self {
            name: name.to_owned(),
            buffer_mode,
            source_mode,
            gain: 1.0,
            fade: GainFade::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer_mode(&self) -> BufferMode {
        self.buffer_mode
    }

    pub fn source_mode(&self) -> SourceMode {
        self.source_mode
    }

    pub fn is_streamed(&self) -> bool {
        self.buffer_mode == BufferMode::Streamed
    }

    /// Committed gain, ignoring any in-progress fade.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Setting a gain directly cancels any fade in progress.
    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.clamp(0.0, 1.0);
        self.fade.cancel();
    }

    /// Gain including the in-progress fade, as pushed to backend voices.
    pub fn effective_gain(&self) -> f32 {
        self.fade.effective(self.gain)
    }

    pub fn fade_gain(&mut self, target: f32, seconds: f32) {
        if seconds > 0.0 {
            self.fade.start(target, seconds);
        } else {
            self.set_gain(target);
        }
    }

    pub fn is_gain_fading(&self) -> bool {
        self.fade.is_active()
    }

    /// Advance the gain fade during the manager tick.
    pub fn update(&mut self, dt: f32) {
        if let Some(target) = self.fade.advance(dt) {
            self.gain = target;
        }
    }
}
