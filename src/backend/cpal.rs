//! Default host backend: one cpal output stream mixing all voices.
//!
//! cpal streams are not `Send`, so the stream lives on its own thread
//! and every voice talks to the mix callback through a shared lane
//! table. Each lane is either a fully resident stereo PCM buffer with a
//! cursor, or a queue of streamed samples the engine refills each tick.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{AudioBackend, BackendVoice};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::types::{BackendKind, STREAM_BUFFER_COUNT, STREAM_BUFFER_SIZE};

/// One voice's share of the mix.
struct Lane {
    /// Fully resident stereo samples (non-streamed voices).
    pcm: Vec<i16>,
    /// Queued stereo samples (streamed voices).
    pending: VecDeque<i16>,
    cursor: usize,
    looping: bool,
    playing: bool,
    streamed: bool,
    /// Streamed feed hit end of stream; the lane drains and stops.
    feed_finished: bool,
    gain: f32,
    /// Total stereo samples consumed (streamed voices).
    consumed_samples: u64,
    /// Frame size of the voice's source PCM, for byte math.
    src_frame_size: u64,
}

impl Lane {
    fn new() -> Self {
        Self {
            pcm: Vec::new(),
            pending: VecDeque::new(),
            cursor: 0,
            looping: false,
            playing: false,
            streamed: false,
            feed_finished: false,
            gain: 1.0,
            consumed_samples: 0,
            src_frame_size: 4,
        }
    }

    /// Mix one stereo frame into the accumulators, advancing the lane.
    fn mix_frame(&mut self, left: &mut f32, right: &mut f32) {
        if !self.playing {
            return;
        }
        if self.streamed {
            match (self.pending.pop_front(), self.pending.pop_front()) {
                (Some(l), Some(r)) => {
                    *left += l as f32 / 32768.0 * self.gain;
                    *right += r as f32 / 32768.0 * self.gain;
                    self.consumed_samples += 2;
                }
                _ => {
                    if self.feed_finished && !self.looping {
                        self.playing = false;
                    }
                    // Otherwise an underrun: stay silent until refill.
                }
            }
            return;
        }
        if self.cursor + 1 >= self.pcm.len() {
            if self.looping && !self.pcm.is_empty() {
                self.cursor = 0;
            } else {
                self.playing = false;
                return;
            }
        }
        *left += self.pcm[self.cursor] as f32 / 32768.0 * self.gain;
        *right += self.pcm[self.cursor + 1] as f32 / 32768.0 * self.gain;
        self.cursor += 2;
    }
}

struct MixerState {
    lanes: HashMap<u64, Lane>,
}

/// Default backend over the system output device.
pub struct CpalBackend {
    mixer: Arc<Mutex<MixerState>>,
    shutdown: Arc<AtomicBool>,
    suspended: Arc<AtomicBool>,
    stream_ok: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    next_voice: u64,
}

impl CpalBackend {
    /// Open the output device (by name, or the default) and start the
    /// mix stream on a dedicated thread.
    pub fn new(device_name: Option<String>) -> Result<Self> {
        let mixer = Arc::new(Mutex::new(MixerState {
            lanes: HashMap::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));
        let suspended = Arc::new(AtomicBool::new(false));
        let stream_ok = Arc::new(AtomicBool::new(false));
        let (init_tx, init_rx) = mpsc::channel::<std::result::Result<u32, String>>();

        let thread_mixer = Arc::clone(&mixer);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_suspended = Arc::clone(&suspended);
        let thread_stream_ok = Arc::clone(&stream_ok);
        let thread = std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || {
                stream_thread(
                    device_name,
                    thread_mixer,
                    thread_shutdown,
                    thread_suspended,
                    thread_stream_ok,
                    init_tx,
                );
            })
            .map_err(|e| Error::Backend(format!("failed to spawn output thread: {e}")))?;

        match init_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!(sample_rate, "audio output stream running");
                Ok(Self {
                    mixer,
                    shutdown,
                    suspended,
                    stream_ok,
                    thread: Some(thread),
                    sample_rate,
                    next_voice: 0,
                })
            }
            Ok(Err(message)) => {
                let _ = thread.join();
                Err(Error::Backend(message))
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::Backend("audio output thread died during init".into()))
            }
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl AudioBackend for CpalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Default
    }

    fn sampling_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        2
    }

    fn bits_per_sample(&self) -> u16 {
        16
    }

    fn create_voice(&mut self) -> Result<Box<dyn BackendVoice>> {
        self.next_voice += 1;
        let id = self.next_voice;
        self.mixer.lock().lanes.insert(id, Lane::new());
        Ok(Box::new(CpalVoice {
            id,
            mixer: Arc::clone(&self.mixer),
            stream_ok: Arc::clone(&self.stream_ok),
            device_rate: self.sample_rate,
            last_consumed_bytes: 0,
        }))
    }

    fn suspend(&mut self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    fn resume(&mut self) {
        self.suspended.store(false, Ordering::SeqCst);
    }
}

/// Owns the cpal stream for its whole lifetime; the stream type is not
/// `Send`, so it can never leave this function.
fn stream_thread(
    device_name: Option<String>,
    mixer: Arc<Mutex<MixerState>>,
    shutdown: Arc<AtomicBool>,
    suspended: Arc<AtomicBool>,
    stream_ok: Arc<AtomicBool>,
    init_tx: mpsc::Sender<std::result::Result<u32, String>>,
) {
    let host = cpal::default_host();
    let device = match device_name.as_ref() {
        Some(name) => {
            let found = host
                .output_devices()
                .ok()
                .and_then(|mut devices| {
                    devices.find(|d| d.name().ok().as_deref() == Some(name.as_str()))
                });
            match found {
                Some(device) => Some(device),
                None => {
                    warn!("output device '{name}' not found, falling back to default");
                    host.default_output_device()
                }
            }
        }
        None => host.default_output_device(),
    };
    let device = match device {
        Some(device) => device,
        None => {
            let _ = init_tx.send(Err("no output device available".into()));
            return;
        }
    };

    let config = match pick_config(&device) {
        Ok(config) => config,
        Err(message) => {
            let _ = init_tx.send(Err(message));
            return;
        }
    };
    let sample_rate = config.sample_rate.0;
    let channels = config.channels as usize;
    debug!(sample_rate, channels, "output stream config");

    let callback_mixer = Arc::clone(&mixer);
    let callback_suspended = Arc::clone(&suspended);
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _| {
            if callback_suspended.load(Ordering::Relaxed) {
                data.fill(0.0);
                return;
            }
            let mut mixer = callback_mixer.lock();
            for frame in data.chunks_mut(channels) {
                let (mut left, mut right) = (0.0f32, 0.0f32);
                for lane in mixer.lanes.values_mut() {
                    lane.mix_frame(&mut left, &mut right);
                }
                match frame.len() {
                    0 => {}
                    1 => frame[0] = ((left + right) * 0.5).clamp(-1.0, 1.0),
                    _ => {
                        frame[0] = left.clamp(-1.0, 1.0);
                        frame[1] = right.clamp(-1.0, 1.0);
                        for extra in frame.iter_mut().skip(2) {
                            *extra = 0.0;
                        }
                    }
                }
            }
        },
        move |e| error!("audio output stream error: {e}"),
        None,
    );
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = init_tx.send(Err(format!("failed to build output stream: {e}")));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = init_tx.send(Err(format!("failed to start output stream: {e}")));
        return;
    }
    stream_ok.store(true, Ordering::SeqCst);
    let _ = init_tx.send(Ok(sample_rate));

    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }
    stream_ok.store(false, Ordering::SeqCst);
    drop(stream);
}

/// Prefer 44.1 kHz stereo f32; fall back to the device default when the
/// preferred shape is unsupported.
fn pick_config(device: &cpal::Device) -> std::result::Result<StreamConfig, String> {
    if let Ok(mut configs) = device.supported_output_configs() {
        let preferred = configs.find(|c| {
            c.channels() == 2
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate().0 <= 44100
                && c.max_sample_rate().0 >= 44100
        });
        if let Some(config) = preferred {
            return Ok(config.with_sample_rate(cpal::SampleRate(44100)).config());
        }
    }
    let default = device
        .default_output_config()
        .map_err(|e| format!("no usable output config: {e}"))?;
    if default.sample_format() != SampleFormat::F32 {
        return Err(format!(
            "unsupported device sample format {:?}",
            default.sample_format()
        ));
    }
    Ok(default.config())
}

/// Voice bound to one lane of the mix.
struct CpalVoice {
    id: u64,
    mixer: Arc<Mutex<MixerState>>,
    stream_ok: Arc<AtomicBool>,
    device_rate: u32,
    last_consumed_bytes: u64,
}

impl CpalVoice {
    /// Bytes of source PCM consumed so far by a streamed lane.
    fn consumed_bytes(lane: &Lane) -> u64 {
        (lane.consumed_samples / 2) * lane.src_frame_size
    }
}

impl Drop for CpalVoice {
    fn drop(&mut self) {
        self.mixer.lock().lanes.remove(&self.id);
    }
}

impl BackendVoice for CpalVoice {
    fn prepare_play(&mut self) -> bool {
        self.stream_ok.load(Ordering::SeqCst)
    }

    fn prepare_buffer(
        &mut self,
        buffer: &mut Buffer,
        looping: bool,
        offset_bytes: u64,
    ) -> Result<()> {
        let spec = buffer.spec();
        if spec.sample_rate != self.device_rate {
            debug!(
                source = spec.sample_rate,
                device = self.device_rate,
                "sample rate mismatch, playing unresampled"
            );
        }
        let streamed = buffer.is_streamed();
        let mut primed = Vec::new();
        if streamed {
            for _ in 0..STREAM_BUFFER_COUNT {
                let read = buffer.load(looping, STREAM_BUFFER_SIZE)?;
                if read == 0 {
                    break;
                }
                primed.push(to_stereo_samples(buffer.stream(), spec.channels));
            }
        }
        let mut mixer = self.mixer.lock();
        let lane = mixer
            .lanes
            .get_mut(&self.id)
            .ok_or_else(|| Error::Backend("voice lane missing".into()))?;
        lane.looping = looping;
        lane.streamed = streamed;
        lane.src_frame_size = spec.frame_size().max(1);
        lane.feed_finished = false;
        lane.consumed_samples = 0;
        if streamed {
            lane.pcm = Vec::new();
            lane.pending.clear();
            for chunk in primed {
                lane.pending.extend(chunk);
            }
        } else {
            lane.pcm = to_stereo_samples(buffer.pcm(), spec.channels);
            let frame = (offset_bytes / lane.src_frame_size) as usize;
            lane.cursor = (frame * 2).min(lane.pcm.len());
        }
        Ok(())
    }

    fn update_gain(&mut self, gain: f32) {
        if let Some(lane) = self.mixer.lock().lanes.get_mut(&self.id) {
            lane.gain = gain;
        }
    }

    fn play(&mut self) {
        if let Some(lane) = self.mixer.lock().lanes.get_mut(&self.id) {
            lane.playing = true;
        }
    }

    fn stop(&mut self) -> u64 {
        let mut mixer = self.mixer.lock();
        match mixer.lanes.get_mut(&self.id) {
            Some(lane) => {
                lane.playing = false;
                let position = if lane.streamed {
                    Self::consumed_bytes(lane)
                } else {
                    (lane.cursor as u64 / 2) * lane.src_frame_size
                };
                lane.pcm = Vec::new();
                lane.pending.clear();
                lane.cursor = 0;
                position
            }
            None => 0,
        }
    }

    fn update_normal(&mut self, _buffer: &mut Buffer, _looping: bool, _dt: f32) {
        // The mix callback handles loop wrap and end-of-buffer itself.
    }

    fn update_stream(&mut self, buffer: &mut Buffer, looping: bool, _dt: f32) -> u64 {
        let spec = buffer.spec();
        let target_samples = (STREAM_BUFFER_SIZE * STREAM_BUFFER_COUNT) / 2;
        // Check the lane's appetite first, without holding the mixer lock
        // across the decode.
        let (needs, finished) = {
            let mixer = self.mixer.lock();
            match mixer.lanes.get(&self.id) {
                Some(lane) => (lane.pending.len() < target_samples, lane.feed_finished),
                None => return 0,
            }
        };
        let mut chunk = None;
        let mut feed_finished = finished;
        if needs && !finished {
            match buffer.load(looping, STREAM_BUFFER_SIZE) {
                Ok(0) => feed_finished = true,
                Ok(_) => chunk = Some(to_stereo_samples(buffer.stream(), spec.channels)),
                Err(e) => {
                    warn!("stream refill failed: {e}");
                    feed_finished = true;
                }
            }
        }
        let mut mixer = self.mixer.lock();
        match mixer.lanes.get_mut(&self.id) {
            Some(lane) => {
                lane.feed_finished = feed_finished;
                if let Some(chunk) = chunk {
                    lane.pending.extend(chunk);
                }
                let consumed = Self::consumed_bytes(lane);
                let delta = consumed.saturating_sub(self.last_consumed_bytes);
                self.last_consumed_bytes = consumed;
                delta
            }
            None => 0,
        }
    }

    fn is_playing(&self) -> bool {
        self.mixer
            .lock()
            .lanes
            .get(&self.id)
            .map(|lane| lane.playing)
            .unwrap_or(false)
    }

    fn get_buffer_position(&self) -> u64 {
        let mixer = self.mixer.lock();
        match mixer.lanes.get(&self.id) {
            Some(lane) if lane.streamed => Self::consumed_bytes(lane),
            Some(lane) => (lane.cursor as u64 / 2) * lane.src_frame_size,
            None => 0,
        }
    }
}

/// Expand interleaved source PCM to stereo i16 samples for the mixer.
fn to_stereo_samples(bytes: &[u8], channels: u16) -> Vec<i16> {
    match channels {
        1 => {
            let mut samples = Vec::with_capacity(bytes.len());
            for pair in bytes.chunks_exact(2) {
                let s = i16::from_le_bytes([pair[0], pair[1]]);
                samples.push(s);
                samples.push(s);
            }
            samples
        }
        _ => {
            let frame_bytes = channels as usize * 2;
            let mut samples = Vec::with_capacity(bytes.len() / frame_bytes * 2);
            for frame in bytes.chunks_exact(frame_bytes) {
                samples.push(i16::from_le_bytes([frame[0], frame[1]]));
                samples.push(i16::from_le_bytes([frame[2], frame[3]]));
            }
            samples
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let bytes = 100i16.to_le_bytes();
        let samples = to_stereo_samples(&bytes, 1);
        assert_eq!(samples, vec![100, 100]);
    }

    #[test]
    fn stereo_passes_through() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i16.to_le_bytes());
        bytes.extend_from_slice(&2i16.to_le_bytes());
        let samples = to_stereo_samples(&bytes, 2);
        assert_eq!(samples, vec![1, 2]);
    }

    #[test]
    fn lane_stops_at_end_without_looping() {
        let mut lane = Lane::new();
        lane.pcm = vec![1000, 1000];
        lane.playing = true;
        let (mut l, mut r) = (0.0, 0.0);
        lane.mix_frame(&mut l, &mut r);
        assert!(l > 0.0 && r > 0.0);
        lane.mix_frame(&mut l, &mut r);
        assert!(!lane.playing);
    }

    #[test]
    fn lane_wraps_when_looping() {
        let mut lane = Lane::new();
        lane.pcm = vec![1000, 1000];
        lane.playing = true;
        lane.looping = true;
        let (mut l, mut r) = (0.0, 0.0);
        for _ in 0..5 {
            lane.mix_frame(&mut l, &mut r);
        }
        assert!(lane.playing);
    }
}
