//! The audio manager: public facade, player handles and the update
//! thread.
//!
//! One `parking_lot::Mutex` guards the whole engine; every public entry
//! point takes it once and the internals in [`core`] assume it is held.
//! With `threaded` enabled an internal worker ticks the engine every
//! `update_time` seconds, releasing the lock while it sleeps; otherwise
//! the host drives [`AudioManager::update`] itself. The async loader
//! worker exists either way.

mod core;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::backend::{create_backend, AudioBackend};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::manager::core::ManagerCore;
use crate::player::PlayerId;
use crate::sound::SoundInfo;
use crate::types::{BufferMode, SourceMode};

/// The root object owning all categories, sounds, buffers and players.
pub struct AudioManager {
    core: Arc<Mutex<ManagerCore>>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    threaded: bool,
    update_time: f32,
}

impl AudioManager {
    /// Create a manager with the backend selected by the configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let backend = create_backend(&config)?;
        Self::with_backend(config, backend)
    }

    /// Create a manager over a caller-supplied backend. This is the seam
    /// custom drivers and tests plug into.
    pub fn with_backend(config: EngineConfig, backend: Box<dyn AudioBackend>) -> Result<Self> {
        let update_time = config.update_time.max(0.001);
        let threaded = config.threaded;
        let core = Arc::new(Mutex::new(ManagerCore::new(&config, backend)));
        let running = Arc::new(AtomicBool::new(false));
        let mut manager = Self {
            core,
            running,
            thread: None,
            threaded,
            update_time,
        };
        if threaded {
            manager.start_thread();
        }
        Ok(manager)
    }

    fn start_thread(&mut self) {
        info!("starting audio update thread");
        self.running.store(true, Ordering::SeqCst);
        let core = Arc::clone(&self.core);
        let running = Arc::clone(&self.running);
        let update_time = self.update_time;
        let handle = std::thread::Builder::new()
            .name("audio-update".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    core.lock().update(update_time);
                    std::thread::sleep(Duration::from_secs_f32(update_time));
                }
            })
            .expect("failed to spawn audio update thread");
        self.thread = Some(handle);
    }

    fn stop_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            info!("stopping audio update thread");
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.join();
        }
    }

    /// Advance the engine by `dt` seconds. A no-op when the internal
    /// update thread is driving the engine.
    pub fn update(&self, dt: f32) {
        if !self.threaded {
            self.core.lock().update(dt);
        }
    }

    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    pub fn update_time(&self) -> f32 {
        self.update_time
    }

    pub fn is_enabled(&self) -> bool {
        self.core.lock().is_enabled()
    }

    pub fn is_suspended(&self) -> bool {
        self.core.lock().is_suspended()
    }

    pub fn device_name(&self) -> Option<String> {
        self.core.lock().device_name().map(str::to_owned)
    }

    pub fn sampling_rate(&self) -> u32 {
        self.core.lock().sampling_rate()
    }

    pub fn channels(&self) -> u16 {
        self.core.lock().channels()
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.core.lock().bits_per_sample()
    }

    pub fn idle_player_unload_time(&self) -> f32 {
        self.core.lock().idle_player_unload_time()
    }

    pub fn set_idle_player_unload_time(&self, seconds: f32) {
        self.core.lock().set_idle_player_unload_time(seconds);
    }

    pub fn suspend_resume_fade_time(&self) -> f32 {
        self.core.lock().suspend_resume_fade_time()
    }

    pub fn set_suspend_resume_fade_time(&self, seconds: f32) {
        self.core.lock().set_suspend_resume_fade_time(seconds);
    }

    pub fn add_audio_extension(&self, extension: &str) {
        self.core.lock().add_audio_extension(extension);
    }

    /// Resolve a sound filename the way `create_sound` does.
    pub fn find_audio_file(&self, filename: &str) -> Option<std::path::PathBuf> {
        self.core.lock().find_audio_file(filename)
    }

    // ---- global gain --------------------------------------------------

    /// Global gain including any in-progress fade.
    pub fn global_gain(&self) -> f32 {
        self.core.lock().effective_global_gain()
    }

    pub fn set_global_gain(&self, value: f32) {
        self.core.lock().set_global_gain(value);
    }

    pub fn fade_global_gain(&self, target: f32, seconds: f32) {
        self.core.lock().fade_global_gain(target, seconds);
    }

    pub fn is_global_gain_fading(&self) -> bool {
        self.core.lock().is_global_gain_fading()
    }

    // ---- categories ---------------------------------------------------

    /// Create a category; returns quietly if it already exists.
    pub fn create_category(&self, name: &str, buffer_mode: BufferMode, source_mode: SourceMode) {
        self.core.lock().create_category(name, buffer_mode, source_mode);
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.core.lock().has_category(name)
    }

    pub fn category_gain(&self, name: &str) -> Result<f32> {
        self.core.lock().category_gain(name)
    }

    pub fn set_category_gain(&self, name: &str, gain: f32) -> Result<()> {
        self.core.lock().set_category_gain(name, gain)
    }

    pub fn fade_category_gain(&self, name: &str, target: f32, seconds: f32) -> Result<()> {
        self.core.lock().fade_category_gain(name, target, seconds)
    }

    // ---- sounds -------------------------------------------------------

    /// Register a file-backed sound. Returns the registered name, or
    /// `None` when the extension is unknown or the name is taken.
    pub fn create_sound(
        &self,
        filename: &str,
        category: &str,
        prefix: &str,
    ) -> Result<Option<String>> {
        self.core.lock().create_sound(filename, category, prefix)
    }

    /// Register a sound backed by raw PCM.
    pub fn create_sound_from_memory(
        &self,
        name: &str,
        category: &str,
        data: &[u8],
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
    ) -> Result<Option<String>> {
        self.core.lock().create_sound_from_memory(
            name,
            category,
            data,
            channels,
            sample_rate,
            bits_per_sample,
        )
    }

    /// Scan a directory for sounds. Without a category, each direct
    /// subdirectory becomes a category named after its base name.
    pub fn create_sounds_from_path(
        &self,
        path: &Path,
        category: Option<&str>,
        prefix: &str,
    ) -> Result<Vec<String>> {
        self.core.lock().create_sounds_from_path(path, category, prefix)
    }

    pub fn has_sound(&self, name: &str) -> bool {
        self.core.lock().has_sound(name)
    }

    pub fn sound_names(&self) -> Vec<String> {
        self.core.lock().sound_names()
    }

    pub fn sound_info(&self, name: &str) -> Result<SoundInfo> {
        self.core.lock().sound_info(name)
    }

    /// Destroy a sound. Managed players on it are torn down first; a
    /// surviving manual player makes this fail with [`Error::Busy`].
    ///
    /// [`Error::Busy`]: crate::Error::Busy
    pub fn destroy_sound(&self, name: &str) -> Result<()> {
        self.core.lock().destroy_sound(name)
    }

    pub fn destroy_sounds_with_prefix(&self, prefix: &str) -> Result<()> {
        self.core.lock().destroy_sounds_with_prefix(prefix)
    }

    // ---- players ------------------------------------------------------

    /// Create a manual player the caller owns and must destroy.
    pub fn create_player(&self, sound_name: &str) -> Result<PlayerHandle> {
        let id = self.core.lock().create_player(sound_name, false)?;
        Ok(PlayerHandle {
            id,
            core: Arc::clone(&self.core),
        })
    }

    pub fn destroy_player(&self, player: PlayerHandle) -> Result<()> {
        self.core.lock().destroy_player(player.id)
    }

    // ---- managed playback ---------------------------------------------

    /// Fire-and-forget play through a managed player, reclaimed
    /// automatically once silent.
    pub fn play(&self, sound_name: &str, fade: f32, looping: bool) -> Result<()> {
        self.core.lock().play(sound_name, fade, looping, 1.0)
    }

    pub fn play_with_gain(
        &self,
        sound_name: &str,
        fade: f32,
        looping: bool,
        gain: f32,
    ) -> Result<()> {
        self.core.lock().play(sound_name, fade, looping, gain)
    }

    /// Like [`AudioManager::play`], but decodes on the loader thread and
    /// starts on the first tick after the PCM is ready.
    pub fn play_async(&self, sound_name: &str, fade: f32, looping: bool) -> Result<()> {
        self.core.lock().play_async(sound_name, fade, looping, 1.0)
    }

    pub fn play_async_with_gain(
        &self,
        sound_name: &str,
        fade: f32,
        looping: bool,
        gain: f32,
    ) -> Result<()> {
        self.core.lock().play_async(sound_name, fade, looping, gain)
    }

    /// Stop every managed player of a sound; fade 0 destroys them
    /// immediately.
    pub fn stop(&self, sound_name: &str, fade: f32) {
        self.core.lock().stop_sound(sound_name, fade);
    }

    /// Stop only the first managed player of a sound.
    pub fn stop_first(&self, sound_name: &str, fade: f32) {
        self.core.lock().stop_first(sound_name, fade);
    }

    /// Stop everything, managed and manual.
    pub fn stop_all(&self, fade: f32) {
        self.core.lock().stop_all(fade);
    }

    pub fn stop_category(&self, category: &str, fade: f32) -> Result<()> {
        self.core.lock().stop_category(category, fade)
    }

    // ---- queries over managed players ---------------------------------

    pub fn playing_count(&self, sound_name: &str) -> usize {
        self.core.lock().playing_count(sound_name)
    }

    pub fn fading_count(&self, sound_name: &str) -> usize {
        self.core.lock().fading_count(sound_name)
    }

    pub fn fading_in_count(&self, sound_name: &str) -> usize {
        self.core.lock().fading_in_count(sound_name)
    }

    pub fn fading_out_count(&self, sound_name: &str) -> usize {
        self.core.lock().fading_out_count(sound_name)
    }

    // ---- lifecycle ----------------------------------------------------

    /// Pause all playing voices with a short crossfade (focus loss).
    pub fn suspend_audio(&self) {
        self.core.lock().suspend_audio();
    }

    /// Resume the voices paused by [`AudioManager::suspend_audio`].
    pub fn resume_audio(&self) {
        self.core.lock().resume_audio();
    }

    /// Release PCM from every buffer whose mode allows it. Returns how
    /// many buffers were cleared.
    pub fn clear_memory(&self) -> usize {
        self.core.lock().clear_memory()
    }

    /// Tear everything down: players, sounds, buffers, categories and
    /// the update thread. The manager may be used again afterwards.
    pub fn clear(&mut self) {
        self.stop_thread();
        self.core.lock().clear();
        if self.threaded {
            self.start_thread();
        }
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.stop_thread();
        self.core.lock().clear();
    }
}

/// Handle to a manual player. Cheap to clone; operations fail with
/// [`Error::PlayerNotFound`] once the player is destroyed.
///
/// [`Error::PlayerNotFound`]: crate::Error::PlayerNotFound
#[derive(Clone)]
pub struct PlayerHandle {
    id: PlayerId,
    core: Arc<Mutex<ManagerCore>>,
}

impl PlayerHandle {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Start playback. False means the backend had no voice to give or
    /// the sound cannot decode; the player stays idle.
    pub fn play(&self, fade: f32, looping: bool) -> Result<bool> {
        self.core.lock().player_play(self.id, fade, looping)
    }

    pub fn stop(&self, fade: f32) -> Result<()> {
        self.core.lock().player_stop(self.id, fade)
    }

    /// Stop, keeping the playback offset for the next `play`.
    pub fn pause(&self, fade: f32) -> Result<()> {
        self.core.lock().player_pause(self.id, fade)
    }

    pub fn set_gain(&self, gain: f32) -> Result<()> {
        self.core.lock().player_set_gain(self.id, gain)
    }

    pub fn gain(&self) -> Result<f32> {
        self.core.lock().with_player(self.id, |p| p.gain())
    }

    pub fn set_pitch(&self, pitch: f32) -> Result<()> {
        self.core.lock().player_set_pitch(self.id, pitch)
    }

    pub fn pitch(&self) -> Result<f32> {
        self.core.lock().with_player(self.id, |p| p.pitch())
    }

    pub fn is_playing(&self) -> Result<bool> {
        self.core.lock().with_player(self.id, |p| p.is_playing())
    }

    pub fn is_paused(&self) -> Result<bool> {
        self.core.lock().with_player(self.id, |p| p.is_paused())
    }

    pub fn is_fading(&self) -> Result<bool> {
        self.core.lock().with_player(self.id, |p| p.is_fading())
    }

    pub fn is_fading_in(&self) -> Result<bool> {
        self.core.lock().with_player(self.id, |p| p.is_fading_in())
    }

    pub fn is_fading_out(&self) -> Result<bool> {
        self.core.lock().with_player(self.id, |p| p.is_fading_out())
    }

    pub fn is_looping(&self) -> Result<bool> {
        self.core.lock().with_player(self.id, |p| p.looping())
    }

    /// Playback position in frames.
    pub fn sample_offset(&self) -> Result<u64> {
        self.core.lock().player_sample_offset(self.id)
    }
}
