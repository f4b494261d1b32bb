//! The engine core: registries, the update tick and the playback
//! orchestration. Everything here assumes the manager lock is held; the
//! facade in `manager::mod` is the only caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::AudioBackend;
use crate::buffer::Buffer;
use crate::category::{Category, GainFade};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::loader::{AsyncLoader, DecodeJob};
use crate::player::{Player, PlayerId};
use crate::sound::{derive_name, BufferId, Sound, SoundInfo};
use crate::source::find_audio_file;
use crate::types::{AudioFormat, BufferMode, PcmSpec, SourceMode};

pub(crate) struct ManagerCore {
    backend: Box<dyn AudioBackend>,
    enabled: bool,
    suspended: bool,
    threaded: bool,
    device_name: Option<String>,
    suspend_resume_fade_time: f32,
    idle_player_unload_time: f32,
    global_gain: f32,
    global_fade: GainFade,
    extensions: Vec<String>,
    categories: HashMap<String, Category>,
    sounds: HashMap<String, Sound>,
    buffers: HashMap<BufferId, Buffer>,
    players: HashMap<PlayerId, Player>,
    /// Insertion order of `players`; the tick iterates in this order.
    player_order: Vec<PlayerId>,
    managed_players: Vec<PlayerId>,
    /// Players paused by a suspend, to be resumed together.
    suspended_players: Vec<PlayerId>,
    loader: AsyncLoader,
}

impl ManagerCore {
    pub fn new(config: &EngineConfig, backend: Box<dyn AudioBackend>) -> Self {
        let enabled = backend.is_enabled();
        Self {
            enabled,
            backend,
            suspended: false,
            threaded: config.threaded,
            device_name: config.device_name.clone(),
            suspend_resume_fade_time: config.suspend_resume_fade_time,
            idle_player_unload_time: config.idle_player_unload_time,
            global_gain: 1.0,
            global_fade: GainFade::default(),
            extensions: vec![
                ".flac".into(),
                ".ogg".into(),
                ".spx".into(),
                ".wav".into(),
            ],
            categories: HashMap::new(),
            sounds: HashMap::new(),
            buffers: HashMap::new(),
            players: HashMap::new(),
            player_order: Vec::new(),
            managed_players: Vec::new(),
            suspended_players: Vec::new(),
            loader: AsyncLoader::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    pub fn sampling_rate(&self) -> u32 {
        self.backend.sampling_rate()
    }

    pub fn channels(&self) -> u16 {
        self.backend.channels()
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.backend.bits_per_sample()
    }

    pub fn idle_player_unload_time(&self) -> f32 {
        self.idle_player_unload_time
    }

    pub fn set_idle_player_unload_time(&mut self, seconds: f32) {
        self.idle_player_unload_time = seconds.max(0.0);
    }

    pub fn suspend_resume_fade_time(&self) -> f32 {
        self.suspend_resume_fade_time
    }

    pub fn set_suspend_resume_fade_time(&mut self, seconds: f32) {
        self.suspend_resume_fade_time = seconds.max(0.0);
    }

    pub fn add_audio_extension(&mut self, extension: &str) {
        let ext = if extension.starts_with('.') {
            extension.to_owned()
        } else {
            format!(".{extension}")
        };
        if !self.extensions.contains(&ext) {
            self.extensions.push(ext);
        }
    }

    pub fn find_audio_file(&self, filename: &str) -> Option<PathBuf> {
        find_audio_file(filename, &self.extensions)
    }

    // ---- global gain --------------------------------------------------

    pub fn effective_global_gain(&self) -> f32 {
        self.global_fade.effective(self.global_gain)
    }

    pub fn is_global_gain_fading(&self) -> bool {
        self.global_fade.is_active()
    }

    pub fn set_global_gain(&mut self, value: f32) {
        self.global_gain = value.clamp(0.0, 1.0);
        self.global_fade.cancel();
        self.push_all_gains();
    }

    pub fn fade_global_gain(&mut self, target: f32, seconds: f32) {
        if seconds > 0.0 {
            self.global_fade.start(target, seconds);
        } else {
            self.set_global_gain(target);
        }
    }

    fn push_all_gains(&mut self) {
        let global = self.effective_global_gain();
        let ManagerCore {
            players,
            categories,
            player_order,
            ..
        } = self;
        for id in player_order.iter() {
            if let Some(player) = players.get_mut(id) {
                let category_gain = categories
                    .get(player.category())
                    .map(Category::effective_gain)
                    .unwrap_or(1.0);
                player.push_gain(category_gain, global);
            }
        }
    }

    // ---- categories ---------------------------------------------------

    pub fn create_category(
        &mut self,
        name: &str,
        buffer_mode: BufferMode,
        source_mode: SourceMode,
    ) {
        if !self.categories.contains_key(name) {
            debug!(category = name, ?buffer_mode, ?source_mode, "creating category");
            self.categories
                .insert(name.to_owned(), Category::new(name, buffer_mode, source_mode));
        }
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    fn category(&self, name: &str) -> Result<&Category> {
        self.categories
            .get(name)
            .ok_or_else(|| Error::CategoryNotFound(name.to_owned()))
    }

    pub fn category_gain(&self, name: &str) -> Result<f32> {
        Ok(self.category(name)?.gain())
    }

    pub fn set_category_gain(&mut self, name: &str, gain: f32) -> Result<()> {
        self.categories
            .get_mut(name)
            .ok_or_else(|| Error::CategoryNotFound(name.to_owned()))?
            .set_gain(gain);
        self.push_all_gains();
        Ok(())
    }

    pub fn fade_category_gain(&mut self, name: &str, target: f32, seconds: f32) -> Result<()> {
        self.categories
            .get_mut(name)
            .ok_or_else(|| Error::CategoryNotFound(name.to_owned()))?
            .fade_gain(target, seconds);
        if seconds <= 0.0 {
            self.push_all_gains();
        }
        Ok(())
    }

    // ---- sounds -------------------------------------------------------

    pub fn create_sound(
        &mut self,
        filename: &str,
        category_name: &str,
        prefix: &str,
    ) -> Result<Option<String>> {
        let category = self.category(category_name)?;
        let buffer_mode = category.buffer_mode();
        let source_mode = category.source_mode();
        let path = self
            .find_audio_file(filename)
            .unwrap_or_else(|| PathBuf::from(filename.replace('\\', "/")));
        let format = AudioFormat::from_path(&path);
        if format == AudioFormat::Unknown {
            debug!(file = filename, "unknown format, sound not created");
            return Ok(None);
        }
        let name = derive_name(&path.to_string_lossy(), prefix);
        if self.sounds.contains_key(&name) {
            debug!(sound = %name, "name already registered, sound not created");
            return Ok(None);
        }
        let buffer_id: BufferId = Uuid::new_v4();
        let mut buffer = Buffer::from_file(buffer_id, path.clone(), format, buffer_mode, source_mode);
        if self.enabled {
            match buffer_mode {
                BufferMode::Full => {
                    // Eager decode; a failure leaves the buffer empty and
                    // playback a logged no-op.
                    if let Err(e) = buffer.prepare() {
                        warn!(sound = %name, "eager decode failed: {e}");
                    }
                }
                BufferMode::Async => {
                    buffer.mark_async_queued();
                    self.loader.queue(DecodeJob {
                        buffer: buffer_id,
                        path: path.clone(),
                        format,
                        source_mode,
                    });
                }
                _ => {}
            }
        }
        self.buffers.insert(buffer_id, buffer);
        self.sounds.insert(
            name.clone(),
            Sound::from_file(name.clone(), path, format, category_name, buffer_id),
        );
        debug!(sound = %name, category = category_name, "sound created");
        Ok(Some(name))
    }

    pub fn create_sound_from_memory(
        &mut self,
        name: &str,
        category_name: &str,
        data: &[u8],
        channels: u16,
        sample_rate: u32,
        bits_per_sample: u16,
    ) -> Result<Option<String>> {
        self.category(category_name)?;
        if self.sounds.contains_key(name) {
            return Ok(None);
        }
        let spec = PcmSpec {
            channels,
            sample_rate,
            bits_per_sample,
        };
        let buffer_id: BufferId = Uuid::new_v4();
        let mut pcm = data.to_vec();
        // Reserved reformatting hook; a resampling backend sees every
        // memory payload here.
        self.backend.convert_stream(&spec, &mut pcm);
        let buffer = Buffer::from_memory(buffer_id, pcm, spec);
        self.buffers.insert(buffer_id, buffer);
        self.sounds.insert(
            name.to_owned(),
            Sound::from_memory(name.to_owned(), category_name, buffer_id),
        );
        debug!(sound = name, category = category_name, "memory sound created");
        Ok(Some(name.to_owned()))
    }

    pub fn create_sounds_from_path(
        &mut self,
        path: &Path,
        category: Option<&str>,
        prefix: &str,
    ) -> Result<Vec<String>> {
        match category {
            Some(category_name) => {
                self.create_category(category_name, BufferMode::Full, SourceMode::Disk);
                let mut result = Vec::new();
                for file in collect_files(path)? {
                    if let Some(name) =
                        self.create_sound(&file.to_string_lossy(), category_name, prefix)?
                    {
                        result.push(name);
                    }
                }
                Ok(result)
            }
            None => {
                // Each direct subdirectory becomes its own category.
                let mut result = Vec::new();
                let mut dirs: Vec<PathBuf> = std::fs::read_dir(path)?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .filter(|p| p.is_dir())
                    .collect();
                dirs.sort();
                for dir in dirs {
                    let category_name = dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    result.extend(self.create_sounds_from_path(
                        &dir,
                        Some(&category_name),
                        prefix,
                    )?);
                }
                Ok(result)
            }
        }
    }

    pub fn has_sound(&self, name: &str) -> bool {
        self.sounds.contains_key(name)
    }

    pub fn sound_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sounds.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn sound_info(&self, name: &str) -> Result<SoundInfo> {
        let sound = self
            .sounds
            .get(name)
            .ok_or_else(|| Error::SoundNotFound(name.to_owned()))?;
        let buffer = self
            .buffers
            .get(&sound.buffer())
            .ok_or_else(|| Error::InvalidState(format!("sound '{name}' lost its buffer")))?;
        let spec = buffer.spec();
        Ok(SoundInfo {
            name: sound.name().to_owned(),
            category: sound.category().to_owned(),
            format: sound.format(),
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: spec.bits_per_sample,
            size: buffer.size(),
            duration: buffer.duration(),
            streamed: buffer.is_streamed(),
            loaded: buffer.is_loaded(),
        })
    }

    pub fn destroy_sound(&mut self, name: &str) -> Result<()> {
        if !self.sounds.contains_key(name) {
            return Err(Error::SoundNotFound(name.to_owned()));
        }
        let managed: Vec<PlayerId> = self
            .managed_players
            .iter()
            .copied()
            .filter(|id| {
                self.players
                    .get(id)
                    .map(|p| p.sound() == name)
                    .unwrap_or(false)
            })
            .collect();
        for id in managed {
            self.destroy_managed_player(id);
        }
        let manual_remaining = self
            .player_order
            .iter()
            .any(|id| self.players.get(id).map(|p| p.sound() == name).unwrap_or(false));
        if manual_remaining {
            return Err(Error::Busy {
                sounds: vec![name.to_owned()],
            });
        }
        if let Some(sound) = self.sounds.remove(name) {
            // Removing the buffer also cancels any pending async load;
            // the completion drain skips unknown ids.
            self.buffers.remove(&sound.buffer());
        }
        info!(sound = name, "sound destroyed");
        Ok(())
    }

    pub fn destroy_sounds_with_prefix(&mut self, prefix: &str) -> Result<()> {
        info!(prefix, "destroying sounds with prefix");
        let names: Vec<String> = self
            .sounds
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        let mut busy = Vec::new();
        for name in names {
            match self.destroy_sound(&name) {
                Ok(()) => {}
                Err(Error::Busy { .. }) => busy.push(name),
                Err(e) => return Err(e),
            }
        }
        if !busy.is_empty() {
            busy.sort();
            return Err(Error::Busy { sounds: busy });
        }
        Ok(())
    }

    // ---- players ------------------------------------------------------

    pub fn create_player(&mut self, sound_name: &str, managed: bool) -> Result<PlayerId> {
        let sound = self
            .sounds
            .get(sound_name)
            .ok_or_else(|| Error::SoundNotFound(sound_name.to_owned()))?;
        let buffer = self
            .buffers
            .get(&sound.buffer())
            .ok_or_else(|| Error::InvalidState(format!("sound '{sound_name}' lost its buffer")))?;
        let voice = self.backend.create_voice()?;
        let id: PlayerId = Uuid::new_v4();
        let player = Player::new(
            id,
            sound_name,
            sound.category(),
            sound.buffer(),
            buffer.is_streamed(),
            voice,
        );
        self.players.insert(id, player);
        self.player_order.push(id);
        if managed {
            self.managed_players.push(id);
        }
        Ok(id)
    }

    pub fn destroy_player(&mut self, id: PlayerId) -> Result<()> {
        if !self.players.contains_key(&id) {
            return Err(Error::PlayerNotFound);
        }
        {
            let ManagerCore {
                players, buffers, ..
            } = self;
            if let Some(player) = players.get_mut(&id) {
                if let Some(buffer) = buffers.get_mut(&player.buffer_id()) {
                    player.halt(buffer);
                }
            }
        }
        self.players.remove(&id);
        self.player_order.retain(|other| *other != id);
        self.managed_players.retain(|other| *other != id);
        self.suspended_players.retain(|other| *other != id);
        Ok(())
    }

    fn destroy_managed_player(&mut self, id: PlayerId) {
        let _ = self.destroy_player(id);
    }

    // ---- handle-level player operations -------------------------------

    pub fn player_play(&mut self, id: PlayerId, fade: f32, looping: bool) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let global = self.effective_global_gain();
        let ManagerCore {
            players,
            buffers,
            categories,
            ..
        } = self;
        let player = players.get_mut(&id).ok_or(Error::PlayerNotFound)?;
        let category_gain = categories
            .get(player.category())
            .map(Category::effective_gain)
            .unwrap_or(1.0);
        let buffer = buffers
            .get_mut(&player.buffer_id())
            .ok_or_else(|| Error::InvalidState("player's buffer is gone".into()))?;
        player.play(buffer, fade, looping, category_gain, global)
    }

    pub fn player_stop(&mut self, id: PlayerId, fade: f32) -> Result<()> {
        let ManagerCore {
            players, buffers, ..
        } = self;
        let player = players.get_mut(&id).ok_or(Error::PlayerNotFound)?;
        let buffer = buffers
            .get_mut(&player.buffer_id())
            .ok_or_else(|| Error::InvalidState("player's buffer is gone".into()))?;
        player.stop(buffer, fade);
        Ok(())
    }

    pub fn player_pause(&mut self, id: PlayerId, fade: f32) -> Result<()> {
        let ManagerCore {
            players, buffers, ..
        } = self;
        let player = players.get_mut(&id).ok_or(Error::PlayerNotFound)?;
        let buffer = buffers
            .get_mut(&player.buffer_id())
            .ok_or_else(|| Error::InvalidState("player's buffer is gone".into()))?;
        player.pause(buffer, fade);
        Ok(())
    }

    pub fn player_set_gain(&mut self, id: PlayerId, gain: f32) -> Result<()> {
        let global = self.effective_global_gain();
        let ManagerCore {
            players,
            categories,
            ..
        } = self;
        let player = players.get_mut(&id).ok_or(Error::PlayerNotFound)?;
        let category_gain = categories
            .get(player.category())
            .map(Category::effective_gain)
            .unwrap_or(1.0);
        player.set_gain(gain, category_gain, global);
        Ok(())
    }

    pub fn player_set_pitch(&mut self, id: PlayerId, pitch: f32) -> Result<()> {
        self.players
            .get_mut(&id)
            .ok_or(Error::PlayerNotFound)?
            .set_pitch(pitch);
        Ok(())
    }

    pub fn with_player<R>(&self, id: PlayerId, f: impl FnOnce(&Player) -> R) -> Result<R> {
        self.players
            .get(&id)
            .map(f)
            .ok_or(Error::PlayerNotFound)
    }

    pub fn player_sample_offset(&self, id: PlayerId) -> Result<u64> {
        let player = self.players.get(&id).ok_or(Error::PlayerNotFound)?;
        let buffer = self
            .buffers
            .get(&player.buffer_id())
            .ok_or_else(|| Error::InvalidState("player's buffer is gone".into()))?;
        Ok(player.sample_offset(buffer))
    }

    // ---- managed playback ---------------------------------------------

    pub fn play(&mut self, sound_name: &str, fade: f32, looping: bool, gain: f32) -> Result<()> {
        if self.suspended || !self.enabled {
            return Ok(());
        }
        let id = self.create_player(sound_name, true)?;
        let _ = self.player_set_gain(id, gain);
        let started = self.player_play(id, fade, looping)?;
        if !started {
            debug!(sound = sound_name, "managed play did not start");
        }
        Ok(())
    }

    pub fn play_async(
        &mut self,
        sound_name: &str,
        fade: f32,
        looping: bool,
        gain: f32,
    ) -> Result<()> {
        if self.suspended || !self.enabled {
            return Ok(());
        }
        // Push a lazy decode onto the loader so the play below queues
        // instead of decoding synchronously.
        let sound = self
            .sounds
            .get(sound_name)
            .ok_or_else(|| Error::SoundNotFound(sound_name.to_owned()))?;
        let buffer_id = sound.buffer();
        if let Some(buffer) = self.buffers.get_mut(&buffer_id) {
            if !buffer.is_loaded() && !buffer.is_async_pending() && !buffer.is_streamed() {
                if let Some(path) = buffer.filename().map(Path::to_path_buf) {
                    buffer.mark_async_queued();
                    self.loader.queue(DecodeJob {
                        buffer: buffer_id,
                        path,
                        format: buffer.format(),
                        source_mode: buffer.source_mode(),
                    });
                }
            }
        }
        self.play(sound_name, fade, looping, gain)
    }

    pub fn stop_sound(&mut self, sound_name: &str, fade: f32) {
        if fade <= 0.0 {
            let targets: Vec<PlayerId> = self
                .managed_players
                .iter()
                .copied()
                .filter(|id| {
                    self.players
                        .get(id)
                        .map(|p| p.sound() == sound_name)
                        .unwrap_or(false)
                })
                .collect();
            for id in targets {
                self.destroy_managed_player(id);
            }
        } else {
            let ManagerCore {
                players,
                buffers,
                managed_players,
                ..
            } = self;
            for id in managed_players.iter() {
                if let Some(player) = players.get_mut(id) {
                    if player.sound() == sound_name {
                        if let Some(buffer) = buffers.get_mut(&player.buffer_id()) {
                            player.stop(buffer, fade);
                        }
                    }
                }
            }
        }
    }

    pub fn stop_first(&mut self, sound_name: &str, fade: f32) {
        let first = self.managed_players.iter().copied().find(|id| {
            self.players
                .get(id)
                .map(|p| p.sound() == sound_name)
                .unwrap_or(false)
        });
        if let Some(id) = first {
            if fade <= 0.0 {
                self.destroy_managed_player(id);
            } else {
                let _ = self.player_stop(id, fade);
            }
        }
    }

    pub fn stop_all(&mut self, fade: f32) {
        if fade <= 0.0 {
            let managed = self.managed_players.clone();
            for id in managed {
                self.destroy_managed_player(id);
            }
        }
        // Includes manual players.
        let ManagerCore {
            players,
            buffers,
            player_order,
            ..
        } = self;
        for id in player_order.iter() {
            if let Some(player) = players.get_mut(id) {
                if let Some(buffer) = buffers.get_mut(&player.buffer_id()) {
                    player.stop(buffer, fade);
                }
            }
        }
    }

    pub fn stop_category(&mut self, category_name: &str, fade: f32) -> Result<()> {
        let fade = fade.max(0.0);
        self.category(category_name)?;
        if fade == 0.0 {
            let targets: Vec<PlayerId> = self
                .managed_players
                .iter()
                .copied()
                .filter(|id| {
                    self.players
                        .get(id)
                        .map(|p| p.category() == category_name)
                        .unwrap_or(false)
                })
                .collect();
            for id in targets {
                self.destroy_managed_player(id);
            }
        }
        let ManagerCore {
            players,
            buffers,
            player_order,
            ..
        } = self;
        for id in player_order.iter() {
            if let Some(player) = players.get_mut(id) {
                if player.category() == category_name {
                    if let Some(buffer) = buffers.get_mut(&player.buffer_id()) {
                        player.stop(buffer, fade);
                    }
                }
            }
        }
        Ok(())
    }

    // ---- managed-player queries ---------------------------------------

    fn count_managed(&self, sound_name: &str, predicate: impl Fn(&Player) -> bool) -> usize {
        self.managed_players
            .iter()
            .filter_map(|id| self.players.get(id))
            .filter(|&p| p.sound() == sound_name && predicate(p))
            .count()
    }

    pub fn playing_count(&self, sound_name: &str) -> usize {
        self.count_managed(sound_name, |p| p.is_playing())
    }

    pub fn fading_count(&self, sound_name: &str) -> usize {
        self.count_managed(sound_name, |p| p.is_fading())
    }

    pub fn fading_in_count(&self, sound_name: &str) -> usize {
        self.count_managed(sound_name, |p| p.is_fading_in())
    }

    pub fn fading_out_count(&self, sound_name: &str) -> usize {
        self.count_managed(sound_name, |p| p.is_fading_out())
    }

    // ---- suspend / resume ---------------------------------------------

    pub fn suspend_audio(&mut self) {
        if self.suspended {
            return;
        }
        info!("suspending audio playback");
        // The fade can only advance while the update thread runs; a
        // host-driven manager suspends immediately.
        let fade = if self.threaded {
            self.suspend_resume_fade_time
        } else {
            0.0
        };
        {
            let ManagerCore {
                players,
                buffers,
                player_order,
                suspended_players,
                ..
            } = self;
            for id in player_order.iter() {
                let Some(player) = players.get_mut(id) else {
                    continue;
                };
                let Some(buffer) = buffers.get_mut(&player.buffer_id()) else {
                    continue;
                };
                if player.is_fading_out() {
                    if player.is_pause_pending() {
                        player.pause(buffer, fade);
                    } else {
                        player.stop(buffer, fade);
                    }
                } else if player.is_playing() {
                    player.pause(buffer, fade);
                    suspended_players.push(*id);
                }
            }
        }
        self.backend.suspend();
        self.suspended = true;
    }

    pub fn resume_audio(&mut self) {
        if !self.suspended {
            return;
        }
        info!("resuming audio playback");
        self.suspended = false;
        self.backend.resume();
        let fade = if self.threaded {
            self.suspend_resume_fade_time
        } else {
            0.0
        };
        let global = self.effective_global_gain();
        let resumed: Vec<PlayerId> = std::mem::take(&mut self.suspended_players);
        let ManagerCore {
            players,
            buffers,
            categories,
            ..
        } = self;
        for id in resumed {
            let Some(player) = players.get_mut(&id) else {
                continue;
            };
            let Some(buffer) = buffers.get_mut(&player.buffer_id()) else {
                continue;
            };
            let category_gain = categories
                .get(player.category())
                .map(Category::effective_gain)
                .unwrap_or(1.0);
            let looping = player.looping();
            if let Err(e) = player.play(buffer, fade, looping, category_gain, global) {
                warn!(sound = player.sound(), "resume failed: {e}");
            }
        }
    }

    // ---- memory -------------------------------------------------------

    pub fn clear_memory(&mut self) -> usize {
        let mut count = 0;
        for buffer in self.buffers.values_mut() {
            if buffer.try_clear_memory() {
                count += 1;
            }
        }
        debug!(count, "buffers released by memory clearing");
        count
    }

    /// Full teardown: every player stopped and destroyed, registries
    /// emptied. The backend stays usable.
    pub fn clear(&mut self) {
        {
            let ManagerCore {
                players, buffers, ..
            } = self;
            for player in players.values_mut() {
                if let Some(buffer) = buffers.get_mut(&player.buffer_id()) {
                    player.halt(buffer);
                }
            }
        }
        self.players.clear();
        self.player_order.clear();
        self.managed_players.clear();
        self.suspended_players.clear();
        self.sounds.clear();
        self.buffers.clear();
        self.categories.clear();
    }

    // ---- the tick -----------------------------------------------------

    pub fn update(&mut self, dt: f32) {
        if self.suspended {
            // Only the suspend fade advances while suspended, and only
            // when the update thread is there to drive it.
            if self.suspend_resume_fade_time > 0.0 && self.threaded {
                let global = self.effective_global_gain();
                let ManagerCore {
                    players,
                    buffers,
                    categories,
                    player_order,
                    ..
                } = self;
                for id in player_order.iter() {
                    let Some(player) = players.get_mut(id) else {
                        continue;
                    };
                    let Some(buffer) = buffers.get_mut(&player.buffer_id()) else {
                        continue;
                    };
                    let category_gain = categories
                        .get(player.category())
                        .map(Category::effective_gain)
                        .unwrap_or(1.0);
                    player.push_gain(category_gain, global);
                    player.update(buffer, dt, category_gain, global);
                }
            }
            return;
        }

        self.backend.update(dt);

        // 1. Drain the async loader's completions.
        for completion in self.loader.drain() {
            // A destroyed buffer cancels its pending load.
            let Some(buffer) = self.buffers.get_mut(&completion.buffer) else {
                continue;
            };
            match completion.result {
                Ok((spec, pcm)) => buffer.install_async(spec, pcm),
                Err(e) => buffer.async_failed(&e.to_string()),
            }
        }

        // 2. Advance the global gain fade.
        let mut gain_fading = false;
        if dt > 0.0 {
            if self.global_fade.is_active() {
                gain_fading = true;
                if let Some(target) = self.global_fade.advance(dt) {
                    self.global_gain = target;
                }
            }
            // 3. Advance category fades.
            for category in self.categories.values_mut() {
                if category.is_gain_fading() {
                    gain_fading = true;
                    category.update(dt);
                }
            }
        }

        // 4. Advance every player; retry queued async plays.
        let global = self.effective_global_gain();
        {
            let ManagerCore {
                players,
                buffers,
                categories,
                player_order,
                ..
            } = self;
            for id in player_order.iter() {
                let Some(player) = players.get_mut(id) else {
                    continue;
                };
                let Some(buffer) = buffers.get_mut(&player.buffer_id()) else {
                    continue;
                };
                let category_gain = categories
                    .get(player.category())
                    .map(Category::effective_gain)
                    .unwrap_or(1.0);
                if gain_fading && !player.is_fading() {
                    // A player mid-fade pushes its own gain below.
                    player.push_gain(category_gain, global);
                }
                player.update(buffer, dt, category_gain, global);
                if player.is_async_play_queued() && !buffer.is_async_pending() {
                    let fade = player.queued_fade();
                    let looping = player.looping();
                    if let Err(e) = player.play(buffer, fade, looping, category_gain, global) {
                        warn!(sound = player.sound(), "queued play failed: {e}");
                    }
                }
            }
        }

        // 5. Reclaim managed players that fell silent.
        let finished: Vec<PlayerId> = self
            .managed_players
            .iter()
            .copied()
            .filter(|id| {
                self.players
                    .get(id)
                    .map(|p| !p.is_async_play_queued() && !p.is_playing() && !p.is_fading_out())
                    .unwrap_or(true)
            })
            .collect();
        for id in finished {
            self.destroy_managed_player(id);
        }

        // 6. Buffer idle bookkeeping.
        for buffer in self.buffers.values_mut() {
            buffer.update(dt, self.idle_player_unload_time);
        }
    }
}

/// Recursively collect the files under `dir`, sorted for determinism.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
