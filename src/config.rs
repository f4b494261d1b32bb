//! Engine configuration.

use crate::types::BackendKind;

/// Configuration the host fills in before creating an [`AudioManager`].
///
/// [`AudioManager`]: crate::AudioManager
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Which host audio subsystem to use.
    pub backend: BackendKind,
    /// Opaque platform token (window handle on Windows, VM pointer on
    /// Android, 0 elsewhere). Only platform backends consume it; the
    /// built-in backends ignore it.
    pub backend_id: usize,
    /// Run the update loop on an internal worker thread. When false the
    /// host must call `AudioManager::update(dt)` itself.
    pub threaded: bool,
    /// Update interval in seconds for the internal worker thread.
    pub update_time: f32,
    /// Output device name. `None` selects the default device.
    pub device_name: Option<String>,
    /// Crossfade length applied when suspending/resuming all audio.
    pub suspend_resume_fade_time: f32,
    /// Seconds a managed buffer may sit unbound before its PCM is
    /// released back to disk.
    pub idle_player_unload_time: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Default,
            backend_id: 0,
            threaded: false,
            update_time: 0.01,
            device_name: None,
            suspend_resume_fade_time: 0.5,
            idle_player_unload_time: 60.0,
        }
    }
}
