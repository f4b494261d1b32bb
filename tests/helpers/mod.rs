//! Shared test helpers: WAV fixture generation and the simulated
//! backend.

pub mod audio_generator;
pub mod mock_backend;

use polyvox::{AudioManager, EngineConfig};
use std::sync::{Arc, Mutex};

pub use mock_backend::{MockBackend, MockState};

/// A host-driven manager over the simulated backend.
pub fn mock_manager() -> (AudioManager, Arc<Mutex<MockState>>) {
    let (backend, state) = MockBackend::new();
    let config = EngineConfig {
        threaded: false,
        ..EngineConfig::default()
    };
    let manager = AudioManager::with_backend(config, backend).expect("manager init");
    (manager, state)
}

/// Drive the engine for `seconds` in fixed `step` increments.
pub fn tick(manager: &AudioManager, seconds: f32, step: f32) {
    let mut elapsed = 0.0;
    while elapsed < seconds - step / 2.0 {
        manager.update(step);
        elapsed += step;
    }
}
