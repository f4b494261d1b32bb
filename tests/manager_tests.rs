//! Registry, policy and error-path tests.

mod helpers;

use helpers::audio_generator::{generate_sine_wav, silent_pcm};
use helpers::{mock_manager, tick};
use polyvox::{
    AudioFormat, AudioManager, BackendKind, BufferMode, EngineConfig, Error, SourceMode,
};

const STEP: f32 = 0.01;

#[test]
fn category_creation_is_idempotent() {
    let (manager, _state) = mock_manager();
    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    manager.create_category("sfx", BufferMode::Streamed, SourceMode::Disk);
    assert!(manager.has_category("sfx"));
    manager.set_category_gain("sfx", 0.3).unwrap();
    assert!((manager.category_gain("sfx").unwrap() - 0.3).abs() < 1e-6);
}

#[test]
fn missing_category_is_an_error() {
    let (manager, _state) = mock_manager();
    assert!(matches!(
        manager.category_gain("nope"),
        Err(Error::CategoryNotFound(_))
    ));
    assert!(matches!(
        manager.create_sound("x.wav", "nope", ""),
        Err(Error::CategoryNotFound(_))
    ));
}

#[test]
fn unknown_format_and_duplicates_return_none() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 100, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);

    assert!(manager.create_sound("song.mp3", "sfx", "").unwrap().is_none());

    let first = manager.create_sound(wav.to_str().unwrap(), "sfx", "").unwrap();
    assert_eq!(first.as_deref(), Some("beep"));
    let duplicate = manager.create_sound(wav.to_str().unwrap(), "sfx", "").unwrap();
    assert!(duplicate.is_none());
}

#[test]
fn destroy_and_recreate_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 250, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    manager.create_sound(wav.to_str().unwrap(), "sfx", "").unwrap();
    let before = manager.sound_info("beep").unwrap();

    manager.destroy_sound("beep").unwrap();
    assert!(!manager.has_sound("beep"));
    assert!(matches!(manager.sound_info("beep"), Err(Error::SoundNotFound(_))));

    manager.create_sound(wav.to_str().unwrap(), "sfx", "").unwrap();
    let after = manager.sound_info("beep").unwrap();
    assert_eq!(before, after);
}

#[test]
fn prefix_destroy_reports_sounds_held_by_manual_players() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["ui_click.wav", "ui_hover.wav", "theme.wav"] {
        generate_sine_wav(dir.path().join(name), 100, 440.0, 0.5).unwrap();
    }

    let (manager, _state) = mock_manager();
    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    for name in ["ui_click.wav", "ui_hover.wav", "theme.wav"] {
        manager
            .create_sound(dir.path().join(name).to_str().unwrap(), "sfx", "")
            .unwrap();
    }

    let held = manager.create_player("ui_click").unwrap();
    let err = manager.destroy_sounds_with_prefix("ui_").unwrap_err();
    match err {
        Error::Busy { sounds } => assert_eq!(sounds, vec!["ui_click".to_string()]),
        other => panic!("expected Busy, got {other}"),
    }
    // The unblocked prefix sound is gone, the rest untouched.
    assert!(!manager.has_sound("ui_hover"));
    assert!(manager.has_sound("ui_click"));
    assert!(manager.has_sound("theme"));

    manager.destroy_player(held).unwrap();
    manager.destroy_sounds_with_prefix("ui_").unwrap();
    assert!(!manager.has_sound("ui_click"));
    assert!(manager.has_sound("theme"));
}

#[test]
fn memory_sounds_register_and_play() {
    let (manager, _state) = mock_manager();
    manager.create_category("gen", BufferMode::Full, SourceMode::Ram);
    let pcm = silent_pcm(250);
    let name = manager
        .create_sound_from_memory("blip", "gen", &pcm, 2, 44100, 16)
        .unwrap()
        .expect("memory sound registered");
    assert_eq!(name, "blip");

    let info = manager.sound_info("blip").unwrap();
    assert_eq!(info.format, AudioFormat::Memory);
    assert!(info.loaded);
    assert!((info.duration - 0.25).abs() < 0.01);

    manager.play("blip", 0.0, false).unwrap();
    tick(&manager, 0.05, STEP);
    assert_eq!(manager.playing_count("blip"), 1);
    tick(&manager, 0.3, STEP);
    assert_eq!(manager.playing_count("blip"), 0);

    // Memory payloads cannot be reloaded, so they are never cleared.
    assert_eq!(manager.clear_memory(), 0);
    assert!(manager.sound_info("blip").unwrap().loaded);
}

#[test]
fn disabled_backend_registers_sounds_but_stays_silent() {
    let manager = AudioManager::new(EngineConfig {
        backend: BackendKind::Disabled,
        threaded: false,
        ..EngineConfig::default()
    })
    .unwrap();
    assert!(!manager.is_enabled());

    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    // The file does not exist; creation still succeeds so host code
    // keeps working.
    let name = manager.create_sound("ghost.wav", "sfx", "").unwrap();
    assert_eq!(name.as_deref(), Some("ghost"));

    manager.play("ghost", 0.0, false).unwrap();
    manager.update(STEP);
    assert_eq!(manager.playing_count("ghost"), 0);
    assert_eq!(manager.fading_count("ghost"), 0);
}

#[test]
fn file_resolution_tries_registered_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 100, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    let bare = dir.path().join("beep");
    assert_eq!(
        manager.find_audio_file(bare.to_str().unwrap()),
        Some(wav.clone())
    );
    // A wrong extension is stripped and retried.
    let wrong = dir.path().join("beep.ogg");
    assert_eq!(
        manager.find_audio_file(wrong.to_str().unwrap()),
        Some(wav.clone())
    );
    assert_eq!(manager.find_audio_file("beep.nothere"), None);

    // The resolver also backs create_sound.
    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    let name = manager.create_sound(bare.to_str().unwrap(), "sfx", "").unwrap();
    assert_eq!(name.as_deref(), Some("beep"));
    assert!(manager.sound_info("beep").unwrap().loaded);
}

#[test]
fn directory_scan_uses_subdirectories_as_categories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sfx")).unwrap();
    std::fs::create_dir(dir.path().join("music")).unwrap();
    generate_sine_wav(dir.path().join("sfx/click.wav"), 100, 440.0, 0.5).unwrap();
    generate_sine_wav(dir.path().join("music/theme.wav"), 100, 220.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    let mut names = manager
        .create_sounds_from_path(dir.path(), None, "")
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["click".to_string(), "theme".to_string()]);
    assert!(manager.has_category("sfx"));
    assert!(manager.has_category("music"));
    assert_eq!(manager.sound_info("click").unwrap().category, "sfx");
    assert_eq!(manager.sound_info("theme").unwrap().category, "music");
}

#[test]
fn directory_scan_with_explicit_category_and_prefix() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    generate_sine_wav(dir.path().join("top.wav"), 100, 440.0, 0.5).unwrap();
    generate_sine_wav(dir.path().join("nested/deep.wav"), 100, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    let mut names = manager
        .create_sounds_from_path(dir.path(), Some("all"), "menu_")
        .unwrap();
    names.sort();
    assert_eq!(names, vec!["menu_deep".to_string(), "menu_top".to_string()]);
    assert_eq!(manager.sound_info("menu_top").unwrap().category, "all");
}

#[test]
fn managed_buffers_unload_after_idle_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 100, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.set_idle_player_unload_time(0.1);
    manager.create_category("managed", BufferMode::Managed, SourceMode::Disk);
    manager.create_sound(wav.to_str().unwrap(), "managed", "").unwrap();
    // Managed mode decodes at first bind, not at creation.
    assert!(!manager.sound_info("beep").unwrap().loaded);

    manager.play("beep", 0.0, false).unwrap();
    assert!(manager.sound_info("beep").unwrap().loaded);
    tick(&manager, 0.15, STEP);
    assert_eq!(manager.playing_count("beep"), 0);

    tick(&manager, 0.2, STEP);
    assert!(!manager.sound_info("beep").unwrap().loaded);
}

#[test]
fn on_demand_buffers_release_when_last_player_unbinds() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 100, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.create_category("demand", BufferMode::OnDemand, SourceMode::Disk);
    manager.create_sound(wav.to_str().unwrap(), "demand", "").unwrap();
    assert!(!manager.sound_info("beep").unwrap().loaded);

    manager.play("beep", 0.0, false).unwrap();
    assert!(manager.sound_info("beep").unwrap().loaded);
    tick(&manager, 0.2, STEP);
    assert_eq!(manager.playing_count("beep"), 0);
    assert!(!manager.sound_info("beep").unwrap().loaded);
}

#[test]
fn clear_memory_releases_idle_managed_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 100, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.create_category("managed", BufferMode::Managed, SourceMode::Disk);
    manager.create_sound(wav.to_str().unwrap(), "managed", "").unwrap();
    manager.play("beep", 0.0, false).unwrap();
    tick(&manager, 0.15, STEP);
    assert!(manager.sound_info("beep").unwrap().loaded);

    assert_eq!(manager.clear_memory(), 1);
    assert!(!manager.sound_info("beep").unwrap().loaded);
}

#[test]
fn destroying_a_sound_cancels_its_pending_async_load() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("tone.wav");
    generate_sine_wav(&wav, 200, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.create_category("async", BufferMode::Async, SourceMode::Disk);
    manager.create_sound(wav.to_str().unwrap(), "async", "").unwrap();
    manager.destroy_sound("tone").unwrap();

    // The completion for the vanished buffer must be skipped quietly.
    for _ in 0..100 {
        manager.update(STEP);
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    assert!(!manager.has_sound("tone"));
}

#[test]
fn stop_all_fades_manual_players_without_destroying_them() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("beep.wav");
    generate_sine_wav(&wav, 1000, 440.0, 0.5).unwrap();

    let (manager, _state) = mock_manager();
    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    manager.create_sound(wav.to_str().unwrap(), "sfx", "").unwrap();

    let player = manager.create_player("beep").unwrap();
    assert!(player.play(0.0, true).unwrap());
    manager.play("beep", 0.0, true).unwrap();
    tick(&manager, 0.05, STEP);

    manager.stop_all(0.05);
    tick(&manager, 0.02, STEP);
    assert!(player.is_fading_out().unwrap());

    tick(&manager, 0.1, STEP);
    assert!(!player.is_playing().unwrap());
    assert_eq!(manager.playing_count("beep"), 0);
    // The manual player survives a stop_all and still answers queries.
    assert!(!player.is_fading().unwrap());
    manager.destroy_player(player).unwrap();
}

#[test]
fn gains_are_clamped_to_unit_range() {
    let (manager, _state) = mock_manager();
    manager.set_global_gain(2.0);
    assert!((manager.global_gain() - 1.0).abs() < 1e-6);
    manager.set_global_gain(-0.5);
    assert!(manager.global_gain() < 1e-6);

    manager.create_category("sfx", BufferMode::Full, SourceMode::Ram);
    manager.set_category_gain("sfx", 1.7).unwrap();
    assert!((manager.category_gain("sfx").unwrap() - 1.0).abs() < 1e-6);
}

#[test]
fn destroyed_player_handle_reports_not_found() {
    let (manager, _state) = mock_manager();
    manager.create_category("gen", BufferMode::Full, SourceMode::Ram);
    let pcm = silent_pcm(100);
    manager
        .create_sound_from_memory("blip", "gen", &pcm, 2, 44100, 16)
        .unwrap();

    let player = manager.create_player("blip").unwrap();
    let stale = player.clone();
    manager.destroy_player(player).unwrap();
    assert!(matches!(stale.is_playing(), Err(Error::PlayerNotFound)));
    assert!(matches!(stale.play(0.0, false), Err(Error::PlayerNotFound)));
}
