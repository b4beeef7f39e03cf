#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use bevy::prelude::*;
use echoes_core::{
    attach_event_journal, build_headless_app, EventJournal, FlashbackAnchor, GameEvent,
    PlayerBody, PostProcessParams, ProfileId, ProfileLibrary, INSANITY_CONFIG_PATH_ENV,
};

/// Exactly representable so timers land on their thresholds without drift.
pub const DT: f32 = 0.25;

static INIT: Once = Once::new();

pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("test_insanity_config.json")
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture_path();

        debug_assert!(
            config_path.exists(),
            "missing test insanity config at {}",
            config_path.display()
        );

        std::env::set_var(INSANITY_CONFIG_PATH_ENV, &config_path);
    });
}

/// Headless app on the fixture config with an event journal attached.
pub fn test_app() -> App {
    ensure_test_config();
    let mut app = build_headless_app();
    attach_event_journal(&mut app.world);
    app
}

pub fn spawn_player(app: &mut App, at: Vec3) -> Entity {
    app.world
        .spawn((
            Transform::from_translation(at),
            PlayerBody {
                linear_velocity: Vec3::new(2.0, -9.8, 0.5),
                angular_velocity: Vec3::new(0.0, 1.5, 0.0),
            },
        ))
        .id()
}

pub fn spawn_anchor(app: &mut App, at: Vec3) -> Entity {
    app.world
        .spawn((Transform::from_translation(at), FlashbackAnchor))
        .id()
}

pub fn journal(app: &App) -> Vec<GameEvent> {
    app.world.resource::<EventJournal>().events().copied().collect()
}

pub fn count(app: &App, predicate: impl Fn(&GameEvent) -> bool) -> usize {
    app.world.resource::<EventJournal>().count(predicate)
}

pub fn profile(app: &App, id: ProfileId) -> PostProcessParams {
    *app.world.resource::<ProfileLibrary>().get(id).params()
}
