//! Insanity state and post-processing orchestration for Echoes.
//!
//! Drives a single insanity level, the timed cure that counters it, and the
//! post-processing output derived from both. Everything advances only when
//! [`run_frame`] hands the app a frame delta, so a headless run is fully
//! deterministic.

pub mod blend;
pub mod clock;
pub mod config;
pub mod cure;
pub mod curve;
pub mod events;
pub mod insanity;
pub mod output;
pub mod plugin;
pub mod profile;
pub mod shader;
pub mod teleport;
pub mod transition;

use std::sync::Arc;

use bevy::prelude::*;

pub use blend::{ProfileBlender, SmoothingMode};
pub use clock::{run_for, run_frame, FrameClock};
pub use config::{
    load_insanity_config_from_env, InsanityConfig, InsanityConfigError, InsanityConfigHandle,
    InsanityConfigMetadata, BUILTIN_INSANITY_CONFIG, INSANITY_CONFIG_PATH_ENV,
};
pub use cure::{begin_cure, CureSequencer, CureStage};
pub use curve::KeyCurve;
pub use events::{
    attach_event_journal, publish, EventBus, EventJournal, GameEvent, JournalEntry,
    SubscriptionId,
};
pub use insanity::{set_insanity_level, AccumulationMode, InsanityMeter};
pub use output::{ParamWriter, PostProcessSink, RenderSink, RenderedPostProcess};
pub use plugin::{retire_module, InsanityPlugin, Module, ModuleSubscriptions};
pub use profile::{
    ColorFilter, PostProcessParams, ProfileError, ProfileId, ProfileLibrary, TonemappingMode,
    VisualProfile,
};
pub use shader::ShaderInsanityDriver;
pub use teleport::{FlashbackAnchor, PlayerBody, ReturnPoint};
pub use transition::{
    TeleportCue, TransitionKind, TransitionRequest, TransitionSequencer, TransitionStep,
};

/// Construct a headless [`App`] using the config named by
/// [`INSANITY_CONFIG_PATH_ENV`], or the builtin one.
pub fn build_headless_app() -> App {
    let (config, metadata) = load_insanity_config_from_env();
    let mut app = build_app_with_config(config);
    app.insert_resource(metadata);
    app
}

/// Construct a headless [`App`] around an explicit config.
///
/// Per-frame order: meter, cure, blender, transition, shader driver, sink.
/// The blender runs before the transition so a transition requested during
/// the frame takes over the output on that same frame.
pub fn build_app_with_config(config: Arc<InsanityConfig>) -> App {
    let mut app = App::new();
    app.add_plugins(InsanityPlugin::new(config));
    app
}
