use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clock::FrameClock;
use crate::config::VisualTuning;
use crate::events::GameEvent;
use crate::output::{ParamWriter, RenderedPostProcess};
use crate::profile::{
    clamp_unit, lerp, PostProcessParams, ProfileId, ProfileLibrary, VisualProfile,
};
use crate::transition::TransitionSequencer;

/// How a smoothed value chases its target each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMode {
    /// `alpha = 1 - exp(-speed * dt)`; converges the same way at any frame rate.
    #[default]
    Exponential,
    /// `alpha = clamp(speed * dt, 0, 1)`; frame-rate dependent.
    FrameLerp,
}

impl SmoothingMode {
    pub fn alpha(self, speed: f32, delta: f32) -> f32 {
        let step = (speed * delta).max(0.0);
        match self {
            SmoothingMode::Exponential => clamp_unit(1.0 - (-step).exp()),
            SmoothingMode::FrameLerp => clamp_unit(step),
        }
    }

    pub fn step(self, current: f32, target: f32, speed: f32, delta: f32) -> f32 {
        lerp(current, target, self.alpha(speed, delta))
    }
}

/// Steady-state mapping from insanity level to post-processing output.
///
/// Holds a base profile and an insanity profile; the rendered value is the
/// interpolation between them at the smoothed blend factor. Transitions swap
/// the base profile through [`ProfileBlender::rearm`].
#[derive(Resource, Debug, Clone)]
pub struct ProfileBlender {
    base: Arc<VisualProfile>,
    insanity: Arc<VisualProfile>,
    blend_factor: f32,
    target: f32,
    smoothing_speed: f32,
    smoothing: SmoothingMode,
    tonemapping_threshold: f32,
}

impl ProfileBlender {
    pub fn new(library: &ProfileLibrary, tuning: &VisualTuning, initial_target: f32) -> Self {
        Self {
            base: library.get(ProfileId::Sane),
            insanity: library.get(ProfileId::Insane),
            blend_factor: 0.0,
            target: clamp_unit(initial_target),
            smoothing_speed: tuning.smoothing_speed,
            smoothing: tuning.smoothing,
            tonemapping_threshold: tuning.tonemapping_threshold,
        }
    }

    pub fn blend_factor(&self) -> f32 {
        self.blend_factor
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn base(&self) -> &VisualProfile {
        &self.base
    }

    pub fn insanity_profile(&self) -> &VisualProfile {
        &self.insanity
    }

    pub fn set_target(&mut self, level: f32) {
        self.target = clamp_unit(level);
    }

    /// Parameters for an arbitrary blend factor.
    ///
    /// Scalar fields interpolate; the tonemapping operator is the insanity
    /// profile's once the factor passes the threshold, the base's otherwise.
    pub fn evaluate(&self, factor: f32) -> PostProcessParams {
        let factor = clamp_unit(factor);
        let mut params =
            PostProcessParams::lerp(self.base.params(), self.insanity.params(), factor, 1.0);
        params.tonemapping = if factor > self.tonemapping_threshold {
            self.insanity.params().tonemapping
        } else {
            self.base.params().tonemapping
        };
        params
    }

    pub fn current_params(&self) -> PostProcessParams {
        self.evaluate(self.blend_factor)
    }

    /// Move the blend factor toward the target and return the frame's output.
    pub fn advance(&mut self, delta: f32) -> PostProcessParams {
        self.blend_factor = clamp_unit(self.smoothing.step(
            self.blend_factor,
            self.target,
            self.smoothing_speed,
            delta,
        ));
        self.current_params()
    }

    /// Install a new profile pair and restart from the base profile.
    pub fn rearm(&mut self, base: Arc<VisualProfile>, insanity: Arc<VisualProfile>) {
        tracing::debug!(
            target: "echoes::visuals",
            base = %base.name,
            insanity = %insanity.name,
            "blender.rearmed"
        );
        self.base = base;
        self.insanity = insanity;
        self.blend_factor = 0.0;
        self.target = 0.0;
    }
}

pub fn handle_game_event(world: &mut World, event: &GameEvent) {
    if let GameEvent::InsanityChanged { level } = event {
        if let Some(mut blender) = world.get_resource_mut::<ProfileBlender>() {
            blender.set_target(*level);
        }
    }
}

/// Write the blended parameters unless a transition owns the output.
pub fn blend_profiles(
    clock: Res<FrameClock>,
    sequencer: Option<Res<TransitionSequencer>>,
    blender: Option<ResMut<ProfileBlender>>,
    mut rendered: ResMut<RenderedPostProcess>,
) {
    let Some(mut blender) = blender else {
        return;
    };
    if sequencer.is_some_and(|sequencer| sequencer.holds_output()) {
        return;
    }
    let params = blender.advance(clock.delta());
    rendered.write(params, ParamWriter::Blender);
}
