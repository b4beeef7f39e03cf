use bevy::prelude::*;

use crate::blend::SmoothingMode;
use crate::clock::FrameClock;
use crate::config::ShaderTuning;
use crate::events::GameEvent;
use crate::profile::clamp_unit;

/// Smoothed insanity value for material shaders, independent of the
/// post-processing blend.
#[derive(Resource, Debug, Clone)]
pub struct ShaderInsanityDriver {
    value: f32,
    target: f32,
    speed: f32,
    smoothing: SmoothingMode,
}

impl ShaderInsanityDriver {
    pub fn new(tuning: &ShaderTuning, smoothing: SmoothingMode, initial_target: f32) -> Self {
        Self {
            value: 0.0,
            target: clamp_unit(initial_target),
            speed: tuning.transition_speed,
            smoothing,
        }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn set_target(&mut self, level: f32) {
        self.target = clamp_unit(level);
    }

    pub fn advance(&mut self, delta: f32) -> f32 {
        self.value = clamp_unit(
            self.smoothing
                .step(self.value, self.target, self.speed, delta),
        );
        self.value
    }
}

pub fn handle_game_event(world: &mut World, event: &GameEvent) {
    if let GameEvent::InsanityChanged { level } = event {
        if let Some(mut driver) = world.get_resource_mut::<ShaderInsanityDriver>() {
            driver.set_target(*level);
        }
    }
}

pub fn advance_shader_insanity(
    clock: Res<FrameClock>,
    driver: Option<ResMut<ShaderInsanityDriver>>,
) {
    if let Some(mut driver) = driver {
        driver.advance(clock.delta());
    }
}
