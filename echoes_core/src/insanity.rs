//! Insanity meter: accumulation, flashback reset, and the death countdown.
//!
//! The meter is the only owner of the insanity level. Everything it has to say
//! goes out over the [`EventBus`](crate::events::EventBus): level changes,
//! the start and cancellation of the death countdown, and the final death.

use bevy::prelude::*;

use crate::clock::frame_delta;
use crate::config::{InsanityConfig, InsanityTuning};
use crate::cure;
use crate::events::{publish, publish_all, GameEvent};
use crate::profile::clamp_unit;

/// Smallest level change worth announcing.
pub const LEVEL_EPSILON: f32 = 1e-6;
/// Distance from 1.0 that still counts as the maximum level.
pub const MAX_LEVEL_EPSILON: f32 = 1e-6;
/// Slack applied when comparing the death timer against its threshold.
pub const TIMER_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccumulationMode {
    #[default]
    Normal,
    Flashback,
}

impl AccumulationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccumulationMode::Normal => "normal",
            AccumulationMode::Flashback => "flashback",
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub struct InsanityMeter {
    level: f32,
    last_notified: f32,
    mode: AccumulationMode,
    paused: bool,
    normal_rate: f32,
    flashback_rate: f32,
    death_threshold_secs: f32,
    death_timer: f32,
    death_sequence_active: bool,
    dead: bool,
}

impl InsanityMeter {
    pub fn new(tuning: &InsanityTuning) -> Self {
        debug_assert!(
            tuning.normal_rate >= 0.0 && tuning.flashback_rate >= 0.0,
            "accumulation rates must be non-negative"
        );
        let level = clamp_unit(tuning.initial_level);
        Self {
            level,
            last_notified: level,
            mode: AccumulationMode::Normal,
            paused: false,
            normal_rate: tuning.normal_rate.max(0.0),
            flashback_rate: tuning.flashback_rate.max(0.0),
            death_threshold_secs: tuning.death_threshold_secs.max(0.0),
            death_timer: 0.0,
            death_sequence_active: false,
            dead: false,
        }
    }

    pub fn from_config(config: &InsanityConfig) -> Self {
        Self::new(&config.insanity)
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn mode(&self) -> AccumulationMode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn is_death_sequence_active(&self) -> bool {
        self.death_sequence_active
    }

    pub fn death_timer(&self) -> f32 {
        self.death_timer
    }

    pub fn death_threshold_secs(&self) -> f32 {
        self.death_threshold_secs
    }

    /// Level gained per second right now; zero while paused or dead.
    pub fn accumulation_rate(&self) -> f32 {
        if self.paused || self.dead {
            return 0.0;
        }
        match self.mode {
            AccumulationMode::Normal => self.normal_rate,
            AccumulationMode::Flashback => self.flashback_rate,
        }
    }

    pub fn is_at_max(&self) -> bool {
        1.0 - self.level <= MAX_LEVEL_EPSILON
    }

    /// Clamp and store a new level.
    ///
    /// Returns the change notification, followed by the countdown
    /// cancellation when the write drops the level off the maximum.
    pub fn set_level(&mut self, value: f32) -> Vec<GameEvent> {
        if self.dead {
            return Vec::new();
        }
        self.level = clamp_unit(value);
        let mut events: Vec<GameEvent> = self.notify_if_changed().into_iter().collect();
        events.extend(self.cancel_death_sequence_below_max());
        events
    }

    pub fn enter_flashback(&mut self) -> Vec<GameEvent> {
        if self.dead {
            return Vec::new();
        }
        if self.mode != AccumulationMode::Flashback {
            tracing::info!(
                target: "echoes::insanity",
                level = self.level,
                "insanity.mode=flashback"
            );
        }
        self.mode = AccumulationMode::Flashback;
        self.set_level(0.0)
    }

    pub fn exit_flashback(&mut self) -> Vec<GameEvent> {
        if self.dead {
            return Vec::new();
        }
        if self.mode != AccumulationMode::Normal {
            tracing::info!(
                target: "echoes::insanity",
                level = self.level,
                "insanity.mode=normal"
            );
        }
        self.mode = AccumulationMode::Normal;
        self.set_level(0.0)
    }

    /// Pause layers over the mode: it stops accumulation without forgetting
    /// whether the meter is in a flashback.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            tracing::debug!(target: "echoes::insanity", paused, "insanity.paused");
        }
        self.paused = paused;
    }

    /// Run one frame of accumulation and the death countdown.
    ///
    /// Events come back in the order they must be published: the level change
    /// first, then any countdown transition.
    pub fn advance(&mut self, delta: f32) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if self.dead {
            return events;
        }

        let rate = self.accumulation_rate();
        let mut time_at_max = delta;
        if rate > 0.0 && !self.is_at_max() {
            let gap = 1.0 - self.level;
            self.level = clamp_unit(self.level + rate * delta);
            // Only the part of the frame spent at the maximum counts toward death.
            time_at_max = (delta - gap / rate).clamp(0.0, delta);
        }
        events.extend(self.notify_if_changed());

        if self.is_at_max() {
            if !self.death_sequence_active {
                self.death_sequence_active = true;
                self.death_timer = 0.0;
                tracing::info!(
                    target: "echoes::insanity",
                    threshold_secs = self.death_threshold_secs,
                    "insanity.death_sequence=started"
                );
                events.push(GameEvent::DeathSequenceStarted {
                    duration_secs: self.death_threshold_secs,
                });
            }
            self.death_timer += time_at_max;
            if self.death_timer + TIMER_EPSILON >= self.death_threshold_secs {
                self.dead = true;
                self.death_sequence_active = false;
                tracing::info!(
                    target: "echoes::insanity",
                    timer_secs = self.death_timer,
                    "insanity.player_died"
                );
                events.push(GameEvent::PlayerDied);
            }
        } else {
            events.extend(self.cancel_death_sequence_below_max());
        }

        events
    }

    fn cancel_death_sequence_below_max(&mut self) -> Option<GameEvent> {
        if self.is_at_max() {
            return None;
        }
        self.death_timer = 0.0;
        if !self.death_sequence_active {
            return None;
        }
        self.death_sequence_active = false;
        tracing::info!(
            target: "echoes::insanity",
            level = self.level,
            "insanity.death_sequence=cancelled"
        );
        Some(GameEvent::DeathSequenceCancelled)
    }

    fn notify_if_changed(&mut self) -> Option<GameEvent> {
        if (self.level - self.last_notified).abs() <= LEVEL_EPSILON {
            return None;
        }
        self.last_notified = self.level;
        tracing::trace!(target: "echoes::insanity", level = self.level, "insanity.changed");
        Some(GameEvent::InsanityChanged { level: self.level })
    }
}

/// Meter reactions to bus traffic.
///
/// A remedy taken during a flashback ends the flashback first, so every
/// flashback-end consumer has run before the cure begins.
pub fn handle_game_event(world: &mut World, event: &GameEvent) {
    match event {
        GameEvent::FlashbackStarted => {
            let events = world
                .get_resource_mut::<InsanityMeter>()
                .map(|mut meter| meter.enter_flashback())
                .unwrap_or_default();
            publish_all(world, events);
        }
        GameEvent::FlashbackEnded => {
            let events = world
                .get_resource_mut::<InsanityMeter>()
                .map(|mut meter| meter.exit_flashback())
                .unwrap_or_default();
            publish_all(world, events);
        }
        GameEvent::RemedyUsed => {
            let Some(meter) = world.get_resource::<InsanityMeter>() else {
                return;
            };
            if meter.is_dead() {
                tracing::debug!(target: "echoes::insanity", "remedy.ignored=dead");
                return;
            }
            if meter.mode() == AccumulationMode::Flashback {
                publish(world, GameEvent::FlashbackEnded);
            }
            cure::begin_cure(world);
        }
        _ => {}
    }
}

pub fn advance_insanity(world: &mut World) {
    let delta = frame_delta(world);
    let events = match world.get_resource_mut::<InsanityMeter>() {
        Some(mut meter) => meter.advance(delta),
        None => return,
    };
    publish_all(world, events);
}

/// Externally force the level, e.g. from a debug console or a scripted beat.
pub fn set_insanity_level(world: &mut World, level: f32) {
    let events = world
        .get_resource_mut::<InsanityMeter>()
        .map(|mut meter| meter.set_level(level))
        .unwrap_or_default();
    publish_all(world, events);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuning(initial_level: f32) -> InsanityTuning {
        InsanityTuning {
            initial_level,
            normal_rate: 0.005,
            flashback_rate: 0.05,
            death_threshold_secs: 10.0,
        }
    }

    fn run(meter: &mut InsanityMeter, delta: f32, frames: usize) -> Vec<GameEvent> {
        (0..frames).flat_map(|_| meter.advance(delta)).collect()
    }

    #[test]
    fn normal_rate_accumulates_linearly() {
        let mut meter = InsanityMeter::new(&tuning(0.0));
        run(&mut meter, 0.5, 200);
        assert!((meter.level() - 0.5).abs() < 1e-4, "{}", meter.level());
        assert!(!meter.is_death_sequence_active());
    }

    #[test]
    fn flashback_rate_applies_after_entry() {
        let mut meter = InsanityMeter::new(&tuning(0.4));
        let events = meter.enter_flashback();
        assert_eq!(events, vec![GameEvent::InsanityChanged { level: 0.0 }]);
        run(&mut meter, 0.5, 20);
        assert!((meter.level() - 0.5).abs() < 1e-4);
        assert_eq!(meter.mode(), AccumulationMode::Flashback);
    }

    #[test]
    fn set_level_clamps_and_suppresses_duplicates() {
        let mut meter = InsanityMeter::new(&tuning(0.0));
        assert_eq!(
            meter.set_level(1.7),
            vec![GameEvent::InsanityChanged { level: 1.0 }]
        );
        assert!(meter.set_level(3.0).is_empty());
        assert_eq!(
            meter.set_level(-2.0),
            vec![GameEvent::InsanityChanged { level: 0.0 }]
        );
        assert!(meter.set_level(5e-7).is_empty());
    }

    #[test]
    fn death_fires_once_at_threshold() {
        let mut meter = InsanityMeter::new(&tuning(1.0));
        let mut started = 0;
        let mut died_at = None;
        for frame in 1..=60 {
            for event in meter.advance(0.25) {
                match event {
                    GameEvent::DeathSequenceStarted { duration_secs } => {
                        assert_eq!(duration_secs, 10.0);
                        started += 1;
                    }
                    GameEvent::PlayerDied => {
                        assert!(died_at.is_none(), "died twice");
                        died_at = Some(frame);
                    }
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }
        assert_eq!(started, 1);
        assert_eq!(died_at, Some(40));
        assert!(meter.is_dead());
    }

    #[test]
    fn leaving_max_cancels_once_and_resets_timer() {
        let mut meter = InsanityMeter::new(&tuning(1.0));
        run(&mut meter, 0.5, 6);
        assert!(meter.is_death_sequence_active());
        assert_eq!(meter.death_timer(), 3.0);

        let events = meter.set_level(0.8);
        assert_eq!(
            events,
            vec![
                GameEvent::InsanityChanged { level: 0.8 },
                GameEvent::DeathSequenceCancelled
            ]
        );
        assert!(!meter.is_death_sequence_active());
        assert_eq!(meter.death_timer(), 0.0);
        assert!(run(&mut meter, 0.5, 4)
            .iter()
            .all(|e| *e != GameEvent::DeathSequenceCancelled));
    }

    #[test]
    fn flashback_reset_during_countdown_cancels_in_same_call() {
        let mut meter = InsanityMeter::new(&tuning(1.0));
        run(&mut meter, 0.5, 4);
        assert!(meter.is_death_sequence_active());

        let events = meter.enter_flashback();
        assert_eq!(
            events,
            vec![
                GameEvent::InsanityChanged { level: 0.0 },
                GameEvent::DeathSequenceCancelled
            ]
        );
        assert_eq!(meter.death_timer(), 0.0);
        assert!(run(&mut meter, 0.5, 1)
            .iter()
            .all(|e| *e != GameEvent::DeathSequenceCancelled));
    }

    #[test]
    fn crossing_frame_only_counts_time_at_max() {
        let mut meter = InsanityMeter::new(&InsanityTuning {
            initial_level: 0.9,
            normal_rate: 0.5,
            flashback_rate: 0.5,
            death_threshold_secs: 1.0,
        });
        let events = meter.advance(0.25);
        assert!(events.contains(&GameEvent::DeathSequenceStarted { duration_secs: 1.0 }));
        assert!((meter.death_timer() - 0.05).abs() < 1e-4, "{}", meter.death_timer());

        run(&mut meter, 0.25, 3);
        assert!(!meter.is_dead());
        assert_eq!(meter.advance(0.25), vec![GameEvent::PlayerDied]);
    }

    #[test]
    fn dead_meter_stays_silent() {
        let mut meter = InsanityMeter::new(&InsanityTuning {
            death_threshold_secs: 0.0,
            ..tuning(1.0)
        });
        let events = meter.advance(0.1);
        assert_eq!(
            events,
            vec![
                GameEvent::DeathSequenceStarted { duration_secs: 0.0 },
                GameEvent::PlayerDied
            ]
        );
        assert!(meter.set_level(0.2).is_empty());
        assert!(meter.enter_flashback().is_empty());
        assert!(run(&mut meter, 0.1, 10).is_empty());
        assert_eq!(meter.level(), 1.0);
    }

    #[test]
    fn pause_stops_accumulation_but_keeps_mode() {
        let mut meter = InsanityMeter::new(&tuning(0.2));
        meter.enter_flashback();
        meter.set_paused(true);
        assert!(run(&mut meter, 1.0, 5).is_empty());
        assert_eq!(meter.level(), 0.0);
        assert_eq!(meter.mode(), AccumulationMode::Flashback);
        meter.set_paused(false);
        run(&mut meter, 1.0, 1);
        assert!((meter.level() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn world_handler_resets_on_flashback_events() {
        let mut world = World::default();
        world.insert_resource(InsanityMeter::new(&tuning(0.6)));
        handle_game_event(&mut world, &GameEvent::FlashbackStarted);
        let meter = world.resource::<InsanityMeter>();
        assert_eq!(meter.level(), 0.0);
        assert_eq!(meter.mode(), AccumulationMode::Flashback);

        set_insanity_level(&mut world, 0.3);
        handle_game_event(&mut world, &GameEvent::FlashbackEnded);
        let meter = world.resource::<InsanityMeter>();
        assert_eq!(meter.level(), 0.0);
        assert_eq!(meter.mode(), AccumulationMode::Normal);
    }
}
