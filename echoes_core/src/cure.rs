use bevy::prelude::*;

use crate::clock::frame_delta;
use crate::config::CureTuning;
use crate::events::{publish_all, GameEvent};
use crate::insanity::InsanityMeter;
use crate::profile::lerp;

const PHASE_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CureStage {
    Ramping,
    Holding,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CurePhase {
    Ramp { start_level: f32, elapsed: f32 },
    Hold { elapsed: f32 },
}

/// Timed remedy: ramp the level down to zero, hold accumulation off, resume.
///
/// Only one cure runs at a time. Starting another replaces the one in flight
/// and ramps down from wherever the level currently is.
#[derive(Resource, Debug, Clone)]
pub struct CureSequencer {
    ramp_secs: f32,
    pause_secs: f32,
    slot: Option<CurePhase>,
}

impl CureSequencer {
    pub fn new(tuning: &CureTuning) -> Self {
        Self {
            ramp_secs: tuning.ramp_secs.max(0.0),
            pause_secs: tuning.pause_secs.max(0.0),
            slot: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    pub fn stage(&self) -> Option<CureStage> {
        self.slot.map(|phase| match phase {
            CurePhase::Ramp { .. } => CureStage::Ramping,
            CurePhase::Hold { .. } => CureStage::Holding,
        })
    }

    pub fn begin(&mut self, meter: &mut InsanityMeter) {
        if self.slot.is_some() {
            tracing::info!(
                target: "echoes::cure",
                level = meter.level(),
                "cure.restarted"
            );
        } else {
            tracing::info!(target: "echoes::cure", level = meter.level(), "cure.started");
        }
        meter.set_paused(true);
        self.slot = Some(CurePhase::Ramp {
            start_level: meter.level(),
            elapsed: 0.0,
        });
    }

    /// Drop the cure in flight without touching the meter.
    pub fn cancel(&mut self) -> bool {
        self.slot.take().is_some()
    }

    pub fn advance(&mut self, delta: f32, meter: &mut InsanityMeter) -> Vec<GameEvent> {
        let mut events = Vec::new();
        if meter.is_dead() {
            if self.cancel() {
                tracing::info!(target: "echoes::cure", "cure.aborted=dead");
            }
            return events;
        }
        let Some(phase) = self.slot else {
            return events;
        };
        match phase {
            CurePhase::Ramp {
                start_level,
                elapsed,
            } => {
                let elapsed = elapsed + delta;
                if elapsed + PHASE_EPSILON >= self.ramp_secs {
                    events.extend(meter.set_level(0.0));
                    self.slot = Some(CurePhase::Hold { elapsed: 0.0 });
                    tracing::debug!(target: "echoes::cure", "cure.ramp_complete");
                } else {
                    let t = elapsed / self.ramp_secs;
                    events.extend(meter.set_level(lerp(start_level, 0.0, t)));
                    self.slot = Some(CurePhase::Ramp {
                        start_level,
                        elapsed,
                    });
                }
            }
            CurePhase::Hold { elapsed } => {
                let elapsed = elapsed + delta;
                if elapsed + PHASE_EPSILON >= self.pause_secs {
                    meter.set_paused(false);
                    self.slot = None;
                    tracing::info!(target: "echoes::cure", "cure.finished");
                } else {
                    self.slot = Some(CurePhase::Hold { elapsed });
                }
            }
        }
        events
    }
}

/// Start (or restart) a cure against the meter in `world`.
pub fn begin_cure(world: &mut World) {
    if !world.contains_resource::<CureSequencer>() {
        tracing::warn!(target: "echoes::cure", "cure.skipped=no_sequencer");
        return;
    }
    world.resource_scope(|world, mut cure: Mut<CureSequencer>| {
        if let Some(mut meter) = world.get_resource_mut::<InsanityMeter>() {
            cure.begin(&mut meter);
        }
    });
}

pub fn advance_cure(world: &mut World) {
    let delta = frame_delta(world);
    if !world.contains_resource::<CureSequencer>() || !world.contains_resource::<InsanityMeter>()
    {
        return;
    }
    let events = world.resource_scope(|world, mut cure: Mut<CureSequencer>| {
        let mut meter = world.resource_mut::<InsanityMeter>();
        cure.advance(delta, &mut meter)
    });
    publish_all(world, events);
}
