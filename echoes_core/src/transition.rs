//! Timed post-processing transitions.
//!
//! A single slot holds the transition in flight. Requesting a new one drops
//! the old one and starts from whatever is on screen at that moment, so a
//! preempted effect never snaps. While the slot is occupied the sequencer is
//! the only writer of [`RenderedPostProcess`]; on completion it rearms the
//! [`ProfileBlender`] with the pair that matches the new state.

use std::sync::Arc;

use bevy::prelude::*;

use crate::blend::ProfileBlender;
use crate::clock::frame_delta;
use crate::config::{DeathEffectTuning, FlashbackEffectTuning, InsanityConfig};
use crate::curve::KeyCurve;
use crate::events::GameEvent;
use crate::insanity::InsanityMeter;
use crate::output::{ParamWriter, RenderedPostProcess};
use crate::profile::{
    clamp_unit, lerp, PostProcessParams, ProfileId, ProfileLibrary, VisualProfile,
};
use crate::teleport;

/// Tonemapping flips to the target operator past this fraction of a fade.
pub const FADE_TONEMAPPING_SWITCH: f32 = 0.5;
const COMPLETION_EPSILON: f32 = 1e-4;

/// Where the player should be moved when a flare crosses its midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeleportCue {
    IntoFlashback,
    ReturnFromFlashback,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionRequest {
    FlashbackEntry,
    FlashbackExit,
    Recovery,
    DeathDecay { duration_secs: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    FlashbackEntry,
    FlashbackExit,
    Recovery,
    DeathDecay,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::FlashbackEntry => "flashback_entry",
            TransitionKind::FlashbackExit => "flashback_exit",
            TransitionKind::Recovery => "recovery",
            TransitionKind::DeathDecay => "death_decay",
        }
    }
}

impl TransitionRequest {
    pub fn kind(&self) -> TransitionKind {
        match self {
            TransitionRequest::FlashbackEntry => TransitionKind::FlashbackEntry,
            TransitionRequest::FlashbackExit => TransitionKind::FlashbackExit,
            TransitionRequest::Recovery => TransitionKind::Recovery,
            TransitionRequest::DeathDecay { .. } => TransitionKind::DeathDecay,
        }
    }
}

/// Two-phase flare shape: a lens pull toward the midpoint and a push away
/// from it, with exposure peaking at the boundary.
#[derive(Debug, Clone)]
struct Flare {
    first_half_lens: KeyCurve,
    second_half_lens: KeyCurve,
    exposure_peak: f32,
    lens_scale_peak: Option<f32>,
    settle_vignette_early: bool,
    cue: TeleportCue,
    cue_fired: bool,
}

impl Flare {
    fn sample(
        &self,
        from: &PostProcessParams,
        to: &PostProcessParams,
        t: f32,
    ) -> PostProcessParams {
        let mut params = PostProcessParams::lerp(from, to, t, FADE_TONEMAPPING_SWITCH);
        let (lens_offset, exposure, scale) = if t < 0.5 {
            let phase = t / 0.5;
            (
                self.first_half_lens.evaluate(phase),
                lerp(from.post_exposure, self.exposure_peak, phase),
                self.lens_scale_peak
                    .map(|peak| lerp(from.lens_distortion_scale, peak, phase)),
            )
        } else {
            let phase = (t - 0.5) / 0.5;
            (
                self.second_half_lens.evaluate(phase),
                lerp(self.exposure_peak, to.post_exposure, phase),
                self.lens_scale_peak
                    .map(|peak| lerp(peak, to.lens_distortion_scale, phase)),
            )
        };
        params.lens_distortion_intensity =
            (params.lens_distortion_intensity + lens_offset).clamp(-1.0, 1.0);
        params.post_exposure = exposure;
        if let Some(scale) = scale {
            params.lens_distortion_scale = scale;
        }
        if self.settle_vignette_early {
            params.vignette_intensity = lerp(
                from.vignette_intensity,
                to.vignette_intensity,
                clamp_unit(t / 0.5),
            );
        }
        params
    }
}

#[derive(Debug, Clone)]
enum Effect {
    Fade { target: Arc<VisualProfile> },
    Flare { target: Arc<VisualProfile>, flare: Flare },
    Decay { target: PostProcessParams },
}

#[derive(Debug, Clone)]
struct ActiveTransition {
    kind: TransitionKind,
    from: PostProcessParams,
    elapsed: f32,
    duration: f32,
    effect: Effect,
    rearm: Option<(ProfileId, ProfileId)>,
}

/// What one frame of a transition produced.
#[derive(Debug, Clone)]
pub struct TransitionStep {
    pub kind: TransitionKind,
    pub params: PostProcessParams,
    pub teleport: Option<TeleportCue>,
    pub completed: bool,
    /// Profile pair the blender should adopt, set on the completing frame.
    pub rearm: Option<(Arc<VisualProfile>, Arc<VisualProfile>)>,
}

#[derive(Resource, Debug, Clone)]
pub struct TransitionSequencer {
    library: ProfileLibrary,
    state_transition_secs: f32,
    remedy_transition_secs: f32,
    flashback: FlashbackEffectTuning,
    death: DeathEffectTuning,
    slot: Option<ActiveTransition>,
    frozen: bool,
}

impl TransitionSequencer {
    pub fn new(library: ProfileLibrary, config: &InsanityConfig) -> Self {
        Self {
            library,
            state_transition_secs: config.visuals.state_transition_secs,
            remedy_transition_secs: config.visuals.remedy_transition_secs,
            flashback: config.flashback_effect.clone(),
            death: config.death_effect.clone(),
            slot: None,
            frozen: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.is_some()
    }

    /// True after a death decay completed; the output stays as it ended.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Whether the blender must stay off the rendered output this frame.
    pub fn holds_output(&self) -> bool {
        self.slot.is_some() || self.frozen
    }

    pub fn active_kind(&self) -> Option<TransitionKind> {
        self.slot.as_ref().map(|active| active.kind)
    }

    /// Normalized progress of the transition in flight.
    pub fn progress(&self) -> Option<f32> {
        self.slot.as_ref().map(|active| {
            if active.duration <= 0.0 {
                1.0
            } else {
                clamp_unit(active.elapsed / active.duration)
            }
        })
    }

    /// Start `request` from `current`, replacing anything in flight.
    pub fn request(&mut self, request: TransitionRequest, current: PostProcessParams) {
        if let Some(previous) = self.slot.as_ref() {
            tracing::info!(
                target: "echoes::transition",
                previous = previous.kind.as_str(),
                next = request.kind().as_str(),
                "transition.preempted"
            );
        }
        self.frozen = false;

        let active = match request {
            TransitionRequest::Recovery => ActiveTransition {
                kind: TransitionKind::Recovery,
                from: current,
                elapsed: 0.0,
                duration: self.remedy_transition_secs,
                effect: Effect::Fade {
                    target: self.library.get(ProfileId::Sane),
                },
                rearm: Some((ProfileId::Sane, ProfileId::Insane)),
            },
            TransitionRequest::FlashbackEntry => ActiveTransition {
                kind: TransitionKind::FlashbackEntry,
                from: current,
                elapsed: 0.0,
                duration: self.state_transition_secs,
                effect: Effect::Flare {
                    target: self.library.get(ProfileId::Flashback),
                    flare: Flare {
                        first_half_lens: self.flashback.entry_pull_curve.clone(),
                        second_half_lens: self.flashback.entry_push_curve.clone(),
                        exposure_peak: self.flashback.exposure_peak,
                        lens_scale_peak: None,
                        settle_vignette_early: false,
                        cue: TeleportCue::IntoFlashback,
                        cue_fired: false,
                    },
                },
                rearm: Some((ProfileId::Flashback, ProfileId::Insane)),
            },
            TransitionRequest::FlashbackExit => ActiveTransition {
                kind: TransitionKind::FlashbackExit,
                from: current,
                elapsed: 0.0,
                duration: self.state_transition_secs,
                effect: Effect::Flare {
                    target: self.library.get(ProfileId::Sane),
                    flare: Flare {
                        first_half_lens: self.flashback.exit_push_curve.clone(),
                        second_half_lens: self.flashback.exit_settle_curve.clone(),
                        exposure_peak: self.flashback.exposure_peak,
                        lens_scale_peak: Some(self.flashback.exit_lens_scale_peak),
                        settle_vignette_early: true,
                        cue: TeleportCue::ReturnFromFlashback,
                        cue_fired: false,
                    },
                },
                rearm: Some((ProfileId::Sane, ProfileId::Insane)),
            },
            TransitionRequest::DeathDecay { duration_secs } => {
                let target = PostProcessParams {
                    saturation: self.death.saturation,
                    post_exposure: current.post_exposure - self.death.exposure_drop,
                    vignette_intensity: self.death.vignette_intensity,
                    ..current
                }
                .sanitized();
                ActiveTransition {
                    kind: TransitionKind::DeathDecay,
                    from: current,
                    elapsed: 0.0,
                    duration: duration_secs.max(0.0),
                    effect: Effect::Decay { target },
                    rearm: None,
                }
            }
        };

        tracing::info!(
            target: "echoes::transition",
            kind = active.kind.as_str(),
            duration_secs = active.duration,
            "transition.started"
        );
        self.slot = Some(active);
    }

    pub fn advance(&mut self, delta: f32) -> Option<TransitionStep> {
        let active = self.slot.as_mut()?;
        active.elapsed += delta;
        let done =
            active.duration <= 0.0 || active.elapsed + COMPLETION_EPSILON >= active.duration;
        let t = if done {
            1.0
        } else {
            clamp_unit(active.elapsed / active.duration)
        };

        let mut teleport = None;
        let params = match &mut active.effect {
            Effect::Fade { target } => {
                if done {
                    *target.params()
                } else {
                    PostProcessParams::lerp(
                        &active.from,
                        target.params(),
                        t,
                        FADE_TONEMAPPING_SWITCH,
                    )
                }
            }
            Effect::Flare { target, flare } => {
                if !flare.cue_fired && t >= 0.5 {
                    flare.cue_fired = true;
                    teleport = Some(flare.cue);
                }
                if done {
                    *target.params()
                } else {
                    flare.sample(&active.from, target.params(), t)
                }
            }
            Effect::Decay { target } => {
                if done {
                    *target
                } else {
                    PostProcessParams::lerp(&active.from, target, t, 1.0)
                }
            }
        };

        let kind = active.kind;
        let mut rearm = None;
        if done {
            if let Some(finished) = self.slot.take() {
                rearm = finished
                    .rearm
                    .map(|(base, insanity)| (self.library.get(base), self.library.get(insanity)));
            }
            if kind == TransitionKind::DeathDecay {
                self.frozen = true;
            }
            tracing::info!(
                target: "echoes::transition",
                kind = kind.as_str(),
                "transition.completed"
            );
        }

        Some(TransitionStep {
            kind,
            params,
            teleport,
            completed: done,
            rearm,
        })
    }
}

/// Bus reactions: every state change starts the matching transition.
pub fn handle_game_event(world: &mut World, event: &GameEvent) {
    let request = match event {
        GameEvent::FlashbackStarted => TransitionRequest::FlashbackEntry,
        GameEvent::FlashbackEnded => TransitionRequest::FlashbackExit,
        GameEvent::DeathSequenceCancelled => TransitionRequest::Recovery,
        GameEvent::DeathSequenceStarted { duration_secs } => TransitionRequest::DeathDecay {
            duration_secs: *duration_secs,
        },
        _ => return,
    };
    if !world.contains_resource::<TransitionSequencer>() {
        return;
    }
    if world
        .get_resource::<InsanityMeter>()
        .is_some_and(InsanityMeter::is_dead)
    {
        tracing::debug!(
            target: "echoes::transition",
            kind = ?request,
            "transition.ignored=dead"
        );
        return;
    }
    if matches!(request, TransitionRequest::FlashbackEntry) {
        teleport::remember_return_point(world);
    }
    let current = world
        .get_resource::<RenderedPostProcess>()
        .map(|rendered| *rendered.params())
        .unwrap_or_default();
    if let Some(mut sequencer) = world.get_resource_mut::<TransitionSequencer>() {
        sequencer.request(request, current);
    }
}

pub fn advance_transition(world: &mut World) {
    let delta = frame_delta(world);
    let Some(step) = world
        .get_resource_mut::<TransitionSequencer>()
        .and_then(|mut sequencer| sequencer.advance(delta))
    else {
        return;
    };

    if let Some(mut rendered) = world.get_resource_mut::<RenderedPostProcess>() {
        rendered.write(step.params, ParamWriter::Sequencer);
    }
    if let Some(cue) = step.teleport {
        teleport::apply_teleport(world, cue);
    }
    if let Some((base, insanity)) = step.rearm {
        if let Some(mut blender) = world.get_resource_mut::<ProfileBlender>() {
            blender.rearm(base, insanity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::TonemappingMode;

    fn sequencer() -> (TransitionSequencer, ProfileLibrary) {
        let config = InsanityConfig::builtin();
        let library = ProfileLibrary::from_set(&config.profiles).expect("profiles");
        (TransitionSequencer::new(library.clone(), &config), library)
    }

    fn run(
        sequencer: &mut TransitionSequencer,
        delta: f32,
        frames: usize,
    ) -> Vec<TransitionStep> {
        (0..frames).filter_map(|_| sequencer.advance(delta)).collect()
    }

    #[test]
    fn recovery_fade_reaches_sane_exactly_and_rearms() {
        let (mut sequencer, library) = sequencer();
        let start = *library.get(ProfileId::Insane).params();
        sequencer.request(TransitionRequest::Recovery, start);

        let steps = run(&mut sequencer, 0.25, 6);
        assert_eq!(steps.len(), 6);
        let mid = &steps[2];
        assert!(!mid.completed);
        assert_eq!(mid.params.tonemapping, TonemappingMode::Aces);
        assert_eq!(steps[3].params.tonemapping, TonemappingMode::Neutral);

        let last = steps.last().expect("final step");
        assert!(last.completed);
        assert_eq!(last.params, *library.get(ProfileId::Sane).params());
        let (base, insanity) = last.rearm.clone().expect("rearm pair");
        assert_eq!(base.name, library.get(ProfileId::Sane).name);
        assert_eq!(insanity.name, library.get(ProfileId::Insane).name);
        assert!(!sequencer.holds_output());
    }

    #[test]
    fn entry_flare_cues_teleport_once_at_midpoint() {
        let (mut sequencer, library) = sequencer();
        sequencer.request(
            TransitionRequest::FlashbackEntry,
            *library.get(ProfileId::Sane).params(),
        );
        let steps = run(&mut sequencer, 0.25, 12);
        let cues: Vec<(usize, TeleportCue)> = steps
            .iter()
            .enumerate()
            .filter_map(|(index, step)| step.teleport.map(|cue| (index, cue)))
            .collect();
        assert_eq!(cues, vec![(5, TeleportCue::IntoFlashback)]);

        let midpoint = &steps[5];
        assert_eq!(midpoint.params.post_exposure, 2.0);
        let last = steps.last().expect("final step");
        assert_eq!(last.params, *library.get(ProfileId::Flashback).params());
        let (base, _) = last.rearm.clone().expect("rearm");
        assert_eq!(base.name, library.get(ProfileId::Flashback).name);
    }

    #[test]
    fn exit_flare_peaks_lens_scale_and_returns_player() {
        let (mut sequencer, library) = sequencer();
        sequencer.request(
            TransitionRequest::FlashbackExit,
            *library.get(ProfileId::Flashback).params(),
        );
        let steps = run(&mut sequencer, 0.25, 12);
        assert_eq!(steps[5].teleport, Some(TeleportCue::ReturnFromFlashback));
        assert!((steps[5].params.lens_distortion_scale - 1.5).abs() < 1e-6);
        assert_eq!(
            steps[5].params.vignette_intensity,
            library.get(ProfileId::Sane).params().vignette_intensity
        );
        assert_eq!(
            steps.last().expect("final").params,
            *library.get(ProfileId::Sane).params()
        );
    }

    #[test]
    fn preemption_starts_from_current_values() {
        let (mut sequencer, library) = sequencer();
        sequencer.request(
            TransitionRequest::FlashbackEntry,
            *library.get(ProfileId::Sane).params(),
        );
        let steps = run(&mut sequencer, 0.25, 3);
        let on_screen = steps.last().expect("step").params;

        sequencer.request(TransitionRequest::Recovery, on_screen);
        assert_eq!(sequencer.active_kind(), Some(TransitionKind::Recovery));
        let first = sequencer.advance(0.0).expect("step");
        assert_eq!(first.params, on_screen);
        assert_eq!(first.teleport, None);
    }

    #[test]
    fn death_decay_freezes_output() {
        let (mut sequencer, library) = sequencer();
        let start = *library.get(ProfileId::Insane).params();
        sequencer.request(TransitionRequest::DeathDecay { duration_secs: 1.0 }, start);
        let steps = run(&mut sequencer, 0.5, 2);
        let last = &steps[1];
        assert!(last.completed);
        assert!(last.rearm.is_none());
        assert_eq!(last.params.saturation, -100.0);
        assert_eq!(last.params.vignette_intensity, 1.0);
        assert!((last.params.post_exposure - (start.post_exposure - 3.0)).abs() < 1e-6);
        assert!(sequencer.is_frozen());
        assert!(sequencer.holds_output());
        assert!(sequencer.advance(0.5).is_none());

        sequencer.request(TransitionRequest::Recovery, last.params);
        assert!(!sequencer.is_frozen());
    }

    #[test]
    fn zero_duration_completes_in_one_step() {
        let (mut sequencer, _) = sequencer();
        sequencer.request(
            TransitionRequest::DeathDecay { duration_secs: 0.0 },
            PostProcessParams::default(),
        );
        let step = sequencer.advance(0.016).expect("step");
        assert!(step.completed);
        assert_eq!(step.params.saturation, -100.0);
    }

    #[test]
    fn dead_player_ignores_flashback_traffic() {
        let (sequencer, _) = sequencer();
        let mut meter = InsanityMeter::new(&crate::config::InsanityTuning {
            initial_level: 1.0,
            death_threshold_secs: 0.0,
            ..Default::default()
        });
        meter.advance(0.1);
        assert!(meter.is_dead());

        let mut world = World::default();
        world.insert_resource(sequencer);
        world.insert_resource(meter);
        world.insert_resource(RenderedPostProcess::default());

        handle_game_event(&mut world, &GameEvent::FlashbackStarted);
        handle_game_event(&mut world, &GameEvent::FlashbackEnded);
        assert!(!world.resource::<TransitionSequencer>().is_active());
    }
}
