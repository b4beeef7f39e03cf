use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use bevy::prelude::{App, World};
use clap::Parser;
use echoes_core::{
    attach_event_journal, build_app_with_config, build_headless_app, publish, run_frame,
    set_insanity_level, EventJournal, GameEvent, InsanityConfig, InsanityMeter,
    PostProcessParams, ProfileBlender, RenderedPostProcess, ShaderInsanityDriver,
    TransitionSequencer,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a timed session against the insanity core", long_about = None)]
struct Args {
    /// Scenario JSON with timed steps
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Insanity config JSON (defaults to ECHOES_INSANITY_CONFIG_PATH or the builtin)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Frame delta in seconds
    #[arg(long, default_value_t = 1.0 / 60.0)]
    delta: f32,

    /// Session length in seconds; overrides the scenario's own duration
    #[arg(long)]
    duration: Option<f32>,

    /// Seconds between printed samples (0 prints every frame)
    #[arg(long, default_value_t = 1.0)]
    sample_interval: f32,

    /// Extra step in kind@seconds form, e.g. flashback_started@4.5
    #[arg(long = "event")]
    events: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scenario {
    duration_secs: Option<f32>,
    steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
struct ScenarioStep {
    at_secs: f32,
    #[serde(flatten)]
    action: StepAction,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StepAction {
    Event(GameEvent),
    SetLevel(f32),
}

#[derive(Debug, Serialize)]
struct Sample {
    frame: u64,
    elapsed_secs: f32,
    level: f32,
    mode: &'static str,
    paused: bool,
    dead: bool,
    blend_factor: Option<f32>,
    transition: Option<&'static str>,
    shader_insanity: Option<f32>,
    params: PostProcessParams,
}

const DEFAULT_DURATION_SECS: f32 = 30.0;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !args.delta.is_finite() || args.delta <= 0.0 {
        bail!("--delta must be a positive number of seconds");
    }

    let scenario = match &args.scenario {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Failed to read scenario at {}", path.display()))?;
            serde_json::from_str::<Scenario>(&data)
                .with_context(|| format!("Failed to parse scenario JSON at {}", path.display()))?
        }
        None => Scenario::default(),
    };

    let mut steps = scenario.steps.clone();
    steps.extend(parse_events(&args.events)?);
    steps.sort_by(|a, b| a.at_secs.total_cmp(&b.at_secs));

    let mut app = match &args.config {
        Some(path) => {
            let config = InsanityConfig::from_file(path)
                .with_context(|| format!("Failed to load config at {}", path.display()))?;
            build_app_with_config(Arc::new(config))
        }
        None => build_headless_app(),
    };
    attach_event_journal(&mut app.world);

    let duration = args
        .duration
        .or(scenario.duration_secs)
        .unwrap_or(DEFAULT_DURATION_SECS)
        .max(0.0);
    let total_frames = (duration / args.delta).ceil() as u64;
    info!(
        frames = total_frames,
        delta = args.delta,
        steps = steps.len(),
        "session_harness.start"
    );

    let mut pending = steps.into_iter().peekable();
    let mut next_sample = 0.0_f32;
    for frame in 0..total_frames {
        let now = frame as f32 * args.delta;
        while let Some(step) = pending.next_if(|step| step.at_secs <= now + 1e-6) {
            apply_step(&mut app.world, &step);
        }

        run_frame(&mut app, args.delta);

        let elapsed = now + args.delta;
        if elapsed + 1e-6 >= next_sample || frame + 1 == total_frames {
            println!("{}", serde_json::to_string(&sample(&app, frame + 1, elapsed))?);
            next_sample = elapsed + args.sample_interval.max(0.0);
        }
    }

    let journal = app.world.resource::<EventJournal>();
    println!("=== events ===");
    println!("{}", serde_json::to_string_pretty(journal.entries())?);

    Ok(())
}

fn apply_step(world: &mut World, step: &ScenarioStep) {
    info!(at_secs = step.at_secs, action = ?step.action, "session_harness.step");
    match step.action {
        StepAction::Event(event) => publish(world, event),
        StepAction::SetLevel(level) => set_insanity_level(world, level),
    }
}

fn sample(app: &App, frame: u64, elapsed_secs: f32) -> Sample {
    let world = &app.world;
    let meter = world.get_resource::<InsanityMeter>();
    Sample {
        frame,
        elapsed_secs,
        level: meter.map(InsanityMeter::level).unwrap_or_default(),
        mode: meter.map(|m| m.mode().as_str()).unwrap_or("none"),
        paused: meter.is_some_and(InsanityMeter::is_paused),
        dead: meter.is_some_and(InsanityMeter::is_dead),
        blend_factor: world
            .get_resource::<ProfileBlender>()
            .map(ProfileBlender::blend_factor),
        transition: world
            .get_resource::<TransitionSequencer>()
            .and_then(TransitionSequencer::active_kind)
            .map(|kind| kind.as_str()),
        shader_insanity: world
            .get_resource::<ShaderInsanityDriver>()
            .map(ShaderInsanityDriver::value),
        params: world
            .get_resource::<RenderedPostProcess>()
            .map(|rendered| *rendered.params())
            .unwrap_or_default(),
    }
}

fn parse_events(raw_events: &[String]) -> Result<Vec<ScenarioStep>> {
    raw_events
        .iter()
        .map(|raw| {
            let (kind, at) = raw
                .split_once('@')
                .ok_or_else(|| anyhow::anyhow!("Event must be in kind@seconds form"))?;
            let at_secs: f32 = at
                .parse()
                .with_context(|| format!("Invalid time '{}' for event '{}'", at, kind))?;
            let action = match kind.split_once('=') {
                Some(("set_level", value)) => StepAction::SetLevel(
                    value
                        .parse()
                        .with_context(|| format!("Invalid level '{}'", value))?,
                ),
                _ => StepAction::Event(
                    serde_json::from_value(serde_json::json!({ "kind": kind }))
                        .with_context(|| format!("Unknown event kind '{}'", kind))?,
                ),
            };
            Ok(ScenarioStep { at_secs, action })
        })
        .collect()
}
