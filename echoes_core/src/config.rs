use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::{blend::SmoothingMode, curve::KeyCurve, profile::ProfileSet};

pub const BUILTIN_INSANITY_CONFIG: &str = include_str!("data/insanity_config.json");
pub const INSANITY_CONFIG_PATH_ENV: &str = "ECHOES_INSANITY_CONFIG_PATH";

/// Tuning for the insanity core, loaded from JSON.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InsanityConfig {
    pub insanity: InsanityTuning,
    pub cure: CureTuning,
    pub visuals: VisualTuning,
    pub flashback_effect: FlashbackEffectTuning,
    pub death_effect: DeathEffectTuning,
    pub shader: ShaderTuning,
    pub profiles: ProfileSet,
}

impl InsanityConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            Self::from_json_str(BUILTIN_INSANITY_CONFIG)
                .expect("builtin insanity config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, InsanityConfigError> {
        let mut config: InsanityConfig = serde_json::from_str(json)?;
        config.validate()?;
        config.normalize();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, InsanityConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|source| InsanityConfigError::ReadFailed {
                path: path.to_path_buf(),
                source,
            })?;
        InsanityConfig::from_json_str(&contents)
    }

    /// Reject values that would make the state machine misbehave rather than
    /// merely look odd.
    pub fn validate(&self) -> Result<(), InsanityConfigError> {
        let checks: [(&'static str, f32); 9] = [
            ("insanity.normal_rate", self.insanity.normal_rate),
            ("insanity.flashback_rate", self.insanity.flashback_rate),
            (
                "insanity.death_threshold_secs",
                self.insanity.death_threshold_secs,
            ),
            ("cure.ramp_secs", self.cure.ramp_secs),
            ("cure.pause_secs", self.cure.pause_secs),
            ("visuals.smoothing_speed", self.visuals.smoothing_speed),
            (
                "visuals.state_transition_secs",
                self.visuals.state_transition_secs,
            ),
            (
                "visuals.remedy_transition_secs",
                self.visuals.remedy_transition_secs,
            ),
            ("shader.transition_speed", self.shader.transition_speed),
        ];
        for (field, value) in checks {
            if !value.is_finite() || value < 0.0 {
                return Err(InsanityConfigError::Invalid { field, value });
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.insanity.initial_level = crate::profile::clamp_unit(self.insanity.initial_level);
        let effect = &mut self.flashback_effect;
        effect.entry_pull_curve = effect.entry_pull_curve.clone().normalized();
        effect.entry_push_curve = effect.entry_push_curve.clone().normalized();
        effect.exit_push_curve = effect.exit_push_curve.clone().normalized();
        effect.exit_settle_curve = effect.exit_settle_curve.clone().normalized();
    }
}

#[derive(Debug, Error)]
pub enum InsanityConfigError {
    #[error("failed to parse insanity config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read insanity config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid insanity config value for {field}: {value}")]
    Invalid { field: &'static str, value: f32 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InsanityTuning {
    pub initial_level: f32,
    /// Level gained per second outside a flashback.
    pub normal_rate: f32,
    pub flashback_rate: f32,
    /// Seconds the level may stay at the maximum before the player dies.
    pub death_threshold_secs: f32,
}

impl Default for InsanityTuning {
    fn default() -> Self {
        Self {
            initial_level: 0.0,
            normal_rate: 0.005,
            flashback_rate: 0.05,
            death_threshold_secs: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CureTuning {
    pub ramp_secs: f32,
    pub pause_secs: f32,
}

impl Default for CureTuning {
    fn default() -> Self {
        Self {
            ramp_secs: 3.0,
            pause_secs: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisualTuning {
    pub smoothing_speed: f32,
    pub smoothing: SmoothingMode,
    pub tonemapping_threshold: f32,
    pub state_transition_secs: f32,
    pub remedy_transition_secs: f32,
}

impl Default for VisualTuning {
    fn default() -> Self {
        Self {
            smoothing_speed: 1.0,
            smoothing: SmoothingMode::Exponential,
            tonemapping_threshold: 0.1,
            state_transition_secs: 3.0,
            remedy_transition_secs: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlashbackEffectTuning {
    pub exposure_peak: f32,
    /// Additive lens distortion during the first half of the entry flare.
    pub entry_pull_curve: KeyCurve,
    pub entry_push_curve: KeyCurve,
    pub exit_push_curve: KeyCurve,
    pub exit_settle_curve: KeyCurve,
    pub exit_lens_scale_peak: f32,
}

impl Default for FlashbackEffectTuning {
    fn default() -> Self {
        Self {
            exposure_peak: 2.0,
            entry_pull_curve: KeyCurve::linear(0.0, -1.0),
            entry_push_curve: KeyCurve::linear(-1.0, 0.0),
            exit_push_curve: KeyCurve::linear(0.0, 1.0),
            exit_settle_curve: KeyCurve::linear(1.0, 0.0),
            exit_lens_scale_peak: 1.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeathEffectTuning {
    pub saturation: f32,
    pub exposure_drop: f32,
    pub vignette_intensity: f32,
}

impl Default for DeathEffectTuning {
    fn default() -> Self {
        Self {
            saturation: -100.0,
            exposure_drop: 3.0,
            vignette_intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShaderTuning {
    pub transition_speed: f32,
}

impl Default for ShaderTuning {
    fn default() -> Self {
        Self {
            transition_speed: 1.0,
        }
    }
}

#[derive(Resource, Debug, Clone)]
pub struct InsanityConfigHandle(pub Arc<InsanityConfig>);

impl InsanityConfigHandle {
    pub fn new(config: Arc<InsanityConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<InsanityConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &InsanityConfig {
        &self.0
    }
}

#[derive(Resource, Debug, Clone)]
pub struct InsanityConfigMetadata {
    path: Option<PathBuf>,
}

impl InsanityConfigMetadata {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }
}

pub fn load_insanity_config_from_env() -> (Arc<InsanityConfig>, InsanityConfigMetadata) {
    let override_path = env::var(INSANITY_CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/insanity_config.json");

    let candidates: Vec<PathBuf> = match override_path {
        Some(ref path) => vec![path.clone()],
        None => vec![default_path.clone()],
    };

    for path in candidates {
        match InsanityConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "echoes::config",
                    path = %path.display(),
                    "insanity_config.loaded=file"
                );
                return (Arc::new(config), InsanityConfigMetadata::new(Some(path)));
            }
            Err(err) => {
                tracing::warn!(
                    target: "echoes::config",
                    path = %path.display(),
                    error = %err,
                    "insanity_config.load_failed"
                );
            }
        }
    }

    let config = InsanityConfig::builtin();
    tracing::info!(target: "echoes::config", "insanity_config.loaded=builtin");
    (config, InsanityConfigMetadata::new(None))
}
