//! Post-processing parameter sets and the named profiles they are blended
//! between.

use std::fmt;
use std::sync::Arc;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tonemapping operator. Operators cannot be interpolated, so blends switch
/// between them at a threshold instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TonemappingMode {
    #[default]
    None,
    Neutral,
    Aces,
}

impl TonemappingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TonemappingMode::None => "none",
            TonemappingMode::Neutral => "neutral",
            TonemappingMode::Aces => "aces",
        }
    }
}

/// Linear RGBA tint. Interpolation is componentwise with no gamma handling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorFilter {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    #[serde(default = "default_alpha")]
    pub a: f32,
}

fn default_alpha() -> f32 {
    1.0
}

impl Default for ColorFilter {
    fn default() -> Self {
        Self::WHITE
    }
}

impl ColorFilter {
    pub const WHITE: ColorFilter = ColorFilter::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            r: lerp(self.r, other.r, t),
            g: lerp(self.g, other.g, t),
            b: lerp(self.b, other.b, t),
            a: lerp(self.a, other.a, t),
        }
    }

    fn sanitized(self) -> Self {
        Self {
            r: clamp_or(self.r, 0.0, f32::MAX, 1.0),
            g: clamp_or(self.g, 0.0, f32::MAX, 1.0),
            b: clamp_or(self.b, 0.0, f32::MAX, 1.0),
            a: clamp_or(self.a, 0.0, 1.0, 1.0),
        }
    }
}

/// The concrete values handed to the renderer every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessParams {
    pub vignette_intensity: f32,
    pub vignette_smoothness: f32,
    pub bloom_intensity: f32,
    pub bloom_threshold: f32,
    pub chromatic_aberration: f32,
    pub tonemapping: TonemappingMode,
    pub post_exposure: f32,
    pub contrast: f32,
    pub color_filter: ColorFilter,
    pub hue_shift: f32,
    pub saturation: f32,
    pub lens_distortion_intensity: f32,
    pub lens_distortion_scale: f32,
}

impl Default for PostProcessParams {
    fn default() -> Self {
        Self {
            vignette_intensity: 0.0,
            vignette_smoothness: 0.2,
            bloom_intensity: 0.0,
            bloom_threshold: 0.9,
            chromatic_aberration: 0.0,
            tonemapping: TonemappingMode::None,
            post_exposure: 0.0,
            contrast: 0.0,
            color_filter: ColorFilter::WHITE,
            hue_shift: 0.0,
            saturation: 0.0,
            lens_distortion_intensity: 0.0,
            lens_distortion_scale: 1.0,
        }
    }
}

impl PostProcessParams {
    /// Interpolate every scalar field from `from` to `to`.
    ///
    /// `t` is clamped to [0, 1]. The tonemapping mode is a step: it takes
    /// `to`'s operator once `t` exceeds `tonemapping_switch`.
    pub fn lerp(from: &Self, to: &Self, t: f32, tonemapping_switch: f32) -> Self {
        let t = clamp_unit(t);
        Self {
            vignette_intensity: lerp(from.vignette_intensity, to.vignette_intensity, t),
            vignette_smoothness: lerp(from.vignette_smoothness, to.vignette_smoothness, t),
            bloom_intensity: lerp(from.bloom_intensity, to.bloom_intensity, t),
            bloom_threshold: lerp(from.bloom_threshold, to.bloom_threshold, t),
            chromatic_aberration: lerp(from.chromatic_aberration, to.chromatic_aberration, t),
            tonemapping: if t > tonemapping_switch {
                to.tonemapping
            } else {
                from.tonemapping
            },
            post_exposure: lerp(from.post_exposure, to.post_exposure, t),
            contrast: lerp(from.contrast, to.contrast, t),
            color_filter: from.color_filter.lerp(to.color_filter, t),
            hue_shift: lerp(from.hue_shift, to.hue_shift, t),
            saturation: lerp(from.saturation, to.saturation, t),
            lens_distortion_intensity: lerp(
                from.lens_distortion_intensity,
                to.lens_distortion_intensity,
                t,
            ),
            lens_distortion_scale: lerp(from.lens_distortion_scale, to.lens_distortion_scale, t),
        }
    }

    /// Clamp every field into the range the renderer accepts. Non-finite
    /// values fall back to the neutral default for that field.
    pub fn sanitized(self) -> Self {
        let neutral = Self::default();
        Self {
            vignette_intensity: clamp_or(
                self.vignette_intensity,
                0.0,
                1.0,
                neutral.vignette_intensity,
            ),
            vignette_smoothness: clamp_or(
                self.vignette_smoothness,
                0.01,
                1.0,
                neutral.vignette_smoothness,
            ),
            bloom_intensity: clamp_or(self.bloom_intensity, 0.0, 10.0, neutral.bloom_intensity),
            bloom_threshold: clamp_or(self.bloom_threshold, 0.0, 2.0, neutral.bloom_threshold),
            chromatic_aberration: clamp_or(
                self.chromatic_aberration,
                0.0,
                1.0,
                neutral.chromatic_aberration,
            ),
            tonemapping: self.tonemapping,
            post_exposure: clamp_or(self.post_exposure, -10.0, 10.0, neutral.post_exposure),
            contrast: clamp_or(self.contrast, -100.0, 100.0, neutral.contrast),
            color_filter: self.color_filter.sanitized(),
            hue_shift: clamp_or(self.hue_shift, -180.0, 180.0, neutral.hue_shift),
            saturation: clamp_or(self.saturation, -100.0, 100.0, neutral.saturation),
            lens_distortion_intensity: clamp_or(
                self.lens_distortion_intensity,
                -1.0,
                1.0,
                neutral.lens_distortion_intensity,
            ),
            lens_distortion_scale: clamp_or(
                self.lens_distortion_scale,
                0.01,
                5.0,
                neutral.lens_distortion_scale,
            ),
        }
    }
}

/// Immutable named parameter set loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualProfile {
    pub name: String,
    #[serde(flatten)]
    params: PostProcessParams,
}

impl VisualProfile {
    pub fn new(name: impl Into<String>, params: PostProcessParams) -> Self {
        Self {
            name: name.into(),
            params: params.sanitized(),
        }
    }

    pub fn params(&self) -> &PostProcessParams {
        &self.params
    }

    fn sanitized(self) -> Self {
        Self::new(self.name, self.params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileId {
    Sane,
    Insane,
    Flashback,
}

impl ProfileId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileId::Sane => "sane",
            ProfileId::Insane => "insane",
            ProfileId::Flashback => "flashback",
        }
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profiles as they appear in configuration; any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSet {
    pub sane: Option<VisualProfile>,
    pub insane: Option<VisualProfile>,
    pub flashback: Option<VisualProfile>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProfileError {
    #[error("visual profile '{0}' is not configured")]
    Missing(ProfileId),
}

/// The three profiles the visual modules need, all present.
#[derive(Resource, Debug, Clone)]
pub struct ProfileLibrary {
    sane: Arc<VisualProfile>,
    insane: Arc<VisualProfile>,
    flashback: Arc<VisualProfile>,
}

impl ProfileLibrary {
    pub fn new(sane: VisualProfile, insane: VisualProfile, flashback: VisualProfile) -> Self {
        Self {
            sane: Arc::new(sane.sanitized()),
            insane: Arc::new(insane.sanitized()),
            flashback: Arc::new(flashback.sanitized()),
        }
    }

    pub fn from_set(set: &ProfileSet) -> Result<Self, ProfileError> {
        let sane = set.sane.clone().ok_or(ProfileError::Missing(ProfileId::Sane))?;
        let insane = set
            .insane
            .clone()
            .ok_or(ProfileError::Missing(ProfileId::Insane))?;
        let flashback = set
            .flashback
            .clone()
            .ok_or(ProfileError::Missing(ProfileId::Flashback))?;
        Ok(Self::new(sane, insane, flashback))
    }

    pub fn get(&self, id: ProfileId) -> Arc<VisualProfile> {
        match id {
            ProfileId::Sane => Arc::clone(&self.sane),
            ProfileId::Insane => Arc::clone(&self.insane),
            ProfileId::Flashback => Arc::clone(&self.flashback),
        }
    }
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    // Weighted form keeps both endpoints exact.
    a * (1.0 - t) + b * t
}

#[inline]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vivid() -> PostProcessParams {
        PostProcessParams {
            vignette_intensity: 0.6,
            vignette_smoothness: 0.8,
            bloom_intensity: 4.0,
            bloom_threshold: 0.5,
            chromatic_aberration: 1.0,
            tonemapping: TonemappingMode::Aces,
            post_exposure: -2.0,
            contrast: 40.0,
            color_filter: ColorFilter::rgb(1.0, 0.0, 0.5),
            hue_shift: -30.0,
            saturation: -60.0,
            lens_distortion_intensity: -0.5,
            lens_distortion_scale: 0.8,
        }
    }

    #[test]
    fn lerp_midpoint_is_componentwise() {
        let from = PostProcessParams::default();
        let to = vivid();
        let mid = PostProcessParams::lerp(&from, &to, 0.5, 0.1);

        assert!((mid.vignette_intensity - 0.3).abs() < 1e-6);
        assert!((mid.bloom_intensity - 2.0).abs() < 1e-6);
        assert!((mid.post_exposure + 1.0).abs() < 1e-6);
        assert!((mid.saturation + 30.0).abs() < 1e-6);
        assert!((mid.color_filter.g - 0.5).abs() < 1e-6);
        assert!((mid.color_filter.b - 0.75).abs() < 1e-6);
        assert!((mid.lens_distortion_scale - 0.9).abs() < 1e-6);
        assert_eq!(mid.tonemapping, TonemappingMode::Aces);
    }

    #[test]
    fn tonemapping_is_a_step_not_a_blend() {
        let from = PostProcessParams::default();
        let to = vivid();

        let below = PostProcessParams::lerp(&from, &to, 0.1, 0.1);
        let above = PostProcessParams::lerp(&from, &to, 0.11, 0.1);

        assert_eq!(below.tonemapping, TonemappingMode::None);
        assert_eq!(above.tonemapping, TonemappingMode::Aces);
    }

    #[test]
    fn lerp_endpoints_match_inputs() {
        let from = PostProcessParams::default();
        let to = vivid();
        assert_eq!(PostProcessParams::lerp(&from, &to, 0.0, 0.1), from);
        assert_eq!(PostProcessParams::lerp(&from, &to, 1.0, 0.1), to);
        assert_eq!(PostProcessParams::lerp(&from, &to, 7.0, 0.1), to);
        assert_eq!(PostProcessParams::lerp(&from, &to, -3.0, 0.1), from);
    }

    #[test]
    fn sanitize_clamps_and_replaces_non_finite() {
        let raw = PostProcessParams {
            vignette_intensity: 3.0,
            vignette_smoothness: 0.0,
            bloom_intensity: f32::NAN,
            contrast: -500.0,
            lens_distortion_scale: 9.0,
            color_filter: ColorFilter {
                r: -1.0,
                g: 0.5,
                b: 2.0,
                a: 4.0,
            },
            ..PostProcessParams::default()
        };
        let clean = raw.sanitized();
        assert_eq!(clean.vignette_intensity, 1.0);
        assert_eq!(clean.vignette_smoothness, 0.01);
        assert_eq!(clean.bloom_intensity, 0.0);
        assert_eq!(clean.contrast, -100.0);
        assert_eq!(clean.lens_distortion_scale, 5.0);
        assert_eq!(clean.color_filter.r, 0.0);
        assert_eq!(clean.color_filter.b, 2.0);
        assert_eq!(clean.color_filter.a, 1.0);
        assert_eq!(clean.sanitized(), clean);
    }

    #[test]
    fn library_reports_first_missing_profile() {
        let mut set = ProfileSet {
            sane: Some(VisualProfile::new("sane", PostProcessParams::default())),
            insane: None,
            flashback: Some(VisualProfile::new("flashback", vivid())),
        };
        assert_eq!(
            ProfileLibrary::from_set(&set).unwrap_err(),
            ProfileError::Missing(ProfileId::Insane)
        );

        set.insane = Some(VisualProfile::new("insane", vivid()));
        let library = ProfileLibrary::from_set(&set).expect("complete set");
        assert_eq!(library.get(ProfileId::Flashback).name, "flashback");
    }

    #[test]
    fn profile_json_fills_missing_fields_with_defaults() {
        let profile: VisualProfile = serde_json::from_str(
            r#"{"name":"dim","post_exposure":-1.5,"tonemapping":"neutral"}"#,
        )
        .expect("profile json");
        assert_eq!(profile.params().post_exposure, -1.5);
        assert_eq!(profile.params().tonemapping, TonemappingMode::Neutral);
        assert_eq!(profile.params().lens_distortion_scale, 1.0);
        assert_eq!(profile.params().color_filter, ColorFilter::WHITE);
    }
}
