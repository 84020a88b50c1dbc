//! Overlay (watermark / composite) descriptors for the `draw` parameter.
//!
//! Overlays arrive either as a JSON array on the canonical `draw` parameter
//! or synthesized from legacy `im.composite` / `im.watermark` forms. Both
//! paths deserialize into [`OverlayDescriptor`] and must pass
//! [`OverlayDescriptor::validate`] before entering the option map.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation failure for a single overlay entry.
#[derive(Debug, Error, PartialEq)]
#[non_exhaustive]
pub enum OverlayError {
    /// The `url` field is empty.
    #[error("overlay url cannot be empty")]
    EmptyUrl,

    /// Both `top` and `bottom` offsets are set — the pair is mutually
    /// exclusive.
    #[error("overlay cannot set both 'top' and 'bottom'")]
    TopBottomConflict,

    /// Both `left` and `right` offsets are set.
    #[error("overlay cannot set both 'left' and 'right'")]
    LeftRightConflict,

    /// Opacity outside `[0, 1]`.
    #[error("overlay opacity {0} is outside [0, 1]")]
    OpacityOutOfRange(f64),

    /// Rotation is not one of 0, 90, 180, 270.
    #[error("overlay rotation {0} must be one of 0, 90, 180, 270")]
    InvalidRotation(u16),
}

// ─────────────────────────────────────────────────────────────────────────────
// RepeatMode
// ─────────────────────────────────────────────────────────────────────────────

/// Tiling behaviour for an overlay: off, both axes, or one axis.
///
/// The wire form is either a JSON boolean (`false`/`true`) or the axis
/// strings `"x"` / `"y"`, so serde support is hand-written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    Off,
    Both,
    X,
    Y,
}

impl RepeatMode {
    pub fn is_off(&self) -> bool {
        matches!(self, RepeatMode::Off)
    }
}

impl Serialize for RepeatMode {
    fn serialize<S: serde::Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        match self {
            RepeatMode::Off => ser.serialize_bool(false),
            RepeatMode::Both => ser.serialize_bool(true),
            RepeatMode::X => ser.serialize_str("x"),
            RepeatMode::Y => ser.serialize_str("y"),
        }
    }
}

impl<'de> Deserialize<'de> for RepeatMode {
    fn deserialize<D: serde::Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Axis(String),
        }

        match Raw::deserialize(de)? {
            Raw::Flag(false) => Ok(RepeatMode::Off),
            Raw::Flag(true) => Ok(RepeatMode::Both),
            Raw::Axis(s) => match s.as_str() {
                "x" => Ok(RepeatMode::X),
                "y" => Ok(RepeatMode::Y),
                other => Err(serde::de::Error::custom(format!(
                    "repeat must be a boolean, \"x\", or \"y\", got \"{other}\""
                ))),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OverlayDescriptor
// ─────────────────────────────────────────────────────────────────────────────

/// A single composited image: source URL plus placement and blending fields.
///
/// Field semantics follow the transform primitive's `draw` vocabulary: edge
/// offsets position the overlay relative to the base image, `opacity` blends
/// in `[0, 1]`, `repeat` tiles the overlay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayDescriptor {
    /// Source URL of the overlay image. Required.
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Fit mode applied when the overlay is resized before compositing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<String>,

    /// Blend opacity in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,

    #[serde(skip_serializing_if = "RepeatMode::is_off")]
    pub repeat: RepeatMode,

    // Edge offsets in pixels. `top`/`bottom` and `left`/`right` are each
    // mutually exclusive pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bottom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,

    /// Rotation in degrees: 0, 90, 180, or 270.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate: Option<u16>,
}

impl OverlayDescriptor {
    /// Minimal overlay referencing the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Check all structural invariants of this overlay.
    ///
    /// Checks performed (in order):
    /// 1. `url` is non-empty.
    /// 2. `top` and `bottom` are not both set.
    /// 3. `left` and `right` are not both set.
    /// 4. `opacity`, when set, is within `[0, 1]`.
    /// 5. `rotate`, when set, is one of 0, 90, 180, 270.
    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.url.trim().is_empty() {
            return Err(OverlayError::EmptyUrl);
        }
        if self.top.is_some() && self.bottom.is_some() {
            return Err(OverlayError::TopBottomConflict);
        }
        if self.left.is_some() && self.right.is_some() {
            return Err(OverlayError::LeftRightConflict);
        }
        if let Some(opacity) = self.opacity {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(OverlayError::OpacityOutOfRange(opacity));
            }
        }
        if let Some(rotate) = self.rotate {
            if !matches!(rotate, 0 | 90 | 180 | 270) {
                return Err(OverlayError::InvalidRotation(rotate));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
