//! Core value types for transformation parameters.
//!
//! Every parser in the resolution engine emits [`TransformOption`] tuples;
//! the processor reconciles them into an [`OptionMap`](super::option_map::OptionMap).
//! The value side is the [`OptionValue`] sum type, which replaces the
//! dynamically-typed bags that URL parsing naturally produces with a closed
//! set of variants the rest of the pipeline can match on.

use crate::params::overlay::OverlayDescriptor;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// ParamSource
// ─────────────────────────────────────────────────────────────────────────────

/// Where a parameter tuple was extracted from.
///
/// The source determines the *base* priority used by the processor when the
/// same canonical name arrives from several syntaxes at once. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// Full canonical name in the query string (`?width=300`).
    Canonical,
    /// Short alias in the query string (`?w=300`, `?r=16:9`).
    Compact,
    /// Underscore-prefixed path segment (`/_width=300/img.jpg`).
    Path,
    /// Legacy third-party syntax (`?im.resize=...`, `?imwidth=...`).
    Legacy,
    /// Synthesized by a strategy or the client signal detector.
    Derived,
    /// Expanded from a named derivative preset.
    Derivative,
}

impl ParamSource {
    /// Base priority for tuples from this source.
    ///
    /// Derivative presets outrank everything; path segments beat query
    /// parameters; canonical and compact query forms are peers (the
    /// registry's per-parameter priority breaks remaining ties); legacy
    /// translations sit below native forms; derived values only fill gaps.
    pub fn base_priority(self) -> u8 {
        match self {
            ParamSource::Derivative => 90,
            ParamSource::Path => 70,
            ParamSource::Canonical => 50,
            ParamSource::Compact => 50,
            ParamSource::Legacy => 40,
            ParamSource::Derived => 30,
        }
    }
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParamSource::Canonical => "canonical",
            ParamSource::Compact => "compact",
            ParamSource::Path => "path",
            ParamSource::Legacy => "legacy",
            ParamSource::Derived => "derived",
            ParamSource::Derivative => "derivative",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OptionValue
// ─────────────────────────────────────────────────────────────────────────────

/// A single typed parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag (`ctx=true`, `flip=true`).
    Bool(bool),
    /// Numeric value (`width=300`, `opacity=0.5`).
    Number(f64),
    /// Free-form or enumerated string (`fit=cover`, `aspect=16:9`).
    Str(String),
    /// Normalized coordinate pair in `[0,1]²` (`focal=0.3,0.7`).
    Coord(f64, f64),
    /// Ordered overlay list for the `draw` parameter.
    Overlays(Vec<OverlayDescriptor>),
}

impl OptionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric value rounded to `u32`, when non-negative.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            OptionValue::Number(n) if *n >= 0.0 => Some(n.round() as u32),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_coord(&self) -> Option<(f64, f64)> {
        match self {
            OptionValue::Coord(x, y) => Some((*x, *y)),
            _ => None,
        }
    }

    pub fn as_overlays(&self) -> Option<&[OverlayDescriptor]> {
        match self {
            OptionValue::Overlays(list) => Some(list),
            _ => None,
        }
    }

    /// Variant name, used in validation warnings.
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "boolean",
            OptionValue::Number(_) => "number",
            OptionValue::Str(_) => "string",
            OptionValue::Coord(..) => "coordinate",
            OptionValue::Overlays(_) => "overlays",
        }
    }

    /// Stable textual rendering used for cache fingerprints and debugging.
    ///
    /// Whole numbers render without a fractional part so `width=800` and
    /// `width=800.0` fingerprint identically.
    pub fn canonical_string(&self) -> String {
        match self {
            OptionValue::Bool(b) => b.to_string(),
            OptionValue::Number(n) => format_number(*n),
            OptionValue::Str(s) => s.clone(),
            OptionValue::Coord(x, y) => format!("{},{}", format_number(*x), format_number(*y)),
            OptionValue::Overlays(list) => {
                serde_json::to_string(list).unwrap_or_else(|_| String::from("[]"))
            }
        }
    }

    /// JSON rendering used for the transform primitive's option bundle.
    ///
    /// Coordinates serialize as `"x,y"` strings — the wire form the
    /// primitive's `gravity`/focal vocabulary expects.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            OptionValue::Bool(b) => serde_json::Value::Bool(*b),
            OptionValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            OptionValue::Str(s) => serde_json::Value::String(s.clone()),
            OptionValue::Coord(..) => serde_json::Value::String(self.canonical_string()),
            OptionValue::Overlays(list) => {
                serde_json::to_value(list).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

impl From<f64> for OptionValue {
    fn from(n: f64) -> Self {
        OptionValue::Number(n)
    }
}

impl From<u32> for OptionValue {
    fn from(n: u32) -> Self {
        OptionValue::Number(n as f64)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TransformOption
// ─────────────────────────────────────────────────────────────────────────────

/// A single `(name, value, source, priority)` tuple emitted by a parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformOption {
    /// Canonical parameter name (or raw name for passthrough tuples).
    pub name: String,
    pub value: OptionValue,
    pub source: ParamSource,
    /// Effective priority: source base, possibly adjusted by the parser or
    /// the registry entry.
    pub priority: u8,
}

impl TransformOption {
    /// Construct a tuple with the source's base priority.
    pub fn new(name: impl Into<String>, value: OptionValue, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            value,
            source,
            priority: source.base_priority(),
        }
    }

    /// Builder helper: override the priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_priorities_order_derivative_first() {
        assert!(ParamSource::Derivative.base_priority() > ParamSource::Path.base_priority());
        assert!(ParamSource::Path.base_priority() > ParamSource::Canonical.base_priority());
        assert_eq!(
            ParamSource::Canonical.base_priority(),
            ParamSource::Compact.base_priority()
        );
        assert!(ParamSource::Canonical.base_priority() > ParamSource::Legacy.base_priority());
        assert!(ParamSource::Legacy.base_priority() > ParamSource::Derived.base_priority());
    }

    #[test]
    fn whole_numbers_render_without_fraction() {
        assert_eq!(OptionValue::Number(800.0).canonical_string(), "800");
        assert_eq!(OptionValue::Number(0.5).canonical_string(), "0.5");
    }

    #[test]
    fn coord_renders_as_comma_pair() {
        let v = OptionValue::Coord(0.3, 0.7);
        assert_eq!(v.canonical_string(), "0.3,0.7");
        assert_eq!(v.to_json(), serde_json::json!("0.3,0.7"));
    }

    #[test]
    fn typed_accessors_reject_other_variants() {
        let v = OptionValue::Str("cover".into());
        assert!(v.as_f64().is_none());
        assert!(v.as_bool().is_none());
        assert_eq!(v.as_str(), Some("cover"));
    }

    #[test]
    fn as_u32_rounds_and_rejects_negative() {
        assert_eq!(OptionValue::Number(299.6).as_u32(), Some(300));
        assert_eq!(OptionValue::Number(-1.0).as_u32(), None);
    }

    #[test]
    fn new_tuple_takes_source_base_priority() {
        let opt = TransformOption::new("width", OptionValue::Number(300.0), ParamSource::Path);
        assert_eq!(opt.priority, ParamSource::Path.base_priority());
        assert_eq!(opt.with_priority(99).priority, 99);
    }
}
