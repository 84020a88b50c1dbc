//! The canonical option map and its companions.
//!
//! [`OptionMap`] is the processor's output: canonical-name → typed value,
//! backed by a `BTreeMap` so iteration order (and therefore the cache
//! fingerprint) is deterministic. [`ResolvedOptions`] wraps the map together
//! with the sentinel flags downstream stages consult.

use crate::params::value::{OptionValue, TransformOption};
use serde::Serialize;
use std::collections::BTreeMap;

// ─────────────────────────────────────────────────────────────────────────────
// OptionMap
// ─────────────────────────────────────────────────────────────────────────────

/// Mapping of canonical parameter name to concrete typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OptionMap(BTreeMap<String, OptionValue>);

impl OptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        self.0.insert(name.into(), value);
    }

    /// Insert only when the name is absent.
    pub fn insert_default(&mut self, name: impl Into<String>, value: OptionValue) {
        self.0.entry(name.into()).or_insert(value);
    }

    pub fn remove(&mut self, name: &str) -> Option<OptionValue> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionValue)> {
        self.0.iter()
    }

    // ── Typed accessors ──────────────────────────────────────────────────────

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(OptionValue::as_f64)
    }

    pub fn integer(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(OptionValue::as_u32)
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(OptionValue::as_bool)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(OptionValue::as_str)
    }

    pub fn width(&self) -> Option<u32> {
        self.integer("width")
    }

    pub fn height(&self) -> Option<u32> {
        self.integer("height")
    }

    pub fn format(&self) -> Option<&str> {
        self.string("format")
    }

    pub fn fit(&self) -> Option<&str> {
        self.string("fit")
    }

    /// Stable `name=value|name=value` rendering for fingerprint derivation.
    ///
    /// Two maps with equal contents always render identically: same inputs,
    /// same cache key.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push('|');
            }
            out.push_str(name);
            out.push('=');
            out.push_str(&value.canonical_string());
        }
        out
    }

    /// JSON object rendering for the transform primitive's option bundle.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (name, value) in &self.0 {
            obj.insert(name.clone(), value.to_json());
        }
        serde_json::Value::Object(obj)
    }
}

impl FromIterator<(String, OptionValue)> for OptionMap {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dimension conditionals
// ─────────────────────────────────────────────────────────────────────────────

/// Intrinsic-image property referenced by a pending conditional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionProperty {
    Width,
    Height,
    /// width / height.
    Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CompareOp {
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            "=" | "==" => Some(CompareOp::Eq),
            _ => None,
        }
    }
}

/// A deferred `im.if-dimension` branch: evaluated only once intrinsic
/// dimensions are known (after the metadata pre-fetch), applying `then`
/// options when the comparison holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionCondition {
    pub property: DimensionProperty,
    pub op: CompareOp,
    pub value: f64,
    /// Options applied when the condition holds.
    pub then: Vec<(String, OptionValue)>,
}

impl DimensionCondition {
    pub fn evaluate(&self, width: u32, height: u32) -> bool {
        let actual = match self.property {
            DimensionProperty::Width => width as f64,
            DimensionProperty::Height => height as f64,
            DimensionProperty::Ratio => {
                if height == 0 {
                    return false;
                }
                width as f64 / height as f64
            }
        };
        match self.op {
            CompareOp::Lt => actual < self.value,
            CompareOp::Le => actual <= self.value,
            CompareOp::Gt => actual > self.value,
            CompareOp::Ge => actual >= self.value,
            CompareOp::Eq => (actual - self.value).abs() < f64::EPSILON,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ResolvedOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Processor output: the option map plus the sentinel flags that downstream
/// stages (client detector, orchestrator, cache controller) consult.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedOptions {
    pub map: OptionMap,

    /// The user explicitly specified a width (any source). Blocks the client
    /// signal detector from overriding it.
    pub explicit_width: bool,
    /// The user explicitly specified a height.
    pub explicit_height: bool,

    /// The orchestrator must learn intrinsic dimensions before transforming.
    pub needs_image_info: bool,

    /// Pending `im.if-dimension` conditionals, evaluated after the metadata
    /// pre-fetch.
    pub conditionals: Vec<DimensionCondition>,

    /// Tuples discarded during priority merging or validation, retained for
    /// the debug surface.
    pub discarded: Vec<TransformOption>,
}

impl ResolvedOptions {
    pub fn new(map: OptionMap) -> Self {
        Self {
            map,
            ..Default::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_is_sorted_and_stable() {
        let mut a = OptionMap::new();
        a.insert("width", OptionValue::Number(800.0));
        a.insert("fit", OptionValue::Str("cover".into()));

        let mut b = OptionMap::new();
        b.insert("fit", OptionValue::Str("cover".into()));
        b.insert("width", OptionValue::Number(800.0));

        assert_eq!(a.canonical_string(), "fit=cover|width=800");
        assert_eq!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn insert_default_does_not_override() {
        let mut map = OptionMap::new();
        map.insert("quality", OptionValue::Number(80.0));
        map.insert_default("quality", OptionValue::Number(50.0));
        assert_eq!(map.number("quality"), Some(80.0));
    }

    #[test]
    fn typed_accessors_return_none_on_type_mismatch() {
        let mut map = OptionMap::new();
        map.insert("fit", OptionValue::Str("cover".into()));
        assert_eq!(map.number("fit"), None);
        assert_eq!(map.fit(), Some("cover"));
    }

    #[test]
    fn to_json_produces_plain_object() {
        let mut map = OptionMap::new();
        map.insert("width", OptionValue::Number(300.0));
        map.insert("ctx", OptionValue::Bool(true));
        assert_eq!(
            map.to_json(),
            serde_json::json!({ "ctx": true, "width": 300.0 })
        );
    }

    #[test]
    fn ratio_condition_uses_width_over_height() {
        let cond = DimensionCondition {
            property: DimensionProperty::Ratio,
            op: CompareOp::Gt,
            value: 1.0,
            then: vec![],
        };
        assert!(cond.evaluate(1600, 900));
        assert!(!cond.evaluate(900, 1600));
        assert!(!cond.evaluate(900, 0));
    }

    #[test]
    fn width_condition_boundaries() {
        let cond = DimensionCondition {
            property: DimensionProperty::Width,
            op: CompareOp::Ge,
            value: 1000.0,
            then: vec![],
        };
        assert!(cond.evaluate(1000, 1));
        assert!(!cond.evaluate(999, 1));
    }

    #[test]
    fn compare_op_parses_symbols() {
        assert_eq!(CompareOp::from_symbol(">="), Some(CompareOp::Ge));
        assert_eq!(CompareOp::from_symbol("=="), Some(CompareOp::Eq));
        assert_eq!(CompareOp::from_symbol("~"), None);
    }
}
