//! Special-case parameter strategies.
//!
//! Each strategy owns one rewrite the core merge loop should not know
//! about: size codes, aspect normalization, overlay JSON, legacy dimension
//! names. The processor assembles the registry at construction and asks
//! `can_process` per retained tuple; adding a new special case means
//! registering a new strategy, not touching the loop.

use refract_kernel::params::{
    OptionValue, OverlayDescriptor, ParamSource, ParameterError, ResolvedOptions,
    TransformOption, lookup, size_codes,
};
use tracing::{debug, warn};

/// One special-case rewrite applied to a retained tuple.
pub trait ParamStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_process(&self, opt: &TransformOption) -> bool;

    /// Consume the tuple, mutating the resolved output. Returning an error
    /// discards the tuple (the processor records it); it is never fatal.
    fn process(
        &self,
        opt: TransformOption,
        out: &mut ResolvedOptions,
    ) -> Result<(), ParameterError>;
}

/// The built-in strategy set, in the order they are consulted.
pub fn builtin_strategies() -> Vec<Box<dyn ParamStrategy>> {
    vec![
        Box::new(SizeCodeStrategy),
        Box::new(AspectStrategy),
        Box::new(DrawStrategy),
        Box::new(LegacyDimensionStrategy),
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Size codes
// ─────────────────────────────────────────────────────────────────────────────

/// `f=xl` → `width=900`, marked explicit; `f` never reaches the option map.
pub struct SizeCodeStrategy;

impl ParamStrategy for SizeCodeStrategy {
    fn name(&self) -> &'static str {
        "size-code"
    }

    fn can_process(&self, opt: &TransformOption) -> bool {
        opt.name == "f"
    }

    fn process(
        &self,
        opt: TransformOption,
        out: &mut ResolvedOptions,
    ) -> Result<(), ParameterError> {
        let code = opt.value.as_str().unwrap_or_default();
        let Some(width) = size_codes::resolve(code) else {
            warn!(code, "discarding unknown size code");
            return Err(ParameterError::NotAllowed {
                name: "f".to_string(),
                value: code.to_string(),
            });
        };

        // An explicit width from any syntax outranks the size code.
        if out.map.contains("width") {
            debug!(code, "size code yields to explicit width");
            return Ok(());
        }
        out.map.insert("width", OptionValue::Number(width as f64));
        out.explicit_width = true;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aspect
// ─────────────────────────────────────────────────────────────────────────────

/// Normalizes `16-9` to `16:9` and implies context-aware cropping.
pub struct AspectStrategy;

impl ParamStrategy for AspectStrategy {
    fn name(&self) -> &'static str {
        "aspect"
    }

    fn can_process(&self, opt: &TransformOption) -> bool {
        opt.name == "aspect"
    }

    fn process(
        &self,
        opt: TransformOption,
        out: &mut ResolvedOptions,
    ) -> Result<(), ParameterError> {
        let def = lookup("aspect").expect("aspect is registered");
        out.map.insert("aspect", def.format(opt.value));
        // Aspect cropping implies context awareness unless ctx was given
        // explicitly.
        out.map.insert_default("ctx", OptionValue::Bool(true));
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Overlays
// ─────────────────────────────────────────────────────────────────────────────

/// Parses `draw` JSON (or accepts an already-built list), validates each
/// overlay, and maps compass gravity strings.
pub struct DrawStrategy;

impl ParamStrategy for DrawStrategy {
    fn name(&self) -> &'static str {
        "draw"
    }

    fn can_process(&self, opt: &TransformOption) -> bool {
        opt.name == "draw"
    }

    fn process(
        &self,
        opt: TransformOption,
        out: &mut ResolvedOptions,
    ) -> Result<(), ParameterError> {
        let parsed: Vec<OverlayDescriptor> = match opt.value {
            OptionValue::Overlays(list) => list,
            OptionValue::Str(raw) => parse_draw_json(&raw)?,
            other => {
                return Err(ParameterError::TypeMismatch {
                    name: "draw".to_string(),
                    expected: "overlay list or JSON string",
                    got: other.type_name(),
                });
            }
        };

        let gravity_def = lookup("gravity").expect("gravity is registered");
        let mut kept = Vec::with_capacity(parsed.len());
        for mut overlay in parsed {
            if let Err(err) = overlay.validate() {
                warn!(%err, url = overlay.url.as_str(), "discarding invalid overlay");
                continue;
            }
            if let Some(gravity) = overlay.gravity.take() {
                match gravity_def.format(OptionValue::Str(gravity)) {
                    OptionValue::Str(mapped) => overlay.gravity = Some(mapped),
                    _ => unreachable!("gravity formatter preserves strings"),
                }
            }
            kept.push(overlay);
        }

        if !kept.is_empty() {
            out.map.insert("draw", OptionValue::Overlays(kept));
        }
        Ok(())
    }
}

fn parse_draw_json(raw: &str) -> Result<Vec<OverlayDescriptor>, ParameterError> {
    let malformed = |reason: String| ParameterError::Malformed {
        name: "draw".to_string(),
        raw: raw.to_string(),
        reason,
    };

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| malformed(e.to_string()))?;
    match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
        }
        serde_json::Value::Object(_) => serde_json::from_value(value)
            .map(|single| vec![single])
            .map_err(|e| malformed(e.to_string())),
        _ => Err(malformed("expected a JSON object or array".to_string())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Legacy dimensions
// ─────────────────────────────────────────────────────────────────────────────

/// `imwidth`/`imheight` become `width`/`height`, overriding unless the
/// dimension was already explicitly set.
pub struct LegacyDimensionStrategy;

impl ParamStrategy for LegacyDimensionStrategy {
    fn name(&self) -> &'static str {
        "legacy-dimension"
    }

    fn can_process(&self, opt: &TransformOption) -> bool {
        matches!(opt.name.as_str(), "imwidth" | "imheight")
    }

    fn process(
        &self,
        opt: TransformOption,
        out: &mut ResolvedOptions,
    ) -> Result<(), ParameterError> {
        let (target, explicit) = if opt.name == "imwidth" {
            ("width", &mut out.explicit_width)
        } else {
            ("height", &mut out.explicit_height)
        };

        if *explicit {
            debug!(legacy = opt.name.as_str(), "legacy dimension yields to explicit value");
            out.discarded.push(opt);
            return Ok(());
        }

        let resolved = match &opt.value {
            OptionValue::Number(n) => *n,
            OptionValue::Str(code) => match size_codes::resolve(code) {
                Some(width) => width as f64,
                None => {
                    warn!(code = code.as_str(), "discarding unknown legacy size code");
                    return Err(ParameterError::NotAllowed {
                        name: opt.name.clone(),
                        value: code.clone(),
                    });
                }
            },
            other => {
                return Err(ParameterError::TypeMismatch {
                    name: opt.name.clone(),
                    expected: "number or size code",
                    got: other.type_name(),
                });
            }
        };

        out.map.insert(target, OptionValue::Number(resolved));
        *explicit = true;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(name: &str, value: OptionValue) -> TransformOption {
        TransformOption::new(name, value, ParamSource::Compact)
    }

    #[test]
    fn size_code_emits_explicit_width() {
        let mut out = ResolvedOptions::default();
        SizeCodeStrategy
            .process(opt("f", OptionValue::Str("xl".into())), &mut out)
            .unwrap();
        assert_eq!(out.map.width(), Some(900));
        assert!(out.explicit_width);
        assert!(!out.map.contains("f"));
    }

    #[test]
    fn size_code_yields_to_existing_width() {
        let mut out = ResolvedOptions::default();
        out.map.insert("width", OptionValue::Number(800.0));
        SizeCodeStrategy
            .process(opt("f", OptionValue::Str("xl".into())), &mut out)
            .unwrap();
        assert_eq!(out.map.width(), Some(800));
    }

    #[test]
    fn unknown_size_code_errors() {
        let mut out = ResolvedOptions::default();
        let err = SizeCodeStrategy
            .process(opt("f", OptionValue::Str("galactic".into())), &mut out)
            .unwrap_err();
        assert!(matches!(err, ParameterError::NotAllowed { .. }));
    }

    #[test]
    fn aspect_normalizes_and_implies_ctx() {
        let mut out = ResolvedOptions::default();
        AspectStrategy
            .process(opt("aspect", OptionValue::Str("16-9".into())), &mut out)
            .unwrap();
        assert_eq!(out.map.string("aspect"), Some("16:9"));
        assert_eq!(out.map.boolean("ctx"), Some(true));
    }

    #[test]
    fn aspect_respects_explicit_ctx() {
        let mut out = ResolvedOptions::default();
        out.map.insert("ctx", OptionValue::Bool(false));
        AspectStrategy
            .process(opt("aspect", OptionValue::Str("16:9".into())), &mut out)
            .unwrap();
        assert_eq!(out.map.boolean("ctx"), Some(false));
    }

    #[test]
    fn draw_parses_json_and_maps_gravity() {
        let mut out = ResolvedOptions::default();
        let raw = r#"[{"url":"https://cdn/x.png","gravity":"southeast","opacity":0.4}]"#;
        DrawStrategy
            .process(opt("draw", OptionValue::Str(raw.into())), &mut out)
            .unwrap();
        let overlays = out.map.get("draw").unwrap().as_overlays().unwrap();
        assert_eq!(overlays[0].gravity.as_deref(), Some("bottom-right"));
    }

    #[test]
    fn draw_accepts_a_single_object() {
        let mut out = ResolvedOptions::default();
        DrawStrategy
            .process(
                opt("draw", OptionValue::Str(r#"{"url":"https://cdn/x.png"}"#.into())),
                &mut out,
            )
            .unwrap();
        assert_eq!(out.map.get("draw").unwrap().as_overlays().unwrap().len(), 1);
    }

    #[test]
    fn invalid_overlays_are_dropped_individually() {
        let mut out = ResolvedOptions::default();
        let raw = r#"[
            {"url":"https://cdn/ok.png"},
            {"url":"https://cdn/bad.png","top":1,"bottom":2}
        ]"#;
        DrawStrategy
            .process(opt("draw", OptionValue::Str(raw.into())), &mut out)
            .unwrap();
        let overlays = out.map.get("draw").unwrap().as_overlays().unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].url, "https://cdn/ok.png");
    }

    #[test]
    fn draw_with_bad_json_errors() {
        let mut out = ResolvedOptions::default();
        let err = DrawStrategy
            .process(opt("draw", OptionValue::Str("not-json".into())), &mut out)
            .unwrap_err();
        assert!(matches!(err, ParameterError::Malformed { .. }));
    }

    #[test]
    fn legacy_width_maps_unless_explicit() {
        let mut out = ResolvedOptions::default();
        LegacyDimensionStrategy
            .process(opt("imwidth", OptionValue::Number(800.0)), &mut out)
            .unwrap();
        assert_eq!(out.map.width(), Some(800));
        assert!(out.explicit_width);

        // A second legacy width cannot override the first.
        LegacyDimensionStrategy
            .process(opt("imwidth", OptionValue::Number(400.0)), &mut out)
            .unwrap();
        assert_eq!(out.map.width(), Some(800));
    }

    #[test]
    fn legacy_height_resolves_size_codes() {
        let mut out = ResolvedOptions::default();
        LegacyDimensionStrategy
            .process(opt("imheight", OptionValue::Str("m".into())), &mut out)
            .unwrap();
        assert_eq!(out.map.height(), Some(700));
    }
}
