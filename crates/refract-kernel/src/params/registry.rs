//! The parameter registry: the typed catalog of every recognized option.
//!
//! The registry is the single source of truth for canonical names. Parsers
//! never invent a canonical name that is not in this table; the processor
//! validates and formats every tuple against its entry here. Entries are
//! plain statics (formatters and validators are `fn` pointers) so the whole
//! table is `'static` data, immutable after process start.

use crate::params::error::ParameterError;
use crate::params::value::OptionValue;
use lazy_static::lazy_static;
use std::collections::HashMap;

// ─────────────────────────────────────────────────────────────────────────────
// ParamKind
// ─────────────────────────────────────────────────────────────────────────────

/// The value shape a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Number,
    /// Either the literal `auto` or a number (`quality=auto`, `width=auto`).
    AutoOrNumber,
    Boolean,
    String,
    /// Membership in `allowed_values` is strict.
    Enum,
    /// Symbolic size code resolved against the size-code table.
    SizeCode,
    /// A number or a symbolic size code (legacy `imwidth`).
    NumberOrSizeCode,
    /// `x,y` pair, both components in `[0, 1]`.
    Coordinate,
}

impl ParamKind {
    fn expected(self) -> &'static str {
        match self {
            ParamKind::Number => "number",
            ParamKind::AutoOrNumber => "'auto' or number",
            ParamKind::Boolean => "boolean",
            ParamKind::String => "string",
            ParamKind::Enum => "enumerated string",
            ParamKind::SizeCode => "size code",
            ParamKind::NumberOrSizeCode => "number or size code",
            ParamKind::Coordinate => "coordinate pair",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ParamDef
// ─────────────────────────────────────────────────────────────────────────────

/// A single registry entry: how one canonical parameter is parsed, validated,
/// and formatted.
#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    /// Canonical name. The processor's output map only ever contains these.
    pub name: &'static str,
    /// Short aliases accepted by the compact parser. Each alias resolves to
    /// exactly one canonical name (tested invariant).
    pub aliases: &'static [&'static str],
    pub kind: ParamKind,
    /// Allowed values when `kind == Enum`; empty otherwise.
    pub allowed: &'static [&'static str],
    /// Inclusive numeric range for number-shaped kinds.
    pub range: Option<(f64, f64)>,
    /// Default literal substituted when validation fails; coerced via `kind`.
    pub default: Option<&'static str>,
    /// Final value coercion applied by the processor after validation.
    pub formatter: Option<fn(OptionValue) -> OptionValue>,
    /// Tie-break bump added to the source base priority. Only relevant when
    /// the same canonical name arrives from same-priority sources.
    pub priority: u8,
}

impl ParamDef {
    /// Coerce a raw string into this entry's value shape.
    pub fn parse_value(&self, raw: &str) -> Result<OptionValue, ParameterError> {
        let raw = raw.trim();
        let malformed = |reason: &str| ParameterError::Malformed {
            name: self.name.to_string(),
            raw: raw.to_string(),
            reason: reason.to_string(),
        };

        match self.kind {
            ParamKind::Number => raw
                .parse::<f64>()
                .map(OptionValue::Number)
                .map_err(|_| malformed("not a number")),
            ParamKind::AutoOrNumber => {
                if raw.eq_ignore_ascii_case("auto") {
                    Ok(OptionValue::Str("auto".into()))
                } else {
                    raw.parse::<f64>()
                        .map(OptionValue::Number)
                        .map_err(|_| malformed("not 'auto' or a number"))
                }
            }
            ParamKind::Boolean => match raw.to_ascii_lowercase().as_str() {
                "" | "true" | "1" | "t" | "yes" => Ok(OptionValue::Bool(true)),
                "false" | "0" | "f" | "no" => Ok(OptionValue::Bool(false)),
                _ => Err(malformed("not a boolean")),
            },
            ParamKind::String | ParamKind::Enum | ParamKind::SizeCode => {
                Ok(OptionValue::Str(raw.to_string()))
            }
            ParamKind::NumberOrSizeCode => {
                if let Ok(n) = raw.parse::<f64>() {
                    Ok(OptionValue::Number(n))
                } else {
                    Ok(OptionValue::Str(raw.to_string()))
                }
            }
            ParamKind::Coordinate => {
                let (x, y) = raw
                    .split_once(',')
                    .ok_or_else(|| malformed("expected 'x,y'"))?;
                let x: f64 = x.trim().parse().map_err(|_| malformed("x not a number"))?;
                let y: f64 = y.trim().parse().map_err(|_| malformed("y not a number"))?;
                Ok(OptionValue::Coord(x, y))
            }
        }
    }

    /// Validate a typed value against this entry.
    pub fn validate(&self, value: &OptionValue) -> Result<(), ParameterError> {
        let mismatch = || ParameterError::TypeMismatch {
            name: self.name.to_string(),
            expected: self.kind.expected(),
            got: value.type_name(),
        };

        match self.kind {
            ParamKind::Number => {
                let n = value.as_f64().ok_or_else(mismatch)?;
                self.check_range(n)
            }
            ParamKind::AutoOrNumber => match value {
                OptionValue::Str(s) if s.eq_ignore_ascii_case("auto") => Ok(()),
                OptionValue::Number(n) => self.check_range(*n),
                _ => Err(mismatch()),
            },
            ParamKind::Boolean => value.as_bool().map(|_| ()).ok_or_else(mismatch),
            ParamKind::String | ParamKind::SizeCode => {
                value.as_str().map(|_| ()).ok_or_else(mismatch)
            }
            ParamKind::NumberOrSizeCode => match value {
                OptionValue::Number(n) => self.check_range(*n),
                OptionValue::Str(_) => Ok(()),
                _ => Err(mismatch()),
            },
            ParamKind::Enum => {
                let s = value.as_str().ok_or_else(mismatch)?;
                if self.allowed.iter().any(|a| a.eq_ignore_ascii_case(s)) {
                    Ok(())
                } else {
                    Err(ParameterError::NotAllowed {
                        name: self.name.to_string(),
                        value: s.to_string(),
                    })
                }
            }
            ParamKind::Coordinate => {
                let (x, y) = value.as_coord().ok_or_else(mismatch)?;
                if (0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y) {
                    Ok(())
                } else {
                    Err(ParameterError::OutOfRange {
                        name: self.name.to_string(),
                        value: if (0.0..=1.0).contains(&x) { y } else { x },
                        min: 0.0,
                        max: 1.0,
                    })
                }
            }
        }
    }

    /// Apply the registered formatter, if any.
    pub fn format(&self, value: OptionValue) -> OptionValue {
        match self.formatter {
            Some(f) => f(value),
            None => value,
        }
    }

    /// The registered default, coerced through `parse_value`.
    pub fn default_value(&self) -> Option<OptionValue> {
        self.default.and_then(|raw| self.parse_value(raw).ok())
    }

    fn check_range(&self, n: f64) -> Result<(), ParameterError> {
        if let Some((min, max)) = self.range {
            if n < min || n > max {
                return Err(ParameterError::OutOfRange {
                    name: self.name.to_string(),
                    value: n,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatters
// ─────────────────────────────────────────────────────────────────────────────

/// Map compass-style gravity keywords onto the transform primitive's
/// vocabulary. Unrecognized strings pass through untouched (coordinates,
/// `auto`, `face`).
fn format_gravity(value: OptionValue) -> OptionValue {
    let OptionValue::Str(s) = &value else {
        return value;
    };
    let mapped = match s.to_ascii_lowercase().as_str() {
        "north" => "top",
        "south" => "bottom",
        "east" => "right",
        "west" => "left",
        "northeast" | "topright" => "top-right",
        "northwest" | "topleft" => "top-left",
        "southeast" | "bottomright" => "bottom-right",
        "southwest" | "bottomleft" => "bottom-left",
        "center" | "centre" => "center",
        _ => return value,
    };
    OptionValue::Str(mapped.to_string())
}

/// Normalize `W-H` aspect syntax to the colon form.
fn format_aspect(value: OptionValue) -> OptionValue {
    match value {
        OptionValue::Str(s) => OptionValue::Str(s.replace('-', ":")),
        other => other,
    }
}

/// Round quality to a whole number; `auto` passes through.
fn format_quality(value: OptionValue) -> OptionValue {
    match value {
        OptionValue::Number(n) => OptionValue::Number(n.round().clamp(1.0, 100.0)),
        other => other,
    }
}

/// Enumerated numeric strings (rotate) become numbers on the wire.
fn format_numeric_enum(value: OptionValue) -> OptionValue {
    match &value {
        OptionValue::Str(s) => match s.parse::<f64>() {
            Ok(n) => OptionValue::Number(n),
            Err(_) => value,
        },
        _ => value,
    }
}

/// Lowercase enumerated strings so `FIT=Cover` and `fit=cover` are one value.
fn format_lowercase(value: OptionValue) -> OptionValue {
    match value {
        OptionValue::Str(s) => OptionValue::Str(s.to_ascii_lowercase()),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// The table
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! def {
    ($name:literal, $aliases:expr, $kind:expr) => {
        ParamDef {
            name: $name,
            aliases: $aliases,
            kind: $kind,
            allowed: &[],
            range: None,
            default: None,
            formatter: None,
            priority: 0,
        }
    };
}

/// Every recognized canonical parameter.
pub static REGISTRY: &[ParamDef] = &[
    ParamDef {
        range: Some((1.0, 12_000.0)),
        priority: 1,
        ..def!("width", &["w"], ParamKind::AutoOrNumber)
    },
    ParamDef {
        range: Some((1.0, 12_000.0)),
        priority: 1,
        ..def!("height", &["h"], ParamKind::AutoOrNumber)
    },
    ParamDef {
        allowed: &["scale-down", "contain", "cover", "crop", "pad"],
        formatter: Some(format_lowercase),
        ..def!("fit", &[], ParamKind::Enum)
    },
    ParamDef {
        formatter: Some(format_gravity),
        ..def!("gravity", &["g"], ParamKind::String)
    },
    ParamDef {
        range: Some((1.0, 100.0)),
        default: Some("85"),
        formatter: Some(format_quality),
        ..def!("quality", &["q"], ParamKind::AutoOrNumber)
    },
    ParamDef {
        allowed: &[
            "auto",
            "webp",
            "avif",
            "jpeg",
            "png",
            "gif",
            "json",
            "baseline-jpeg",
        ],
        default: Some("auto"),
        formatter: Some(format_lowercase),
        ..def!("format", &[], ParamKind::Enum)
    },
    ParamDef {
        range: Some((0.1, 10.0)),
        ..def!("dpr", &[], ParamKind::Number)
    },
    ParamDef {
        range: Some((1.0, 250.0)),
        ..def!("blur", &[], ParamKind::Number)
    },
    ParamDef {
        range: Some((0.0, 10.0)),
        ..def!("brightness", &[], ParamKind::Number)
    },
    ParamDef {
        range: Some((0.0, 10.0)),
        ..def!("contrast", &[], ParamKind::Number)
    },
    ParamDef {
        range: Some((0.0, 10.0)),
        ..def!("saturation", &[], ParamKind::Number)
    },
    ParamDef {
        range: Some((0.0, 10.0)),
        ..def!("sharpen", &[], ParamKind::Number)
    },
    ParamDef {
        allowed: &["0", "90", "180", "270"],
        formatter: Some(format_numeric_enum),
        ..def!("rotate", &[], ParamKind::Enum)
    },
    def!("flip", &[], ParamKind::Boolean),
    def!("flop", &[], ParamKind::Boolean),
    def!("trim", &[], ParamKind::String),
    def!("background", &["bg"], ParamKind::String),
    ParamDef {
        allowed: &["none", "copyright", "keep"],
        default: Some("none"),
        formatter: Some(format_lowercase),
        ..def!("metadata", &[], ParamKind::Enum)
    },
    // Overlay JSON; the draw strategy parses and validates the array.
    def!("draw", &[], ParamKind::String),
    def!("anim", &[], ParamKind::Boolean),
    ParamDef {
        allowed: &["fast"],
        ..def!("compression", &[], ParamKind::Enum)
    },
    ParamDef {
        allowed: &["redirect"],
        ..def!("onerror", &[], ParamKind::Enum)
    },
    ParamDef {
        formatter: Some(format_aspect),
        ..def!("aspect", &["r"], ParamKind::String)
    },
    def!("focal", &["p"], ParamKind::Coordinate),
    def!("ctx", &["s", "smart"], ParamKind::Boolean),
    // Consumed by the size-code strategy; never present in the final map.
    def!("f", &[], ParamKind::SizeCode),
    def!("derivative", &["d"], ParamKind::String),
    def!("allowExpansion", &[], ParamKind::Boolean),
    // Legacy dimension names; rewritten to width/height by their strategy.
    ParamDef {
        range: Some((1.0, 12_000.0)),
        ..def!("imwidth", &[], ParamKind::NumberOrSizeCode)
    },
    ParamDef {
        range: Some((1.0, 12_000.0)),
        ..def!("imheight", &[], ParamKind::NumberOrSizeCode)
    },
];

lazy_static! {
    static ref INDEX: HashMap<&'static str, &'static ParamDef> = {
        let mut index = HashMap::new();
        for def in REGISTRY {
            index.insert(def.name, def);
            for alias in def.aliases {
                index.insert(*alias, def);
            }
        }
        index
    };
}

/// Look up an entry by canonical name or alias.
pub fn lookup(name: &str) -> Option<&'static ParamDef> {
    INDEX.get(name).copied()
}

/// Resolve a name or alias to its canonical name.
pub fn canonical_name(name: &str) -> Option<&'static str> {
    lookup(name).map(|def| def.name)
}

/// Whether a query-string key is reserved by the engine (canonical name,
/// alias, or the diagnostics toggle).
pub fn is_reserved(name: &str) -> bool {
    name == "debug" || lookup(name).is_some() || name.starts_with("im.") || name == "im"
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_alias_resolves_to_exactly_one_canonical_name() {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for def in REGISTRY {
            for alias in def.aliases {
                if let Some(prev) = seen.insert(alias, def.name) {
                    panic!("alias '{alias}' maps to both '{prev}' and '{}'", def.name);
                }
                // An alias must not shadow another entry's canonical name.
                assert!(
                    REGISTRY.iter().all(|d| d.name != *alias),
                    "alias '{alias}' collides with a canonical name"
                );
            }
        }
    }

    #[test]
    fn canonical_names_are_unique() {
        let mut names: Vec<&str> = REGISTRY.iter().map(|d| d.name).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn alias_lookup_resolves() {
        assert_eq!(canonical_name("w"), Some("width"));
        assert_eq!(canonical_name("r"), Some("aspect"));
        assert_eq!(canonical_name("p"), Some("focal"));
        assert_eq!(canonical_name("smart"), Some("ctx"));
        assert_eq!(canonical_name("bg"), Some("background"));
        assert_eq!(canonical_name("nope"), None);
    }

    #[test]
    fn number_parsing_and_range() {
        let width = lookup("width").unwrap();
        assert_eq!(
            width.parse_value("300").unwrap(),
            OptionValue::Number(300.0)
        );
        assert!(width.validate(&OptionValue::Number(300.0)).is_ok());
        assert!(matches!(
            width.validate(&OptionValue::Number(0.0)),
            Err(ParameterError::OutOfRange { .. })
        ));
        assert_eq!(
            width.parse_value("auto").unwrap(),
            OptionValue::Str("auto".into())
        );
    }

    #[test]
    fn enum_membership_is_strict() {
        let fit = lookup("fit").unwrap();
        assert!(fit.validate(&OptionValue::Str("cover".into())).is_ok());
        assert!(matches!(
            fit.validate(&OptionValue::Str("zoom".into())),
            Err(ParameterError::NotAllowed { .. })
        ));
    }

    #[test]
    fn coordinate_must_be_normalized() {
        let focal = lookup("focal").unwrap();
        let v = focal.parse_value("0.3,0.7").unwrap();
        assert_eq!(v, OptionValue::Coord(0.3, 0.7));
        assert!(focal.validate(&v).is_ok());
        assert!(focal.validate(&OptionValue::Coord(1.5, 0.5)).is_err());
        assert!(focal.parse_value("0.3;0.7").is_err());
    }

    #[test]
    fn boolean_accepts_bare_and_wordy_forms() {
        let ctx = lookup("ctx").unwrap();
        assert_eq!(ctx.parse_value("").unwrap(), OptionValue::Bool(true));
        assert_eq!(ctx.parse_value("false").unwrap(), OptionValue::Bool(false));
        assert!(ctx.parse_value("maybe").is_err());
    }

    #[test]
    fn gravity_formatter_maps_compass_names() {
        let gravity = lookup("gravity").unwrap();
        assert_eq!(
            gravity.format(OptionValue::Str("north".into())),
            OptionValue::Str("top".into())
        );
        assert_eq!(
            gravity.format(OptionValue::Str("southeast".into())),
            OptionValue::Str("bottom-right".into())
        );
        // Coordinates and primitive-native words pass through.
        assert_eq!(
            gravity.format(OptionValue::Str("auto".into())),
            OptionValue::Str("auto".into())
        );
    }

    #[test]
    fn aspect_formatter_normalizes_dash_form() {
        let aspect = lookup("aspect").unwrap();
        assert_eq!(
            aspect.format(OptionValue::Str("16-9".into())),
            OptionValue::Str("16:9".into())
        );
    }

    #[test]
    fn rotate_formats_to_number_after_enum_check() {
        let rotate = lookup("rotate").unwrap();
        assert!(rotate.validate(&OptionValue::Str("90".into())).is_ok());
        assert!(rotate.validate(&OptionValue::Str("45".into())).is_err());
        assert_eq!(
            rotate.format(OptionValue::Str("90".into())),
            OptionValue::Number(90.0)
        );
    }

    #[test]
    fn quality_default_substitutes_on_failure() {
        let quality = lookup("quality").unwrap();
        assert_eq!(quality.default_value(), Some(OptionValue::Number(85.0)));
    }

    #[test]
    fn imwidth_accepts_numbers_and_codes() {
        let imwidth = lookup("imwidth").unwrap();
        assert_eq!(
            imwidth.parse_value("800").unwrap(),
            OptionValue::Number(800.0)
        );
        assert_eq!(
            imwidth.parse_value("xl").unwrap(),
            OptionValue::Str("xl".into())
        );
    }

    #[test]
    fn reserved_names_cover_all_syntax_families() {
        assert!(is_reserved("width"));
        assert!(is_reserved("w"));
        assert!(is_reserved("im.resize"));
        assert!(is_reserved("im"));
        assert!(is_reserved("debug"));
        assert!(!is_reserved("utm_source"));
    }
}
