//! Legacy third-party parameter parser (`im.*` family).
//!
//! Translates the precursor system's vocabulary into canonical tuples:
//!
//! | Legacy form | Translation |
//! |---|---|
//! | `im.resize=width:W,height:H,mode:M` | `width`/`height` + `fit` via the mode table |
//! | `im.aspectCrop=(W,H),xPosition=X,yPosition=Y` | `aspect`, `focal`, `ctx=true` |
//! | `im.composite` / `im.watermark` | overlay descriptors on `draw` |
//! | `im.blur=N` (0–100) | `blur` scaled to the primitive's 1–250 range |
//! | `im.mirror=horizontal\|vertical` | `flop` / `flip` |
//! | `im.if-dimension=PROP OP VAL,then` | pending dimension conditional |
//! | `imwidth` / `imheight` | `width`/`height` (number or size code) |
//! | `impolicy` | `derivative` |
//! | `im=` bundle | recursive `f=` / `r=` / `p=` / `s=` extraction |
//!
//! The advanced forms (composites, conditionals) sit behind the
//! `legacy_advanced` feature flag.

use super::{ParamParser, ParseYield};
use crate::request::RequestFacts;
use refract_kernel::params::{
    CompareOp, DimensionCondition, DimensionProperty, OptionValue, OverlayDescriptor,
    ParamSource, TransformOption, lookup,
};
use tracing::debug;

/// Edge offset applied when a placement keyword arrives without an explicit
/// `offset`.
const DEFAULT_PLACEMENT_OFFSET: f64 = 5.0;

pub struct AkamaiParser {
    advanced: bool,
}

impl AkamaiParser {
    pub fn new(advanced: bool) -> Self {
        Self { advanced }
    }
}

impl ParamParser for AkamaiParser {
    fn name(&self) -> &'static str {
        "akamai"
    }

    fn parse(&self, req: &RequestFacts) -> ParseYield {
        let mut out = ParseYield::default();
        let mut overlays: Vec<OverlayDescriptor> = Vec::new();

        for (key, value) in &req.query {
            match key.as_str() {
                "im.resize" => parse_resize(value, &mut out),
                "im.aspectcrop" | "im.aspectCrop" => parse_aspect_crop(value, &mut out),
                "im.blur" => parse_blur(value, &mut out),
                "im.mirror" => parse_mirror(value, &mut out),
                "im.quality" => push_via_registry("quality", value, &mut out),
                "im.format" => push_via_registry("format", value, &mut out),
                "imwidth" => push_via_registry("imwidth", value, &mut out),
                "imheight" => push_via_registry("imheight", value, &mut out),
                "impolicy" => out.options.push(legacy_opt("derivative", value.as_str().into())),
                "im" => parse_bundle(value, &mut out),
                "im.composite" | "im.watermark" if self.advanced => {
                    if let Some(overlay) = parse_composite(value) {
                        overlays.push(overlay);
                    }
                }
                "im.if-dimension" if self.advanced => parse_if_dimension(value, &mut out),
                other if other.starts_with("im.") => {
                    debug!(param = other, "ignoring unsupported legacy parameter");
                }
                _ => {}
            }
        }

        if !overlays.is_empty() {
            out.options
                .push(legacy_opt("draw", OptionValue::Overlays(overlays)));
        }

        out
    }
}

fn legacy_opt(name: &'static str, value: OptionValue) -> TransformOption {
    TransformOption::new(name, value, ParamSource::Legacy)
}

/// Coerce through the canonical registry entry; drop on failure.
fn push_via_registry(name: &'static str, raw: &str, out: &mut ParseYield) {
    let def = lookup(name).expect("legacy translation targets a registered name");
    match def.parse_value(raw) {
        Ok(value) => out.options.push(legacy_opt(name, value)),
        Err(err) => debug!(param = name, %err, "dropping malformed legacy value"),
    }
}

/// Split `k:v` or `k=v` comma-separated pairs, first separator wins.
fn pairs(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(',').filter_map(|token| {
        let token = token.trim();
        token
            .split_once(':')
            .or_else(|| token.split_once('='))
            .map(|(k, v)| (k.trim(), v.trim()))
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// im.resize
// ─────────────────────────────────────────────────────────────────────────────

/// `mode` → canonical `fit` table.
fn map_resize_mode(mode: &str) -> Option<&'static str> {
    match mode.to_ascii_lowercase().as_str() {
        "fit" => Some("contain"),
        "stretch" => Some("scale-down"),
        "fill" => Some("cover"),
        "crop" => Some("crop"),
        "pad" => Some("pad"),
        _ => None,
    }
}

fn parse_resize(raw: &str, out: &mut ParseYield) {
    for (key, value) in pairs(raw) {
        match key.to_ascii_lowercase().as_str() {
            "width" => push_via_registry("width", value, out),
            "height" => push_via_registry("height", value, out),
            "mode" => match map_resize_mode(value) {
                Some(fit) => out.options.push(legacy_opt("fit", fit.into())),
                None => debug!(mode = value, "ignoring unknown im.resize mode"),
            },
            other => debug!(key = other, "ignoring unknown im.resize field"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// im.aspectCrop
// ─────────────────────────────────────────────────────────────────────────────

fn parse_aspect_crop(raw: &str, out: &mut ParseYield) {
    let mut aspect: Option<(f64, f64)> = None;
    let mut focal_x: Option<f64> = None;
    let mut focal_y: Option<f64> = None;
    let mut allow_expansion: Option<bool> = None;

    // Leading `(W,H)` ratio form.
    let rest = if let Some(stripped) = raw.trim().strip_prefix('(') {
        match stripped.split_once(')') {
            Some((ratio, rest)) => {
                aspect = parse_ratio_pair(ratio);
                rest.trim_start_matches(',')
            }
            None => {
                debug!(raw, "unterminated aspect ratio group");
                return;
            }
        }
    } else {
        raw
    };

    for (key, value) in pairs(rest) {
        match key.to_ascii_lowercase().as_str() {
            "width" => aspect = Some((value.parse().unwrap_or(0.0), aspect.map_or(0.0, |a| a.1))),
            "height" => aspect = Some((aspect.map_or(0.0, |a| a.0), value.parse().unwrap_or(0.0))),
            "xposition" => focal_x = value.parse().ok(),
            "yposition" => focal_y = value.parse().ok(),
            "allowexpansion" => allow_expansion = parse_loose_bool(value),
            other => debug!(key = other, "ignoring unknown im.aspectCrop field"),
        }
    }

    match aspect {
        Some((w, h)) if w > 0.0 && h > 0.0 => {
            out.options.push(legacy_opt(
                "aspect",
                OptionValue::Str(format!("{}:{}", trim_float(w), trim_float(h))),
            ));
        }
        _ => {
            debug!(raw, "im.aspectCrop without a usable ratio");
            return;
        }
    }

    if focal_x.is_some() || focal_y.is_some() {
        out.options.push(legacy_opt(
            "focal",
            OptionValue::Coord(focal_x.unwrap_or(0.5), focal_y.unwrap_or(0.5)),
        ));
    }
    out.options.push(legacy_opt("ctx", OptionValue::Bool(true)));
    if let Some(allow) = allow_expansion {
        out.options
            .push(legacy_opt("allowExpansion", OptionValue::Bool(allow)));
    }
}

fn parse_ratio_pair(raw: &str) -> Option<(f64, f64)> {
    let (w, h) = raw.split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn parse_loose_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn trim_float(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// im.composite / im.watermark
// ─────────────────────────────────────────────────────────────────────────────

/// Placement keyword → `(top, right, bottom, left)` offsets.
fn placement_offsets(keyword: &str, offset: f64) -> Option<[Option<f64>; 4]> {
    let (top, right, bottom, left) = match keyword.to_ascii_lowercase().as_str() {
        "north" | "top" => (Some(offset), None, None, None),
        "south" | "bottom" => (None, None, Some(offset), None),
        "east" | "right" => (None, Some(offset), None, None),
        "west" | "left" => (None, None, None, Some(offset)),
        "northeast" | "topright" => (Some(offset), Some(offset), None, None),
        "northwest" | "topleft" => (Some(offset), None, None, Some(offset)),
        "southeast" | "bottomright" => (None, Some(offset), Some(offset), None),
        "southwest" | "bottomleft" => (None, None, Some(offset), Some(offset)),
        "center" | "centre" => (None, None, None, None),
        _ => return None,
    };
    Some([top, right, bottom, left])
}

fn parse_composite(raw: &str) -> Option<OverlayDescriptor> {
    let mut overlay = OverlayDescriptor::default();
    let mut placement: Option<String> = None;
    let mut offset = DEFAULT_PLACEMENT_OFFSET;

    for (key, value) in pairs(raw) {
        match key.to_ascii_lowercase().as_str() {
            "url" | "image" => overlay.url = value.to_string(),
            "placement" => placement = Some(value.to_string()),
            "offset" => offset = value.parse().unwrap_or(DEFAULT_PLACEMENT_OFFSET),
            // Legacy opacity is 0–100; the primitive wants [0, 1].
            "opacity" => {
                overlay.opacity = value
                    .parse::<f64>()
                    .ok()
                    .map(|o| (o / 100.0).clamp(0.0, 1.0))
            }
            "width" => overlay.width = value.parse().ok(),
            "height" => overlay.height = value.parse().ok(),
            "fit" => overlay.fit = Some(value.to_string()),
            "background" => overlay.background = Some(value.to_string()),
            other => debug!(key = other, "ignoring unknown composite field"),
        }
    }

    if let Some(keyword) = placement {
        match placement_offsets(&keyword, offset) {
            Some([top, right, bottom, left]) => {
                overlay.top = top;
                overlay.right = right;
                overlay.bottom = bottom;
                overlay.left = left;
            }
            None => debug!(placement = keyword.as_str(), "ignoring unknown placement"),
        }
    }

    if overlay.url.is_empty() {
        debug!(raw, "dropping composite without a url");
        return None;
    }
    Some(overlay)
}

// ─────────────────────────────────────────────────────────────────────────────
// im.blur / im.mirror
// ─────────────────────────────────────────────────────────────────────────────

fn parse_blur(raw: &str, out: &mut ParseYield) {
    match raw.parse::<f64>() {
        // Legacy range 0–100 scales onto the primitive's 1–250.
        Ok(n) if (0.0..=100.0).contains(&n) => {
            out.options.push(legacy_opt(
                "blur",
                OptionValue::Number((n * 2.5).clamp(1.0, 250.0)),
            ));
        }
        _ => debug!(raw, "dropping im.blur outside 0-100"),
    }
}

fn parse_mirror(raw: &str, out: &mut ParseYield) {
    match raw.to_ascii_lowercase().as_str() {
        "horizontal" | "h" => out.options.push(legacy_opt("flop", OptionValue::Bool(true))),
        "vertical" | "v" => out.options.push(legacy_opt("flip", OptionValue::Bool(true))),
        other => debug!(raw = other, "ignoring unknown im.mirror direction"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// im.if-dimension
// ─────────────────────────────────────────────────────────────────────────────

/// `im.if-dimension=width>800,width=400` — the branch is stored and
/// evaluated only once intrinsic dimensions are known.
fn parse_if_dimension(raw: &str, out: &mut ParseYield) {
    let Some((condition, then_clause)) = raw.split_once(',') else {
        debug!(raw, "im.if-dimension without a then-clause");
        return;
    };

    let Some((property, op, value)) = parse_condition(condition) else {
        debug!(condition, "unparseable im.if-dimension condition");
        return;
    };

    let mut then = Vec::new();
    if let Some(resize) = then_clause.strip_prefix("im.resize=") {
        let mut nested = ParseYield::default();
        parse_resize(resize, &mut nested);
        then.extend(nested.options.into_iter().map(|o| (o.name, o.value)));
    } else {
        for (key, value) in pairs(then_clause) {
            let Some(def) = lookup(key) else {
                debug!(key, "unknown name in im.if-dimension then-clause");
                continue;
            };
            if let Ok(parsed) = def.parse_value(value) {
                then.push((def.name.to_string(), parsed));
            }
        }
    }

    if then.is_empty() {
        debug!(raw, "im.if-dimension with an empty then-clause");
        return;
    }

    out.conditionals.push(DimensionCondition {
        property,
        op,
        value,
        then,
    });
}

fn parse_condition(raw: &str) -> Option<(DimensionProperty, CompareOp, f64)> {
    let raw = raw.trim();
    let property_end = raw.find(|c: char| !c.is_ascii_alphabetic())?;
    let property = match raw[..property_end].to_ascii_lowercase().as_str() {
        "width" => DimensionProperty::Width,
        "height" => DimensionProperty::Height,
        "ratio" => DimensionProperty::Ratio,
        _ => return None,
    };

    let rest = raw[property_end..].trim_start();
    let op_len = if rest.starts_with("<=") || rest.starts_with(">=") || rest.starts_with("==") {
        2
    } else {
        1
    };
    let op = CompareOp::from_symbol(&rest[..op_len])?;
    let value: f64 = rest[op_len..].trim().parse().ok()?;
    Some((property, op, value))
}

// ─────────────────────────────────────────────────────────────────────────────
// im= bundle
// ─────────────────────────────────────────────────────────────────────────────

/// `im=f=xl,r=16:9,p=0.3,0.7,s=true` — sub-parameters extracted recursively.
/// The focal pair is lifted out first because its value contains the token
/// separator.
fn parse_bundle(raw: &str, out: &mut ParseYield) {
    let mut remainder = raw.to_string();

    // p=x,y
    if let Some(idx) = remainder.find("p=") {
        let after = &remainder[idx + 2..];
        let end = after
            .match_indices(',')
            .nth(1)
            .map(|(i, _)| i)
            .unwrap_or(after.len());
        let coord = after[..end].to_string();
        let focal_def = lookup("focal").expect("focal is registered");
        if let Ok(value) = focal_def.parse_value(&coord) {
            out.options.push(legacy_opt("focal", value));
        }
        remainder.replace_range(idx..idx + 2 + end, "");
    }

    for token in remainder.split(',') {
        let Some((key, value)) = token.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "f" => out
                .options
                .push(legacy_opt("f", OptionValue::Str(value.trim().to_string()))),
            "r" => out.options.push(legacy_opt(
                "aspect",
                OptionValue::Str(value.trim().to_string()),
            )),
            "s" | "smart" => {
                if let Some(b) = parse_loose_bool(value.trim()) {
                    out.options.push(legacy_opt("ctx", OptionValue::Bool(b)));
                }
            }
            other => debug!(key = other, "ignoring unknown im bundle field"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> ParseYield {
        AkamaiParser::new(true).parse(&RequestFacts::new("/img.jpg", Some(query)))
    }

    fn value_of<'a>(out: &'a ParseYield, name: &str) -> &'a OptionValue {
        &out.options
            .iter()
            .find(|o| o.name == name)
            .unwrap_or_else(|| panic!("no '{name}' tuple"))
            .value
    }

    #[test]
    fn resize_translates_dimensions_and_mode() {
        let out = parse("im.resize=width:800,height:600,mode:fit");
        assert_eq!(value_of(&out, "width"), &OptionValue::Number(800.0));
        assert_eq!(value_of(&out, "height"), &OptionValue::Number(600.0));
        assert_eq!(value_of(&out, "fit"), &OptionValue::Str("contain".into()));
    }

    #[test]
    fn resize_mode_table_is_complete() {
        assert_eq!(map_resize_mode("fit"), Some("contain"));
        assert_eq!(map_resize_mode("stretch"), Some("scale-down"));
        assert_eq!(map_resize_mode("fill"), Some("cover"));
        assert_eq!(map_resize_mode("crop"), Some("crop"));
        assert_eq!(map_resize_mode("pad"), Some("pad"));
        assert_eq!(map_resize_mode("zoom"), None);
    }

    #[test]
    fn aspect_crop_sets_aspect_focal_and_ctx() {
        let out = parse("im.aspectCrop=(16,9),xPosition=.3,yPosition=.7");
        assert_eq!(value_of(&out, "aspect"), &OptionValue::Str("16:9".into()));
        assert_eq!(value_of(&out, "focal"), &OptionValue::Coord(0.3, 0.7));
        assert_eq!(value_of(&out, "ctx"), &OptionValue::Bool(true));
    }

    #[test]
    fn aspect_crop_allow_expansion_is_carried() {
        let out = parse("im.aspectCrop=(4,3),AllowExpansion=true");
        assert_eq!(value_of(&out, "allowExpansion"), &OptionValue::Bool(true));
    }

    #[test]
    fn composite_builds_a_placed_overlay() {
        let out = parse("im.composite=url:https://cdn/x.png,placement:southeast,opacity:50,offset:10");
        let overlays = value_of(&out, "draw").as_overlays().unwrap();
        assert_eq!(overlays.len(), 1);
        let o = &overlays[0];
        assert_eq!(o.url, "https://cdn/x.png");
        assert_eq!(o.bottom, Some(10.0));
        assert_eq!(o.right, Some(10.0));
        assert_eq!(o.top, None);
        assert_eq!(o.opacity, Some(0.5));
    }

    #[test]
    fn placement_defaults_to_the_standard_offset() {
        let out = parse("im.watermark=url:https://cdn/w.png,placement:north");
        let o = &value_of(&out, "draw").as_overlays().unwrap()[0];
        assert_eq!(o.top, Some(DEFAULT_PLACEMENT_OFFSET));
        assert_eq!(o.bottom, None);
    }

    #[test]
    fn multiple_composites_share_one_draw_tuple() {
        let out = parse("im.composite=url:https://a/1.png&im.composite=url:https://a/2.png");
        let overlays = value_of(&out, "draw").as_overlays().unwrap();
        assert_eq!(overlays.len(), 2);
    }

    #[test]
    fn blur_scales_to_primitive_range() {
        assert_eq!(value_of(&parse("im.blur=100"), "blur"), &OptionValue::Number(250.0));
        assert_eq!(value_of(&parse("im.blur=0"), "blur"), &OptionValue::Number(1.0));
        assert_eq!(value_of(&parse("im.blur=40"), "blur"), &OptionValue::Number(100.0));
        assert!(parse("im.blur=500").options.is_empty());
    }

    #[test]
    fn mirror_maps_to_flip_and_flop() {
        assert_eq!(value_of(&parse("im.mirror=horizontal"), "flop"), &OptionValue::Bool(true));
        assert_eq!(value_of(&parse("im.mirror=v"), "flip"), &OptionValue::Bool(true));
    }

    #[test]
    fn imwidth_accepts_numbers_and_size_codes() {
        assert_eq!(
            value_of(&parse("imwidth=800"), "imwidth"),
            &OptionValue::Number(800.0)
        );
        assert_eq!(
            value_of(&parse("imwidth=xl"), "imwidth"),
            &OptionValue::Str("xl".into())
        );
    }

    #[test]
    fn impolicy_becomes_a_derivative() {
        assert_eq!(
            value_of(&parse("impolicy=hero"), "derivative"),
            &OptionValue::Str("hero".into())
        );
    }

    #[test]
    fn if_dimension_is_deferred_not_applied() {
        let out = parse("im.if-dimension=width>800,width=400");
        assert!(out.options.is_empty());
        assert_eq!(out.conditionals.len(), 1);
        let c = &out.conditionals[0];
        assert_eq!(c.property, DimensionProperty::Width);
        assert_eq!(c.op, CompareOp::Gt);
        assert_eq!(c.value, 800.0);
        assert_eq!(c.then, vec![("width".to_string(), OptionValue::Number(400.0))]);
    }

    #[test]
    fn if_dimension_accepts_nested_resize() {
        let out = parse("im.if-dimension=ratio>=1.5,im.resize=width:400,mode:fill");
        let c = &out.conditionals[0];
        assert_eq!(c.then.len(), 2);
        assert_eq!(c.then[1], ("fit".to_string(), OptionValue::Str("cover".into())));
    }

    #[test]
    fn advanced_forms_respect_the_flag() {
        let basic = AkamaiParser::new(false)
            .parse(&RequestFacts::new("/i.jpg", Some("im.if-dimension=width>800,width=400")));
        assert!(basic.conditionals.is_empty());
        let basic = AkamaiParser::new(false)
            .parse(&RequestFacts::new("/i.jpg", Some("im.composite=url:https://a/1.png")));
        assert!(basic.options.is_empty());
    }

    #[test]
    fn bundle_extracts_sub_parameters() {
        let out = parse("im=f=xl,r=16-9,p=0.3,0.7");
        assert_eq!(value_of(&out, "f"), &OptionValue::Str("xl".into()));
        assert_eq!(value_of(&out, "aspect"), &OptionValue::Str("16-9".into()));
        assert_eq!(value_of(&out, "focal"), &OptionValue::Coord(0.3, 0.7));
    }
}
