//! Whole-registry properties of the resolution engine.
//!
//! These tests sweep the parameter registry itself, so adding a new entry
//! automatically extends the coverage: every canonical parameter must
//! survive a parse→process round trip, and every alias must collapse onto
//! its canonical name.

use refract_kernel::config::{FeatureFlags, TransformSettings};
use refract_kernel::params::{OptionValue, ParamKind, REGISTRY};
use refract_params::parsers::parse_request;
use refract_params::processor::ParamProcessor;
use refract_params::request::RequestFacts;

fn resolve(query: &str) -> refract_kernel::params::ResolvedOptions {
    let req = RequestFacts::new("/img.jpg", Some(query));
    ParamProcessor::new(&TransformSettings::default())
        .process(parse_request(&req, &FeatureFlags::default()))
}

/// A representative valid raw value for each registry entry.
fn sample_value(def: &refract_kernel::params::ParamDef) -> &'static str {
    match def.kind {
        ParamKind::Number | ParamKind::AutoOrNumber | ParamKind::NumberOrSizeCode => {
            match def.name {
                "dpr" => "2",
                "blur" => "50",
                "brightness" | "contrast" | "saturation" | "sharpen" => "1.5",
                _ => "80",
            }
        }
        ParamKind::Boolean => "true",
        ParamKind::String => match def.name {
            "aspect" => "16:9",
            "background" => "#ffffff",
            "gravity" => "auto",
            _ => "value",
        },
        ParamKind::Enum => def.allowed[0],
        ParamKind::SizeCode => "m",
        ParamKind::Coordinate => "0.5,0.5",
    }
}

/// The canonical name the processed map is expected to hold for an entry
/// (a few entries are rewritten by strategies).
fn expected_output_name(name: &str) -> &str {
    match name {
        "f" | "imwidth" => "width",
        "imheight" => "height",
        _ => name,
    }
}

#[test]
fn every_canonical_parameter_round_trips_through_the_engine() {
    for def in REGISTRY {
        let raw = sample_value(def);
        let out = resolve(&format!("{}={raw}", def.name));
        let expected = expected_output_name(def.name);
        assert!(
            out.map.contains(expected),
            "'{}={raw}' did not produce '{expected}': {:?}",
            def.name,
            out.map
        );
    }
}

#[test]
fn every_alias_resolves_to_its_canonical_name() {
    for def in REGISTRY {
        for alias in def.aliases {
            let raw = sample_value(def);
            let out = resolve(&format!("{alias}={raw}"));
            let expected = expected_output_name(def.name);
            assert!(
                out.map.contains(expected),
                "alias '{alias}={raw}' did not produce '{expected}': {:?}",
                out.map
            );
            // Exactly one value for the canonical name; the alias itself
            // never leaks into the map.
            assert!(*alias == expected || !out.map.contains(*alias));
        }
    }
}

#[test]
fn canonical_and_alias_together_yield_exactly_one_tuple() {
    for def in REGISTRY {
        for alias in def.aliases {
            let raw = sample_value(def);
            let out = resolve(&format!("{}={raw}&{alias}={raw}", def.name));
            assert_eq!(
                out.discarded.len(),
                1,
                "'{}' + '{alias}' should discard exactly one tuple",
                def.name
            );
        }
    }
}

#[test]
fn formatters_are_applied_on_the_way_out() {
    // Spot checks that the final map holds post-formatter values.
    assert_eq!(resolve("fit=COVER").map.fit(), Some("cover"));
    assert_eq!(
        resolve("gravity=southwest").map.string("gravity"),
        Some("bottom-left")
    );
    assert_eq!(
        resolve("rotate=180").map.get("rotate"),
        Some(&OptionValue::Number(180.0))
    );
    assert_eq!(resolve("r=4-3").map.string("aspect"), Some("4:3"));
}

#[test]
fn size_code_table_is_fully_reachable_via_f() {
    for (code, width) in refract_kernel::params::size_codes::SIZE_CODES {
        let out = resolve(&format!("f={code}"));
        assert_eq!(
            out.map.width(),
            Some(*width),
            "size code '{code}' should resolve to {width}"
        );
        assert!(!out.map.contains("f"));
        assert!(out.explicit_width);
    }
}
