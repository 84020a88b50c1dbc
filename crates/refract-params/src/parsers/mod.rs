//! The four URL-syntax parsers and the factory that selects them.
//!
//! Each parser has one contract: given the request view, emit a (possibly
//! empty) list of `(name, value, source, priority)` tuples — plus, for the
//! legacy parser, pending dimension conditionals. Parsers only *extract*;
//! reconciliation, validation, and special-case rewrites belong to the
//! processor.
//!
//! [`active_parsers`] inspects the request once and returns only the parsers
//! whose trigger syntax is actually present, so a plain `?width=300` request
//! never pays for legacy parsing.

pub mod akamai;
pub mod canonical;
pub mod compact;
pub mod path;

pub use akamai::AkamaiParser;
pub use canonical::CanonicalQueryParser;
pub use compact::CompactQueryParser;
pub use path::PathSegmentParser;

use crate::request::RequestFacts;
use refract_kernel::config::FeatureFlags;
use refract_kernel::params::{DimensionCondition, TransformOption, lookup};

/// What one parser extracted from the request.
#[derive(Debug, Default)]
pub struct ParseYield {
    pub options: Vec<TransformOption>,
    /// Deferred `im.if-dimension` branches (legacy parser only).
    pub conditionals: Vec<DimensionCondition>,
}

impl ParseYield {
    /// Concatenate another yield into this one.
    pub fn extend(&mut self, other: ParseYield) {
        self.options.extend(other.options);
        self.conditionals.extend(other.conditionals);
    }
}

/// A source-specific parameter extractor.
pub trait ParamParser: Send + Sync {
    /// Stable identifier used in logs and breadcrumbs.
    fn name(&self) -> &'static str;

    fn parse(&self, req: &RequestFacts) -> ParseYield;
}

/// Inspect the request once and return the parsers whose triggers are
/// present.
pub fn active_parsers(req: &RequestFacts, features: &FeatureFlags) -> Vec<Box<dyn ParamParser>> {
    let mut parsers: Vec<Box<dyn ParamParser>> = Vec::with_capacity(4);

    let mut canonical = false;
    let mut compact = false;
    let mut legacy = false;

    for (key, _) in &req.query {
        if key == "debug" {
            continue;
        }
        if key == "im"
            || key.starts_with("im.")
            || matches!(key.as_str(), "imwidth" | "imheight" | "impolicy")
        {
            legacy = true;
        } else if compact::claims(key) {
            compact = true;
        } else {
            // Canonical names and unknown passthrough keys alike.
            canonical = true;
        }
    }

    if canonical {
        parsers.push(Box::new(CanonicalQueryParser));
    }
    if compact {
        parsers.push(Box::new(CompactQueryParser));
    }
    if !req.path_params.is_empty() {
        parsers.push(Box::new(PathSegmentParser));
    }
    if legacy && features.legacy_compat {
        parsers.push(Box::new(AkamaiParser::new(features.legacy_advanced)));
    }

    parsers
}

/// Run every active parser and merge the yields.
pub fn parse_request(req: &RequestFacts, features: &FeatureFlags) -> ParseYield {
    let mut merged = ParseYield::default();
    for parser in active_parsers(req, features) {
        let parsed = parser.parse(req);
        tracing::trace!(
            parser = parser.name(),
            tuples = parsed.options.len(),
            "parser yield"
        );
        merged.extend(parsed);
    }
    merged
}

/// Shared helper: is this key the canonical registry name (not an alias)?
pub(crate) fn is_canonical_name(key: &str) -> bool {
    lookup(key).is_some_and(|def| def.name == key)
}

// =============================================================================
// Tests
// =============================================================================
