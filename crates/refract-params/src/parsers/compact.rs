//! Compact query parser: short aliases.
//!
//! Recognizes the shorthand family: `w`/`h` dimensions, `r` aspect ratio
//! (dash or colon form), `p` focal point, `f` size code, `s`/`smart` context
//! toggle, plus every other registered alias (`q`, `g`, `bg`, `d`). Values
//! are coerced through the registry entry of the canonical name they resolve
//! to; the size-code and aspect rewrites happen later in the processor.

use super::{ParamParser, ParseYield};
use crate::request::RequestFacts;
use refract_kernel::params::{ParamSource, TransformOption, lookup};
use tracing::debug;

/// Does the compact parser own this query key?
///
/// True for registered aliases and for the size-code shorthand `f` (whose
/// canonical entry *is* single-letter).
pub fn claims(key: &str) -> bool {
    if key == "f" {
        return true;
    }
    lookup(key).is_some_and(|def| def.name != key)
}

pub struct CompactQueryParser;

impl ParamParser for CompactQueryParser {
    fn name(&self) -> &'static str {
        "compact-query"
    }

    fn parse(&self, req: &RequestFacts) -> ParseYield {
        let mut out = ParseYield::default();

        for (key, value) in &req.query {
            if !claims(key) {
                continue;
            }
            let def = lookup(key).expect("claimed key has a registry entry");
            match def.parse_value(value) {
                Ok(parsed) => {
                    out.options.push(
                        TransformOption::new(def.name, parsed, ParamSource::Compact)
                            .with_priority(ParamSource::Compact.base_priority() + def.priority),
                    );
                }
                Err(err) => {
                    debug!(param = key.as_str(), %err, "dropping malformed compact value");
                }
            }
        }

        out
    }
}

// =============================================================================
// Tests
// =============================================================================
