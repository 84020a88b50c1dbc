//! Canonical query parser: full parameter names in the query string.

use super::{ParamParser, ParseYield, is_canonical_name};
use crate::request::RequestFacts;
use refract_kernel::params::{OptionValue, ParamSource, TransformOption, lookup};
use tracing::debug;

/// Priority assigned to unknown passthrough keys. Low enough that any
/// recognized syntax for the same name wins.
pub const PASSTHROUGH_PRIORITY: u8 = 5;

/// Recognizes full canonical names (`width`, `height`, `format`, `quality`,
/// `fit`, `gravity`, `background`, ...) as query parameters. Unknown names
/// pass through at [`PASSTHROUGH_PRIORITY`] so downstream stages may still
/// use them.
pub struct CanonicalQueryParser;

impl ParamParser for CanonicalQueryParser {
    fn name(&self) -> &'static str {
        "canonical-query"
    }

    fn parse(&self, req: &RequestFacts) -> ParseYield {
        let mut out = ParseYield::default();

        for (key, value) in &req.query {
            if key == "debug"
                || key == "im"
                || key.starts_with("im.")
                || matches!(key.as_str(), "imwidth" | "imheight" | "impolicy")
            {
                continue;
            }
            if super::compact::claims(key) {
                continue;
            }

            if is_canonical_name(key) {
                let def = lookup(key).expect("canonical name has a registry entry");
                match def.parse_value(value) {
                    Ok(parsed) => {
                        let opt = TransformOption::new(def.name, parsed, ParamSource::Canonical)
                            .with_priority(
                                ParamSource::Canonical.base_priority() + def.priority,
                            );
                        out.options.push(opt);
                    }
                    Err(err) => {
                        debug!(param = key.as_str(), %err, "dropping malformed canonical value");
                    }
                }
            } else if lookup(key).is_none() {
                // Unknown name: preserve at low priority.
                out.options.push(
                    TransformOption::new(
                        key.clone(),
                        OptionValue::Str(value.clone()),
                        ParamSource::Canonical,
                    )
                    .with_priority(PASSTHROUGH_PRIORITY),
                );
            }
        }

        out
    }
}

// =============================================================================
// Tests
// =============================================================================
