//! Path segment parser: underscore-prefixed `_key=value` segments.
//!
//! Segments like `/_width=300/_quality=80/img.jpg` carry transform options
//! in the path itself. Extraction (and removal from the routed path) already
//! happened in [`RequestFacts`]; this parser types the extracted pairs.
//! Path tuples take the `Path` base priority, which sits above every query
//! source — path beats query.

use super::{ParamParser, ParseYield};
use crate::request::RequestFacts;
use refract_kernel::params::{ParamSource, TransformOption, lookup};
use tracing::debug;

pub struct PathSegmentParser;

impl ParamParser for PathSegmentParser {
    fn name(&self) -> &'static str {
        "path-segment"
    }

    fn parse(&self, req: &RequestFacts) -> ParseYield {
        let mut out = ParseYield::default();

        for (key, value) in &req.path_params {
            let Some(def) = lookup(key) else {
                debug!(param = key.as_str(), "ignoring unknown path segment key");
                continue;
            };
            match def.parse_value(value) {
                Ok(parsed) => {
                    out.options.push(
                        TransformOption::new(def.name, parsed, ParamSource::Path)
                            .with_priority(ParamSource::Path.base_priority() + def.priority),
                    );
                }
                Err(err) => {
                    debug!(param = key.as_str(), %err, "dropping malformed path segment value");
                }
            }
        }

        out
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use refract_kernel::params::OptionValue;

    fn parse(path: &str) -> ParseYield {
        PathSegmentParser.parse(&RequestFacts::new(path, None))
    }

    #[test]
    fn segments_become_path_tuples() {
        let out = parse("/_width=300/_quality=80/photo.jpg");
        assert_eq!(out.options.len(), 2);
        assert_eq!(out.options[0].name, "width");
        assert_eq!(out.options[0].source, ParamSource::Path);
        assert_eq!(out.options[1].name, "quality");
        assert_eq!(out.options[1].value, OptionValue::Number(80.0));
    }

    #[test]
    fn path_tuples_outrank_query_tuples() {
        let out = parse("/_quality=80/photo.jpg");
        assert!(out.options[0].priority > ParamSource::Canonical.base_priority());
    }

    #[test]
    fn aliases_work_in_segments_too() {
        let out = parse("/_w=300/photo.jpg");
        assert_eq!(out.options[0].name, "width");
    }

    #[test]
    fn unknown_keys_are_skipped() {
        assert!(parse("/_zoom=300/photo.jpg").options.is_empty());
    }

    #[test]
    fn malformed_values_are_dropped() {
        assert!(parse("/_width=huge/photo.jpg").options.is_empty());
    }
}
