//! The request view parsers consume.
//!
//! [`RequestFacts`] is built once per request from the raw path and query
//! string: query pairs are percent-decoded in order, underscore path
//! segments are extracted, and the cleaned path (what routing and storage
//! see) is precomputed. Parsers never touch the raw HTTP request.

use percent_encoding::percent_decode_str;
use std::borrow::Cow;

#[derive(Debug, Clone, Default)]
pub struct RequestFacts {
    /// Path as received, percent-decoded per segment.
    pub raw_path: String,
    /// Path with `_key=value` segments removed — the logical source path.
    pub clean_path: String,
    /// Extracted `(key, value)` pairs from underscore path segments, in
    /// path order.
    pub path_params: Vec<(String, String)>,
    /// Decoded query pairs in query order. Repeated keys are preserved.
    pub query: Vec<(String, String)>,
    /// The query string as received (fingerprinting wants the raw form).
    pub raw_query: String,
}

impl RequestFacts {
    /// Decompose `path` and an optional raw query string.
    pub fn new(path: &str, query: Option<&str>) -> Self {
        let mut clean_segments: Vec<Cow<'_, str>> = Vec::new();
        let mut path_params = Vec::new();

        for segment in path.split('/') {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            if let Some(rest) = decoded.strip_prefix('_') {
                if let Some((key, value)) = rest.split_once('=') {
                    if !key.is_empty() {
                        path_params.push((key.to_string(), value.to_string()));
                        continue;
                    }
                }
            }
            clean_segments.push(decoded);
        }

        let clean_path = normalize_path(&clean_segments.join("/"));

        let raw_query = query.unwrap_or_default().to_string();
        let query = url::form_urlencoded::parse(raw_query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Self {
            raw_path: path.to_string(),
            clean_path,
            path_params,
            query,
            raw_query,
        }
    }

    /// First value for a query key, if present.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_query_key(&self, key: &str) -> bool {
        self.query.iter().any(|(k, _)| k == key)
    }

    /// `debug=true` diagnostics toggle.
    pub fn debug_requested(&self) -> bool {
        self.query_value("debug")
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
    }
}

/// Collapse duplicate slashes and guarantee a leading slash.
fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_pairs_in_order() {
        let req = RequestFacts::new("/img.jpg", Some("width=300&quality=80"));
        assert_eq!(req.query_value("width"), Some("300"));
        assert_eq!(req.query_value("quality"), Some("80"));
        assert_eq!(req.query.len(), 2);
    }

    #[test]
    fn extracts_underscore_segments_and_cleans_path() {
        let req = RequestFacts::new("/_width=300/_quality=80/photo.jpg", None);
        assert_eq!(
            req.path_params,
            vec![
                ("width".to_string(), "300".to_string()),
                ("quality".to_string(), "80".to_string())
            ]
        );
        assert_eq!(req.clean_path, "/photo.jpg");
    }

    #[test]
    fn underscore_segment_without_equals_stays_in_path() {
        let req = RequestFacts::new("/_thumbs/photo.jpg", None);
        assert!(req.path_params.is_empty());
        assert_eq!(req.clean_path, "/_thumbs/photo.jpg");
    }

    #[test]
    fn percent_encoding_is_decoded() {
        let req = RequestFacts::new("/a%20b/img.jpg", Some("background=%23fff"));
        assert_eq!(req.clean_path, "/a b/img.jpg");
        assert_eq!(req.query_value("background"), Some("#fff"));
    }

    #[test]
    fn duplicate_slashes_collapse() {
        let req = RequestFacts::new("//images///img.jpg", None);
        assert_eq!(req.clean_path, "/images/img.jpg");
    }

    #[test]
    fn debug_toggle_accepts_true_and_one() {
        assert!(RequestFacts::new("/i.jpg", Some("debug=true")).debug_requested());
        assert!(RequestFacts::new("/i.jpg", Some("debug=1")).debug_requested());
        assert!(!RequestFacts::new("/i.jpg", Some("debug=off")).debug_requested());
        assert!(!RequestFacts::new("/i.jpg", None).debug_requested());
    }
}
