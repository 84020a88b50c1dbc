//! Client capability types.
//!
//! The gateway's signal detector parses request headers into a
//! [`ClientCapabilities`] record and derives a [`PerformanceBudget`] from it.
//! These are *suggestions*: the parameter processor's explicit-dimension
//! flags always win. The types live in the kernel so the orchestrator and
//! detector share one vocabulary without a crate cycle.

use serde::Serialize;

// ─────────────────────────────────────────────────────────────────────────────
// Capability record
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    HighEnd,
    #[default]
    MidRange,
    LowEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Fast,
    #[default]
    Medium,
    Slow,
}

/// What the requesting client can display and how much it can afford.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientCapabilities {
    pub device_class: DeviceClass,
    pub network: NetworkQuality,
    pub accepts_webp: bool,
    pub accepts_avif: bool,
    /// Effective device pixel ratio, capped at 3.
    pub dpr: f64,
    /// `Sec-CH-Viewport-Width` when present.
    pub viewport_width: Option<u32>,
    pub save_data: bool,
    pub mobile: bool,
    /// Browser brand parsed from the user agent, when recognized.
    pub brand: Option<String>,
}

impl Default for ClientCapabilities {
    fn default() -> Self {
        Self {
            device_class: DeviceClass::default(),
            network: NetworkQuality::default(),
            accepts_webp: false,
            accepts_avif: false,
            dpr: 1.0,
            viewport_width: None,
            save_data: false,
            mobile: false,
            brand: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Performance budget
// ─────────────────────────────────────────────────────────────────────────────

/// Quality and size ceilings derived from the capability record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceBudget {
    pub quality_min: u8,
    pub quality_max: u8,
    pub quality_target: u8,
    pub max_width: u32,
    pub max_height: u32,
    /// Output format the detector suggests when the user did not pick one.
    pub preferred_format: Option<String>,
    /// Effective DPR after the cap.
    pub dpr: f64,
}

impl Default for PerformanceBudget {
    fn default() -> Self {
        Self {
            quality_min: 40,
            quality_max: 90,
            quality_target: 75,
            max_width: 2000,
            max_height: 2000,
            preferred_format: None,
            dpr: 1.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Browser format support
// ─────────────────────────────────────────────────────────────────────────────

/// `(brand, min_major_version, webp, avif)` — the build-time support table
/// consulted when `Accept` is silent about a format.
pub static BROWSER_FORMAT_SUPPORT: &[(&str, u32, bool, bool)] = &[
    ("chrome", 32, true, false),
    ("chrome", 85, true, true),
    ("edge", 18, true, false),
    ("edge", 121, true, true),
    ("firefox", 65, true, false),
    ("firefox", 93, true, true),
    ("safari", 14, true, false),
    ("safari", 16, true, true),
    ("opera", 19, true, false),
    ("opera", 71, true, true),
    ("samsung", 4, true, false),
    ("samsung", 14, true, true),
];

/// Look up `(webp, avif)` support for a browser brand and major version.
///
/// Rows are ordered oldest-first per brand; the newest row at or below the
/// requested version wins. Unknown brands support neither.
pub fn format_support(brand: &str, major: u32) -> (bool, bool) {
    let brand = brand.to_ascii_lowercase();
    let mut support = (false, false);
    for (b, min, webp, avif) in BROWSER_FORMAT_SUPPORT {
        if *b == brand && major >= *min {
            support = (*webp, *avif);
        }
    }
    support
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_matching_row_wins() {
        assert_eq!(format_support("chrome", 90), (true, true));
        assert_eq!(format_support("chrome", 50), (true, false));
        assert_eq!(format_support("chrome", 20), (false, false));
    }

    #[test]
    fn unknown_brand_supports_nothing() {
        assert_eq!(format_support("netscape", 999), (false, false));
    }

    #[test]
    fn brand_lookup_is_case_insensitive() {
        assert_eq!(format_support("Safari", 16), (true, true));
    }

    #[test]
    fn support_rows_are_ordered_oldest_first_per_brand() {
        let mut last: std::collections::HashMap<&str, u32> = Default::default();
        for (brand, min, _, _) in BROWSER_FORMAT_SUPPORT {
            if let Some(prev) = last.insert(brand, *min) {
                assert!(prev < *min, "rows for '{brand}' out of order");
            }
        }
    }
}
