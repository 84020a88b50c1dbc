//! Client signal detector.
//!
//! Parses request headers — user agent, `Accept`, `Sec-CH-*` client hints,
//! `Save-Data`, network hints, device hints — into a
//! [`ClientCapabilities`] record and a [`PerformanceBudget`]. The detector
//! only *suggests*: the processor's explicit flags always win, and the
//! orchestrator applies suggestions strictly gap-filling.
//!
//! Detection runs at most once per request; the result is memoized on the
//! request context.

use axum::http::HeaderMap;
use refract_kernel::client::{
    ClientCapabilities, DeviceClass, NetworkQuality, PerformanceBudget, format_support,
};
use refract_kernel::config::{DetectorSettings, TransformSettings};

pub struct ClientDetector {
    settings: DetectorSettings,
}

impl ClientDetector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self { settings }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Parse request headers into a capability record.
    pub fn detect(&self, headers: &HeaderMap) -> ClientCapabilities {
        let accept = header(headers, "accept").unwrap_or_default();
        let ua = header(headers, "user-agent").unwrap_or_default();

        let (brand, major) = parse_user_agent(&ua);
        let (ua_webp, ua_avif) = brand
            .as_deref()
            .map(|b| format_support(b, major))
            .unwrap_or((false, false));

        let accepts_webp = accept.contains("image/webp") || ua_webp;
        let accepts_avif = accept.contains("image/avif") || ua_avif;

        let mobile = header(headers, "sec-ch-ua-mobile").is_some_and(|v| v.contains("?1"))
            || header(headers, "cf-device-type").is_some_and(|v| v.eq_ignore_ascii_case("mobile"))
            || ua.to_ascii_lowercase().contains("mobile");

        // The cap itself is clamped into [1, 3] first so the range below
        // can never invert, whatever the configuration says.
        let dpr_cap = self.settings.max_dpr.clamp(1.0, 3.0);
        let dpr = header(headers, "sec-ch-dpr")
            .or_else(|| header(headers, "dpr"))
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(1.0)
            .clamp(1.0, dpr_cap);

        let viewport_width = header(headers, "sec-ch-viewport-width")
            .or_else(|| header(headers, "viewport-width"))
            .and_then(|v| v.parse::<u32>().ok());

        let save_data = header(headers, "save-data").is_some_and(|v| v.eq_ignore_ascii_case("on"));

        ClientCapabilities {
            device_class: detect_device_class(headers, mobile),
            network: detect_network(headers),
            accepts_webp,
            accepts_avif,
            dpr,
            viewport_width,
            save_data,
            mobile,
            brand,
        }
    }

    /// Derive quality and size ceilings from the capability record.
    pub fn budget(
        &self,
        caps: &ClientCapabilities,
        transform: &TransformSettings,
    ) -> PerformanceBudget {
        let (quality_min, quality_max, mut quality_target): (u8, u8, u8) = match caps.network {
            NetworkQuality::Fast => (60, 90, 85),
            NetworkQuality::Medium => (50, 85, 75),
            NetworkQuality::Slow => (40, 75, 60),
        };
        if caps.device_class == DeviceClass::LowEnd {
            quality_target = quality_target.saturating_sub(10).max(quality_min);
        }

        let (mut max_width, mut max_height) = match caps.device_class {
            DeviceClass::HighEnd => (4000, 4000),
            DeviceClass::MidRange => (2000, 2000),
            DeviceClass::LowEnd => (1280, 1280),
        };

        let mut preferred_format = if caps.accepts_avif {
            Some("avif".to_string())
        } else if caps.accepts_webp {
            Some("webp".to_string())
        } else {
            None
        };

        // Save-Data caps quality and steps down from the heaviest encode.
        if caps.save_data {
            quality_target = quality_target.min(60);
            max_width = max_width.min(1280);
            max_height = max_height.min(1280);
            if preferred_format.as_deref() == Some("avif") && caps.accepts_webp {
                preferred_format = Some("webp".to_string());
            }
        }

        // Per-format configured quality overrides the network-derived target.
        if let Some(format) = &preferred_format {
            if let Some(q) = transform.format_quality.get(format) {
                quality_target = (*q).min(quality_max);
            }
        }

        PerformanceBudget {
            quality_min,
            quality_max,
            quality_target,
            max_width,
            max_height,
            preferred_format,
            dpr: caps.dpr,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Header parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Brand and major version from the user agent. Order matters: Chrome's UA
/// contains "Safari", Edge's contains "Chrome", Opera's contains both.
fn parse_user_agent(ua: &str) -> (Option<String>, u32) {
    let lower = ua.to_ascii_lowercase();
    let probes: &[(&str, &str)] = &[
        ("edg/", "edge"),
        ("opr/", "opera"),
        ("samsungbrowser/", "samsung"),
        ("chrome/", "chrome"),
        ("firefox/", "firefox"),
        ("version/", "safari"),
    ];
    for (marker, brand) in probes {
        if let Some(idx) = lower.find(marker) {
            if *brand == "safari" && !lower.contains("safari") {
                continue;
            }
            let major = lower[idx + marker.len()..]
                .split(|c: char| !c.is_ascii_digit())
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            return (Some(brand.to_string()), major);
        }
    }
    (None, 0)
}

fn detect_network(headers: &HeaderMap) -> NetworkQuality {
    if let Some(ect) = header(headers, "ect") {
        return match ect.as_str() {
            "slow-2g" | "2g" => NetworkQuality::Slow,
            "3g" => NetworkQuality::Medium,
            _ => NetworkQuality::Fast,
        };
    }
    if let Some(downlink) = header(headers, "downlink").and_then(|v| v.parse::<f64>().ok()) {
        return if downlink >= 5.0 {
            NetworkQuality::Fast
        } else if downlink >= 1.5 {
            NetworkQuality::Medium
        } else {
            NetworkQuality::Slow
        };
    }
    if let Some(rtt) = header(headers, "rtt").and_then(|v| v.parse::<u32>().ok()) {
        return if rtt < 100 {
            NetworkQuality::Fast
        } else if rtt < 400 {
            NetworkQuality::Medium
        } else {
            NetworkQuality::Slow
        };
    }
    NetworkQuality::Medium
}

fn detect_device_class(headers: &HeaderMap, mobile: bool) -> DeviceClass {
    let memory = header(headers, "device-memory").and_then(|v| v.parse::<f64>().ok());
    let cores = header(headers, "hardware-concurrency").and_then(|v| v.parse::<u32>().ok());

    match (memory, cores) {
        (Some(m), _) if m >= 8.0 => DeviceClass::HighEnd,
        (Some(m), _) if m >= 4.0 => DeviceClass::MidRange,
        (Some(_), _) => DeviceClass::LowEnd,
        (None, Some(c)) if c >= 8 => DeviceClass::HighEnd,
        (None, Some(c)) if c >= 4 => DeviceClass::MidRange,
        (None, Some(_)) => DeviceClass::LowEnd,
        (None, None) if mobile => DeviceClass::MidRange,
        (None, None) => DeviceClass::MidRange,
    }
}

// =============================================================================
// Tests
// =============================================================================
