//! Symbolic size codes.
//!
//! The compact `f` parameter (and legacy `imwidth`) accept symbolic codes
//! instead of pixel widths. The table is a closed enumeration: unknown codes
//! are discarded by the processor with a warning, never guessed.

/// `(code, width_px)` pairs, smallest to largest.
pub static SIZE_CODES: &[(&str, u32)] = &[
    ("xxu", 40),
    ("xu", 80),
    ("u", 160),
    ("xxxs", 300),
    ("xxs", 400),
    ("xs", 500),
    ("s", 600),
    ("m", 700),
    ("l", 750),
    ("xl", 900),
    ("xxl", 1100),
    ("xxxl", 1400),
    ("sg", 1600),
    ("g", 2000),
    ("xg", 3000),
    ("xxg", 4000),
];

/// Resolve a symbolic code to its pixel width.
pub fn resolve(code: &str) -> Option<u32> {
    let code = code.trim().to_ascii_lowercase();
    SIZE_CODES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, width)| *width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(resolve("xl"), Some(900));
        assert_eq!(resolve("xxu"), Some(40));
        assert_eq!(resolve("xxg"), Some(4000));
    }

    #[test]
    fn lookup_is_case_insensitive_and_trims() {
        assert_eq!(resolve(" XL "), Some(900));
    }

    #[test]
    fn unknown_codes_return_none() {
        assert_eq!(resolve("enormous"), None);
        assert_eq!(resolve(""), None);
    }

    #[test]
    fn table_is_strictly_increasing() {
        for pair in SIZE_CODES.windows(2) {
            assert!(pair[0].1 < pair[1].1, "{:?} >= {:?}", pair[0], pair[1]);
        }
    }
}
