//! Settings loading.
//!
//! Configuration is deserialized through the `config` crate with format
//! auto-detection from the file extension (TOML, YAML, JSON, INI, RON,
//! JSON5), `${VAR}` / `$VAR` environment substitution applied to the raw
//! document, and `REFRACT_`-prefixed environment overrides (`__` as the
//! nesting separator). Every load path finishes with
//! [`Settings::validate`], so a process never starts on a structurally
//! broken configuration.
//!
//! Secrets are *not* inlined here: auth descriptors reference environment
//! variable names, and the auth provider resolves them at use time.

pub mod model;

pub use model::{
    AuthDescriptor, AuthKind, AuthSettings, BypassSettings, CacheSettings, DetectorSettings,
    FeatureFlags, ObjectStoreOriginConfig, PartialProfileConfig, PathPatternConfig,
    PathTransformConfig, PathTransformRule, RemoteOriginConfig, SecurityLevel, ServerSettings, Settings,
    SettingsError, StorageProfileConfig, StorageSettings, TagSettings, TransformCacheSettings,
    TransformSettings,
};

use config::{Config, Environment, File, FileFormat};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::path::Path;
use thiserror::Error;

/// Environment-override prefix: `REFRACT_SERVER__PORT=9000` overrides
/// `server.port`.
const ENV_PREFIX: &str = "REFRACT";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("io error reading settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported settings format: {0}")]
    UnsupportedFormat(String),

    #[error("settings parse error: {0}")]
    Parse(String),

    #[error("settings rejected: {0}")]
    Invalid(#[from] SettingsError),
}

/// Detect the settings format from a file extension.
pub fn detect_format(path: &str) -> Result<FileFormat, ConfigError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat(format!("'{path}' has no extension")))?;

    match ext.to_lowercase().as_str() {
        "toml" => Ok(FileFormat::Toml),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        "json" => Ok(FileFormat::Json),
        "ini" => Ok(FileFormat::Ini),
        "ron" => Ok(FileFormat::Ron),
        "json5" => Ok(FileFormat::Json5),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

lazy_static! {
    static ref BRACED_VAR: Regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    static ref BARE_VAR: Regex = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
}

/// Substitute `${VAR}` and `$VAR` references with environment values.
/// Unset variables are left verbatim so the parse error points at them.
pub fn substitute_env_vars(content: &str) -> String {
    let expand = |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    };
    let content = BRACED_VAR.replace_all(content, expand);
    BARE_VAR.replace_all(&content, expand).into_owned()
}

/// Load, substitute, override, deserialize, and validate settings from a
/// file.
pub fn load_settings(path: &str) -> Result<Settings, ConfigError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    settings_from_parts(&content, format, true)
}

/// Parse settings from an in-memory document. Environment overrides are not
/// applied; used by tests and embedded callers.
pub fn settings_from_str(content: &str, format: FileFormat) -> Result<Settings, ConfigError> {
    settings_from_parts(content, format, false)
}

/// Built-in defaults plus `REFRACT_` environment overrides — the zero-config
/// startup path.
pub fn settings_from_env() -> Result<Settings, ConfigError> {
    settings_from_parts("", FileFormat::Toml, true)
}

fn settings_from_parts(
    content: &str,
    format: FileFormat,
    env_overrides: bool,
) -> Result<Settings, ConfigError> {
    let substituted = substitute_env_vars(content);

    let mut builder =
        Config::builder().add_source(File::from_str(&substituted, format));
    if env_overrides {
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));
    }

    let settings: Settings = builder
        .build()
        .map_err(|e| ConfigError::Parse(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::Parse(e.to_string()))?;

    settings.validate()?;
    Ok(settings)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[transform]
endpoint = "https://transform.internal"

[storage.default]
priority = ["remote"]

[storage.default.remote]
url = "https://origin.example.com"
"#;

    #[test]
    fn detects_common_formats() {
        assert_eq!(detect_format("refract.toml").unwrap(), FileFormat::Toml);
        assert_eq!(detect_format("refract.yml").unwrap(), FileFormat::Yaml);
        assert_eq!(detect_format("refract.json5").unwrap(), FileFormat::Json5);
        assert!(detect_format("refract.conf").is_err());
        assert!(detect_format("refract").is_err());
    }

    #[test]
    fn minimal_toml_parses_and_validates() {
        let settings = settings_from_str(MINIMAL_TOML, FileFormat::Toml).unwrap();
        assert_eq!(
            settings.storage.default.remote.unwrap().url,
            "https://origin.example.com"
        );
        assert_eq!(settings.server.port, 8080);
    }

    #[test]
    fn invalid_settings_are_rejected_at_load() {
        let doc = r#"
[transform]
endpoint = "not-a-url"
"#;
        assert!(matches!(
            settings_from_str(doc, FileFormat::Toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn env_substitution_covers_both_syntaxes() {
        // Safety: test-local variable name, no concurrent reader.
        unsafe {
            std::env::set_var("REFRACT_TEST_ORIGIN", "https://subst.example.com");
        }
        let out = substitute_env_vars("a=${REFRACT_TEST_ORIGIN} b=$REFRACT_TEST_ORIGIN");
        assert_eq!(
            out,
            "a=https://subst.example.com b=https://subst.example.com"
        );
    }

    #[test]
    fn unset_variables_stay_verbatim() {
        let out = substitute_env_vars("url = ${REFRACT_DEFINITELY_UNSET_VAR}");
        assert_eq!(out, "url = ${REFRACT_DEFINITELY_UNSET_VAR}");
    }

    #[test]
    fn load_settings_reads_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refract.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();
        let settings = load_settings(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.storage.default.priority.len(), 1);
    }
}
