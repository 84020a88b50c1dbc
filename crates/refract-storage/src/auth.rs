//! Origin authentication provider.
//!
//! For a given origin URL and auth descriptor, produces either extra request
//! headers or a signed URL. Secrets never live in configuration: descriptors
//! reference environment variable *names*, resolved here at use time through
//! [`SecretSource`].
//!
//! Two policy switches shape behaviour:
//! - the global `auth.enabled` flag short-circuits everything (no secret
//!   resolution, no signing work) when off;
//! - `security_level` decides whether a signing failure aborts the origin
//!   try (`strict`) or downgrades to an unauthenticated fetch
//!   (`permissive`).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use refract_kernel::config::{AuthDescriptor, AuthKind, AuthSettings, SecurityLevel};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("secret environment variable '{0}' is not set")]
    MissingSecret(String),

    #[error("auth descriptor is missing field '{0}'")]
    IncompleteDescriptor(&'static str),

    #[error("request signing failed: {0}")]
    Signing(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Secret resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Where secrets come from. Production uses [`EnvSecrets`]; tests inject a
/// map.
pub trait SecretSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Reads secrets from process environment variables.
#[derive(Debug, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl SecretSource for std::collections::HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        std::collections::HashMap::get(self, name).cloned()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AuthOutcome / AuthProvider
// ─────────────────────────────────────────────────────────────────────────────

/// What the provider produced for one origin fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthOutcome {
    /// Headers to inject into the outgoing request.
    pub headers: Vec<(String, String)>,
    /// Replacement URL carrying the signature, for query-signed origins.
    pub signed_url: Option<String>,
}

pub struct AuthProvider {
    settings: AuthSettings,
    secrets: Box<dyn SecretSource>,
}

impl AuthProvider {
    pub fn new(settings: AuthSettings) -> Self {
        Self::with_secrets(settings, Box::new(EnvSecrets))
    }

    pub fn with_secrets(settings: AuthSettings, secrets: Box<dyn SecretSource>) -> Self {
        Self { settings, secrets }
    }

    pub fn enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Produce auth material for a fetch of `url`, applying the configured
    /// security level: in `permissive` mode a failure degrades to an empty
    /// (unauthenticated) outcome.
    pub fn authorize(
        &self,
        url: &Url,
        descriptor: &AuthDescriptor,
    ) -> Result<AuthOutcome, AuthError> {
        // Fast path: globally disabled means zero work.
        if !self.settings.enabled || descriptor.kind == AuthKind::None {
            return Ok(AuthOutcome::default());
        }

        match self.sign(url, descriptor) {
            Ok(outcome) => Ok(outcome),
            Err(err) => match self.settings.security_level {
                SecurityLevel::Strict => Err(err),
                SecurityLevel::Permissive => {
                    warn!(%err, url = %url, "auth failed; continuing unauthenticated");
                    Ok(AuthOutcome::default())
                }
            },
        }
    }

    fn sign(&self, url: &Url, descriptor: &AuthDescriptor) -> Result<AuthOutcome, AuthError> {
        match descriptor.kind {
            AuthKind::None => Ok(AuthOutcome::default()),
            AuthKind::Bearer => self.bearer(url, descriptor),
            AuthKind::Header => Ok(AuthOutcome {
                headers: descriptor
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                signed_url: None,
            }),
            AuthKind::QuerySigned => self.query_signed(url, descriptor),
            AuthKind::AwsV4 => self.aws_v4(url, descriptor),
        }
    }

    fn secret(&self, env_name: &Option<String>, field: &'static str) -> Result<String, AuthError> {
        let name = env_name
            .as_deref()
            .ok_or(AuthError::IncompleteDescriptor(field))?;
        self.secrets
            .get(name)
            .ok_or_else(|| AuthError::MissingSecret(name.to_string()))
    }

    // ── Bearer ───────────────────────────────────────────────────────────────

    /// Opaque token: HMAC-SHA256 over origin domain plus the current unix
    /// minute, base64-encoded. Deterministic within a one-minute window so
    /// the origin can validate against adjacent windows.
    fn bearer(&self, url: &Url, descriptor: &AuthDescriptor) -> Result<AuthOutcome, AuthError> {
        let secret = self.secret(&descriptor.token_env, "token_env")?;
        let domain = url.host_str().unwrap_or_default();
        let minute = unix_now() / 60;

        let token = BASE64.encode(hmac_bytes(&secret, &format!("{domain}:{minute}"))?);
        Ok(AuthOutcome {
            headers: vec![("authorization".to_string(), format!("Bearer {token}"))],
            signed_url: None,
        })
    }

    // ── Query signing ────────────────────────────────────────────────────────

    /// Appends `expires` and the configured signature parameter; the
    /// signature is HMAC-SHA256 over path + query + expires, hex-encoded.
    fn query_signed(
        &self,
        url: &Url,
        descriptor: &AuthDescriptor,
    ) -> Result<AuthOutcome, AuthError> {
        let secret = self.secret(&descriptor.token_env, "token_env")?;
        let expires = unix_now() + descriptor.expiration_secs;

        let payload = format!("{}{}{}", url.path(), url.query().unwrap_or_default(), expires);
        let signature = hex::encode(hmac_bytes(&secret, &payload)?);

        let mut signed = url.clone();
        signed
            .query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair(&descriptor.param_name, &signature);

        Ok(AuthOutcome {
            headers: Vec::new(),
            signed_url: Some(signed.into()),
        })
    }

    // ── AWS SigV4 ────────────────────────────────────────────────────────────

    /// Full SigV4 over a GET of `url`. Only `x-amz-*` and `authorization`
    /// headers are copied into the outgoing set.
    fn aws_v4(&self, url: &Url, descriptor: &AuthDescriptor) -> Result<AuthOutcome, AuthError> {
        use aws_sigv4::http_request::{SignableBody, SignableRequest, SigningSettings, sign};
        use aws_sigv4::sign::v4;

        let access_key = self.secret(&descriptor.access_key_env, "access_key_env")?;
        let secret_key = self.secret(&descriptor.secret_key_env, "secret_key_env")?;
        let region = descriptor
            .region
            .as_deref()
            .ok_or(AuthError::IncompleteDescriptor("region"))?;
        let service = descriptor
            .service
            .as_deref()
            .ok_or(AuthError::IncompleteDescriptor("service"))?;

        let identity =
            aws_credential_types::Credentials::new(access_key, secret_key, None, None, "refract")
                .into();
        let params = v4::SigningParams::builder()
            .identity(&identity)
            .region(region)
            .name(service)
            .time(SystemTime::now())
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| AuthError::Signing(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            "GET",
            url.as_str(),
            std::iter::empty(),
            SignableBody::Bytes(&[]),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| AuthError::Signing(e.to_string()))?
            .into_parts();

        let mut request = http::Request::builder()
            .method("GET")
            .uri(url.as_str())
            .body(())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        instructions.apply_to_request_http1x(&mut request);

        let headers = request
            .headers()
            .iter()
            .filter(|(name, _)| {
                let name = name.as_str();
                name.starts_with("x-amz-") || name == "authorization"
            })
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        Ok(AuthOutcome {
            headers,
            signed_url: None,
        })
    }
}

fn hmac_bytes(secret: &str, message: &str) -> Result<Vec<u8>, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
