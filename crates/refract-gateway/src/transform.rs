//! HTTP client for the transform primitive.
//!
//! The primitive is a black-box resizing service: one GET per transform,
//! with the finalized option bundle serialized as JSON on the
//! `x-image-options` header. `format=json` turns the same call into a
//! metadata probe returning `{ "metadata": { width, height, format } }`.

use async_trait::async_trait;
use refract_kernel::config::TransformSettings;
use refract_kernel::params::{OptionMap, OptionValue};
use refract_kernel::transform::{
    ImageMetadata, TransformBackend, TransformError, TransformedImage,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Header carrying the option bundle to the primitive.
pub const OPTIONS_HEADER: &str = "x-image-options";

pub struct HttpTransformBackend {
    client: reqwest::Client,
    endpoint: String,
    user_agent: String,
    timeout: Duration,
}

impl HttpTransformBackend {
    pub fn new(settings: &TransformSettings) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            user_agent: settings.user_agent.clone(),
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }

    async fn call(
        &self,
        source_url: &str,
        options: &OptionMap,
    ) -> Result<reqwest::Response, TransformError> {
        let url = format!("{}{}", self.endpoint, source_url);
        let bundle = options.to_json().to_string();
        debug!(url = url.as_str(), options = bundle.as_str(), "invoking transform primitive");

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .header("user-agent", &self.user_agent)
            .header(OPTIONS_HEADER, bundle)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransformError::Timeout
                } else {
                    TransformError::Transport(err.to_string())
                }
            })?;

        let status = response.status().as_u16();
        match status {
            200 => Ok(response),
            // The primitive reports its own origin-fetch timeout as 524.
            524 => Err(TransformError::Timeout),
            _ => Err(TransformError::Upstream(status)),
        }
    }
}

#[async_trait]
impl TransformBackend for HttpTransformBackend {
    #[instrument(skip(self, options), fields(source_url))]
    async fn transform(
        &self,
        source_url: &str,
        options: &OptionMap,
    ) -> Result<TransformedImage, TransformError> {
        let response = self.call(source_url, options).await?;
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransformError::Transport(e.to_string()))?;
        Ok(TransformedImage { body, content_type })
    }

    #[instrument(skip(self), fields(source_url))]
    async fn probe(&self, source_url: &str) -> Result<ImageMetadata, TransformError> {
        #[derive(Deserialize)]
        struct ProbeEnvelope {
            metadata: ImageMetadata,
        }

        let mut options = OptionMap::new();
        options.insert("format", OptionValue::Str("json".into()));

        let response = self.call(source_url, &options).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| TransformError::Transport(e.to_string()))?;

        let envelope: ProbeEnvelope = serde_json::from_slice(&body)
            .map_err(|e| TransformError::InvalidMetadata(e.to_string()))?;
        Ok(envelope.metadata)
    }
}
