//! Gateway error types.
//!
//! Only storage outcomes become user-visible errors: a miss everywhere is a
//! 404, total origin failure is a 502. Everything else in the pipeline
//! degrades to a best-effort success upstream of here (original bytes,
//! default quality, unauthenticated origin).

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use refract_kernel::storage::OriginAttempt;
use refract_storage::StorageError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every origin answered; none holds the source image.
    #[error("source image not found")]
    SourceNotFound { attempts: Vec<OriginAttempt> },

    /// At least one origin failed for transport or auth reasons and none
    /// succeeded.
    #[error("source origins unreachable")]
    OriginsUnreachable { attempts: Vec<OriginAttempt> },
}

impl GatewayError {
    pub fn attempts(&self) -> &[OriginAttempt] {
        match self {
            GatewayError::SourceNotFound { attempts }
            | GatewayError::OriginsUnreachable { attempts } => attempts,
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Miss { attempts, .. } => GatewayError::SourceNotFound { attempts },
            StorageError::Exhausted { attempts, .. } => {
                GatewayError::OriginsUnreachable { attempts }
            }
            _ => GatewayError::OriginsUnreachable { attempts: Vec::new() },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::SourceNotFound { .. } => (StatusCode::NOT_FOUND, "SOURCE_NOT_FOUND"),
            GatewayError::OriginsUnreachable { .. } => {
                (StatusCode::BAD_GATEWAY, "ORIGINS_UNREACHABLE")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
