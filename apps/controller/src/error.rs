// [apps/controller/src/error.rs]
/*!
 * =================================================================
 * APARATO: API ERROR TAXONOMY
 * CLASIFICACIÓN: APPLICATION LAYER (ESTRATO L5)
 * RESPONSABILIDAD: TRADUCCIÓN CENTRALIZADA DE FALLOS A RESPUESTAS HTTP
 *
 * Un único `IntoResponse`, no un match disperso por handler: cada fallo
 * de dominio se traduce aquí, una sola vez, al código de estado y al
 * sobre de respuesta público.
 * =================================================================
 */

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use buildctl_infra_blobstore::BlobError;
use buildctl_infra_db::RepoError;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict")]
    Conflict,
    #[error("illegal state transition")]
    IllegalTransition,
    #[error("dispatch queue is full, retry later")]
    QueueFull { retry_after_seconds: u64 },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound | RepoError::WorkerNotFound => ApiError::NotFound,
            RepoError::Conflict | RepoError::WorkerBusy => ApiError::Conflict,
            RepoError::IllegalTransition => ApiError::IllegalTransition,
            RepoError::WorkerOffline => ApiError::Unauthorized,
            RepoError::Validation(msg) => ApiError::Validation(msg),
            RepoError::Connection(_) | RepoError::Configuration(_) | RepoError::Query(_) => {
                ApiError::Internal(anyhow::anyhow!(err))
            }
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => ApiError::NotFound,
            BlobError::InvalidPath(_) => ApiError::Validation("invalid artifact key".into()),
            BlobError::Io(_) => ApiError::Internal(anyhow::anyhow!(err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let default_message = self.to_string();

        let (status, message, retry_after_seconds) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, default_message, None),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, default_message, None),
            ApiError::NotFound => (StatusCode::NOT_FOUND, default_message, None),
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, default_message, None),
            ApiError::Conflict => (StatusCode::CONFLICT, default_message, None),
            ApiError::IllegalTransition => (StatusCode::CONFLICT, default_message, None),
            ApiError::QueueFull { retry_after_seconds } => {
                (StatusCode::SERVICE_UNAVAILABLE, default_message, Some(*retry_after_seconds))
            }
            ApiError::Internal(source) => {
                let request_id = Uuid::new_v4();
                error!(%request_id, error = %source, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("internal error, request_id={request_id}"),
                    None,
                )
            }
        };

        let body = match retry_after_seconds {
            Some(seconds) => json!({ "error": message, "retry_after_seconds": seconds }),
            None => json!({ "error": message }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(seconds) = retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}
