use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

use crate::models::blog_store::BlogStoreError;
use crate::models::gallery_store::GalleryStoreError;
use crate::models::db_operations::remote_operations::RemoteError;

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error type returned by every JSON route. Renders as `{error, details?}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Gone(String),
    #[error("{message}")]
    Upstream { message: String, body: Option<String> },
    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::Upstream { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            ApiError::Upstream { body, .. } => body.clone(),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            details,
        })
    }
}

impl From<RemoteError> for ApiError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Status { status, body, url } => ApiError::Upstream {
                message: format!("Remote host answered {} for {}", status, url),
                body: Some(body),
            },
            other => ApiError::Upstream { message: other.to_string(), body: None },
        }
    }
}

impl From<BlogStoreError> for ApiError {
    fn from(e: BlogStoreError) -> Self {
        match e {
            BlogStoreError::NotFound(what) => ApiError::NotFound(what),
            BlogStoreError::Conflict(what) => ApiError::Conflict(what),
            BlogStoreError::Invalid(what) => ApiError::BadRequest(what),
            BlogStoreError::Remote(remote) => remote.into(),
            other => {
                log::error!("Blog store failure: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<GalleryStoreError> for ApiError {
    fn from(e: GalleryStoreError) -> Self {
        match e {
            GalleryStoreError::NotFound(what) => ApiError::NotFound(what),
            GalleryStoreError::Rejected(what) => ApiError::BadRequest(what),
            GalleryStoreError::Remote(remote) => remote.into(),
            other => {
                log::error!("Gallery store failure: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        log::error!("Blocking task failed: {}", e);
        ApiError::Internal("Internal server error".to_string())
    }
}
