use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::error;

use crate::templates;

pub const NOT_FOUND_MESSAGE: &str = "Page Not found!";
pub const GENERIC_ERROR_MESSAGE: &str = "Oh no, something went wrong";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Invalid record id: {0}")]
    InvalidId(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::InvalidId(_) => NOT_FOUND_MESSAGE.to_string(),
            AppError::Internal(_) => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    fn log(&self) {
        if let AppError::Internal(err) = self {
            error!(error = ?err, "unhandled error");
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::InvalidId(_) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        self.log();
        let status = self.status_code();

        HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(templates::error_page(status.as_u16(), &self.public_message()))
    }
}

/// JSON flavour of [`AppError`] for the `/api` routes.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub AppError);

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError(AppError::Internal(err))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.0.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        self.0.log();

        HttpResponse::build(self.status_code())
            .json(serde_json::json!({"error": self.0.public_message()}))
    }
}
