//! HTTP mapping for structured application errors.
//!
//! [`AppError`] already declares its status code and body; this adapter only
//! hands both to Actix.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};

use crate::domain::AppError;

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, AppError>;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.serialize_errors())
    }
}
