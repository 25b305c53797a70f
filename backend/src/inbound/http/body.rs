//! Request body parser limits and error mapping.
//!
//! JSON and form bodies share one size cap. Parse failures become
//! structured [`AppError`]s so clients get the usual error body.

use actix_web::error::{JsonPayloadError, UrlencodedError};
use actix_web::web;

use crate::domain::AppError;

/// Maximum accepted request body, in bytes.
pub const BODY_LIMIT_BYTES: usize = 50 * 1024 * 1024;

fn json_error(error: JsonPayloadError) -> AppError {
    match error {
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            AppError::file_too_large(error.to_string())
        }
        other => AppError::bad_request(other.to_string()),
    }
}

fn form_error(error: UrlencodedError) -> AppError {
    match error {
        UrlencodedError::Overflow { .. } => AppError::file_too_large(error.to_string()),
        other => AppError::bad_request(other.to_string()),
    }
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(BODY_LIMIT_BYTES)
        .error_handler(|error, _req| json_error(error).into())
}

pub fn form_config() -> web::FormConfig {
    web::FormConfig::default()
        .limit(BODY_LIMIT_BYTES)
        .error_handler(|error, _req| form_error(error).into())
}

pub fn payload_config() -> web::PayloadConfig {
    web::PayloadConfig::new(BODY_LIMIT_BYTES)
}
