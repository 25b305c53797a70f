//! Structured application errors.
//!
//! An [`AppError`] is a failure that knows its own wire status code and
//! body. Handlers choose the kind when they construct the error; adapters
//! never infer it from the shape of an arbitrary error value. Anything that
//! is not an `AppError` is an unstructured failure.

use serde::{Deserialize, Serialize};

/// Value of the `status` field in every serialised error body.
pub const ERROR_STATUS: &str = "error";

/// Category of a structured application error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The request is malformed.
    BadRequest,
    /// The request failed schema validation.
    Validation,
    /// Authentication is missing or invalid.
    NotAuthorized,
    /// The requested resource does not exist.
    NotFound,
    /// An uploaded payload exceeds the permitted size.
    FileTooLarge,
    /// A dependency is unavailable.
    ServerUnavailable,
}

impl ErrorKind {
    /// HTTP status code declared by this kind.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::BadRequest | Self::Validation => 400,
            Self::NotAuthorized => 401,
            Self::NotFound => 404,
            Self::FileTooLarge => 413,
            Self::ServerUnavailable => 503,
        }
    }
}

/// Serialised form of an [`AppError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    pub status: String,
}

/// Structured application error.
///
/// # Examples
/// ```
/// use social_backend::domain::{AppError, ErrorKind};
///
/// let err = AppError::not_found("post 42 does not exist");
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.serialize_errors().status_code, 404);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    /// Error of `kind` with a client-facing message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Malformed request (400).
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    /// Schema validation failure (400).
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Missing or invalid credentials (401).
    pub fn not_authorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAuthorized, message)
    }

    /// Unknown resource (404).
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Oversized upload (413).
    pub fn file_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileTooLarge, message)
    }

    /// Dependency outage (503).
    pub fn server_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerUnavailable, message)
    }

    /// Category deciding the status code.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message returned to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Wire status code; see [`ErrorKind::status_code`].
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.kind.status_code()
    }

    /// Body sent to the client for this error.
    #[must_use]
    pub fn serialize_errors(&self) -> ErrorBody {
        ErrorBody {
            message: self.message.clone(),
            status_code: self.http_status(),
            status: ERROR_STATUS.to_owned(),
        }
    }
}
