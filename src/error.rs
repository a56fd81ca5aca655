//! Crate-wide error type and the error taxonomy exposed over HTTP.
//!
//! Every failure a request can hit collapses into one [`ErrorKind`]. The kind
//! decides the HTTP status and the numeric `Code` in the error body. Codes
//! 0–4 keep the numbering older clients already understand. `NotFound` and
//! `Conflict` were added on top.

use crate::imaging::ImagingError;
use thiserror::Error;

/// Result type alias for media store operations.
pub type Result<T> = std::result::Result<T, MediaError>;

/// Coarse classification of a [`MediaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unknown = 0,
    Error = 1,
    AuthFailed = 2,
    InvalidInput = 3,
    Unsupported = 4,
    NotFound = 5,
    Conflict = 6,
}

impl ErrorKind {
    /// Numeric code sent in error bodies.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// HTTP status code for this kind.
    pub fn status(self) -> u16 {
        match self {
            ErrorKind::Unknown | ErrorKind::Error => 500,
            ErrorKind::AuthFailed => 403,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unsupported => 501,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
        }
    }
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object already exists: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("authorisation denied")]
    AuthFailed,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image processing failed: {0}")]
    Imaging(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::NotFound(_) => ErrorKind::NotFound,
            MediaError::Conflict(_) => ErrorKind::Conflict,
            MediaError::InvalidInput(_) => ErrorKind::InvalidInput,
            MediaError::AuthFailed => ErrorKind::AuthFailed,
            MediaError::Unsupported(_) => ErrorKind::Unsupported,
            MediaError::Imaging(_) => ErrorKind::Error,
            MediaError::Io(_) | MediaError::Json(_) | MediaError::Internal(_) => {
                ErrorKind::Unknown
            }
        }
    }
}

impl From<ImagingError> for MediaError {
    fn from(err: ImagingError) -> Self {
        match err {
            ImagingError::InvalidArgument { .. } => MediaError::InvalidInput(err.to_string()),
            ImagingError::Unsupported(msg) => MediaError::Unsupported(msg),
            ImagingError::Decode(_) | ImagingError::Encode(_) => {
                MediaError::Imaging(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_http_status() {
        assert_eq!(MediaError::NotFound("k".into()).kind().status(), 404);
        assert_eq!(MediaError::InvalidInput("x".into()).kind().status(), 400);
        assert_eq!(MediaError::AuthFailed.kind().status(), 403);
        assert_eq!(MediaError::Unsupported("webp".into()).kind().status(), 501);
        assert_eq!(MediaError::Conflict("k".into()).kind().status(), 409);
        assert_eq!(MediaError::Internal("boom".into()).kind().status(), 500);
    }

    #[test]
    fn legacy_codes_are_stable() {
        assert_eq!(ErrorKind::Unknown.code(), 0);
        assert_eq!(ErrorKind::AuthFailed.code(), 2);
        assert_eq!(ErrorKind::InvalidInput.code(), 3);
        assert_eq!(ErrorKind::Unsupported.code(), 4);
    }

    #[test]
    fn imaging_argument_errors_are_invalid_input() {
        let err: MediaError = ImagingError::InvalidArgument {
            op: "size",
            reason: "not a number".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn io_not_found_is_not_reclassified() {
        // The store maps missing files explicitly; a raw io error stays internal.
        let err: MediaError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }
}
