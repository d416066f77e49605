//! Authentication error types

use thiserror::Error;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingAuthHeader,

    #[error("invalid authorization header format")]
    InvalidAuthHeader,

    #[error("invalid signature version: expected AWS4-HMAC-SHA256")]
    InvalidSignatureVersion,

    #[error("access key not found: {0}")]
    AccessKeyNotFound(String),

    #[error("access key has been revoked")]
    AccessKeyRevoked,

    #[error("access key has expired")]
    AccessKeyExpired,

    #[error("key does not permit {0}")]
    NotPermitted(String),

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("request time too skewed")]
    RequestExpired,

    #[error("missing required signed header: {0}")]
    MissingSignedHeader(String),

    #[error("invalid date format")]
    InvalidDateFormat,

    #[error("missing x-amz-date or date header")]
    MissingDateHeader,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Map onto the closed S3 error code set
    #[must_use]
    pub const fn s3_error_code(&self) -> &'static str {
        match self {
            Self::SignatureMismatch => "SignatureDoesNotMatch",
            Self::AccessKeyNotFound(_) | Self::AccessKeyRevoked | Self::AccessKeyExpired => {
                "InvalidAccessKeyId"
            }
            Self::Internal(_) => "InternalError",
            _ => "AccessDenied",
        }
    }

    /// HTTP status for the error
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Internal(_) => 500,
            _ => 403,
        }
    }
}
