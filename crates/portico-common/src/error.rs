//! Error types for Portico
//!
//! This module defines the common error type used throughout the gateway,
//! together with its mapping onto the S3 wire error code set.

use crate::types::{BucketNameError, ObjectKeyError, TenantIdError};
use thiserror::Error;

/// Common result type for Portico operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Portico
#[derive(Debug, Error)]
pub enum Error {
    // Storage errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    #[error("object not found: {container}/{key}")]
    ObjectNotFound { container: String, key: String },

    // Validation errors
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(#[from] BucketNameError),

    #[error("invalid object key: {0}")]
    InvalidObjectKey(#[from] ObjectKeyError),

    #[error("invalid tenant id: {0}")]
    InvalidTenantId(#[from] TenantIdError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed XML body: {0}")]
    MalformedXml(String),

    #[error("incomplete body: expected {expected} bytes, got {actual}")]
    IncompleteBody { expected: u64, actual: u64 },

    #[error("content digest mismatch")]
    BadDigest,

    #[error("missing Content-Length header")]
    MissingContentLength,

    // Auth errors
    #[error("access denied")]
    AccessDenied,

    #[error("invalid access key")]
    InvalidAccessKey,

    #[error("signature mismatch")]
    SignatureDoesNotMatch,

    // Tenant/quota errors
    #[error("tenant not found: {0}")]
    TenantNotFound(String),

    #[error("tenant already exists: {0}")]
    TenantAlreadyExists(String),

    #[error("insufficient quota: requested {requested} bytes, {available} available")]
    InsufficientQuota { requested: u64, available: u64 },

    #[error("entity too large: {size} bytes exceeds limit of {limit}")]
    EntityTooLarge { size: u64, limit: u64 },

    // Protocol errors
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("request timeout")]
    Timeout,

    // Backend errors
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a not implemented error
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented(feature.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Check if this is a retryable error
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::TenantNotFound(_)
        )
    }

    /// Get HTTP status code for S3 API compatibility
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidBucketName(_)
            | Self::InvalidObjectKey(_)
            | Self::InvalidTenantId(_)
            | Self::InvalidRequest(_)
            | Self::MalformedXml(_)
            | Self::IncompleteBody { .. }
            | Self::BadDigest
            | Self::InsufficientQuota { .. } => 400,

            // 403 Forbidden
            Self::AccessDenied | Self::InvalidAccessKey | Self::SignatureDoesNotMatch => 403,

            // 404 Not Found
            Self::BucketNotFound(_) | Self::ObjectNotFound { .. } | Self::TenantNotFound(_) => 404,

            // 405 Method Not Allowed
            Self::MethodNotAllowed(_) => 405,

            // 408 Request Timeout
            Self::Timeout => 408,

            // 409 Conflict
            Self::BucketAlreadyExists(_)
            | Self::BucketNotEmpty(_)
            | Self::TenantAlreadyExists(_) => 409,

            // 411 Length Required
            Self::MissingContentLength => 411,

            // 413 Payload Too Large
            Self::EntityTooLarge { .. } => 413,

            // 500 Internal Server Error
            Self::Io(_)
            | Self::Internal(_)
            | Self::Unavailable(_)
            | Self::Configuration(_) => 500,

            // 501 Not Implemented
            Self::NotImplemented(_) => 501,
        }
    }

    /// Get S3 error code for API compatibility
    ///
    /// The code set is closed; anything without a dedicated code maps to
    /// `InternalError`. Quota exhaustion is surfaced as `InvalidRequest`
    /// with an explanatory message so stock S3 clients do not choke on an
    /// unknown code.
    #[must_use]
    pub const fn s3_error_code(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::InvalidAccessKey => "InvalidAccessKeyId",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
            Self::BucketNotFound(_) => "NoSuchBucket",
            Self::ObjectNotFound { .. } => "NoSuchKey",
            Self::BucketAlreadyExists(_) => "BucketAlreadyExists",
            Self::BucketNotEmpty(_) => "BucketNotEmpty",
            Self::InvalidBucketName(_) => "InvalidBucketName",
            Self::InvalidObjectKey(_) => "InvalidObjectName",
            Self::InvalidTenantId(_) | Self::InvalidRequest(_) | Self::InsufficientQuota { .. } => {
                "InvalidRequest"
            }
            Self::MalformedXml(_) => "MalformedXML",
            Self::IncompleteBody { .. } => "IncompleteBody",
            Self::BadDigest => "BadDigest",
            Self::MissingContentLength => "MissingContentLength",
            Self::EntityTooLarge { .. } => "EntityTooLarge",
            Self::MethodNotAllowed(_) => "MethodNotAllowed",
            Self::Timeout => "RequestTimeout",
            Self::NotImplemented(_) => "NotImplemented",
            Self::TenantNotFound(_) | Self::TenantAlreadyExists(_) => "InvalidRequest",
            Self::Io(_) | Self::Internal(_) | Self::Unavailable(_) | Self::Configuration(_) => {
                "InternalError"
            }
        }
    }
}
