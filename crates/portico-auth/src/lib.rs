//! Portico Auth - request authentication
//!
//! AWS Signature V4 verification for inbound S3 requests, the matching
//! signer used by the S3-family driver and tests, and the API key store
//! that backs `access_key -> (secret, tenant)` resolution.

pub mod error;
pub mod keys;
pub mod sigv4;

// Re-exports
pub use error::AuthError;
pub use keys::{ApiKey, KeyStore};
pub use sigv4::{
    SigV4Verifier, SignRequest, VerifiedIdentity, aws_escape, constant_time_eq, sign_headers,
};
