//! S3 request parsing and operation classification
//!
//! Path-style requests only: `/`, `/{bucket}`, `/{bucket}/{key...}`.
//! The operation is keyed on method, path shape, and the multipart query
//! hints (`uploads`, `uploadId`, `partNumber`); anything outside the
//! table is `Unknown` and answered with `NotImplemented`.

use chrono::{DateTime, Utc};
use http::{Method, Uri};
use std::collections::HashMap;

/// Classified S3 operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    ListBuckets,
    ListObjects,
    CreateBucket,
    DeleteBucket,
    HeadBucket,
    GetObject,
    PutObject,
    DeleteObject,
    HeadObject,
    InitiateMultipartUpload,
    UploadPart,
    CompleteMultipartUpload,
    AbortMultipartUpload,
    ListParts,
    Unknown,
}

impl S3Operation {
    /// Operation name as used in metrics and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListBuckets => "ListBuckets",
            Self::ListObjects => "ListObjects",
            Self::CreateBucket => "CreateBucket",
            Self::DeleteBucket => "DeleteBucket",
            Self::HeadBucket => "HeadBucket",
            Self::GetObject => "GetObject",
            Self::PutObject => "PutObject",
            Self::DeleteObject => "DeleteObject",
            Self::HeadObject => "HeadObject",
            Self::InitiateMultipartUpload => "InitiateMultipartUpload",
            Self::UploadPart => "UploadPart",
            Self::CompleteMultipartUpload => "CompleteMultipartUpload",
            Self::AbortMultipartUpload => "AbortMultipartUpload",
            Self::ListParts => "ListParts",
            Self::Unknown => "Unknown",
        }
    }

    /// Capability string checked against API key permissions
    #[must_use]
    pub const fn action(self) -> &'static str {
        match self {
            Self::ListBuckets => "s3:ListAllMyBuckets",
            Self::ListObjects => "s3:ListBucket",
            Self::CreateBucket => "s3:CreateBucket",
            Self::DeleteBucket => "s3:DeleteBucket",
            Self::HeadBucket => "s3:ListBucket",
            Self::GetObject | Self::HeadObject => "s3:GetObject",
            Self::PutObject
            | Self::InitiateMultipartUpload
            | Self::UploadPart
            | Self::CompleteMultipartUpload => "s3:PutObject",
            Self::DeleteObject | Self::AbortMultipartUpload => "s3:DeleteObject",
            Self::ListParts => "s3:ListMultipartUploadParts",
            Self::Unknown => "s3:*",
        }
    }

    /// Whether the operation mutates stored state
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateBucket
                | Self::DeleteBucket
                | Self::PutObject
                | Self::DeleteObject
                | Self::InitiateMultipartUpload
                | Self::UploadPart
                | Self::CompleteMultipartUpload
                | Self::AbortMultipartUpload
        )
    }
}

/// A parsed S3 request
#[derive(Debug, Clone)]
pub struct S3Request {
    /// Bucket from the first path segment, if any
    pub bucket: Option<String>,
    /// Object key from the remaining path, if any
    pub object: Option<String>,
    /// Classified operation
    pub operation: S3Operation,
    /// HTTP method
    pub method: Method,
    /// Raw request path
    pub path: String,
    /// Decoded query parameters
    pub query: HashMap<String, String>,
    /// Parse time
    pub timestamp: DateTime<Utc>,
}

impl S3Request {
    /// Parse and classify a request line
    #[must_use]
    pub fn parse(method: &Method, uri: &Uri) -> Self {
        let path = uri.path().to_string();
        let query = parse_query(uri.query().unwrap_or(""));

        let trimmed = path.trim_start_matches('/');
        let (bucket, object) = if trimmed.is_empty() {
            (None, None)
        } else {
            match trimmed.split_once('/') {
                Some((bucket, key)) if !key.is_empty() => {
                    (Some(bucket.to_string()), Some(decode_key(key)))
                }
                _ => (Some(trimmed.trim_end_matches('/').to_string()), None),
            }
        };

        let operation = classify(method, bucket.is_some(), object.is_some(), &query);

        Self {
            bucket,
            object,
            operation,
            method: method.clone(),
            path,
            query,
            timestamp: Utc::now(),
        }
    }
}

/// Classify method + path shape + query hints into an operation
fn classify(
    method: &Method,
    has_bucket: bool,
    has_object: bool,
    query: &HashMap<String, String>,
) -> S3Operation {
    let upload_id = query.contains_key("uploadId");
    let part_number = query.contains_key("partNumber");
    let uploads = query.contains_key("uploads");

    match (has_bucket, has_object) {
        (false, false) if method == Method::GET => S3Operation::ListBuckets,

        (true, false) if method == Method::GET => S3Operation::ListObjects,
        (true, false) if method == Method::PUT => S3Operation::CreateBucket,
        (true, false) if method == Method::DELETE => S3Operation::DeleteBucket,
        (true, false) if method == Method::HEAD => S3Operation::HeadBucket,

        (true, true) if method == Method::GET && upload_id => S3Operation::ListParts,
        (true, true) if method == Method::GET => S3Operation::GetObject,
        (true, true) if method == Method::PUT && part_number && upload_id => {
            S3Operation::UploadPart
        }
        (true, true) if method == Method::PUT => S3Operation::PutObject,
        (true, true) if method == Method::DELETE && upload_id => {
            S3Operation::AbortMultipartUpload
        }
        (true, true) if method == Method::DELETE => S3Operation::DeleteObject,
        (true, true) if method == Method::HEAD => S3Operation::HeadObject,
        (true, true) if method == Method::POST && uploads => S3Operation::InitiateMultipartUpload,
        (true, true) if method == Method::POST && upload_id => {
            S3Operation::CompleteMultipartUpload
        }

        _ => S3Operation::Unknown,
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    if query.is_empty() {
        return out;
    }
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let Some(key) = parts.next() else { continue };
        if key.is_empty() {
            continue;
        }
        let value = parts.next().unwrap_or("");
        out.insert(
            urlencoding::decode(key).map_or_else(|_| key.to_string(), |v| v.into_owned()),
            urlencoding::decode(value).map_or_else(|_| value.to_string(), |v| v.into_owned()),
        );
    }
    out
}

fn decode_key(key: &str) -> String {
    urlencoding::decode(key).map_or_else(|_| key.to_string(), |v| v.into_owned())
}
