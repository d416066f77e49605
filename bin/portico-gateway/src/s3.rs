//! S3 API handlers
//!
//! The adapter between the S3 wire protocol and the storage engine:
//! tenant namespacing, quota reserve/commit/release around streaming
//! uploads, Range-aware downloads, idempotent deletes, and listing.

use crate::auth_middleware::Identity;
use crate::multipart::{self, MultipartRegistry};
use axum::{
    Extension,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use portico_auth::{KeyStore, SigV4Verifier};
use portico_common::{BucketName, Error, GatewayConfig, ObjectKey};
use portico_events::{AccessPatternLog, EventPipeline};
use portico_health::HealthRegistry;
use portico_s3::xml::{
    Bucket, Buckets, ListAllMyBucketsResult, ListBucketResult, ObjectContent, Owner, to_xml_body,
};
use portico_s3::{error_response, s3_error_response};
use portico_storage::{ByteStream, DriverError, Engine};
use portico_tenant::{QuotaManager, RateLimiter, TenantDirectory};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Scratch key prefix for in-flight multipart parts; hidden from listings
pub const MPU_PREFIX: &str = ".mpu/";

/// Application state shared across handlers
pub struct AppState {
    pub engine: Engine,
    pub tenants: TenantDirectory,
    pub quotas: QuotaManager,
    pub keys: Arc<KeyStore>,
    pub verifier: SigV4Verifier,
    pub limiter: RateLimiter,
    pub health: HealthRegistry,
    pub events: EventPipeline,
    pub patterns: Arc<AccessPatternLog>,
    pub uploads: MultipartRegistry,
    pub config: GatewayConfig,
    pub started_at: Instant,
}

impl AppState {
    /// Report an engine operation outcome to the health registry
    pub fn report_backend(&self, ok: bool, bytes: u64, error: Option<String>) {
        if let Some(id) = self.engine.primary_id() {
            self.health.record_operation(&id, ok, bytes, error);
        }
    }
}

// ============================================================================
// Query parameter shapes
// ============================================================================

/// Query parameters for GET/HEAD on a bucket
#[derive(Debug, Deserialize, Default)]
pub struct ListObjectsParams {
    prefix: Option<String>,
    #[serde(rename = "max-keys")]
    max_keys: Option<u32>,
}

/// Query parameters for PUT on an object (simple upload or part upload)
#[derive(Debug, Deserialize, Default)]
pub struct PutObjectParams {
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(rename = "partNumber")]
    pub part_number: Option<u32>,
}

/// Query parameters for GET on an object (download or list parts)
#[derive(Debug, Deserialize, Default)]
pub struct GetObjectParams {
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
    #[serde(rename = "max-parts")]
    pub max_parts: Option<u32>,
}

/// Query parameters for DELETE on an object (delete or abort upload)
#[derive(Debug, Deserialize, Default)]
pub struct DeleteObjectParams {
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
}

/// Query parameters for POST on an object (initiate or complete upload)
#[derive(Debug, Deserialize, Default)]
pub struct PostObjectParams {
    pub uploads: Option<String>,
    #[serde(rename = "uploadId")]
    pub upload_id: Option<String>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Deterministic ETag for an artifact path
///
/// Hex SHA-256 of `container/key`, truncated; stable across reads of the
/// same path. A content-addressed ETag would be the production upgrade.
#[must_use]
pub fn path_etag(container: &str, key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(container.as_bytes());
    hasher.update(b"/");
    hasher.update(key.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("\"{}\"", &digest[..32])
}

/// Content type derived from the key's extension
#[must_use]
pub fn content_type_for(key: &ObjectKey) -> &'static str {
    match key.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("txt") | Some("text") => mime::TEXT_PLAIN.as_ref(),
        Some("html") | Some("htm") => mime::TEXT_HTML.as_ref(),
        Some("css") => mime::TEXT_CSS.as_ref(),
        Some("csv") => mime::TEXT_CSV.as_ref(),
        Some("js") => mime::APPLICATION_JAVASCRIPT.as_ref(),
        Some("json") => mime::APPLICATION_JSON.as_ref(),
        Some("xml") => mime::TEXT_XML.as_ref(),
        Some("pdf") => mime::APPLICATION_PDF.as_ref(),
        Some("png") => mime::IMAGE_PNG.as_ref(),
        Some("jpg") | Some("jpeg") => mime::IMAGE_JPEG.as_ref(),
        Some("gif") => mime::IMAGE_GIF.as_ref(),
        Some("svg") => mime::IMAGE_SVG.as_ref(),
        _ => mime::APPLICATION_OCTET_STREAM.as_ref(),
    }
}

fn http_date(ts: DateTime<Utc>) -> String {
    ts.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn iso_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Validate the bucket path segment
fn parse_bucket(bucket: &str) -> Result<BucketName, Error> {
    BucketName::new(bucket).map_err(Error::from)
}

/// Validate the object path segment
fn parse_key(key: &str) -> Result<ObjectKey, Error> {
    let key = ObjectKey::new(key)?;
    if key.as_str().starts_with(MPU_PREFIX) || key.as_str().starts_with(".tmp/") {
        // Scratch namespaces are not addressable by clients.
        return Err(Error::invalid_request("reserved key prefix"));
    }
    Ok(key)
}

/// Map a driver error onto the gateway error taxonomy
pub fn map_driver_error(err: &DriverError, bucket: &str, key: Option<&str>) -> Error {
    match err {
        DriverError::NotFound(_) => match key {
            Some(k) => Error::ObjectNotFound {
                container: bucket.to_string(),
                key: k.to_string(),
            },
            None => Error::BucketNotFound(bucket.to_string()),
        },
        DriverError::ContainerNotFound(_) => Error::BucketNotFound(bucket.to_string()),
        DriverError::AlreadyExists(_) => Error::BucketAlreadyExists(bucket.to_string()),
        DriverError::NotEmpty(_) => Error::BucketNotEmpty(bucket.to_string()),
        DriverError::Permission(_) => Error::AccessDenied,
        DriverError::Unavailable(msg) | DriverError::Other(msg) => Error::internal(msg.clone()),
    }
}

fn xml_ok(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml")
        .header("x-amz-request-id", Uuid::new_v4().to_string())
        .body(Body::from(body))
        .unwrap()
}

fn empty(status: StatusCode) -> Response {
    Response::builder()
        .status(status)
        .header("x-amz-request-id", Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap()
}

/// Parsed Range header
#[derive(Debug, Clone, Copy)]
struct ByteRange {
    start: u64,
    /// Inclusive end offset
    end: u64,
}

/// Parse an HTTP Range header ("bytes=0-99", "bytes=100-", "bytes=-50")
fn parse_range_header(range_header: &str, total_size: u64) -> Option<ByteRange> {
    let range_header = range_header.trim();
    let range_spec = range_header.strip_prefix("bytes=")?;
    if total_size == 0 {
        return None;
    }

    let (start_str, end_str) = range_spec.split_once('-')?;
    let start_str = start_str.trim();
    let end_str = end_str.trim();

    if start_str.is_empty() && end_str.is_empty() {
        return None;
    }

    // Suffix range: last N bytes.
    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().ok()?;
        if suffix_len == 0 {
            return None;
        }
        let start = total_size.saturating_sub(suffix_len);
        return Some(ByteRange {
            start,
            end: total_size - 1,
        });
    }

    let start: u64 = start_str.parse().ok()?;
    if start >= total_size {
        return None;
    }

    // Open-ended range: from start to the end.
    if end_str.is_empty() {
        return Some(ByteRange {
            start,
            end: total_size - 1,
        });
    }

    let end: u64 = end_str.parse().ok()?;
    if start > end {
        return None;
    }
    Some(ByteRange {
        start,
        end: end.min(total_size - 1),
    })
}

/// Slice `[start, start + len)` out of a byte stream
///
/// The engine's readers are not seekable in general, so ranged reads
/// skip leading bytes and cut the stream off once the window is served.
fn slice_stream(stream: ByteStream, start: u64, len: u64) -> ByteStream {
    stream
        .scan((start, len), |state, chunk| {
            let (to_skip, remaining) = state;
            if *remaining == 0 {
                return futures::future::ready(None);
            }
            let item = match chunk {
                Ok(mut bytes) => {
                    if *to_skip >= bytes.len() as u64 {
                        *to_skip -= bytes.len() as u64;
                        Ok(bytes::Bytes::new())
                    } else {
                        if *to_skip > 0 {
                            bytes = bytes.split_off(*to_skip as usize);
                            *to_skip = 0;
                        }
                        if bytes.len() as u64 > *remaining {
                            bytes.truncate(*remaining as usize);
                        }
                        *remaining -= bytes.len() as u64;
                        Ok(bytes)
                    }
                }
                Err(e) => {
                    *remaining = 0;
                    Err(e)
                }
            };
            futures::future::ready(Some(item))
        })
        .filter(|item| {
            let keep = !matches!(item, Ok(bytes) if bytes.is_empty());
            futures::future::ready(keep)
        })
        .boxed()
}

/// Turn an axum request body into the engine's stream type
pub fn body_stream(body: Body) -> ByteStream {
    body.into_data_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other))
        .boxed()
}

// ============================================================================
// Bucket operations
// ============================================================================

/// List the tenant's buckets (GET /)
pub async fn list_buckets(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let tenant = &identity.tenant;
    let prefix = tenant.namespace_prefix();

    match state.engine.list_containers(&prefix).await {
        Ok(containers) => {
            state.report_backend(true, 0, None);
            let buckets = containers
                .iter()
                .filter_map(|c| {
                    TenantDirectory::strip_namespace(tenant, &c.name).map(|name| Bucket {
                        name: name.to_string(),
                        creation_date: iso_date(c.created),
                    })
                })
                .collect();
            let result = ListAllMyBucketsResult {
                owner: Owner {
                    id: tenant.tenant_id.to_string(),
                    display_name: tenant.tenant_id.to_string(),
                },
                buckets: Buckets { bucket: buckets },
            };
            xml_ok(to_xml_body(&result))
        }
        Err(e) => {
            state.report_backend(false, 0, Some(e.to_string()));
            error!("failed to list containers: {}", e);
            error_response(&map_driver_error(&e, "", None), Some("/"))
        }
    }
}

/// Create a bucket (PUT /{bucket})
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let bucket_name = match parse_bucket(&bucket) {
        Ok(b) => b,
        Err(e) => return error_response(&e, Some(&bucket)),
    };
    let container = TenantDirectory::namespace_container(&identity.tenant, &bucket_name);

    match state.engine.create_container(&container).await {
        Ok(()) => {
            state.report_backend(true, 0, None);
            info!("created bucket {} for {}", bucket, identity.tenant.tenant_id);
            Response::builder()
                .status(StatusCode::OK)
                .header(header::LOCATION, format!("/{bucket}"))
                .header("x-amz-request-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap()
        }
        Err(e) => {
            let mapped = map_driver_error(&e, &bucket, None);
            if !matches!(e, DriverError::AlreadyExists(_)) {
                state.report_backend(false, 0, Some(e.to_string()));
                error!("failed to create bucket {}: {}", bucket, e);
            }
            error_response(&mapped, Some(&bucket))
        }
    }
}

/// Delete a bucket (DELETE /{bucket})
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let bucket_name = match parse_bucket(&bucket) {
        Ok(b) => b,
        Err(e) => return error_response(&e, Some(&bucket)),
    };
    let container = TenantDirectory::namespace_container(&identity.tenant, &bucket_name);

    match state.engine.delete_container(&container).await {
        Ok(()) => {
            state.report_backend(true, 0, None);
            info!("deleted bucket {} for {}", bucket, identity.tenant.tenant_id);
            empty(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            let mapped = map_driver_error(&e, &bucket, None);
            error_response(&mapped, Some(&bucket))
        }
    }
}

/// Check bucket existence (HEAD /{bucket})
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let Ok(bucket_name) = parse_bucket(&bucket) else {
        return empty(StatusCode::BAD_REQUEST);
    };
    let container = TenantDirectory::namespace_container(&identity.tenant, &bucket_name);

    match state.engine.container_exists(&container).await {
        Ok(true) => empty(StatusCode::OK),
        Ok(false) => empty(StatusCode::NOT_FOUND),
        Err(_) => empty(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// List objects in a bucket (GET /{bucket})
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    Query(params): Query<ListObjectsParams>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let bucket_name = match parse_bucket(&bucket) {
        Ok(b) => b,
        Err(e) => return error_response(&e, Some(&bucket)),
    };
    let container = TenantDirectory::namespace_container(&identity.tenant, &bucket_name);
    let prefix = params.prefix.unwrap_or_default();
    let max_keys = params.max_keys.unwrap_or(1000).min(1000);

    let listed = match state.engine.list(&container, &prefix).await {
        Ok(listed) => listed,
        Err(e) if e.is_transient() => {
            state.report_backend(false, 0, Some(e.to_string()));
            match state.engine.list(&container, &prefix).await {
                Ok(listed) => listed,
                Err(e) => {
                    return error_response(&map_driver_error(&e, &bucket, None), Some(&bucket));
                }
            }
        }
        Err(e) => {
            return error_response(&map_driver_error(&e, &bucket, None), Some(&bucket));
        }
    };
    state.report_backend(true, 0, None);

    let truncated = listed.len() > max_keys as usize;
    let contents: Vec<ObjectContent> = listed
        .iter()
        .filter(|info| !info.key.starts_with(MPU_PREFIX))
        .take(max_keys as usize)
        .map(|info| ObjectContent {
            key: info.key.clone(),
            last_modified: iso_date(info.last_modified),
            etag: path_etag(&container, &info.key),
            size: info.size,
            storage_class: "STANDARD".to_string(),
        })
        .collect();

    let result = ListBucketResult {
        name: bucket_name.to_string(),
        prefix,
        max_keys,
        is_truncated: truncated,
        contents,
    };
    xml_ok(to_xml_body(&result))
}

// ============================================================================
// Object operations
// ============================================================================

/// Upload an object or a part (PUT /{bucket}/{key}[?partNumber&uploadId])
pub async fn put_object_with_params(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<PutObjectParams>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    if let (Some(upload_id), Some(part_number)) = (&params.upload_id, params.part_number) {
        return multipart::upload_part(
            &state, &identity, &bucket, &key, upload_id, part_number, &headers, body,
        )
        .await;
    }
    put_object(&state, &identity, &bucket, &key, &headers, body).await
}

async fn put_object(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let (bucket_name, object_key) = match (parse_bucket(bucket), parse_key(key)) {
        (Ok(b), Ok(k)) => (b, k),
        (Err(e), _) | (_, Err(e)) => return error_response(&e, Some(bucket)),
    };
    let tenant = &identity.tenant;
    let container = TenantDirectory::namespace_container(tenant, &bucket_name);

    let Some(content_length) = content_length(headers) else {
        return error_response(&Error::MissingContentLength, Some(key));
    };
    if content_length > state.config.s3.max_object_size {
        return error_response(
            &Error::EntityTooLarge {
                size: content_length,
                limit: state.config.s3.max_object_size,
            },
            Some(key),
        );
    }

    // Reserve before the first body byte is read; every exit path below
    // settles the reservation exactly once.
    match state.quotas.check_and_reserve(&tenant.tenant_id, content_length) {
        Ok(true) => {}
        Ok(false) => {
            let usage = state.quotas.get_usage(&tenant.tenant_id).ok();
            let available = usage.map_or(0, |u| {
                u.limit_bytes.saturating_sub(u.used_bytes + u.reserved_bytes)
            });
            return error_response(
                &Error::InsufficientQuota {
                    requested: content_length,
                    available,
                },
                Some(key),
            );
        }
        Err(e) => return error_response(&e, Some(key)),
    }

    let stream = body_stream(body);
    match state.engine.put(&container, object_key.as_str(), stream).await {
        Ok(written) if written == content_length => {
            state.quotas.commit(&tenant.tenant_id, content_length).ok();
            state.report_backend(true, written, None);
            let etag = path_etag(&container, object_key.as_str());
            debug!(
                "put {}/{} ({} bytes) for {}",
                bucket, key, written, tenant.tenant_id
            );
            Response::builder()
                .status(StatusCode::OK)
                .header(header::ETAG, etag)
                .header("x-amz-request-id", Uuid::new_v4().to_string())
                .header("x-amz-version-id", "null")
                .body(Body::empty())
                .unwrap()
        }
        Ok(written) => {
            // Short body: the artifact must not stay visible.
            state.quotas.release(&tenant.tenant_id, content_length).ok();
            state.engine.delete(&container, object_key.as_str()).await.ok();
            error_response(
                &Error::IncompleteBody {
                    expected: content_length,
                    actual: written,
                },
                Some(key),
            )
        }
        Err(e) => {
            state.quotas.release(&tenant.tenant_id, content_length).ok();
            state.report_backend(false, 0, Some(e.to_string()));
            error!("put {}/{} failed: {}", bucket, key, e);
            let mapped = match e {
                DriverError::ContainerNotFound(_) => Error::BucketNotFound(bucket.to_string()),
                other => Error::internal(other.to_string()),
            };
            error_response(&mapped, Some(key))
        }
    }
}

/// Download an object or list upload parts (GET /{bucket}/{key}[?uploadId])
pub async fn get_object_with_params(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<GetObjectParams>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
) -> Response {
    if let Some(upload_id) = &params.upload_id {
        return multipart::list_parts(
            &state,
            &identity,
            &bucket,
            &key,
            upload_id,
            params.max_parts.unwrap_or(1000),
        );
    }
    get_object(&state, &identity, &bucket, &key, &headers, false).await
}

/// Object metadata (HEAD /{bucket}/{key})
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
) -> Response {
    get_object(&state, &identity, &bucket, &key, &headers, true).await
}

async fn get_object(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
    headers: &HeaderMap,
    head_only: bool,
) -> Response {
    let (bucket_name, object_key) = match (parse_bucket(bucket), parse_key(key)) {
        (Ok(b), Ok(k)) => (b, k),
        (Err(e), _) | (_, Err(e)) => return error_response(&e, Some(bucket)),
    };
    let container = TenantDirectory::namespace_container(&identity.tenant, &bucket_name);

    let info = match state.engine.stat(&container, object_key.as_str()).await {
        Ok(info) => info,
        Err(e) if e.is_transient() => {
            state.report_backend(false, 0, Some(e.to_string()));
            match state.engine.stat(&container, object_key.as_str()).await {
                Ok(info) => info,
                Err(e) => {
                    return error_response(&map_driver_error(&e, bucket, Some(key)), Some(key));
                }
            }
        }
        Err(e) => {
            return error_response(&map_driver_error(&e, bucket, Some(key)), Some(key));
        }
    };

    let etag = path_etag(&container, object_key.as_str());
    let content_type = content_type_for(&object_key);
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range_header(v, info.size));

    let mut builder = Response::builder()
        .header(header::ETAG, etag.as_str())
        .header(header::CONTENT_TYPE, content_type)
        .header(header::LAST_MODIFIED, http_date(info.last_modified))
        .header(header::ACCEPT_RANGES, "bytes")
        .header("x-amz-request-id", Uuid::new_v4().to_string())
        .header("x-amz-version-id", "null")
        .header("x-amz-storage-class", "STANDARD");

    let (status, start, len) = match range {
        Some(r) => {
            builder = builder.header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", r.start, r.end, info.size),
            );
            (StatusCode::PARTIAL_CONTENT, r.start, r.end - r.start + 1)
        }
        None => (StatusCode::OK, 0, info.size),
    };
    builder = builder
        .status(status)
        .header(header::CONTENT_LENGTH, len.to_string());

    if head_only {
        return builder.body(Body::empty()).unwrap();
    }

    let stream = match state.engine.get(&container, object_key.as_str()).await {
        Ok(stream) => stream,
        Err(e) if e.is_transient() => {
            state.report_backend(false, 0, Some(e.to_string()));
            match state.engine.get(&container, object_key.as_str()).await {
                Ok(stream) => stream,
                Err(e) => {
                    return error_response(&map_driver_error(&e, bucket, Some(key)), Some(key));
                }
            }
        }
        Err(e) => {
            return error_response(&map_driver_error(&e, bucket, Some(key)), Some(key));
        }
    };
    state.report_backend(true, len, None);

    let body_stream = if range.is_some() {
        slice_stream(stream, start, len)
    } else {
        stream
    };
    builder.body(Body::from_stream(body_stream)).unwrap()
}

/// Delete an object or abort an upload (DELETE /{bucket}/{key}[?uploadId])
pub async fn delete_object_with_params(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<DeleteObjectParams>,
    Extension(identity): Extension<Identity>,
) -> Response {
    if let Some(upload_id) = &params.upload_id {
        return multipart::abort_upload(&state, &identity, &bucket, &key, upload_id).await;
    }
    delete_object(&state, &identity, &bucket, &key).await
}

async fn delete_object(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
) -> Response {
    let (bucket_name, object_key) = match (parse_bucket(bucket), parse_key(key)) {
        (Ok(b), Ok(k)) => (b, k),
        (Err(e), _) | (_, Err(e)) => return error_response(&e, Some(bucket)),
    };
    let tenant = &identity.tenant;
    let container = TenantDirectory::namespace_container(tenant, &bucket_name);

    // Size is read up front so a successful delete can be accounted.
    let size = state
        .engine
        .stat(&container, object_key.as_str())
        .await
        .map(|info| info.size)
        .ok();

    match state.engine.delete(&container, object_key.as_str()).await {
        Ok(()) => {
            state.report_backend(true, 0, None);
            if let Some(size) = size {
                state.quotas.account(&tenant.tenant_id, -(size as i64)).ok();
            }
            empty(StatusCode::NO_CONTENT)
        }
        // DELETE of an absent key succeeds per S3 semantics.
        Err(DriverError::NotFound(_) | DriverError::ContainerNotFound(_)) => {
            empty(StatusCode::NO_CONTENT)
        }
        Err(e) if e.is_transient() => {
            state.report_backend(false, 0, Some(e.to_string()));
            match state.engine.delete(&container, object_key.as_str()).await {
                Ok(()) | Err(DriverError::NotFound(_) | DriverError::ContainerNotFound(_)) => {
                    if let Some(size) = size {
                        state.quotas.account(&tenant.tenant_id, -(size as i64)).ok();
                    }
                    empty(StatusCode::NO_CONTENT)
                }
                Err(e) => {
                    error!("delete {}/{} failed: {}", bucket, key, e);
                    error_response(&Error::internal(e.to_string()), Some(key))
                }
            }
        }
        Err(e) => {
            state.report_backend(false, 0, Some(e.to_string()));
            error!("delete {}/{} failed: {}", bucket, key, e);
            error_response(&Error::internal(e.to_string()), Some(key))
        }
    }
}

/// Multipart initiate/complete (POST /{bucket}/{key}?uploads|uploadId)
pub async fn post_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    Query(params): Query<PostObjectParams>,
    Extension(identity): Extension<Identity>,
    body: axum::body::Bytes,
) -> Response {
    if params.uploads.is_some() {
        return multipart::initiate_upload(&state, &identity, &bucket, &key);
    }
    if let Some(upload_id) = &params.upload_id {
        return multipart::complete_upload(&state, &identity, &bucket, &key, upload_id, &body)
            .await;
    }
    s3_error_response(
        "NotImplemented",
        "POST on an object requires ?uploads or ?uploadId",
        StatusCode::NOT_IMPLEMENTED,
    )
}

/// Catch-all for request shapes outside the operation table
pub async fn not_implemented() -> Response {
    s3_error_response(
        "NotImplemented",
        "The requested operation is not implemented",
        StatusCode::NOT_IMPLEMENTED,
    )
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_etag_is_stable_and_quoted() {
        let a = path_etag("acme_docs", "k.txt");
        let b = path_etag("acme_docs", "k.txt");
        assert_eq!(a, b);
        assert!(a.starts_with('"') && a.ends_with('"'));
        assert_ne!(a, path_etag("acme_docs", "other.txt"));
        assert_ne!(a, path_etag("rival_docs", "k.txt"));
    }

    #[test]
    fn test_content_type_from_extension() {
        let key = |s: &str| ObjectKey::new_unchecked(s);
        assert_eq!(content_type_for(&key("a.txt")), "text/plain");
        assert_eq!(content_type_for(&key("a.json")), "application/json");
        assert_eq!(content_type_for(&key("a.PNG")), "image/png");
        assert_eq!(content_type_for(&key("a")), "application/octet-stream");
    }

    #[test]
    fn test_parse_range_header() {
        let r = parse_range_header("bytes=0-99", 1000).unwrap();
        assert_eq!((r.start, r.end), (0, 99));

        let r = parse_range_header("bytes=100-", 1000).unwrap();
        assert_eq!((r.start, r.end), (100, 999));

        let r = parse_range_header("bytes=-50", 1000).unwrap();
        assert_eq!((r.start, r.end), (950, 999));

        // End past the object is clamped.
        let r = parse_range_header("bytes=10-5000", 1000).unwrap();
        assert_eq!((r.start, r.end), (10, 999));

        assert!(parse_range_header("bytes=1000-", 1000).is_none());
        assert!(parse_range_header("bytes=5-2", 1000).is_none());
        assert!(parse_range_header("items=0-1", 1000).is_none());
    }

    #[tokio::test]
    async fn test_slice_stream_window() {
        let chunks: Vec<std::io::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from_static(b"hello ")),
            Ok(bytes::Bytes::from_static(b"wide ")),
            Ok(bytes::Bytes::from_static(b"world")),
        ];
        let stream: ByteStream = futures::stream::iter(chunks).boxed();
        let sliced = slice_stream(stream, 6, 4);
        let collected = portico_storage::driver::collect_stream(sliced).await.unwrap();
        assert_eq!(&collected[..], b"wide");
    }

    #[test]
    fn test_reserved_prefixes_rejected() {
        assert!(parse_key(".mpu/u1/00001").is_err());
        assert!(parse_key(".tmp/x").is_err());
        assert!(parse_key("normal/key.txt").is_ok());
    }

    #[test]
    fn test_driver_error_mapping() {
        let err = map_driver_error(&DriverError::NotFound("x".into()), "b", Some("k"));
        assert_eq!(err.s3_error_code(), "NoSuchKey");
        let err = map_driver_error(&DriverError::NotFound("x".into()), "b", None);
        assert_eq!(err.s3_error_code(), "NoSuchBucket");
        let err = map_driver_error(&DriverError::NotEmpty("x".into()), "b", None);
        assert_eq!(err.s3_error_code(), "BucketNotEmpty");
        let err = map_driver_error(&DriverError::Unavailable("x".into()), "b", None);
        assert_eq!(err.s3_error_code(), "InternalError");
    }
}
