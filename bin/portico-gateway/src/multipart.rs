//! Multipart upload handling
//!
//! Parts are real engine artifacts under `.mpu/<uploadId>/<part>` in the
//! destination container; Complete streams them back in part-number
//! order into the final key and removes the scratch artifacts. The
//! upload registry is process-local, so a restart forfeits in-flight
//! uploads the same way it forfeits unsettled reservations.

use crate::auth_middleware::Identity;
use crate::s3::{AppState, body_stream, map_driver_error, path_etag};
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use portico_common::{BucketName, Error, ObjectKey, TenantId};
use portico_s3::error_response;
use portico_s3::xml::{
    CompleteMultipartUploadResult, CompleteMultipartUploadXml, InitiateMultipartUploadResult,
    ListPartsResult, PartItem, to_xml_body,
};
use portico_storage::ByteStream;
use portico_tenant::TenantDirectory;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Highest part number S3 accepts
const MAX_PART_NUMBER: u32 = 10_000;

/// One uploaded part
#[derive(Debug, Clone)]
pub struct PartRecord {
    pub size: u64,
    pub etag: String,
    pub uploaded_at: DateTime<Utc>,
}

/// An in-flight multipart upload
#[derive(Debug, Clone)]
pub struct MultipartUpload {
    pub upload_id: String,
    pub tenant_id: TenantId,
    pub bucket: String,
    pub key: String,
    pub container: String,
    pub initiated: DateTime<Utc>,
    pub parts: BTreeMap<u32, PartRecord>,
}

impl MultipartUpload {
    /// Scratch key for one part within the destination container
    #[must_use]
    pub fn scratch_key(&self, part_number: u32) -> String {
        format!("{}{}/{:05}", crate::s3::MPU_PREFIX, self.upload_id, part_number)
    }

    /// Total bytes across uploaded parts
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.parts.values().map(|p| p.size).sum()
    }
}

/// Registry of in-flight uploads
pub struct MultipartRegistry {
    uploads: RwLock<HashMap<String, MultipartUpload>>,
}

impl Default for MultipartRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self {
            uploads: RwLock::new(HashMap::new()),
        }
    }

    /// Start an upload and return its id
    pub fn initiate(
        &self,
        tenant_id: TenantId,
        bucket: String,
        key: String,
        container: String,
    ) -> String {
        let upload_id = Uuid::new_v4().simple().to_string();
        let upload = MultipartUpload {
            upload_id: upload_id.clone(),
            tenant_id,
            bucket,
            key,
            container,
            initiated: Utc::now(),
            parts: BTreeMap::new(),
        };
        self.uploads.write().insert(upload_id.clone(), upload);
        upload_id
    }

    /// Fetch an upload, checking it belongs to the tenant and key
    pub fn get(
        &self,
        upload_id: &str,
        tenant_id: &TenantId,
        key: &str,
    ) -> Result<MultipartUpload, Error> {
        let uploads = self.uploads.read();
        let upload = uploads
            .get(upload_id)
            .ok_or_else(|| Error::invalid_request(format!("unknown upload id: {upload_id}")))?;
        if &upload.tenant_id != tenant_id || upload.key != key {
            return Err(Error::AccessDenied);
        }
        Ok(upload.clone())
    }

    /// Record a completed part upload
    pub fn record_part(
        &self,
        upload_id: &str,
        part_number: u32,
        size: u64,
        etag: String,
    ) -> Result<(), Error> {
        let mut uploads = self.uploads.write();
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| Error::invalid_request(format!("unknown upload id: {upload_id}")))?;
        upload.parts.insert(
            part_number,
            PartRecord {
                size,
                etag,
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Remove an upload from the registry
    pub fn remove(&self, upload_id: &str) -> Option<MultipartUpload> {
        self.uploads.write().remove(upload_id)
    }

    /// Number of in-flight uploads
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.uploads.read().len()
    }
}

// ============================================================================
// Handlers (called from the s3 module's dispatchers)
// ============================================================================

/// Start a multipart upload (POST /{bucket}/{key}?uploads)
pub fn initiate_upload(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
) -> Response {
    let (bucket_name, object_key) = match validate(bucket, key) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e, Some(key)),
    };
    let container = TenantDirectory::namespace_container(&identity.tenant, &bucket_name);

    let upload_id = state.uploads.initiate(
        identity.tenant.tenant_id.clone(),
        bucket.to_string(),
        object_key.as_str().to_string(),
        container,
    );
    info!(
        "initiated multipart upload {} for {}/{}",
        upload_id, bucket, key
    );

    let result = InitiateMultipartUploadResult {
        bucket: bucket.to_string(),
        key: object_key.as_str().to_string(),
        upload_id,
    };
    xml_ok(to_xml_body(&result))
}

/// Upload one part (PUT /{bucket}/{key}?partNumber=N&uploadId=U)
#[allow(clippy::too_many_arguments)]
pub async fn upload_part(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: u32,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    if part_number == 0 || part_number > MAX_PART_NUMBER {
        return error_response(
            &Error::invalid_request(format!("part number out of range: {part_number}")),
            Some(key),
        );
    }
    let (_, object_key) = match validate(bucket, key) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e, Some(key)),
    };

    let upload = match state
        .uploads
        .get(upload_id, &identity.tenant.tenant_id, object_key.as_str())
    {
        Ok(upload) => upload,
        Err(e) => return error_response(&e, Some(key)),
    };

    let Some(content_length) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
    else {
        return error_response(&Error::MissingContentLength, Some(key));
    };

    // Parts consume quota as they land, so an abandoned upload is visible
    // in usage until abort reclaims it.
    match state
        .quotas
        .check_and_reserve(&identity.tenant.tenant_id, content_length)
    {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                &Error::InsufficientQuota {
                    requested: content_length,
                    available: 0,
                },
                Some(key),
            );
        }
        Err(e) => return error_response(&e, Some(key)),
    }

    let scratch = upload.scratch_key(part_number);
    match state
        .engine
        .put(&upload.container, &scratch, body_stream(body))
        .await
    {
        Ok(written) if written == content_length => {
            state
                .quotas
                .commit(&identity.tenant.tenant_id, content_length)
                .ok();
            state.report_backend(true, written, None);
            let etag = path_etag(&upload.container, &scratch);
            if let Err(e) = state
                .uploads
                .record_part(upload_id, part_number, written, etag.clone())
            {
                return error_response(&e, Some(key));
            }
            debug!(
                "upload {} part {} ({} bytes) for {}/{}",
                upload_id, part_number, written, bucket, key
            );
            Response::builder()
                .status(StatusCode::OK)
                .header(header::ETAG, etag)
                .header("x-amz-request-id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap()
        }
        Ok(written) => {
            state
                .quotas
                .release(&identity.tenant.tenant_id, content_length)
                .ok();
            state.engine.delete(&upload.container, &scratch).await.ok();
            error_response(
                &Error::IncompleteBody {
                    expected: content_length,
                    actual: written,
                },
                Some(key),
            )
        }
        Err(e) => {
            state
                .quotas
                .release(&identity.tenant.tenant_id, content_length)
                .ok();
            state.report_backend(false, 0, Some(e.to_string()));
            error_response(&map_driver_error(&e, bucket, Some(key)), Some(key))
        }
    }
}

/// Assemble the final artifact (POST /{bucket}/{key}?uploadId=U)
pub async fn complete_upload(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
    upload_id: &str,
    body: &Bytes,
) -> Response {
    let (_, object_key) = match validate(bucket, key) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e, Some(key)),
    };
    let tenant_id = &identity.tenant.tenant_id;

    let upload = match state.uploads.get(upload_id, tenant_id, object_key.as_str()) {
        Ok(upload) => upload,
        Err(e) => return error_response(&e, Some(key)),
    };

    let requested: CompleteMultipartUploadXml = match quick_xml::de::from_reader(body.as_ref()) {
        Ok(parsed) => parsed,
        Err(e) => {
            return error_response(&Error::MalformedXml(e.to_string()), Some(key));
        }
    };
    if requested.parts.is_empty() {
        return error_response(
            &Error::invalid_request("CompleteMultipartUpload requires at least one part"),
            Some(key),
        );
    }

    // Part numbers must be known and strictly ascending.
    let mut part_numbers = Vec::with_capacity(requested.parts.len());
    for part in &requested.parts {
        if !upload.parts.contains_key(&part.part_number) {
            return error_response(
                &Error::invalid_request(format!("part {} was never uploaded", part.part_number)),
                Some(key),
            );
        }
        if part_numbers.last().is_some_and(|&last| part.part_number <= last) {
            return error_response(
                &Error::invalid_request("parts must be listed in ascending order"),
                Some(key),
            );
        }
        part_numbers.push(part.part_number);
    }

    let assembled_size: u64 = part_numbers
        .iter()
        .map(|n| upload.parts[n].size)
        .sum();

    // The assembled artifact needs its own reservation; scratch parts are
    // released from `used` once they are deleted below.
    match state.quotas.check_and_reserve(tenant_id, assembled_size) {
        Ok(true) => {}
        Ok(false) => {
            return error_response(
                &Error::InsufficientQuota {
                    requested: assembled_size,
                    available: 0,
                },
                Some(key),
            );
        }
        Err(e) => return error_response(&e, Some(key)),
    }

    // Open all part streams in order, then flatten into one body.
    let mut part_streams: Vec<ByteStream> = Vec::with_capacity(part_numbers.len());
    for n in &part_numbers {
        match state.engine.get(&upload.container, &upload.scratch_key(*n)).await {
            Ok(stream) => part_streams.push(stream),
            Err(e) => {
                state.quotas.release(tenant_id, assembled_size).ok();
                state.report_backend(false, 0, Some(e.to_string()));
                return error_response(&map_driver_error(&e, bucket, Some(key)), Some(key));
            }
        }
    }
    let combined: ByteStream = futures::stream::iter(part_streams).flatten().boxed();

    match state
        .engine
        .put(&upload.container, object_key.as_str(), combined)
        .await
    {
        Ok(written) => {
            state.quotas.commit(tenant_id, assembled_size).ok();
            state.report_backend(true, written, None);
        }
        Err(e) => {
            state.quotas.release(tenant_id, assembled_size).ok();
            state.report_backend(false, 0, Some(e.to_string()));
            return error_response(&map_driver_error(&e, bucket, Some(key)), Some(key));
        }
    }

    // Scratch parts are gone from storage and from usage accounting.
    let mut reclaimed = 0u64;
    for (n, record) in &upload.parts {
        if state
            .engine
            .delete(&upload.container, &upload.scratch_key(*n))
            .await
            .is_ok()
        {
            reclaimed += record.size;
        } else {
            warn!("failed to remove scratch part {} of {}", n, upload_id);
        }
    }
    state.quotas.account(tenant_id, -(reclaimed as i64)).ok();
    state.uploads.remove(upload_id);

    info!(
        "completed multipart upload {} for {}/{} ({} parts, {} bytes)",
        upload_id,
        bucket,
        key,
        part_numbers.len(),
        assembled_size
    );

    let result = CompleteMultipartUploadResult {
        location: format!("/{bucket}/{key}"),
        bucket: bucket.to_string(),
        key: object_key.as_str().to_string(),
        etag: path_etag(&upload.container, object_key.as_str()),
    };
    xml_ok(to_xml_body(&result))
}

/// Abandon an upload and reclaim its parts (DELETE ...?uploadId=U)
pub async fn abort_upload(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Response {
    let (_, object_key) = match validate(bucket, key) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e, Some(key)),
    };
    let tenant_id = &identity.tenant.tenant_id;

    let upload = match state.uploads.get(upload_id, tenant_id, object_key.as_str()) {
        Ok(upload) => upload,
        Err(e) => return error_response(&e, Some(key)),
    };

    let mut reclaimed = 0u64;
    for (n, record) in &upload.parts {
        if state
            .engine
            .delete(&upload.container, &upload.scratch_key(*n))
            .await
            .is_ok()
        {
            reclaimed += record.size;
        }
    }
    state.quotas.account(tenant_id, -(reclaimed as i64)).ok();
    state.uploads.remove(upload_id);

    info!("aborted multipart upload {} for {}/{}", upload_id, bucket, key);
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("x-amz-request-id", Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap()
}

/// List uploaded parts (GET /{bucket}/{key}?uploadId=U)
pub fn list_parts(
    state: &Arc<AppState>,
    identity: &Identity,
    bucket: &str,
    key: &str,
    upload_id: &str,
    max_parts: u32,
) -> Response {
    let (_, object_key) = match validate(bucket, key) {
        Ok(pair) => pair,
        Err(e) => return error_response(&e, Some(key)),
    };

    let upload = match state
        .uploads
        .get(upload_id, &identity.tenant.tenant_id, object_key.as_str())
    {
        Ok(upload) => upload,
        Err(e) => return error_response(&e, Some(key)),
    };

    let truncated = upload.parts.len() > max_parts as usize;
    let parts: Vec<PartItem> = upload
        .parts
        .iter()
        .take(max_parts as usize)
        .map(|(n, record)| PartItem {
            part_number: *n,
            last_modified: record.uploaded_at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
            etag: record.etag.clone(),
            size: record.size,
        })
        .collect();

    let result = ListPartsResult {
        bucket: bucket.to_string(),
        key: object_key.as_str().to_string(),
        upload_id: upload_id.to_string(),
        max_parts,
        is_truncated: truncated,
        parts,
    };
    xml_ok(to_xml_body(&result))
}

fn validate(bucket: &str, key: &str) -> Result<(BucketName, ObjectKey), Error> {
    let bucket = BucketName::new(bucket)?;
    let key = ObjectKey::new(key)?;
    if key.as_str().starts_with(crate::s3::MPU_PREFIX) {
        return Err(Error::invalid_request("reserved key prefix"));
    }
    Ok((bucket, key))
}

fn xml_ok(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/xml")
        .header("x-amz-request-id", Uuid::new_v4().to_string())
        .body(Body::from(body))
        .unwrap()
}
