//! Cloud drive remote driver
//!
//! Forwards artifact operations to a consumer cloud-drive HTTP API:
//! bearer-token auth, JSON listings, and plain file upload/download
//! endpoints under `/files/{container}/{key}`.

use crate::driver::{ArtifactInfo, ByteStream, ContainerInfo, Driver, DriverError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

/// Driver backed by a cloud drive service
pub struct CloudDriveDriver {
    id: String,
    client: reqwest::Client,
    /// API base URL, no trailing slash
    endpoint: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct DriveEntry {
    key: String,
    size: u64,
    modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DriveFolder {
    name: String,
    created: Option<String>,
}

impl CloudDriveDriver {
    /// Create a driver for the given API endpoint and bearer token
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        target: &str,
    ) -> Result<reqwest::Response, DriverError> {
        let response = builder
            .send()
            .await
            .map_err(|e| DriverError::Unavailable(format!("{target}: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(match status.as_u16() {
            404 => DriverError::NotFound(target.to_string()),
            401 | 403 => DriverError::Permission(target.to_string()),
            409 => DriverError::AlreadyExists(target.to_string()),
            500..=599 => DriverError::Unavailable(format!("{target}: upstream {status}")),
            _ => DriverError::Other(format!("{target}: upstream {status}")),
        })
    }
}

fn file_path(container: &str, key: &str) -> String {
    let encoded: String = key
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!("/files/{container}/{encoded}")
}

fn parse_rfc3339(value: Option<&str>) -> DateTime<Utc> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl Driver for CloudDriveDriver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, container: &str, key: &str) -> Result<ByteStream, DriverError> {
        let target = format!("{container}/{key}");
        let response = self
            .send(
                self.request(reqwest::Method::GET, &file_path(container, key)),
                &target,
            )
            .await?;
        Ok(response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }

    async fn put(&self, container: &str, key: &str, body: ByteStream) -> Result<u64, DriverError> {
        let target = format!("{container}/{key}");

        // The drive API has no streaming upload with deferred visibility,
        // so the body is staged in memory and shipped as one request.
        let data = crate::driver::collect_stream(body)
            .await
            .map_err(|e| DriverError::Other(format!("{target}: body: {e}")))?;
        let written = data.len() as u64;

        self.send(
            self.request(reqwest::Method::PUT, &file_path(container, key))
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data),
            &target,
        )
        .await?;

        debug!("stored {} ({} bytes) via {}", target, written, self.id);
        Ok(written)
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), DriverError> {
        let target = format!("{container}/{key}");
        self.send(
            self.request(reqwest::Method::DELETE, &file_path(container, key)),
            &target,
        )
        .await?;
        Ok(())
    }

    async fn stat(&self, container: &str, key: &str) -> Result<ArtifactInfo, DriverError> {
        let target = format!("{container}/{key}");
        let response = self
            .send(
                self.request(reqwest::Method::HEAD, &file_path(container, key)),
                &target,
            )
            .await?;

        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc));

        Ok(ArtifactInfo {
            key: key.to_string(),
            size,
            last_modified,
        })
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ArtifactInfo>, DriverError> {
        let response = self
            .send(
                self.request(
                    reqwest::Method::GET,
                    &format!(
                        "/files/{container}?prefix={}",
                        urlencoding::encode(prefix)
                    ),
                ),
                container,
            )
            .await?;
        let entries: Vec<DriveEntry> = response
            .json()
            .await
            .map_err(|e| DriverError::Other(format!("{container}: bad list body: {e}")))?;

        let mut out: Vec<ArtifactInfo> = entries
            .into_iter()
            .filter(|e| e.key.starts_with(prefix))
            .map(|e| ArtifactInfo {
                last_modified: parse_rfc3339(e.modified.as_deref()),
                key: e.key,
                size: e.size,
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn create_container(&self, container: &str) -> Result<(), DriverError> {
        self.send(
            self.request(reqwest::Method::POST, "/folders")
                .json(&serde_json::json!({ "name": container })),
            container,
        )
        .await?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<(), DriverError> {
        match self
            .send(
                self.request(reqwest::Method::DELETE, &format!("/folders/{container}")),
                container,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(DriverError::AlreadyExists(c)) => Err(DriverError::NotEmpty(c)),
            Err(DriverError::NotFound(c)) => Err(DriverError::ContainerNotFound(c)),
            Err(e) => Err(e),
        }
    }

    async fn container_exists(&self, container: &str) -> Result<bool, DriverError> {
        match self
            .send(
                self.request(reqwest::Method::HEAD, &format!("/folders/{container}")),
                container,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(DriverError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, DriverError> {
        let response = self
            .send(self.request(reqwest::Method::GET, "/folders"), "folders")
            .await?;
        let folders: Vec<DriveFolder> = response
            .json()
            .await
            .map_err(|e| DriverError::Other(format!("bad folder list body: {e}")))?;

        let mut out: Vec<ContainerInfo> = folders
            .into_iter()
            .filter(|f| f.name.starts_with(prefix))
            .map(|f| ContainerInfo {
                created: parse_rfc3339(f.created.as_deref()),
                name: f.name,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn health_probe(&self) -> Result<Duration, DriverError> {
        let start = Instant::now();
        self.send(self.request(reqwest::Method::GET, "/ping"), "probe")
            .await
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(start.elapsed())
    }
}
