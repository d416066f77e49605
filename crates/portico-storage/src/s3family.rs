//! S3-family remote driver
//!
//! Forwards artifact operations to a remote S3-compatible service
//! (path-style requests), signing each outbound request with SigV4.

use crate::driver::{ArtifactInfo, ByteStream, ContainerInfo, Driver, DriverError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use portico_auth::sigv4::{SignRequest, aws_escape, sign_headers};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Driver backed by a remote S3-compatible endpoint
pub struct S3FamilyDriver {
    id: String,
    client: reqwest::Client,
    /// Endpoint base URL, no trailing slash
    endpoint: String,
    /// Host header value derived from the endpoint
    host: String,
    access_key: String,
    secret_key: String,
    region: String,
}

impl S3FamilyDriver {
    /// Create a driver for the given endpoint and credentials
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, DriverError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let host = endpoint
            .strip_prefix("https://")
            .or_else(|| endpoint.strip_prefix("http://"))
            .ok_or_else(|| DriverError::Other(format!("invalid endpoint: {endpoint}")))?
            .to_string();

        Ok(Self {
            id: id.into(),
            client: reqwest::Client::new(),
            endpoint,
            host,
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
        })
    }

    fn signed(
        &self,
        method: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Vec<(String, String)> {
        sign_headers(&SignRequest {
            method,
            path,
            query,
            host: &self.host,
            payload_hash: None,
            access_key: &self.access_key,
            secret_key: &self.secret_key,
            region: &self.region,
            now: Utc::now(),
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let mut url = format!("{}{}", self.endpoint, path);
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{}={}", aws_escape(k), aws_escape(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&qs);
        }

        let mut builder = self.client.request(method.clone(), &url);
        for (name, value) in self.signed(method.as_str(), path, query) {
            builder = builder.header(name, value);
        }
        builder
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
        Err(map_status(status, target))
    }
}

fn map_status(status: reqwest::StatusCode, target: &str) -> DriverError {
    match status.as_u16() {
        404 => DriverError::NotFound(target.to_string()),
        401 | 403 => DriverError::Permission(target.to_string()),
        409 => DriverError::AlreadyExists(target.to_string()),
        500..=599 => DriverError::Unavailable(format!("{target}: upstream {status}")),
        _ => DriverError::Other(format!("{target}: upstream {status}")),
    }
}

/// Encode an artifact key, preserving `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(aws_escape)
        .collect::<Vec<_>>()
        .join("/")
}

fn artifact_path(container: &str, key: &str) -> String {
    format!("/{}/{}", container, encode_key(key))
}

fn parse_http_date(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(value).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

// Minimal slices of the upstream list XML.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteListResult {
    #[serde(default)]
    contents: Vec<RemoteContents>,
    #[serde(default)]
    is_truncated: bool,
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteContents {
    key: String,
    size: u64,
    last_modified: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteBucketList {
    buckets: RemoteBuckets,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteBuckets {
    #[serde(default)]
    bucket: Vec<RemoteBucket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteBucket {
    name: String,
    creation_date: String,
}

#[async_trait]
impl Driver for S3FamilyDriver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, container: &str, key: &str) -> Result<ByteStream, DriverError> {
        let target = format!("{container}/{key}");
        let response = self
            .send(
                self.request(reqwest::Method::GET, &artifact_path(container, key), &[]),
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
        let counter = Arc::new(AtomicU64::new(0));
        let counted = {
            let counter = Arc::clone(&counter);
            body.inspect_ok(move |chunk| {
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            })
        };

        // The upstream PUT is atomic on its side; nothing is visible until
        // the service acknowledges the full body.
        self.send(
            self.request(reqwest::Method::PUT, &artifact_path(container, key), &[])
                .body(reqwest::Body::wrap_stream(counted)),
            &target,
        )
        .await?;

        let written = counter.load(Ordering::Relaxed);
        debug!("stored {} ({} bytes) via {}", target, written, self.id);
        Ok(written)
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), DriverError> {
        let target = format!("{container}/{key}");
        self.send(
            self.request(reqwest::Method::DELETE, &artifact_path(container, key), &[]),
            &target,
        )
        .await?;
        Ok(())
    }

    async fn stat(&self, container: &str, key: &str) -> Result<ArtifactInfo, DriverError> {
        let target = format!("{container}/{key}");
        let response = self
            .send(
                self.request(reqwest::Method::HEAD, &artifact_path(container, key), &[]),
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
            .map_or_else(Utc::now, parse_http_date);

        Ok(ArtifactInfo {
            key: key.to_string(),
            size,
            last_modified,
        })
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ArtifactInfo>, DriverError> {
        let mut out = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = vec![
                ("list-type".to_string(), "2".to_string()),
                ("prefix".to_string(), prefix.to_string()),
            ];
            if let Some(token) = &continuation {
                query.push(("continuation-token".to_string(), token.clone()));
            }
            query.sort();

            let response = self
                .send(
                    self.request(reqwest::Method::GET, &format!("/{container}"), &query),
                    container,
                )
                .await?;
            let text = response
                .text()
                .await
                .map_err(|e| DriverError::Unavailable(format!("{container}: {e}")))?;
            let page: RemoteListResult = quick_xml::de::from_str(&text)
                .map_err(|e| DriverError::Other(format!("{container}: bad list body: {e}")))?;

            for item in page.contents {
                let last_modified = DateTime::parse_from_rfc3339(&item.last_modified)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));
                out.push(ArtifactInfo {
                    key: item.key,
                    size: item.size,
                    last_modified,
                });
            }

            if !page.is_truncated {
                break;
            }
            match page.next_continuation_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn create_container(&self, container: &str) -> Result<(), DriverError> {
        self.send(
            self.request(reqwest::Method::PUT, &format!("/{container}"), &[]),
            container,
        )
        .await?;
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> Result<(), DriverError> {
        match self
            .send(
                self.request(reqwest::Method::DELETE, &format!("/{container}"), &[]),
                container,
            )
            .await
        {
            Ok(_) => Ok(()),
            // Upstream 409 on a bucket DELETE means it still has keys.
            Err(DriverError::AlreadyExists(c)) => Err(DriverError::NotEmpty(c)),
            Err(DriverError::NotFound(c)) => Err(DriverError::ContainerNotFound(c)),
            Err(e) => Err(e),
        }
    }

    async fn container_exists(&self, container: &str) -> Result<bool, DriverError> {
        match self
            .send(
                self.request(reqwest::Method::HEAD, &format!("/{container}"), &[]),
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
            .send(self.request(reqwest::Method::GET, "/", &[]), "service")
            .await?;
        let text = response
            .text()
            .await
            .map_err(|e| DriverError::Unavailable(format!("service: {e}")))?;
        let parsed: RemoteBucketList = quick_xml::de::from_str(&text)
            .map_err(|e| DriverError::Other(format!("bad bucket list body: {e}")))?;

        let mut out: Vec<ContainerInfo> = parsed
            .buckets
            .bucket
            .into_iter()
            .filter(|b| b.name.starts_with(prefix))
            .map(|b| ContainerInfo {
                created: DateTime::parse_from_rfc3339(&b.creation_date)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc)),
                name: b.name,
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn health_probe(&self) -> Result<Duration, DriverError> {
        let start = Instant::now();
        self.send(self.request(reqwest::Method::GET, "/", &[]), "probe")
            .await
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(reqwest::StatusCode::NOT_FOUND, "c/k"),
            DriverError::NotFound(_)
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::FORBIDDEN, "c/k"),
            DriverError::Permission(_)
        ));
        assert!(matches!(
            map_status(reqwest::StatusCode::BAD_GATEWAY, "c/k"),
            DriverError::Unavailable(_)
        ));
    }

    #[test]
    fn test_key_encoding_preserves_separators() {
        assert_eq!(encode_key("a/b c.txt"), "a/b%20c.txt");
        assert_eq!(artifact_path("t1_docs", "a/b"), "/t1_docs/a/b");
    }

    #[test]
    fn test_endpoint_host_extraction() {
        let drv = S3FamilyDriver::new("lyve", "https://s3.example.com/", "ak", "sk", "us-east-1")
            .unwrap();
        assert_eq!(drv.host, "s3.example.com");
        assert!(S3FamilyDriver::new("bad", "ftp://x", "ak", "sk", "r").is_err());
    }

    #[test]
    fn test_remote_list_parsing() {
        let xml = r#"<?xml version="1.0"?>
<ListBucketResult>
  <IsTruncated>false</IsTruncated>
  <Contents><Key>a.txt</Key><Size>5</Size><LastModified>2026-01-01T00:00:00.000Z</LastModified></Contents>
  <Contents><Key>b.txt</Key><Size>7</Size><LastModified>2026-01-02T00:00:00.000Z</LastModified></Contents>
</ListBucketResult>"#;
        let parsed: RemoteListResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.contents.len(), 2);
        assert_eq!(parsed.contents[0].key, "a.txt");
        assert!(!parsed.is_truncated);
    }
}
