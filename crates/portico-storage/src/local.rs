//! Local filesystem driver
//!
//! Artifacts live under `<root>/<container>/<key>`. Writes stream into a
//! scratch file under the container's `.tmp/` directory and rename into
//! place, so a partially consumed upload is never visible.

use crate::driver::{ArtifactInfo, ByteStream, ContainerInfo, Driver, DriverError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

/// Scratch directory name inside each container
const TMP_DIR: &str = ".tmp";

/// Driver backed by a local directory tree
pub struct LocalFsDriver {
    id: String,
    root: PathBuf,
}

impl LocalFsDriver {
    /// Create a driver rooted at `root`; the directory is created if absent
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            id: id.into(),
            root,
        })
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        self.root.join(container)
    }

    fn artifact_path(&self, container: &str, key: &str) -> Result<PathBuf, DriverError> {
        // Keys are validated at the edge, but a driver still refuses to
        // step outside its container.
        if key.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(DriverError::Other(format!("unsafe key: {key}")));
        }
        Ok(self.container_dir(container).join(key))
    }
}

/// Removes the scratch file unless the write completed
struct TempGuard {
    path: PathBuf,
    armed: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("failed to remove scratch file {:?}: {}", self.path, e);
                }
            }
        }
    }
}

fn modified_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map_or_else(|_| Utc::now(), DateTime::from)
}

#[async_trait]
impl Driver for LocalFsDriver {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, container: &str, key: &str) -> Result<ByteStream, DriverError> {
        let path = self.artifact_path(container, key)?;
        let target = format!("{container}/{key}");
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;
        Ok(ReaderStream::new(file).boxed())
    }

    async fn put(&self, container: &str, key: &str, body: ByteStream) -> Result<u64, DriverError> {
        let target = format!("{container}/{key}");
        let final_path = self.artifact_path(container, key)?;

        // Containers appear implicitly on first write.
        let tmp_dir = self.container_dir(container).join(TMP_DIR);
        tokio::fs::create_dir_all(&tmp_dir)
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DriverError::from_io(&e, &target))?;
        }

        let tmp_path = tmp_dir.join(Uuid::new_v4().to_string());
        let mut guard = TempGuard::new(tmp_path.clone());

        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;

        let mut written = 0u64;
        let mut body = body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| DriverError::Other(format!("{target}: body: {e}")))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DriverError::from_io(&e, &target))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;
        file.sync_all()
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;
        drop(file);

        tokio::fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;
        guard.disarm();

        debug!("stored {} ({} bytes)", target, written);
        Ok(written)
    }

    async fn delete(&self, container: &str, key: &str) -> Result<(), DriverError> {
        let path = self.artifact_path(container, key)?;
        let target = format!("{container}/{key}");
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;

        // Prune now-empty key directories so an emptied container can be
        // removed; stops at the first non-empty level.
        let container_root = self.container_dir(container);
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == container_root || tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            parent = dir.parent();
        }
        Ok(())
    }

    async fn stat(&self, container: &str, key: &str) -> Result<ArtifactInfo, DriverError> {
        let path = self.artifact_path(container, key)?;
        let target = format!("{container}/{key}");
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| DriverError::from_io(&e, &target))?;
        if !meta.is_file() {
            return Err(DriverError::NotFound(target));
        }
        Ok(ArtifactInfo {
            key: key.to_string(),
            size: meta.len(),
            last_modified: modified_time(&meta),
        })
    }

    async fn list(&self, container: &str, prefix: &str) -> Result<Vec<ArtifactInfo>, DriverError> {
        let dir = self.container_dir(container);
        if !dir.is_dir() {
            return Err(DriverError::ContainerNotFound(container.to_string()));
        }

        let mut out = Vec::new();
        let mut stack = vec![dir.clone()];
        while let Some(cur) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&cur)
                .await
                .map_err(|e| DriverError::from_io(&e, container))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| DriverError::from_io(&e, container))?
            {
                let path = entry.path();
                let name = entry.file_name();
                if cur == dir && name == TMP_DIR {
                    continue;
                }
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| DriverError::from_io(&e, container))?;
                if meta.is_dir() {
                    stack.push(path);
                } else if meta.is_file() {
                    let key = relative_key(&dir, &path)?;
                    if key.starts_with(prefix) {
                        out.push(ArtifactInfo {
                            key,
                            size: meta.len(),
                            last_modified: modified_time(&meta),
                        });
                    }
                }
            }
        }

        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn create_container(&self, container: &str) -> Result<(), DriverError> {
        let dir = self.container_dir(container);
        if dir.exists() {
            return Err(DriverError::AlreadyExists(container.to_string()));
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DriverError::from_io(&e, container))
    }

    async fn delete_container(&self, container: &str) -> Result<(), DriverError> {
        let dir = self.container_dir(container);
        if !dir.is_dir() {
            return Err(DriverError::ContainerNotFound(container.to_string()));
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| DriverError::from_io(&e, container))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DriverError::from_io(&e, container))?
        {
            if entry.file_name() != TMP_DIR {
                return Err(DriverError::NotEmpty(container.to_string()));
            }
        }

        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(|e| DriverError::from_io(&e, container))
    }

    async fn container_exists(&self, container: &str) -> Result<bool, DriverError> {
        Ok(self.container_dir(container).is_dir())
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<ContainerInfo>, DriverError> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| DriverError::from_io(&e, "root"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DriverError::from_io(&e, "root"))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| DriverError::from_io(&e, "root"))?;
            if !meta.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) {
                out.push(ContainerInfo {
                    name,
                    created: meta.created().map_or_else(|_| Utc::now(), DateTime::from),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn health_probe(&self) -> Result<Duration, DriverError> {
        let start = Instant::now();
        tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| DriverError::Unavailable(format!("root: {e}")))?;
        Ok(start.elapsed())
    }
}

fn relative_key(base: &Path, path: &Path) -> Result<String, DriverError> {
    let rel = path
        .strip_prefix(base)
        .map_err(|_| DriverError::Other(format!("path escaped container: {path:?}")))?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{collect_stream, stream_from_bytes};
    use bytes::Bytes;

    fn driver() -> (tempfile::TempDir, LocalFsDriver) {
        let dir = tempfile::tempdir().unwrap();
        let drv = LocalFsDriver::new("local", dir.path()).unwrap();
        (dir, drv)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_dir, drv) = driver();
        let body = Bytes::from_static(b"hello world");
        let n = drv
            .put("t1_docs", "a/b.txt", stream_from_bytes(body.clone()))
            .await
            .unwrap();
        assert_eq!(n, body.len() as u64);

        let got = collect_stream(drv.get("t1_docs", "a/b.txt").await.unwrap())
            .await
            .unwrap();
        assert_eq!(got, body);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, drv) = driver();
        assert!(matches!(
            drv.get("t1_docs", "nope").await,
            Err(DriverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_put_leaves_nothing_visible() {
        let (_dir, drv) = driver();
        let broken: ByteStream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "client hung up")),
        ])
        .boxed();

        assert!(drv.put("t1_docs", "k", broken).await.is_err());
        assert!(matches!(
            drv.stat("t1_docs", "k").await,
            Err(DriverError::NotFound(_))
        ));
        // Scratch file was reclaimed too.
        let listed = drv.list("t1_docs", "").await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_reports_not_found() {
        let (_dir, drv) = driver();
        drv.put("t1_docs", "k", stream_from_bytes(Bytes::from_static(b"x")))
            .await
            .unwrap();
        drv.delete("t1_docs", "k").await.unwrap();
        assert!(matches!(
            drv.delete("t1_docs", "k").await,
            Err(DriverError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_prefix_filtered() {
        let (_dir, drv) = driver();
        for key in ["b.txt", "a.txt", "dir/c.txt"] {
            drv.put("t1_docs", key, stream_from_bytes(Bytes::from_static(b"x")))
                .await
                .unwrap();
        }

        let all = drv.list("t1_docs", "").await.unwrap();
        let keys: Vec<&str> = all.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "b.txt", "dir/c.txt"]);

        let under_dir = drv.list("t1_docs", "dir/").await.unwrap();
        assert_eq!(under_dir.len(), 1);
        assert_eq!(under_dir[0].key, "dir/c.txt");
    }

    #[tokio::test]
    async fn test_container_lifecycle() {
        let (_dir, drv) = driver();
        drv.create_container("t1_photos").await.unwrap();
        assert!(drv.container_exists("t1_photos").await.unwrap());
        assert!(matches!(
            drv.create_container("t1_photos").await,
            Err(DriverError::AlreadyExists(_))
        ));

        drv.put("t1_photos", "p.jpg", stream_from_bytes(Bytes::from_static(b"x")))
            .await
            .unwrap();
        assert!(matches!(
            drv.delete_container("t1_photos").await,
            Err(DriverError::NotEmpty(_))
        ));

        drv.delete("t1_photos", "p.jpg").await.unwrap();
        drv.delete_container("t1_photos").await.unwrap();
        assert!(!drv.container_exists("t1_photos").await.unwrap());
    }

    #[tokio::test]
    async fn test_nested_delete_leaves_container_removable() {
        let (_dir, drv) = driver();
        drv.create_container("t1_docs").await.unwrap();
        drv.put(
            "t1_docs",
            "a/b/c.txt",
            stream_from_bytes(Bytes::from_static(b"x")),
        )
        .await
        .unwrap();

        drv.delete("t1_docs", "a/b/c.txt").await.unwrap();
        drv.delete_container("t1_docs").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_containers_by_prefix() {
        let (_dir, drv) = driver();
        drv.create_container("t1_docs").await.unwrap();
        drv.create_container("t1_photos").await.unwrap();
        drv.create_container("t2_docs").await.unwrap();

        let t1 = drv.list_containers("t1_").await.unwrap();
        let names: Vec<&str> = t1.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["t1_docs", "t1_photos"]);
    }

    #[tokio::test]
    async fn test_health_probe_reports_latency() {
        let (_dir, drv) = driver();
        let latency = drv.health_probe().await.unwrap();
        assert!(latency < Duration::from_secs(1));
    }
}
