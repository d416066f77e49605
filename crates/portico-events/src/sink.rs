//! Access-log sinks

use crate::event::Event;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Destination for drained access events
#[async_trait]
pub trait AccessLogSink: Send + Sync {
    /// Persist one event
    async fn record(&self, event: &Event) -> std::io::Result<()>;
}

/// Sink that logs events through tracing
pub struct TracingSink;

#[async_trait]
impl AccessLogSink for TracingSink {
    async fn record(&self, event: &Event) -> std::io::Result<()> {
        info!(
            tenant = %event.tenant_id,
            operation = %event.operation,
            container = %event.container,
            artifact = event.artifact.as_deref().unwrap_or("-"),
            status = event.data.status,
            size = event.data.size,
            "access"
        );
        Ok(())
    }
}

/// Sink that appends CSV rows to a file
pub struct CsvSink {
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl CsvSink {
    /// Open (or create) the log file and write the header if new
    pub async fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let existing = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if existing == 0 {
            file.write_all(
                b"timestamp,tenant_id,operation,container,artifact,method,path,size,status\n",
            )
            .await?;
        }
        Ok(Self {
            file: tokio::sync::Mutex::new(file),
        })
    }
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[async_trait]
impl AccessLogSink for CsvSink {
    async fn record(&self, event: &Event) -> std::io::Result<()> {
        let row = format!(
            "{},{},{},{},{},{},{},{},{}\n",
            event.at.to_rfc3339(),
            csv_escape(&event.tenant_id),
            csv_escape(&event.operation),
            csv_escape(&event.container),
            csv_escape(event.artifact.as_deref().unwrap_or("")),
            csv_escape(&event.data.method),
            csv_escape(&event.data.path),
            event.data.size,
            event.data.status,
        );
        let mut file = self.file.lock().await;
        file.write_all(row.as_bytes()).await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventData;

    #[tokio::test]
    async fn test_csv_sink_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.csv");
        let sink = CsvSink::open(&path).await.unwrap();

        let event = Event::access(
            "acme",
            "GetObject",
            "acme_docs",
            Some("a,b.txt".to_string()),
            EventData {
                method: "GET".to_string(),
                path: "/docs/a,b.txt".to_string(),
                size: 12,
                header_count: 3,
                query_count: 1,
                status: 200,
            },
        );
        sink.record(&event).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let mut lines = contents.lines();
        assert!(lines.next().unwrap().starts_with("timestamp,"));
        let row = lines.next().unwrap();
        assert!(row.contains("acme"));
        assert!(row.contains("\"a,b.txt\""));
        assert!(row.ends_with(",200"));
    }
}
