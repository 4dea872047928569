//! Transports for the remote replica.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::RemoteSettings;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("remote sync not enabled")]
    Disabled,

    #[error("unsupported remote url: {0}")]
    UnsupportedUrl(String),

    #[error("network error: {0}")]
    Transport(String),

    #[error("remote call timed out after {0} ms")]
    Timeout(u64),

    #[error("remote returned HTTP {0}")]
    Status(u16),

    #[error("remote document is not valid JSON: {0}")]
    Decode(String),
}

/// A remote holding whole JSON documents at slash-separated paths.
#[async_trait]
pub trait RemoteReplica: Send + Sync {
    /// `None` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> Result<Option<Value>, RemoteError>;

    /// Replaces the whole document at `path`.
    async fn write(&self, path: &str, doc: &Value) -> Result<(), RemoteError>;

    fn describe(&self) -> String;
}

pub fn connect(settings: &RemoteSettings) -> Result<Box<dyn RemoteReplica>, RemoteError> {
    let url = settings.url.trim();
    if let Some(dir) = url.strip_prefix("file://") {
        return Ok(Box::new(FileReplica::new(PathBuf::from(dir))));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Box::new(HttpReplica::new(url, settings.api_key.clone())));
    }
    Err(RemoteError::UnsupportedUrl(url.to_string()))
}

/// REST document store: `GET`/`PUT {base}/{path}.json?auth={key}`.
pub struct HttpReplica {
    client: reqwest::Client,
    base: String,
    api_key: Option<String>,
}

impl HttpReplica {
    pub fn new(base: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base, path.trim_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.document_url(path));
        match &self.api_key {
            Some(key) => builder.query(&[("auth", key)]),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteReplica for HttpReplica {
    async fn read(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        let doc: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok((!doc.is_null()).then_some(doc))
    }

    async fn write(&self, path: &str, doc: &Value) -> Result<(), RemoteError> {
        let response = self
            .request(reqwest::Method::PUT, path)
            .json(doc)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.base.clone()
    }
}

/// Documents as `{root}/{path}.json` files, e.g. inside a shared folder.
pub struct FileReplica {
    root: PathBuf,
}

impl FileReplica {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn document_path(&self, path: &str) -> PathBuf {
        self.root.join(format!("{}.json", path.trim_matches('/')))
    }
}

fn io_err(path: &Path, e: std::io::Error) -> RemoteError {
    RemoteError::Transport(format!("{}: {}", path.to_string_lossy(), e))
}

#[async_trait]
impl RemoteReplica for FileReplica {
    async fn read(&self, path: &str) -> Result<Option<Value>, RemoteError> {
        let file = self.document_path(path);
        let text = match tokio::fs::read_to_string(&file).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&file, e)),
        };
        let doc: Value =
            serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok((!doc.is_null()).then_some(doc))
    }

    async fn write(&self, path: &str, doc: &Value) -> Result<(), RemoteError> {
        let file = self.document_path(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err(parent, e))?;
        }
        let body =
            serde_json::to_vec_pretty(doc).map_err(|e| RemoteError::Decode(e.to_string()))?;
        // Readers must never observe a half-written document.
        let tmp = file.with_extension("json.writing");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &file)
            .await
            .map_err(|e| io_err(&file, e))?;
        debug!(path = %file.display(), "remote document replaced");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(url: &str) -> RemoteSettings {
        RemoteSettings {
            url: url.into(),
            api_key: Some("secret".into()),
            root_path: "roster".into(),
            timeout_ms: 1000,
            backend_url: None,
        }
    }

    #[test]
    fn connect_rejects_unknown_scheme() {
        assert!(matches!(
            connect(&settings("ftp://nowhere")),
            Err(RemoteError::UnsupportedUrl(_))
        ));
        assert!(connect(&settings("https://sync.example.net/")).is_ok());
    }

    #[test]
    fn http_document_url_joins_path() {
        let replica = HttpReplica::new("https://sync.example.net/", None);
        assert_eq!(
            replica.document_url("/roster/snapshot"),
            "https://sync.example.net/roster/snapshot.json"
        );
    }

    #[tokio::test]
    async fn file_replica_round_trip() {
        let dir = std::env::temp_dir().join(format!("rosterd-file-replica-{}", uuid::Uuid::new_v4()));
        let replica = FileReplica::new(dir.clone());
        assert_eq!(replica.read("roster/snapshot").await.expect("read"), None);
        replica
            .write("roster/snapshot", &json!({ "students": [] }))
            .await
            .expect("write");
        let doc = replica.read("roster/snapshot").await.expect("read");
        assert_eq!(doc, Some(json!({ "students": [] })));
        let _ = std::fs::remove_dir_all(dir);
    }
}
