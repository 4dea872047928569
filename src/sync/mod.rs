//! Cloud synchronizer.
//!
//! Pushes and pulls one atomic envelope holding every student, every pod and the
//! per-pod metadata bundles. The remote document is last-writer-wins; nothing is
//! merged on push and nothing is retried automatically.

pub mod envelope;
pub mod recovery;
pub mod remote;
pub mod shared_config;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{default_root_path, default_timeout_ms, RemoteSettings};
use crate::model::{record_id, PODS, STUDENTS};
use crate::store::{keys, now_iso, LocalStore};
use envelope::{
    content_hash, parse_remote, CloudEnvelope, CollectionFingerprints, EnvelopeShape, Fingerprint,
    ENVELOPE_VERSION,
};
use remote::{RemoteError, RemoteReplica};

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("No cloud data")]
    NoCloudData,

    #[error("unreadable cloud envelope: {0}")]
    Envelope(String),
}

impl SyncError {
    pub fn is_disabled(&self) -> bool {
        matches!(self, SyncError::Remote(RemoteError::Disabled))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReceipt {
    pub timestamp: String,
    pub students: usize,
    pub pods: usize,
    pub pods_with_metadata: usize,
}

#[derive(Debug, Clone)]
pub struct PullResult {
    pub envelope: CloudEnvelope,
    pub shape: EnvelopeShape,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub verified: bool,
    pub cloud_students: usize,
    pub cloud_pods: usize,
}

pub struct CloudSync {
    replica: Option<Box<dyn RemoteReplica>>,
    root_path: String,
    default_timeout: Duration,
    backend_url: Option<String>,
}

impl CloudSync {
    pub fn disabled() -> Self {
        Self {
            replica: None,
            root_path: default_root_path(),
            default_timeout: Duration::from_millis(default_timeout_ms()),
            backend_url: None,
        }
    }

    pub fn from_settings(settings: Option<&RemoteSettings>) -> Self {
        let Some(settings) = settings else {
            return Self::disabled();
        };
        match remote::connect(settings) {
            Ok(replica) => {
                info!(remote = %replica.describe(), root = %settings.root_path, "remote sync enabled");
                Self::with_replica(replica, settings)
            }
            Err(e) => {
                warn!(error = %e, "remote sync disabled");
                Self::disabled()
            }
        }
    }

    pub fn with_replica(replica: Box<dyn RemoteReplica>, settings: &RemoteSettings) -> Self {
        Self {
            replica: Some(replica),
            root_path: settings.root_path.trim_matches('/').to_string(),
            default_timeout: Duration::from_millis(settings.timeout_ms),
            backend_url: settings.backend_url.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.replica.is_some()
    }

    pub fn describe(&self) -> Option<String> {
        self.replica.as_ref().map(|r| r.describe())
    }

    pub(crate) fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref()
    }

    fn snapshot_path(&self) -> String {
        format!("{}/snapshot", self.root_path)
    }

    fn replica(&self) -> Result<&dyn RemoteReplica, RemoteError> {
        self.replica.as_deref().ok_or(RemoteError::Disabled)
    }

    /// Runs a remote call under the caller's deadline, or the configured default.
    async fn deadline<T, F>(&self, timeout: Option<Duration>, fut: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        let limit = timeout.unwrap_or(self.default_timeout);
        match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(RemoteError::Timeout(limit.as_millis() as u64)),
        }
    }

    fn record_failure(&self, store: &LocalStore, err: &SyncError) {
        if err.is_disabled() {
            return;
        }
        store.set_json(keys::LAST_SYNC_ERROR, &err.to_string());
    }

    /// Builds the envelope from `students`, `pods` and the stored pod metadata,
    /// then replaces the remote document.
    pub async fn push(
        &self,
        store: &LocalStore,
        students: &[Value],
        pods: &[Value],
        timeout: Option<Duration>,
    ) -> Result<PushReceipt, SyncError> {
        let replica = self.replica()?;
        let envelope = build_envelope(store, students, pods);
        let receipt = PushReceipt {
            timestamp: envelope.last_sync.clone().unwrap_or_default(),
            students: envelope.students.len(),
            pods: envelope.pods.len(),
            pods_with_metadata: envelope.pod_metadata.len(),
        };
        let doc = serde_json::to_value(&envelope).map_err(|e| SyncError::Envelope(e.to_string()));
        let result = match doc {
            Ok(doc) => self
                .deadline(timeout, replica.write(&self.snapshot_path(), &doc))
                .await
                .map_err(SyncError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                store.set_json(keys::LAST_CLOUD_SYNC, &receipt.timestamp);
                store.remove_key(keys::LAST_SYNC_ERROR);
                if let Some(fp) = &envelope.fingerprints {
                    store.set_json(keys::SYNC_BASELINE, fp);
                }
                info!(
                    students = receipt.students,
                    pods = receipt.pods,
                    with_metadata = receipt.pods_with_metadata,
                    "pushed cloud snapshot"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(error = %e, "cloud push failed");
                self.record_failure(store, &e);
                Err(e)
            }
        }
    }

    /// Reads the remote envelope without touching the local store.
    pub async fn fetch(&self, timeout: Option<Duration>) -> Result<PullResult, SyncError> {
        let replica = self.replica()?;
        let doc = self
            .deadline(timeout, replica.read(&self.snapshot_path()))
            .await?
            .ok_or(SyncError::NoCloudData)?;
        let (envelope, shape) =
            parse_remote(doc).map_err(|e| SyncError::Envelope(e.to_string()))?;
        Ok(PullResult { envelope, shape })
    }

    /// Reads the remote envelope and materializes its pod metadata locally.
    /// Collections are returned, not written; see [`CloudSync::apply`].
    pub async fn pull(
        &self,
        store: &LocalStore,
        timeout: Option<Duration>,
    ) -> Result<PullResult, SyncError> {
        match self.fetch(timeout).await {
            Ok(pulled) => {
                materialize_metadata(store, &pulled.envelope);
                info!(
                    students = pulled.envelope.students.len(),
                    pods = pulled.envelope.pods.len(),
                    shape = pulled.shape.as_str(),
                    "pulled cloud snapshot"
                );
                Ok(pulled)
            }
            Err(e) => {
                if !matches!(e, SyncError::NoCloudData) {
                    warn!(error = %e, "cloud pull failed");
                    self.record_failure(store, &e);
                }
                Err(e)
            }
        }
    }

    /// Overwrites both local collections with a pulled envelope and records it
    /// as the new sync baseline.
    pub fn apply(&self, store: &LocalStore, pulled: &PullResult) -> bool {
        let env = &pulled.envelope;
        let saved = store.save_collection(STUDENTS, &env.students)
            && store.save_collection(PODS, &env.pods);
        if !saved {
            return false;
        }
        materialize_metadata(store, env);
        let last_sync = env.last_sync.clone().unwrap_or_else(now_iso);
        store.set_json(keys::LAST_CLOUD_SYNC, &last_sync);
        store.set_json(keys::SYNC_BASELINE, &local_fingerprints(store));
        true
    }

    /// Best-effort post-write check: re-reads the remote and compares counts.
    pub async fn verify(
        &self,
        expected_students: usize,
        expected_pods: usize,
        timeout: Option<Duration>,
    ) -> Result<VerifyReport, SyncError> {
        let pulled = self.fetch(timeout).await?;
        let cloud_students = pulled.envelope.students.len();
        let cloud_pods = pulled.envelope.pods.len();
        Ok(VerifyReport {
            verified: cloud_students == expected_students && cloud_pods == expected_pods,
            cloud_students,
            cloud_pods,
        })
    }

    pub(crate) async fn read_document(
        &self,
        doc: SharedDoc,
        timeout: Option<Duration>,
    ) -> Result<Option<Value>, RemoteError> {
        let replica = self.replica()?;
        self.deadline(timeout, replica.read(&self.document_path(doc)))
            .await
    }

    pub(crate) async fn write_document(
        &self,
        doc: SharedDoc,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<(), RemoteError> {
        let replica = self.replica()?;
        self.deadline(timeout, replica.write(&self.document_path(doc), body))
            .await
    }

    fn document_path(&self, doc: SharedDoc) -> String {
        match doc {
            SharedDoc::Config => format!("{}/sharedConfig", self.root_path),
        }
    }
}

/// Documents stored next to the snapshot.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SharedDoc {
    Config,
}

pub fn local_fingerprints(store: &LocalStore) -> CollectionFingerprints {
    let students: Vec<Value> = store.load_collection(STUDENTS);
    let pods: Vec<Value> = store.load_collection(PODS);
    CollectionFingerprints {
        students: Fingerprint {
            version: store.collection_version(STUDENTS),
            hash: content_hash(&students),
        },
        pods: Fingerprint {
            version: store.collection_version(PODS),
            hash: content_hash(&pods),
        },
    }
}

fn build_envelope(store: &LocalStore, students: &[Value], pods: &[Value]) -> CloudEnvelope {
    let mut pod_metadata = BTreeMap::new();
    for pod_id in pods.iter().filter_map(|p| record_id(p, "id")) {
        let bundle = store.pod_metadata(pod_id);
        if !bundle.is_empty() {
            pod_metadata.insert(pod_id.to_string(), bundle);
        }
    }
    CloudEnvelope {
        students: students.to_vec(),
        pods: pods.to_vec(),
        pod_metadata,
        last_sync: Some(now_iso()),
        version: ENVELOPE_VERSION.to_string(),
        fingerprints: Some(CollectionFingerprints {
            students: Fingerprint {
                version: store.collection_version(STUDENTS),
                hash: content_hash(students),
            },
            pods: Fingerprint {
                version: store.collection_version(PODS),
                hash: content_hash(pods),
            },
        }),
        device_id: Some(store.device_id()),
    }
}

fn materialize_metadata(store: &LocalStore, envelope: &CloudEnvelope) {
    for (pod_id, bundle) in &envelope.pod_metadata {
        if !store.write_pod_metadata(pod_id, bundle) {
            warn!(pod_id = %pod_id, "failed to store pulled pod metadata");
        }
    }
}

/// Push/pull outcomes in the `{success, ...}` shape the UI consumes.
pub fn failure_json(err: &SyncError) -> Value {
    match err {
        SyncError::Remote(RemoteError::Disabled) => {
            serde_json::json!({ "success": false, "reason": "not enabled" })
        }
        SyncError::NoCloudData => serde_json::json!({ "success": false, "reason": "No cloud data" }),
        other => serde_json::json!({ "success": false, "error": other.to_string() }),
    }
}
