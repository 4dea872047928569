//! Startup auto-recovery.
//!
//! Decides whether the remote snapshot should replace the local collections.
//! When both sides carry content fingerprints and a shared baseline exists, the
//! decision is made on content; otherwise it falls back to comparing counts and
//! last-sync timestamps, which cannot see divergent edits of equal size.

use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::envelope::CollectionFingerprints;
use super::remote::RemoteError;
use super::{local_fingerprints, CloudSync, SyncError};
use crate::model::{PODS, STUDENTS};
use crate::store::{keys, LocalStore};

pub const REASON_CURRENT: &str = "Local data is current";
pub const REASON_CONFLICT: &str = "Local and cloud data diverged since last sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Checking,
    Deciding,
    NoCloudData,
    Recovering,
    UpToDate,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    MissingPodsLocally,
    MissingStudentsLocally,
    CloudNewer,
    RemoteChanged,
    ForcedOverConflict,
}

#[derive(Debug, Clone)]
pub struct LocalView {
    pub students: usize,
    pub pods: usize,
    pub last_sync: Option<String>,
    pub fingerprints: CollectionFingerprints,
    pub baseline: Option<CollectionFingerprints>,
}

#[derive(Debug, Clone)]
pub struct RemoteView {
    pub students: usize,
    pub pods: usize,
    pub last_sync: Option<String>,
    pub fingerprints: Option<CollectionFingerprints>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    UpToDate,
    Recover(Vec<Trigger>),
    Conflict,
}

fn parse_ts(ts: Option<&str>) -> Option<DateTime<FixedOffset>> {
    ts.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

pub fn decide(local: &LocalView, remote: &RemoteView, force: bool) -> Decision {
    if let Some(remote_fp) = &remote.fingerprints {
        if remote_fp.same_content(&local.fingerprints) {
            return Decision::UpToDate;
        }
        if let Some(baseline) = &local.baseline {
            let remote_changed = !remote_fp.same_content(baseline);
            let local_changed = !local.fingerprints.same_content(baseline);
            return match (remote_changed, local_changed) {
                (false, _) => Decision::UpToDate,
                (true, false) => Decision::Recover(vec![Trigger::RemoteChanged]),
                (true, true) if force => Decision::Recover(vec![Trigger::ForcedOverConflict]),
                (true, true) => Decision::Conflict,
            };
        }
    }

    let mut triggers = Vec::new();
    if local.pods == 0 && remote.pods > 0 {
        triggers.push(Trigger::MissingPodsLocally);
    }
    if local.students < remote.students {
        triggers.push(Trigger::MissingStudentsLocally);
    }
    let cloud_newer = match (parse_ts(remote.last_sync.as_deref()), parse_ts(local.last_sync.as_deref())) {
        (Some(remote_ts), Some(local_ts)) => remote_ts > local_ts,
        (Some(_), None) => true,
        _ => false,
    };
    if cloud_newer {
        triggers.push(Trigger::CloudNewer);
    }
    if triggers.is_empty() {
        Decision::UpToDate
    } else {
        Decision::Recover(triggers)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub recovered: bool,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub triggers: Vec<Trigger>,
    pub conflict: bool,
    pub students_restored: usize,
    pub pods_restored: usize,
    pub local_students: usize,
    pub local_pods: usize,
    pub cloud_students: usize,
    pub cloud_pods: usize,
}

impl RecoveryReport {
    fn new(local: &LocalView) -> Self {
        Self {
            recovered: false,
            state: "checking",
            reason: None,
            triggers: Vec::new(),
            conflict: false,
            students_restored: 0,
            pods_restored: 0,
            local_students: local.students,
            local_pods: local.pods,
            cloud_students: 0,
            cloud_pods: 0,
        }
    }

    fn finish(mut self, phase: Phase, reason: Option<String>) -> Self {
        self.state = match phase {
            Phase::NoCloudData => "noCloudData",
            Phase::Recovering => "recovered",
            Phase::UpToDate => "upToDate",
            Phase::Conflict => "conflict",
            Phase::Checking | Phase::Deciding => "checking",
        };
        self.reason = reason;
        debug!(state = self.state, "auto-recovery finished");
        self
    }
}

fn local_view(store: &LocalStore) -> LocalView {
    let students: Vec<Value> = store.load_collection(STUDENTS);
    let pods: Vec<Value> = store.load_collection(PODS);
    LocalView {
        students: students.len(),
        pods: pods.len(),
        last_sync: store.get_json(keys::LAST_CLOUD_SYNC),
        fingerprints: local_fingerprints(store),
        baseline: store.get_json(keys::SYNC_BASELINE),
    }
}

/// Pull, compare and, when warranted, overwrite both local collections.
///
/// The remote envelope is read without side effects; pod metadata is only
/// materialized when the local collections are actually replaced.
pub async fn run_auto_recovery(
    sync: &CloudSync,
    store: &LocalStore,
    force: bool,
    timeout: Option<Duration>,
) -> RecoveryReport {
    let local = local_view(store);
    let mut report = RecoveryReport::new(&local);
    debug!(phase = ?Phase::Checking, students = local.students, pods = local.pods, "auto-recovery");

    let pulled = match sync.fetch(timeout).await {
        Ok(p) => p,
        Err(e) => {
            if !matches!(e, SyncError::NoCloudData) && !e.is_disabled() {
                warn!(error = %e, "auto-recovery could not read cloud snapshot");
                store.set_json(keys::LAST_SYNC_ERROR, &e.to_string());
            }
            let reason = match &e {
                SyncError::Remote(RemoteError::Disabled) => "not enabled".to_string(),
                other => other.to_string(),
            };
            return report.finish(Phase::NoCloudData, Some(reason));
        }
    };

    let remote = RemoteView {
        students: pulled.envelope.students.len(),
        pods: pulled.envelope.pods.len(),
        last_sync: pulled.envelope.last_sync.clone(),
        fingerprints: pulled.envelope.fingerprints.clone(),
    };
    report.cloud_students = remote.students;
    report.cloud_pods = remote.pods;
    debug!(phase = ?Phase::Deciding, cloud_students = remote.students, cloud_pods = remote.pods, "auto-recovery");

    match decide(&local, &remote, force) {
        Decision::UpToDate => report.finish(Phase::UpToDate, Some(REASON_CURRENT.to_string())),
        Decision::Conflict => {
            warn!(
                local_students = local.students,
                cloud_students = remote.students,
                "local and cloud snapshots diverged; leaving local data untouched"
            );
            report.conflict = true;
            report.finish(Phase::Conflict, Some(REASON_CONFLICT.to_string()))
        }
        Decision::Recover(triggers) => {
            report.triggers = triggers;
            if !sync.apply(store, &pulled) {
                return report.finish(
                    Phase::NoCloudData,
                    Some("failed to write recovered collections".to_string()),
                );
            }
            report.recovered = true;
            report.students_restored = remote.students;
            report.pods_restored = remote.pods;
            info!(
                students = remote.students,
                pods = remote.pods,
                triggers = ?report.triggers,
                "recovered local data from cloud"
            );
            report.finish(Phase::Recovering, None)
        }
    }
}
