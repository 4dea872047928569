//! Namespaced keys inside the local medium.

pub const BACKUPS_STUDENTS: &str = "roster.students.backups";

pub const LAST_CLOUD_SYNC: &str = "sync.lastCloudSync";
pub const LAST_SYNC_ERROR: &str = "sync.lastError";
pub const SYNC_BASELINE: &str = "sync.baseline";
pub const REMOTE_SETTINGS: &str = "sync.remoteSettings";
pub const DEVICE_ID: &str = "sync.deviceId";

pub const AUTO_BACKUP_ENABLED: &str = "prefs.autoBackupEnabled";
pub const AUTO_CLOUD_SYNC_ENABLED: &str = "prefs.autoCloudSyncEnabled";

pub const AI_CONFIG: &str = "ai.config";

pub fn collection(name: &str) -> String {
    format!("roster.{}", name)
}

pub fn collection_version(name: &str) -> String {
    format!("roster.{}.version", name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodMetaField {
    Plan,
    PlanHistory,
    Execution,
    Feedback,
}

impl PodMetaField {
    fn suffix(self) -> &'static str {
        match self {
            PodMetaField::Plan => "plan",
            PodMetaField::PlanHistory => "planHistory",
            PodMetaField::Execution => "execution",
            PodMetaField::Feedback => "feedback",
        }
    }

    pub fn key(self, pod_id: &str) -> String {
        format!("pod.{}.{}", pod_id, self.suffix())
    }
}
