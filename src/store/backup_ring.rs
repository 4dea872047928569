use serde_json::Value;
use tracing::{info, warn};

use super::{keys, now_iso, LocalStore, WriteHook};
use crate::model::{BackupSnapshot, STUDENTS};

pub const BACKUP_CAPACITY: usize = 5;

/// Captures the students collection a successful save just replaced.
pub struct BackupRing;

impl WriteHook for BackupRing {
    fn after_save(&self, store: &LocalStore, collection: &str, previous: Option<&str>) {
        if collection != STUDENTS || !store.auto_backup_enabled() {
            return;
        }
        let Some(raw) = previous else {
            return;
        };
        match serde_json::from_str::<Vec<Value>>(raw) {
            Ok(replaced) => {
                store.capture_backup(replaced);
            }
            Err(e) => warn!(error = %e, "skipping backup of unreadable students payload"),
        }
    }
}

impl LocalStore {
    pub fn auto_backup_enabled(&self) -> bool {
        self.flag(keys::AUTO_BACKUP_ENABLED, true)
    }

    /// Appends a snapshot, evicting the oldest beyond capacity.
    pub fn capture_backup(&self, items: Vec<Value>) -> bool {
        let mut ring = self.list_backups();
        ring.push(BackupSnapshot {
            ts: now_iso(),
            data: items,
        });
        if ring.len() > BACKUP_CAPACITY {
            let excess = ring.len() - BACKUP_CAPACITY;
            ring.drain(..excess);
        }
        self.set_json(keys::BACKUPS_STUDENTS, &ring)
    }

    /// Oldest first.
    pub fn list_backups(&self) -> Vec<BackupSnapshot> {
        self.get_json(keys::BACKUPS_STUDENTS).unwrap_or_default()
    }

    /// Writes a snapshot back through `save_collection`; a negative index means
    /// the most recent entry. The restore itself is captured like any other save.
    pub fn restore_backup(&self, index: i64) -> bool {
        let ring = self.list_backups();
        if ring.is_empty() {
            return false;
        }
        let idx = if index < 0 {
            ring.len() - 1
        } else {
            index as usize
        };
        let Some(snapshot) = ring.get(idx) else {
            return false;
        };
        info!(index = idx, ts = %snapshot.ts, count = snapshot.data.len(), "restoring students backup");
        self.save_collection(STUDENTS, &snapshot.data)
    }

    pub fn restore_latest_backup(&self) -> bool {
        self.restore_backup(-1)
    }
}
