//! Local-first key/value store.
//!
//! Collections are serialized JSON arrays stored under `roster.<name>`. The store
//! is the read path for the whole session; nothing here ever raises to the caller.
//! Read failures degrade to "no data" and write failures to `false`, with the
//! cause logged.

mod backup_ring;
pub mod keys;
mod medium;
mod pod_meta;

use std::cell::Cell;
use std::collections::HashSet;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub use backup_ring::{BackupRing, BACKUP_CAPACITY};
pub use medium::{KvMedium, MemoryMedium, SqliteMedium, StoreError};

use crate::model::id_prefix_for;

/// Runs after a collection write succeeds. `previous` is the payload the write
/// replaced, read before the write.
pub trait WriteHook {
    fn after_save(&self, store: &LocalStore, collection: &str, previous: Option<&str>);
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub record: Value,
    pub created: bool,
    pub saved: bool,
}

pub struct LocalStore {
    medium: Box<dyn KvMedium>,
    hooks: Vec<Box<dyn WriteHook>>,
    last_id_millis: Cell<i64>,
}

pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

impl LocalStore {
    /// A store with no write hooks installed.
    pub fn new(medium: Box<dyn KvMedium>) -> Self {
        Self {
            medium,
            hooks: Vec::new(),
            last_id_millis: Cell::new(0),
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn WriteHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// A store with the students backup ring installed.
    pub fn standard(medium: Box<dyn KvMedium>) -> Self {
        Self::new(medium).with_hook(Box::new(BackupRing))
    }

    pub fn in_memory() -> Self {
        Self::standard(Box::new(MemoryMedium::new()))
    }

    /// Opens the SQLite-backed store in `workspace`, falling back to memory.
    pub fn open(workspace: &Path) -> Self {
        match SqliteMedium::open(workspace) {
            Ok(medium) => Self::standard(Box::new(medium)),
            Err(e) => {
                warn!(
                    workspace = %workspace.display(),
                    error = %e,
                    "persistent medium unavailable, using in-memory store"
                );
                Self::in_memory()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.medium.is_persistent()
    }

    pub fn get_raw(&self, key: &str) -> Option<String> {
        match self.medium.get(key) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "read failed");
                None
            }
        }
    }

    pub fn set_raw(&self, key: &str, value: &str) -> bool {
        match self.medium.set(key, value) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "write failed");
                false
            }
        }
    }

    pub fn remove_key(&self, key: &str) -> bool {
        match self.medium.remove(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "remove failed");
                false
            }
        }
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                let err = StoreError::Deserialize {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                warn!(error = %err, "ignoring stored value");
                None
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_raw(key, &raw),
            Err(e) => {
                warn!(key, error = %e, "failed to serialize value");
                false
            }
        }
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.get_json::<bool>(key).unwrap_or(default)
    }

    pub fn set_flag(&self, key: &str, value: bool) -> bool {
        self.set_json(key, &value)
    }

    pub fn load_collection<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
        self.get_json::<Vec<T>>(&keys::collection(name))
            .unwrap_or_default()
    }

    /// Serializes and writes `items`, then runs the write hooks.
    pub fn save_collection<T: Serialize>(&self, name: &str, items: &[T]) -> bool {
        let raw = match serde_json::to_string(items) {
            Ok(v) => v,
            Err(e) => {
                warn!(collection = name, error = %e, "failed to serialize collection");
                return false;
            }
        };
        let key = keys::collection(name);
        let previous = if self.hooks.is_empty() {
            None
        } else {
            self.get_raw(&key)
        };
        if !self.set_raw(&key, &raw) {
            return false;
        }
        for hook in &self.hooks {
            hook.after_save(self, name, previous.as_deref());
        }
        let version = self.collection_version(name) + 1;
        self.set_json(&keys::collection_version(name), &version);
        debug!(collection = name, count = items.len(), version, "collection saved");
        true
    }

    /// Local write counter for a collection, bumped on every save.
    pub fn collection_version(&self, name: &str) -> u64 {
        self.get_json(&keys::collection_version(name)).unwrap_or(0)
    }

    /// `prefix + millisecond timestamp`, strictly increasing within this store.
    pub fn next_id(&self, prefix: &str) -> String {
        let now = chrono::Utc::now().timestamp_millis();
        let millis = now.max(self.last_id_millis.get() + 1);
        self.last_id_millis.set(millis);
        format!("{}{}", prefix, millis)
    }

    /// Sparse-merges `patch` into the record whose `id_field` matches, or appends.
    ///
    /// Absent keys and empty strings leave existing fields alone; an explicit
    /// `null` clears the field.
    pub fn upsert(&self, name: &str, patch: &Map<String, Value>, id_field: &str) -> UpsertOutcome {
        let mut items: Vec<Value> = self.load_collection(name);
        let now = now_iso();
        let wanted_id = patch
            .get(id_field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let existing = wanted_id.as_ref().and_then(|id| {
            items
                .iter()
                .position(|it| it.get(id_field).and_then(|v| v.as_str()) == Some(id.as_str()))
        });

        let (record, created) = match existing {
            Some(idx) => {
                if let Value::Object(current) = &mut items[idx] {
                    sparse_merge(current, patch, id_field);
                    current.insert("updatedAt".into(), Value::String(now));
                } else {
                    let mut fresh = Map::new();
                    sparse_merge(&mut fresh, patch, id_field);
                    fresh.insert(id_field.into(), Value::String(wanted_id.clone().unwrap_or_default()));
                    fresh.insert("updatedAt".into(), Value::String(now));
                    items[idx] = Value::Object(fresh);
                }
                (items[idx].clone(), false)
            }
            None => {
                let id = wanted_id.unwrap_or_else(|| self.next_id(id_prefix_for(name)));
                let mut fresh = Map::new();
                sparse_merge(&mut fresh, patch, id_field);
                fresh.remove("createdAt");
                fresh.insert(id_field.into(), Value::String(id));
                fresh.insert("createdAt".into(), Value::String(now.clone()));
                fresh.insert("updatedAt".into(), Value::String(now));
                let record = Value::Object(fresh);
                items.push(record.clone());
                (record, true)
            }
        };

        let saved = self.save_collection(name, &items);
        UpsertOutcome {
            record,
            created,
            saved,
        }
    }

    /// Filters `id` out of the collection and persists. False when nothing was
    /// removed or the write failed.
    pub fn remove(&self, name: &str, id: &str, id_field: &str) -> bool {
        let mut items: Vec<Value> = self.load_collection(name);
        let before = items.len();
        items.retain(|it| it.get(id_field).and_then(|v| v.as_str()) != Some(id));
        if items.len() == before {
            return false;
        }
        self.save_collection(name, &items)
    }

    pub fn device_id(&self) -> String {
        if let Some(id) = self.get_json::<String>(keys::DEVICE_ID) {
            return id;
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.set_json(keys::DEVICE_ID, &id);
        id
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        match self.medium.entries() {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to enumerate store entries");
                Vec::new()
            }
        }
    }

    /// Replaces every entry in the medium. Imported entries are written before
    /// stale keys are removed. Write hooks do not run.
    pub fn replace_entries(&self, entries: &[(String, String)]) -> bool {
        let existing = self.entries();
        if !entries.iter().all(|(k, v)| self.set_raw(k, v)) {
            return false;
        }
        let incoming: HashSet<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        existing
            .iter()
            .filter(|(k, _)| !incoming.contains(k.as_str()))
            .all(|(k, _)| self.remove_key(k))
    }
}

fn sparse_merge(target: &mut Map<String, Value>, patch: &Map<String, Value>, id_field: &str) {
    for (key, value) in patch {
        if key == id_field {
            continue;
        }
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::String(s) if s.is_empty() => {}
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
