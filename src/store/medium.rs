use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::Connection;

use crate::db;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("malformed payload under {key}: {message}")]
    Deserialize { key: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Persistent string key/value medium behind the local store.
pub trait KvMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn entries(&self) -> Result<Vec<(String, String)>, StoreError>;

    /// Whether contents survive a process restart.
    fn is_persistent(&self) -> bool;
}

pub struct SqliteMedium {
    conn: Connection,
}

impl SqliteMedium {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }
}

impl KvMedium for SqliteMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(db::kv_get(&self.conn, key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        Ok(db::kv_set(&self.conn, key, value)?)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        Ok(db::kv_remove(&self.conn, key)?)
    }

    fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(db::kv_entries(&self.conn)?)
    }

    fn is_persistent(&self) -> bool {
        true
    }
}

/// In-process map used when no workspace is open or the database cannot be opened.
#[derive(Default)]
pub struct MemoryMedium {
    map: RefCell<BTreeMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvMedium for MemoryMedium {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .map
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
