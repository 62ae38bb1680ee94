//! Process-local storage backends.

use crate::{SessionStorage, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory storage. Lives as long as the process.
#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl SessionStorage for MemoryStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }

    fn commit(&self, upserts: &[(&str, &str)], removals: &[&str]) -> StorageResult<()> {
        let mut data = self.data.lock();
        for (key, value) in upserts {
            data.insert(key.to_string(), value.to_string());
        }
        for key in removals {
            data.remove(*key);
        }
        Ok(())
    }
}

/// Backend standing in for storage that is disabled or missing.
///
/// Every call fails with [`StorageError::Unavailable`]; callers treat that as
/// "no session".
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableStorage;

impl SessionStorage for UnavailableStorage {
    fn set(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Unavailable)
    }

    fn get(&self, _key: &str) -> StorageResult<Option<String>> {
        Err(StorageError::Unavailable)
    }

    fn delete(&self, _key: &str) -> StorageResult<bool> {
        Err(StorageError::Unavailable)
    }
}
