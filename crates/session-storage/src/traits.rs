//! Storage trait definitions.

use crate::StorageResult;

/// Synchronous key/value backend for persisted session state.
pub trait SessionStorage: Send + Sync {
    /// Store a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply a batch of upserts and removals.
    ///
    /// Backends that can commit a batch in one write override this so a
    /// crash never persists half of it. Missing keys in `removals` are ignored.
    fn commit(&self, upserts: &[(&str, &str)], removals: &[&str]) -> StorageResult<()> {
        for (key, value) in upserts {
            self.set(key, value)?;
        }
        for key in removals {
            self.delete(key)?;
        }
        Ok(())
    }
}
