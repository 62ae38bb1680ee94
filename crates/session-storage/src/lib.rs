//! Key/value persistence for session credentials.
//!
//! This crate provides:
//! - **`SessionStorage`**: the synchronous backend trait
//! - **`FileStorage`**: durable JSON file, survives restarts
//! - **`MemoryStorage`**: process-local map for tests and embedding
//! - **`UnavailableStorage`**: stands in for disabled storage

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::{MemoryStorage, UnavailableStorage};
pub use traits::SessionStorage;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Storage is disabled or cannot be reached
    #[error("Storage unavailable")]
    Unavailable,

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open durable storage at `path`, falling back to [`UnavailableStorage`]
/// when the file cannot be read.
pub fn open_or_unavailable(path: &Path) -> Box<dyn SessionStorage> {
    match FileStorage::open(path) {
        Ok(storage) => Box::new(storage),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Session storage unavailable, continuing without persistence"
            );
            Box::new(UnavailableStorage)
        }
    }
}
