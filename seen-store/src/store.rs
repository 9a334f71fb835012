//! Store trait and errors

use crate::record::OrderRecord;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identities of items that were already emitted
pub type SeenIds = HashSet<String>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed seen-id file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Persistence for the seen-id set and the accepted-record log.
///
/// Each call is independent. Callers do not retry failed writes; a failure
/// is reported and the next cycle tries again.
pub trait Store: Send + Sync {
    /// Load the seen-id set. A missing file is an empty set.
    fn load_seen_ids(&self, path: &Path) -> Result<SeenIds, StoreError>;

    /// Replace the seen-id set on disk. Readers never observe a partial file.
    fn save_seen_ids(&self, path: &Path, ids: &SeenIds) -> Result<(), StoreError>;

    /// Append one accepted record to the output log.
    fn append_record(&self, path: &Path, record: &OrderRecord) -> Result<(), StoreError>;
}
