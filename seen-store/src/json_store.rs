//! File-backed store: seen ids as a JSON array, records as JSON lines

use crate::record::{OrderRecord, StoredRecord};
use crate::store::{SeenIds, Store, StoreError};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Store writing plain files next to each other on local disk
#[derive(Debug, Clone, Default)]
pub struct JsonFileStore;

impl JsonFileStore {
    pub fn new() -> Self {
        Self
    }

    fn ensure_parent(path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
            }
        }
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl Store for JsonFileStore {
    fn load_seen_ids(&self, path: &Path) -> Result<SeenIds, StoreError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No seen-id file at {:?}, starting empty", path);
                return Ok(SeenIds::new());
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };

        if contents.trim().is_empty() {
            return Ok(SeenIds::new());
        }

        let ids: Vec<String> = serde_json::from_str(&contents).map_err(|source| {
            StoreError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(ids.into_iter().collect())
    }

    fn save_seen_ids(&self, path: &Path, ids: &SeenIds) -> Result<(), StoreError> {
        Self::ensure_parent(path)?;

        // Sorted so the file diffs cleanly between saves
        let mut sorted: Vec<&String> = ids.iter().collect();
        sorted.sort();
        let json = serde_json::to_string_pretty(&sorted)?;

        let tmp = Self::temp_path(path);
        fs::write(&tmp, json).map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;

        debug!("Saved {} seen ids to {:?}", ids.len(), path);
        Ok(())
    }

    fn append_record(&self, path: &Path, record: &OrderRecord) -> Result<(), StoreError> {
        Self::ensure_parent(path)?;

        let mut line = serde_json::to_string(&StoredRecord::now(record.clone()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::io(path, e))?;

        Ok(())
    }
}
