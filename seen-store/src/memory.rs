//! In-memory store with failure injection, used by tests

use crate::record::OrderRecord;
use crate::store::{SeenIds, Store, StoreError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Store keeping everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    seen: Mutex<HashMap<PathBuf, SeenIds>>,
    records: Mutex<Vec<(PathBuf, OrderRecord)>>,
    saves: AtomicUsize,
    fail_appends: AtomicBool,
    fail_saves: AtomicBool,
    append_attempts: AtomicUsize,
    fail_append_at: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn injected(path: &Path, what: &str) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::Other, format!("injected {} failure", what)),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the seen set stored at `path`
    pub fn with_seen(path: impl Into<PathBuf>, ids: &[&str]) -> Self {
        let store = Self::new();
        lock(&store.seen).insert(path.into(), ids.iter().map(|s| s.to_string()).collect());
        store
    }

    /// Make every following `append_record` fail (or succeed again)
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Make only the `n`-th `append_record` call (1-based, counted from now) fail
    pub fn fail_append_at(&self, n: usize) {
        self.append_attempts.store(0, Ordering::SeqCst);
        self.fail_append_at.store(n, Ordering::SeqCst);
    }

    /// Make every following `save_seen_ids` fail (or succeed again)
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Ids currently persisted at `path`
    pub fn seen_at(&self, path: &Path) -> SeenIds {
        lock(&self.seen).get(path).cloned().unwrap_or_default()
    }

    /// All appended records, in append order
    pub fn records(&self) -> Vec<OrderRecord> {
        lock(&self.records).iter().map(|(_, r)| r.clone()).collect()
    }

    /// Number of successful `save_seen_ids` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn load_seen_ids(&self, path: &Path) -> Result<SeenIds, StoreError> {
        Ok(self.seen_at(path))
    }

    fn save_seen_ids(&self, path: &Path, ids: &SeenIds) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(injected(path, "save"));
        }
        lock(&self.seen).insert(path.to_path_buf(), ids.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append_record(&self, path: &Path, record: &OrderRecord) -> Result<(), StoreError> {
        let attempt = self.append_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_appends.load(Ordering::SeqCst)
            || attempt == self.fail_append_at.load(Ordering::SeqCst)
        {
            return Err(injected(path, "append"));
        }
        lock(&self.records).push((path.to_path_buf(), record.clone()));
        Ok(())
    }
}
