//! Seen-set deduplication across cycles and restarts

use seen_store::{SeenIds, Store, StoreError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// In-memory set of ids that were already emitted.
///
/// Ids are only ever added, and only after the matching records were
/// appended to the store. Items that were seen but rejected by the filter
/// never enter the set.
#[derive(Debug)]
pub struct Deduplicator {
    seen: SeenIds,
    path: PathBuf,
}

impl Deduplicator {
    /// Start with an empty set bound to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            seen: SeenIds::new(),
            path: path.into(),
        }
    }

    /// Load the persisted set
    pub fn hydrate(store: &dyn Store, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let seen = store.load_seen_ids(&path)?;
        info!("Loaded {} seen ids from {:?}", seen.len(), path);
        Ok(Self { seen, path })
    }

    /// Whether `id` was already emitted
    pub fn is_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record ids of freshly emitted items; returns how many were new
    pub fn mark_emitted<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut added = 0;
        for id in ids {
            if self.seen.insert(id.to_string()) {
                added += 1;
            }
        }
        debug!("Marked {} ids as emitted ({} total)", added, self.seen.len());
        added
    }

    /// Write the whole set back to the store
    pub fn flush(&self, store: &dyn Store) -> Result<(), StoreError> {
        store.save_seen_ids(&self.path, &self.seen)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seen_store::MemoryStore;

    #[test]
    fn test_hydrate_from_store() {
        let store = MemoryStore::with_seen("seen.json", &["1", "2"]);
        let dedup = Deduplicator::hydrate(&store, "seen.json").unwrap();

        assert!(dedup.is_seen("1"));
        assert!(dedup.is_seen("2"));
        assert!(!dedup.is_seen("3"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn test_mark_emitted_counts_new_ids() {
        let mut dedup = Deduplicator::new("seen.json");
        assert!(dedup.is_empty());

        assert_eq!(dedup.mark_emitted(["a", "b"]), 2);
        assert_eq!(dedup.mark_emitted(["b", "c"]), 1);
        assert_eq!(dedup.len(), 3);
    }

    #[test]
    fn test_flush_persists_everything() {
        let store = MemoryStore::new();
        let mut dedup = Deduplicator::new("seen.json");
        dedup.mark_emitted(["x", "y"]);
        dedup.flush(&store).unwrap();

        let persisted = store.seen_at(Path::new("seen.json"));
        assert_eq!(persisted.len(), 2);
        assert!(persisted.contains("x"));
    }
}
