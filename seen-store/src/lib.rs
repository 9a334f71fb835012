//! Seen Store Library
//!
//! Persistence for the board watcher: the set of item ids that were already
//! emitted, and the append-only log of accepted records.

pub mod json_store;
pub mod memory;
pub mod record;
pub mod store;

pub use json_store::JsonFileStore;
pub use memory::MemoryStore;
pub use record::{OrderRecord, StoredRecord};
pub use store::{SeenIds, Store, StoreError};
