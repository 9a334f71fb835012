//! Board Watcher - order board monitor
//!
//! Keeps a logged-in browser session open on an order board, re-reads it on
//! a jittered schedule, and appends every new order that asks for bot
//! development to a JSON-lines file.
//!
//! # Architecture
//!
//! - [`surface`]: the browser, behind the [`RenderSurface`] trait; driven in
//!   production through a Playwright bridge process
//! - [`session`]: one live session at a time, with restart and guarded close
//! - [`auth`]: login and storage-state persistence
//! - [`extractor`] and [`filter`]: snippet to record, record to verdict
//! - [`dedup`]: the persisted set of emitted ids
//! - [`monitor`]: the poll loop and its recovery policy

pub mod auth;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod diagnostics;
pub mod extractor;
pub mod filter;
pub mod logging;
pub mod monitor;
pub mod pacing;
pub mod session;
pub mod surface;
pub mod types;

// Re-export commonly used types
pub use auth::{AuthProvider, StorageStateAuth};
pub use config::{Config, ConfigError};
pub use dedup::Deduplicator;
pub use extractor::SnippetExtractor;
pub use filter::{order_matches, MatchKind};
pub use monitor::{CycleOutcome, MonitorLoop, MonitorSettings, RunSummary};
pub use session::{SessionManager, SessionSettings};
pub use surface::{BrowserLauncher, LaunchOptions, PlaywrightLauncher, RenderSurface};
pub use types::{
    AuthError, FailureCategory, SelectorState, SnippetHandle, SurfaceError, WaitUntil, WatchError,
};
