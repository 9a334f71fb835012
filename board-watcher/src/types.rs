//! Core types used throughout the board watcher.
//!
//! This module defines the render-surface vocabulary (wait policies, selector
//! states, snippet handles), the failure taxonomy, and the error types.

use seen_store::StoreError;
use serde::{Deserialize, Serialize};

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitUntil {
    /// Initial HTML parsed; does not wait for background traffic
    DomContentLoaded,
    /// The load event fired
    Load,
    /// No network activity for a while. Never used by the watcher: boards
    /// with long-polling or websockets never go idle.
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::Load => "load",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

/// Element state a selector wait resolves on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

impl SelectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorState::Attached => "attached",
            SelectorState::Detached => "detached",
            SelectorState::Visible => "visible",
            SelectorState::Hidden => "hidden",
        }
    }
}

/// Reference to one rendered item snippet on the live page.
///
/// Resolves to the `index`-th element matched by `selector`; only valid
/// until the page re-renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnippetHandle {
    pub selector: String,
    pub index: usize,
}

impl SnippetHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

/// Category assigned to a failure; drives the recovery policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// DNS failure or loss of connectivity
    Network,
    /// Login screen shown instead of the board (inferred from the title)
    SessionExpired,
    /// Item container never attached
    ContentMissing,
    /// Anything else
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Network => "network",
            FailureCategory::SessionExpired => "session_expired",
            FailureCategory::ContentMissing => "content_missing",
            FailureCategory::Unknown => "unknown",
        }
    }
}

/// Errors raised by render-surface operations
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser operation failed: {0}")]
    Operation(String),

    #[error("Bridge protocol error: {0}")]
    Protocol(String),

    #[error("No live browser session")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while establishing an authenticated session
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Not logged in after waiting at {url}")]
    NotLoggedIn { url: String },

    #[error("Browser error during login: {0}")]
    Surface(#[from] SurfaceError),
}

/// Any failure the monitor loop can observe in one cycle
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
