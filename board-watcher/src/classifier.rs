//! Failure classification and the logged-out heuristic.

use crate::types::{FailureCategory, WatchError};

/// Message fragments Chromium uses for DNS failures and lost connectivity
const NETWORK_MARKERS: &[&str] = &[
    "err_name_not_resolved",
    "err_internet_disconnected",
    "err_network_changed",
    "err_name_resolution_failed",
    "getaddrinfo",
    "name resolution",
];

/// Whether a failure message points at connectivity rather than the page
pub fn is_network_message(message: &str) -> bool {
    let message = message.to_lowercase();
    NETWORK_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Assign a recovery category to a failure.
///
/// Only `Network` and `Unknown` come out of here. `SessionExpired` and
/// `ContentMissing` describe a page that loaded but shows no items; the
/// monitor loop infers them from a failed item wait, not from an error.
pub fn classify(error: &WatchError) -> FailureCategory {
    if is_network_message(&error.to_string()) {
        FailureCategory::Network
    } else {
        FailureCategory::Unknown
    }
}

/// Whether a page title looks like a login screen
pub fn looks_logged_out(title: &str, markers: &[String]) -> bool {
    let title = title.to_lowercase();
    markers
        .iter()
        .filter(|marker| !marker.is_empty())
        .any(|marker| title.contains(&marker.to_lowercase()))
}
