//! Authenticated session state.
//!
//! The board only lists items for a logged-in user. An [`AuthProvider`]
//! makes sure the live browser session carries valid credentials, and
//! persists them so the next session starts logged in.

use crate::config::Config;
use crate::surface::RenderSurface;
use crate::types::{AuthError, SelectorState, WaitUntil};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Establishes credentials on a live browser session
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Idempotent: returns once the session is logged in, errors if it cannot be.
    async fn ensure_auth_state(&self, surface: &mut dyn RenderSurface) -> Result<(), AuthError>;
}

/// Logs in through the login page and saves the browser storage state.
///
/// With a stored session the logged-in marker shows up right away. Otherwise,
/// in a headed browser, the operator has `login_timeout` to log in by hand.
#[derive(Debug, Clone)]
pub struct StorageStateAuth {
    login_url: String,
    logged_in_selector: String,
    state_path: PathBuf,
    navigation_timeout: Duration,
    login_timeout: Duration,
}

impl StorageStateAuth {
    pub fn new(config: &Config) -> Self {
        Self {
            login_url: config.board.login_url().to_string(),
            logged_in_selector: config.board.logged_in_selector().to_string(),
            state_path: config.browser.state_path.clone(),
            navigation_timeout: config.timing.navigation_timeout(),
            login_timeout: config.timing.login_timeout(),
        }
    }
}

#[async_trait::async_trait]
impl AuthProvider for StorageStateAuth {
    async fn ensure_auth_state(&self, surface: &mut dyn RenderSurface) -> Result<(), AuthError> {
        surface
            .open(&self.login_url, WaitUntil::DomContentLoaded, self.navigation_timeout)
            .await?;

        info!(
            "Waiting up to {:?} for a logged-in page at {}",
            self.login_timeout, self.login_url
        );

        let logged_in = surface
            .wait_for_selector(
                &self.logged_in_selector,
                SelectorState::Attached,
                self.login_timeout,
            )
            .await?;

        if !logged_in {
            warn!("Login marker '{}' never appeared", self.logged_in_selector);
            return Err(AuthError::NotLoggedIn {
                url: self.login_url.clone(),
            });
        }

        surface.save_storage_state(&self.state_path).await?;
        info!("Session authenticated, storage state saved to {:?}", self.state_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.board.url = "https://example.com/board".to_string();
        config.board.logged_in_selector = Some(".user-menu".to_string());
        config.timing.login_timeout_seconds = 42;

        let auth = StorageStateAuth::new(&config);
        assert_eq!(auth.login_url, "https://example.com/board");
        assert_eq!(auth.logged_in_selector, ".user-menu");
        assert_eq!(auth.login_timeout, Duration::from_secs(42));
        assert_eq!(auth.state_path, config.browser.state_path);
    }
}
