//! Browser session lifecycle.
//!
//! Owns at most one live [`RenderSurface`] at a time. `start` always tears
//! down the previous session first, and `close` releases page, context and
//! browser even when an earlier step fails.

use crate::auth::AuthProvider;
use crate::classifier;
use crate::config::Config;
use crate::diagnostics;
use crate::surface::{BrowserLauncher, LaunchOptions, RenderSurface};
use crate::types::{AuthError, SelectorState, SnippetHandle, SurfaceError, WaitUntil};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings the session manager needs from the config
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub board_url: String,
    pub item_selector: String,
    pub navigation_timeout: Duration,
    pub selector_timeout: Duration,
    pub headless: bool,
    pub state_path: PathBuf,
    pub debug_dir: PathBuf,
    pub debug_keep: usize,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            board_url: config.board.url.clone(),
            item_selector: config.board.item_selector.clone(),
            navigation_timeout: config.timing.navigation_timeout(),
            selector_timeout: config.timing.selector_timeout(),
            headless: config.browser.headless,
            state_path: config.browser.state_path.clone(),
            debug_dir: config.paths.debug_dir.clone(),
            debug_keep: config.paths.debug_keep,
        }
    }
}

/// The watcher's single browser session
pub struct SessionManager {
    launcher: Box<dyn BrowserLauncher>,
    settings: SessionSettings,
    surface: Option<Box<dyn RenderSurface>>,
}

impl SessionManager {
    pub fn new(launcher: Box<dyn BrowserLauncher>, settings: SessionSettings) -> Self {
        Self {
            launcher,
            settings,
            surface: None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Whether a live session is held
    pub fn is_started(&self) -> bool {
        self.surface.is_some()
    }

    /// The live surface, or `SurfaceError::Closed`
    pub fn surface(&mut self) -> Result<&mut dyn RenderSurface, SurfaceError> {
        Ok(live(&mut self.surface)?)
    }

    /// Launch a fresh browser, context and page.
    ///
    /// Any previous session is closed first. Stored credentials are loaded
    /// when the state file exists.
    pub async fn start(&mut self) -> Result<(), SurfaceError> {
        self.close().await;

        let storage_state = if self.settings.state_path.exists() {
            Some(self.settings.state_path.clone())
        } else {
            debug!("No stored session at {:?}", self.settings.state_path);
            None
        };
        let options = LaunchOptions {
            headless: self.settings.headless,
            storage_state,
        };

        let mut surface = self.launcher.launch(&options).await?;
        if let Err(e) = surface
            .set_default_timeouts(self.settings.navigation_timeout, self.settings.selector_timeout)
            .await
        {
            close_surface(surface).await;
            return Err(e);
        }

        self.surface = Some(surface);
        info!(
            "Browser session started (headless: {}, stored state: {})",
            options.headless,
            options.storage_state.is_some()
        );
        Ok(())
    }

    /// Navigate to the board
    pub async fn open_board(&mut self) -> Result<(), SurfaceError> {
        let surface = live(&mut self.surface)?;
        debug!("Opening board {}", self.settings.board_url);
        surface
            .open(
                &self.settings.board_url,
                WaitUntil::DomContentLoaded,
                self.settings.navigation_timeout,
            )
            .await
    }

    /// Reload the current page.
    ///
    /// A reload that fails with a network message is retried once as a full
    /// navigation to the board.
    pub async fn soft_refresh(&mut self) -> Result<(), SurfaceError> {
        let surface = live(&mut self.surface)?;
        match surface
            .reload(WaitUntil::DomContentLoaded, self.settings.navigation_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if classifier::is_network_message(&e.to_string()) => {
                warn!("Reload failed ({}), navigating to the board instead", e);
                surface
                    .open(
                        &self.settings.board_url,
                        WaitUntil::DomContentLoaded,
                        self.settings.navigation_timeout,
                    )
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Wait for the item container.
    ///
    /// On a miss, debug artifacts are saved and `Ok(false)` is returned.
    pub async fn wait_for_items(&mut self) -> Result<bool, SurfaceError> {
        let surface = live(&mut self.surface)?;
        let found = surface
            .wait_for_selector(
                &self.settings.item_selector,
                SelectorState::Attached,
                self.settings.selector_timeout,
            )
            .await?;

        if !found {
            warn!(
                "No items matching '{}' within {:?}",
                self.settings.item_selector, self.settings.selector_timeout
            );
            diagnostics::capture(
                surface,
                &self.settings.debug_dir,
                "no_items",
                self.settings.debug_keep,
            )
            .await;
        }
        Ok(found)
    }

    /// Handles for every snippet currently on the board
    pub async fn item_snippets(&mut self) -> Result<Vec<SnippetHandle>, SurfaceError> {
        let surface = live(&mut self.surface)?;
        surface.query_snippets(&self.settings.item_selector).await
    }

    pub async fn current_title(&mut self) -> Result<String, SurfaceError> {
        live(&mut self.surface)?.current_title().await
    }

    /// Run the auth provider against the live session
    pub async fn reauthenticate(&mut self, auth: &dyn AuthProvider) -> Result<(), AuthError> {
        let surface = live(&mut self.surface)?;
        auth.ensure_auth_state(surface).await
    }

    /// Release the session, if any. Never fails.
    pub async fn close(&mut self) {
        if let Some(surface) = self.surface.take() {
            close_surface(surface).await;
        }
    }
}

fn live(
    surface: &mut Option<Box<dyn RenderSurface>>,
) -> Result<&mut (dyn RenderSurface + 'static), SurfaceError> {
    surface.as_deref_mut().ok_or(SurfaceError::Closed)
}

/// Close page, context and browser, each attempted regardless of the others
async fn close_surface(mut surface: Box<dyn RenderSurface>) {
    if let Err(e) = surface.close_page().await {
        warn!("Failed to close page: {}", e);
    }
    if let Err(e) = surface.close_context().await {
        warn!("Failed to close browser context: {}", e);
    }
    if let Err(e) = surface.close_browser().await {
        warn!("Failed to close browser: {}", e);
    }
    info!("Browser session closed");
}
