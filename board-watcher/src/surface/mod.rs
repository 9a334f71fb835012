//! Render surface integration.
//!
//! The watcher never touches a browser directly. It drives a
//! [`RenderSurface`]: one browser session with one open page, created by a
//! [`BrowserLauncher`]. The production implementation is a Playwright bridge
//! running in a `node` child process; tests use scripted fakes.

pub mod bridge_script;
pub mod playwright;

use crate::types::{SelectorState, SnippetHandle, SurfaceError, WaitUntil};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use playwright::{PlaywrightLauncher, PlaywrightSurface};

/// Options for a new browser session
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Run without a window
    pub headless: bool,
    /// Storage state (cookies, local storage) to preload, if present on disk
    pub storage_state: Option<PathBuf>,
}

/// One live browser session with one page
#[async_trait::async_trait]
pub trait RenderSurface: Send {
    /// Default bounds for navigations and for every other page operation
    async fn set_default_timeouts(
        &mut self,
        navigation: Duration,
        operation: Duration,
    ) -> Result<(), SurfaceError>;

    /// Navigate to `url`
    async fn open(&mut self, url: &str, wait: WaitUntil, timeout: Duration)
        -> Result<(), SurfaceError>;

    /// Reload the current page
    async fn reload(&mut self, wait: WaitUntil, timeout: Duration) -> Result<(), SurfaceError>;

    /// Wait for `selector` to reach `state`; `Ok(false)` on timeout
    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: SelectorState,
        timeout: Duration,
    ) -> Result<bool, SurfaceError>;

    /// Handles for every element currently matching `selector`, in DOM order
    async fn query_snippets(&mut self, selector: &str) -> Result<Vec<SnippetHandle>, SurfaceError>;

    /// Inner text of the first `sub` element inside the snippet; `None` if absent
    async fn read_text(
        &mut self,
        handle: &SnippetHandle,
        sub: &str,
    ) -> Result<Option<String>, SurfaceError>;

    /// Attribute of the first `sub` element inside the snippet; `None` if absent
    async fn read_attribute(
        &mut self,
        handle: &SnippetHandle,
        sub: &str,
        attribute: &str,
    ) -> Result<Option<String>, SurfaceError>;

    async fn current_url(&mut self) -> Result<String, SurfaceError>;

    async fn current_title(&mut self) -> Result<String, SurfaceError>;

    /// Full-page screenshot
    async fn screenshot(&mut self, path: &Path) -> Result<(), SurfaceError>;

    /// Rendered markup of the current page
    async fn html_content(&mut self) -> Result<String, SurfaceError>;

    /// Persist cookies and local storage for the next session
    async fn save_storage_state(&mut self, path: &Path) -> Result<(), SurfaceError>;

    async fn close_page(&mut self) -> Result<(), SurfaceError>;

    async fn close_context(&mut self) -> Result<(), SurfaceError>;

    /// Close the browser and release the process behind it
    async fn close_browser(&mut self) -> Result<(), SurfaceError>;
}

/// Creates browser sessions
#[async_trait::async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn RenderSurface>, SurfaceError>;
}
