//! Scripted browser fakes shared by the integration tests.
//!
//! Every fake surface created by a [`FakeLauncher`] reads and writes the same
//! [`Board`], so a test can change what the page shows between cycles and
//! inspect the calls made against it afterwards.

#![allow(dead_code)]

use async_trait::async_trait;
use board_watcher::config::{Config, TimingConfig};
use board_watcher::{
    AuthError, AuthProvider, BrowserLauncher, Deduplicator, LaunchOptions, MonitorLoop,
    MonitorSettings, RenderSurface, SelectorState, SessionManager, SessionSettings,
    SnippetExtractor, SnippetHandle, SurfaceError, WaitUntil,
};
use seen_store::MemoryStore;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const BOARD_URL: &str = "https://board.example/orders";
pub const SEEN_PATH: &str = "data/seen_ids.json";
pub const OFFLINE: &str = "page.reload: net::ERR_INTERNET_DISCONNECTED at https://board.example/orders";

/// One rendered order snippet
#[derive(Debug, Clone, Default)]
pub struct FakeSnippet {
    texts: HashMap<String, String>,
    attributes: HashMap<(String, String), String>,
}

impl FakeSnippet {
    /// A snippet laid out the way the default field selectors expect
    pub fn order(id: &str, title: &str, description: &str) -> Self {
        Self::default()
            .with_attribute("a", "href", &format!("/orders/{}?from=board", id))
            .with_text("h3", title)
            .with_text("p", description)
    }

    pub fn with_text(mut self, sub: &str, text: &str) -> Self {
        self.texts.insert(sub.to_string(), text.to_string());
        self
    }

    pub fn with_attribute(mut self, sub: &str, attribute: &str, value: &str) -> Self {
        self.attributes
            .insert((sub.to_string(), attribute.to_string()), value.to_string());
        self
    }
}

/// What the page shows and what was done to it
#[derive(Debug)]
pub struct Board {
    pub snippets: Vec<FakeSnippet>,
    pub items_visible: bool,
    pub title: String,
    /// Messages for upcoming reload failures, consumed one per reload
    pub reload_failures: VecDeque<String>,
    /// Messages for upcoming navigation failures, consumed one per open
    pub open_failures: VecDeque<String>,
    pub fail_close_page: bool,
    pub fail_diagnostics: bool,
    /// Cancelled on the next reload
    pub cancel_on_reload: Option<CancellationToken>,
    pub calls: Vec<String>,
    pub launches: Vec<LaunchOptions>,
}

impl Default for Board {
    fn default() -> Self {
        Self {
            snippets: Vec::new(),
            items_visible: true,
            title: "Заказы".to_string(),
            reload_failures: VecDeque::new(),
            open_failures: VecDeque::new(),
            fail_close_page: false,
            fail_diagnostics: false,
            cancel_on_reload: None,
            calls: Vec::new(),
            launches: Vec::new(),
        }
    }
}

impl Board {
    /// Index of the last call equal to `call`
    pub fn last_index_of(&self, call: &str) -> Option<usize> {
        self.calls.iter().rposition(|c| c == call)
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    /// Make the next `n` refreshes fail with a network error, fallback included
    pub fn go_offline_for(&mut self, n: usize) {
        for _ in 0..n {
            self.reload_failures.push_back(OFFLINE.to_string());
            self.open_failures
                .push_back(format!("page.goto: net::ERR_NAME_NOT_RESOLVED at {}", BOARD_URL));
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharedBoard(Arc<Mutex<Board>>);

impl SharedBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Board> {
        self.0.lock().unwrap()
    }

    fn record(&self, call: impl Into<String>) {
        self.lock().calls.push(call.into());
    }
}

pub fn open_call(url: &str) -> String {
    format!("open {}", url)
}

pub struct FakeSurface {
    board: SharedBoard,
}

impl FakeSurface {
    fn snippet(&self, handle: &SnippetHandle) -> Result<FakeSnippet, SurfaceError> {
        self.board
            .lock()
            .snippets
            .get(handle.index)
            .cloned()
            .ok_or_else(|| SurfaceError::Operation("snippet detached".to_string()))
    }
}

#[async_trait]
impl RenderSurface for FakeSurface {
    async fn set_default_timeouts(
        &mut self,
        _navigation: Duration,
        _operation: Duration,
    ) -> Result<(), SurfaceError> {
        self.board.record("timeouts");
        Ok(())
    }

    async fn open(&mut self, url: &str, _wait: WaitUntil, _timeout: Duration) -> Result<(), SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push(open_call(url));
        match board.open_failures.pop_front() {
            Some(message) => Err(SurfaceError::Navigation(message)),
            None => Ok(()),
        }
    }

    async fn reload(&mut self, _wait: WaitUntil, _timeout: Duration) -> Result<(), SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push("reload".to_string());
        if let Some(cancel) = board.cancel_on_reload.take() {
            cancel.cancel();
        }
        match board.reload_failures.pop_front() {
            Some(message) => Err(SurfaceError::Navigation(message)),
            None => Ok(()),
        }
    }

    async fn wait_for_selector(
        &mut self,
        _selector: &str,
        _state: SelectorState,
        _timeout: Duration,
    ) -> Result<bool, SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push("wait".to_string());
        Ok(board.items_visible)
    }

    async fn query_snippets(&mut self, selector: &str) -> Result<Vec<SnippetHandle>, SurfaceError> {
        let count = self.board.lock().snippets.len();
        Ok((0..count).map(|i| SnippetHandle::new(selector, i)).collect())
    }

    async fn read_text(
        &mut self,
        handle: &SnippetHandle,
        sub: &str,
    ) -> Result<Option<String>, SurfaceError> {
        Ok(self.snippet(handle)?.texts.get(sub).cloned())
    }

    async fn read_attribute(
        &mut self,
        handle: &SnippetHandle,
        sub: &str,
        attribute: &str,
    ) -> Result<Option<String>, SurfaceError> {
        Ok(self
            .snippet(handle)?
            .attributes
            .get(&(sub.to_string(), attribute.to_string()))
            .cloned())
    }

    async fn current_url(&mut self) -> Result<String, SurfaceError> {
        Ok(BOARD_URL.to_string())
    }

    async fn current_title(&mut self) -> Result<String, SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push("title".to_string());
        Ok(board.title.clone())
    }

    async fn screenshot(&mut self, _path: &Path) -> Result<(), SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push("screenshot".to_string());
        if board.fail_diagnostics {
            return Err(SurfaceError::Operation("screenshot failed".to_string()));
        }
        Ok(())
    }

    async fn html_content(&mut self) -> Result<String, SurfaceError> {
        if self.board.lock().fail_diagnostics {
            return Err(SurfaceError::Operation("page crashed".to_string()));
        }
        Ok("<html><body>empty board</body></html>".to_string())
    }

    async fn save_storage_state(&mut self, _path: &Path) -> Result<(), SurfaceError> {
        self.board.record("save_state");
        Ok(())
    }

    async fn close_page(&mut self) -> Result<(), SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push("close_page".to_string());
        if board.fail_close_page {
            return Err(SurfaceError::Operation("page already gone".to_string()));
        }
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), SurfaceError> {
        self.board.record("close_context");
        Ok(())
    }

    async fn close_browser(&mut self) -> Result<(), SurfaceError> {
        self.board.record("close_browser");
        Ok(())
    }
}

pub struct FakeLauncher {
    board: SharedBoard,
}

impl FakeLauncher {
    pub fn new(board: &SharedBoard) -> Self {
        Self {
            board: board.clone(),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        let mut board = self.board.lock();
        board.calls.push("launch".to_string());
        board.launches.push(options.clone());
        Ok(Box::new(FakeSurface {
            board: self.board.clone(),
        }))
    }
}

/// Auth provider that "logs in" by making the board show items again
pub struct FakeAuth {
    board: SharedBoard,
    calls: AtomicUsize,
}

impl FakeAuth {
    pub fn new(board: &SharedBoard) -> Self {
        Self {
            board: board.clone(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn ensure_auth_state(&self, _surface: &mut dyn RenderSurface) -> Result<(), AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut board = self.board.lock();
        board.calls.push("auth".to_string());
        board.items_visible = true;
        board.title = "Заказы".to_string();
        Ok(())
    }
}

/// Config pointing at the fake board with every delay at zero
pub fn test_config(scratch: &Path) -> Config {
    let mut config = Config::default();
    config.board.url = BOARD_URL.to_string();
    config.timing = TimingConfig::immediate();
    config.browser.state_path = scratch.join("storage_state.json");
    config.paths.debug_dir = scratch.join("debug");
    config.paths.seen_ids_path = SEEN_PATH.into();
    config.paths.output_path = "data/new_orders.jsonl".into();
    config
}

/// A monitor wired to fakes, with handles to everything a test inspects
pub struct Harness {
    pub board: SharedBoard,
    pub store: Arc<MemoryStore>,
    pub auth: Arc<FakeAuth>,
    pub cancel: CancellationToken,
    pub config: Config,
    pub scratch: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let board = SharedBoard::new();
        Self {
            auth: Arc::new(FakeAuth::new(&board)),
            board,
            store: Arc::new(store),
            cancel: CancellationToken::new(),
            config: test_config(scratch.path()),
            scratch,
        }
    }

    pub fn session(&self) -> SessionManager {
        SessionManager::new(
            Box::new(FakeLauncher::new(&self.board)),
            SessionSettings::from_config(&self.config),
        )
    }

    pub fn monitor(&self) -> MonitorLoop {
        let dedup =
            Deduplicator::hydrate(self.store.as_ref(), &self.config.paths.seen_ids_path).unwrap();
        MonitorLoop::new(
            self.session(),
            SnippetExtractor::new(&self.config.board.fields).unwrap(),
            dedup,
            self.store.clone(),
            self.auth.clone(),
            MonitorSettings::from_config(&self.config),
            self.cancel.clone(),
        )
    }

    pub fn set_snippets(&self, snippets: Vec<FakeSnippet>) {
        self.board.lock().snippets = snippets;
    }
}
