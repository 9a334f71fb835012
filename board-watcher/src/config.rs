//! Configuration management for the board watcher.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub board: BoardConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the full and error-only log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Log files above this size are rolled over at startup
    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: u64,

    /// Number of rolled-over log files kept
    #[serde(default = "default_log_backups")]
    pub log_backups: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            log_max_bytes: default_log_max_bytes(),
            log_backups: default_log_backups(),
        }
    }
}

/// How one value is read out of a snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    /// CSS selector relative to the snippet root
    pub selector: String,

    /// Read this attribute instead of the inner text
    #[serde(default)]
    pub attribute: Option<String>,

    /// Regex applied to the raw value; the first capture group is kept
    #[serde(default)]
    pub pattern: Option<String>,
}

impl FieldSelector {
    pub fn text(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: None,
            pattern: None,
        }
    }
}

/// Sub-fields read from every item snippet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldsConfig {
    #[serde(default = "default_id_field")]
    pub id: FieldSelector,

    #[serde(default = "default_title_field")]
    pub title: FieldSelector,

    #[serde(default = "default_description_field")]
    pub description: FieldSelector,

    /// Auxiliary fields stored in the record's raw_fields
    #[serde(default)]
    pub extra: BTreeMap<String, FieldSelector>,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            id: default_id_field(),
            title: default_title_field(),
            description: default_description_field(),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Listing board to watch
    #[serde(default)]
    pub url: String,

    /// Page used to (re)establish a session; defaults to the board URL
    #[serde(default)]
    pub login_url: Option<String>,

    /// Selector matching one rendered item snippet
    #[serde(default = "default_item_selector")]
    pub item_selector: String,

    /// Selector that only renders for a logged-in user; defaults to the item selector
    #[serde(default)]
    pub logged_in_selector: Option<String>,

    /// Case-insensitive page-title fragments that mean "login screen"
    #[serde(default = "default_login_title_markers")]
    pub login_title_markers: Vec<String>,

    #[serde(default)]
    pub fields: FieldsConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            login_url: None,
            item_selector: default_item_selector(),
            logged_in_selector: None,
            login_title_markers: default_login_title_markers(),
            fields: FieldsConfig::default(),
        }
    }
}

impl BoardConfig {
    pub fn login_url(&self) -> &str {
        self.login_url.as_deref().unwrap_or(&self.url)
    }

    pub fn logged_in_selector(&self) -> &str {
        self.logged_in_selector
            .as_deref()
            .unwrap_or(&self.item_selector)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long to wait for the item selector to attach
    #[serde(default = "default_selector_timeout")]
    pub selector_timeout_ms: u64,

    /// Bound for navigation and reload
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// How long the auth provider waits for a logged-in page
    #[serde(default = "default_login_timeout")]
    pub login_timeout_seconds: u64,

    /// Base polling delay between cycles
    #[serde(default = "default_poll_base")]
    pub poll_base_seconds: u64,

    /// Uniform random extra added to the polling delay
    #[serde(default = "default_poll_jitter")]
    pub poll_jitter_seconds: u64,

    /// Delay before retrying after a network failure
    #[serde(default = "default_network_retry")]
    pub network_retry_seconds: u64,

    /// Consecutive network failures that trigger a session rebuild
    #[serde(default = "default_network_failure_threshold")]
    pub network_failure_threshold: u32,

    /// Delay after an unclassified failure
    #[serde(default = "default_unknown_backoff")]
    pub unknown_backoff_seconds: u64,

    /// Delay after re-authenticating
    #[serde(default = "default_reauth_delay")]
    pub reauth_delay_seconds: u64,

    #[serde(default = "default_reauth_jitter")]
    pub reauth_jitter_seconds: u64,

    /// Delay after reopening the board because items never rendered
    #[serde(default = "default_reopen_delay")]
    pub reopen_delay_seconds: u64,

    #[serde(default = "default_reopen_jitter")]
    pub reopen_jitter_seconds: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            selector_timeout_ms: default_selector_timeout(),
            navigation_timeout_ms: default_navigation_timeout(),
            login_timeout_seconds: default_login_timeout(),
            poll_base_seconds: default_poll_base(),
            poll_jitter_seconds: default_poll_jitter(),
            network_retry_seconds: default_network_retry(),
            network_failure_threshold: default_network_failure_threshold(),
            unknown_backoff_seconds: default_unknown_backoff(),
            reauth_delay_seconds: default_reauth_delay(),
            reauth_jitter_seconds: default_reauth_jitter(),
            reopen_delay_seconds: default_reopen_delay(),
            reopen_jitter_seconds: default_reopen_jitter(),
        }
    }
}

impl TimingConfig {
    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_seconds)
    }

    /// Every delay set to zero; used by tests and dry runs
    pub fn immediate() -> Self {
        Self {
            selector_timeout_ms: 0,
            navigation_timeout_ms: 0,
            login_timeout_seconds: 0,
            poll_base_seconds: 0,
            poll_jitter_seconds: 0,
            network_retry_seconds: 0,
            network_failure_threshold: default_network_failure_threshold(),
            unknown_backoff_seconds: 0,
            reauth_delay_seconds: 0,
            reauth_jitter_seconds: 0,
            reopen_delay_seconds: 0,
            reopen_jitter_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run the browser without a window
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Node.js executable used to host the Playwright bridge
    #[serde(default = "default_node_binary")]
    pub node_binary: PathBuf,

    /// Extra module search path for `require('playwright')`
    #[serde(default)]
    pub node_path: Option<PathBuf>,

    /// Persisted browser storage state (cookies, local storage)
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,

    /// Slack added on top of each operation timeout for bridge round-trips
    #[serde(default = "default_bridge_grace")]
    pub bridge_grace_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            node_binary: default_node_binary(),
            node_path: None,
            state_path: default_state_path(),
            bridge_grace_ms: default_bridge_grace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Screenshots and HTML dumps taken when items fail to render
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,

    /// Newest captures kept per label in `debug_dir`; 0 keeps everything
    #[serde(default = "default_debug_keep")]
    pub debug_keep: usize,

    /// Persisted seen-id set
    #[serde(default = "default_seen_ids_path")]
    pub seen_ids_path: PathBuf,

    /// JSONL log of accepted records
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            debug_dir: default_debug_dir(),
            debug_keep: default_debug_keep(),
            seen_ids_path: default_seen_ids_path(),
            output_path: default_output_path(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_max_bytes() -> u64 {
    2_000_000
}

fn default_log_backups() -> u32 {
    5
}

fn default_item_selector() -> String {
    "[data-testid=\"order-snippet\"]".to_string()
}

fn default_id_field() -> FieldSelector {
    FieldSelector {
        selector: "a".to_string(),
        attribute: Some("href".to_string()),
        pattern: Some(r"(\d+)".to_string()),
    }
}

fn default_title_field() -> FieldSelector {
    FieldSelector::text("h3")
}

fn default_description_field() -> FieldSelector {
    FieldSelector::text("p")
}

fn default_login_title_markers() -> Vec<String> {
    ["вход", "войти", "авторизац", "login", "log in", "sign in"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_selector_timeout() -> u64 {
    30_000
}

fn default_navigation_timeout() -> u64 {
    30_000
}

fn default_login_timeout() -> u64 {
    180
}

fn default_poll_base() -> u64 {
    25
}

fn default_poll_jitter() -> u64 {
    10
}

fn default_network_retry() -> u64 {
    20
}

fn default_network_failure_threshold() -> u32 {
    3
}

fn default_unknown_backoff() -> u64 {
    10
}

fn default_reauth_delay() -> u64 {
    3
}

fn default_reauth_jitter() -> u64 {
    2
}

fn default_reopen_delay() -> u64 {
    5
}

fn default_reopen_jitter() -> u64 {
    5
}

fn default_node_binary() -> PathBuf {
    PathBuf::from("node")
}

fn default_state_path() -> PathBuf {
    PathBuf::from("state").join("storage_state.json")
}

fn default_bridge_grace() -> u64 {
    5_000
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from("debug")
}

fn default_debug_keep() -> usize {
    20
}

fn default_seen_ids_path() -> PathBuf {
    PathBuf::from("data").join("seen_ids.json")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("data").join("new_orders.jsonl")
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(&Self::default_config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file yields defaults; an unreadable or malformed file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
                info!("Loaded configuration from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No config file found at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("board-watcher")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Reject configurations the watcher cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.board.url.trim().is_empty() {
            return Err(ConfigError::Invalid("board.url must be set".to_string()));
        }
        if self.board.item_selector.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "board.item_selector must not be empty".to_string(),
            ));
        }
        if self.timing.network_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "timing.network_failure_threshold must be at least 1".to_string(),
            ));
        }

        let fields = &self.board.fields;
        let all = [&fields.id, &fields.title, &fields.description]
            .into_iter()
            .chain(fields.extra.values());
        for field in all {
            if let Some(pattern) = &field.pattern {
                regex::Regex::new(pattern).map_err(|e| {
                    ConfigError::Invalid(format!("bad pattern for '{}': {}", field.selector, e))
                })?;
            }
        }
        Ok(())
    }
}
