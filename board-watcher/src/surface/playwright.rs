//! Playwright render surface.
//!
//! Runs [`BRIDGE_SCRIPT`] in a `node` child process and talks to it with one
//! JSON object per line over stdin/stdout. Every call is bounded by its
//! operation timeout plus a grace period, so a hung bridge surfaces as a
//! `SurfaceError::Timeout` instead of blocking the watcher.

use super::bridge_script::BRIDGE_SCRIPT;
use super::{BrowserLauncher, LaunchOptions, RenderSurface};
use crate::config::BrowserConfig;
use crate::types::{SelectorState, SnippetHandle, SurfaceError, WaitUntil};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

/// Time allowed for the browser itself to start
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<BridgeFailure>,
}

#[derive(Debug, Deserialize)]
struct BridgeFailure {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

/// Turn a bridge-side exception into a surface error
fn map_failure(method: &str, failure: Option<BridgeFailure>) -> SurfaceError {
    let failure = failure.unwrap_or(BridgeFailure {
        name: "Error".to_string(),
        message: "bridge reported failure without details".to_string(),
    });

    match (failure.name.as_str(), method) {
        ("TimeoutError", _) => SurfaceError::Timeout(failure.message),
        ("ProtocolError", _) => SurfaceError::Protocol(failure.message),
        (_, "goto") | (_, "reload") => SurfaceError::Navigation(failure.message),
        _ => SurfaceError::Operation(format!("{}: {}", method, failure.message)),
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

/// Starts Playwright bridges
pub struct PlaywrightLauncher {
    node_binary: PathBuf,
    node_path: Option<PathBuf>,
    grace: Duration,
}

impl PlaywrightLauncher {
    pub fn new(config: &BrowserConfig) -> Self {
        Self {
            node_binary: config.node_binary.clone(),
            node_path: config.node_path.clone(),
            grace: Duration::from_millis(config.bridge_grace_ms),
        }
    }

    fn spawn_bridge(&self) -> Result<Child, SurfaceError> {
        let mut command = Command::new(&self.node_binary);
        command
            .arg("-e")
            .arg(BRIDGE_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(node_path) = &self.node_path {
            command.env("NODE_PATH", node_path);
        }

        debug!("Spawning Playwright bridge via {:?}", self.node_binary);
        Ok(command.spawn()?)
    }
}

#[async_trait::async_trait]
impl BrowserLauncher for PlaywrightLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        let child = self.spawn_bridge()?;
        let mut surface = PlaywrightSurface::attach(child, self.grace)?;

        let storage_state = options
            .storage_state
            .as_ref()
            .filter(|path| path.exists())
            .map(|path| path.display().to_string());

        debug!(
            "Launching browser (headless: {}, storage state: {:?})",
            options.headless, storage_state
        );

        if let Err(e) = surface
            .call(
                "launch",
                json!({ "headless": options.headless, "storageState": storage_state }),
                LAUNCH_TIMEOUT,
            )
            .await
        {
            // Do not leave a half-started bridge behind
            let _ = surface.close_browser().await;
            return Err(e);
        }

        Ok(Box::new(surface))
    }
}

/// One browser session hosted by a bridge process
pub struct PlaywrightSurface {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    grace: Duration,
    operation_timeout: Duration,
    closed: bool,
}

impl PlaywrightSurface {
    /// Take over the pipes of a freshly spawned bridge
    fn attach(mut child: Child, grace: Duration) -> Result<Self, SurfaceError> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SurfaceError::Protocol("bridge stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SurfaceError::Protocol("bridge stdout not captured".to_string()))?;

        // Forward whatever node prints on stderr into our logs
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(target: "playwright_bridge", "{}", line);
                }
            });
        }

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
            grace,
            operation_timeout: Duration::from_secs(30),
            closed: false,
        })
    }

    async fn call(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SurfaceError> {
        if self.closed {
            return Err(SurfaceError::Closed);
        }

        let id = self.next_id;
        self.next_id += 1;

        let request = BridgeRequest { id, method, params };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| SurfaceError::Protocol(e.to_string()))?;
        line.push('\n');

        trace!("Bridge request #{}: {}", id, method);
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let deadline = timeout + self.grace;
        let response = tokio::time::timeout(deadline, self.read_response(id))
            .await
            .map_err(|_| {
                SurfaceError::Timeout(format!(
                    "bridge did not answer {} within {:?}",
                    method, deadline
                ))
            })??;

        if response.ok {
            Ok(response.result)
        } else {
            Err(map_failure(method, response.error))
        }
    }

    /// Read lines until the response for `id` arrives
    async fn read_response(&mut self, id: u64) -> Result<BridgeResponse, SurfaceError> {
        loop {
            let line = self.stdout.next_line().await?.ok_or_else(|| {
                self.closed = true;
                SurfaceError::Protocol("bridge process exited".to_string())
            })?;

            let response: BridgeResponse = match serde_json::from_str(&line) {
                Ok(response) => response,
                Err(e) => {
                    warn!("Ignoring unparseable bridge output: {} ({})", line, e);
                    continue;
                }
            };

            match response.id {
                Some(got) if got == id => return Ok(response),
                // Late answer to a call that already timed out
                other => debug!("Skipping stale bridge response {:?} (waiting for {})", other, id),
            }
        }
    }

    fn snippet_params(handle: &SnippetHandle, sub: &str) -> Value {
        json!({ "selector": handle.selector, "index": handle.index, "sub": sub })
    }
}

fn optional_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[async_trait::async_trait]
impl RenderSurface for PlaywrightSurface {
    async fn set_default_timeouts(
        &mut self,
        navigation: Duration,
        operation: Duration,
    ) -> Result<(), SurfaceError> {
        self.operation_timeout = operation;
        self.call(
            "setDefaultTimeouts",
            json!({ "navigationMs": millis(navigation), "operationMs": millis(operation) }),
            operation,
        )
        .await?;
        Ok(())
    }

    async fn open(
        &mut self,
        url: &str,
        wait: WaitUntil,
        timeout: Duration,
    ) -> Result<(), SurfaceError> {
        self.call(
            "goto",
            json!({ "url": url, "waitUntil": wait.as_str(), "timeoutMs": millis(timeout) }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn reload(&mut self, wait: WaitUntil, timeout: Duration) -> Result<(), SurfaceError> {
        self.call(
            "reload",
            json!({ "waitUntil": wait.as_str(), "timeoutMs": millis(timeout) }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        state: SelectorState,
        timeout: Duration,
    ) -> Result<bool, SurfaceError> {
        let result = self
            .call(
                "waitForSelector",
                json!({ "selector": selector, "state": state.as_str(), "timeoutMs": millis(timeout) }),
                timeout,
            )
            .await?;
        result
            .as_bool()
            .ok_or_else(|| SurfaceError::Protocol(format!("expected bool, got {}", result)))
    }

    async fn query_snippets(&mut self, selector: &str) -> Result<Vec<SnippetHandle>, SurfaceError> {
        let timeout = self.operation_timeout;
        let result = self
            .call("count", json!({ "selector": selector }), timeout)
            .await?;
        let count = result
            .as_u64()
            .ok_or_else(|| SurfaceError::Protocol(format!("expected count, got {}", result)))?;

        Ok((0..count as usize)
            .map(|index| SnippetHandle::new(selector, index))
            .collect())
    }

    async fn read_text(
        &mut self,
        handle: &SnippetHandle,
        sub: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let timeout = self.operation_timeout;
        let result = self
            .call("readText", Self::snippet_params(handle, sub), timeout)
            .await?;
        Ok(optional_string(result))
    }

    async fn read_attribute(
        &mut self,
        handle: &SnippetHandle,
        sub: &str,
        attribute: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let timeout = self.operation_timeout;
        let mut params = Self::snippet_params(handle, sub);
        params["attribute"] = Value::String(attribute.to_string());
        let result = self.call("readAttribute", params, timeout).await?;
        Ok(optional_string(result))
    }

    async fn current_url(&mut self) -> Result<String, SurfaceError> {
        let timeout = self.operation_timeout;
        let result = self.call("url", Value::Null, timeout).await?;
        Ok(optional_string(result).unwrap_or_default())
    }

    async fn current_title(&mut self) -> Result<String, SurfaceError> {
        let timeout = self.operation_timeout;
        let result = self.call("title", Value::Null, timeout).await?;
        Ok(optional_string(result).unwrap_or_default())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), SurfaceError> {
        let timeout = self.operation_timeout;
        self.call(
            "screenshot",
            json!({ "path": path.display().to_string() }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn html_content(&mut self) -> Result<String, SurfaceError> {
        let timeout = self.operation_timeout;
        let result = self.call("content", Value::Null, timeout).await?;
        Ok(optional_string(result).unwrap_or_default())
    }

    async fn save_storage_state(&mut self, path: &Path) -> Result<(), SurfaceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let timeout = self.operation_timeout;
        self.call(
            "storageState",
            json!({ "path": path.display().to_string() }),
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn close_page(&mut self) -> Result<(), SurfaceError> {
        let timeout = self.operation_timeout;
        self.call("closePage", Value::Null, timeout).await?;
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), SurfaceError> {
        let timeout = self.operation_timeout;
        self.call("closeContext", Value::Null, timeout).await?;
        Ok(())
    }

    async fn close_browser(&mut self) -> Result<(), SurfaceError> {
        let timeout = self.operation_timeout;
        let result = self.call("closeBrowser", Value::Null, timeout).await;

        // The bridge exits once stdin closes; make sure it is gone either way
        self.closed = true;
        let _ = self.stdin.shutdown().await;
        match tokio::time::timeout(self.grace, self.child.wait()).await {
            Ok(Ok(status)) => debug!("Playwright bridge exited with {}", status),
            _ => {
                warn!("Playwright bridge did not exit, killing it");
                let _ = self.child.kill().await;
            }
        }

        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(name: &str, message: &str) -> Option<BridgeFailure> {
        Some(BridgeFailure {
            name: name.to_string(),
            message: message.to_string(),
        })
    }

    #[test]
    fn test_timeout_failures_map_to_timeout() {
        let err = map_failure("waitForSelector", failure("TimeoutError", "30000ms exceeded"));
        assert!(matches!(err, SurfaceError::Timeout(_)));
    }

    #[test]
    fn test_navigation_failures_keep_message() {
        let err = map_failure(
            "reload",
            failure("Error", "net::ERR_INTERNET_DISCONNECTED at https://example.com"),
        );
        match err {
            SurfaceError::Navigation(message) => {
                assert!(message.contains("ERR_INTERNET_DISCONNECTED"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_other_failures_are_operations() {
        let err = map_failure("readText", failure("Error", "element detached"));
        assert!(matches!(err, SurfaceError::Operation(_)));
        assert!(matches!(map_failure("count", None), SurfaceError::Operation(_)));
    }

    #[test]
    fn test_response_parsing() {
        let ok: BridgeResponse =
            serde_json::from_str(r#"{"id":3,"ok":true,"result":true}"#).unwrap();
        assert_eq!(ok.id, Some(3));
        assert_eq!(ok.result, Value::Bool(true));

        let bad: BridgeResponse = serde_json::from_str(
            r#"{"id":null,"ok":false,"error":{"name":"ProtocolError","message":"malformed request"}}"#,
        )
        .unwrap();
        assert!(bad.id.is_none());
        assert!(!bad.ok);
        assert!(matches!(
            map_failure("goto", bad.error),
            SurfaceError::Protocol(_)
        ));
    }

    #[test]
    fn test_millis_conversion() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }
}
