//! The monitor loop.
//!
//! One cycle refreshes the board, waits for items, extracts every snippet,
//! drops already-emitted ids, filters for bot-development orders and appends
//! the survivors to the output store before marking them seen. Failures never
//! end the loop; they are classified and answered with a recovery step:
//!
//! | Failure                         | Response                                   |
//! |---------------------------------|--------------------------------------------|
//! | network, below threshold        | wait `network_retry`, count it             |
//! | network, threshold reached      | restart the browser session, reset count   |
//! | no items, login-looking title   | re-authenticate, reopen the board          |
//! | no items, any other title       | reopen the board                           |
//! | anything else                   | wait `unknown_backoff`                     |
//!
//! Only cancellation stops the loop. On the way out the seen set is flushed
//! and the session closed.

use crate::auth::AuthProvider;
use crate::classifier;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::extractor::SnippetExtractor;
use crate::filter;
use crate::pacing::{jittered, sleep_or_cancel};
use crate::session::SessionManager;
use crate::types::{FailureCategory, SurfaceError, WatchError};
use seen_store::{OrderRecord, Store};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How many new records are logged in full after each emission
const PREVIEW_RECORDS: usize = 3;

/// Delays, thresholds and paths the loop works with
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_base_seconds: u64,
    pub poll_jitter_seconds: u64,
    pub network_retry: Duration,
    pub network_failure_threshold: u32,
    pub unknown_backoff: Duration,
    pub reauth_delay_seconds: u64,
    pub reauth_jitter_seconds: u64,
    pub reopen_delay_seconds: u64,
    pub reopen_jitter_seconds: u64,
    pub login_title_markers: Vec<String>,
    pub output_path: PathBuf,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        let timing = &config.timing;
        Self {
            poll_base_seconds: timing.poll_base_seconds,
            poll_jitter_seconds: timing.poll_jitter_seconds,
            network_retry: Duration::from_secs(timing.network_retry_seconds),
            network_failure_threshold: timing.network_failure_threshold.max(1),
            unknown_backoff: Duration::from_secs(timing.unknown_backoff_seconds),
            reauth_delay_seconds: timing.reauth_delay_seconds,
            reauth_jitter_seconds: timing.reauth_jitter_seconds,
            reopen_delay_seconds: timing.reopen_delay_seconds,
            reopen_jitter_seconds: timing.reopen_jitter_seconds,
            login_title_markers: config.board.login_title_markers.clone(),
            output_path: config.paths.output_path.clone(),
        }
    }
}

/// What a single cycle ended with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Items were read; `emitted` of the `snippets` were new and relevant
    Scanned { snippets: usize, emitted: usize },
    /// Network failure below the restart threshold
    NetworkRetry { consecutive: u32 },
    /// Browser session was torn down and rebuilt
    SessionRestarted,
    /// Login screen detected; credentials re-established
    Reauthenticated,
    /// Items missing on a normal page; board reopened
    BoardReopened,
    /// Unclassified failure; backed off
    Backoff,
    /// Shutdown requested before the cycle began
    Cancelled,
}

/// Totals over one `run`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub emitted: u64,
    pub restarts: u64,
}

/// Drives the session through poll cycles until cancelled
pub struct MonitorLoop {
    session: SessionManager,
    extractor: SnippetExtractor,
    dedup: Deduplicator,
    store: Arc<dyn Store>,
    auth: Arc<dyn AuthProvider>,
    settings: MonitorSettings,
    cancel: CancellationToken,
    network_failures: u32,
    summary: RunSummary,
}

impl MonitorLoop {
    pub fn new(
        session: SessionManager,
        extractor: SnippetExtractor,
        dedup: Deduplicator,
        store: Arc<dyn Store>,
        auth: Arc<dyn AuthProvider>,
        settings: MonitorSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session,
            extractor,
            dedup,
            store,
            auth,
            settings,
            cancel,
            network_failures: 0,
            summary: RunSummary::default(),
        }
    }

    /// Consecutive network failures since the last success or restart
    pub fn consecutive_network_failures(&self) -> u32 {
        self.network_failures
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Bring up the session: launch, authenticate, open the board.
    ///
    /// A board without items at this point is only logged; the first cycle
    /// deals with it.
    pub async fn start(&mut self) -> Result<(), WatchError> {
        self.session.start().await?;
        self.session.reauthenticate(self.auth.as_ref()).await?;
        self.session.open_board().await?;

        if !self.session.wait_for_items().await? {
            warn!("Board opened without items; continuing with the poll loop");
        }
        info!("Monitoring {}", self.session.settings().board_url);
        Ok(())
    }

    /// Cycle until cancelled, then persist and close
    pub async fn run(mut self) -> RunSummary {
        loop {
            if self.run_cycle().await == CycleOutcome::Cancelled {
                break;
            }
        }
        self.shutdown().await;
        info!(
            cycles = self.summary.cycles,
            emitted = self.summary.emitted,
            restarts = self.summary.restarts,
            "Monitor stopped"
        );
        self.summary
    }

    /// One poll cycle, including whatever recovery it ends with
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        self.summary.cycles += 1;

        if !self.session.is_started() {
            warn!("No live browser session, starting one");
            return self.restart_session().await;
        }

        if let Err(e) = self.session.soft_refresh().await {
            return self.recover(e.into()).await;
        }
        self.network_failures = 0;

        // Past the refresh every failure is unclassified
        match self.scan().await {
            Ok(outcome) => outcome,
            Err(e) => self.back_off(&e).await,
        }
    }

    /// Read the refreshed board and emit new matches
    async fn scan(&mut self) -> Result<CycleOutcome, WatchError> {
        if !self.session.wait_for_items().await? {
            return self.handle_missing_items().await;
        }

        let snippets = self.session.item_snippets().await?;
        let mut accepted: Vec<OrderRecord> = Vec::new();
        let mut rejected = 0usize;

        for handle in &snippets {
            let record = self
                .extractor
                .extract(self.session.surface()?, handle)
                .await?;

            if !record.has_identity() {
                trace!("Skipping snippet #{} without an id", handle.index);
                continue;
            }
            if self.dedup.is_seen(&record.id) || accepted.iter().any(|r| r.id == record.id) {
                continue;
            }
            if !filter::order_matches(&record) {
                trace!("Rejected {}: {}", record.id, record.title);
                rejected += 1;
                continue;
            }
            accepted.push(record);
        }

        debug!(
            "Cycle read {} snippets: {} new matches, {} rejected",
            snippets.len(),
            accepted.len(),
            rejected
        );

        let emitted = self.emit(&accepted)?;
        self.pause(jittered(
            self.settings.poll_base_seconds,
            self.settings.poll_jitter_seconds,
        ))
        .await;

        Ok(CycleOutcome::Scanned {
            snippets: snippets.len(),
            emitted,
        })
    }

    /// Items never rendered: decide between a login screen and a bad render
    async fn handle_missing_items(&mut self) -> Result<CycleOutcome, WatchError> {
        let title = self.session.current_title().await?;

        if classifier::looks_logged_out(&title, &self.settings.login_title_markers) {
            warn!(
                category = FailureCategory::SessionExpired.as_str(),
                "Board shows a login page ('{}'), re-authenticating", title
            );
            self.session.reauthenticate(self.auth.as_ref()).await?;
            self.session.open_board().await?;
            self.pause(jittered(
                self.settings.reauth_delay_seconds,
                self.settings.reauth_jitter_seconds,
            ))
            .await;
            return Ok(CycleOutcome::Reauthenticated);
        }

        warn!(
            category = FailureCategory::ContentMissing.as_str(),
            "No items on '{}', reopening the board", title
        );
        self.session.open_board().await?;
        self.pause(jittered(
            self.settings.reopen_delay_seconds,
            self.settings.reopen_jitter_seconds,
        ))
        .await;
        Ok(CycleOutcome::BoardReopened)
    }

    /// Append each record and mark its id as soon as the append succeeds,
    /// then persist the set once. A failed append stops the batch; ids
    /// written before it are still persisted.
    fn emit(&mut self, records: &[OrderRecord]) -> Result<usize, WatchError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut written = 0;
        let mut failure = None;
        for record in records {
            match self.store.append_record(&self.settings.output_path, record) {
                Ok(()) => {
                    self.dedup.mark_emitted([record.id.as_str()]);
                    written += 1;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if written == 0 {
            return match failure {
                Some(e) => Err(e.into()),
                None => Ok(0),
            };
        }

        let flushed = self.dedup.flush(self.store.as_ref());
        self.summary.emitted += written as u64;
        info!(
            "Found {} new matching orders (appended to {:?})",
            written, self.settings.output_path
        );
        let preview = &records[..written.min(PREVIEW_RECORDS)];
        match serde_json::to_string_pretty(preview) {
            Ok(json) => info!("New orders:\n{}", json),
            Err(e) => debug!("Could not render preview: {}", e),
        }

        if let Some(e) = failure {
            if let Err(flush_error) = flushed {
                error!("Failed to save seen ids after a partial batch: {}", flush_error);
            }
            warn!("Appended {} of {} orders before the store failed", written, records.len());
            return Err(e.into());
        }
        flushed?;
        Ok(written)
    }

    async fn recover(&mut self, error: WatchError) -> CycleOutcome {
        match classifier::classify(&error) {
            FailureCategory::Network => {
                self.network_failures += 1;
                if self.network_failures >= self.settings.network_failure_threshold {
                    warn!(
                        category = FailureCategory::Network.as_str(),
                        "{} consecutive network failures, restarting the browser session: {}",
                        self.network_failures,
                        error
                    );
                    return self.restart_session().await;
                }

                warn!(
                    category = FailureCategory::Network.as_str(),
                    "Network failure {}/{}, retrying in {:?}: {}",
                    self.network_failures,
                    self.settings.network_failure_threshold,
                    self.settings.network_retry,
                    error
                );
                self.pause(self.settings.network_retry).await;
                CycleOutcome::NetworkRetry {
                    consecutive: self.network_failures,
                }
            }
            _ => self.back_off(&error).await,
        }
    }

    /// Tear down and rebuild the session, then reopen the board
    async fn restart_session(&mut self) -> CycleOutcome {
        self.summary.restarts += 1;
        self.network_failures = 0;

        match self.relaunch().await {
            Ok(()) => {
                info!("Browser session restarted");
                CycleOutcome::SessionRestarted
            }
            Err(e) => self.back_off(&WatchError::from(e)).await,
        }
    }

    async fn relaunch(&mut self) -> Result<(), SurfaceError> {
        self.session.close().await;
        self.session.start().await?;
        self.session.open_board().await
    }

    async fn back_off(&mut self, error: &WatchError) -> CycleOutcome {
        error!(
            category = FailureCategory::Unknown.as_str(),
            detail = ?error,
            "Cycle failed, backing off {:?}: {}",
            self.settings.unknown_backoff,
            error
        );
        self.pause(self.settings.unknown_backoff).await;
        CycleOutcome::Backoff
    }

    async fn pause(&self, duration: Duration) {
        if !sleep_or_cancel(duration, &self.cancel).await {
            debug!("Sleep interrupted by shutdown");
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down, saving {} seen ids", self.dedup.len());
        if let Err(e) = self.dedup.flush(self.store.as_ref()) {
            error!("Failed to save seen ids on shutdown: {}", e);
        }
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.timing.network_failure_threshold = 0;
        config.paths.output_path = PathBuf::from("out/orders.jsonl");

        let settings = MonitorSettings::from_config(&config);
        assert_eq!(settings.network_failure_threshold, 1);
        assert_eq!(settings.network_retry, Duration::from_secs(20));
        assert_eq!(settings.unknown_backoff, Duration::from_secs(10));
        assert_eq!(settings.output_path, PathBuf::from("out/orders.jsonl"));
        assert!(!settings.login_title_markers.is_empty());
    }
}
