//! Funding Watcher
//!
//! Polls an address until its unspent value reaches a target, the deadline
//! passes, or the caller stops it. Every poll is reported on the progress
//! channel; exactly one terminal status (Confirmed, Timeout or Error) ends
//! the stream unless the watcher was stopped.
//!
//! Timing:
//! - the first poll happens immediately
//! - later polls start `poll_interval` after the previous one completed
//! - a fetch still running at the deadline is abandoned

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::handle::FundingHandle;
use super::request::FundingRequest;
use crate::common::{generate_correlation_id, log_funding_event};
use crate::query::UtxoSource;
use crate::types::{FundingStatus, Utxo, UtxoTotals};

/// Background poller for one funding request
pub struct FundingWatcher {
    id: String,
    source: Arc<dyn UtxoSource>,
    request: FundingRequest,
    shutdown: CancellationToken,
    progress: mpsc::UnboundedSender<FundingStatus>,
}

impl FundingWatcher {
    /// Start watching on a background task
    pub fn spawn(
        source: Arc<dyn UtxoSource>,
        request: FundingRequest,
        shutdown: CancellationToken,
    ) -> FundingHandle {
        let id = generate_correlation_id();
        let (progress, progress_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let watcher = FundingWatcher {
            id: id.clone(),
            source,
            request,
            shutdown: shutdown.clone(),
            progress,
        };
        let join = tokio::spawn(async move {
            if let Some(outcome) = watcher.watch().await {
                let _ = result_tx.send(outcome);
            }
        });

        FundingHandle {
            id,
            progress: progress_rx,
            result: result_rx,
            guard: shutdown.clone().drop_guard(),
            shutdown,
            join,
        }
    }

    /// Poll until a terminal status; None if stopped first
    async fn watch(self) -> Option<FundingStatus> {
        let started = Instant::now();
        let deadline = started + self.request.timeout;
        let mut last_seen: Vec<Utxo> = Vec::new();
        let mut tick: u64 = 0;

        log_funding_event(
            "funding_watch_started",
            &self.id,
            &self.request.address,
            self.request.required_amount,
            0,
            0,
            None,
        );

        while Instant::now() < deadline {
            tick += 1;
            let fetched = timeout_at(deadline, self.source.fetch(&self.request.address)).await;

            // A stop that raced the fetch wins over its result
            if self.shutdown.is_cancelled() {
                debug!(watcher = %self.id, tick, "stopped during fetch");
                return None;
            }
            let Ok(fetched) = fetched else {
                break;
            };

            match fetched {
                Ok(utxos) => {
                    let totals = UtxoTotals::from_utxos(&utxos);
                    if self
                        .request
                        .policy
                        .is_satisfied(&totals, self.request.required_amount)
                    {
                        return Some(self.conclude(FundingStatus::confirmed(utxos), started));
                    }

                    debug!(
                        watcher = %self.id,
                        tick,
                        confirmed = totals.confirmed,
                        unconfirmed = totals.unconfirmed,
                        required = self.request.required_amount,
                        "below funding target"
                    );
                    self.emit(FundingStatus::monitoring(utxos.clone()));
                    last_seen = utxos;
                }
                Err(e) if e.is_retryable() => {
                    warn!(watcher = %self.id, tick, error = %e, "funding poll failed, will retry");
                    self.emit(FundingStatus::monitoring(last_seen.clone()).with_error(e.to_string()));
                }
                Err(e) => {
                    return Some(self.conclude(FundingStatus::error(last_seen, e.to_string()), started));
                }
            }

            let next_poll = (Instant::now() + self.request.poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(watcher = %self.id, tick, "stopped while waiting");
                    return None;
                }
                _ = sleep_until(next_poll) => {}
            }
        }

        if self.shutdown.is_cancelled() {
            return None;
        }
        let message = format!(
            "address did not reach {} sats within {} ms",
            self.request.required_amount,
            self.request.timeout.as_millis()
        );
        Some(self.conclude(FundingStatus::timeout(last_seen, message), started))
    }

    fn emit(&self, status: FundingStatus) {
        let _ = self.progress.send(status);
    }

    fn conclude(&self, status: FundingStatus, started: Instant) -> FundingStatus {
        self.emit(status.clone());
        log_funding_event(
            &format!("funding_{}", status.status),
            &self.id,
            &self.request.address,
            self.request.required_amount,
            status.total_value,
            started.elapsed().as_millis() as u64,
            status.error.as_deref(),
        );
        status
    }
}

// ============================================================================
// Tests
// ============================================================================
