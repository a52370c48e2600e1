//! Caller side of a running funding watcher

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

use crate::types::FundingStatus;

/// Handle returned by `FundingWatcher::spawn`
///
/// Dropping the handle, or a `finish` future before it resolves, stops the
/// watcher.
pub struct FundingHandle {
    pub(super) id: String,
    pub(super) progress: mpsc::UnboundedReceiver<FundingStatus>,
    pub(super) result: oneshot::Receiver<FundingStatus>,
    pub(super) shutdown: CancellationToken,
    pub(super) join: JoinHandle<()>,
    pub(super) guard: DropGuard,
}

impl FundingHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancel the watcher; nothing further is emitted once this returns
    ///
    /// A fetch already in flight is abandoned rather than reported.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Next status in emission order, or None once the watcher is done
    pub async fn next_update(&mut self) -> Option<FundingStatus> {
        self.progress.recv().await
    }

    /// Drive `on_update` with every status and wait for the outcome
    ///
    /// Ok carries the Confirmed status. Err carries the Timeout or Error
    /// status, or a locally built Error if the watcher was stopped first.
    pub async fn finish<F>(mut self, mut on_update: F) -> Result<FundingStatus, FundingStatus>
    where
        F: FnMut(&FundingStatus),
    {
        while let Some(status) = self.progress.recv().await {
            on_update(&status);
        }

        let outcome = match self.result.await {
            Ok(status) if status.is_confirmed() => Ok(status),
            Ok(status) => Err(status),
            Err(_) => Err(FundingStatus::error(
                Vec::new(),
                "watcher stopped before reaching a terminal state",
            )),
        };

        if let Err(e) = self.join.await {
            warn!(watcher = %self.id, error = %e, "funding watcher task failed");
        }
        self.guard.disarm();

        outcome
    }
}
