//! Single-consumer processor for the persisted command queue.
//!
//! An external producer process inserts pending rows; this loop is the only
//! consumer. Rows move strictly forward (pending -> processing -> completed |
//! failed) and are never deleted. A row left in `processing` by a crash is an
//! operator concern; the processor does not try to recover it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{AdminCommand, CommandExecutor};
use crate::config::Config;
use crate::domain::QueuedCommand;
use crate::storage::StoragePort;
use crate::Result;

const TRUNCATION_MARKER: &str = "… [truncated]";

pub struct CommandQueueProcessor {
    store: Arc<dyn StoragePort>,
    executor: CommandExecutor,
    poll_interval: Duration,
    error_backoff: Duration,
    batch_size: usize,
    result_max_len: usize,
}

impl CommandQueueProcessor {
    pub fn new(store: Arc<dyn StoragePort>, executor: CommandExecutor, cfg: &Config) -> Self {
        Self {
            store,
            executor,
            poll_interval: cfg.queue_poll_interval,
            error_backoff: cfg.queue_error_backoff,
            batch_size: cfg.queue_batch_size,
            result_max_len: cfg.result_max_len,
        }
    }

    /// Spawn the polling loop. Cancel the returned token to stop it.
    pub fn spawn(self: Arc<Self>) -> (CancellationToken, JoinHandle<()>) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            info!(
                poll_secs = self.poll_interval.as_secs(),
                "command queue processor started"
            );
            let mut wait = self.poll_interval;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(wait) => {}
                }

                wait = match self.tick().await {
                    Ok(0) => self.poll_interval,
                    Ok(n) => {
                        debug!(processed = n, "queue batch processed");
                        self.poll_interval
                    }
                    Err(e) => {
                        warn!(error = %e, "queue poll failed, backing off");
                        self.error_backoff
                    }
                };
            }
        });

        (cancel, handle)
    }

    /// Process one batch in creation order.
    ///
    /// Row-level failures are recorded on the row; only processor-level
    /// failures (claiming the batch, moving a row) bubble up.
    pub async fn tick(&self) -> Result<usize> {
        let batch = self.store.pending_commands(self.batch_size).await?;
        let mut processed = 0usize;

        for row in batch {
            self.store.mark_processing(row.id).await?;
            match self.run_command(&row).await {
                Ok(outcome) => {
                    self.store
                        .mark_completed(row.id, &truncate_result(&outcome, self.result_max_len))
                        .await?;
                }
                Err(e) => {
                    warn!(
                        command_id = row.id,
                        command = %row.command,
                        error = %e,
                        "queued command failed"
                    );
                    self.store
                        .mark_failed(row.id, &truncate_result(&e.to_string(), self.result_max_len))
                        .await?;
                }
            }
            processed += 1;
        }

        Ok(processed)
    }

    async fn run_command(&self, row: &QueuedCommand) -> Result<String> {
        let command = AdminCommand::parse(&row.command, &row.args)?;
        self.executor.execute(command).await
    }
}

fn truncate_result(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_len).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
