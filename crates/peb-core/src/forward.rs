//! Forwarding fan-out with cancellable delayed delivery.
//!
//! Each target's delivery is independent: a slow or failing target never
//! blocks or cancels delivery to any other target, and no ordering is
//! guaranteed across targets or delayed units.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{ChannelId, ForwardingTask, MessageRef};
use crate::messaging::port::MessagingPort;
use crate::messaging::types::ChannelMessage;
use crate::rewrite;
use crate::rules::RuleStore;
use crate::spans::{sort_spans, FormatSpan};
use crate::Result;

#[derive(Clone)]
pub struct ForwardScheduler {
    inner: Arc<ForwarderInner>,
}

struct ForwarderInner {
    rules: Arc<RuleStore>,
    messenger: Arc<dyn MessagingPort>,
    inflight: Mutex<HashMap<i64, Vec<DelayedUnit>>>,
}

struct DelayedUnit {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ForwardScheduler {
    pub fn new(rules: Arc<RuleStore>, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            inner: Arc::new(ForwarderInner {
                rules,
                messenger,
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fan an incoming post out to every active task for its source channel.
    pub async fn on_message(&self, message: &ChannelMessage) {
        let source = message.origin.chat_id;
        for task in self.inner.rules.tasks_for_source(source) {
            if task.delay_seconds == 0 {
                if let Err(e) = self.copy(message, task.target).await {
                    warn!(
                        task_id = task.id,
                        target = task.target.0,
                        error = %e,
                        "copy failed"
                    );
                }
                continue;
            }
            self.spawn_delayed(task, message.clone());
        }
    }

    fn spawn_delayed(&self, task: ForwardingTask, message: ChannelMessage) {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(Duration::from_secs(u64::from(task.delay_seconds))) => {}
            }

            // State may have moved on during the delay; drop silently when
            // the task or either endpoint is gone.
            if !scheduler.inner.rules.task_is_deliverable(task.id) {
                debug!(task_id = task.id, "delayed copy discarded");
                return;
            }

            if let Err(e) = scheduler.copy(&message, task.target).await {
                warn!(
                    task_id = task.id,
                    target = task.target.0,
                    error = %e,
                    "delayed copy failed"
                );
            }
        });

        let mut inflight = self.inner.inflight.lock();
        let units = inflight.entry(task.id).or_default();
        units.retain(|u| !u.handle.is_finished());
        units.push(DelayedUnit { cancel, handle });
    }

    /// Proactively cancel in-flight delayed units for a task that was
    /// deactivated or deleted.
    pub fn cancel_task(&self, task_id: i64) {
        let Some(units) = self.inner.inflight.lock().remove(&task_id) else {
            return;
        };
        for unit in units {
            unit.cancel.cancel();
            unit.handle.abort();
        }
    }

    /// Duplicate the message content to `target`, preserving formatting.
    pub async fn copy(&self, message: &ChannelMessage, target: ChannelId) -> Result<MessageRef> {
        let (text, spans) = prepare_copy(&message.text, &message.spans)?;
        match message.media {
            Some(_) => {
                self.inner
                    .messenger
                    .copy_media(message.origin, target, &text, &spans)
                    .await
            }
            None => {
                self.inner
                    .messenger
                    .send_message(target, &text, &spans)
                    .await
            }
        }
    }
}

/// Convert any literal emoji markup still in the content into spans and
/// merge the two span sets. Substitution spans take precedence; an identical
/// kind at an identical offset is not doubled.
fn prepare_copy(text: &str, spans: &[FormatSpan]) -> Result<(String, Vec<FormatSpan>)> {
    if !rewrite::contains_markup(text) {
        let mut spans = spans.to_vec();
        sort_spans(&mut spans);
        return Ok((text.to_string(), spans));
    }

    let (parsed, substitution_spans) = rewrite::parse_markup(text)?;
    let mut merged = substitution_spans;
    for span in spans {
        if merged
            .iter()
            .any(|s| s.offset == span.offset && s.kind == span.kind)
        {
            continue;
        }
        merged.push(span.clone());
    }
    sort_spans(&mut merged);
    Ok((parsed, merged))
}
