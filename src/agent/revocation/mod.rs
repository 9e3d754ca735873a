use crate::agent::context::SentMessageRecord;
use crate::channels::base::BaseChannel;
use crate::utils::task_tracker::TaskTracker;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One message queued for retraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevocationTarget {
    pub message_id: String,
    pub recipient: String,
}

/// Retracts delivered messages after a delay on a detached task.
pub struct RevocationScheduler {
    channel: Arc<dyn BaseChannel>,
    tasks: Arc<TaskTracker>,
}

impl RevocationScheduler {
    pub fn new(channel: Arc<dyn BaseChannel>, tasks: Arc<TaskTracker>) -> Self {
        Self { channel, tasks }
    }

    /// Queue `records` for retraction after `delay`.
    ///
    /// Records are deduplicated by (id, recipient) and records missing either
    /// field are dropped. Returns the targets that will be retracted; when
    /// none remain no task is spawned. Outcomes are only logged. A shutdown
    /// of the task tracker cuts the delay short.
    pub async fn schedule_revoke(
        &self,
        records: &[SentMessageRecord],
        delay: Duration,
    ) -> Vec<RevocationTarget> {
        let targets = dedup_targets(records);
        if targets.is_empty() {
            debug!("no retractable messages, skipping revoke");
            return targets;
        }

        let channel = self.channel.clone();
        let queued = targets.clone();
        let stopping = self.tasks.shutdown_requested();
        let task = self
            .tasks
            .spawn_detached("revoke", async move {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stopping => {
                        info!("shutting down, revoking {} message(s) early", queued.len());
                    }
                }
                for target in &queued {
                    match channel.retract(&target.message_id, &target.recipient).await {
                        Ok(true) => info!(
                            "revoke success, channel={}, msg_id={}, to={}",
                            channel.name(),
                            target.message_id,
                            target.recipient
                        ),
                        Ok(false) => warn!(
                            "revoke failed, channel={}, msg_id={}, to={}",
                            channel.name(),
                            target.message_id,
                            target.recipient
                        ),
                        Err(e) => warn!(
                            "revoke error, channel={}, msg_id={}, to={}, err={:#}",
                            channel.name(),
                            target.message_id,
                            target.recipient,
                            e
                        ),
                    }
                }
            })
            .await;
        info!(
            "scheduled revoke of {} message(s) in {}s as {}",
            targets.len(),
            delay.as_secs(),
            task
        );
        targets
    }
}

fn dedup_targets(records: &[SentMessageRecord]) -> Vec<RevocationTarget> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| !r.platform_message_id.is_empty() && !r.recipient.is_empty())
        .map(|r| RevocationTarget {
            message_id: r.platform_message_id.clone(),
            recipient: r.recipient.clone(),
        })
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests;
