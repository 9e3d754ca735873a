use crate::bus::InboundMessage;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_RATE_LIMIT: usize = 30;
const DEFAULT_RATE_WINDOW_S: f64 = 60.0;
const DEFAULT_INBOUND_CAPACITY: usize = 1000;
/// Timeout for queue sends so a stalled worker pool cannot block webhook handlers.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum number of tracked senders before forced pruning
const MAX_TRACKED_SENDERS: usize = 5000;

pub struct MessageBus {
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Option<mpsc::Receiver<InboundMessage>>,
    rate_limit: usize,
    rate_window: Duration,
    sender_timestamps: HashMap<String, Vec<Instant>>,
}

impl MessageBus {
    pub fn new(rate_limit: usize, rate_window_secs: f64, inbound_capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(inbound_capacity);
        Self {
            inbound_tx,
            inbound_rx: Some(inbound_rx),
            rate_limit,
            rate_window: Duration::from_secs_f64(rate_window_secs),
            sender_timestamps: HashMap::new(),
        }
    }

    pub fn from_config(config: &crate::config::AgentConfig) -> Self {
        Self::new(
            config.rate_limit,
            DEFAULT_RATE_WINDOW_S,
            config.inbound_capacity,
        )
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(
            DEFAULT_RATE_LIMIT,
            DEFAULT_RATE_WINDOW_S,
            DEFAULT_INBOUND_CAPACITY,
        )
    }
}

impl MessageBus {
    /// Extract the inbound receiver to avoid holding lock during await
    pub fn take_inbound_rx(&mut self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inbound_rx.take()
    }

    pub async fn publish_inbound(&mut self, msg: InboundMessage) -> Result<()> {
        let now = Instant::now();
        let key = format!("{}:{}", msg.channel, msg.sender_id);

        let timestamps = self.sender_timestamps.entry(key.clone()).or_default();
        let cutoff = now.checked_sub(self.rate_window).unwrap_or(now);
        timestamps.retain(|&t| t > cutoff);

        if timestamps.len() >= self.rate_limit {
            warn!(
                "rate limit hit for {} ({}/{:.0}s), dropping message",
                key,
                self.rate_limit,
                self.rate_window.as_secs_f64()
            );
            return Err(anyhow::anyhow!("Rate limit exceeded for {}", key));
        }

        timestamps.push(now);

        if self.sender_timestamps.len() > MAX_TRACKED_SENDERS {
            let rate_window = self.rate_window;
            self.sender_timestamps
                .retain(|_, ts| ts.iter().any(|&t| now.duration_since(t) < rate_window));
        }

        let channel = msg.channel.clone();
        let message_id = msg.id.clone();
        tokio::time::timeout(SEND_TIMEOUT, self.inbound_tx.send(msg))
            .await
            .map_err(|_| {
                warn!(
                    "inbound send timed out after {}s, queue full or workers stalled",
                    SEND_TIMEOUT.as_secs()
                );
                anyhow::anyhow!("inbound send timed out, queue full")
            })?
            .context("Failed to send inbound message - receiver closed")?;
        debug!(
            "inbound message queued: channel={}, id={}",
            channel, message_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests;
