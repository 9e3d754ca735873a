use crate::channels::base::BaseChannel;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of active channels, keyed by name.
#[derive(Default, Clone)]
pub struct ChannelManager {
    channels: BTreeMap<String, Arc<dyn BaseChannel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: Arc<dyn BaseChannel>) {
        let name = channel.name().to_string();
        if self.channels.insert(name.clone(), channel).is_some() {
            tracing::warn!("channel {} registered twice, keeping the latest", name);
        } else {
            tracing::info!("{} channel enabled", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BaseChannel>> {
        self.channels.get(name).cloned()
    }

    pub fn enabled_channels(&self) -> Vec<&str> {
        self.channels.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub async fn start_all(&self) -> Result<()> {
        for (name, channel) in &self.channels {
            tracing::info!("Starting channel: {}", name);
            if let Err(e) = channel.start().await {
                tracing::error!("Failed to start channel {}: {}", name, e);
                return Err(anyhow::anyhow!("Failed to start channel {}: {}", name, e));
            }
            tracing::info!("Channel {} started successfully", name);
        }
        Ok(())
    }

    /// Stop every channel, logging failures instead of stopping early.
    pub async fn stop_all(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                tracing::warn!("Failed to stop channel {}: {}", name, e);
            }
        }
    }
}
