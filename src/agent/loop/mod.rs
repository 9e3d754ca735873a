use crate::agent::context::{ContextKind, ConversationContext, compose_context};
use crate::agent::delivery::DeliveryTracker;
use crate::agent::image_create::{ImageCreateOrchestrator, ImageCreateOutcome};
use crate::bus::{InboundMessage, MessageBus};
use crate::channels::ChannelManager;
use crate::channels::utils::decorate_reply;
use crate::config::{AgentConfig, ModerationConfig};
use crate::errors::GatewayError;
use crate::providers::base::ReplyGenerator;
use crate::safety::moderation::ModerationChecker;
use crate::utils::task_tracker::TaskTracker;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tracing::{debug, error, info, warn};

const REVOKE_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Configuration for creating an [`AgentLoop`] instance.
pub struct AgentLoopConfig {
    pub bus: Arc<Mutex<MessageBus>>,
    pub generator: Arc<dyn ReplyGenerator>,
    /// `None` disables moderation; image requests then take the normal path.
    pub checker: Option<Arc<ModerationChecker>>,
    pub channels: ChannelManager,
    pub tasks: Arc<TaskTracker>,
    pub agent: AgentConfig,
    pub moderation: ModerationConfig,
}

/// Drains the inbound queue and handles each message on its own task,
/// bounded by `agent.workers` permits.
pub struct AgentLoop {
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    handler: Arc<MessageHandler>,
    workers: Arc<Semaphore>,
    tasks: Arc<TaskTracker>,
    shutdown_tx: watch::Sender<bool>,
}

struct MessageHandler {
    generator: Arc<dyn ReplyGenerator>,
    channels: ChannelManager,
    images: Option<ImageCreateOrchestrator>,
    config: AgentConfig,
}

impl AgentLoop {
    pub async fn new(config: AgentLoopConfig) -> Result<Self> {
        let inbound_rx = config
            .bus
            .lock()
            .await
            .take_inbound_rx()
            .ok_or_else(|| GatewayError::Internal(anyhow::anyhow!("inbound receiver already taken")))?;

        let images = match (&config.checker, config.moderation.enabled) {
            (Some(checker), true) => Some(ImageCreateOrchestrator::new(
                config.generator.clone(),
                checker.clone(),
                config.channels.clone(),
                config.tasks.clone(),
                config.agent.clone(),
                config.moderation.clone(),
            )),
            _ => {
                warn!("image moderation disabled, generated images will not be checked");
                None
            }
        };

        let workers = config.agent.workers.max(1);
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            inbound_rx: Mutex::new(inbound_rx),
            handler: Arc::new(MessageHandler {
                generator: config.generator,
                channels: config.channels,
                images,
                config: config.agent,
            }),
            workers: Arc::new(Semaphore::new(workers)),
            tasks: config.tasks,
            shutdown_tx,
        })
    }

    /// Run until [`stop`](Self::stop) is called or every bus sender is dropped.
    /// In-flight messages finish on their own tasks.
    pub async fn run(&self) -> Result<()> {
        info!(
            "agent loop started with {} workers, waiting for messages",
            self.workers.available_permits()
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut rx = self.inbound_rx.lock().await;

        loop {
            let msg = tokio::select! {
                msg = rx.recv() => msg,
                _ = shutdown_rx.wait_for(|stopped| *stopped) => break,
            };
            let Some(msg) = msg else {
                info!("Inbound channel closed, stopping agent loop");
                break;
            };

            let permit = self
                .workers
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| GatewayError::Internal(e.into()))?;
            debug!(
                "Agent received inbound message: channel={}, sender_id={}, chat_id={}, content_len={}",
                msg.channel,
                msg.sender_id,
                msg.chat_id,
                msg.content.len()
            );
            let handler = self.handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let channel = msg.channel.clone();
                if let Err(e) = handler.process_message(msg).await {
                    error!("Error processing message from {}: {:#}", channel, e);
                }
            });
        }

        info!("Agent loop stopped");
        Ok(())
    }

    /// Stop accepting messages and run pending retractions now instead of
    /// leaving flagged images up.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        self.tasks.shutdown(REVOKE_SHUTDOWN_GRACE).await;
    }

    /// Process one message on the caller's task, bypassing the worker pool.
    pub async fn process_direct(&self, msg: InboundMessage) -> Result<()> {
        self.handler.process_message(msg).await
    }
}

impl MessageHandler {
    async fn process_message(&self, msg: InboundMessage) -> Result<()> {
        let Some(mut ctx) = compose_context(&msg, &self.config) else {
            debug!("ignoring empty message {} from {}", msg.id, msg.sender_id);
            return Ok(());
        };

        if ctx.kind == ContextKind::ImageCreate
            && let Some(images) = &self.images
        {
            let outcome = images.handle_image_create_request(&mut ctx).await?;
            if let ImageCreateOutcome::RevokeScheduled { targets, .. } = &outcome {
                info!(
                    "{} message(s) scheduled for retraction in {}",
                    targets.len(),
                    ctx.receiver
                );
            }
            return Ok(());
        }

        self.reply_normally(&mut ctx).await
    }

    async fn reply_normally(&self, ctx: &mut ConversationContext) -> Result<()> {
        let channel = self
            .channels
            .get(&ctx.channel)
            .ok_or_else(|| GatewayError::channel(&ctx.channel, "channel is not registered"))?;

        let reply = self.generator.generate_reply(ctx).await?;
        if reply.is_empty() {
            debug!("empty reply for session {}, nothing to send", ctx.session_id);
            return Ok(());
        }
        let reply = decorate_reply(reply, ctx, channel.as_ref(), &self.config);
        DeliveryTracker::new(channel.as_ref())
            .send(&reply, ctx)
            .await?;
        Ok(())
    }
}
