//! Image creation with asynchronous moderation.
//!
//! The generated image is delivered as soon as it exists. A moderation check
//! started before generation decides afterwards whether the delivered
//! messages stay up or get retracted.

use crate::agent::context::{ConversationContext, Reply, SentMessageRecord};
use crate::agent::delivery::DeliveryTracker;
use crate::agent::revocation::{RevocationScheduler, RevocationTarget};
use crate::channels::ChannelManager;
use crate::channels::base::BaseChannel;
use crate::channels::utils::decorate_reply;
use crate::config::{AgentConfig, ModerationConfig};
use crate::errors::GatewayError;
use crate::providers::base::ReplyGenerator;
use crate::safety::moderation::{ModerationChecker, ModerationScope, ModerationVerdict};
use crate::utils::task_tracker::TaskTracker;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageCreateState {
    Generating,
    Sent,
    AwaitingVerdict,
    Clean,
    RevokeScheduled,
}

/// How one image-creation request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageCreateOutcome {
    /// Generation failed or produced nothing; nothing was sent.
    Aborted,
    /// The reply was not an image and went out unmoderated.
    PassedThrough,
    /// Moderation confirmed the prompt is safe.
    Clean,
    RevokeScheduled {
        delay: Duration,
        targets: Vec<RevocationTarget>,
        /// Whether a warning was delivered alongside the image.
        warned: bool,
    },
}

pub struct ImageCreateOrchestrator {
    generator: Arc<dyn ReplyGenerator>,
    checker: Arc<ModerationChecker>,
    channels: ChannelManager,
    tasks: Arc<TaskTracker>,
    agent: AgentConfig,
    moderation: ModerationConfig,
}

impl ImageCreateOrchestrator {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        checker: Arc<ModerationChecker>,
        channels: ChannelManager,
        tasks: Arc<TaskTracker>,
        agent: AgentConfig,
        moderation: ModerationConfig,
    ) -> Self {
        Self {
            generator,
            checker,
            channels,
            tasks,
            agent,
            moderation,
        }
    }

    /// Generate, deliver and moderate an image for `ctx`.
    ///
    /// Errors from delivering the generated reply propagate. Everything that
    /// happens after delivery is contained and ends in a decision.
    pub async fn handle_image_create_request(
        &self,
        ctx: &mut ConversationContext,
    ) -> Result<ImageCreateOutcome> {
        let channel = self
            .channels
            .get(&ctx.channel)
            .ok_or_else(|| GatewayError::channel(&ctx.channel, "channel is not registered"))?;

        // Submitted before generation so both run in parallel. The handle is
        // dropped on timeout, which detaches the check rather than cancelling it.
        let checker = self.checker.clone();
        let scope = ModerationScope::from_context(ctx);
        let prompt = ctx.content.clone();
        let check = tokio::spawn(async move { checker.check(&prompt, &scope).await });

        enter(ctx, ImageCreateState::Generating);
        let reply = match self.generator.generate_reply(ctx).await {
            Ok(reply) if !reply.is_empty() => reply,
            Ok(_) => {
                warn!("image generation returned no content, session={}", ctx.session_id);
                return Ok(ImageCreateOutcome::Aborted);
            }
            Err(e) => {
                warn!(
                    "image generation failed, session={}: {:#}",
                    ctx.session_id, e
                );
                return Ok(ImageCreateOutcome::Aborted);
            }
        };

        let reply = decorate_reply(reply, ctx, channel.as_ref(), &self.agent);
        let tracker = DeliveryTracker::new(channel.as_ref());
        if !reply.kind.is_image() {
            debug!(
                "image request answered with {} reply, skipping moderation",
                reply.kind
            );
            tracker.send(&reply, ctx).await?;
            return Ok(ImageCreateOutcome::PassedThrough);
        }

        let image_records = tracker.collect_sent(&reply, ctx).await?;
        enter(ctx, ImageCreateState::Sent);

        enter(ctx, ImageCreateState::AwaitingVerdict);
        let awaited = tokio::time::timeout(self.moderation.await_timeout(), check).await;
        let verdict = match awaited {
            Ok(joined) => joined,
            Err(_) => {
                warn!(
                    "nsfw check timed out after {}s, conservative revoke images",
                    self.moderation.await_timeout_secs
                );
                return Ok(self
                    .revoke_conservatively(&channel, &tracker, ctx, image_records)
                    .await);
            }
        };

        Ok(self
            .decide(&channel, &tracker, ctx, image_records, verdict)
            .await)
    }

    async fn decide(
        &self,
        channel: &Arc<dyn BaseChannel>,
        tracker: &DeliveryTracker<'_>,
        ctx: &mut ConversationContext,
        image_records: Vec<SentMessageRecord>,
        verdict: Result<ModerationVerdict, JoinError>,
    ) -> ImageCreateOutcome {
        let verdict = match verdict {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    "nsfw check failed with exception, conservative revoke images: {}",
                    e
                );
                return self
                    .revoke_conservatively(channel, tracker, ctx, image_records)
                    .await;
            }
        };

        if verdict.is_clean() {
            enter(ctx, ImageCreateState::Clean);
            return ImageCreateOutcome::Clean;
        }
        if !verdict.is_unsafe() {
            warn!(
                "nsfw check all attempts failed ({} attempts), conservative revoke images",
                verdict.attempts
            );
            return self
                .revoke_conservatively(channel, tracker, ctx, image_records)
                .await;
        }

        info!(
            "nsfw content detected after {} attempt(s), warning session={}",
            verdict.attempts, ctx.session_id
        );
        let warning = Reply::text(self.moderation.warning_text.clone());
        let mut records = self.send_notice(tracker, ctx, &warning).await;
        let warned = !records.is_empty();
        records.extend(image_records);

        let delay = self.moderation.warning_revoke_delay();
        let targets = RevocationScheduler::new(channel.clone(), self.tasks.clone())
            .schedule_revoke(&records, delay)
            .await;
        enter(ctx, ImageCreateState::RevokeScheduled);
        ImageCreateOutcome::RevokeScheduled {
            delay,
            targets,
            warned,
        }
    }

    /// Retract the delivered images after the short delay, optionally with a
    /// notice that is retracted along with them.
    async fn revoke_conservatively(
        &self,
        channel: &Arc<dyn BaseChannel>,
        tracker: &DeliveryTracker<'_>,
        ctx: &mut ConversationContext,
        image_records: Vec<SentMessageRecord>,
    ) -> ImageCreateOutcome {
        let mut records = Vec::new();
        let mut warned = false;
        if self.moderation.notify_on_inconclusive {
            let notice = Reply::text(self.moderation.inconclusive_notice_text.clone());
            records = self.send_notice(tracker, ctx, &notice).await;
            warned = !records.is_empty();
        }
        records.extend(image_records);

        let delay = self.moderation.conservative_revoke_delay();
        let targets = RevocationScheduler::new(channel.clone(), self.tasks.clone())
            .schedule_revoke(&records, delay)
            .await;
        enter(ctx, ImageCreateState::RevokeScheduled);
        ImageCreateOutcome::RevokeScheduled {
            delay,
            targets,
            warned,
        }
    }

    /// Send a moderation notice; a failed send is logged and yields no records.
    async fn send_notice(
        &self,
        tracker: &DeliveryTracker<'_>,
        ctx: &mut ConversationContext,
        notice: &Reply,
    ) -> Vec<SentMessageRecord> {
        match tracker.collect_sent(notice, ctx).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "failed to send moderation notice to {}: {:#}",
                    ctx.receiver, e
                );
                Vec::new()
            }
        }
    }
}

fn enter(ctx: &ConversationContext, state: ImageCreateState) {
    debug!(
        "image_create session={} receiver={} state={:?}",
        ctx.session_id, ctx.receiver, state
    );
}
