use crate::agent::context::{ConversationContext, Reply, SentMessageRecord};
use crate::channels::base::{BaseChannel, SendReceipt};
use anyhow::Result;

/// Sends replies through one channel and records every platform message id
/// the channel reports on the context's delivery list.
pub struct DeliveryTracker<'a> {
    channel: &'a dyn BaseChannel,
}

impl<'a> DeliveryTracker<'a> {
    pub fn new(channel: &'a dyn BaseChannel) -> Self {
        Self { channel }
    }

    pub async fn send(&self, reply: &Reply, ctx: &mut ConversationContext) -> Result<SendReceipt> {
        let receipt = self.channel.send(reply, ctx).await?;
        for id in receipt.message_ids.iter().filter(|id| !id.is_empty()) {
            ctx.record_sent(SentMessageRecord {
                platform_message_id: id.clone(),
                recipient: ctx.receiver.clone(),
                reply_kind: reply.kind,
            });
        }
        if receipt.message_ids.is_empty() {
            tracing::debug!(
                "{} send of {} returned no message id, nothing to track",
                self.channel.name(),
                reply.kind
            );
        }
        Ok(receipt)
    }

    /// Send and return only the records this send appended.
    pub async fn collect_sent(
        &self,
        reply: &Reply,
        ctx: &mut ConversationContext,
    ) -> Result<Vec<SentMessageRecord>> {
        let before = ctx.sent_records().len();
        self.send(reply, ctx).await?;
        Ok(ctx.sent_records()[before..].to_vec())
    }
}

#[cfg(test)]
mod tests;
