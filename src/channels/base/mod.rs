use crate::agent::context::{ConversationContext, Reply, ReplyKind};
use async_trait::async_trait;

/// Platform ids of the messages one `send` call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_ids: Vec<String>,
}

impl SendReceipt {
    pub fn single(id: impl Into<String>) -> Self {
        Self {
            message_ids: vec![id.into()],
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait BaseChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Whether the platform can deliver replies of this kind.
    fn supports(&self, kind: ReplyKind) -> bool;

    /// Deliver a reply to `ctx.receiver`. The receipt carries an id for each
    /// platform message created, when the platform reports one.
    async fn send(&self, reply: &Reply, ctx: &ConversationContext) -> anyhow::Result<SendReceipt>;

    /// Withdraw a previously delivered message.
    /// Default: retraction unsupported, returns `false`.
    async fn retract(&self, _message_id: &str, _recipient: &str) -> anyhow::Result<bool> {
        Ok(false)
    }
}
