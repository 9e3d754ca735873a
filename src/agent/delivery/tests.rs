use super::*;
use crate::agent::context::{ContextKind, ReplyKind};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns `ids_per_send` fresh ids per call, or fails when asked to.
struct CountingChannel {
    next: AtomicUsize,
    ids_per_send: usize,
    fail: bool,
}

impl CountingChannel {
    fn new(ids_per_send: usize) -> Self {
        Self {
            next: AtomicUsize::new(1),
            ids_per_send,
            fail: false,
        }
    }
}

#[async_trait]
impl BaseChannel for CountingChannel {
    fn name(&self) -> &str {
        "counting"
    }

    fn supports(&self, _kind: ReplyKind) -> bool {
        true
    }

    async fn send(&self, _reply: &Reply, _ctx: &ConversationContext) -> Result<SendReceipt> {
        if self.fail {
            anyhow::bail!("platform rejected message");
        }
        let message_ids = (0..self.ids_per_send)
            .map(|_| self.next.fetch_add(1, Ordering::SeqCst).to_string())
            .collect();
        Ok(SendReceipt { message_ids })
    }
}

fn ctx() -> ConversationContext {
    let mut ctx = ConversationContext::new(ContextKind::ImageCreate, "cat");
    ctx.receiver = "wxid_bob".into();
    ctx
}

#[tokio::test]
async fn test_send_records_each_id_in_order() {
    let channel = CountingChannel::new(2);
    let tracker = DeliveryTracker::new(&channel);
    let mut ctx = ctx();

    tracker
        .send(&Reply::images(vec!["a".into(), "b".into()]), &mut ctx)
        .await
        .unwrap();

    let ids: Vec<_> = ctx
        .sent_records()
        .iter()
        .map(|r| r.platform_message_id.as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(ctx.sent_records().iter().all(|r| r.recipient == "wxid_bob"));
    assert!(
        ctx.sent_records()
            .iter()
            .all(|r| r.reply_kind == ReplyKind::ImageUrl)
    );
}

#[tokio::test]
async fn test_collect_sent_isolates_this_step() {
    let channel = CountingChannel::new(1);
    let tracker = DeliveryTracker::new(&channel);
    let mut ctx = ctx();

    tracker.send(&Reply::text("earlier"), &mut ctx).await.unwrap();
    let step = tracker
        .collect_sent(&Reply::text("warning"), &mut ctx)
        .await
        .unwrap();

    assert_eq!(step.len(), 1);
    assert_eq!(step[0].platform_message_id, "2");
    assert_eq!(step[0].reply_kind, ReplyKind::Text);
    assert_eq!(ctx.sent_records().len(), 2);
}

#[tokio::test]
async fn test_send_without_ids_records_nothing() {
    let channel = CountingChannel::new(0);
    let tracker = DeliveryTracker::new(&channel);
    let mut ctx = ctx();

    let step = tracker
        .collect_sent(&Reply::text("hi"), &mut ctx)
        .await
        .unwrap();
    assert!(step.is_empty());
    assert!(ctx.sent_records().is_empty());
}

#[tokio::test]
async fn test_send_error_propagates_and_records_nothing() {
    let channel = CountingChannel {
        fail: true,
        ..CountingChannel::new(1)
    };
    let tracker = DeliveryTracker::new(&channel);
    let mut ctx = ctx();

    let err = tracker
        .collect_sent(&Reply::text("hi"), &mut ctx)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rejected"));
    assert!(ctx.sent_records().is_empty());
}
