use super::*;
use crate::agent::context::{ConversationContext, Reply, ReplyKind};
use crate::channels::base::SendReceipt;
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::time::Instant;

struct RetractLog {
    calls: Mutex<Vec<(String, String, Instant)>>,
    fail_ids: Vec<&'static str>,
}

impl RetractLog {
    fn new(fail_ids: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_ids,
        })
    }

    fn ids(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _, _)| id.clone())
            .collect()
    }
}

#[async_trait]
impl BaseChannel for RetractLog {
    fn name(&self) -> &str {
        "log"
    }

    fn supports(&self, _kind: ReplyKind) -> bool {
        true
    }

    async fn send(&self, _reply: &Reply, _ctx: &ConversationContext) -> anyhow::Result<SendReceipt> {
        Ok(SendReceipt::none())
    }

    async fn retract(&self, message_id: &str, recipient: &str) -> anyhow::Result<bool> {
        self.calls.lock().unwrap().push((
            message_id.to_string(),
            recipient.to_string(),
            Instant::now(),
        ));
        if self.fail_ids.contains(&message_id) {
            anyhow::bail!("revoke window closed");
        }
        Ok(message_id != "stale")
    }
}

fn record(id: &str, to: &str) -> SentMessageRecord {
    SentMessageRecord {
        platform_message_id: id.into(),
        recipient: to.into(),
        reply_kind: ReplyKind::ImageUrl,
    }
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_records_retracted_once() {
    let channel = RetractLog::new(vec![]);
    let scheduler = RevocationScheduler::new(channel.clone(), Arc::new(TaskTracker::new()));

    let targets = scheduler
        .schedule_revoke(&[record("m1", "u1"), record("m1", "u1")], Duration::from_secs(1))
        .await;
    assert_eq!(targets.len(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.ids(), vec!["m1"]);
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_records_dropped_and_nothing_spawned() {
    let channel = RetractLog::new(vec![]);
    let tasks = Arc::new(TaskTracker::new());
    let scheduler = RevocationScheduler::new(channel.clone(), tasks.clone());

    let targets = scheduler
        .schedule_revoke(&[record("", "u1"), record("m1", "")], Duration::from_secs(1))
        .await;

    assert!(targets.is_empty());
    assert_eq!(tasks.pending().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_retraction_waits_for_delay() {
    let channel = RetractLog::new(vec![]);
    let scheduler = RevocationScheduler::new(channel.clone(), Arc::new(TaskTracker::new()));
    let start = Instant::now();

    scheduler
        .schedule_revoke(&[record("m1", "u1"), record("m2", "u1")], Duration::from_secs(60))
        .await;

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(channel.ids().is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let calls = channel.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(
        calls
            .iter()
            .all(|(_, _, at)| at.duration_since(start) == Duration::from_secs(60))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failures_do_not_block_siblings() {
    let channel = RetractLog::new(vec!["m1"]);
    let tasks = Arc::new(TaskTracker::new());
    let scheduler = RevocationScheduler::new(channel.clone(), tasks.clone());

    scheduler
        .schedule_revoke(
            &[record("m1", "u1"), record("stale", "u1"), record("m3", "u1")],
            Duration::from_secs(1),
        )
        .await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(channel.ids(), vec!["m1", "stale", "m3"]);
    assert_eq!(tasks.pending().await, 0);
}

#[test]
fn test_same_id_different_recipient_kept() {
    let targets = dedup_targets(&[record("m1", "u1"), record("m1", "u2")]);
    assert_eq!(targets.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tracker_shutdown_retracts_immediately() {
    let channel = RetractLog::new(vec![]);
    let tasks = Arc::new(TaskTracker::new());
    let scheduler = RevocationScheduler::new(channel.clone(), tasks.clone());
    let start = Instant::now();

    scheduler
        .schedule_revoke(&[record("m1", "u1"), record("m2", "u1")], Duration::from_secs(60))
        .await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    tasks.shutdown(Duration::from_secs(10)).await;

    let calls = channel.calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert!(
        calls
            .iter()
            .all(|(_, _, at)| at.duration_since(start) == Duration::from_secs(5))
    );
}
