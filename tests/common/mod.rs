// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use chatgate::agent::context::{
    ContextKind, ConversationContext, Reply, ReplyContent, ReplyKind,
};
use chatgate::agent::{AgentLoop, AgentLoopConfig, TaskTracker};
use chatgate::bus::{ChatType, InboundMessage, MessageBus};
use chatgate::channels::ChannelManager;
use chatgate::channels::base::{BaseChannel, SendReceipt};
use chatgate::config::{AgentConfig, ModerationConfig};
use chatgate::providers::base::ReplyGenerator;
use chatgate::safety::moderation::{
    ModerationChecker, ModerationScope, RetrySchedule, SafetyClassifier,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct SentRecord {
    pub id: String,
    pub kind: ReplyKind,
    pub text: Option<String>,
    pub receiver: String,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct RetractRecord {
    pub id: String,
    pub recipient: String,
    pub at: Instant,
}

/// Channel double that assigns sequential ids (`m1`, `m2`, ...), one per
/// image source and one per other reply, and records every send and
/// retraction with the (possibly paused) tokio clock.
pub struct MockChannel {
    name: String,
    counter: AtomicUsize,
    pub sent: Mutex<Vec<SentRecord>>,
    pub retracted: Mutex<Vec<RetractRecord>>,
}

impl MockChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            counter: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            retracted: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn retracted_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .retracted
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn retracted(&self) -> Vec<RetractRecord> {
        self.retracted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseChannel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _kind: ReplyKind) -> bool {
        true
    }

    async fn send(&self, reply: &Reply, ctx: &ConversationContext) -> anyhow::Result<SendReceipt> {
        let parts = match &reply.content {
            ReplyContent::Sources(sources) => sources.len().max(1),
            _ => 1,
        };
        let mut message_ids = Vec::with_capacity(parts);
        for _ in 0..parts {
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            let id = format!("m{}", n);
            self.sent.lock().unwrap().push(SentRecord {
                id: id.clone(),
                kind: reply.kind,
                text: reply.as_text().map(str::to_string),
                receiver: ctx.receiver.clone(),
                at: Instant::now(),
            });
            message_ids.push(id);
        }
        Ok(SendReceipt { message_ids })
    }

    async fn retract(&self, message_id: &str, recipient: &str) -> anyhow::Result<bool> {
        self.retracted.lock().unwrap().push(RetractRecord {
            id: message_id.to_string(),
            recipient: recipient.to_string(),
            at: Instant::now(),
        });
        Ok(true)
    }
}

/// Generator double: scripted replies in order, then `default` for image
/// requests and an echo for text. Optional delay before answering.
pub struct MockGenerator {
    scripted: Mutex<VecDeque<Reply>>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub cleared: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn new() -> Arc<Self> {
        Self::scripted(Vec::new(), Duration::ZERO)
    }

    pub fn scripted(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(VecDeque::from(replies)),
            delay,
            calls: AtomicUsize::new(0),
            cleared: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for MockGenerator {
    async fn generate_reply(&self, ctx: &ConversationContext) -> anyhow::Result<Reply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(reply) = self.scripted.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        Ok(match ctx.kind {
            ContextKind::ImageCreate => Reply::images(vec![
                "https://img.example.com/1.png".to_string(),
                "https://img.example.com/2.png".to_string(),
            ]),
            ContextKind::Text => Reply::text(format!("echo: {}", ctx.content)),
        })
    }

    fn clear_session(&self, session_id: &str) {
        self.cleared.lock().unwrap().push(session_id.to_string());
    }
}

#[derive(Debug, Clone)]
pub enum ClassifierStep {
    Answer(&'static str),
    Fail,
    Hang,
}

/// Classifier double: one scripted step per attempt, `Fail` once the
/// script runs out. Records the tokio instant of each call.
pub struct MockClassifier {
    steps: Mutex<VecDeque<ClassifierStep>>,
    pub calls: Mutex<Vec<Instant>>,
}

impl MockClassifier {
    pub fn new(steps: Vec<ClassifierStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::from(steps)),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SafetyClassifier for MockClassifier {
    async fn classify(&self, _prompt: &str, _scope: &ModerationScope) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(Instant::now());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ClassifierStep::Fail);
        match step {
            ClassifierStep::Answer(text) => Ok(text.to_string()),
            ClassifierStep::Fail => Err(anyhow::anyhow!("classifier unavailable")),
            ClassifierStep::Hang => std::future::pending().await,
        }
    }
}

pub fn inbound(id: &str, channel: &str, content: &str) -> InboundMessage {
    InboundMessage {
        id: id.into(),
        channel: channel.into(),
        chat_type: ChatType::Direct,
        sender_id: "alice".into(),
        sender_name: "Alice".into(),
        chat_id: "alice".into(),
        content: content.into(),
        timestamp: chrono::Utc::now(),
        metadata: HashMap::new(),
    }
}

pub struct TestAgent {
    pub agent: Arc<AgentLoop>,
    pub bus: Arc<tokio::sync::Mutex<MessageBus>>,
    pub tasks: Arc<TaskTracker>,
}

pub async fn create_test_agent(
    channel: Arc<MockChannel>,
    generator: Arc<MockGenerator>,
    classifier: Option<Arc<MockClassifier>>,
    moderation: ModerationConfig,
) -> TestAgent {
    let bus = Arc::new(tokio::sync::Mutex::new(MessageBus::new(100, 60.0, 64)));
    let mut channels = ChannelManager::new();
    channels.register(channel);
    let tasks = Arc::new(TaskTracker::new());

    let checker = classifier.map(|c| {
        let classifier: Arc<dyn SafetyClassifier> = c;
        let schedule = RetrySchedule::from_secs(&moderation.retry_offsets_secs).unwrap();
        Arc::new(
            ModerationChecker::new(Some(classifier), schedule)
                .with_attempt_timeout(moderation.attempt_timeout()),
        )
    });

    let agent = AgentLoop::new(AgentLoopConfig {
        bus: bus.clone(),
        generator,
        checker,
        channels,
        tasks: tasks.clone(),
        agent: AgentConfig::default(),
        moderation,
    })
    .await
    .unwrap();

    TestAgent {
        agent: Arc::new(agent),
        bus,
        tasks,
    }
}
