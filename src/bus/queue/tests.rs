use super::*;
use crate::bus::ChatType;
use chrono::Utc;
use std::collections::HashMap;

fn make_inbound(channel: &str, sender_id: &str) -> InboundMessage {
    InboundMessage {
        id: uuid::Uuid::new_v4().to_string(),
        channel: channel.to_string(),
        chat_type: ChatType::Direct,
        sender_id: sender_id.to_string(),
        sender_name: sender_id.to_string(),
        chat_id: sender_id.to_string(),
        content: "hello".to_string(),
        timestamp: Utc::now(),
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn test_publish_inbound_succeeds() {
    let mut bus = MessageBus::default();
    let mut rx = bus.take_inbound_rx().unwrap();

    bus.publish_inbound(make_inbound("feishu", "user1"))
        .await
        .unwrap();

    let received = rx.try_recv().unwrap();
    assert_eq!(received.channel, "feishu");
    assert_eq!(received.sender_id, "user1");
}

#[tokio::test]
async fn test_inbound_rate_limit_enforced() {
    let mut bus = MessageBus::new(2, 60.0, 100);
    let _rx = bus.take_inbound_rx().unwrap();

    bus.publish_inbound(make_inbound("ch", "sender1"))
        .await
        .unwrap();
    bus.publish_inbound(make_inbound("ch", "sender1"))
        .await
        .unwrap();

    let result = bus.publish_inbound(make_inbound("ch", "sender1")).await;
    assert!(result.unwrap_err().to_string().contains("Rate limit"));

    // other senders are unaffected
    bus.publish_inbound(make_inbound("ch", "sender2"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_take_inbound_rx_only_once() {
    let mut bus = MessageBus::default();
    assert!(bus.take_inbound_rx().is_some());
    assert!(bus.take_inbound_rx().is_none());
}

#[tokio::test]
async fn test_publish_fails_when_receiver_dropped() {
    let mut bus = MessageBus::default();
    drop(bus.take_inbound_rx());
    assert!(
        bus.publish_inbound(make_inbound("ch", "sender1"))
            .await
            .is_err()
    );
}
