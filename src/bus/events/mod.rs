use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

/// A message received from a channel, already deduplicated by that channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message id.
    pub id: String,
    pub channel: String,
    pub chat_type: ChatType,
    pub sender_id: String,
    /// Display name used for @mentions in group replies.
    pub sender_name: String,
    /// Where the reply goes: the sender for direct chats, the group otherwise.
    pub chat_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundMessage {
    pub fn is_group(&self) -> bool {
        self.chat_type == ChatType::Group
    }

    /// Conversation history key: one per sender in direct chats, one per
    /// sender and group in group chats.
    pub fn session_key(&self) -> String {
        match self.chat_type {
            ChatType::Direct => self.sender_id.clone(),
            ChatType::Group => format!("group:{}:{}", self.chat_id, self.sender_id),
        }
    }
}
