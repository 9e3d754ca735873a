//! Helpers shared by channel implementations.

use crate::agent::context::{ConversationContext, Reply, ReplyContent, ReplyKind};
use crate::channels::base::BaseChannel;
use crate::config::AgentConfig;
use crate::utils::regex::RegexPatterns;
use serde_json::Value;

/// Keys a bridge or platform response may carry the sent message id under,
/// in lookup order.
const MESSAGE_ID_KEYS: &[&str] = &["MsgID", "MsgId", "msg_id", "msgId", "SvrMsgId", "NewMsgId"];

/// Strip markdown bold markers, keeping the inner text.
pub fn remove_markdown_symbol(text: &str) -> String {
    RegexPatterns::markdown_bold()
        .replace_all(text, "$1")
        .into_owned()
}

/// Pull the sent message id out of a send response. Numeric ids are
/// rendered as strings; empty values are skipped.
pub fn extract_message_id(response: &Value) -> Option<String> {
    let obj = response.as_object()?;
    MESSAGE_ID_KEYS.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_i64() != Some(0) => Some(n.to_string()),
        _ => None,
    })
}

/// Apply platform-independent formatting before a reply is sent.
///
/// Kinds the channel cannot deliver become an error reply. Text replies get
/// the group mention and configured prefix/suffix; error and info replies
/// get a bracketed tag.
pub fn decorate_reply(
    reply: Reply,
    ctx: &ConversationContext,
    channel: &dyn BaseChannel,
    config: &AgentConfig,
) -> Reply {
    let reply = if channel.supports(reply.kind) {
        reply
    } else {
        tracing::warn!(
            "{} channel cannot send {} replies, replacing with error",
            channel.name(),
            reply.kind
        );
        Reply::error(format!("不支持发送的消息类型: {}", reply.kind))
    };

    let Reply { kind, content } = reply;
    let ReplyContent::Text(text) = content else {
        return Reply { kind, content };
    };

    let decorated = match kind {
        ReplyKind::Text if ctx.is_group => {
            let mention = if ctx.sender_name.is_empty() {
                String::new()
            } else {
                format!("@{}\n", ctx.sender_name)
            };
            format!(
                "{}{}{}{}",
                mention,
                config.group_chat_reply_prefix,
                text.trim(),
                config.group_chat_reply_suffix
            )
        }
        ReplyKind::Text => format!(
            "{}{}{}",
            config.single_chat_reply_prefix, text, config.single_chat_reply_suffix
        ),
        ReplyKind::Error => format!("[ERROR]\n{}", text),
        ReplyKind::Info => format!("[INFO]\n{}", text),
        _ => text,
    };
    Reply {
        kind,
        content: ReplyContent::Text(decorated),
    }
}
