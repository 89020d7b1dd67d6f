//! Claude export schema mapping (spec §4.2.3).
//!
//! `chat_messages` is a flat, chronologically-ordered array: the implicit
//! parent of message `i` is message `i-1`, so no DAG reconstruction is
//! needed (unlike OpenAI's `mapping`).

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::model::{Conversation, Message, Metadata, Role};

const SUPPORTED_SCHEMA_MAJOR: u32 = 1;

#[derive(Debug, Deserialize)]
struct RawConversation {
    uuid: Option<String>,
    #[serde(default)]
    name: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    chat_messages: Vec<RawMessage>,
    #[serde(flatten)]
    extra: Metadata,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    uuid: Option<String>,
    sender: Option<String>,
    text: Option<String>,
    created_at: Option<String>,
    #[serde(default)]
    content: Option<Vec<RawContentBlock>>,
    #[serde(flatten)]
    extra: Metadata,
}

#[derive(Debug, Deserialize)]
struct RawContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
    text: Option<String>,
}

pub fn parse_conversation(bytes: &[u8]) -> Result<Conversation, Error> {
    let raw: RawConversation = serde_json::from_slice(bytes).map_err(|e| Error::ValidationError {
        id: "unknown".to_string(),
        reason: format!("malformed Claude conversation object: {e}"),
    })?;

    let id = raw.uuid.clone().unwrap_or_default();
    let fail = |reason: String| Error::ValidationError {
        id: id.clone(),
        reason,
    };
    if id.is_empty() {
        return Err(fail("missing conversation uuid".to_string()));
    }

    super::check_schema_version(raw.extra.get("schema_version"), SUPPORTED_SCHEMA_MAJOR)?;

    let created_at = raw
        .created_at
        .as_deref()
        .and_then(parse_iso8601)
        .ok_or_else(|| fail("missing or invalid created_at".to_string()))?;
    let updated_at = match raw.updated_at.as_deref() {
        None => None,
        Some(s) => Some(parse_iso8601(s).ok_or_else(|| fail("invalid updated_at".to_string()))?),
    };

    let mut messages = Vec::new();
    let mut previous_id: Option<String> = None;
    for (index, raw_message) in raw.chat_messages.iter().enumerate() {
        let Some(role) = normalize_sender(raw_message.sender.as_deref()) else {
            tracing::warn!(
                conversation_id = %id,
                sender = ?raw_message.sender,
                "skipping Claude message with unrecognized sender"
            );
            continue;
        };
        let msg_id = raw_message
            .uuid
            .clone()
            .unwrap_or_else(|| format!("msg-{id}-{:03}", index + 1));
        let timestamp = raw_message
            .created_at
            .as_deref()
            .and_then(parse_iso8601)
            .unwrap_or(created_at);

        let (content, is_placeholder) = extract_message_content(raw_message);

        let mut metadata = Metadata::new();
        for (key, value) in &raw_message.extra {
            metadata.insert(format!("claude_{key}"), value.clone());
        }
        if is_placeholder {
            metadata.insert("is_placeholder".to_string(), Value::Bool(true));
        }

        messages.push(Message {
            id: msg_id.clone(),
            content,
            role,
            timestamp,
            parent_id: previous_id.clone(),
            metadata,
        });
        previous_id = Some(msg_id);
    }

    messages.sort_by_key(|m: &Message| m.timestamp);

    if messages.is_empty() {
        messages.push(Message::placeholder(created_at, "(Empty conversation)"));
    }

    let mut metadata = Metadata::new();
    for (key, value) in raw.extra {
        metadata.insert(format!("claude_{key}"), value);
    }

    Conversation::try_new(
        id,
        raw.name.unwrap_or_default(),
        created_at,
        updated_at,
        messages,
        metadata,
    )
}

fn normalize_sender(sender: Option<&str>) -> Option<Role> {
    match sender {
        Some("human") => Some(Role::User),
        Some("assistant") => Some(Role::Assistant),
        _ => None,
    }
}

/// Returns the extracted content and whether it had to be synthesized.
fn extract_message_content(raw: &RawMessage) -> (String, bool) {
    if let Some(blocks) = raw.content.as_ref() {
        let joined = blocks
            .iter()
            .filter(|b| b.block_type.as_deref() == Some("text"))
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if !joined.is_empty() {
            return (joined, false);
        }
    }
    if let Some(text) = raw.text.as_deref() {
        if !text.is_empty() {
            return (text.to_string(), false);
        }
    }
    ("(Empty message)".to_string(), true)
}

fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_chain_builds_linear_parent_ids() {
        let json = r#"{
            "uuid": "conv-1",
            "name": "Chat",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:05:00Z",
            "chat_messages": [
                {"uuid": "m1", "sender": "human", "text": "hello", "created_at": "2024-01-01T00:00:00Z"},
                {"uuid": "m2", "sender": "assistant", "content": [{"type":"text","text":"hi"}], "created_at": "2024-01-01T00:01:00Z"}
            ]
        }"#;
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].parent_id, None);
        assert_eq!(conv.messages[1].parent_id.as_deref(), Some("m1"));
        assert_eq!(conv.messages[1].content, "hi");
    }

    #[test]
    fn empty_chat_messages_synthesizes_placeholder() {
        let json = r#"{
            "uuid": "conv-1",
            "name": "",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": null,
            "chat_messages": []
        }"#;
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.is_placeholder());
        assert_eq!(conv.messages[0].content, "(Empty conversation)");
        assert_eq!(conv.title, "(No title)");
    }

    #[test]
    fn tool_blocks_are_skipped_falls_back_to_top_level_text() {
        let json = r#"{
            "uuid": "conv-1",
            "name": "Chat",
            "created_at": "2024-01-01T00:00:00Z",
            "chat_messages": [
                {"uuid": "m1", "sender": "assistant", "text": "fallback text", "content": [{"type":"tool_use","text":null}]}
            ]
        }"#;
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages[0].content, "fallback text");
    }

    #[test]
    fn fully_empty_message_synthesizes_placeholder_text() {
        let json = r#"{
            "uuid": "conv-1",
            "name": "Chat",
            "created_at": "2024-01-01T00:00:00Z",
            "chat_messages": [
                {"uuid": "m1", "sender": "human", "content": [{"type":"tool_result","text":null}]}
            ]
        }"#;
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages[0].content, "(Empty message)");
        assert_eq!(
            conv.messages[0].metadata.get("is_placeholder"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn unrecognized_sender_is_skipped() {
        let json = r#"{
            "uuid": "conv-1",
            "name": "Chat",
            "created_at": "2024-01-01T00:00:00Z",
            "chat_messages": [
                {"uuid": "m1", "sender": "system-internal", "text": "noise"},
                {"uuid": "m2", "sender": "human", "text": "real message"}
            ]
        }"#;
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].content, "real message");
        assert_eq!(conv.messages[0].parent_id, None);
    }

    #[test]
    fn naive_timestamp_is_rejected() {
        let json = r#"{
            "uuid": "conv-1",
            "name": "Chat",
            "created_at": "2024-01-01T00:00:00",
            "chat_messages": []
        }"#;
        let err = parse_conversation(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));
    }
}
