//! OpenAI ("ChatGPT") export schema mapping (spec §4.2.2).
//!
//! Each top-level array element is a single conversation: a flat `mapping`
//! from node id to `{ message, parent, children }`. The primary thread is
//! the root-to-leaf path obtained by always descending via `children[0]`;
//! see [`select_primary_root`] for the tie-break rule when more than one
//! root exists.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::model::{Conversation, Message, Metadata, Role};

const SUPPORTED_SCHEMA_MAJOR: u32 = 1;

#[derive(Debug, Deserialize)]
struct RawConversation {
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    create_time: Option<Value>,
    update_time: Option<Value>,
    #[serde(default)]
    mapping: BTreeMap<String, RawNode>,
    #[serde(flatten)]
    extra: Metadata,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    message: Option<RawMessage>,
    parent: Option<String>,
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: Option<String>,
    author: Option<RawAuthor>,
    create_time: Option<Value>,
    content: Option<RawContent>,
    #[serde(flatten)]
    extra: Metadata,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    parts: Vec<Value>,
}

pub fn parse_conversation(bytes: &[u8]) -> Result<Conversation, Error> {
    let raw: RawConversation = serde_json::from_slice(bytes).map_err(|e| Error::ValidationError {
        id: "unknown".to_string(),
        reason: format!("malformed OpenAI conversation object: {e}"),
    })?;

    let id = raw.id.clone().unwrap_or_default();
    let fail = |reason: String| Error::ValidationError {
        id: id.clone(),
        reason,
    };

    if id.is_empty() {
        return Err(fail("missing conversation id".to_string()));
    }

    super::check_schema_version(raw.extra.get("schema_version"), SUPPORTED_SCHEMA_MAJOR)?;

    let created_at = parse_posix_time(raw.create_time.as_ref())
        .ok_or_else(|| fail("missing or invalid create_time".to_string()))?;
    let updated_at = match raw.update_time.as_ref() {
        None | Some(Value::Null) => None,
        Some(v) => Some(
            parse_posix_time(Some(v)).ok_or_else(|| fail("invalid update_time".to_string()))?,
        ),
    };

    let path = primary_thread_path(&raw.mapping);

    let mut messages = Vec::new();
    let mut previous_id: Option<String> = None;
    let mut index = 0usize;
    for node_id in &path {
        let Some(node) = raw.mapping.get(node_id) else {
            continue;
        };
        let Some(raw_message) = node.message.as_ref() else {
            continue;
        };
        index += 1;
        let mut message = build_message(raw_message, created_at, &id, index);
        message.parent_id = previous_id.clone();
        previous_id = Some(message.id.clone());
        messages.push(message);
    }
    messages.sort_by_key(|m: &Message| m.timestamp);

    let mut metadata = Metadata::new();
    for (key, value) in raw.extra {
        metadata.insert(format!("openai_{key}"), value);
    }

    Conversation::try_new(
        id,
        raw.title.unwrap_or_default(),
        created_at,
        updated_at,
        messages,
        metadata,
    )
}

fn build_message(
    raw: &RawMessage,
    conversation_created_at: DateTime<Utc>,
    conversation_id: &str,
    index: usize,
) -> Message {
    let id = raw
        .id
        .clone()
        .unwrap_or_else(|| format!("msg-{conversation_id}-{index:03}"));
    let role_str = raw.author.as_ref().and_then(|a| a.role.as_deref());
    let (role, original_role) = normalize_role(role_str);
    let timestamp = parse_posix_time(raw.create_time.as_ref()).unwrap_or(conversation_created_at);

    let mut text_parts = Vec::new();
    let mut non_text_parts = Vec::new();
    if let Some(content) = raw.content.as_ref() {
        for part in &content.parts {
            match part {
                Value::String(s) => text_parts.push(s.clone()),
                other => non_text_parts.push(other.clone()),
            }
        }
    }
    let content = text_parts.join("\n");

    let mut metadata = Metadata::new();
    for (key, value) in &raw.extra {
        metadata.insert(format!("openai_{key}"), value.clone());
    }
    if let Some(original_role) = original_role {
        metadata.insert(
            "openai_original_role".to_string(),
            Value::String(original_role),
        );
    }
    if !non_text_parts.is_empty() {
        metadata.insert(
            "openai_non_text_parts".to_string(),
            Value::Array(non_text_parts),
        );
    }

    Message {
        id,
        content,
        role,
        timestamp,
        // parent_id is set by the caller to the previous message in
        // primary-thread order, not the raw DAG parent (which may point at
        // a node dropped from the path, e.g. the rootless stub node).
        parent_id: None,
        metadata,
    }
}

/// Unknown roles (e.g. `"tool"`) fold into `System`, with the source string
/// preserved so callers can still recover it from metadata.
fn normalize_role(role: Option<&str>) -> (Role, Option<String>) {
    match role {
        Some("user") => (Role::User, None),
        Some("assistant") => (Role::Assistant, None),
        Some("system") => (Role::System, None),
        Some(other) => (Role::System, Some(other.to_string())),
        None => (Role::System, None),
    }
}

/// Walks from each root along `children[0]` to a leaf, then picks the root
/// whose path ends at the latest-timestamped leaf (ties broken by the
/// smallest root id, which `BTreeMap` iteration guarantees deterministically).
fn primary_thread_path(mapping: &BTreeMap<String, RawNode>) -> Vec<String> {
    let roots: Vec<&String> = mapping
        .keys()
        .filter(|id| {
            mapping[*id]
                .parent
                .as_ref()
                .map(|p| !mapping.contains_key(p))
                .unwrap_or(true)
        })
        .collect();

    let mut best_path: Vec<String> = Vec::new();
    let mut best_leaf_time: Option<Value> = None;

    for root in roots {
        let path = walk_first_child_path(mapping, root);
        let leaf_time = path
            .last()
            .and_then(|leaf_id| mapping.get(leaf_id))
            .and_then(|node| node.message.as_ref())
            .and_then(|m| m.create_time.clone());

        let is_better = match (&leaf_time, &best_leaf_time) {
            (Some(a), Some(b)) => posix_value(a) > posix_value(b),
            (Some(_), None) => true,
            _ => best_path.is_empty(),
        };
        if is_better {
            best_leaf_time = leaf_time;
            best_path = path;
        }
    }
    best_path
}

fn walk_first_child_path(mapping: &BTreeMap<String, RawNode>, root: &str) -> Vec<String> {
    let mut path = vec![root.to_string()];
    let mut current = root;
    loop {
        let Some(node) = mapping.get(current) else {
            break;
        };
        match node.children.first() {
            Some(next) if mapping.contains_key(next) => {
                path.push(next.clone());
                current = next;
            }
            _ => break,
        }
    }
    path
}

fn posix_value(v: &Value) -> f64 {
    v.as_f64().unwrap_or(f64::MIN)
}

fn parse_posix_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let seconds = value?.as_f64()?;
    let secs = seconds.floor() as i64;
    let nanos = ((seconds - seconds.floor()) * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(mapping_json: &str, create_time: &str, update_time: &str) -> String {
        format!(
            r#"{{"id":"conv-1","title":"Hi","create_time":{create_time},"update_time":{update_time},"mapping":{mapping_json}}}"#
        )
    }

    #[test]
    fn linear_chain_round_trips() {
        let mapping = r#"{
            "root": {"message": null, "parent": null, "children": ["m1"]},
            "m1": {"message": {"id":"m1","author":{"role":"user"},"create_time":1000.0,"content":{"parts":["hello"]}}, "parent": "root", "children": ["m2"]},
            "m2": {"message": {"id":"m2","author":{"role":"assistant"},"create_time":1001.5,"content":{"parts":["hi there"]}}, "parent": "m1", "children": []}
        }"#;
        let json = sample(mapping, "1000.0", "1001.5");
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.id, "conv-1");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].content, "hello");
        assert_eq!(conv.messages[1].content, "hi there");
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert!(conv.updated_at.is_some());
    }

    #[test]
    fn missing_create_time_is_validation_error() {
        let mapping = r#"{"root": {"message": null, "parent": null, "children": []}}"#;
        let json = sample(mapping, "null", "null");
        let err = parse_conversation(json.as_bytes()).unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));
    }

    #[test]
    fn null_update_time_stays_none() {
        let mapping = r#"{
            "root": {"message": null, "parent": null, "children": ["m1"]},
            "m1": {"message": {"id":"m1","author":{"role":"user"},"create_time":1000.0,"content":{"parts":["hi"]}}, "parent": "root", "children": []}
        }"#;
        let json = sample(mapping, "1000.0", "null");
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.updated_at, None);
        assert_eq!(conv.updated_at_or_created(), conv.created_at);
    }

    #[test]
    fn non_text_parts_recorded_but_empty_in_content() {
        let mapping = r#"{
            "root": {"message": null, "parent": null, "children": ["m1"]},
            "m1": {"message": {"id":"m1","author":{"role":"user"},"create_time":1000.0,"content":{"parts":[{"content_type":"image_asset_pointer"}]}}, "parent": "root", "children": []}
        }"#;
        let json = sample(mapping, "1000.0", "null");
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages[0].content, "");
        assert!(conv.messages[0].metadata.contains_key("openai_non_text_parts"));
    }

    #[test]
    fn unknown_role_folds_into_system_with_original_preserved() {
        let mapping = r#"{
            "root": {"message": null, "parent": null, "children": ["m1"]},
            "m1": {"message": {"id":"m1","author":{"role":"tool"},"create_time":1000.0,"content":{"parts":["result"]}}, "parent": "root", "children": []}
        }"#;
        let json = sample(mapping, "1000.0", "null");
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages[0].role, Role::System);
        assert_eq!(
            conv.messages[0].metadata.get("openai_original_role"),
            Some(&Value::String("tool".to_string()))
        );
    }

    #[test]
    fn multiple_roots_pick_latest_leaf() {
        let mapping = r#"{
            "rootA": {"message": null, "parent": null, "children": ["a1"]},
            "a1": {"message": {"id":"a1","author":{"role":"user"},"create_time":1000.0,"content":{"parts":["early"]}}, "parent": "rootA", "children": []},
            "rootB": {"message": null, "parent": null, "children": ["b1"]},
            "b1": {"message": {"id":"b1","author":{"role":"user"},"create_time":2000.0,"content":{"parts":["late"]}}, "parent": "rootB", "children": []}
        }"#;
        let json = sample(mapping, "1000.0", "null");
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages.len(), 1);
        assert_eq!(conv.messages[0].content, "late");
    }

    #[test]
    fn missing_message_ids_get_unique_synthesized_ids() {
        let mapping = r#"{
            "root": {"message": null, "parent": null, "children": ["m1"]},
            "m1": {"message": {"author":{"role":"user"},"create_time":1000.0,"content":{"parts":["first"]}}, "parent": "root", "children": ["m2"]},
            "m2": {"message": {"author":{"role":"assistant"},"create_time":1001.0,"content":{"parts":["second"]}}, "parent": "m1", "children": []}
        }"#;
        let json = sample(mapping, "1000.0", "null");
        let conv = parse_conversation(json.as_bytes()).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].id, "msg-conv-1-001");
        assert_eq!(conv.messages[1].id, "msg-conv-1-002");
        assert_ne!(conv.messages[0].id, conv.messages[1].id);
    }
}
