use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Provider-specific extras, never interpreted by search or export.
pub type Metadata = BTreeMap<String, Value>;

/// Normalized message role. Any provider-specific role that doesn't map
/// cleanly onto one of these is folded into `System` (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Capitalized form used by the Markdown exporter's header line.
    pub fn title_case(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message within a conversation's primary thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Synthesizes the placeholder message spec §3.2/§4.2.3 requires for a
    /// conversation with no source messages.
    pub fn placeholder(timestamp: DateTime<Utc>, content: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("is_placeholder".to_string(), Value::Bool(true));
        Message {
            id: "placeholder".to_string(),
            content: content.to_string(),
            role: Role::User,
            timestamp,
            parent_id: None,
            metadata,
        }
    }
}

/// One chat session: metadata plus its primary-thread message sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Conversation {
    /// Validates the invariants of spec §3.2/§8 and returns the value only
    /// if they hold. This is the single choke point through which every
    /// parser produces a `Conversation` — callers never build one directly.
    pub fn try_new(
        id: String,
        title: String,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        messages: Vec<Message>,
        metadata: Metadata,
    ) -> Result<Self, Error> {
        if id.is_empty() {
            return Err(Error::ValidationError {
                id: "unknown".to_string(),
                reason: "conversation id is empty".to_string(),
            });
        }
        if messages.is_empty() {
            return Err(Error::ValidationError {
                id,
                reason: "conversation has no messages (parser must synthesize a placeholder)"
                    .to_string(),
            });
        }
        if let Some(updated_at) = updated_at {
            if updated_at < created_at {
                return Err(Error::ValidationError {
                    id,
                    reason: format!(
                        "updated_at ({updated_at}) precedes created_at ({created_at})"
                    ),
                });
            }
        }
        let ids: std::collections::HashSet<&str> =
            messages.iter().map(|m| m.id.as_str()).collect();
        for message in &messages {
            if let Some(parent) = message.parent_id.as_deref() {
                if !ids.contains(parent) {
                    return Err(Error::ValidationError {
                        id,
                        reason: format!(
                            "message {} has parent_id {} not present in this conversation",
                            message.id, parent
                        ),
                    });
                }
            }
        }
        Ok(Conversation {
            id,
            title: Self::normalize_title(title),
            created_at,
            updated_at,
            messages,
            metadata,
        })
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// `updated_at` if set, else `created_at`. Never null.
    pub fn updated_at_or_created(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    pub fn is_placeholder(&self) -> bool {
        self.messages.len() == 1
            && self.messages[0]
                .metadata
                .get("is_placeholder")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    }

    /// Normalizes an empty title per spec §3.2.
    pub fn normalize_title(title: String) -> String {
        if title.trim().is_empty() {
            "(No title)".to_string()
        } else {
            title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn msg(id: &str, parent: Option<&str>) -> Message {
        Message {
            id: id.to_string(),
            content: "hi".to_string(),
            role: Role::User,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            parent_id: parent.map(str::to_string),
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn empty_title_normalizes() {
        assert_eq!(Conversation::normalize_title("".to_string()), "(No title)");
        assert_eq!(Conversation::normalize_title("   ".to_string()), "(No title)");
        assert_eq!(Conversation::normalize_title("hi".to_string()), "hi");
    }

    #[test]
    fn rejects_empty_message_list() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = Conversation::try_new(
            "c1".to_string(),
            "t".to_string(),
            created,
            None,
            Vec::new(),
            Metadata::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));
    }

    #[test]
    fn rejects_updated_before_created() {
        let created = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let updated = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = Conversation::try_new(
            "c1".to_string(),
            "t".to_string(),
            created,
            Some(updated),
            vec![msg("m1", None)],
            Metadata::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));
    }

    #[test]
    fn rejects_dangling_parent_id() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = Conversation::try_new(
            "c1".to_string(),
            "t".to_string(),
            created,
            None,
            vec![msg("m1", Some("ghost"))],
            Metadata::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ValidationError { .. }));
    }

    #[test]
    fn updated_at_or_created_falls_back() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let conv = Conversation::try_new(
            "c1".to_string(),
            "t".to_string(),
            created,
            None,
            vec![msg("m1", None)],
            Metadata::new(),
        )
        .unwrap();
        assert_eq!(conv.updated_at_or_created(), created);
        assert_eq!(conv.message_count(), 1);
    }
}
