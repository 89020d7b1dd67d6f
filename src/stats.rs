//! Streaming and per-conversation statistics (spec §4.5).

use std::collections::HashMap;
use std::path::Path;

use chrono::DateTime;
use chrono::Utc;

use crate::error::Error;
use crate::model::{Conversation, Role};
use crate::provider::{ProviderAdapter, StreamOptions};

/// Identifies a conversation without retaining its messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
}

/// Totals produced by a single streaming fold over a file.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub conversation_count: u64,
    pub message_count: u64,
    pub earliest_created_at: Option<DateTime<Utc>>,
    pub latest_created_at: Option<DateTime<Utc>>,
    pub average_messages_per_conversation: f64,
    pub largest: Option<ConversationSummary>,
    pub smallest: Option<ConversationSummary>,
    pub skipped_count: u64,
}

/// Streams `path` once and folds every yielded conversation into
/// aggregate [`Statistics`]. An empty file yields all-zero totals and no
/// summaries.
pub fn calculate_statistics(adapter: ProviderAdapter, path: &Path) -> Result<Statistics, Error> {
    let mut conversation_count = 0u64;
    let mut message_count = 0u64;
    let mut earliest_created_at: Option<DateTime<Utc>> = None;
    let mut latest_created_at: Option<DateTime<Utc>> = None;
    let mut largest: Option<ConversationSummary> = None;
    let mut smallest: Option<ConversationSummary> = None;

    let skipped = std::cell::Cell::new(0u64);
    let on_skip = |_id: &str, _reason: &str| skipped.set(skipped.get() + 1);
    let opts = StreamOptions {
        on_skip: Some(Box::new(on_skip)),
        ..Default::default()
    };

    for conversation in adapter.stream(path, opts)? {
        let conversation = conversation?;
        conversation_count += 1;
        let count = conversation.message_count();
        message_count += count as u64;

        earliest_created_at = Some(match earliest_created_at {
            Some(current) if current <= conversation.created_at => current,
            _ => conversation.created_at,
        });
        latest_created_at = Some(match latest_created_at {
            Some(current) if current >= conversation.created_at => current,
            _ => conversation.created_at,
        });

        let summary = ConversationSummary {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            message_count: count,
        };
        if largest.as_ref().map(|s| count > s.message_count).unwrap_or(true) {
            largest = Some(summary.clone());
        }
        if smallest.as_ref().map(|s| count < s.message_count).unwrap_or(true) {
            smallest = Some(summary);
        }
    }
    let skipped_count = skipped.get();

    let average_messages_per_conversation = if conversation_count > 0 {
        message_count as f64 / conversation_count as f64
    } else {
        0.0
    };

    Ok(Statistics {
        conversation_count,
        message_count,
        earliest_created_at,
        latest_created_at,
        average_messages_per_conversation,
        largest,
        smallest,
        skipped_count,
    })
}

/// Per-conversation statistics (spec §4.5), computed purely from an
/// already-parsed `Conversation` — no I/O.
#[derive(Debug, Clone)]
pub struct ConversationStatistics {
    pub role_counts: HashMap<Role, usize>,
    pub total_messages: usize,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    pub duration_seconds: i64,
    pub average_gap_seconds: Option<f64>,
}

pub fn calculate_conversation_statistics(conversation: &Conversation) -> ConversationStatistics {
    let mut role_counts: HashMap<Role, usize> = HashMap::new();
    for message in &conversation.messages {
        *role_counts.entry(message.role).or_insert(0) += 1;
    }

    let first_timestamp = conversation
        .messages
        .first()
        .map(|m| m.timestamp)
        .unwrap_or(conversation.created_at);
    let last_timestamp = conversation
        .messages
        .last()
        .map(|m| m.timestamp)
        .unwrap_or(conversation.created_at);
    let duration_seconds = (last_timestamp - first_timestamp).num_seconds();

    let average_gap_seconds = if conversation.messages.len() >= 2 {
        let gaps: Vec<f64> = conversation
            .messages
            .windows(2)
            .map(|w| (w[1].timestamp - w[0].timestamp).num_seconds() as f64)
            .collect();
        Some(gaps.iter().sum::<f64>() / gaps.len() as f64)
    } else {
        None
    };

    ConversationStatistics {
        role_counts,
        total_messages: conversation.messages.len(),
        first_timestamp,
        last_timestamp,
        duration_seconds,
        average_gap_seconds,
    }
}
