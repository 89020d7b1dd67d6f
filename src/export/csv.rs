//! RFC 4180 CSV rendering (spec §4.4.2), via the `csv` crate so quoting,
//! embedded newlines, and embedded quotes are handled per spec without any
//! hand-rolled escaping.

use std::io::Write;

use crate::error::Error;
use crate::model::Conversation;
use crate::search::SearchResult;

fn to_csv_err(err: csv::Error) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
}

fn timestamp(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Conversation-level schema: `conversation_id,title,created_at,updated_at,message_count`.
pub fn write_conversations<W: Write>(
    writer: W,
    conversations: &[Conversation],
) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["conversation_id", "title", "created_at", "updated_at", "message_count"])
        .map_err(to_csv_err)?;
    for conv in conversations {
        let updated = conv.updated_at.map(timestamp).unwrap_or_default();
        wtr.write_record([
            conv.id.as_str(),
            conv.title.as_str(),
            &timestamp(conv.created_at),
            &updated,
            &conv.message_count().to_string(),
        ])
        .map_err(to_csv_err)?;
    }
    wtr.flush().map_err(Error::Io)
}

/// Conversation-level schema with the `score` column appended, for search
/// result export.
pub fn write_search_results<W: Write>(writer: W, results: &[SearchResult]) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "conversation_id",
        "title",
        "created_at",
        "updated_at",
        "message_count",
        "score",
    ])
    .map_err(to_csv_err)?;
    for result in results {
        let conv = &result.conversation;
        let updated = conv.updated_at.map(timestamp).unwrap_or_default();
        wtr.write_record([
            conv.id.as_str(),
            conv.title.as_str(),
            &timestamp(conv.created_at),
            &updated,
            &conv.message_count().to_string(),
            &format!("{:.6}", result.score),
        ])
        .map_err(to_csv_err)?;
    }
    wtr.flush().map_err(Error::Io)
}

/// Message-level schema: `conversation_id,message_id,role,timestamp,content`.
/// Emits one row per message, across every conversation given, in the order
/// given.
pub fn write_messages<W: Write>(writer: W, conversations: &[Conversation]) -> Result<(), Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["conversation_id", "message_id", "role", "timestamp", "content"])
        .map_err(to_csv_err)?;
    for conv in conversations {
        for message in &conv.messages {
            wtr.write_record([
                conv.id.as_str(),
                message.id.as_str(),
                message.role.as_str(),
                &timestamp(message.timestamp),
                message.content.as_str(),
            ])
            .map_err(to_csv_err)?;
        }
    }
    wtr.flush().map_err(Error::Io)
}
