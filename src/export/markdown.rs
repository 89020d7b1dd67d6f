//! Canonical Markdown rendering (spec §4.4.1). Output must be
//! byte-identical across independent runs given the same inputs, so neither
//! `generated_at` nor `exported_by` is read from the clock or environment
//! here — callers supply both explicitly.

use std::io::{self, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::model::Conversation;

/// Controls the optional frontmatter block. Frontmatter is on by default,
/// per spec.
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    pub frontmatter: bool,
    pub generated_at: DateTime<Utc>,
    pub exported_by: String,
}

impl MarkdownOptions {
    pub fn new(generated_at: DateTime<Utc>, exported_by: impl Into<String>) -> Self {
        MarkdownOptions {
            frontmatter: true,
            generated_at,
            exported_by: exported_by.into(),
        }
    }
}

#[derive(Serialize)]
struct Frontmatter {
    id: String,
    title: String,
    created_at: String,
    updated_at: String,
    message_count: usize,
    export_date: String,
    exported_by: String,
}

/// Renders `conversation` as canonical Markdown into `writer`.
pub fn write_conversation<W: Write>(
    writer: &mut W,
    conversation: &Conversation,
    opts: &MarkdownOptions,
) -> io::Result<()> {
    if opts.frontmatter {
        let fm = Frontmatter {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            created_at: to_z(conversation.created_at),
            updated_at: to_z(conversation.updated_at_or_created()),
            message_count: conversation.message_count(),
            export_date: to_z(opts.generated_at),
            exported_by: opts.exported_by.clone(),
        };
        let yaml = serde_yaml::to_string(&fm)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        writeln!(writer, "---")?;
        write!(writer, "{yaml}")?;
        writeln!(writer, "---")?;
        writeln!(writer)?;
    }

    writeln!(writer, "# {}", conversation.title)?;
    writeln!(writer)?;

    for (index, message) in conversation.messages.iter().enumerate() {
        let id = if message.id.is_empty() {
            format!("msg-{}-{:03}", conversation.id, index + 1)
        } else {
            message.id.clone()
        };
        writeln!(
            writer,
            "## {} (`{}`) - {} UTC",
            message.role.title_case(),
            id,
            message.timestamp.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(writer)?;
        writeln!(writer, "{}", message.content)?;
        writeln!(writer, "---")?;
        writeln!(writer)?;
    }

    Ok(())
}

/// Renders `conversation` as canonical Markdown, returned as a `String`.
pub fn render(conversation: &Conversation, opts: &MarkdownOptions) -> String {
    let mut buf = Vec::new();
    write_conversation(&mut buf, conversation, opts).expect("writing to Vec<u8> cannot fail");
    String::from_utf8(buf).expect("Markdown output is always valid UTF-8")
}

fn to_z(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, Metadata, Role};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn sample_conversation() -> Conversation {
        let created = ts(1_700_000_000);
        Conversation::try_new(
            "conv-1".to_string(),
            "Simple Text".to_string(),
            created,
            None,
            vec![
                Message {
                    id: "m1".to_string(),
                    content: "Hello there".to_string(),
                    role: Role::User,
                    timestamp: created,
                    parent_id: None,
                    metadata: Metadata::new(),
                },
                Message {
                    id: "m2".to_string(),
                    content: "General Kenobi".to_string(),
                    role: Role::Assistant,
                    timestamp: ts(1_700_000_010),
                    parent_id: Some("m1".to_string()),
                    metadata: Metadata::new(),
                },
            ],
            Metadata::new(),
        )
        .unwrap()
    }

    #[test]
    fn body_contains_title_and_message_headers() {
        let conv = sample_conversation();
        let opts = MarkdownOptions::new(ts(1_700_000_100), "chatvault");
        let out = render(&conv, &opts);
        assert!(out.contains("# Simple Text"));
        assert!(out.contains("## User (`m1`)"));
        assert!(out.contains("## Assistant (`m2`)"));
        assert!(out.contains("Hello there"));
        assert!(out.contains("General Kenobi"));
        assert!(out.trim_end().ends_with("---"));
    }

    #[test]
    fn frontmatter_is_wrapped_in_opening_and_closing_delimiters() {
        let conv = sample_conversation();
        let opts = MarkdownOptions::new(ts(1_700_000_100), "chatvault");
        let out = render(&conv, &opts);
        assert!(out.starts_with("---\n"));
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("---"));
        let closing_index = out
            .lines()
            .position(|l| l == "---")
            .expect("opening delimiter");
        let second_delimiter = out
            .lines()
            .skip(closing_index + 1)
            .position(|l| l == "---")
            .expect("closing delimiter must follow the YAML body");
        assert!(second_delimiter > 0, "YAML body must sit between the two delimiters");
    }

    #[test]
    fn frontmatter_can_be_disabled() {
        let conv = sample_conversation();
        let mut opts = MarkdownOptions::new(ts(1_700_000_100), "chatvault");
        opts.frontmatter = false;
        let out = render(&conv, &opts);
        assert!(!out.starts_with("---"));
        assert!(out.starts_with("# Simple Text"));
    }

    #[test]
    fn rendering_is_deterministic_across_runs() {
        let conv = sample_conversation();
        let opts = MarkdownOptions::new(ts(1_700_000_100), "chatvault");
        assert_eq!(render(&conv, &opts), render(&conv, &opts));
    }

    #[test]
    fn updated_at_falls_back_to_created_at_in_frontmatter() {
        let conv = sample_conversation();
        let opts = MarkdownOptions::new(ts(1_700_000_100), "chatvault");
        let out = render(&conv, &opts);
        let created_line = format!("created_at: {}", to_z(conv.created_at));
        let updated_line = format!("updated_at: {}", to_z(conv.updated_at_or_created()));
        assert!(out.contains(&created_line));
        assert!(out.contains(&updated_line));
    }
}
