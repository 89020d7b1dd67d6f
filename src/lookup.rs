//! Id and prefix lookup over a conversation file (spec §4.1).
//!
//! Both operations stream the file once and stop at the first match; they
//! never build an index.

use std::path::Path;

use crate::error::Error;
use crate::model::{Conversation, Message};
use crate::provider::{ProviderAdapter, StreamOptions};

/// Full id match, then case-insensitive prefix match of length >= 4. Full
/// matches are checked first across the whole file before falling back to
/// prefix matching, since a short, later full match should not lose to an
/// earlier unrelated prefix hit.
pub fn lookup_conversation(
    adapter: ProviderAdapter,
    path: &Path,
    id: &str,
) -> Result<Option<Conversation>, Error> {
    let mut prefix_candidate: Option<Conversation> = None;
    let prefix_eligible = id.len() >= 4;
    let needle = id.to_lowercase();

    for conversation in adapter.stream(path, StreamOptions::default())? {
        let conversation = conversation?;
        if conversation.id == id {
            return Ok(Some(conversation));
        }
        if prefix_candidate.is_none()
            && prefix_eligible
            && conversation.id.to_lowercase().starts_with(&needle)
        {
            prefix_candidate = Some(conversation);
        }
    }

    Ok(prefix_candidate)
}

/// If `conversation_hint` is given, only that conversation is scanned.
/// Otherwise every conversation is scanned in file order until the message
/// id is found.
pub fn lookup_message(
    adapter: ProviderAdapter,
    path: &Path,
    message_id: &str,
    conversation_hint: Option<&str>,
) -> Result<Option<(Message, Conversation)>, Error> {
    if let Some(hint) = conversation_hint {
        let Some(conversation) = lookup_conversation(adapter, path, hint)? else {
            return Ok(None);
        };
        return Ok(find_message_in(conversation, message_id));
    }

    for conversation in adapter.stream(path, StreamOptions::default())? {
        let conversation = conversation?;
        if let Some(found) = find_message_in(conversation, message_id) {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

fn find_message_in(conversation: Conversation, message_id: &str) -> Option<(Message, Conversation)> {
    let message = conversation
        .messages
        .iter()
        .find(|m| m.id == message_id)
        .cloned()?;
    Some((message, conversation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Provider;
    use std::io::Write;

    fn openai_fixture() -> (tempfile::NamedTempFile, Provider) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id":"conv-aaaa","title":"A","create_time":1000.0,"update_time":null,
                  "mapping":{{"root":{{"message":null,"parent":null,"children":["m1"]}},
                  "m1":{{"message":{{"id":"m1","author":{{"role":"user"}},"create_time":1000.0,"content":{{"parts":["hello"]}}}},"parent":"root","children":[]}}}}}},
                {{"id":"conv-bbbb","title":"B","create_time":2000.0,"update_time":null,
                  "mapping":{{"root":{{"message":null,"parent":null,"children":["m2"]}},
                  "m2":{{"message":{{"id":"m2","author":{{"role":"assistant"}},"create_time":2000.0,"content":{{"parts":["world"]}}}},"parent":"root","children":[]}}}}}}
            ]"#
        )
        .unwrap();
        file.flush().unwrap();
        (file, Provider::OpenAi)
    }

    #[test]
    fn full_id_match_wins() {
        let (file, provider) = openai_fixture();
        let found = lookup_conversation(provider.adapter(), file.path(), "conv-bbbb")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "conv-bbbb");
    }

    #[test]
    fn prefix_match_requires_length_four() {
        let (file, provider) = openai_fixture();
        assert!(lookup_conversation(provider.adapter(), file.path(), "con")
            .unwrap()
            .is_none());
        let found = lookup_conversation(provider.adapter(), file.path(), "conv-a")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "conv-aaaa");
    }

    #[test]
    fn lookup_message_without_hint_scans_all() {
        let (file, provider) = openai_fixture();
        let (message, conversation) =
            lookup_message(provider.adapter(), file.path(), "m2", None)
                .unwrap()
                .unwrap();
        assert_eq!(message.id, "m2");
        assert_eq!(conversation.id, "conv-bbbb");
    }

    #[test]
    fn lookup_message_with_hint_short_circuits() {
        let (file, provider) = openai_fixture();
        let found = lookup_message(provider.adapter(), file.path(), "m2", Some("conv-aaaa")).unwrap();
        assert!(found.is_none());
    }
}
