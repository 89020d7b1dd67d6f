//! The provider adapter contract (spec §4.1): a stateless value exposing
//! `stream`, `search`, `lookup_conversation`, `lookup_message`, all keyed by
//! a file path.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::Error;
use crate::model::Conversation;
use crate::parser::{self, claude, openai};

/// Which export schema a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Claude,
}

impl Provider {
    pub fn adapter(self) -> ProviderAdapter {
        ProviderAdapter { provider: self }
    }
}

/// Reads at most the first conversation object of the root array (spec
/// §4.2.1).
pub fn detect_provider(path: &Path) -> Result<Provider, Error> {
    let first = parser::peek_first_element(path)?;
    let object = match &first {
        Some(serde_json::Value::Object(map)) => map,
        Some(_) | None => return Err(Error::UnknownFormat(path.to_path_buf())),
    };
    if object.contains_key("chat_messages") {
        Ok(Provider::Claude)
    } else if object.contains_key("mapping") {
        Ok(Provider::OpenAi)
    } else {
        Err(Error::UnknownFormat(path.to_path_buf()))
    }
}

/// Progress callback: invoked with the running count of successfully
/// yielded conversations (spec §4.1 cadence: every 100 conversations or
/// every 100ms of wall time, whichever comes first).
pub type ProgressCallback<'a> = Box<dyn FnMut(u64) + 'a>;
/// Skip callback: invoked at most once per conversation dropped by
/// validation, with its id (or `"unknown"`) and a human-readable reason.
pub type SkipCallback<'a> = Box<dyn FnMut(&str, &str) + 'a>;

/// Callback pair passed into `stream`/`search`. Defaults to no-ops.
#[derive(Default)]
pub struct StreamOptions<'a> {
    pub progress: Option<ProgressCallback<'a>>,
    pub on_skip: Option<SkipCallback<'a>>,
}

/// A stateless, shareable value implementing the four adapter operations
/// for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderAdapter {
    provider: Provider,
}

impl ProviderAdapter {
    pub fn provider(self) -> Provider {
        self.provider
    }

    /// Opens `path` and returns a lazy, non-restartable iterator of
    /// conversations. O(1) memory regardless of file size.
    pub fn stream<'a>(
        &self,
        path: &Path,
        opts: StreamOptions<'a>,
    ) -> Result<ConversationStream<'a>, Error> {
        warn_on_mismatch(self.provider, path);
        let reader = parser::open_array_reader(path)?;
        Ok(ConversationStream {
            provider: self.provider,
            path: path.to_path_buf(),
            reader,
            progress: opts.progress,
            on_skip: opts.on_skip,
            yielded: 0,
            last_tick: Instant::now(),
        })
    }

    /// Delegates to the search engine (spec §4.3); the adapter's only
    /// contribution is the stream the engine scans.
    pub fn search(
        &self,
        path: &Path,
        query: &crate::search::SearchQuery,
        opts: StreamOptions<'_>,
    ) -> Result<Vec<crate::search::SearchResult>, Error> {
        crate::search::search(*self, path, query, opts)
    }

    /// Full id match, then case-insensitive prefix match (length >= 4),
    /// first hit wins.
    pub fn lookup_conversation(&self, path: &Path, id: &str) -> Result<Option<Conversation>, Error> {
        crate::lookup::lookup_conversation(*self, path, id)
    }

    /// `conversation_hint`, if present, short-circuits to that
    /// conversation; otherwise every conversation is scanned.
    pub fn lookup_message(
        &self,
        path: &Path,
        message_id: &str,
        conversation_hint: Option<&str>,
    ) -> Result<Option<(crate::model::Message, Conversation)>, Error> {
        crate::lookup::lookup_message(*self, path, message_id, conversation_hint)
    }
}

fn warn_on_mismatch(selected: Provider, path: &Path) {
    if let Ok(Some(serde_json::Value::Object(map))) = parser::peek_first_element(path) {
        let detected = if map.contains_key("chat_messages") {
            Some(Provider::Claude)
        } else if map.contains_key("mapping") {
            Some(Provider::OpenAi)
        } else {
            None
        };
        if let Some(detected) = detected {
            if detected != selected {
                warn!(
                    file = %path.display(),
                    selected = ?selected,
                    detected = ?detected,
                    "explicit provider disagrees with file content"
                );
            }
        }
    }
}

/// Lazy, non-restartable iterator of conversations. Owns the underlying
/// file handle via `BufReader<File>`; dropped (and thus closed) as soon as
/// the iterator is dropped or exhausted.
pub struct ConversationStream<'a> {
    provider: Provider,
    path: PathBuf,
    reader: parser::JsonArrayReader<BufReader<File>>,
    progress: Option<ProgressCallback<'a>>,
    on_skip: Option<SkipCallback<'a>>,
    yielded: u64,
    last_tick: Instant,
}

impl<'a> Iterator for ConversationStream<'a> {
    type Item = Result<Conversation, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let bytes = match self.reader.next_element() {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return None,
                Err(e) => return Some(Err(with_path(e, &self.path))),
            };

            let parsed = match self.provider {
                Provider::OpenAi => openai::parse_conversation(&bytes),
                Provider::Claude => claude::parse_conversation(&bytes),
            };

            match parsed {
                Ok(conv) => {
                    self.yielded += 1;
                    self.maybe_report_progress();
                    return Some(Ok(conv));
                }
                Err(Error::ValidationError { id, reason }) => {
                    tracing::warn!(id = %id, reason = %reason, "skipping conversation");
                    if let Some(cb) = self.on_skip.as_mut() {
                        cb(&id, &reason);
                    }
                    continue;
                }
                Err(other) => return Some(Err(with_path(other, &self.path))),
            }
        }
    }
}

impl<'a> ConversationStream<'a> {
    fn maybe_report_progress(&mut self) {
        let due_by_count = self.yielded % 100 == 0;
        let due_by_time = self.last_tick.elapsed() >= Duration::from_millis(100);
        if due_by_count || due_by_time {
            if let Some(cb) = self.progress.as_mut() {
                cb(self.yielded);
            }
            self.last_tick = Instant::now();
        }
    }
}

fn with_path(err: Error, path: &Path) -> Error {
    match err {
        Error::ParseError { reason, .. } => Error::ParseError {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    }
}
