//! # chatvault
//!
//! A streaming engine for ChatGPT and Claude conversation export files.
//!
//! ## What it does
//!
//! ChatGPT and Claude both let you export your full chat history as a single
//! large JSON file: a top-level array of conversations, each holding a tree
//! (ChatGPT) or chain (Claude) of messages. These files can run to hundreds
//! of thousands of messages and well over a gigabyte. This crate reads them
//! incrementally — never materializing more than one conversation at a time
//! — and exposes:
//!
//! - a uniform [`provider::ProviderAdapter`] stream over either format,
//! - id and prefix [`lookup`],
//! - relevance-ranked [`search`] with BM25 scoring and snippet extraction,
//! - canonical [`export::markdown`] and [`export::csv`] rendering,
//! - streaming [`stats`].
//!
//! The source files are opened **read-only**; nothing is ever written back.
//!
//! ## Usage
//!
//! ```no_run
//! use chatvault::provider::{detect_provider, ProviderAdapter};
//!
//! let path = std::path::Path::new("conversations.json");
//! let provider = detect_provider(path)?;
//! let adapter = provider.adapter();
//! for conversation in adapter.stream(path, Default::default())? {
//!     let conversation = conversation?;
//!     println!("{} ({} messages)", conversation.title, conversation.message_count());
//! }
//! # Ok::<(), chatvault::error::Error>(())
//! ```
//!
//! ## Scope
//!
//! This crate is the engine only: no network I/O, no persisted index, no
//! fuzzy/stemmed/semantic matching, no writing back to the source format.

pub mod error;
pub mod export;
pub mod lookup;
pub mod model;
pub mod parser;
pub mod provider;
pub mod search;
pub mod stats;

pub use error::Error;
pub use model::{Conversation, Message, Role};
pub use provider::{detect_provider, Provider, ProviderAdapter};
pub use search::{search, SearchQuery, SearchResult};
