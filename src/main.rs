//! # chatvault
//!
//! A thin CLI over the `chatvault` library: stream, search, look up,
//! summarize, and export ChatGPT/Claude conversation export files.
//!
//! ## Usage
//!
//! ```sh
//! chatvault stream conversations.json
//! chatvault search conversations.json --keyword python --limit 5
//! chatvault lookup conversations.json --conversation-id conv-abc123
//! chatvault stats conversations.json
//! chatvault export conversations.json --format markdown --out ./out
//! ```
//!
//! All four subcommands auto-detect the provider (OpenAI vs Claude) from
//! the file's own content (§4.2.1); there is no `--provider` override,
//! since the library's `detect_provider` already logs a WARNING if given
//! content ever looks inconsistent with itself mid-stream.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use eyre::{eyre, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use chatvault::error::Error as ChatvaultError;
use chatvault::export::{csv as export_csv, markdown};
use chatvault::model::Role;
use chatvault::provider::{detect_provider, StreamOptions};
use chatvault::search::{MatchMode, SearchQuery, SortBy, SortOrder};
use chatvault::{lookup, stats};

/// Read, search, and export ChatGPT/Claude conversation export files.
#[derive(Parser)]
#[command(name = "chatvault", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Stream every conversation in the file, printing a one-line summary each.
    Stream {
        /// Path to the conversation export JSON file.
        file: PathBuf,

        /// Suppress the progress bar.
        #[arg(short, long)]
        quiet: bool,
    },

    /// Search the file for conversations matching the given filters.
    Search {
        file: PathBuf,

        /// Keyword to match (repeatable).
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,

        /// Literal phrase to match (repeatable).
        #[arg(short, long = "phrase")]
        phrases: Vec<String>,

        /// Require every keyword to match instead of any.
        #[arg(long)]
        match_all: bool,

        /// Keyword that, if present, excludes the conversation (repeatable).
        #[arg(long = "exclude")]
        exclude_keywords: Vec<String>,

        /// Restrict matching to messages from this role.
        #[arg(long, value_enum)]
        role: Option<RoleArg>,

        /// Case-insensitive substring match on the conversation title.
        #[arg(long)]
        title: Option<String>,

        /// Only include conversations created on or after this date (YYYY-MM-DD).
        #[arg(long)]
        from_date: Option<NaiveDate>,

        /// Only include conversations created on or before this date (YYYY-MM-DD).
        #[arg(long)]
        to_date: Option<NaiveDate>,

        #[arg(long)]
        min_messages: Option<usize>,

        #[arg(long)]
        max_messages: Option<usize>,

        #[arg(long, value_enum, default_value = "score")]
        sort_by: SortByArg,

        #[arg(long, value_enum, default_value = "desc")]
        sort_order: SortOrderArg,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Write results as CSV instead of the default plain-text listing.
        #[arg(long)]
        csv: bool,
    },

    /// Find a conversation by id (or prefix) and print it.
    Lookup {
        file: PathBuf,

        #[arg(long)]
        conversation_id: Option<String>,

        #[arg(long)]
        message_id: Option<String>,
    },

    /// Print aggregate statistics for the file.
    Stats { file: PathBuf },

    /// Render the file (or a single conversation within it) to Markdown or CSV.
    Export {
        file: PathBuf,

        #[arg(long, value_enum, default_value = "markdown")]
        format: ExportFormat,

        /// Only export this one conversation id (default: every conversation).
        #[arg(long)]
        conversation_id: Option<String>,

        /// Output directory (Markdown) or file (CSV). Defaults to stdout for CSV.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Omit the YAML frontmatter block (Markdown only).
        #[arg(long)]
        no_frontmatter: bool,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum RoleArg {
    User,
    Assistant,
    System,
}

impl From<RoleArg> for Role {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::User => Role::User,
            RoleArg::Assistant => Role::Assistant,
            RoleArg::System => Role::System,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SortByArg {
    Score,
    Date,
    Title,
    Messages,
}

impl From<SortByArg> for SortBy {
    fn from(value: SortByArg) -> Self {
        match value {
            SortByArg::Score => SortBy::Score,
            SortByArg::Date => SortBy::Date,
            SortByArg::Title => SortBy::Title,
            SortByArg::Messages => SortBy::Messages,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum SortOrderArg {
    Asc,
    Desc,
}

impl From<SortOrderArg> for SortOrder {
    fn from(value: SortOrderArg) -> Self {
        match value {
            SortOrderArg::Asc => SortOrder::Asc,
            SortOrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ExportFormat {
    Markdown,
    Csv,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(exit_code_for(&err));
        }
    }
}

/// Maps an `eyre::Report` onto §6's exit codes by checking whether the
/// library's own `chatvault::Error` is anywhere in the chain.
fn exit_code_for(err: &eyre::Report) -> i32 {
    for cause in err.chain() {
        if let Some(lib_err) = cause.downcast_ref::<ChatvaultError>() {
            return lib_err.exit_code();
        }
    }
    1
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Stream { file, quiet } => run_stream(&file, quiet),
        Command::Search {
            file,
            keywords,
            phrases,
            match_all,
            exclude_keywords,
            role,
            title,
            from_date,
            to_date,
            min_messages,
            max_messages,
            sort_by,
            sort_order,
            limit,
            csv,
        } => run_search(
            &file,
            SearchQuery {
                keywords,
                phrases,
                match_mode: if match_all { MatchMode::All } else { MatchMode::Any },
                exclude_keywords,
                role_filter: role.map(Role::from),
                title_filter: title,
                from_date,
                to_date,
                min_messages,
                max_messages,
                sort_by: sort_by.into(),
                sort_order: sort_order.into(),
                limit,
            },
            csv,
        ),
        Command::Lookup {
            file,
            conversation_id,
            message_id,
        } => run_lookup(&file, conversation_id, message_id),
        Command::Stats { file } => run_stats(&file),
        Command::Export {
            file,
            format,
            conversation_id,
            out,
            no_frontmatter,
        } => run_export(&file, format, conversation_id, out, no_frontmatter),
    }
}

fn run_stream(file: &PathBuf, quiet: bool) -> Result<()> {
    let provider = detect_provider(file).wrap_err("detecting provider")?;
    let adapter = provider.adapter();

    let bar = if quiet {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Some(bar)
    };

    let opts = StreamOptions {
        progress: bar.clone().map(|bar| {
            Box::new(move |count| bar.set_message(format!("{count} conversations"))) as Box<dyn FnMut(u64)>
        }),
        on_skip: Some(Box::new(|id: &str, reason: &str| {
            eprintln!("skipped {id}: {reason}");
        })),
    };

    let mut count = 0u64;
    for conversation in adapter.stream(file, opts).map_err(map_lib_err)? {
        let conversation = conversation.map_err(map_lib_err)?;
        println!(
            "{}\t{}\t{} messages",
            conversation.id,
            conversation.title,
            conversation.message_count()
        );
        count += 1;
    }
    if let Some(bar) = bar {
        bar.finish_with_message(format!("{count} conversations"));
    }
    Ok(())
}

fn run_search(file: &PathBuf, query: SearchQuery, as_csv: bool) -> Result<()> {
    let provider = detect_provider(file).wrap_err("detecting provider")?;
    let opts = StreamOptions {
        on_skip: Some(Box::new(|id: &str, reason: &str| {
            eprintln!("skipped {id}: {reason}");
        })),
        ..Default::default()
    };
    let results = provider.adapter().search(file, &query, opts).map_err(map_lib_err)?;

    if as_csv {
        let stdout = io::stdout();
        export_csv::write_search_results(stdout.lock(), &results).map_err(map_lib_err)?;
        return Ok(());
    }

    if results.is_empty() {
        println!("no results");
        return Ok(());
    }
    for result in &results {
        println!(
            "{:.3}\t{}\t{}\t{}",
            result.score, result.conversation.id, result.conversation.title, result.snippet
        );
    }
    Ok(())
}

fn run_lookup(file: &PathBuf, conversation_id: Option<String>, message_id: Option<String>) -> Result<()> {
    let provider = detect_provider(file).wrap_err("detecting provider")?;
    let adapter = provider.adapter();

    match (conversation_id, message_id) {
        (Some(id), None) => match lookup::lookup_conversation(adapter, file, &id).map_err(map_lib_err)? {
            Some(conversation) => {
                println!(
                    "{}\t{}\t{} messages",
                    conversation.id,
                    conversation.title,
                    conversation.message_count()
                );
                Ok(())
            }
            None => Err(eyre!("conversation not found: {id}")),
        },
        (hint, Some(message_id)) => {
            match lookup::lookup_message(adapter, file, &message_id, hint.as_deref())
                .map_err(map_lib_err)?
            {
                Some((message, conversation)) => {
                    println!(
                        "{}\t{}\t{}\t{}",
                        conversation.id, message.id, message.role, message.content
                    );
                    Ok(())
                }
                None => Err(eyre!("message not found: {message_id}")),
            }
        }
        (None, None) => Err(eyre!("one of --conversation-id or --message-id is required")),
    }
}

fn run_stats(file: &PathBuf) -> Result<()> {
    let provider = detect_provider(file).wrap_err("detecting provider")?;
    let totals = stats::calculate_statistics(provider.adapter(), file).map_err(map_lib_err)?;

    println!("conversations: {}", totals.conversation_count);
    println!("messages: {}", totals.message_count);
    println!(
        "average messages/conversation: {:.2}",
        totals.average_messages_per_conversation
    );
    if let Some(earliest) = totals.earliest_created_at {
        println!("earliest: {earliest}");
    }
    if let Some(latest) = totals.latest_created_at {
        println!("latest: {latest}");
    }
    if let Some(largest) = totals.largest {
        println!(
            "largest: {} ({}, {} messages)",
            largest.id, largest.title, largest.message_count
        );
    }
    if let Some(smallest) = totals.smallest {
        println!(
            "smallest: {} ({}, {} messages)",
            smallest.id, smallest.title, smallest.message_count
        );
    }
    println!("skipped: {}", totals.skipped_count);
    Ok(())
}

fn run_export(
    file: &PathBuf,
    format: ExportFormat,
    conversation_id: Option<String>,
    out: Option<PathBuf>,
    no_frontmatter: bool,
) -> Result<()> {
    let provider = detect_provider(file).wrap_err("detecting provider")?;
    let adapter = provider.adapter();

    let conversations: Vec<_> = if let Some(id) = conversation_id {
        let conversation = lookup::lookup_conversation(adapter, file, &id)
            .map_err(map_lib_err)?
            .ok_or_else(|| eyre!("conversation not found: {id}"))?;
        vec![conversation]
    } else {
        adapter
            .stream(file, StreamOptions::default())
            .map_err(map_lib_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(map_lib_err)?
    };

    match format {
        ExportFormat::Markdown => {
            let opts = markdown::MarkdownOptions {
                frontmatter: !no_frontmatter,
                generated_at: Utc::now(),
                exported_by: "chatvault".to_string(),
            };
            match out {
                Some(dir) => {
                    fs::create_dir_all(&dir).wrap_err("creating output directory")?;
                    for conversation in &conversations {
                        let path = dir.join(format!("{}.md", conversation.id));
                        let mut file = fs::File::create(&path)
                            .wrap_err_with(|| format!("creating {}", path.display()))?;
                        markdown::write_conversation(&mut file, conversation, &opts)
                            .wrap_err_with(|| format!("writing {}", path.display()))?;
                    }
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    for conversation in &conversations {
                        markdown::write_conversation(&mut handle, conversation, &opts)
                            .wrap_err("writing to stdout")?;
                    }
                }
            }
        }
        ExportFormat::Csv => match out {
            Some(path) => {
                let file = fs::File::create(&path).wrap_err_with(|| format!("creating {}", path.display()))?;
                export_csv::write_conversations(file, &conversations).map_err(map_lib_err)?;
            }
            None => {
                let stdout = io::stdout();
                export_csv::write_conversations(stdout.lock(), &conversations).map_err(map_lib_err)?;
            }
        },
    }
    io::stdout().flush().ok();
    Ok(())
}

fn map_lib_err(err: ChatvaultError) -> eyre::Report {
    eyre::Report::new(err)
}
