// SPDX-FileCopyrightText: 2026 Chatkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chatkeep - a conversation store shared by many tabs.
//!
//! This is the command-line front end. Each invocation acts as one tab.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use chatkeep::TabSession;
use chatkeep_config::ChatkeepConfig;
use chatkeep_core::{ChatkeepError, StorageAdapter, SystemClock, TabId};
use chatkeep_lock::{HeartbeatStatus, LockEventBus};
use chatkeep_merge::ImportMode;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Chatkeep - a conversation store shared by many tabs.
#[derive(Parser, Debug)]
#[command(name = "chatkeep", version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Tab identity for this invocation.
    #[arg(long, global = true, default_value = "cli")]
    tab: String,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored conversations.
    Show,
    /// Import an archive file.
    Import {
        file: PathBuf,
        /// Replace the stored set instead of merging into it.
        #[arg(long)]
        overwrite: bool,
    },
    /// Write an archive to stdout or a file.
    Export {
        /// Only the current conversation.
        #[arg(long)]
        current: bool,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Load the store, repairing and writing back anything malformed.
    Repair,
    /// List live conversation locks.
    Locks,
    /// Hold the lock on a conversation until interrupted.
    Hold { chat_id: String },
    /// Fork a conversation after the given message index.
    Fork { chat_id: String, upto: usize },
    /// Duplicate a conversation.
    Copy { chat_id: String },
    /// Delete a conversation.
    Delete { chat_id: String },
    /// Rename a conversation.
    Rename { chat_id: String, title: String },
    /// Replace one message's content.
    Edit {
        chat_id: String,
        message_id: String,
        content: String,
    },
    /// Delete one message from a conversation.
    DeleteMessage { chat_id: String, message_id: String },
    /// Remove the stored set and this tab's current pointer.
    Clear,
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chatkeep={log_level},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> ChatkeepConfig {
    let result = match path {
        Some(path) => chatkeep_config::load_and_validate_path(path),
        None => chatkeep_config::load_and_validate(),
    };
    match result {
        Ok(config) => config,
        Err(errors) => {
            chatkeep_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config.app.log_level);

    let use_color = !cli.plain && std::io::stdout().is_terminal();
    if let Err(e) = run(cli, &config, use_color).await {
        print_error(&e, use_color);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &ChatkeepConfig, use_color: bool) -> Result<(), ChatkeepError> {
    let bus = LockEventBus::new(config.locks.event_capacity);
    let session = TabSession::open(config, TabId(cli.tab), bus, Arc::new(SystemClock)).await?;

    match cli.command {
        Commands::Show => {
            let state = session.load().await;
            print_conversations(&state, use_color);
        }
        Commands::Import { file, overwrite } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| ChatkeepError::InvalidArchive(format!("{}: {e}", file.display())))?;
            let mode = if overwrite {
                ImportMode::Overwrite
            } else {
                ImportMode::Merge
            };
            let summary = session.import_archive(&text, mode).await?;
            println!(
                "imported ({mode}): {} added, {} merged, {} removed, {} total",
                summary.added, summary.merged, summary.removed, summary.total
            );
        }
        Commands::Export { current, output } => {
            let doc = session.export_archive(current).await?;
            let text = serde_json::to_string_pretty(&doc)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, text).await.map_err(ChatkeepError::storage)?;
                    info!(path = %path.display(), "archive written");
                }
                None => println!("{text}"),
            }
        }
        Commands::Repair => {
            let state = session.load().await;
            match state.repair {
                Some(stats) => println!(
                    "repaired {} of {} conversations ({} messages rewritten)",
                    stats.repaired_chat_count, stats.total_chats, stats.repaired_message_count
                ),
                None => println!("{} conversations, nothing to repair", state.conversations.len()),
            }
        }
        Commands::Locks => {
            let locks = session.locks().active_locks().await?;
            if locks.is_empty() {
                println!("no active locks");
            }
            for lock in locks {
                println!(
                    "  {}  {}  held by {}",
                    lock.chat_id, lock.chat_title, lock.tab_id
                );
            }
        }
        Commands::Hold { chat_id } => hold(&session, &chat_id, use_color).await?,
        Commands::Fork { chat_id, upto } => {
            let fork = session.fork(&chat_id, upto).await?;
            println!("{}  {}", fork.id, fork.title);
        }
        Commands::Copy { chat_id } => {
            let copy = session.copy(&chat_id).await?;
            println!("{}  {}", copy.id, copy.title);
        }
        Commands::Delete { chat_id } => {
            session.delete(&chat_id).await?;
            println!("deleted {chat_id}");
        }
        Commands::Rename { chat_id, title } => {
            let chat = session.rename(&chat_id, &title).await?;
            println!("{}  {}", chat.id, chat.title);
        }
        Commands::Edit {
            chat_id,
            message_id,
            content,
        } => {
            session.edit_message(&chat_id, &message_id, &content).await?;
            println!("edited {message_id}");
        }
        Commands::DeleteMessage {
            chat_id,
            message_id,
        } => {
            session.delete_message(&chat_id, &message_id).await?;
            println!("deleted {message_id}");
        }
        Commands::Clear => {
            session.store().clear().await?;
            println!("cleared");
        }
    }
    Ok(())
}

async fn hold(session: &TabSession, chat_id: &str, use_color: bool) -> Result<(), ChatkeepError> {
    let state = session.load().await;
    let title = state
        .conversations
        .iter()
        .find(|c| c.id == chat_id)
        .map(|c| c.title.clone())
        .ok_or_else(|| ChatkeepError::NotFound(chat_id.to_string()))?;

    let acquisition = session.locks().acquire(chat_id, &title).await?;
    if !acquisition.is_acquired() {
        let holder = &acquisition.record().tab_id;
        if use_color {
            use colored::Colorize;
            println!("{} locked by tab {holder}", "✗".red());
        } else {
            println!("[LOCKED] locked by tab {holder}");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let heartbeat = session
        .locks()
        .spawn_heartbeat(chat_id.to_string(), title, cancel.clone());
    let mut status = heartbeat.status();
    println!("holding {chat_id}; press Ctrl-C to release");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = status.wait_for(|s| *s == HeartbeatStatus::Lost) => {
            println!("lock on {chat_id} was taken over");
        }
    }
    heartbeat.stop().await;
    session.locks().release(chat_id).await?;
    Ok(())
}

fn print_conversations(state: &chatkeep_core::LoadedState, use_color: bool) {
    println!();
    println!("  chatkeep ({}, {} conversations)", state.source, state.conversations.len());
    println!("  {}", "-".repeat(35));
    for chat in &state.conversations {
        let current = state.current_id.as_deref() == Some(chat.id.as_str());
        let marker = match (current, use_color) {
            (true, true) => {
                use colored::Colorize;
                "*".green().to_string()
            }
            (true, false) => "*".to_string(),
            (false, _) => " ".to_string(),
        };
        println!(
            "  {marker} {}  {}  ({} messages)",
            chat.id,
            chat.title,
            chat.messages.len()
        );
    }
    println!();
}

fn print_error(err: &ChatkeepError, use_color: bool) {
    if use_color {
        use colored::Colorize;
        eprintln!("{} {err}", "error:".red());
    } else {
        eprintln!("error: {err}");
    }
}
