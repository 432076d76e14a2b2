// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The `troupe` command-line interface.
//!
//! Operates on the checkpoint store only; no model client is constructed.
//! Subcommands: list sessions, replay a session's ordered history, wipe a
//! session's threads.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crate::checkpoint::{
    HydrationEventKind, MemoryCheckpointStore, SharedCheckpointStore, SqliteCheckpointStore,
};
use crate::config::{
    expand_path, find_workflow_root, load_workflow_config, load_workflow_file,
    CheckpointBackend, WorkflowConfig,
};
use crate::error::Result;
use crate::orchestrate::hydrate_conversation;
use crate::telemetry::{init_telemetry, TelemetryConfig};

/// Multi-agent conversational workflow runtime.
#[derive(Parser)]
#[command(name = "troupe")]
#[command(author, version, about = "Multi-agent conversational workflow runtime", long_about = None)]
pub struct Cli {
    /// Workflow file; defaults to searching upward from the current
    /// directory.
    #[arg(short, long, env = "TROUPE_CONFIG")]
    config: Option<PathBuf>,

    /// Show verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List checkpointed threads and their last write times.
    Sessions,

    /// Print a session's history in replay order.
    Replay {
        /// Session id to replay.
        #[arg(long)]
        session: String,
    },

    /// Delete every thread of a session.
    Wipe {
        /// Session id to wipe.
        #[arg(long)]
        session: String,

        /// Confirm the deletion; without this flag nothing is removed.
        #[arg(long)]
        yes: bool,
    },
}

/// Parse arguments and run the selected subcommand.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let telemetry = if cli.verbose {
        TelemetryConfig::development()
    } else {
        TelemetryConfig::default()
    };
    let _guard = init_telemetry(&telemetry)?;

    let config = load_config(cli.config.as_deref())?;
    let store = open_store(&config)?;

    match cli.command {
        Commands::Sessions => list_sessions(store).await,
        Commands::Replay { session } => replay_session(store, &session).await,
        Commands::Wipe { session, yes } => wipe_session(store, &session, yes).await,
    }
}

fn load_config(explicit: Option<&std::path::Path>) -> Result<WorkflowConfig> {
    match explicit {
        Some(path) => Ok(load_workflow_file(path)?),
        None => {
            let cwd = std::env::current_dir()?;
            let root = find_workflow_root(&cwd).unwrap_or(cwd);
            Ok(load_workflow_config(&root)?)
        }
    }
}

fn open_store(config: &WorkflowConfig) -> Result<SharedCheckpointStore> {
    match config.checkpoint.backend {
        CheckpointBackend::Memory => {
            eprintln!(
                "{}",
                "Note: memory checkpoint backend holds no persisted sessions.".yellow()
            );
            Ok(Arc::new(MemoryCheckpointStore::new()))
        }
        CheckpointBackend::Sqlite => {
            let store = match &config.checkpoint.path {
                Some(path) => SqliteCheckpointStore::open_at(&expand_path(path))?,
                None => SqliteCheckpointStore::open()?,
            };
            Ok(Arc::new(store))
        }
    }
}

async fn list_sessions(store: SharedCheckpointStore) -> Result<()> {
    let summaries = store.list(None).await?;
    if summaries.is_empty() {
        println!("{}", "No checkpointed threads.".dimmed());
        return Ok(());
    }

    println!(
        "{:<24} {:<20} {:>11}  {}",
        "SESSION".bold(),
        "AGENT".bold(),
        "CHECKPOINTS".bold(),
        "LAST WRITE".bold()
    );
    for summary in summaries {
        println!(
            "{:<24} {:<20} {:>11}  {}",
            summary.session_id().unwrap_or("?").bright_white(),
            summary.agent_name().unwrap_or("?"),
            summary.checkpoints,
            summary.last_write.dimmed()
        );
    }
    Ok(())
}

async fn replay_session(store: SharedCheckpointStore, session: &str) -> Result<()> {
    let summaries = store.list(Some(session)).await?;
    if summaries.is_empty() {
        println!("{}", format!("No threads for session {session}.").dimmed());
        return Ok(());
    }

    let agents: Vec<&str> = summaries
        .iter()
        .filter_map(|summary| summary.agent_name())
        .collect();
    let hydrated = hydrate_conversation(store.as_ref(), session, &agents).await?;

    for event in &hydrated.events {
        let tag = match event.kind {
            HydrationEventKind::UserMessage => "user".cyan(),
            HydrationEventKind::ToolRequest => "tool-request".yellow(),
            HydrationEventKind::ToolResponse => "tool-response".yellow(),
            HydrationEventKind::AgentHandoff => "handoff".magenta(),
            HydrationEventKind::FinalResponse => "response".green(),
        };
        println!(
            "{} {:>13} {} {}",
            event.timestamp.dimmed(),
            tag,
            event.agent.bright_white().bold(),
            first_line(&event.text)
        );
    }

    match &hydrated.current_agent {
        Some(agent) => println!(
            "\n{} {} (delegation depth {})",
            "Next to act:".bold(),
            agent.bright_white(),
            hydrated.stack.len()
        ),
        None => println!("\n{}", "Conversation complete.".green()),
    }
    Ok(())
}

async fn wipe_session(store: SharedCheckpointStore, session: &str, yes: bool) -> Result<()> {
    let summaries = store.list(Some(session)).await?;
    if summaries.is_empty() {
        println!("{}", format!("No threads for session {session}.").dimmed());
        return Ok(());
    }

    if !yes {
        println!(
            "{}",
            format!(
                "Would delete {} thread(s) for session {session}. Re-run with --yes to confirm.",
                summaries.len()
            )
            .yellow()
        );
        return Ok(());
    }

    let mut deleted = 0usize;
    for summary in &summaries {
        if store.delete_thread(&summary.thread_key).await? {
            deleted += 1;
        }
    }
    println!("Deleted {deleted} thread(s) for session {session}.");
    Ok(())
}

fn first_line(text: &str) -> String {
    let mut line = text.lines().next().unwrap_or("").to_string();
    const MAX: usize = 96;
    if line.len() > MAX {
        let mut cut = MAX;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
        line.push('…');
    } else if text.lines().count() > 1 {
        line.push('…');
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointDelta;
    use crate::types::Message;

    #[test]
    fn test_first_line_truncates() {
        assert_eq!(first_line("short"), "short");
        assert_eq!(first_line("one\ntwo"), "one…");
        let long = "x".repeat(200);
        assert!(first_line(&long).len() <= 100);
    }

    #[tokio::test]
    async fn test_wipe_requires_confirmation() {
        let store: SharedCheckpointStore = Arc::new(MemoryCheckpointStore::new());
        store
            .put("s1#Assistant", CheckpointDelta::append(Message::user("hi")))
            .await
            .unwrap();

        wipe_session(store.clone(), "s1", false).await.unwrap();
        assert_eq!(store.list(Some("s1")).await.unwrap().len(), 1);

        wipe_session(store.clone(), "s1", true).await.unwrap();
        assert!(store.list(Some("s1")).await.unwrap().is_empty());
    }
}
