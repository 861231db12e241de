//! Parley application binary - composition root.
//!
//! Ties together the Parley crates into a single executable:
//! 1. Load configuration from TOML and apply CLI overrides
//! 2. Open durable storage (SQLite key-value table) or an in-memory store
//! 3. Build the HTTP backend and restore the last session
//! 4. Run the line-oriented front end until /quit, EOF or Ctrl-C
//! 5. Commit the open session and flush on the way out

mod cli;
mod repl;

use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use parley_chat::{
    ChatError, ChatOrchestrator, ConversationSummary, EnvToken, HttpBackend, TurnOutcome,
};
use parley_core::config::ParleyConfig;
use parley_core::types::Role;
use parley_storage::{Database, KeyValueStore, MemoryKvStore, PersistenceLayer, SqliteKvStore};

use crate::cli::CliArgs;
use crate::repl::Command;

/// What the loop does after a command.
enum Flow {
    Continue,
    Quit,
}

/// Front-end state that outlives a single command.
#[derive(Default)]
struct Screen {
    /// The last list printed; `/open n` and `/delete n` index into it.
    listed: Vec<ConversationSummary>,
}

async fn dispatch(
    orch: &ChatOrchestrator,
    screen: &mut Screen,
    command: Command,
) -> Result<Flow, ChatError> {
    match command {
        Command::Ask(text) => {
            let before = orch.active_messages()?.len();
            let outcome = orch.send(&text).await?;
            let messages = orch.active_messages()?;
            for (i, m) in messages.iter().enumerate().skip(before) {
                if m.role == Role::Assistant {
                    println!("{}", repl::render_message(i + 1, m));
                }
            }
            match outcome {
                TurnOutcome::Failed(notice) => println!("! {}", notice.message),
                TurnOutcome::Stale => println!("(the answer arrived for a chat that is no longer open)"),
                TurnOutcome::Applied { .. } => {}
            }
        }
        Command::New => {
            if orch.new_chat()? {
                println!("Started a new chat.");
            } else {
                println!("Already in a new chat.");
            }
        }
        Command::List => {
            screen.listed = orch.conversations()?;
            println!("{}", repl::render_list(&screen.listed));
        }
        Command::Search(query) => {
            screen.listed = orch.search(&query)?;
            println!("{}", repl::render_list(&screen.listed));
        }
        Command::Open(n) => match screen.listed.get(n - 1) {
            Some(row) => {
                orch.switch_to(row.id)?;
                println!("Opened \"{}\".", row.title);
                println!("{}", repl::render_messages(&orch.active_messages()?));
            }
            None => println!("No conversation {} in the last list (try /list).", n),
        },
        Command::Delete(n) => match screen.listed.get(n - 1).cloned() {
            Some(row) => {
                if orch.delete(row.id)? {
                    println!("Deleted \"{}\".", row.title);
                }
                screen.listed = orch.conversations()?;
                println!("{}", repl::render_list(&screen.listed));
            }
            None => println!("No conversation {} in the last list (try /list).", n),
        },
        Command::Like(n) | Command::Dislike(n) => {
            let messages = orch.active_messages()?;
            let Some(message) = messages.get(n - 1) else {
                println!("No message {} in this chat.", n);
                return Ok(Flow::Continue);
            };
            let changed = if matches!(command, Command::Like(_)) {
                orch.toggle_like(message.id)?
            } else {
                orch.toggle_dislike(message.id)?
            };
            if changed {
                if let Some(updated) = orch.active_messages()?.get(n - 1) {
                    println!("{}", repl::render_message(n, updated));
                }
            }
        }
        Command::Show => {
            println!("{}", repl::render_messages(&orch.active_messages()?));
        }
        Command::Width(px) => {
            println!("Sidebar width set to {}px.", orch.set_sidebar_width(px));
        }
        Command::Ping => match orch.health_check().await {
            Ok(()) => println!("Assistant service is reachable."),
            Err(e) => println!("! Assistant service check failed: {}", e),
        },
        Command::Help => println!("{}", repl::HELP),
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

async fn run(orch: &ChatOrchestrator) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut screen = Screen::default();

    let messages = orch.active_messages().unwrap_or_default();
    if !messages.is_empty() {
        println!("{}", repl::render_messages(&messages));
    }
    println!("Type a question, or /help for commands.");

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let command = match repl::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("! {}", e);
                continue;
            }
        };
        match dispatch(orch, &mut screen, command).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Command rejected");
                println!("! {}", e);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_path = args.resolve_config_path();
    let loaded = ParleyConfig::load(&config_path);
    let config_level = loaded
        .as_ref()
        .map(|c| c.general.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());

    // Tracing goes to stderr so it never interleaves with chat output.
    let level = args.resolve_log_level(&config_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_path.display(), error = %e, "Config not loaded, using defaults");
            ParleyConfig::default()
        }
    };
    config.backend.base_url = args.resolve_base_url(&config.backend.base_url);
    config.validate()?;

    tracing::info!(base_url = %config.backend.base_url, "Parley starting");

    // Storage.
    let kv: Arc<dyn KeyValueStore> = if args.memory {
        tracing::info!("Using in-memory storage; nothing will be saved");
        Arc::new(MemoryKvStore::new())
    } else {
        let data_dir = args.resolve_data_dir(&config.general.data_dir);
        if let Err(e) = std::fs::create_dir_all(&data_dir) {
            tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
            return Err(e.into());
        }
        let db_path = data_dir.join("parley.db");
        let db = Database::new(&db_path)?;
        tracing::info!(path = %db_path.display(), "SQLite database opened");
        Arc::new(SqliteKvStore::new(Arc::new(db)))
    };

    // Backend and session.
    let token = Arc::new(EnvToken::new(config.backend.token_env.clone()));
    let backend = Arc::new(HttpBackend::new(&config.backend, token)?);
    let persistence = Arc::new(PersistenceLayer::new(kv, config.ui.clone()));
    let orch = ChatOrchestrator::new(&config, backend, persistence);

    let result = run(&orch).await;

    if !orch.shutdown() {
        tracing::warn!("Final flush failed; recent changes may be lost");
    }
    tracing::info!("Parley stopped");
    result.map_err(Into::into)
}
