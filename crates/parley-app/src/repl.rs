//! Line-oriented front end: command parsing and plain-text rendering.
//!
//! Plain text asks a question. Lines starting with `/` are commands. List
//! positions are 1-based, as printed.

use std::fmt::Write as _;

use parley_chat::ConversationSummary;
use parley_core::types::{Message, Role};

pub const HELP: &str = "\
Commands:
  <text>          ask a question
  /new            commit this chat and start a new one
  /list           list saved conversations (filtered by the search text)
  /search <text>  set the search text; empty clears it
  /open <n>       open conversation n from the last list
  /delete <n>     delete conversation n from the last list
  /like <n>       toggle like on message n of this chat
  /dislike <n>    toggle dislike on message n of this chat
  /show           print this chat
  /width <px>     set the sidebar width preference
  /ping           check the assistant service
  /help           show this help
  /quit           save and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    New,
    List,
    Search(String),
    Open(usize),
    Delete(usize),
    Like(usize),
    Dislike(usize),
    Show,
    Width(u32),
    Ping,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("/{0} needs a number")]
    MissingNumber(&'static str),
    #[error("not a valid position: {0}")]
    InvalidNumber(String),
}

/// Parse one input line.
pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Ask(line.to_string()));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name.to_ascii_lowercase().as_str() {
        "new" => Ok(Command::New),
        "list" | "ls" => Ok(Command::List),
        "search" => Ok(Command::Search(arg.to_string())),
        "open" => position(arg, "open").map(Command::Open),
        "delete" | "rm" => position(arg, "delete").map(Command::Delete),
        "like" => position(arg, "like").map(Command::Like),
        "dislike" => position(arg, "dislike").map(Command::Dislike),
        "show" => Ok(Command::Show),
        "width" => {
            if arg.is_empty() {
                return Err(CommandError::MissingNumber("width"));
            }
            arg.parse()
                .map(Command::Width)
                .map_err(|_| CommandError::InvalidNumber(arg.to_string()))
        }
        "ping" => Ok(Command::Ping),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn position(arg: &str, command: &'static str) -> Result<usize, CommandError> {
    if arg.is_empty() {
        return Err(CommandError::MissingNumber(command));
    }
    match arg.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::InvalidNumber(arg.to_string())),
    }
}

/// Render the conversation list with 1-based positions.
pub fn render_list(conversations: &[ConversationSummary]) -> String {
    if conversations.is_empty() {
        return "No conversations.".to_string();
    }
    let mut out = String::new();
    for (i, c) in conversations.iter().enumerate() {
        let marker = if c.is_current { "*" } else { " " };
        let _ = writeln!(
            out,
            "{}{:>3}. {} ({} messages)",
            marker,
            i + 1,
            c.title,
            c.message_count
        );
    }
    out.trim_end().to_string()
}

/// Render messages with 1-based positions.
pub fn render_messages(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "This chat is empty. Ask a question to begin.".to_string();
    }
    let mut out = String::new();
    for (i, m) in messages.iter().enumerate() {
        let _ = writeln!(out, "{}", render_message(i + 1, m));
    }
    out.trim_end().to_string()
}

pub fn render_message(position: usize, m: &Message) -> String {
    match m.role {
        Role::User => format!("{:>3}  you: {}", position, m.text()),
        Role::Assistant => {
            let mut line = format!("{:>3}  assistant: {}", position, m.text());
            if let Some(score) = m.match_score {
                let _ = write!(line, " [match {:.2}]", score);
            }
            if let Some(confidence) = &m.confidence {
                let _ = write!(line, " [confidence {}]", confidence);
            }
            if let Some(image) = &m.image_ref {
                let _ = write!(line, "\n       image: {}", image);
            }
            if m.like_count > 0 || m.dislike_count > 0 {
                let _ = write!(line, " (+{} / -{})", m.like_count, m.dislike_count);
            }
            line
        }
    }
}
