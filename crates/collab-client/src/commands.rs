//! Line commands for the terminal front end.
//!
//! Each line read from stdin parses into a [`Command`]; [`execute`] runs it
//! against the connection and returns the text to print.

use std::fmt::Write as _;
use std::str::FromStr;

use collab_core::{Attribution, CommitId, Document, HighlightMeta, ReplaceStep};
use serde_json::json;
use thiserror::Error;

use crate::connection::{Connection, ConnectionError};
use crate::transport::Transport;

/// Message used when `commit` is given none.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Unnamed";

pub const HELP: &str = "\
commands:
  show                      print the document
  status                    connection mode and version
  insert <pos> <text>       insert text at a position
  delete <from> <to>        delete a range
  commit [message]          seal uncommitted changes
  log                       list commits
  blame <pos>               who wrote the text at a position
  revert <commit>           undo a commit
  highlight <commit>        mark the text a commit wrote
  unhighlight <commit>      clear the mark
  comment <text>            post a comment
  restart                   reload the document from the server
  help                      this text
  quit                      exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Status,
    Insert { pos: usize, text: String },
    Delete { from: usize, to: usize },
    Commit { message: String },
    Log,
    Blame { pos: usize },
    Revert { commit: CommitId },
    Highlight { commit: CommitId },
    Unhighlight { commit: CommitId },
    Comment { text: String },
    Restart,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),

    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: '{value}' is not a valid {argument}")]
    Invalid {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim_start()),
            None => (line, ""),
        };

        match name {
            "" => Err(CommandError::Empty),
            "show" => Ok(Command::Show),
            "status" => Ok(Command::Status),
            "insert" => {
                let (pos, text) = rest
                    .split_once(' ')
                    .ok_or(CommandError::MissingArgument {
                        command: "insert",
                        argument: "text",
                    })?;
                Ok(Command::Insert {
                    pos: number("insert", "position", pos)?,
                    text: text.to_string(),
                })
            }
            "delete" => {
                let mut args = rest.split_whitespace();
                let from = required("delete", "start", args.next())?;
                let to = required("delete", "end", args.next())?;
                Ok(Command::Delete {
                    from: number("delete", "start", from)?,
                    to: number("delete", "end", to)?,
                })
            }
            "commit" => Ok(Command::Commit {
                message: if rest.is_empty() {
                    DEFAULT_COMMIT_MESSAGE.to_string()
                } else {
                    rest.to_string()
                },
            }),
            "log" => Ok(Command::Log),
            "blame" => Ok(Command::Blame {
                pos: number("blame", "position", required("blame", "position", word(rest))?)?,
            }),
            "revert" => Ok(Command::Revert {
                commit: commit_id("revert", rest)?,
            }),
            "highlight" => Ok(Command::Highlight {
                commit: commit_id("highlight", rest)?,
            }),
            "unhighlight" => Ok(Command::Unhighlight {
                commit: commit_id("unhighlight", rest)?,
            }),
            "comment" => Ok(Command::Comment {
                text: required("comment", "text", Some(rest).filter(|r| !r.is_empty()))?
                    .to_string(),
            }),
            "restart" => Ok(Command::Restart),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

fn word(rest: &str) -> Option<&str> {
    rest.split_whitespace().next()
}

fn required<'a>(
    command: &'static str,
    argument: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, CommandError> {
    value.ok_or(CommandError::MissingArgument { command, argument })
}

fn number(command: &'static str, argument: &'static str, value: &str) -> Result<usize, CommandError> {
    value.parse().map_err(|_| CommandError::Invalid {
        command,
        argument,
        value: value.to_string(),
    })
}

/// Accepts `3` or `#3`.
fn commit_id(command: &'static str, rest: &str) -> Result<CommitId, CommandError> {
    let value = required(command, "commit", word(rest))?;
    value
        .trim_start_matches('#')
        .parse::<u32>()
        .map(CommitId::new)
        .map_err(|_| CommandError::Invalid {
            command,
            argument: "commit",
            value: value.to_string(),
        })
}

/// Run `command` and describe the outcome. `Quit` is left to the caller.
pub fn execute<T: Transport<ReplaceStep>>(
    connection: &mut Connection<ReplaceStep, T>,
    command: Command,
) -> String {
    let outcome = match command {
        Command::Show => return show(connection),
        Command::Status => return status(connection),
        Command::Log => return log(connection),
        Command::Blame { pos } => return blame(connection, pos),
        Command::Help | Command::Quit => return HELP.to_string(),
        Command::Insert { pos, text } => connection
            .edit_steps([ReplaceStep::insert(pos, text)])
            .map(|_| "ok".to_string()),
        Command::Delete { from, to } => connection
            .edit_steps([ReplaceStep::delete(from, to)])
            .map(|_| "ok".to_string()),
        Command::Commit { message } => connection
            .commit(&message)
            .map(|id| format!("committed {}", id)),
        Command::Revert { commit } => connection.revert(commit).map(|reverted| {
            if reverted {
                format!("reverted {}", commit)
            } else {
                format!("{} has nothing left to revert", commit)
            }
        }),
        Command::Highlight { commit } => connection
            .highlight(HighlightMeta::Add(commit))
            .map(|_| highlighted(connection)),
        Command::Unhighlight { commit } => connection
            .highlight(HighlightMeta::Clear(commit))
            .map(|_| "ok".to_string()),
        Command::Comment { text } => connection
            .comment(json!({ "text": text }))
            .map(|_| "ok".to_string()),
        Command::Restart => {
            connection.restart();
            Ok("reloading".to_string())
        }
    };
    outcome.unwrap_or_else(|e: ConnectionError| format!("error: {}", e))
}

fn show<T: Transport<ReplaceStep>>(connection: &Connection<ReplaceStep, T>) -> String {
    match connection.edit() {
        Some(edit) => edit.doc().to_string(),
        None => "(no document)".to_string(),
    }
}

fn status<T: Transport<ReplaceStep>>(connection: &Connection<ReplaceStep, T>) -> String {
    let Some(state) = connection.sync_state() else {
        return "(closed)".to_string();
    };
    match state.edit() {
        Some(edit) => format!(
            "{:?} client={} version={} size={} uncommitted={}",
            state.comm(),
            state.client_id(),
            edit.version(),
            edit.doc().size(),
            edit.tracker().uncommitted()
        ),
        None => format!("{:?} client={}", state.comm(), state.client_id()),
    }
}

fn log<T: Transport<ReplaceStep>>(connection: &Connection<ReplaceStep, T>) -> String {
    let Some(edit) = connection.edit() else {
        return "(no document)".to_string();
    };
    let tracker = edit.tracker();
    if tracker.commits().is_empty() {
        return "(no commits)".to_string();
    }
    let mut out = String::new();
    for commit in tracker.commits().iter().rev() {
        let _ = write!(
            out,
            "{:>4} {} {}",
            commit.id().to_string(),
            commit.time().format("%H:%M:%S"),
            commit.message()
        );
        if tracker.is_reverted(commit.id()) {
            out.push_str(" (reverted)");
        }
        out.push('\n');
    }
    out.pop();
    out
}

fn blame<T: Transport<ReplaceStep>>(connection: &Connection<ReplaceStep, T>, pos: usize) -> String {
    let Some(edit) = connection.edit() else {
        return "(no document)".to_string();
    };
    match edit.blame_at(pos) {
        Some(Attribution::Commit(id)) => match edit.tracker().commit(id) {
            Some(commit) => format!("It was: {} ({})", commit.message(), id),
            None => format!("It was: {}", id),
        },
        Some(Attribution::Uncommitted) => "It was: Uncommitted".to_string(),
        Some(Attribution::Untracked) | None => "Not tracked".to_string(),
    }
}

fn highlighted<T: Transport<ReplaceStep>>(connection: &Connection<ReplaceStep, T>) -> String {
    let Some(edit) = connection.edit() else {
        return "(no document)".to_string();
    };
    let ranges: Vec<String> = edit
        .highlight()
        .ranges()
        .iter()
        .map(|r| format!("{:?}", edit.doc().slice(r.start, r.end)))
        .collect();
    if ranges.is_empty() {
        "nothing to highlight".to_string()
    } else {
        ranges.join(" ")
    }
}
