//! Interactive shell
//!
//! Line-oriented view over a single controller. Operations are spawned
//! without waiting for the item store, so several mutations can be in
//! flight at once. Every state change the controller publishes is
//! printed as it happens.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use itemsync_core::{Config, ItemsController, RemoteStore};

use super::items::{resolve_id, validate_value};
use crate::output::{Output, OutputFormat};

const HELP: &str = "\
Commands:
  add <value>          Add an item
  update <id> <value>  Change an item's value
  rm <id>              Remove an item
  reload               Fetch the collection again
  ls                   Show the current items
  help                 Show this help
  quit                 Exit";

/// A parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Add(String),
    Update(String, String),
    Remove(String),
    Reload,
    List,
    Help,
    Quit,
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<ShellCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = split_word(line);
    let command = match word {
        "add" | "a" => ShellCommand::Add(required(rest, "add <value>")?.to_string()),
        "update" | "u" | "set" => {
            let (id, value) = split_word(required(rest, "update <id> <value>")?);
            let value = required(value, "update <id> <value>")?;
            ShellCommand::Update(id.to_string(), value.to_string())
        }
        "rm" | "remove" | "delete" => {
            ShellCommand::Remove(required(rest, "rm <id>")?.to_string())
        }
        "reload" | "r" => ShellCommand::Reload,
        "ls" | "list" => ShellCommand::List,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" | "q" => ShellCommand::Quit,
        other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
    };
    Ok(Some(command))
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn required<'a>(arg: &'a str, usage: &str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(arg)
    }
}

/// Run the shell until `quit` or end of input
pub async fn run(remote: Arc<dyn RemoteStore>, config: &Config, output: &Output) -> Result<()> {
    let (controller, _initial) = ItemsController::mount(remote, config.rollback);
    let watcher = spawn_watcher(&controller, output.format);

    output.message(&format!(
        "Connected to {} (rollback: {}). Type 'help' for commands.",
        config.api_url, config.rollback
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                output.error(&e);
                continue;
            }
        };

        if command == ShellCommand::Quit {
            break;
        }
        if let Err(e) = dispatch(&controller, command, output) {
            output.error(&e.to_string());
        }
    }

    controller.teardown();
    watcher.abort();
    Ok(())
}

/// Start an operation without waiting for it to settle
fn dispatch(controller: &ItemsController, command: ShellCommand, output: &Output) -> Result<()> {
    match command {
        ShellCommand::Add(value) => {
            let value = validate_value(&value)?;
            tokio::spawn(controller.add(value));
        }
        ShellCommand::Update(id, value) => {
            let value = validate_value(&value)?;
            let id = resolve_id(&controller.state().items, &id)?;
            tokio::spawn(controller.update(id, value));
        }
        ShellCommand::Remove(id) => {
            let id = resolve_id(&controller.state().items, &id)?;
            tokio::spawn(controller.remove(id));
        }
        ShellCommand::Reload => {
            tokio::spawn(controller.reload());
        }
        ShellCommand::List => output.print_items(&controller.state().items),
        ShellCommand::Help => output.message(HELP),
        ShellCommand::Quit => {}
    }
    Ok(())
}

/// Print every state the controller publishes
fn spawn_watcher(controller: &ItemsController, format: OutputFormat) -> JoinHandle<()> {
    let mut rx = controller.subscribe();
    tokio::spawn(async move {
        let output = Output::new(format);
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            output.print_state_change(&state);
        }
    })
}
