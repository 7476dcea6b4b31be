//! Item command handlers
//!
//! Each command mounts a controller, waits for the initial load, runs
//! a single operation and prints the settled collection.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use itemsync_core::{Config, Item, ItemId, ItemsController, Outcome, RemoteStore};

use crate::output::Output;

/// Mount a controller and wait for the initial load
pub async fn open(remote: Arc<dyn RemoteStore>, config: &Config) -> Result<ItemsController> {
    let (controller, initial) = ItemsController::mount(remote, config.rollback);
    let outcome = initial.await.context("Initial load task failed")?;

    if let Outcome::Failed(message) = outcome {
        bail!("Failed to load items from {}: {}", config.api_url, message);
    }
    Ok(controller)
}

/// List all items
pub async fn list(remote: Arc<dyn RemoteStore>, config: &Config, output: &Output) -> Result<()> {
    let controller = open(remote, config).await?;
    output.print_items(&controller.state().items);
    Ok(())
}

/// Add a new item
pub async fn add(
    remote: Arc<dyn RemoteStore>,
    config: &Config,
    value: String,
    output: &Output,
) -> Result<()> {
    let value = validate_value(&value)?;
    let controller = open(remote, config).await?;

    let outcome = controller.add(value).await;
    finish(&controller, outcome, "Added item", output)
}

/// Change the value of an item
pub async fn update(
    remote: Arc<dyn RemoteStore>,
    config: &Config,
    id: String,
    value: String,
    output: &Output,
) -> Result<()> {
    let value = validate_value(&value)?;
    let controller = open(remote, config).await?;
    let id = resolve_id(&controller.state().items, &id)?;

    let outcome = controller.update(id.clone(), value).await;
    finish(&controller, outcome, &format!("Updated item {}", id), output)
}

/// Delete an item
pub async fn remove(
    remote: Arc<dyn RemoteStore>,
    config: &Config,
    id: String,
    output: &Output,
) -> Result<()> {
    let controller = open(remote, config).await?;
    let id = resolve_id(&controller.state().items, &id)?;

    let outcome = controller.remove(id.clone()).await;
    finish(&controller, outcome, &format!("Removed item {}", id), output)
}

/// Reload the collection explicitly
pub async fn reload(remote: Arc<dyn RemoteStore>, config: &Config, output: &Output) -> Result<()> {
    let controller = ItemsController::new(remote, config.rollback);

    let outcome = controller.reload().await;
    finish(&controller, outcome, "Reloaded items", output)
}

fn finish(
    controller: &ItemsController,
    outcome: Outcome,
    message: &str,
    output: &Output,
) -> Result<()> {
    match outcome {
        Outcome::Settled => {
            output.print_result(message, &controller.state());
            Ok(())
        }
        Outcome::Failed(error) => bail!("{}", error),
        Outcome::Detached => bail!("Operation abandoned before the item store answered"),
    }
}

/// Reject values the item store would only store as blanks
pub fn validate_value(value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        bail!("Item value cannot be empty");
    }
    Ok(value.to_string())
}

/// Resolve a full ID or unique ID prefix against the loaded items
///
/// Input that matches nothing is passed through unchanged so the item
/// store can answer for it.
pub fn resolve_id(items: &[Item], input: &str) -> Result<ItemId> {
    let input = input.trim();
    if input.is_empty() {
        bail!("Item ID cannot be empty");
    }

    if items.iter().any(|item| item.id.as_str() == input) {
        return Ok(ItemId::new(input));
    }

    let matches: Vec<_> = items
        .iter()
        .filter(|item| item.id.as_str().starts_with(input))
        .collect();

    match matches.len() {
        0 => Ok(ItemId::new(input)),
        1 => Ok(matches[0].id.clone()),
        _ => {
            eprintln!("Multiple items match '{}':", input);
            for item in &matches {
                eprintln!("  {} - {}", item.id, item.value);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
