//! itemsync Core Library
//!
//! This crate keeps a local, user-visible collection of items consistent
//! with a remote authoritative store, hiding network latency through
//! optimistic mutation.
//!
//! # Architecture
//!
//! - **Remote store**: the source of truth, reached through the
//!   [`RemoteStore`] trait
//! - **Controller**: owns the local [`CollectionState`], applies mutations
//!   immediately and reconciles or rolls back once the store answers
//!
//! # Quick Start
//!
//! ```text
//! let remote = Arc::new(HttpRemoteStore::from_config(&config)?);
//! let (controller, initial) = ItemsController::mount(remote, config.rollback);
//! initial.await?;
//!
//! controller.add("Buy milk").await;
//! let items = controller.state().items;
//! ```
//!
//! # Modules
//!
//! - `controller`: Optimistic synchronization (main entry point)
//! - `models`: Items, identifiers and the published collection state
//! - `remote`: Remote store trait and the HTTP implementation
//! - `config`: Application configuration

pub mod config;
pub mod controller;
pub mod models;
pub mod remote;

pub use config::Config;
pub use controller::{ItemsController, Outcome, RollbackPolicy};
pub use models::{CollectionState, Item, ItemId};
pub use remote::{HttpRemoteStore, RemoteStore, TransportError};
