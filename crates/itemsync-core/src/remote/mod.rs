//! Remote item store
//!
//! The controller only talks to the authoritative store through the
//! [`RemoteStore`] trait. Each call is a single attempt that either
//! completes or fails with a [`TransportError`].
//!
//! ## Implementations
//!
//! - [`HttpRemoteStore`]: JSON over HTTP (`GET/POST /items`,
//!   `PUT/DELETE /items/{id}`)

pub mod error;
pub mod http;

use async_trait::async_trait;

use crate::models::{Item, ItemId};

pub use error::TransportError;
pub use http::HttpRemoteStore;

/// Result type for remote store operations
pub type TransportResult<T> = Result<T, TransportError>;

/// The authoritative item store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the full collection, in the store's order
    async fn fetch_all(&self) -> TransportResult<Vec<Item>>;

    /// Create an item; the store assigns its ID and timestamps
    async fn create(&self, value: &str) -> TransportResult<()>;

    /// Replace the value of an existing item
    async fn update(&self, id: &ItemId, value: &str) -> TransportResult<()>;

    /// Delete an item
    async fn delete(&self, id: &ItemId) -> TransportResult<()>;
}
