//! Data models for itemsync
//!
//! Defines the item record, its identifier, and the collection state
//! published to the view layer.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix that marks a locally generated, unconfirmed identifier
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Identifier of an item
///
/// Server-assigned for confirmed items. Items that were added optimistically
/// carry a temporary identifier (see [`ItemId::temporary`]) until the next
/// reload replaces them with the server's version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Wrap a server-assigned identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh temporary identifier
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()))
    }

    /// Whether this identifier was generated locally for an unconfirmed item
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single persisted record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    /// Unique identifier within the collection
    #[serde(rename = "item_id")]
    pub id: ItemId,
    /// Item content
    pub value: String,
    /// Creation time, milliseconds since epoch
    pub created_at: i64,
    /// Last update time, milliseconds since epoch
    pub updated_at: i64,
}

impl Item {
    /// Create an item with a server-assigned ID (for loading from the remote store)
    pub fn with_id(id: impl Into<ItemId>, value: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Create an unconfirmed item with a temporary ID, stamped with the current time
    pub fn optimistic(value: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: ItemId::temporary(),
            value: value.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the value and bump the update time
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.updated_at = now_millis();
    }

    /// Whether this item has not been confirmed by the remote store yet
    pub fn is_pending(&self) -> bool {
        self.id.is_temporary()
    }
}

/// The state a controller publishes to its view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionState {
    /// Items in insertion/reload order
    pub items: Vec<Item>,
    /// A fetch-all is in flight
    pub loading: bool,
    /// A mutation (add, update, remove) is in flight
    pub saving: bool,
    /// Message of the most recent failure
    pub error: Option<String>,
}

impl CollectionState {
    /// Look up an item by ID
    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Position of an item in the collection
    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    /// Number of optimistic items still awaiting confirmation
    pub fn pending_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_pending()).count()
    }

    pub fn is_busy(&self) -> bool {
        self.loading || self.saving
    }
}

/// Current time in milliseconds since epoch
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
