//! Synchronized collection controller
//!
//! `ItemsController` owns the local view of the remote collection and
//! applies every mutation optimistically:
//!
//! 1. The local change is made as soon as the operation is called, before
//!    any network activity, and published to subscribers.
//! 2. The returned future performs the remote call.
//! 3. On success the collection is reconciled with a full reload (`add`,
//!    `update`); a delete is locally authoritative and needs none.
//! 4. On failure the optimistic change is rolled back and the failure
//!    message is stored in `error`.
//!
//! ## Usage
//!
//! ```ignore
//! let (controller, initial) = ItemsController::mount(remote, RollbackPolicy::default());
//! initial.await?;
//!
//! // Optimistic item is visible immediately
//! let pending = controller.add("Buy milk");
//! assert_eq!(controller.state().pending_count(), 1);
//! pending.await;
//! ```
//!
//! Handles are cheap to clone; every clone drives the same state. The
//! futures returned by the operations are `'static`, so a view can
//! `tokio::spawn` them and keep accepting input while they are in flight.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{CollectionState, Item, ItemId};
use crate::remote::RemoteStore;

/// How a failed update or remove is undone
///
/// Mutations are not serialized against each other, so two of them can be
/// pending at once. Restoring a whole snapshot also discards the other
/// mutation's optimistic change; restoring a single item does not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Restore the entire collection as it was when the mutation started
    #[default]
    Snapshot,
    /// Revert only the item the failed mutation targeted
    PerItem,
}

impl RollbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackPolicy::Snapshot => "snapshot",
            RollbackPolicy::PerItem => "per_item",
        }
    }
}

impl fmt::Display for RollbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RollbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "snapshot" => Ok(RollbackPolicy::Snapshot),
            "per_item" | "item" => Ok(RollbackPolicy::PerItem),
            other => Err(format!(
                "Unknown rollback policy '{}'. Use 'snapshot' or 'per_item'.",
                other
            )),
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The remote store accepted the operation and local state reflects it
    Settled,
    /// The remote call failed; the message is also published as `error`
    Failed(String),
    /// The controller was torn down before the response arrived
    Detached,
}

impl Outcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, Outcome::Settled)
    }

    /// The failure message, if the operation failed
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationKind {
    Add,
    Update,
    Remove,
}

impl MutationKind {
    fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Add => "add",
            MutationKind::Update => "update",
            MutationKind::Remove => "remove",
        }
    }
}

/// An optimistic mutation awaiting the remote store's answer
///
/// Holds the collection as it was immediately before the local change.
/// Consumed exactly once, either by `settle` or by `roll_back`.
#[derive(Debug)]
struct PendingMutation {
    kind: MutationKind,
    target: ItemId,
    snapshot: Vec<Item>,
}

impl PendingMutation {
    fn settle(self) {
        debug!("{} of {} settled", self.kind.as_str(), self.target);
    }

    /// Undo the optimistic change on the current item list
    fn roll_back(self, items: &mut Vec<Item>, policy: RollbackPolicy) {
        match (self.kind, policy) {
            // The optimistic item is the only one carrying its temporary ID
            (MutationKind::Add, _) => items.retain(|item| item.id != self.target),
            (MutationKind::Update | MutationKind::Remove, RollbackPolicy::Snapshot) => {
                *items = self.snapshot;
            }
            (MutationKind::Update, RollbackPolicy::PerItem) => {
                let original = self.snapshot.into_iter().find(|item| item.id == self.target);
                if let Some(original) = original {
                    if let Some(current) = items.iter_mut().find(|item| item.id == self.target) {
                        *current = original;
                    }
                }
            }
            (MutationKind::Remove, RollbackPolicy::PerItem) => {
                if items.iter().any(|item| item.id == self.target) {
                    return;
                }
                let original = self
                    .snapshot
                    .into_iter()
                    .enumerate()
                    .find(|(_, item)| item.id == self.target);
                if let Some((index, original)) = original {
                    let index = index.min(items.len());
                    items.insert(index, original);
                }
            }
        }
    }
}

struct Inner {
    remote: Arc<dyn RemoteStore>,
    state: watch::Sender<CollectionState>,
    policy: RollbackPolicy,
    detached: AtomicBool,
}

impl Inner {
    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Apply a change to the state and notify subscribers
    ///
    /// Returns false, without touching the state, once torn down.
    fn publish(&self, change: impl FnOnce(&mut CollectionState)) -> bool {
        if self.is_detached() {
            return false;
        }
        self.state.send_modify(change);
        true
    }

    /// Synchronous half of a reload
    fn begin_load(&self) -> bool {
        self.publish(|state| {
            state.loading = true;
            state.error = None;
        })
    }

    /// Asynchronous half of a reload: fetch and replace the collection wholesale
    async fn finish_load(&self) -> Outcome {
        let result = self.remote.fetch_all().await;

        if self.is_detached() {
            debug!("Ignoring fetch result after teardown");
            return Outcome::Detached;
        }

        match result {
            Ok(items) => {
                info!("Loaded {} item(s)", items.len());
                self.publish(|state| {
                    state.items = items;
                    state.loading = false;
                });
                Outcome::Settled
            }
            Err(e) => {
                let message = e.message();
                warn!("Failed to load items: {}", message);
                self.publish(|state| {
                    state.error = Some(message.clone());
                    state.loading = false;
                });
                Outcome::Failed(message)
            }
        }
    }

    /// Synchronous half of a mutation
    ///
    /// Captures the snapshot and applies the optimistic change in a single
    /// state update, then marks the controller as saving.
    fn begin_mutation(
        &self,
        kind: MutationKind,
        target: ItemId,
        apply: impl FnOnce(&mut Vec<Item>),
    ) -> Option<PendingMutation> {
        let mut snapshot = None;
        let applied = self.publish(|state| {
            snapshot = Some(state.items.clone());
            apply(&mut state.items);
            state.saving = true;
            state.error = None;
        });
        if !applied {
            return None;
        }

        debug!("{} of {} pending", kind.as_str(), target);
        snapshot.map(|snapshot| PendingMutation {
            kind,
            target,
            snapshot,
        })
    }

    fn roll_back(&self, pending: PendingMutation, message: String) -> Outcome {
        warn!(
            "{} of {} failed, rolling back: {}",
            pending.kind.as_str(),
            pending.target,
            message
        );
        let policy = self.policy;
        self.publish(|state| {
            pending.roll_back(&mut state.items, policy);
            state.error = Some(message.clone());
        });
        Outcome::Failed(message)
    }

    fn finish_saving(&self) {
        self.publish(|state| state.saving = false);
    }
}

/// Keeps a local collection in step with a remote item store
#[derive(Clone)]
pub struct ItemsController {
    inner: Arc<Inner>,
}

impl ItemsController {
    /// Create an idle controller with an empty collection
    ///
    /// Nothing is fetched until `reload` is called. Use [`ItemsController::mount`]
    /// to start the initial load right away.
    pub fn new(remote: Arc<dyn RemoteStore>, policy: RollbackPolicy) -> Self {
        let (state, _) = watch::channel(CollectionState::default());
        Self {
            inner: Arc::new(Inner {
                remote,
                state,
                policy,
                detached: AtomicBool::new(false),
            }),
        }
    }

    /// Create a controller and start the initial load
    ///
    /// `loading` is already true when this returns. The handle resolves
    /// once the first fetch has settled. Must be called within a tokio runtime.
    pub fn mount(
        remote: Arc<dyn RemoteStore>,
        policy: RollbackPolicy,
    ) -> (Self, JoinHandle<Outcome>) {
        let controller = Self::new(remote, policy);
        let initial = tokio::spawn(controller.reload());
        (controller, initial)
    }

    /// The current state
    pub fn state(&self) -> CollectionState {
        self.inner.state.borrow().clone()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.inner.state.subscribe()
    }

    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.inner.policy
    }

    /// Detach from the view
    ///
    /// Responses that arrive afterwards are dropped and the state is
    /// never changed again.
    pub fn teardown(&self) {
        if !self.inner.detached.swap(true, Ordering::AcqRel) {
            info!("Controller torn down");
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.is_detached()
    }

    /// Replace the collection with the remote store's contents
    ///
    /// Sets `loading` and clears `error` immediately. On failure the items
    /// are left as they were.
    pub fn reload(&self) -> impl Future<Output = Outcome> + Send + 'static {
        let inner = Arc::clone(&self.inner);
        let started = inner.begin_load();

        async move {
            if !started {
                return Outcome::Detached;
            }
            inner.finish_load().await
        }
    }

    /// Append a new item
    ///
    /// An optimistic item with a temporary ID is appended immediately. On
    /// success the collection is reloaded so the server's item replaces it;
    /// on failure the optimistic item is removed again.
    pub fn add(&self, value: impl Into<String>) -> impl Future<Output = Outcome> + Send + 'static {
        let value = value.into();
        let inner = Arc::clone(&self.inner);

        let optimistic = Item::optimistic(value.clone());
        let target = optimistic.id.clone();
        let pending = inner.begin_mutation(MutationKind::Add, target, move |items| {
            items.push(optimistic);
        });

        async move {
            let Some(pending) = pending else {
                return Outcome::Detached;
            };

            let result = inner.remote.create(&value).await;
            if inner.is_detached() {
                return Outcome::Detached;
            }

            let outcome = match result {
                Ok(()) => {
                    pending.settle();
                    inner.begin_load();
                    inner.finish_load().await
                }
                Err(e) => inner.roll_back(pending, e.message()),
            };

            inner.finish_saving();
            outcome
        }
    }

    /// Change the value of an item
    ///
    /// The value and update time are replaced in place immediately. If no
    /// item has this ID the local change is a no-op, but the remote call
    /// is still made.
    pub fn update(
        &self,
        id: impl Into<ItemId>,
        value: impl Into<String>,
    ) -> impl Future<Output = Outcome> + Send + 'static {
        let id = id.into();
        let value = value.into();
        let inner = Arc::clone(&self.inner);

        let local_id = id.clone();
        let local_value = value.clone();
        let pending = inner.begin_mutation(MutationKind::Update, id.clone(), move |items| {
            if let Some(item) = items.iter_mut().find(|item| item.id == local_id) {
                item.set_value(local_value);
            }
        });

        async move {
            let Some(pending) = pending else {
                return Outcome::Detached;
            };

            let result = inner.remote.update(&id, &value).await;
            if inner.is_detached() {
                return Outcome::Detached;
            }

            let outcome = match result {
                Ok(()) => {
                    pending.settle();
                    inner.begin_load();
                    inner.finish_load().await
                }
                Err(e) => inner.roll_back(pending, e.message()),
            };

            inner.finish_saving();
            outcome
        }
    }

    /// Delete an item
    ///
    /// The item disappears immediately. A successful delete is not
    /// followed by a reload.
    pub fn remove(&self, id: impl Into<ItemId>) -> impl Future<Output = Outcome> + Send + 'static {
        let id = id.into();
        let inner = Arc::clone(&self.inner);

        let local_id = id.clone();
        let pending = inner.begin_mutation(MutationKind::Remove, id.clone(), move |items| {
            items.retain(|item| item.id != local_id);
        });

        async move {
            let Some(pending) = pending else {
                return Outcome::Detached;
            };

            let result = inner.remote.delete(&id).await;
            if inner.is_detached() {
                return Outcome::Detached;
            }

            let outcome = match result {
                Ok(()) => {
                    pending.settle();
                    Outcome::Settled
                }
                Err(e) => inner.roll_back(pending, e.message()),
            };

            inner.finish_saving();
            outcome
        }
    }
}

impl fmt::Debug for ItemsController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemsController")
            .field("state", &*self.inner.state.borrow())
            .field("policy", &self.inner.policy)
            .field("detached", &self.inner.is_detached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::remote::{TransportError, TransportResult};

    /// In-memory store with switchable failures and call recording
    #[derive(Default)]
    struct MockStore {
        items: Mutex<Vec<Item>>,
        next_id: AtomicUsize,
        fail_fetch: Mutex<Option<String>>,
        fail_create: Mutex<Option<String>>,
        fail_update: Mutex<Option<String>>,
        fail_delete: Mutex<Option<String>>,
        fetch_calls: AtomicUsize,
        created: Mutex<Vec<String>>,
        updated: Mutex<Vec<(ItemId, String)>>,
        deleted: Mutex<Vec<ItemId>>,
    }

    impl MockStore {
        fn seeded() -> Arc<Self> {
            let store = Self::default();
            *store.items.lock().unwrap() = vec![
                Item::with_id("1", "Test Item 1", 1000),
                Item::with_id("2", "Test Item 2", 2000),
            ];
            store.next_id.store(2, Ordering::SeqCst);
            Arc::new(store)
        }

        fn fail(slot: &Mutex<Option<String>>, message: &str) {
            *slot.lock().unwrap() = Some(message.to_string());
        }

        fn heal(slot: &Mutex<Option<String>>) {
            *slot.lock().unwrap() = None;
        }

        fn check(slot: &Mutex<Option<String>>) -> TransportResult<()> {
            match slot.lock().unwrap().clone() {
                Some(message) => Err(TransportError::other(message)),
                None => Ok(()),
            }
        }

        fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteStore for MockStore {
        async fn fetch_all(&self) -> TransportResult<Vec<Item>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Self::check(&self.fail_fetch)?;
            Ok(self.items.lock().unwrap().clone())
        }

        async fn create(&self, value: &str) -> TransportResult<()> {
            self.created.lock().unwrap().push(value.to_string());
            Self::check(&self.fail_create)?;
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.items
                .lock()
                .unwrap()
                .push(Item::with_id(id.to_string(), value, 5000));
            Ok(())
        }

        async fn update(&self, id: &ItemId, value: &str) -> TransportResult<()> {
            self.updated
                .lock()
                .unwrap()
                .push((id.clone(), value.to_string()));
            Self::check(&self.fail_update)?;
            if let Some(item) = self.items.lock().unwrap().iter_mut().find(|i| &i.id == id) {
                item.value = value.to_string();
                item.updated_at = 6000;
            }
            Ok(())
        }

        async fn delete(&self, id: &ItemId) -> TransportResult<()> {
            self.deleted.lock().unwrap().push(id.clone());
            Self::check(&self.fail_delete)?;
            self.items.lock().unwrap().retain(|i| &i.id != id);
            Ok(())
        }
    }

    async fn mounted(store: &Arc<MockStore>, policy: RollbackPolicy) -> ItemsController {
        let (controller, initial) = ItemsController::mount(store.clone(), policy);
        assert_eq!(initial.await.unwrap(), Outcome::Settled);
        controller
    }

    fn values(controller: &ItemsController) -> Vec<String> {
        controller
            .state()
            .items
            .into_iter()
            .map(|item| item.value)
            .collect()
    }

    fn ids(controller: &ItemsController) -> Vec<String> {
        controller
            .state()
            .items
            .into_iter()
            .map(|item| item.id.to_string())
            .collect()
    }

    // ==================== Loading ====================

    #[tokio::test]
    async fn test_loads_items_on_mount() {
        let store = MockStore::seeded();
        let (controller, initial) = ItemsController::mount(store.clone(), RollbackPolicy::default());

        let state = controller.state();
        assert!(state.loading);
        assert!(state.items.is_empty());

        assert_eq!(initial.await.unwrap(), Outcome::Settled);

        let state = controller.state();
        assert!(!state.loading);
        assert_eq!(state.items, *store.items.lock().unwrap());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_load_failure() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_fetch, "Failed to load");

        let (controller, initial) = ItemsController::mount(store.clone(), RollbackPolicy::default());
        assert_eq!(
            initial.await.unwrap(),
            Outcome::Failed("Failed to load".to_string())
        );

        let state = controller.state();
        assert!(!state.loading);
        assert!(state.items.is_empty());
        assert_eq!(state.error.as_deref(), Some("Failed to load"));
    }

    #[tokio::test]
    async fn test_reload_failure_keeps_items() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        MockStore::fail(&store.fail_fetch, "Network down");
        let outcome = controller.reload().await;

        assert_eq!(outcome.error(), Some("Network down"));
        assert_eq!(ids(&controller), vec!["1", "2"]);
        assert!(!controller.state().loading);
    }

    #[tokio::test]
    async fn test_mount_and_reload_fetch_twice() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        assert!(controller.reload().await.is_settled());
        assert_eq!(store.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_reload_replaces_items_wholesale() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        *store.items.lock().unwrap() = vec![Item::with_id("9", "Only", 9000)];
        controller.reload().await;

        assert_eq!(ids(&controller), vec!["9"]);
    }

    #[tokio::test]
    async fn test_new_controller_is_idle() {
        let store = MockStore::seeded();
        let controller = ItemsController::new(store.clone(), RollbackPolicy::default());

        assert_eq!(controller.state(), CollectionState::default());
        assert_eq!(store.fetch_calls(), 0);
    }

    // ==================== Add ====================

    #[tokio::test]
    async fn test_add_is_visible_before_create_resolves() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;
        let before = controller.state().items.len();

        let pending = controller.add("New Item");

        let state = controller.state();
        assert_eq!(state.items.len(), before + 1);
        let last = state.items.last().unwrap();
        assert_eq!(last.value, "New Item");
        assert!(last.id.as_str().starts_with("temp-"));
        assert!(state.saving);

        assert!(pending.await.is_settled());
    }

    #[tokio::test]
    async fn test_add_success_reconciles_with_reload() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        assert!(controller.add("New").await.is_settled());

        let state = controller.state();
        assert_eq!(state.items, *store.items.lock().unwrap());
        assert_eq!(ids(&controller), vec!["1", "2", "3"]);
        assert_eq!(state.pending_count(), 0);
        assert!(!state.saving);
        assert!(!state.loading);
        assert_eq!(*store.created.lock().unwrap(), vec!["New".to_string()]);
        assert_eq!(store.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_add_failure_removes_optimistic_item() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_create, "Failed to create");
        let controller = mounted(&store, RollbackPolicy::default()).await;
        let before = controller.state().items.len();

        let outcome = controller.add("New Item").await;

        assert_eq!(outcome, Outcome::Failed("Failed to create".to_string()));
        let state = controller.state();
        assert_eq!(state.items.len(), before);
        assert_eq!(state.pending_count(), 0);
        assert_eq!(state.error.as_deref(), Some("Failed to create"));
        assert!(!state.saving);
        assert_eq!(store.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_add_failure_keeps_item_with_same_value() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        MockStore::fail(&store.fail_create, "Duplicate");
        controller.add("Test Item 1").await;

        assert_eq!(values(&controller), vec!["Test Item 1", "Test Item 2"]);
    }

    #[tokio::test]
    async fn test_overlapping_adds_roll_back_independently() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        MockStore::fail(&store.fail_create, "Failed to create");
        let first = controller.add("A");
        let second = controller.add("B");
        assert_eq!(controller.state().pending_count(), 2);

        first.await;
        assert_eq!(values(&controller), vec!["Test Item 1", "Test Item 2", "B"]);
        second.await;
        assert_eq!(values(&controller), vec!["Test Item 1", "Test Item 2"]);
    }

    // ==================== Update ====================

    #[tokio::test]
    async fn test_update_is_visible_immediately() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        let pending = controller.update("1", "Updated Item");

        let state = controller.state();
        let item = state.get(&"1".into()).unwrap();
        assert_eq!(item.value, "Updated Item");
        assert!(item.updated_at > 1000);
        assert_eq!(state.get(&"2".into()).unwrap().value, "Test Item 2");
        assert!(state.saving);

        assert!(pending.await.is_settled());
        assert_eq!(
            *store.updated.lock().unwrap(),
            vec![(ItemId::new("1"), "Updated Item".to_string())]
        );
    }

    #[tokio::test]
    async fn test_update_success_takes_server_fields() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        controller.update("1", "Updated Item").await;

        let state = controller.state();
        assert_eq!(state.get(&"1".into()).unwrap().updated_at, 6000);
        assert!(!state.saving);
        assert_eq!(store.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_update_failure_restores_value() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_update, "Failed to update");
        let controller = mounted(&store, RollbackPolicy::default()).await;
        let original = controller.state();

        let outcome = controller.update("1", "Updated Item").await;

        assert_eq!(outcome.error(), Some("Failed to update"));
        let state = controller.state();
        assert_eq!(state.items, original.items);
        assert_eq!(state.error.as_deref(), Some("Failed to update"));
        assert!(!state.saving);
    }

    #[tokio::test]
    async fn test_update_unknown_id_still_calls_remote() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;
        let original = controller.state().items;

        let pending = controller.update("missing", "x");
        assert_eq!(controller.state().items, original);
        pending.await;

        assert_eq!(store.updated.lock().unwrap().len(), 1);
    }

    // ==================== Remove ====================

    #[tokio::test]
    async fn test_remove_is_visible_immediately() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        let pending = controller.remove("1");

        let state = controller.state();
        assert_eq!(state.items.len(), 1);
        assert!(state.get(&"1".into()).is_none());

        assert!(pending.await.is_settled());
        assert_eq!(*store.deleted.lock().unwrap(), vec![ItemId::new("1")]);
    }

    #[tokio::test]
    async fn test_remove_success_does_not_reload() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        controller.remove("1").await;

        assert_eq!(store.fetch_calls(), 1);
        assert_eq!(ids(&controller), vec!["2"]);
        assert!(!controller.state().saving);
    }

    #[tokio::test]
    async fn test_remove_failure_restores_position() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_delete, "Failed to delete");
        let controller = mounted(&store, RollbackPolicy::default()).await;

        let outcome = controller.remove("1").await;

        assert_eq!(outcome.error(), Some("Failed to delete"));
        assert_eq!(ids(&controller), vec!["1", "2"]);
        assert_eq!(
            controller.state().error.as_deref(),
            Some("Failed to delete")
        );
    }

    // ==================== Errors ====================

    #[tokio::test]
    async fn test_new_operation_clears_previous_error() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;

        MockStore::fail(&store.fail_delete, "First failure");
        controller.remove("1").await;
        assert_eq!(controller.state().error.as_deref(), Some("First failure"));

        MockStore::fail(&store.fail_update, "Second failure");
        let pending = controller.update("2", "x");
        assert!(controller.state().error.is_none());
        pending.await;
        assert_eq!(controller.state().error.as_deref(), Some("Second failure"));

        let pending = controller.reload();
        assert!(controller.state().error.is_none());
        pending.await;
        assert!(controller.state().error.is_none());

        MockStore::fail(&store.fail_create, "Third failure");
        controller.add("y").await;
        let pending = controller.add("z");
        assert!(controller.state().error.is_none());
        pending.await;

        MockStore::heal(&store.fail_create);
        controller.add("w").await;
        assert!(controller.state().error.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_optimistic_change() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;
        let mut rx = controller.subscribe();
        rx.borrow_and_update();

        let pending = controller.add("Watched");
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().items.last().unwrap().value, "Watched");

        pending.await;
        assert!(rx.has_changed().unwrap());
    }

    // ==================== Overlapping rollbacks ====================

    #[tokio::test]
    async fn test_snapshot_rollback_can_discard_other_pending_change() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_update, "Failed to update");
        MockStore::fail(&store.fail_delete, "Failed to delete");
        let controller = mounted(&store, RollbackPolicy::Snapshot).await;

        let update = controller.update("1", "Changed");
        let remove = controller.remove("2");

        update.await;
        // The update's snapshot predates the remove, so item 2 is back
        assert_eq!(values(&controller), vec!["Test Item 1", "Test Item 2"]);

        remove.await;
        // The remove's snapshot still carries the failed update's value
        assert_eq!(values(&controller), vec!["Changed", "Test Item 2"]);
        assert_eq!(
            controller.state().error.as_deref(),
            Some("Failed to delete")
        );
    }

    #[tokio::test]
    async fn test_per_item_rollback_reverts_only_target() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_update, "Failed to update");
        MockStore::fail(&store.fail_delete, "Failed to delete");
        let controller = mounted(&store, RollbackPolicy::PerItem).await;

        let update = controller.update("1", "Changed");
        let remove = controller.remove("2");

        update.await;
        // Item 2 stays removed while its delete is pending
        assert_eq!(values(&controller), vec!["Test Item 1"]);

        remove.await;
        assert_eq!(values(&controller), vec!["Test Item 1", "Test Item 2"]);
    }

    #[tokio::test]
    async fn test_per_item_remove_rollback_clamps_position() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::PerItem).await;

        let remove = controller.remove("2");
        controller.remove("1").await;
        MockStore::fail(&store.fail_delete, "Failed to delete");
        remove.await;

        assert_eq!(ids(&controller), vec!["2"]);
    }

    #[test]
    fn test_roll_back_add_ignores_policy() {
        for policy in [RollbackPolicy::Snapshot, RollbackPolicy::PerItem] {
            let temp = Item::optimistic("temp");
            let pending = PendingMutation {
                kind: MutationKind::Add,
                target: temp.id.clone(),
                snapshot: Vec::new(),
            };
            let mut items = vec![Item::with_id("1", "one", 1), temp];

            pending.roll_back(&mut items, policy);
            assert_eq!(items, vec![Item::with_id("1", "one", 1)]);
        }
    }

    // ==================== Teardown ====================

    #[tokio::test]
    async fn test_response_after_teardown_is_ignored() {
        let store = MockStore::seeded();
        MockStore::fail(&store.fail_create, "Failed to create");
        let controller = mounted(&store, RollbackPolicy::default()).await;

        let pending = controller.add("Late");
        let before = controller.state();
        controller.teardown();

        assert_eq!(pending.await, Outcome::Detached);
        assert_eq!(controller.state(), before);
        assert!(controller.is_torn_down());
    }

    #[tokio::test]
    async fn test_operations_after_teardown_do_nothing() {
        let store = MockStore::seeded();
        let controller = mounted(&store, RollbackPolicy::default()).await;
        let before = controller.state();
        controller.teardown();

        assert_eq!(controller.add("x").await, Outcome::Detached);
        assert_eq!(controller.remove("1").await, Outcome::Detached);
        assert_eq!(controller.reload().await, Outcome::Detached);

        assert_eq!(controller.state(), before);
        assert_eq!(store.fetch_calls(), 1);
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rollback_policy_parsing() {
        assert_eq!(
            "snapshot".parse::<RollbackPolicy>(),
            Ok(RollbackPolicy::Snapshot)
        );
        assert_eq!(
            "per_item".parse::<RollbackPolicy>(),
            Ok(RollbackPolicy::PerItem)
        );
        assert_eq!(
            "Per-Item".parse::<RollbackPolicy>(),
            Ok(RollbackPolicy::PerItem)
        );
        assert!("merge".parse::<RollbackPolicy>().is_err());
        assert_eq!(RollbackPolicy::PerItem.to_string(), "per_item");
    }
}
