use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use common::models::SubscriberId;

/// Point-in-time copy of the registry, sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Arc<[SubscriberId]>);

impl Deref for Snapshot {
    type Target = [SubscriberId];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Live set of push recipients shared by the broadcaster and the consumer side.
///
/// Every operation takes the lock for its whole duration, so a snapshot never
/// observes a half-applied mutation.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    ids: RwLock<BTreeSet<SubscriberId>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when `id` was not yet subscribed.
    pub fn add(&self, id: SubscriberId) -> bool {
        let inserted = self.ids.write().insert(id);
        if inserted {
            debug!(subscriber = %id, "Subscriber added");
        }
        inserted
    }

    /// Returns `true` when `id` was subscribed. Removing an absent id is a no-op.
    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.ids.write().remove(&id);
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    pub fn snapshot(&self) -> Snapshot {
        let ids = self.ids.read();
        Snapshot(ids.iter().copied().collect())
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.ids.read().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}
