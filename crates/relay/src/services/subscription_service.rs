use std::sync::Arc;

use tracing::info;

use common::models::SubscriberId;

use crate::registry::SubscriberRegistry;

/// Mutation surface handed to the command-dispatch side. It never broadcasts.
#[derive(Debug, Clone)]
pub struct SubscriptionService {
    registry: Arc<SubscriberRegistry>,
}

impl SubscriptionService {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    /// Returns `true` for a new subscription, `false` if already subscribed.
    pub fn subscribe(&self, id: SubscriberId) -> bool {
        let added = self.registry.add(id);
        if added {
            info!(subscriber = %id, total = self.registry.len(), "Added subscriber");
        }
        added
    }

    /// Returns `true` if `id` was subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.registry.remove(id);
        if removed {
            info!(subscriber = %id, total = self.registry.len(), "Removed subscriber");
        }
        removed
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.registry.contains(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }
}
