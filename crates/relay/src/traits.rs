use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use common::errors::{DeliveryError, RenderError};
use common::models::{SignalEvent, SubscriberId};

/// Push transport. One call delivers one payload to one recipient.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, recipient: SubscriberId, payload: &str) -> Result<(), DeliveryError>;
}

/// Turns an event into the payload sent to one recipient.
pub trait SignalRenderer: Send + Sync {
    fn render(&self, event: &SignalEvent, recipient: SubscriberId) -> Result<String, RenderError>;
}
