pub mod actors;
pub mod registry;
pub mod services;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use actors::coordinator::{LifecycleCoordinator, LifecycleState, ShutdownReport};
pub use registry::{Snapshot, SubscriberRegistry};
pub use services::broadcaster::{BroadcastReport, SignalBroadcaster};
pub use services::subscription_service::SubscriptionService;
