use std::sync::Arc;

use async_trait::async_trait;

use crate::models::SignalEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    Producer,
    Consumer,
}

/// A long-running unit driven by the lifecycle coordinator.
#[async_trait]
pub trait Subsystem: Send + Sync {
    fn kind(&self) -> SubsystemKind;

    /// The main loop. Returns once the subsystem has been stopped or has
    /// failed; errors are logged by the coordinator and never cancel siblings.
    async fn run(&self) -> anyhow::Result<()>;

    /// Asks the main loop to wind down. Must be idempotent and safe to call
    /// when `run` already returned or never started.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Callback invoked by a producer for every emitted event, in emission order.
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn on_signal(&self, event: Arc<SignalEvent>);
}

/// A subsystem that emits signal events to a registered callback.
pub trait Producer: Subsystem {
    /// Replaces any previously registered callback.
    fn register_callback(&self, handler: Arc<dyn SignalHandler>);
}
