use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use common::errors::ProductionError;
use common::models::SignalEvent;

/// Analysis/data-fetch collaborator polled by the scanner once per cycle.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Signals produced since the previous call, oldest first.
    async fn scan(&self) -> Result<Vec<SignalEvent>, ProductionError>;
}
