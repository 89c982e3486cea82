use std::time::Duration;

use thiserror::Error;

use crate::actors::SubsystemKind;
use crate::models::SubscriberId;

/// Failure while producing signal events. Never fatal: the producer logs it
/// and tries again on its next cycle.
#[derive(Error, Debug)]
pub enum ProductionError {
    #[error("Market data request failed: {0}")]
    Fetch(String),
    #[error("Market data provider rate limited the request")]
    RateLimited,
    #[error("Malformed market data: {0}")]
    Decode(String),
    #[error("Invalid signal for {symbol}: {reason}")]
    InvalidSignal { symbol: String, reason: String },
}

/// One recipient could not be reached during a broadcast.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Recipient {0} does not exist")]
    InvalidRecipient(SubscriberId),
    #[error("Recipient {0} blocked the bot")]
    Blocked(SubscriberId),
    #[error("Transport rate limit hit")]
    RateLimited,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("Transport rejected the message: {0}")]
    Rejected(String),
}

impl DeliveryError {
    /// Errors worth another attempt. Everything else marks the recipient stale.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Network(_) | Self::Timeout(_))
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to render signal {symbol}: {reason}")]
    Format { symbol: String, reason: String },
    #[error("Renderer panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),
    #[error("{subsystem:?} failed to stop: {reason}")]
    StopFailed { subsystem: SubsystemKind, reason: String },
    #[error("{subsystem:?} did not stop within {timeout:?}, task aborted")]
    StopTimeout { subsystem: SubsystemKind, timeout: Duration },
    #[error("{subsystem:?} exited with failure: {reason}")]
    SubsystemFailed { subsystem: SubsystemKind, reason: String },
}

impl LifecycleError {
    /// Short snake_case label for structured log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "lifecycle_invalid_transition",
            Self::MissingComponent(_) => "lifecycle_missing_component",
            Self::StopFailed { .. } => "lifecycle_stop_failed",
            Self::StopTimeout { .. } => "lifecycle_stop_timeout",
            Self::SubsystemFailed { .. } => "lifecycle_subsystem_failed",
        }
    }
}
