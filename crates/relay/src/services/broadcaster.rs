use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use common::actors::SignalHandler;
use common::config::DeliverySettings;
use common::errors::{DeliveryError, RenderError};
use common::models::{SignalEvent, SubscriberId};

use crate::registry::SubscriberRegistry;
use crate::traits::{Delivery, SignalRenderer};

/// What happened to each recipient of one broadcast. Lists are sorted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<SubscriberId>,
    /// Recipients that failed delivery and were dropped from the registry.
    pub removed: Vec<SubscriberId>,
    /// Recipients not attempted: render failure or delivery gate closed.
    pub skipped: Vec<SubscriberId>,
}

impl BroadcastReport {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.removed.is_empty() && self.skipped.is_empty()
    }
}

enum Outcome {
    Delivered,
    Removed,
    Skipped,
}

/// Fans one signal out to every subscriber in a registry snapshot.
///
/// Each recipient is handled in isolation: a render error, a transport error
/// or a timeout for one id never prevents attempts to the others. Recipients
/// whose delivery fails (after retries for transient errors) are removed from
/// the registry.
pub struct SignalBroadcaster {
    registry: Arc<SubscriberRegistry>,
    delivery: Arc<dyn Delivery>,
    renderer: Arc<dyn SignalRenderer>,
    settings: DeliverySettings,
    gate: CancellationToken,
}

impl SignalBroadcaster {
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        delivery: Arc<dyn Delivery>,
        renderer: Arc<dyn SignalRenderer>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            registry,
            delivery,
            renderer,
            settings,
            gate: CancellationToken::new(),
        }
    }

    /// Stops new delivery attempts. Attempts already in flight run to completion
    /// or time out.
    pub fn close(&self) {
        if !self.gate.is_cancelled() {
            info!("Closing delivery gate");
            self.gate.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.gate.is_cancelled()
    }

    pub async fn broadcast(&self, event: &SignalEvent) -> BroadcastReport {
        let snapshot = self.registry.snapshot();
        let mut report = BroadcastReport::default();

        if snapshot.is_empty() {
            info!(symbol = %event.symbol, "No subscribers to send signal to");
            return report;
        }

        if self.is_closed() {
            warn!(
                symbol = %event.symbol,
                skipped = snapshot.len(),
                "Delivery gate closed, signal not sent"
            );
            report.skipped = snapshot.to_vec();
            return report;
        }

        let limiter = Semaphore::new(self.settings.concurrency.max(1));
        let attempts: Vec<_> = snapshot
            .iter()
            .map(|&id| self.deliver_limited(&limiter, id, event))
            .collect();
        let outcomes = join_all(attempts).await;

        for (id, outcome) in outcomes {
            match outcome {
                Outcome::Delivered => report.delivered.push(id),
                Outcome::Removed => report.removed.push(id),
                Outcome::Skipped => report.skipped.push(id),
            }
        }
        report.delivered.sort();
        report.removed.sort();
        report.skipped.sort();

        info!(
            symbol = %event.symbol,
            delivered = report.delivered.len(),
            removed = report.removed.len(),
            skipped = report.skipped.len(),
            "Broadcast finished"
        );
        report
    }

    async fn deliver_limited(
        &self,
        limiter: &Semaphore,
        id: SubscriberId,
        event: &SignalEvent,
    ) -> (SubscriberId, Outcome) {
        let _permit = limiter.acquire().await.ok();
        (id, self.deliver_to(id, event).await)
    }

    async fn deliver_to(&self, id: SubscriberId, event: &SignalEvent) -> Outcome {
        if self.is_closed() {
            warn!(subscriber = %id, symbol = %event.symbol, "Delivery gate closed before attempt, skipping");
            return Outcome::Skipped;
        }

        let payload = match self.render(event, id) {
            Ok(payload) => payload,
            Err(e) => {
                error!(subscriber = %id, error = %e, "Failed to render signal, skipping recipient");
                return Outcome::Skipped;
            }
        };

        let mut attempt = 0;
        loop {
            if attempt > 0 && self.is_closed() {
                warn!(subscriber = %id, "Delivery gate closed before retry, giving up on recipient");
                return Outcome::Skipped;
            }

            let result = match time::timeout(self.settings.timeout, self.delivery.deliver(id, &payload)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(self.settings.timeout)),
            };

            match result {
                Ok(()) => {
                    debug!(subscriber = %id, symbol = %event.symbol, "Signal delivered");
                    return Outcome::Delivered;
                }
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let backoff = self
                        .settings
                        .retry_backoff
                        .saturating_mul(2_u32.saturating_pow(attempt - 1));
                    warn!(
                        subscriber = %id,
                        error = %e,
                        "Delivery failed, retrying in {:?} (attempt {}/{})",
                        backoff, attempt, self.settings.max_retries
                    );

                    tokio::select! {
                        biased;
                        _ = self.gate.cancelled() => {
                            warn!(subscriber = %id, "Shutdown during retry back-off, giving up on recipient");
                            return Outcome::Skipped;
                        }
                        _ = time::sleep(backoff) => {}
                    }
                }
                Err(e) => {
                    error!(subscriber = %id, error = %e, "Failed to send signal, removing subscriber");
                    self.registry.remove(id);
                    return Outcome::Removed;
                }
            }
        }
    }

    fn render(&self, event: &SignalEvent, id: SubscriberId) -> Result<String, RenderError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.renderer.render(event, id)))
            .unwrap_or_else(|panic| Err(RenderError::Panicked(panic_message(panic.as_ref()))))
    }
}

#[async_trait]
impl SignalHandler for SignalBroadcaster {
    async fn on_signal(&self, event: Arc<SignalEvent>) {
        self.broadcast(&event).await;
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
