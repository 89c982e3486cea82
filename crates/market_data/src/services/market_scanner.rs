use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::actors::{Producer, SignalHandler, Subsystem, SubsystemKind};

use crate::traits::SignalSource;

/// Interval-driven producer: polls the signal source once per tick and hands
/// every event to the registered callback, one at a time.
pub struct MarketScanner {
    source: Arc<dyn SignalSource>,
    interval: Duration,
    callback: RwLock<Option<Arc<dyn SignalHandler>>>,
    cancel: CancellationToken,
}

impl MarketScanner {
    pub fn new(source: Arc<dyn SignalSource>, interval: Duration) -> Self {
        Self {
            source,
            interval,
            callback: RwLock::new(None),
            cancel: CancellationToken::new(),
        }
    }

    async fn scan_once(&self) {
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Scan cycle interrupted by shutdown");
                return;
            }
            result = self.source.scan() => result,
        };

        let events = match result {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Scan cycle failed, retrying on next tick");
                return;
            }
        };

        if events.is_empty() {
            debug!("Scan cycle produced no signals");
            return;
        }

        let Some(handler) = self.callback.read().clone() else {
            warn!("{} signals produced but no callback is registered", events.len());
            return;
        };

        let total = events.len();
        for (emitted, event) in events.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(dropped = total - emitted, "Scanner stopped, dropping queued signals");
                return;
            }

            if let Err(e) = event.validate() {
                warn!(error = %e, "Skipping invalid signal");
                continue;
            }

            info!(
                symbol = %event.symbol,
                direction = %event.direction,
                timeframe = %event.timeframe,
                confidence = event.confidence,
                "Signal produced"
            );
            handler.on_signal(Arc::new(event)).await;
        }
    }
}

#[async_trait]
impl Subsystem for MarketScanner {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Producer
    }

    async fn run(&self) -> anyhow::Result<()> {
        info!("Starting market scanner, interval {:?}", self.interval);

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.scan_once().await,
            }
        }

        info!("Market scanner stopped.");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.cancel.is_cancelled() {
            info!("Stopping market scanner");
            self.cancel.cancel();
        }
        Ok(())
    }
}

impl Producer for MarketScanner {
    fn register_callback(&self, handler: Arc<dyn SignalHandler>) {
        *self.callback.write() = Some(handler);
    }
}
