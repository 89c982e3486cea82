use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::errors::{DeliveryError, RenderError};
use common::models::{Direction, SignalEvent, SubscriberId, Timeframe};

use crate::traits::{Delivery, SignalRenderer};

pub fn sample_signal(symbol: &str) -> SignalEvent {
    SignalEvent {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        direction: Direction::Sell,
        timeframe: Timeframe::FourHours,
        entry_price: dec!(1.2650),
        take_profit: dec!(1.2550),
        stop_loss: dec!(1.2700),
        indicators: serde_json::json!({ "rsi": 74.1, "fib_level": 0.618 }),
        confidence: 68.0,
        risk_reward: 2.0,
        position_size: 1.5,
        created_at: Utc::now(),
    }
}

/// Payload is the event symbol, which keeps ordering assertions readable.
pub struct SymbolRenderer;

impl SignalRenderer for SymbolRenderer {
    fn render(&self, event: &SignalEvent, _recipient: SubscriberId) -> Result<String, RenderError> {
        Ok(event.symbol.clone())
    }
}

type DeliverHook = Box<dyn Fn(SubscriberId) + Send + Sync>;

/// Transport fake recording every payload per recipient, in arrival order.
#[derive(Default)]
pub struct RecordingDelivery {
    pub received: Mutex<HashMap<SubscriberId, Vec<String>>>,
    pub attempts: Mutex<Vec<SubscriberId>>,
    failing: HashSet<SubscriberId>,
    /// Errors returned (front first) before a recipient starts succeeding.
    scripted: Mutex<HashMap<SubscriberId, Vec<DeliveryError>>>,
    delays: HashMap<SubscriberId, Duration>,
    hook: Option<DeliverHook>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: i64) -> Self {
        self.failing.insert(SubscriberId(id));
        self
    }

    pub fn scripted(self, id: i64, errors: Vec<DeliveryError>) -> Self {
        self.scripted.lock().insert(SubscriberId(id), errors);
        self
    }

    pub fn delayed(mut self, id: i64, delay: Duration) -> Self {
        self.delays.insert(SubscriberId(id), delay);
        self
    }

    pub fn on_deliver(mut self, hook: impl Fn(SubscriberId) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn payloads(&self, id: i64) -> Vec<String> {
        self.received.lock().get(&SubscriberId(id)).cloned().unwrap_or_default()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn deliver(&self, recipient: SubscriberId, payload: &str) -> Result<(), DeliveryError> {
        self.attempts.lock().push(recipient);
        if let Some(hook) = &self.hook {
            hook(recipient);
        }
        if let Some(delay) = self.delays.get(&recipient) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&recipient) {
            return Err(DeliveryError::Blocked(recipient));
        }
        let scripted = {
            let mut scripted = self.scripted.lock();
            scripted
                .get_mut(&recipient)
                .and_then(|errors| (!errors.is_empty()).then(|| errors.remove(0)))
        };
        if let Some(err) = scripted {
            return Err(err);
        }

        self.received
            .lock()
            .entry(recipient)
            .or_default()
            .push(payload.to_string());
        Ok(())
    }
}
