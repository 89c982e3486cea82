use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::actors::SignalHandler;
use common::models::{Direction, SignalEvent, Timeframe};

pub fn sample_signal(symbol: &str) -> SignalEvent {
    SignalEvent {
        id: Uuid::new_v4(),
        symbol: symbol.to_string(),
        direction: Direction::Buy,
        timeframe: Timeframe::OneHour,
        entry_price: dec!(100.0),
        take_profit: dec!(110.0),
        stop_loss: dec!(95.0),
        indicators: serde_json::json!({ "rsi": 28.4 }),
        confidence: 70.0,
        risk_reward: 2.0,
        position_size: 2.0,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<Arc<SignalEvent>>>,
}

impl RecordingHandler {
    pub fn symbols(&self) -> Vec<String> {
        self.received.lock().iter().map(|e| e.symbol.clone()).collect()
    }
}

#[async_trait]
impl SignalHandler for RecordingHandler {
    async fn on_signal(&self, event: Arc<SignalEvent>) {
        self.received.lock().push(event);
    }
}
