use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ProductionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    Daily,
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneHour => write!(f, "1H"),
            Self::FourHours => write!(f, "4H"),
            Self::Daily => write!(f, "Daily"),
        }
    }
}

/// One computed trading recommendation.
///
/// Built once by the producer and shared read-only (`Arc<SignalEvent>`) with
/// every consumer of the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub entry_price: Decimal,
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    /// Indicator values as reported by the analysis side (RSI, fib level, ...).
    #[serde(default)]
    pub indicators: serde_json::Value,
    pub confidence: f64,
    pub risk_reward: f64,
    pub position_size: f64,
    pub created_at: DateTime<Utc>,
}

impl SignalEvent {
    pub fn validate(&self) -> Result<(), ProductionError> {
        let invalid = |reason: &str| ProductionError::InvalidSignal {
            symbol: self.symbol.clone(),
            reason: reason.to_string(),
        };

        if self.symbol.trim().is_empty() {
            return Err(invalid("empty symbol"));
        }
        if self.entry_price <= Decimal::ZERO
            || self.take_profit <= Decimal::ZERO
            || self.stop_loss <= Decimal::ZERO
        {
            return Err(invalid("prices must be positive"));
        }
        if !(0.0..=100.0).contains(&self.confidence) {
            return Err(invalid("confidence outside 0..=100"));
        }

        let ordered = match self.direction {
            Direction::Buy => self.stop_loss < self.entry_price && self.entry_price < self.take_profit,
            Direction::Sell => self.take_profit < self.entry_price && self.entry_price < self.stop_loss,
        };
        if !ordered {
            return Err(invalid("take profit / stop loss on the wrong side of entry"));
        }

        Ok(())
    }
}
