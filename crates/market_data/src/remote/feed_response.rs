use chrono::{DateTime, Utc};
use serde::Deserialize;

use common::models::SignalEvent;

/// Body of `GET {feed}/signals`.
#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    #[serde(default)]
    pub signals: Vec<SignalEvent>,
    pub generated_at: Option<DateTime<Utc>>,
}

impl FeedResponse {
    /// Keeps only the watched symbols and orders the batch oldest first.
    pub fn into_signals(self, symbols: &[String]) -> Vec<SignalEvent> {
        let mut signals: Vec<SignalEvent> = self
            .signals
            .into_iter()
            .filter(|s| symbols.iter().any(|w| w.eq_ignore_ascii_case(&s.symbol)))
            .collect();
        signals.sort_by_key(|s| s.created_at);
        signals
    }
}
