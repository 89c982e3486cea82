use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::{Client, StatusCode};
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use common::config::FeedSettings;
use common::errors::ProductionError;
use common::models::SignalEvent;

use crate::remote::feed_response::FeedResponse;
use crate::traits::SignalSource;

const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Polls an upstream analysis service that publishes ready-made signals as
/// JSON. Each call only returns signals newer than the previous batch.
pub struct SignalFeedClient {
    client: Client,
    signals_url: Url,
    symbols: Vec<String>,
    retry_base: Duration,
    cursor: Mutex<Option<DateTime<Utc>>>,
}

impl SignalFeedClient {
    pub fn new(settings: &FeedSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("signal_relay_bot/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to build HTTP client.")?;

        let signals_url = settings
            .base_url
            .join("signals")
            .context("Failed to build signals endpoint URL")?;

        Ok(Self {
            client,
            signals_url,
            symbols: settings.symbols.clone(),
            retry_base: Duration::from_secs(1),
            cursor: Mutex::new(None),
        })
    }

    #[cfg(test)]
    fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    async fn make_request(&self) -> Result<FeedResponse, ProductionError> {
        let mut query = vec![("symbols", self.symbols.join(","))];
        if let Some(since) = *self.cursor.lock() {
            query.push(("since", since.to_rfc3339()));
        }

        let response = self
            .client
            .get(self.signals_url.clone())
            .query(&query)
            .send()
            .await
            .map_err(|e| ProductionError::Fetch(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProductionError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProductionError::Fetch(format!("HTTP {}", status)));
        }

        response
            .json::<FeedResponse>()
            .await
            .map_err(|e| ProductionError::Decode(e.to_string()))
    }

    fn advance_cursor(&self, signals: &[SignalEvent]) {
        if let Some(latest) = signals.iter().map(|s| s.created_at).max() {
            let mut cursor = self.cursor.lock();
            if cursor.is_none_or(|current| latest > current) {
                *cursor = Some(latest);
            }
        }
    }
}

#[async_trait]
impl SignalSource for SignalFeedClient {
    async fn scan(&self) -> Result<Vec<SignalEvent>, ProductionError> {
        let mut retry_count = 0;

        let response = loop {
            match self.make_request().await {
                Ok(response) => break response,
                Err(ProductionError::RateLimited) if retry_count < MAX_RATE_LIMIT_RETRIES => {
                    retry_count += 1;
                    let backoff = self.retry_base * 2_u32.pow(retry_count);
                    warn!(
                        "Signal feed rate limited, backing off for {:?} (attempt {}/{})",
                        backoff, retry_count, MAX_RATE_LIMIT_RETRIES
                    );
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        let generated_at = response.generated_at;
        let signals = response.into_signals(&self.symbols);
        self.advance_cursor(&signals);
        debug!(?generated_at, "Fetched {} signals from feed", signals.len());
        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(base: &str) -> FeedSettings {
        FeedSettings {
            base_url: Url::parse(&format!("{}/", base)).unwrap(),
            symbols: vec!["XAUUSD".to_string(), "EURUSD".to_string()],
            request_timeout: Duration::from_secs(2),
        }
    }

    const BODY: &str = r#"{
        "generated_at": "2026-10-16T09:05:00Z",
        "signals": [
            {
                "symbol": "EURUSD", "direction": "SELL", "timeframe": "4h",
                "entry_price": "1.0850", "take_profit": "1.0800", "stop_loss": "1.0880",
                "confidence": 61.0, "risk_reward": 1.7, "position_size": 1.0,
                "created_at": "2026-10-16T09:00:00Z"
            },
            {
                "symbol": "XAUUSD", "direction": "BUY", "timeframe": "1h",
                "entry_price": "2350.0", "take_profit": "2380.0", "stop_loss": "2335.0",
                "confidence": 74.0, "risk_reward": 2.0, "position_size": 2.0,
                "created_at": "2026-10-16T08:00:00Z"
            },
            {
                "symbol": "BTCUSD", "direction": "BUY", "timeframe": "1d",
                "entry_price": "60000", "take_profit": "62000", "stop_loss": "59000",
                "confidence": 55.0, "risk_reward": 2.0, "position_size": 1.0,
                "created_at": "2026-10-16T08:30:00Z"
            }
        ]
    }"#;

    #[tokio::test]
    async fn returns_watched_symbols_oldest_first_and_advances_cursor() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/signals")
            .match_query(Matcher::UrlEncoded("symbols".into(), "XAUUSD,EURUSD".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(BODY)
            .expect(1)
            .create_async()
            .await;

        let client = SignalFeedClient::new(&settings(&server.url())).unwrap();
        let signals = client.scan().await.unwrap();

        let symbols: Vec<&str> = signals.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["XAUUSD", "EURUSD"]);
        first.assert_async().await;
        first.remove_async().await;

        let second = server
            .mock("GET", "/signals")
            .match_query(Matcher::UrlEncoded("since".into(), "2026-10-16T09:00:00+00:00".into()))
            .with_status(200)
            .with_body(r#"{ "signals": [] }"#)
            .expect(1)
            .create_async()
            .await;

        assert!(client.scan().await.unwrap().is_empty());
        second.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_become_fetch_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/signals")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = SignalFeedClient::new(&settings(&server.url())).unwrap();
        let err = client.scan().await.unwrap_err();
        assert!(matches!(err, ProductionError::Fetch(ref msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/signals")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = SignalFeedClient::new(&settings(&server.url())).unwrap();
        assert!(matches!(client.scan().await, Err(ProductionError::Decode(_))));
    }

    #[tokio::test]
    async fn gives_up_after_repeated_rate_limits() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/signals")
            .match_query(Matcher::Any)
            .with_status(429)
            .expect(1 + MAX_RATE_LIMIT_RETRIES as usize)
            .create_async()
            .await;

        let client = SignalFeedClient::new(&settings(&server.url()))
            .unwrap()
            .with_retry_base(Duration::from_millis(1));

        assert!(matches!(client.scan().await, Err(ProductionError::RateLimited)));
        limited.assert_async().await;
    }
}
