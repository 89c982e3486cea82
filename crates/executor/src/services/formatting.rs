use std::fmt::Write;

use teloxide::utils::html;

use common::errors::RenderError;
use common::models::{Direction, SignalEvent, SubscriberId};
use relay::traits::SignalRenderer;

/// Telegram HTML card for one signal. Same text for every recipient.
pub struct HtmlSignalRenderer;

impl HtmlSignalRenderer {
    fn card(event: &SignalEvent) -> Result<String, std::fmt::Error> {
        let side = match event.direction {
            Direction::Buy => "🟢 BUY",
            Direction::Sell => "🔴 SELL",
        };

        let mut out = String::with_capacity(512);
        writeln!(out, "🚨 <b>TRADING SIGNAL</b> 🚨")?;
        writeln!(out)?;
        writeln!(out, "<b>Pair:</b> {}", html::escape(&event.symbol))?;
        writeln!(out, "<b>Signal:</b> {}", side)?;
        writeln!(out, "<b>Timeframe:</b> {}", event.timeframe)?;
        writeln!(out, "<b>Entry Price:</b> {:.5}", event.entry_price)?;
        writeln!(out)?;

        writeln!(out, "📊 <b>Technical Analysis:</b>")?;
        if let Some(rsi) = event.indicators.get("rsi").and_then(|v| v.as_f64()) {
            writeln!(out, "• RSI: {:.2}", rsi)?;
        }
        if let Some(fib) = event.indicators.get("fib_level").and_then(|v| v.as_f64()) {
            writeln!(out, "• Fibonacci Level: {:.3}", fib)?;
        }
        writeln!(out, "• Confidence: {:.1}%", event.confidence)?;
        writeln!(out)?;

        writeln!(out, "🎯 <b>Targets:</b>")?;
        writeln!(out, "• Take Profit: {:.5}", event.take_profit)?;
        writeln!(out, "• Stop Loss: {:.5}", event.stop_loss)?;
        writeln!(out)?;

        writeln!(out, "⚠️ <b>Risk Management:</b>")?;
        writeln!(out, "• Risk/Reward: 1:{:.2}", event.risk_reward)?;
        writeln!(out, "• Suggested Position Size: {:.2}%", event.position_size)?;
        writeln!(out)?;

        write!(
            out,
            "<i>Generated at: {}</i>",
            event.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        Ok(out)
    }
}

impl SignalRenderer for HtmlSignalRenderer {
    fn render(&self, event: &SignalEvent, _recipient: SubscriberId) -> Result<String, RenderError> {
        let format_error = |reason: String| RenderError::Format {
            symbol: event.symbol.clone(),
            reason,
        };

        event.validate().map_err(|e| format_error(e.to_string()))?;
        Self::card(event).map_err(|e| format_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use common::models::Timeframe;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn gold_buy() -> SignalEvent {
        SignalEvent {
            id: Uuid::new_v4(),
            symbol: "XAUUSD".to_string(),
            direction: Direction::Buy,
            timeframe: Timeframe::FourHours,
            entry_price: dec!(2350.5),
            take_profit: dec!(2380.25),
            stop_loss: dec!(2335),
            indicators: serde_json::json!({ "rsi": 28.456, "fib_level": 0.618 }),
            confidence: 82.5,
            risk_reward: 2.0,
            position_size: 1.5,
            created_at: Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap(),
        }
    }

    #[test]
    fn renders_signal_card() {
        let text = HtmlSignalRenderer.render(&gold_buy(), SubscriberId(1)).unwrap();

        assert!(text.contains("<b>Pair:</b> XAUUSD"));
        assert!(text.contains("<b>Signal:</b> 🟢 BUY"));
        assert!(text.contains("<b>Timeframe:</b> 4H"));
        assert!(text.contains("<b>Entry Price:</b> 2350.50000"));
        assert!(text.contains("• RSI: 28.46"));
        assert!(text.contains("• Fibonacci Level: 0.618"));
        assert!(text.contains("• Confidence: 82.5%"));
        assert!(text.contains("• Stop Loss: 2335.00000"));
        assert!(text.contains("• Risk/Reward: 1:2.00"));
        assert!(text.ends_with("<i>Generated at: 2026-03-02 14:30:00 UTC</i>"));
    }

    #[test]
    fn missing_indicators_are_left_out() {
        let mut event = gold_buy();
        event.indicators = serde_json::Value::Null;

        let text = HtmlSignalRenderer.render(&event, SubscriberId(1)).unwrap();

        assert!(!text.contains("RSI"));
        assert!(text.contains("• Confidence:"));
    }

    #[test]
    fn escapes_markup_in_symbol() {
        let mut event = gold_buy();
        event.symbol = "XAU<USD>".to_string();

        let text = HtmlSignalRenderer.render(&event, SubscriberId(1)).unwrap();

        assert!(text.contains("XAU&lt;USD&gt;"));
    }

    #[test]
    fn rejects_inconsistent_event() {
        let mut event = gold_buy();
        event.stop_loss = dec!(2400);

        let err = HtmlSignalRenderer.render(&event, SubscriberId(1)).unwrap_err();

        assert!(matches!(err, RenderError::Format { ref symbol, .. } if symbol == "XAUUSD"));
    }
}
