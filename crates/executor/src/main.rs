use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use teloxide::Bot;
use tracing::{error, info, warn};

use common::config::Config;
use common::logger;
use market_data::remote::SignalFeedClient;
use market_data::services::MarketScanner;
use relay::LifecycleCoordinator;

use crate::services::formatting::HtmlSignalRenderer;
use crate::services::telegram_delivery::TelegramDelivery;
use crate::services::telegram_service::TelegramService;

mod os_signals;
mod services;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logger::setup_logger();

    let config = Config::from_env().context("invalid configuration")?;
    info!(?config, "Signal relay starting up");

    let bot = Bot::new(&config.telegram_token);

    let feed = SignalFeedClient::new(&config.feed)?;
    let scanner = Arc::new(MarketScanner::new(Arc::new(feed), config.scan_interval));

    let consumer_bot = bot.clone();
    let symbols = config.feed.symbols.clone();
    let coordinator = LifecycleCoordinator::builder(config.lifecycle.clone())
        .producer(scanner)
        .delivery(Arc::new(TelegramDelivery::new(bot)))
        .renderer(Arc::new(HtmlSignalRenderer))
        .consumer(move |subscriptions| {
            Arc::new(TelegramService::new(consumer_bot, subscriptions, symbols))
                as Arc<dyn common::actors::Subsystem>
        })
        .build()?;

    coordinator.start()?;

    tokio::select! {
        signal = os_signals::shutdown_requested() => {
            if let Err(e) = signal {
                error!("Failed to listen for shutdown signals: {}", e);
            }
        }
        _ = coordinator.wait_finished() => {
            warn!("All subsystems exited on their own");
        }
    }

    let report = coordinator.stop().await;
    if report.is_clean() {
        info!("Signal relay stopped cleanly");
    } else {
        for err in &report.errors {
            warn!(label = err.as_label(), "{}", err);
        }
    }
    Ok(())
}
