use std::sync::Arc;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::ParseMode,
    utils::{command::BotCommands, html},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::actors::{Subsystem, SubsystemKind};
use common::models::SubscriberId;
use relay::SubscriptionService;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "welcome message")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "receive trading signals in this chat")]
    Subscribe,
    #[command(description = "stop receiving trading signals")]
    Unsubscribe,
    #[command(description = "show subscription and bot status")]
    Status,
}

/// Watched symbols, injected into command handlers.
#[derive(Clone)]
struct Watchlist(Arc<Vec<String>>);

/// Consumer side: accepts chat commands and mutates subscriptions.
pub struct TelegramService {
    bot: Bot,
    subscriptions: SubscriptionService,
    watchlist: Watchlist,
    stopping: CancellationToken,
}

impl TelegramService {
    pub fn new(bot: Bot, subscriptions: SubscriptionService, symbols: Vec<String>) -> Self {
        Self {
            bot,
            subscriptions,
            watchlist: Watchlist(Arc::new(symbols)),
            stopping: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Subsystem for TelegramService {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::Consumer
    }

    async fn run(&self) -> anyhow::Result<()> {
        if self.stopping.is_cancelled() {
            return Ok(());
        }

        if let Err(e) = self.bot.set_my_commands(Command::bot_commands()).await {
            warn!("Failed to publish the command menu: {}", e);
        }

        let handler = Update::filter_message()
            .filter_command::<Command>()
            .endpoint(answer);

        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![self.subscriptions.clone(), self.watchlist.clone()])
            .default_handler(|_| async {})
            .build();
        let shutdown = dispatcher.shutdown_token();

        info!("Starting Telegram command dispatcher");
        let dispatch = dispatcher.dispatch();
        tokio::pin!(dispatch);

        tokio::select! {
            _ = &mut dispatch => {
                info!("Telegram dispatcher exited");
                return Ok(());
            }
            _ = self.stopping.cancelled() => {}
        }

        match shutdown.shutdown() {
            Ok(_) => {
                // Drives the dispatcher until in-flight handlers are done.
                dispatch.await;
                info!("Telegram dispatcher stopped");
            }
            Err(_) => info!("Telegram dispatcher stopped before polling started"),
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.stopping.is_cancelled() {
            info!("Stopping Telegram command dispatcher");
            self.stopping.cancel();
        }
        Ok(())
    }
}

async fn answer(
    bot: Bot,
    msg: Message,
    cmd: Command,
    subscriptions: SubscriptionService,
    watchlist: Watchlist,
) -> ResponseResult<()> {
    let text = reply(&cmd, SubscriberId(msg.chat.id.0), &subscriptions, &watchlist.0);
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

fn reply(
    cmd: &Command,
    chat: SubscriberId,
    subscriptions: &SubscriptionService,
    symbols: &[String],
) -> String {
    let pairs = html::escape(&symbols.join(", "));
    match cmd {
        Command::Start => format!(
            "🤖 <b>Welcome to the trading signal bot</b>\n\n\
             Signals are published for: {pairs}\n\
             Timeframes: 1H, 4H, Daily\n\n\
             Use /subscribe to receive signals and /help for all commands."
        ),
        Command::Help => Command::descriptions().to_string(),
        Command::Subscribe => {
            if subscriptions.subscribe(chat) {
                format!("✅ <b>Subscribed.</b> You will receive signals for {pairs}.")
            } else {
                "ℹ️ This chat is already subscribed.".to_string()
            }
        }
        Command::Unsubscribe => {
            if subscriptions.unsubscribe(chat) {
                "❌ <b>Unsubscribed.</b> Use /subscribe to come back.".to_string()
            } else {
                "ℹ️ This chat is not subscribed.".to_string()
            }
        }
        Command::Status => {
            let subscribed = if subscriptions.is_subscribed(chat) { "yes" } else { "no" };
            format!(
                "🟢 <b>Bot Status: ACTIVE</b>\n\n\
                 • Monitoring: {pairs}\n\
                 • This chat subscribed: {subscribed}\n\
                 • Subscribers: {}",
                subscriptions.subscriber_count()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay::SubscriberRegistry;

    fn service() -> SubscriptionService {
        SubscriptionService::new(Arc::new(SubscriberRegistry::new()))
    }

    fn symbols() -> Vec<String> {
        vec!["XAUUSD".to_string(), "EURUSD".to_string()]
    }

    #[test]
    fn parses_lowercase_commands() {
        assert_eq!(Command::parse("/subscribe", "signal_bot").unwrap(), Command::Subscribe);
        assert_eq!(Command::parse("/status", "signal_bot").unwrap(), Command::Status);
        assert!(Command::parse("/analyze", "signal_bot").is_err());
    }

    #[test]
    fn subscribe_then_unsubscribe_round_trip() {
        let subs = service();
        let chat = SubscriberId(1001);

        let first = reply(&Command::Subscribe, chat, &subs, &symbols());
        let again = reply(&Command::Subscribe, chat, &subs, &symbols());
        assert!(first.contains("Subscribed") && first.contains("XAUUSD, EURUSD"));
        assert!(again.contains("already subscribed"));
        assert!(subs.is_subscribed(chat));

        let left = reply(&Command::Unsubscribe, chat, &subs, &symbols());
        let not_there = reply(&Command::Unsubscribe, chat, &subs, &symbols());
        assert!(left.contains("Unsubscribed"));
        assert!(not_there.contains("not subscribed"));
        assert_eq!(subs.subscriber_count(), 0);
    }

    #[test]
    fn status_reports_subscription() {
        let subs = service();
        subs.subscribe(SubscriberId(7));

        let text = reply(&Command::Status, SubscriberId(7), &subs, &symbols());

        assert!(text.contains("This chat subscribed: yes"));
        assert!(text.contains("Subscribers: 1"));
    }

    #[test]
    fn configured_symbols_are_escaped() {
        let subs = service();
        let symbols = vec!["<b>XAU</b>".to_string(), "EUR&USD".to_string()];

        let text = reply(&Command::Start, SubscriberId(5), &subs, &symbols);

        assert!(text.contains("&lt;b&gt;XAU&lt;/b&gt;, EUR&amp;USD"));
        assert!(!text.contains("<b>XAU</b>"));
    }

    #[tokio::test]
    async fn stop_before_run_returns_immediately() {
        let telegram = TelegramService::new(Bot::new("123:TEST"), service(), symbols());

        telegram.stop().await.unwrap();
        telegram.stop().await.unwrap();

        telegram.run().await.unwrap();
    }
}
