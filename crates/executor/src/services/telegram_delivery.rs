use async_trait::async_trait;
use teloxide::{ApiError, RequestError, prelude::*, types::ParseMode};
use tracing::debug;

use common::errors::DeliveryError;
use common::models::SubscriberId;
use relay::traits::Delivery;

/// Sends rendered HTML payloads to Telegram chats.
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    async fn deliver(&self, recipient: SubscriberId, payload: &str) -> Result<(), DeliveryError> {
        self.bot
            .send_message(ChatId(recipient.0), payload)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| classify(recipient, e))?;

        debug!(subscriber = %recipient, "Message sent");
        Ok(())
    }
}

fn classify(recipient: SubscriberId, error: RequestError) -> DeliveryError {
    match error {
        RequestError::Api(
            ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation,
        ) => DeliveryError::Blocked(recipient),
        RequestError::Api(ApiError::ChatNotFound) | RequestError::MigrateToChatId(_) => {
            DeliveryError::InvalidRecipient(recipient)
        }
        RequestError::RetryAfter(_) => DeliveryError::RateLimited,
        RequestError::Network(e) => DeliveryError::Network(e.to_string()),
        RequestError::Io(e) => DeliveryError::Network(e.to_string()),
        other => DeliveryError::Rejected(other.to_string()),
    }
}
