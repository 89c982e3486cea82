pub mod formatting;
pub mod telegram_delivery;
pub mod telegram_service;
