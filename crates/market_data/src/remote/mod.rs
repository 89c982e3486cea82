pub mod feed_client;
pub mod feed_response;

pub use feed_client::SignalFeedClient;
