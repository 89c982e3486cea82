pub mod signal;
pub mod subscriber;

pub use signal::{Direction, SignalEvent, Timeframe};
pub use subscriber::SubscriberId;
