pub mod binance;
pub mod telegram;

pub use binance::BinanceFuturesFeed;
pub use telegram::{TelegramCommandPoller, TelegramNotifier};
