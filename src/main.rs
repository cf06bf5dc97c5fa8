use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use swingbot::alerts::{LogNotifier, Notifier};
use swingbot::api::{BinanceFuturesFeed, TelegramCommandPoller, TelegramNotifier};
use swingbot::bot::{Bot, BotHandle};
use swingbot::config::{BotConfig, Environment};
use swingbot::data::{CandleBatch, CandleFeed};
use swingbot::db::{MemoryStore, PostgresStore, Store};
use swingbot::error::DataError;
use swingbot::execution::{ExecutionGateway, PaperGateway};
use swingbot::models::{Profile, Timeframe};
use swingbot::persistence::RedisPersistence;
use swingbot::Result;

#[derive(Parser, Debug)]
#[command(name = "swingbot", about = "Structure-based swing trading bot")]
struct Args {
    /// Config file (without extension), e.g. `swingbot` for swingbot.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Override the configured profile (ltf_5m or ltf_15m)
    #[arg(short, long)]
    profile: Option<Profile>,
}

// ============================================================================
// Paper mark feed
// ============================================================================

/// Moves the paper venue's mark to every freshly fetched LTF close, so
/// resting stop and target orders trigger as price moves.
struct MarkingFeed {
    inner: BinanceFuturesFeed,
    paper: Arc<PaperGateway>,
    ltf: Timeframe,
}

#[async_trait]
impl CandleFeed for MarkingFeed {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> std::result::Result<CandleBatch, DataError> {
        let batch = self.inner.fetch(symbol, timeframe, limit).await?;
        if timeframe == self.ltf {
            if let Some(last) = batch.candles.last() {
                self.paper.set_mark_price(last.close).await;
            }
        }
        Ok(batch)
    }
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = BotConfig::load(args.config.as_deref())?;
    if let Some(profile) = args.profile {
        config.profile = profile;
    }
    setup_logging(&config.log_level);

    tracing::info!(
        "🚀 Swingbot starting: {} {} on {} ({:?})",
        config.symbol,
        config.profile,
        config.venue,
        config.environment
    );

    if config.environment == Environment::Live {
        tracing::warn!("⚠️  No live venue client is built in, orders go to the paper venue");
    }

    let store = connect_store(&config).await;
    let notifier = create_notifier(&config);

    // Paper venue seeded at the latest close
    let probe = BinanceFuturesFeed::new();
    let seed_price = probe
        .fetch(&config.symbol, config.profile.ltf(), 1)
        .await
        .ok()
        .and_then(|batch| batch.candles.last().map(|c| c.close))
        .unwrap_or(0.0);
    let paper = Arc::new(PaperGateway::new(config.venue, &config.symbol, seed_price));
    let gateway: Arc<dyn ExecutionGateway> = paper.clone();

    let feed = Arc::new(MarkingFeed {
        inner: probe,
        paper,
        ltf: config.profile.ltf(),
    });

    let redis_url = config.redis_url.clone();
    let telegram = telegram_credentials(&config);

    let mut bot = Bot::new(config, feed, gateway, store, notifier)?;

    if let Some(url) = redis_url {
        match RedisPersistence::new(&url).await {
            Ok(persistence) => {
                tracing::info!("Redis persistence enabled at {}", url);
                bot = bot.with_persistence(persistence);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Redis ({}), continuing without restart recovery",
                    e
                );
            }
        }
    }

    let (handle, commands) = BotHandle::channel(16);
    match telegram {
        Some((token, chat_id)) => {
            let poller = TelegramCommandPoller::new(&token, chat_id);
            tokio::spawn(poller.run(handle));
        }
        None => {
            tracing::info!("Telegram not configured, operator commands disabled");
            drop(handle);
        }
    }

    bot.run(commands).await;

    Ok(())
}

fn setup_logging(level: &str) {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| format!("swingbot={},swingbot::strategy=debug", level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_store(config: &BotConfig) -> Arc<dyn Store> {
    if let Some(url) = &config.database_url {
        match PostgresStore::new(url).await {
            Ok(store) => {
                tracing::info!("Postgres audit store enabled");
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to connect to Postgres ({}), keeping audit records in memory",
                    e
                );
            }
        }
    }
    Arc::new(MemoryStore::new())
}

fn create_notifier(config: &BotConfig) -> Arc<dyn Notifier> {
    match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)),
        _ => {
            tracing::info!("Telegram not configured, alerts go to the log");
            Arc::new(LogNotifier)
        }
    }
}

/// Token and numeric chat id, when both are usable
fn telegram_credentials(config: &BotConfig) -> Option<(String, i64)> {
    let token = config.telegram_bot_token.clone()?;
    let chat_id = config.telegram_chat_id.as_deref()?;
    match chat_id.parse::<i64>() {
        Ok(id) => Some((token, id)),
        Err(_) => {
            tracing::warn!("telegram_chat_id {:?} is not numeric, commands disabled", chat_id);
            None
        }
    }
}
