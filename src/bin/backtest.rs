use chrono::{DateTime, Duration, DurationRound, Utc};
use clap::Parser;
use swingbot::api::BinanceFuturesFeed;
use swingbot::backtest::{BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use swingbot::config::BotConfig;
use swingbot::models::{Candle, Profile};
use swingbot::Result;

const PAGE_SIZE: usize = 1_000;

#[derive(Parser, Debug)]
#[command(name = "backtest", about = "Replay the swing strategy over history")]
struct Args {
    /// Run every synthetic scenario instead of fetching history
    #[arg(long)]
    synthetic: bool,

    /// Days of history to fetch
    #[arg(long, default_value_t = 30)]
    days: i64,

    /// Profile to test (defaults to the configured one)
    #[arg(long)]
    profile: Option<Profile>,

    /// Symbol to fetch (defaults to the configured one)
    #[arg(long)]
    symbol: Option<String>,

    /// Seed for synthetic data
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Config file (without extension)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("swingbot=info")
        .init();

    let args = Args::parse();
    let mut config = BotConfig::load(args.config.as_deref())?;
    if let Some(profile) = args.profile {
        config.profile = profile;
    }
    if let Some(symbol) = &args.symbol {
        config.symbol = symbol.to_uppercase();
    }

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║             SWINGBOT BACKTESTING SUITE                ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!(
        "  Profile: {} | Venue: {} | Balance: ${:.2} | Leverage: {}x",
        config.profile, config.venue, config.balance, config.leverage
    );

    let runner = BacktestRunner::from_config(&config)?;

    if args.synthetic {
        run_synthetic(&runner, &config, args.seed);
        return Ok(());
    }

    let candles = fetch_history(&config.symbol, config.profile, args.days).await?;
    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        println!(
            "  Symbol: {} | Period: {} → {} | {} candles",
            config.symbol,
            first.open_time.format("%Y-%m-%d %H:%M"),
            last.close_time().format("%Y-%m-%d %H:%M"),
            candles.len()
        );
    }

    let metrics = runner.run(&candles)?;
    metrics.print_report();

    Ok(())
}

fn run_synthetic(runner: &BacktestRunner, config: &BotConfig, seed: u64) {
    let ltf = config.profile.ltf();
    // Aligned to the HTF grid so aggregation starts on a full bucket
    let start = DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or_default(); // 2024-01-01

    let mut results = Vec::new();
    for scenario in MarketScenario::all() {
        let mut generator = SyntheticDataGenerator::new(seed);
        let candles = generator.generate(scenario, 3_000, ltf, start);

        match runner.run(&candles) {
            Ok(metrics) => {
                println!("\n{}", scenario.label());
                metrics.print_report();
                results.push((scenario.label(), metrics));
            }
            Err(e) => eprintln!("❌ Backtest failed for {}: {}", scenario.label(), e),
        }
    }

    print_summary_comparison(&results);
}

/// Page forward from `days` ago until the last closed bar
async fn fetch_history(symbol: &str, profile: Profile, days: i64) -> Result<Vec<Candle>> {
    let feed = BinanceFuturesFeed::new();
    let timeframe = profile.ltf();
    let now = Utc::now();
    let start = (now - Duration::days(days)).duration_trunc(profile.htf().duration())?;

    let mut candles: Vec<Candle> = Vec::new();
    let mut cursor = start.timestamp_millis();

    loop {
        let page = feed.fetch_range(symbol, timeframe, cursor, PAGE_SIZE).await?;
        let Some(last) = page.last() else { break };
        cursor = last.close_time().timestamp_millis();
        let full_page = page.len() >= PAGE_SIZE;

        candles.extend(page.into_iter().filter(|c| c.close_time() <= now));
        tracing::info!("Fetched {} candles so far", candles.len());

        if !full_page {
            break;
        }
    }

    candles.dedup_by_key(|c| c.open_time);
    Ok(candles)
}

fn print_summary_comparison(results: &[(&str, BacktestMetrics)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<36} {:>10} {:>8} {:>8} {:>10}",
        "Scenario", "Net P&L", "Trades", "Win%", "Max DD"
    );
    println!("{}", "─".repeat(76));

    for (name, metrics) in results {
        println!(
            "{:<36} {:>10.2} {:>8} {:>8.1} {:>10.2}",
            name, metrics.net_pnl, metrics.total_trades, metrics.win_rate, metrics.max_drawdown
        );
    }

    let total_trades: usize = results.iter().map(|(_, m)| m.total_trades).sum();
    println!("\n📊 Total trades across all scenarios: {}", total_trades);
    println!("\n═══════════════════════════════════════════════════════\n");
}
