use crate::db::ExitReason;
use crate::models::Direction;
use crate::strategy::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One simulated trade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub stop: f64,
    pub target: f64,
    pub quantity: f64,
    pub notional: f64,
    pub risk_budget: f64,
    pub rr: f64,
    pub gross_pnl: f64,
    pub fees: f64,
    pub net_pnl: f64,
    pub exit_reason: ExitReason,
    pub bars_held: usize,
    pub session: Option<Session>,
}

/// Aggregate backtest performance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub initial_balance: f64,

    // Trade Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,

    // P&L
    pub gross_pnl: f64,
    pub total_fees: f64,
    pub net_pnl: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub profit_factor: f64, // Total wins / Total losses
    pub avg_rr: f64,

    // Risk
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,

    pub trades: Vec<TradeRecord>,
}

impl BacktestMetrics {
    /// Summarize closed trades. A trade wins when its net PnL is positive.
    pub fn from_trades(trades: Vec<TradeRecord>, initial_balance: f64) -> Self {
        let total_trades = trades.len();
        if total_trades == 0 {
            return Self::empty(initial_balance);
        }

        let winning_trades = trades.iter().filter(|t| t.net_pnl > 0.0).count();
        let losing_trades = total_trades - winning_trades;
        let win_rate = winning_trades as f64 / total_trades as f64 * 100.0;

        let gross_pnl: f64 = trades.iter().map(|t| t.gross_pnl).sum();
        let total_fees: f64 = trades.iter().map(|t| t.fees).sum();
        let net_pnl: f64 = trades.iter().map(|t| t.net_pnl).sum();

        let best_trade = trades.iter().map(|t| t.net_pnl).fold(f64::NEG_INFINITY, f64::max);
        let worst_trade = trades.iter().map(|t| t.net_pnl).fold(f64::INFINITY, f64::min);
        let avg_rr = trades.iter().map(|t| t.rr).sum::<f64>() / total_trades as f64;

        let total_wins: f64 = trades.iter().filter(|t| t.net_pnl > 0.0).map(|t| t.net_pnl).sum();
        let total_losses: f64 = trades
            .iter()
            .filter(|t| t.net_pnl <= 0.0)
            .map(|t| t.net_pnl.abs())
            .sum();
        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_pct) = Self::calculate_drawdown(&trades, initial_balance);

        Self {
            initial_balance,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate,
            gross_pnl,
            total_fees,
            net_pnl,
            best_trade,
            worst_trade,
            profit_factor,
            avg_rr,
            max_drawdown,
            max_drawdown_pct,
            trades,
        }
    }

    fn empty(initial_balance: f64) -> Self {
        Self {
            initial_balance,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            gross_pnl: 0.0,
            total_fees: 0.0,
            net_pnl: 0.0,
            best_trade: 0.0,
            worst_trade: 0.0,
            profit_factor: 0.0,
            avg_rr: 0.0,
            max_drawdown: 0.0,
            max_drawdown_pct: 0.0,
            trades: vec![],
        }
    }

    /// Largest peak-to-trough drop of the net equity curve
    fn calculate_drawdown(trades: &[TradeRecord], initial_balance: f64) -> (f64, f64) {
        let mut peak = initial_balance;
        let mut max_dd = 0.0;
        let mut equity = initial_balance;

        for trade in trades {
            equity += trade.net_pnl;

            if equity > peak {
                peak = equity;
            }

            let drawdown = peak - equity;
            if drawdown > max_dd {
                max_dd = drawdown;
            }
        }

        let max_dd_pct = if peak > 0.0 { max_dd / peak * 100.0 } else { 0.0 };

        (max_dd, max_dd_pct)
    }

    /// Trade count, wins and net PnL per session label
    pub fn session_breakdown(&self) -> BTreeMap<String, (usize, usize, f64)> {
        let mut out: BTreeMap<String, (usize, usize, f64)> = BTreeMap::new();
        for trade in &self.trades {
            let label = trade
                .session
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string());
            let entry = out.entry(label).or_default();
            entry.0 += 1;
            if trade.net_pnl > 0.0 {
                entry.1 += 1;
            }
            entry.2 += trade.net_pnl;
        }
        out
    }

    /// Trade count per exit reason
    pub fn exit_breakdown(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for trade in &self.trades {
            *out.entry(trade.exit_reason.to_string()).or_default() += 1;
        }
        out
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║              BACKTEST PERFORMANCE REPORT              ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📈 TRADE STATISTICS");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winning Trades:        {} ({:.1}%)",
            self.winning_trades, self.win_rate
        );
        println!("  Losing Trades:         {}", self.losing_trades);

        println!("\n📊 P&L SUMMARY (USDT)");
        println!("  Starting Balance:      ${:.2}", self.initial_balance);
        println!("  Gross P&L:             ${:+.4}", self.gross_pnl);
        println!("  Fees:                  ${:.4}", self.total_fees);
        println!("  Net P&L:               ${:+.4}", self.net_pnl);

        if self.total_trades > 0 {
            println!("\n⚠️  RISK METRICS");
            println!(
                "  Max Drawdown:          ${:.4} ({:.2}%)",
                self.max_drawdown, self.max_drawdown_pct
            );
            println!("  Best Trade:            ${:+.4}", self.best_trade);
            println!("  Worst Trade:           ${:+.4}", self.worst_trade);
            println!("  Profit Factor:         {:.2}", self.profit_factor);
            println!("  Avg RR:                1:{:.2}", self.avg_rr);

            println!("\n🕒 SESSIONS");
            for (session, (count, wins, net)) in self.session_breakdown() {
                println!(
                    "  {:<22} {} trades | WR {:.0}% | net ${:+.4}",
                    session,
                    count,
                    wins as f64 / count as f64 * 100.0,
                    net
                );
            }

            println!("\n🚪 EXIT REASONS");
            for (reason, count) in self.exit_breakdown() {
                println!("  {:<22} {}", reason, count);
            }
        }

        println!("\n═════════════════════════════════════════════════════════\n");
    }
}
