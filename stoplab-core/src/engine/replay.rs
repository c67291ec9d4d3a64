//! Historical replay: feed bars through an engine and a paper gateway.
//!
//! Per bar:
//! 1. Fill actions queued on the previous bar at this bar's open
//! 2. Snapshot the account at the close
//! 3. Evaluate the signal and run the engine
//! 4. Submit the action; protective exits fill immediately at their level
//! 5. Mark equity at the close

use crate::domain::{Action, Bar, SignalSource, TradeRecord};
use crate::engine::event_loop::Engine;
use crate::engine::gateway::{OrderGateway, PaperGateway};
use crate::engine::state::EngineStats;
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Outcome of a replay run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Config fingerprint of the engine that produced this run.
    pub fingerprint: String,
    pub bar_count: usize,
    /// Every action the engine emitted, in order.
    pub actions: Vec<Action>,
    pub trades: Vec<TradeRecord>,
    pub final_balance: f64,
    pub final_equity: f64,
    /// Equity at each bar close.
    pub equity_curve: Vec<f64>,
    /// Largest peak-to-trough equity decline as a fraction of the peak.
    pub max_drawdown: f64,
    pub stats: EngineStats,
}

impl ReplaySummary {
    pub fn net_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.trades.is_empty() {
            return None;
        }
        let wins = self.trades.iter().filter(|t| t.is_winner()).count();
        Some(wins as f64 / self.trades.len() as f64)
    }
}

/// Run `bars` through `engine` in order.
///
/// Stops at the first engine error; the engine is left halted.
pub fn run_replay(
    engine: &mut Engine,
    bars: &[Bar],
    source: &mut impl SignalSource,
    gateway: &mut PaperGateway,
) -> Result<ReplaySummary, EngineError> {
    let mut equity_curve = Vec::with_capacity(bars.len());
    let mut actions = Vec::new();

    for bar in bars {
        gateway.set_clock(bar.open_time);
        for fill in gateway.fill_queued(bar.open, bar.open_time) {
            engine.on_fill(&fill)?;
        }

        let account = gateway.account().snapshot(bar.close);
        let signal = source.evaluate(bar);
        let action = engine.on_bar(bar, &signal, &account)?;

        for fill in gateway.submit(&action) {
            engine.on_fill(&fill)?;
        }
        if !action.is_none() {
            actions.push(action);
        }

        equity_curve.push(gateway.account().equity(bar.close));
    }

    let last_close = bars.last().map(|b| b.close);
    let final_balance = gateway.account().balance();
    let final_equity = last_close.map_or(final_balance, |c| gateway.account().equity(c));
    let summary = ReplaySummary {
        fingerprint: engine.fingerprint().to_string(),
        bar_count: bars.len(),
        actions,
        trades: engine.trades().to_vec(),
        final_balance,
        final_equity,
        max_drawdown: max_drawdown(&equity_curve),
        equity_curve,
        stats: engine.stats().clone(),
    };
    info!(
        fingerprint = %engine.fingerprint().short(),
        bars = summary.bar_count,
        trades = summary.trades.len(),
        final_equity = summary.final_equity,
        max_drawdown = summary.max_drawdown,
        "replay complete"
    );
    Ok(summary)
}

fn max_drawdown(curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &equity in curve {
        peak = peak.max(equity);
        if peak > 0.0 {
            worst = worst.max((peak - equity) / peak);
        }
    }
    worst
}
