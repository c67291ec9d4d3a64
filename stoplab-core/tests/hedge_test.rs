//! Integration tests for hedge-lock mode.
//!
//! Tests:
//! 1. Full lock cycle: open pair, leg target, reopen at the next generation,
//!    net-profit liquidation
//! 2. Liquidation never fires at a net loss
//! 3. Legs hit on the same bar are each closed, one per cycle
//! 4. Quote-driven leg exits
//! 5. Replay through the paper gateway keeps both books in step

use chrono::{DateTime, Duration, TimeZone, Utc};
use stoplab_core::config::EngineConfig;
use stoplab_core::domain::{
    AccountSnapshot, Action, ActionKind, ActionReason, Bar, Fill, OrderSide, PositionSide, Quote,
    ScriptedSignals, Signal,
};
use stoplab_core::engine::{run_replay, PaperAccount, PaperGateway};
use stoplab_core::Engine;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn t(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap() + Duration::hours(i)
}

fn make_bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::new(t(i), open, high, low, close, 500.0)
}

fn quiet_bar(i: i64, close: f64) -> Bar {
    make_bar(i, close, close + 0.1, close - 0.1, close)
}

fn fill(action: &Action, side: OrderSide, price: f64, volume: f64, i: i64) -> Fill {
    Fill {
        action_id: action.id.expect("emitted actions carry an id"),
        time: t(i),
        side,
        price,
        volume,
    }
}

fn hedge_config() -> EngineConfig {
    EngineConfig {
        hedge_mode: true,
        fixed_take_distance: Some(3.0),
        grid_lot_multiplier: 2.0,
        hedge_max_excess: 100.0,
        hedge_min_profit: 20.0,
        ..EngineConfig::default()
    }
}

/// Open the locked pair at `price` and confirm both legs.
fn open_lock(engine: &mut Engine, i: i64, price: f64, balance: f64) {
    let action = engine
        .on_bar(&quiet_bar(i, price), &Signal::long(), &AccountSnapshot::flat(balance))
        .unwrap();
    assert_eq!(action.kind, ActionKind::OpenLock);
    assert_eq!(action.volume, 1.0);
    engine
        .on_fill(&fill(&action, OrderSide::Buy, price, 1.0, i))
        .unwrap();
    engine
        .on_fill(&fill(&action, OrderSide::Sell, price, 1.0, i))
        .unwrap();
    assert!(!engine.is_pending());
}

// ──────────────────────────────────────────────
// Lock cycle
// ──────────────────────────────────────────────

#[test]
fn full_lock_cycle() {
    let mut engine = Engine::new(hedge_config()).unwrap();
    open_lock(&mut engine, 0, 100.0, 10_000.0);
    assert_eq!(engine.legs().len(), 2);
    assert_eq!(engine.lock().unwrap().balance_at_last_flat(), 10_000.0);

    // long leg reaches its target
    let acct = AccountSnapshot::new(10_000.0, 10_000.0);
    let close = engine
        .on_bar(&make_bar(1, 100.5, 103.5, 100.2, 103.2), &Signal::flat(), &acct)
        .unwrap();
    assert_eq!(close.kind, ActionKind::CloseLeg);
    assert_eq!(close.side, PositionSide::Long);
    assert_eq!(close.reason, ActionReason::LegTarget);
    assert_eq!(close.price_hint, Some(103.0));
    engine
        .on_fill(&fill(&close, OrderSide::Sell, 103.0, 1.0, 1))
        .unwrap();
    assert_eq!(engine.legs().len(), 1);
    assert_eq!(engine.trades()[0].pnl, 3.0);

    // missing long side reopens at base × multiplier
    let acct = AccountSnapshot::new(9_999.0, 10_003.0);
    let reopen = engine
        .on_bar(&quiet_bar(2, 102.0), &Signal::flat(), &acct)
        .unwrap();
    assert_eq!(reopen.kind, ActionKind::OpenLeg);
    assert_eq!(reopen.side, PositionSide::Long);
    assert_eq!(reopen.volume, 2.0);
    engine
        .on_fill(&fill(&reopen, OrderSide::Buy, 102.0, 2.0, 2))
        .unwrap();
    assert_eq!(engine.lock().unwrap().generation(), 1);

    // floating loss 150 > 100, equity 10_050 > 10_000 + 20
    let acct = AccountSnapshot::new(10_050.0, 10_200.0);
    let liquidate = engine
        .on_bar(&quiet_bar(3, 101.0), &Signal::flat(), &acct)
        .unwrap();
    assert_eq!(
        liquidate.kind,
        ActionKind::LiquidateAll {
            long_volume: 2.0,
            short_volume: 1.0
        }
    );
    assert_eq!(liquidate.reason, ActionReason::HedgeLiquidation);
    let lock = engine.lock().unwrap();
    assert_eq!(lock.generation(), 0);
    assert_eq!(lock.balance_at_last_flat(), 10_050.0);

    engine
        .on_fill(&fill(&liquidate, OrderSide::Sell, 101.0, 2.0, 4))
        .unwrap();
    engine
        .on_fill(&fill(&liquidate, OrderSide::Buy, 101.0, 1.0, 4))
        .unwrap();
    assert!(engine.legs().is_empty());
    assert!(!engine.is_pending());
    assert_eq!(engine.trades().len(), 3);
    assert!(engine
        .trades()
        .iter()
        .skip(1)
        .all(|t| t.exit_reason == ActionReason::HedgeLiquidation));

    // a new cycle starts from the base unit
    let next = engine
        .on_bar(&quiet_bar(5, 101.0), &Signal::short(), &AccountSnapshot::flat(10_050.0))
        .unwrap();
    assert_eq!(next.kind, ActionKind::OpenLock);
    assert_eq!(next.volume, 1.0);
}

#[test]
fn no_liquidation_at_net_loss() {
    let mut engine = Engine::new(hedge_config()).unwrap();
    open_lock(&mut engine, 0, 100.0, 10_000.0);

    // floating loss is large but equity is below the last flat balance
    let acct = AccountSnapshot::new(9_800.0, 10_100.0);
    let action = engine
        .on_bar(&quiet_bar(1, 100.5), &Signal::flat(), &acct)
        .unwrap();
    assert!(action.is_none());
}

#[test]
fn flat_signal_does_not_open_a_lock() {
    let mut engine = Engine::new(hedge_config()).unwrap();
    let action = engine
        .on_bar(&quiet_bar(0, 100.0), &Signal::flat(), &AccountSnapshot::flat(1_000.0))
        .unwrap();
    assert!(action.is_none());
    assert!(engine.lock().unwrap().is_empty());
}

#[test]
fn both_legs_hit_on_one_bar_close_in_turn() {
    let mut engine = Engine::new(EngineConfig {
        fixed_stop_distance: Some(2.0),
        ..hedge_config()
    })
    .unwrap();
    open_lock(&mut engine, 0, 100.0, 10_000.0);

    // long target 103 and short stop 102 both inside the range
    let acct = AccountSnapshot::new(10_000.0, 10_000.0);
    let first = engine
        .on_bar(&make_bar(1, 100.2, 103.5, 99.9, 101.0), &Signal::flat(), &acct)
        .unwrap();
    assert_eq!(first.kind, ActionKind::CloseLeg);
    assert_eq!(first.side, PositionSide::Long);
    assert_eq!(first.price_hint, Some(103.0));
    let short = engine.lock().unwrap().leg(PositionSide::Short).unwrap();
    assert!(short.pending_exit.is_some());
    engine
        .on_fill(&fill(&first, OrderSide::Sell, 103.0, 1.0, 1))
        .unwrap();

    // price is back inside both levels; the short breach is still serviced
    let acct = AccountSnapshot::new(10_002.5, 10_003.0);
    let second = engine
        .on_bar(&quiet_bar(2, 100.5), &Signal::flat(), &acct)
        .unwrap();
    assert_eq!(second.kind, ActionKind::CloseLeg);
    assert_eq!(second.side, PositionSide::Short);
    assert_eq!(second.reason, ActionReason::LegStop);
    assert_eq!(second.price_hint, Some(102.0));
    engine
        .on_fill(&fill(&second, OrderSide::Buy, 102.0, 1.0, 2))
        .unwrap();

    assert!(engine.legs().is_empty());
    let pnl: Vec<f64> = engine.trades().iter().map(|t| t.pnl).collect();
    assert_eq!(pnl, vec![3.0, -2.0]);

    let idle = engine
        .on_bar(&quiet_bar(3, 100.5), &Signal::flat(), &AccountSnapshot::flat(10_001.0))
        .unwrap();
    assert!(idle.is_none());
}

#[test]
fn quote_services_a_leg_hit_left_by_the_bar() {
    let mut engine = Engine::new(EngineConfig {
        fixed_stop_distance: Some(2.0),
        ..hedge_config()
    })
    .unwrap();
    open_lock(&mut engine, 0, 100.0, 10_000.0);

    let acct = AccountSnapshot::new(10_000.0, 10_000.0);
    let first = engine
        .on_bar(&make_bar(1, 100.2, 103.5, 99.9, 101.0), &Signal::flat(), &acct)
        .unwrap();
    engine
        .on_fill(&fill(&first, OrderSide::Sell, 103.0, 1.0, 1))
        .unwrap();

    // a quote well away from the short stop still closes the marked leg
    let action = engine
        .on_quote(&Quote::new(t(2), 100.4, 100.5), &AccountSnapshot::new(10_002.5, 10_003.0))
        .unwrap();
    assert_eq!(action.kind, ActionKind::CloseLeg);
    assert_eq!(action.side, PositionSide::Short);
    assert_eq!(action.reason, ActionReason::LegStop);
}

// ──────────────────────────────────────────────
// Quotes
// ──────────────────────────────────────────────

#[test]
fn quote_closes_short_leg_at_target() {
    let mut engine = Engine::new(hedge_config()).unwrap();
    open_lock(&mut engine, 0, 100.0, 10_000.0);

    // short target 97 reached on the ask
    let quote = Quote::new(t(1), 96.8, 96.9);
    let action = engine
        .on_quote(&quote, &AccountSnapshot::new(10_000.0, 10_000.0))
        .unwrap();
    assert_eq!(action.kind, ActionKind::CloseLeg);
    assert_eq!(action.side, PositionSide::Short);
    assert_eq!(action.volume, 1.0);
    assert_eq!(action.price_hint, Some(96.9));
}

// ──────────────────────────────────────────────
// Replay
// ──────────────────────────────────────────────

#[test]
fn replay_keeps_books_in_step() {
    let mut engine = Engine::new(hedge_config()).unwrap();
    let mut gateway = PaperGateway::new(PaperAccount::new(10_000.0, 1.0));
    let bars = vec![
        quiet_bar(0, 100.0),
        quiet_bar(1, 100.0),
        make_bar(2, 100.5, 103.5, 100.2, 103.2),
        quiet_bar(3, 102.0),
        quiet_bar(4, 101.0),
    ];
    let mut signals = ScriptedSignals::new(vec![Signal::long()]);

    let summary = run_replay(&mut engine, &bars, &mut signals, &mut gateway).unwrap();

    // pair opened at 100, long leg closed at 103, long reopened at the next open (x2)
    assert_eq!(summary.trades.len(), 1);
    assert_eq!(summary.trades[0].pnl, 3.0);
    let account = gateway.account();
    assert_eq!(account.balance(), 10_003.0);
    assert_eq!(account.book(PositionSide::Long).unwrap().volume, 2.0);
    assert_eq!(account.book(PositionSide::Short).unwrap().volume, 1.0);
    assert_eq!(engine.lock().unwrap().volume(PositionSide::Long), 2.0);
    assert_eq!(engine.lock().unwrap().generation(), 1);
}
