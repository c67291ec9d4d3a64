//! Integration tests for protective levels and position management.
//!
//! Tests:
//! 1. Ratchet property: trailing stops are monotonically non-decreasing (long)
//!    or non-increasing (short) across price paths.
//! 2. Anti-stickiness: a trailed position exits once price turns.
//! 3. Behavioral contracts: breakeven then trail, point scaling, pyramiding.

use chrono::{DateTime, Duration, TimeZone, Utc};
use stoplab_core::config::EngineConfig;
use stoplab_core::domain::{
    AccountSnapshot, ActionKind, ActionReason, Bar, Fill, OrderSide, PositionSide, Signal,
};
use stoplab_core::protective::{
    IntrabarPolicy, ProtectiveLevel, ProtectiveStopEngine, StopKind, TrailReference,
};
use stoplab_core::Engine;

// ──────────────────────────────────────────────
// Helpers
// ──────────────────────────────────────────────

fn t(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap() + Duration::days(i)
}

/// Bar around `close` with a one-point range.
fn make_bar(i: i64, close: f64) -> Bar {
    Bar::new(t(i), close, close + 0.5, close - 0.5, close, 1_000.0)
}

fn trailing_config() -> EngineConfig {
    EngineConfig {
        fixed_stop_distance: Some(5.0),
        trailing_start_distance: 1.0,
        trailing_distance: Some(2.0),
        trailing_step: 0.25,
        ..EngineConfig::default()
    }
}

/// Walk a close path; return the stop after each bar and the bar index of
/// the first trigger, if any.
fn walk(
    engine: &ProtectiveStopEngine,
    side: PositionSide,
    entry: f64,
    closes: &[f64],
) -> (Vec<f64>, Option<usize>) {
    let mut level: ProtectiveLevel = engine.open_level(side, entry, None);
    let mut stops = Vec::new();
    for (i, &close) in closes.iter().enumerate() {
        let update = engine.update_side(side, entry, &level, &make_bar(i as i64 + 1, close));
        if update.breach().is_some() {
            return (stops, Some(i));
        }
        level = update.level;
        stops.push(level.stop_price.unwrap());
    }
    (stops, None)
}

// ──────────────────────────────────────────────
// Ratchet property — deterministic paths
// ──────────────────────────────────────────────

#[test]
fn ratchet_long_rising_path() {
    let engine = ProtectiveStopEngine::from_config(&trailing_config());
    let closes: Vec<f64> = (1..=30).map(|i| 100.0 + i as f64 * 0.4).collect();
    let (stops, hit) = walk(&engine, PositionSide::Long, 100.0, &closes);
    assert!(hit.is_none());
    for w in stops.windows(2) {
        assert!(w[1] >= w[0], "long stop loosened: {} -> {}", w[0], w[1]);
    }
    assert!(stops.last().unwrap() > &100.0);
}

#[test]
fn ratchet_short_falling_path() {
    let engine = ProtectiveStopEngine::from_config(&trailing_config());
    let closes: Vec<f64> = (1..=30).map(|i| 100.0 - i as f64 * 0.4).collect();
    let (stops, hit) = walk(&engine, PositionSide::Short, 100.0, &closes);
    assert!(hit.is_none());
    for w in stops.windows(2) {
        assert!(w[1] <= w[0], "short stop loosened: {} -> {}", w[0], w[1]);
    }
    assert!(stops.last().unwrap() < &100.0);
}

#[test]
fn ratchet_long_choppy_path() {
    let engine = ProtectiveStopEngine::from_config(&trailing_config());
    let closes = [101.0, 102.5, 101.8, 103.0, 102.2, 104.0, 103.1, 104.5];
    let (stops, _) = walk(&engine, PositionSide::Long, 100.0, &closes);
    for w in stops.windows(2) {
        assert!(w[1] >= w[0]);
    }
}

// ──────────────────────────────────────────────
// Anti-stickiness
// ──────────────────────────────────────────────

#[test]
fn trailed_long_exits_when_price_turns() {
    let engine = ProtectiveStopEngine::from_config(&trailing_config());
    let mut closes: Vec<f64> = (1..=10).map(|i| 100.0 + i as f64).collect();
    closes.extend((1..=10).map(|i| 110.0 - i as f64));
    let (stops, hit) = walk(&engine, PositionSide::Long, 100.0, &closes);
    let exit_bar = hit.expect("stop must fire on the way down");
    assert!(exit_bar > 10);
    // stop trailed to 110 - 2
    assert!((stops.last().unwrap() - 108.0).abs() < 1e-9);
}

#[test]
fn trailed_short_exits_when_price_turns() {
    let engine = ProtectiveStopEngine::from_config(&trailing_config());
    let mut closes: Vec<f64> = (1..=5).map(|i| 100.0 - i as f64).collect();
    closes.extend((1..=5).map(|i| 95.0 + i as f64));
    let (_, hit) = walk(&engine, PositionSide::Short, 100.0, &closes);
    assert!(hit.is_some());
}

// ──────────────────────────────────────────────
// Behavioral contracts
// ──────────────────────────────────────────────

#[test]
fn breakeven_then_trail_short() {
    let engine = ProtectiveStopEngine::from_config(&EngineConfig {
        fixed_stop_distance: Some(3.0),
        breakeven_trigger: Some(1.0),
        trailing_start_distance: 4.0,
        trailing_distance: Some(1.5),
        trailing_step: 0.5,
        ..EngineConfig::default()
    });
    let side = PositionSide::Short;
    let level = engine.open_level(side, 50.0, None);
    assert_eq!(level.stop_price, Some(53.0));

    let u = engine.update_side(side, 50.0, &level, &make_bar(1, 48.8));
    assert_eq!(u.level.stop_price, Some(50.0));
    assert_eq!(u.level.stop_kind, StopKind::Breakeven);
    assert!(u.level.breakeven_applied);
    assert!(!u.level.trailing_active);

    let u = engine.update_side(side, 50.0, &u.level, &make_bar(2, 45.5));
    assert!(u.level.trailing_active);
    assert_eq!(u.level.stop_price, Some(47.0));
    assert_eq!(u.level.stop_kind, StopKind::Trailing);

    let u = engine.update_side(side, 50.0, &u.level, &make_bar(3, 47.2));
    let hit = u.breach().expect("bar high 47.7 crosses the 47.0 stop");
    assert_eq!(hit.reason(), ActionReason::TrailingStop);
}

#[test]
fn distances_scale_with_point_size() {
    let engine = ProtectiveStopEngine::from_config(&EngineConfig {
        point_size: 0.0001,
        fixed_stop_distance: Some(20.0),
        fixed_take_distance: Some(40.0),
        ..EngineConfig::default()
    });
    let level = engine.open_level(PositionSide::Long, 1.1000, None);
    assert!((level.stop_price.unwrap() - 1.0980).abs() < 1e-12);
    assert!((level.take_price.unwrap() - 1.1040).abs() < 1e-12);
}

#[test]
fn open_proximity_resolves_by_distance_from_open() {
    let engine = ProtectiveStopEngine::from_config(&EngineConfig {
        fixed_stop_distance: Some(2.0),
        fixed_take_distance: Some(2.0),
        intrabar_policy: IntrabarPolicy::OpenProximity,
        ..EngineConfig::default()
    });
    let level = engine.open_level(PositionSide::Long, 100.0, None);
    // opens near the target
    let bar = Bar::new(t(1), 101.6, 102.5, 97.5, 99.0, 1.0);
    let hit = engine.check_bar(PositionSide::Long, &level, &bar).unwrap();
    assert_eq!(hit.reason(), ActionReason::TakeProfit);
}

#[test]
fn extreme_reference_trails_from_the_high() {
    let engine = ProtectiveStopEngine::from_config(&EngineConfig {
        trail_reference: TrailReference::Extreme,
        ..trailing_config()
    });
    let level = engine.open_level(PositionSide::Long, 100.0, None);
    let u = engine.update_side(PositionSide::Long, 100.0, &level, &make_bar(1, 102.0));
    // high 102.5 - 2.0
    assert_eq!(u.level.stop_price, Some(100.5));
}

// ──────────────────────────────────────────────
// Pyramiding through the engine
// ──────────────────────────────────────────────

#[test]
fn pyramid_add_rebases_levels_and_respects_cap() {
    let mut engine = Engine::new(EngineConfig {
        fixed_stop_distance: Some(2.0),
        max_pyramid_units: 2,
        pyramid_add_interval: 1.0,
        ..EngineConfig::default()
    })
    .unwrap();
    let acct = AccountSnapshot::flat(10_000.0);
    let signal = Signal::long().with_atr(1.0);
    let quiet = |i: i64, c: f64| Bar::new(t(i), c, c + 0.1, c - 0.1, c, 1.0);

    let open = engine.on_bar(&quiet(0, 100.0), &signal, &acct).unwrap();
    engine
        .on_fill(&Fill {
            action_id: open.id.unwrap(),
            time: t(0),
            side: OrderSide::Buy,
            price: 100.0,
            volume: 1.0,
        })
        .unwrap();

    let add = engine.on_bar(&quiet(1, 101.2), &signal, &acct).unwrap();
    assert_eq!(add.kind, ActionKind::AddUnit);
    assert_eq!(add.reason, ActionReason::Pyramid);
    assert_eq!(add.volume, 1.0);
    engine
        .on_fill(&Fill {
            action_id: add.id.unwrap(),
            time: t(1),
            side: OrderSide::Buy,
            price: 101.2,
            volume: 1.0,
        })
        .unwrap();

    assert_eq!(engine.position().volume, 2.0);
    assert!((engine.position().average_entry_price - 100.6).abs() < 1e-9);
    assert!((engine.level().unwrap().stop_price.unwrap() - 98.6).abs() < 1e-9);
    assert_eq!(engine.pyramid().unwrap().units(), 2);

    let capped = engine.on_bar(&quiet(2, 103.0), &signal, &acct).unwrap();
    assert!(capped.is_none());
}

#[test]
fn add_after_breakeven_keeps_stop_at_entry() {
    let mut engine = Engine::new(EngineConfig {
        fixed_stop_distance: Some(2.0),
        breakeven_trigger: Some(1.0),
        max_pyramid_units: 2,
        pyramid_add_interval: 1.0,
        ..EngineConfig::default()
    })
    .unwrap();
    let acct = AccountSnapshot::flat(10_000.0);
    let signal = Signal::long().with_atr(1.0);
    let quiet = |i: i64, c: f64| Bar::new(t(i), c, c + 0.1, c - 0.1, c, 1.0);
    let buy = |action: &stoplab_core::domain::Action, i: i64, price: f64| Fill {
        action_id: action.id.unwrap(),
        time: t(i),
        side: OrderSide::Buy,
        price,
        volume: 1.0,
    };

    let open = engine.on_bar(&quiet(0, 100.0), &signal, &acct).unwrap();
    engine.on_fill(&buy(&open, 0, 100.0)).unwrap();

    // +1.2 moves the stop to breakeven, then the add triggers on the same bar
    let add = engine.on_bar(&quiet(1, 101.2), &signal, &acct).unwrap();
    assert_eq!(add.kind, ActionKind::AddUnit);
    assert!(engine.level().unwrap().breakeven_applied);
    assert_eq!(engine.level().unwrap().stop_price, Some(100.0));
    engine.on_fill(&buy(&add, 1, 101.2)).unwrap();

    let avg = engine.position().average_entry_price;
    let level = engine.level().unwrap();
    assert!((avg - 100.6).abs() < 1e-9);
    assert!(level.stop_price.unwrap() >= avg - 1e-12);
    assert_eq!(level.stop_kind, StopKind::Breakeven);

    // a touch of the stop now exits flat, not at a loss
    let exit = engine
        .on_bar(&Bar::new(t(2), 101.0, 101.1, 100.5, 100.8, 1.0), &Signal::flat(), &acct)
        .unwrap();
    assert_eq!(exit.kind, ActionKind::Close);
    assert_eq!(exit.reason, ActionReason::BreakevenStop);
    assert!(exit.price_hint.unwrap() >= avg - 1e-12);
}
