//! Domain types shared by every engine component.

pub mod account;
pub mod action;
pub mod bar;
pub mod fill;
pub mod ids;
pub mod instrument;
pub mod position;
pub mod signal;
pub mod trade;

pub use account::AccountSnapshot;
pub use action::{Action, ActionKind, ActionReason, PlannedFill};
pub use bar::{Bar, Quote};
pub use fill::Fill;
pub use ids::{ActionId, IdGen};
pub use instrument::VolumeSpec;
pub use position::{ClosedPortion, FillOutcome, OrderSide, Position, PositionSide};
pub use signal::{ScriptedSignals, Signal, SignalDirection, SignalSource};
pub use trade::TradeRecord;

/// Tolerance for volume and price comparisons.
///
/// Volumes below this are treated as zero when deciding whether a position
/// or a pending order has been fully consumed.
pub const EPSILON: f64 = 1e-9;
