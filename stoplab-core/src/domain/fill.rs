use crate::domain::ids::ActionId;
use crate::domain::position::OrderSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution report from the gateway.
///
/// A single action may be confirmed by several fills (partial fills, or the
/// close and open halves of a reversal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub action_id: ActionId,
    pub time: DateTime<Utc>,
    pub side: OrderSide,
    pub price: f64,
    pub volume: f64,
}
