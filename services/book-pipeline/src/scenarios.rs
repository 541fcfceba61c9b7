//! Synthetic private-message scenarios
//!
//! Each scenario is a deterministic script of order states as a venue
//! would report them on a private stream. Harnesses use them to drive
//! order-state consumers without a live exchange connection.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::StreamKey;
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, RejectReason, Side};

/// Spacing between consecutive scripted messages (Unix nanos).
const STEP_NANOS: i64 = 1_000_000;

/// Partial prints of a `PartialFill`, as percent of the order quantity.
/// The remainder is filled by a final print.
const PARTIAL_FILL_PERCENTS: [u32; 2] = [40, 35];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioParseError {
    #[error("unknown scenario: {0}")]
    Unknown(String),
}

/// Named synthetic scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Acknowledged, then filled in one print.
    Fill,
    /// Acknowledged, then filled across several partial prints.
    PartialFill,
    /// Refused on entry.
    Reject,
    /// Acknowledged, then canceled.
    Cancel,
    /// Acknowledged, cancel refused, then filled.
    CancelReject,
}

impl Scenario {
    pub const ALL: &'static [Scenario] = &[
        Scenario::Fill,
        Scenario::PartialFill,
        Scenario::Reject,
        Scenario::Cancel,
        Scenario::CancelReject,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Scenario::Fill => "fill",
            Scenario::PartialFill => "partial_fill",
            Scenario::Reject => "reject",
            Scenario::Cancel => "cancel",
            Scenario::CancelReject => "cancel_reject",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Scenario {
    type Err = ScenarioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .iter()
            .copied()
            .find(|scenario| scenario.label() == s)
            .ok_or_else(|| ScenarioParseError::Unknown(s.to_string()))
    }
}

/// The order a scenario is played with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioOrder {
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
}

impl Default for ScenarioOrder {
    fn default() -> Self {
        Self {
            side: Side::BUY,
            price: Price::from_u64(100),
            quantity: Quantity::from_u64(10),
        }
    }
}

/// Play `scenario` for one order on `key`, starting at `base_ts`.
///
/// Returns every reported state in order; the last element is the
/// order's final state.
pub fn play(scenario: Scenario, template: &ScenarioOrder, key: &StreamKey, base_ts: i64) -> Vec<Order> {
    let ack = Order::new(
        key.provider.clone(),
        key.symbol.clone(),
        template.side,
        template.price,
        template.quantity,
        base_ts,
    );
    let at = |step: i64| base_ts + step * STEP_NANOS;

    match scenario {
        Scenario::Fill => {
            let filled = ack.filled(ack.quantity, at(1));
            vec![ack, filled]
        }
        Scenario::PartialFill => {
            let total = ack.quantity.as_decimal();
            let mut current = ack.clone();
            let mut reports = vec![ack];
            let mut step = 1;

            // A print that rounds to nothing, or would complete the order,
            // is skipped so only the final print reports Filled.
            for percent in PARTIAL_FILL_PERCENTS {
                let part = fraction(total, percent);
                if part.is_zero() || part >= current.remaining_quantity {
                    continue;
                }
                current = current.filled(part, at(step));
                reports.push(current.clone());
                step += 1;
            }

            reports.push(current.filled(current.remaining_quantity, at(step)));
            reports
        }
        Scenario::Reject => {
            vec![ack.with_status(OrderStatus::Rejected(RejectReason::InsufficientBalance), base_ts)]
        }
        Scenario::Cancel => {
            let canceled = ack.with_status(OrderStatus::Canceled, at(1));
            vec![ack, canceled]
        }
        Scenario::CancelReject => {
            let refused = ack.with_status(OrderStatus::CancelRejected(RejectReason::TooLateToCancel), at(1));
            let filled = refused.filled(refused.remaining_quantity, at(2));
            vec![ack, refused, filled]
        }
    }
}

/// `percent` of `total`, rounded to the total's scale.
fn fraction(total: Decimal, percent: u32) -> Quantity {
    let part = (total * Decimal::from(percent) / Decimal::from(100)).round_dp(total.scale());
    Quantity::try_new(part).unwrap_or(Quantity::ZERO)
}
