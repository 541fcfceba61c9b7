//! Sides and private-message order records
//!
//! `Side` is the aggressor/order side, `BookSide` is the side of the book a
//! price level rests on. Order records only appear on private-message
//! streams (scenario playback); the book itself is aggregated by level.

use crate::ids::{OrderId, ProviderId, Symbol};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }

    /// The book side an order of this side rests on
    pub fn book_side(&self) -> BookSide {
        match self {
            Side::BUY => BookSide::Bid,
            Side::SELL => BookSide::Ask,
        }
    }
}

/// Side of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    pub fn label(&self) -> &'static str {
        match self {
            BookSide::Bid => "bid",
            BookSide::Ask => "ask",
        }
    }
}

/// Order status as reported on a private-message stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum OrderStatus {
    /// Acknowledged by the venue, nothing filled yet
    #[serde(rename = "NEW")]
    New,

    /// Some quantity filled, remainder still working
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,

    /// Completely filled (terminal)
    #[serde(rename = "FILLED")]
    Filled,

    /// Canceled (terminal)
    #[serde(rename = "CANCELED")]
    Canceled,

    /// Refused by the venue (terminal)
    #[serde(rename = "REJECTED")]
    Rejected(RejectReason),

    /// A cancel request was refused; the order keeps working
    #[serde(rename = "CANCEL_REJECTED")]
    CancelRejected(RejectReason),
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected(_)
        )
    }
}

/// Reasons a venue gives when refusing an order or a cancel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InsufficientBalance,
    InvalidPrice,
    UnknownOrder,
    TooLateToCancel,
    RateLimited,
}

/// Order record on a private-message stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub provider: ProviderId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub status: OrderStatus,
    pub updated_at: i64, // Unix nanos
    pub version: u64,
}

impl Order {
    /// Create a new acknowledged order
    pub fn new(
        provider: ProviderId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            provider,
            symbol,
            side,
            price,
            quantity,
            filled_quantity: Quantity::zero(),
            remaining_quantity: quantity,
            status: OrderStatus::New,
            updated_at: timestamp,
            version: 0,
        }
    }

    /// Check quantity invariant: filled + remaining = total
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity.as_decimal() + self.remaining_quantity.as_decimal()
            == self.quantity.as_decimal()
    }

    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Return the next state after a fill of `fill_quantity`.
    ///
    /// The fill is capped at the remaining quantity.
    pub fn filled(&self, fill_quantity: Quantity, timestamp: i64) -> Self {
        let fill = fill_quantity.min(self.remaining_quantity);
        let mut next = self.clone();
        next.filled_quantity = self.filled_quantity + fill;
        next.remaining_quantity = self.remaining_quantity - fill;
        next.status = if next.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        next.updated_at = timestamp;
        next.version += 1;
        next
    }

    /// Return the next state with `status` applied.
    pub fn with_status(&self, status: OrderStatus, timestamp: i64) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = timestamp;
        next.version += 1;
        next
    }
}
