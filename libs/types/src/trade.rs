//! Public trade prints
//!
//! A trade is immutable once produced. Ownership moves to the consumer on
//! delivery; producers keep no reference to it.

use crate::ids::{ProviderId, StreamKey, Symbol};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An executed trade reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub provider: ProviderId,
    pub symbol: Symbol,
    pub price: Price,
    pub size: Quantity,
    /// Aggressor side
    pub side: Side,
    /// Unix nanos, exchange clock
    pub timestamp: i64,
    /// Provider sequence for this trade stream
    pub sequence: u64,
}

impl Trade {
    /// Key of the trade stream this print belongs to
    pub fn stream_key(&self) -> StreamKey {
        StreamKey {
            provider: self.provider.clone(),
            symbol: self.symbol.clone(),
        }
    }

    /// Trade value (price × size)
    pub fn notional(&self) -> Decimal {
        self.price.as_decimal() * self.size.as_decimal()
    }
}
