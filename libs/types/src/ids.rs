//! Identifier types for providers, instruments, and streams
//!
//! A book or trade stream is keyed by the pair (provider, symbol): the same
//! instrument quoted by two exchanges is two independent streams.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of an exchange-facing data source (e.g. "binance", "kraken").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Instrument symbol as quoted by its provider.
///
/// No format is imposed: "BTC/USDT", "BTCUSDT" and "XBT-PERP" are all valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Try to create a Symbol, returning None for blank input
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Key of one logical stream: one provider's feed for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub provider: ProviderId,
    pub symbol: Symbol,
}

impl StreamKey {
    pub fn new(provider: impl Into<ProviderId>, symbol: impl Into<Symbol>) -> Self {
        Self {
            provider: provider.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.symbol)
    }
}

/// Unique identifier for an order on a private-message stream
///
/// Uses UUID v7 for time-based sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Create a new OrderId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_creation() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2, "OrderIds should be unique");
    }

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_symbol_accepts_any_venue_format() {
        assert_eq!(Symbol::new("BTC/USDT").as_str(), "BTC/USDT");
        assert_eq!(Symbol::new("BTCUSDT").as_str(), "BTCUSDT");
        assert!(Symbol::try_new("   ").is_none());
    }

    #[test]
    fn test_stream_key_display() {
        let key = StreamKey::new("binance", "BTCUSDT");
        assert_eq!(key.to_string(), "binance:BTCUSDT");
    }

    #[test]
    fn test_stream_key_distinguishes_providers() {
        let a = StreamKey::new("binance", "BTCUSDT");
        let b = StreamKey::new("kraken", "BTCUSDT");
        assert_ne!(a, b);
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("ETH/USDC");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"ETH/USDC\"");

        let deserialized: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(symbol, deserialized);
    }
}
