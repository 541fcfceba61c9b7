//! Types library for the order-book reconstruction pipeline
//!
//! Shared vocabulary between the provider/connection layer, the
//! reconstruction engine, and downstream consumers.
//!
//! # Modules
//! - `ids`: Identifiers (ProviderId, Symbol, StreamKey, OrderId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Sides and private-message order records
//! - `trade`: Public trade prints
//! - `time`: Unix-nanosecond clock helpers

pub mod ids;
pub mod numeric;
pub mod order;
pub mod time;
pub mod trade;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::time::*;
    pub use crate::trade::*;
}
