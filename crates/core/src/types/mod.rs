//! Core types for Driftwood.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod order;
pub mod price;
pub mod stock;

pub use cart::{Cart, CartItem, ProductSnapshot};
pub use email::{Email, EmailError};
pub use id::*;
pub use order::{Order, OrderStatus, ShippingInfo};
pub use price::{CurrencyCode, Price};
pub use stock::{DecrementLine, DecrementRequest, StockKey, StockRow};
