//! Driftwood Core - Shared types library.
//!
//! This crate provides the domain types used across all Driftwood components:
//! - `engine` - The inventory-and-cart consistency engine
//! - `integration-tests` - Cross-component test suite
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no store access, no
//! asynchrony. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype keys, prices, stock rows, carts, and orders

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
