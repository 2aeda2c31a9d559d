//! Bamazon Core - Shared types library.
//!
//! This crate provides common types used across all Bamazon components:
//! - `client` - Commerce state coordinator (session, cart, checkout, orders)
//! - `cli` - Command-line adapter driving the client
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, money and totals,
//!   order statuses, and usernames

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
