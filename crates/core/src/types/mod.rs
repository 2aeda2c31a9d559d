//! Core types for Bamazon.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod status;
pub mod username;

pub use id::*;
pub use money::{DerivedTotals, TAX_RATE, format_amount, round_for_display};
pub use status::*;
pub use username::{Username, UsernameError};
