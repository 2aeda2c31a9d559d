//! Bamazon client library.
//!
//! Client-side commerce state coordinator: keeps the session credential, the
//! cart, the checkout flow and the order views consistent with four
//! separately hosted backends (auth, catalog, cart, orders).
//!
//! # Architecture
//!
//! - [`session::Session`] owns the credential and is injected everywhere
//! - [`gateway::Gateway`] wraps every backend call in one [`gateway::Envelope`]
//! - [`cart::CartCoordinator`] hides the remote/local cart behind one interface
//! - [`checkout::CheckoutSequencer`] drives address resolution and submission
//! - [`orders::OrderStatusProjector`] turns orders into status-labelled views
//! - [`context::ShopContext`] wires all of the above from [`config::ClientConfig`]
//!
//! Rendering is left to callers (see the `bamazon-cli` crate).

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod geocode;
pub mod orders;
pub mod session;
pub mod storage;

pub use context::ShopContext;
pub use error::{ClientError, ErrorKind, Result, ValidationError};
