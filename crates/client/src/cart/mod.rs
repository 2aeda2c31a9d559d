//! Cart coordination.
//!
//! A cart lives either on the cart backend ([`RemoteCart`]) or in client
//! storage ([`LocalCart`]). Both implement [`CartBackend`], and
//! [`CartCoordinator`] is the only thing the rest of the client talks to.
//!
//! There is no reconciliation between the two representations: switching
//! mode mid-session starts from whatever the newly selected backend holds.

mod coordinator;
mod local;
mod remote;

pub use coordinator::{CartCoordinator, CartSnapshot};
pub use local::LocalCart;
pub use remote::RemoteCart;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bamazon_core::{CartLineId, DerivedTotals, ProductId};

use crate::error::{Result, ValidationError};

// =============================================================================
// Types
// =============================================================================

/// One product in the cart.
///
/// `quantity` is never zero; a zero quantity means the line is removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Row id on the cart backend (remote mode only).
    pub line_id: Option<CartLineId>,
}

impl CartLine {
    /// Reference that identifies this line to its backend.
    #[must_use]
    pub const fn line_ref(&self) -> LineRef {
        match self.line_id {
            Some(id) => LineRef::Line(id),
            None => LineRef::Product(self.product_id),
        }
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Identifies a cart line for update or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineRef {
    /// Backend row id.
    Line(CartLineId),
    /// The line holding this product.
    Product(ProductId),
}

/// Which backend holds the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartMode {
    #[default]
    Remote,
    Local,
}

impl CartMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for CartMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CartMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(format!("invalid cart mode: {other} (expected remote or local)")),
        }
    }
}

// =============================================================================
// CartBackend
// =============================================================================

/// Storage strategy for a cart.
///
/// Every method is async even when the implementation is synchronous, so
/// callers cannot tell the backends apart. Implementations perform each
/// mutation as one atomic step (one request, or one read-modify-write).
#[async_trait]
pub trait CartBackend: Send + Sync {
    fn mode(&self) -> CartMode;

    /// Current lines, in backend order.
    async fn lines(&self) -> Result<Vec<CartLine>>;

    /// Add `quantity` of a product, merging into an existing line.
    async fn add(&self, product_id: ProductId, unit_price: Decimal, quantity: u32) -> Result<()>;

    /// Replace a line's quantity. `quantity` is at least 1.
    async fn set_quantity(&self, line: LineRef, quantity: u32) -> Result<()>;

    /// Remove a line. Removing an absent line succeeds.
    async fn remove(&self, line: LineRef) -> Result<()>;

    /// Remove every line.
    async fn clear(&self) -> Result<()>;

    /// Bring the cart in line with a just-placed order.
    async fn order_placed(&self) -> Result<()>;
}

// =============================================================================
// Helpers
// =============================================================================

/// `Σ quantity` over `lines`.
#[must_use]
pub fn item_count(lines: &[CartLine]) -> u64 {
    lines.iter().map(|line| u64::from(line.quantity)).sum()
}

/// Totals for `lines`.
#[must_use]
pub fn totals(lines: &[CartLine]) -> DerivedTotals {
    DerivedTotals::from_lines(lines.iter().map(|line| (line.unit_price, line.quantity)))
}

/// Parse a quantity typed by the user.
///
/// Accepts a whole number, including zero; rejects anything else.
///
/// # Errors
///
/// Returns `ValidationError::InvalidQuantity` for non-numeric or negative
/// input.
pub fn parse_quantity(input: &str) -> std::result::Result<u32, ValidationError> {
    let trimmed = input.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| ValidationError::InvalidQuantity(trimmed.to_string()))
}
