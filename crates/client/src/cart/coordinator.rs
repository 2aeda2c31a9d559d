//! The cart coordinator.
//!
//! Owns the published [`CartSnapshot`] and is the only path through which the
//! cart is read or changed.
//!
//! Two ordering rules hold:
//!
//! - Mutations are single-flight: each one (and the reload after it) runs to
//!   completion before the next starts, so rapid changes cannot lose updates.
//! - Reads are last-issued-wins: every read takes a generation ticket when it
//!   starts, and its result is only published if no later-issued read has
//!   been published already.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use tokio::sync::{Mutex, watch};
use tracing::instrument;

use bamazon_core::{DerivedTotals, ProductId};

use super::{CartBackend, CartLine, CartMode, LineRef, item_count, parse_quantity, totals};
use crate::error::{Result, ValidationError};

/// Cart contents with the quantities derived from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartSnapshot {
    pub lines: Vec<CartLine>,
    /// `Σ quantity`.
    pub item_count: u64,
    pub totals: DerivedTotals,
    /// Ticket of the read that produced this snapshot (0 before any read).
    pub generation: u64,
}

impl CartSnapshot {
    fn new(lines: Vec<CartLine>, generation: u64) -> Self {
        Self {
            item_count: item_count(&lines),
            totals: totals(&lines),
            lines,
            generation,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

enum Mutation {
    Add {
        product_id: ProductId,
        unit_price: Decimal,
        quantity: u32,
    },
    SetQuantity {
        line: LineRef,
        quantity: u32,
    },
    Remove(LineRef),
    Clear,
    OrderPlaced,
}

/// Coordinates one session's cart over a [`CartBackend`].
///
/// Cheaply cloneable; clones share the snapshot and the mutation queue.
#[derive(Clone)]
pub struct CartCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    backend: Arc<dyn CartBackend>,
    mutation_lock: Mutex<()>,
    issued: AtomicU64,
    snapshot: watch::Sender<CartSnapshot>,
}

impl CartCoordinator {
    #[must_use]
    pub fn new(backend: Arc<dyn CartBackend>) -> Self {
        let (snapshot, _) = watch::channel(CartSnapshot::default());
        Self {
            inner: Arc::new(CoordinatorInner {
                backend,
                mutation_lock: Mutex::new(()),
                issued: AtomicU64::new(0),
                snapshot,
            }),
        }
    }

    #[must_use]
    pub fn mode(&self) -> CartMode {
        self.inner.backend.mode()
    }

    /// Last published snapshot. Does not touch the backend.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Item count of the last published snapshot.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.inner.snapshot.borrow().item_count
    }

    /// Totals of the last published snapshot.
    #[must_use]
    pub fn totals(&self) -> DerivedTotals {
        self.inner.snapshot.borrow().totals
    }

    /// Receiver notified whenever a new snapshot is published.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Fetch the cart and return its lines.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the published snapshot is left unchanged.
    pub async fn get_cart(&self) -> Result<Vec<CartLine>> {
        Ok(self.refresh().await?.lines)
    }

    /// Re-read the cart from the backend and publish it.
    ///
    /// If a read issued later has already been published, this read's result
    /// is dropped and the newer snapshot is returned instead.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the published snapshot is left unchanged.
    #[instrument(skip(self), fields(mode = %self.mode()))]
    pub async fn refresh(&self) -> Result<CartSnapshot> {
        let ticket = self.inner.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let lines = self.inner.backend.lines().await?;
        Ok(self.publish(ticket, lines))
    }

    fn publish(&self, ticket: u64, lines: Vec<CartLine>) -> CartSnapshot {
        let applied = self.inner.snapshot.send_if_modified(|current| {
            if ticket > current.generation {
                *current = CartSnapshot::new(lines, ticket);
                true
            } else {
                false
            }
        });

        if !applied {
            tracing::debug!(ticket, "Discarded superseded cart read");
        }
        self.snapshot()
    }

    /// Add `quantity` of a product, merging into an existing line.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero quantity or a negative price,
    /// or the backend error.
    pub async fn add_item(
        &self,
        product_id: ProductId,
        unit_price: Decimal,
        quantity: u32,
    ) -> Result<CartSnapshot> {
        if quantity == 0 {
            return Err(ValidationError::InvalidQuantity(quantity.to_string()).into());
        }
        if unit_price.is_sign_negative() && !unit_price.is_zero() {
            return Err(ValidationError::InvalidPrice.into());
        }

        self.mutate(Mutation::Add {
            product_id,
            unit_price,
            quantity,
        })
        .await
    }

    /// Replace a line's quantity. Zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidQuantity` for a negative quantity
    /// without changing anything, or the backend error.
    pub async fn set_quantity(&self, line: LineRef, quantity: i64) -> Result<CartSnapshot> {
        let quantity = u32::try_from(quantity)
            .map_err(|_| ValidationError::InvalidQuantity(quantity.to_string()))?;

        if quantity == 0 {
            self.mutate(Mutation::Remove(line)).await
        } else {
            self.mutate(Mutation::SetQuantity { line, quantity }).await
        }
    }

    /// [`set_quantity`](Self::set_quantity) from raw user input.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidQuantity` for non-numeric or negative
    /// input without changing anything.
    pub async fn set_quantity_input(&self, line: LineRef, input: &str) -> Result<CartSnapshot> {
        let quantity = parse_quantity(input)?;
        self.set_quantity(line, i64::from(quantity)).await
    }

    /// Remove a line. Removing an absent line succeeds.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn remove_item(&self, line: LineRef) -> Result<CartSnapshot> {
        self.mutate(Mutation::Remove(line)).await
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn clear(&self) -> Result<CartSnapshot> {
        self.mutate(Mutation::Clear).await
    }

    /// Bring the cart in line with a just-placed order.
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn order_placed(&self) -> Result<CartSnapshot> {
        self.mutate(Mutation::OrderPlaced).await
    }

    /// Apply one mutation then reload, holding the mutation lock throughout.
    ///
    /// A failed mutation publishes nothing.
    #[instrument(skip_all, fields(mode = %self.mode()))]
    async fn mutate(&self, mutation: Mutation) -> Result<CartSnapshot> {
        let _guard = self.inner.mutation_lock.lock().await;
        let backend = &self.inner.backend;

        match mutation {
            Mutation::Add {
                product_id,
                unit_price,
                quantity,
            } => backend.add(product_id, unit_price, quantity).await,
            Mutation::SetQuantity { line, quantity } => backend.set_quantity(line, quantity).await,
            Mutation::Remove(line) => backend.remove(line).await,
            Mutation::Clear => backend.clear().await,
            Mutation::OrderPlaced => backend.order_placed().await,
        }?;

        self.refresh().await
    }
}

impl std::fmt::Debug for CartCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartCoordinator")
            .field("mode", &self.mode())
            .field("snapshot", &*self.inner.snapshot.borrow())
            .finish_non_exhaustive()
    }
}
