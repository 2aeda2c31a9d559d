//! Cart held by the cart backend.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bamazon_core::{CartLineId, ProductId};

use super::{CartBackend, CartLine, CartMode, LineRef};
use crate::error::{ClientError, Result};
use crate::gateway::{ApiRequest, Domain, Gateway};

#[derive(Debug, Deserialize)]
struct CartBody {
    #[serde(default)]
    items: Vec<CartItemBody>,
}

#[derive(Debug, Deserialize)]
struct CartItemBody {
    id: CartLineId,
    product_id: ProductId,
    quantity: u32,
    price: Decimal,
}

impl From<CartItemBody> for CartLine {
    fn from(item: CartItemBody) -> Self {
        Self {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.price,
            line_id: Some(item.id),
        }
    }
}

#[derive(Serialize)]
struct AddBody {
    product_id: ProductId,
    quantity: u32,
    price: Decimal,
}

#[derive(Serialize)]
struct QuantityBody {
    quantity: u32,
}

/// Server-authoritative cart. Every operation is one authenticated request;
/// reads return the backend's last committed state.
#[derive(Debug, Clone)]
pub struct RemoteCart {
    gateway: Gateway,
}

impl RemoteCart {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Backend row id for `line`, or `None` if no such line exists.
    async fn resolve(&self, line: LineRef) -> Result<Option<CartLineId>> {
        match line {
            LineRef::Line(id) => Ok(Some(id)),
            LineRef::Product(product_id) => Ok(self
                .lines()
                .await?
                .into_iter()
                .find(|l| l.product_id == product_id)
                .and_then(|l| l.line_id)),
        }
    }
}

#[async_trait]
impl CartBackend for RemoteCart {
    fn mode(&self) -> CartMode {
        CartMode::Remote
    }

    /// Signed out reads as an empty cart.
    #[instrument(skip(self))]
    async fn lines(&self) -> Result<Vec<CartLine>> {
        if !self.gateway.session().is_authenticated() {
            return Ok(Vec::new());
        }

        let request = ApiRequest::get(Domain::Cart, "/api/cart").authenticated();
        let body: CartBody = self.gateway.call(request).await.into_result()?;
        Ok(body.items.into_iter().map(CartLine::from).collect())
    }

    #[instrument(skip(self))]
    async fn add(&self, product_id: ProductId, unit_price: Decimal, quantity: u32) -> Result<()> {
        self.gateway.require_credential()?;
        let request = ApiRequest::post(Domain::Cart, "/api/cart/add")
            .authenticated()
            .json(&AddBody {
                product_id,
                quantity,
                price: unit_price,
            })?;
        self.gateway.call(request).await.into_unit()
    }

    #[instrument(skip(self))]
    async fn set_quantity(&self, line: LineRef, quantity: u32) -> Result<()> {
        self.gateway.require_credential()?;
        let Some(id) = self.resolve(line).await? else {
            tracing::debug!("No such cart line, nothing to update");
            return Ok(());
        };

        let request = ApiRequest::put(Domain::Cart, format!("/api/cart/items/{id}"))
            .authenticated()
            .json(&QuantityBody { quantity })?;
        self.gateway.call(request).await.into_unit()
    }

    #[instrument(skip(self))]
    async fn remove(&self, line: LineRef) -> Result<()> {
        self.gateway.require_credential()?;
        let Some(id) = self.resolve(line).await? else {
            return Ok(());
        };

        let request =
            ApiRequest::delete(Domain::Cart, format!("/api/cart/items/{id}/remove")).authenticated();
        match self.gateway.call(request).await.into_unit() {
            Err(ClientError::Rejected { status: 404, .. }) => {
                tracing::debug!(line_id = %id, "Cart line already gone");
                Ok(())
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.gateway.require_credential()?;
        let request = ApiRequest::delete(Domain::Cart, "/api/cart/clear").authenticated();
        self.gateway.call(request).await.into_unit()
    }

    /// The orders backend empties the server cart when it accepts an order.
    async fn order_placed(&self) -> Result<()> {
        Ok(())
    }
}
