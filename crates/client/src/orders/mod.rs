//! Orders domain.
//!
//! [`OrdersClient`] is the thin transport layer; [`OrderStatusProjector`]
//! turns its results into view models and owns the status-change flow.

mod projector;

pub use projector::{
    AddressDisplay, AdminOrderView, ConfirmationGate, OrderScope, OrderStatusProjector,
    OrderView, TransitionOutcome, TransitionReport,
};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bamazon_core::{OrderId, OrderStatus, ProductId, UserId};

use crate::cart::CartLine;
use crate::error::Result;
use crate::gateway::{ApiRequest, Domain, Gateway};
use crate::geocode::DeliveryAddress;

/// Decimal places the orders backend keeps for coordinates.
const COORDINATE_PRECISION: i32 = 7;

// =============================================================================
// Types
// =============================================================================

/// How the customer pays. Defaults to cash on delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    pub const CASH_ON_DELIVERY: &'static str = "COD";

    /// Blank input selects cash on delivery.
    #[must_use]
    pub fn new(method: &str) -> Self {
        let method = method.trim();
        if method.is_empty() {
            Self::default()
        } else {
            Self(method.to_string())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self(Self::CASH_ON_DELIVERY.to_string())
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivery details stored on an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    #[serde(rename = "delivery_name", default)]
    pub name: String,
    #[serde(rename = "delivery_phone", default)]
    pub phone: String,
    #[serde(rename = "delivery_address", default)]
    pub address: String,
    #[serde(rename = "delivery_city", default)]
    pub city: String,
    #[serde(rename = "delivery_state", default)]
    pub state: String,
    #[serde(rename = "delivery_postal_code", default)]
    pub postal_code: String,
    #[serde(rename = "delivery_country", default)]
    pub country: String,
    #[serde(rename = "delivery_latitude", default)]
    pub latitude: Option<Decimal>,
    #[serde(rename = "delivery_longitude", default)]
    pub longitude: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

/// An order as held by the orders backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    #[serde(default)]
    pub tax_amount: Decimal,
    #[serde(flatten)]
    pub delivery: DeliveryInfo,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Only present when the backend exposes it (admin listings).
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Cart line as submitted with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

impl From<&CartLine> for OrderLineRequest {
    fn from(line: &CartLine) -> Self {
        Self {
            product_id: line.product_id,
            quantity: line.quantity,
            price: line.unit_price,
        }
    }
}

/// Order creation payload.
///
/// The backend prices the order from the session's server cart; `items`
/// carries the client's view of the cart for backends that accept it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrderRequest {
    pub delivery_name: String,
    pub delivery_phone: String,
    pub delivery_address: String,
    pub delivery_city: String,
    pub delivery_state: String,
    pub delivery_postal_code: String,
    pub delivery_country: String,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderLineRequest>,
}

impl CreateOrderRequest {
    /// Build a request from validated checkout input.
    #[must_use]
    pub fn new(
        name: &str,
        phone: &str,
        address: &DeliveryAddress,
        payment_method: PaymentMethod,
        lines: &[CartLine],
    ) -> Self {
        Self {
            delivery_name: name.trim().to_string(),
            delivery_phone: phone.trim().to_string(),
            delivery_address: address.street.clone(),
            delivery_city: address.city.clone(),
            delivery_state: address.state.clone(),
            delivery_postal_code: address.postal_code.clone(),
            delivery_country: address.country.clone(),
            delivery_latitude: round_coordinate(address.latitude),
            delivery_longitude: round_coordinate(address.longitude),
            payment_method,
            items: lines.iter().map(OrderLineRequest::from).collect(),
        }
    }
}

fn round_coordinate(value: f64) -> f64 {
    let scale = 10_f64.powi(COORDINATE_PRECISION);
    (value * scale).round() / scale
}

#[derive(Serialize)]
struct StatusBody {
    status: OrderStatus,
}

// =============================================================================
// OrdersClient
// =============================================================================

/// Client for the orders domain. Every call requires a credential.
#[derive(Debug, Clone)]
pub struct OrdersClient {
    gateway: Gateway,
}

impl OrdersClient {
    #[must_use]
    pub const fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Place an order.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection (e.g., empty cart, insufficient stock).
    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    pub async fn create(&self, request: &CreateOrderRequest) -> Result<Order> {
        self.gateway.require_credential()?;
        let request = ApiRequest::post(Domain::Orders, "/api/orders/create")
            .authenticated()
            .json(request)?;
        let order: Order = self.gateway.call(request).await.into_result()?;
        tracing::info!(order_id = %order.id, order_number = %order.order_number, "Order placed");
        Ok(order)
    }

    /// The caller's orders, in backend order.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` when signed out.
    #[instrument(skip(self))]
    pub async fn mine(&self) -> Result<Vec<Order>> {
        self.gateway.require_credential()?;
        let request = ApiRequest::get(Domain::Orders, "/api/orders").authenticated();
        self.gateway.call(request).await.into_result()
    }

    /// Every order (staff only).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for non-staff callers.
    #[instrument(skip(self))]
    pub async fn all(&self) -> Result<Vec<Order>> {
        self.gateway.require_credential()?;
        let request = ApiRequest::get(Domain::Orders, "/api/orders/all").authenticated();
        self.gateway.call(request).await.into_result()
    }

    /// One of the caller's orders.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the order does not exist or is not the caller's.
    #[instrument(skip(self))]
    pub async fn get(&self, id: OrderId) -> Result<Order> {
        self.gateway.require_credential()?;
        let request = ApiRequest::get(Domain::Orders, format!("/api/orders/{id}")).authenticated();
        self.gateway.call(request).await.into_result()
    }

    /// Ask the backend to cancel an order, without any client-side gate.
    ///
    /// # Errors
    ///
    /// Returns the backend's rejection when the order can no longer be
    /// cancelled.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: OrderId) -> Result<Order> {
        self.gateway.require_credential()?;
        let request = ApiRequest::put(Domain::Orders, format!("/api/orders/{id}/cancel"))
            .authenticated()
            .json(&serde_json::json!({}))?;
        self.gateway.call(request).await.into_result()
    }

    /// Set an order's status (staff only).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` for non-staff callers, or a rejection.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        self.gateway.require_credential()?;
        let request = ApiRequest::put(Domain::Orders, format!("/api/orders/{id}/status"))
            .authenticated()
            .json(&StatusBody { status })?;
        self.gateway.call(request).await.into_result()
    }
}
