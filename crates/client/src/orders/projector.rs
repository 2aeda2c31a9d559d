//! Order view models and status transitions.
//!
//! The projector never assumes a transition happened: after every status
//! change attempt (applied, declined or failed) it re-reads the order list
//! from the backend.

use moka::future::Cache;
use tracing::instrument;

use bamazon_core::{OrderId, OrderStatus, UserId, format_amount};

use super::{DeliveryInfo, Order, OrdersClient};
use crate::auth::AuthClient;
use crate::error::{ClientError, Result, ValidationError};

const MAPS_URL: &str = "https://www.google.com/maps";

/// Which orders to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    /// The caller's own orders.
    Mine,
    /// Every order (staff only).
    All,
}

/// An order with its display-ready status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub order: Order,
    /// Upper-case status badge.
    pub status_label: String,
    /// Whether to offer a cancel action.
    pub cancellable: bool,
    /// Number of distinct lines.
    pub item_count: usize,
}

impl OrderView {
    #[must_use]
    pub fn new(order: Order) -> Self {
        Self {
            status_label: order.status.label(),
            cancellable: order.status.is_cancellable(),
            item_count: order.items.len(),
            order,
        }
    }

    #[must_use]
    pub fn total_display(&self) -> String {
        format_amount(self.order.total_amount)
    }
}

/// How to show a delivery address in the admin listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressDisplay {
    /// Coordinates are known; link to a map.
    MapLink { url: String, text: String },
    Text(String),
    Unavailable,
}

impl AddressDisplay {
    #[must_use]
    pub fn for_delivery(delivery: &DeliveryInfo) -> Self {
        let address = delivery.address.trim();
        match (delivery.latitude, delivery.longitude) {
            (Some(lat), Some(lng)) if !lat.is_zero() && !lng.is_zero() => Self::MapLink {
                url: format!("{MAPS_URL}?q={},{}", lat.normalize(), lng.normalize()),
                text: if address.is_empty() {
                    "View Location".to_string()
                } else {
                    address.to_string()
                },
            },
            _ if !address.is_empty() => Self::Text(address.to_string()),
            _ => Self::Unavailable,
        }
    }
}

impl std::fmt::Display for AddressDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MapLink { url, text } => write!(f, "{text} <{url}>"),
            Self::Text(text) => f.write_str(text),
            Self::Unavailable => f.write_str("N/A"),
        }
    }
}

/// An order as shown on the admin listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminOrderView {
    pub view: OrderView,
    /// Account name of the customer, when the order carries a user id.
    pub username: Option<String>,
    /// Delivery name, falling back to the username.
    pub customer: String,
    pub address: AddressDisplay,
}

/// Asks the operator to confirm a consequential action.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> ConfirmationGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

/// What happened to a requested status change.
#[derive(Debug)]
pub enum TransitionOutcome {
    /// The backend accepted the change.
    Applied(Order),
    /// The operator did not confirm; nothing was sent.
    Declined,
    Failed(ClientError),
}

/// Outcome of a status change plus the freshly re-read listing.
#[derive(Debug)]
pub struct TransitionReport {
    pub outcome: TransitionOutcome,
    pub orders: Result<Vec<AdminOrderView>>,
}

/// Projects orders into views and drives status changes.
#[derive(Clone)]
pub struct OrderStatusProjector {
    orders: OrdersClient,
    auth: AuthClient,
    /// Usernames by id. Never invalidated; a renamed account shows its old
    /// name until the projector is rebuilt.
    usernames: Cache<UserId, String>,
}

impl OrderStatusProjector {
    #[must_use]
    pub fn new(orders: OrdersClient, auth: AuthClient, cache_capacity: u64) -> Self {
        Self {
            orders,
            auth,
            usernames: Cache::builder().max_capacity(cache_capacity).build(),
        }
    }

    /// List orders in backend order.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Unauthorized` when signed out, or
    /// `ClientError::Forbidden` for [`OrderScope::All`] without staff rights.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, scope: OrderScope) -> Result<Vec<OrderView>> {
        let orders = match scope {
            OrderScope::Mine => self.orders.mine().await?,
            OrderScope::All => {
                self.ensure_admin().await?;
                self.orders.all().await?
            }
        };
        Ok(orders.into_iter().map(OrderView::new).collect())
    }

    /// Admin listing, optionally restricted to one status.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Forbidden` without staff rights.
    #[instrument(skip(self))]
    pub async fn admin_orders(&self, filter: Option<OrderStatus>) -> Result<Vec<AdminOrderView>> {
        self.ensure_admin().await?;
        let orders = self.orders.all().await?;

        let mut views = Vec::with_capacity(orders.len());
        for order in orders
            .into_iter()
            .filter(|order| filter.is_none_or(|status| order.status == status))
        {
            let username = match order.user_id {
                Some(id) => Some(self.username(id).await),
                None => None,
            };
            let customer = match order.delivery.name.trim() {
                "" => username.clone().unwrap_or_else(|| "N/A".to_string()),
                name => name.to_string(),
            };
            views.push(AdminOrderView {
                address: AddressDisplay::for_delivery(&order.delivery),
                view: OrderView::new(order),
                username,
                customer,
            });
        }
        Ok(views)
    }

    /// Cancel one of the caller's orders.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NotCancellable` without contacting the
    /// backend when the status does not allow it, or the backend's rejection.
    #[instrument(skip(self, order), fields(order_id = %order.id, status = %order.status))]
    pub async fn cancel(&self, order: &Order) -> Result<Order> {
        if !order.status.is_cancellable() {
            return Err(ValidationError::NotCancellable(order.status).into());
        }
        self.orders.cancel(order.id).await
    }

    /// Fetch an order, then [`cancel`](Self::cancel) it.
    ///
    /// # Errors
    ///
    /// Same as [`cancel`](Self::cancel), plus lookup failures.
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        let order = self.orders.get(id).await?;
        self.cancel(&order).await
    }

    /// Request a status change after operator confirmation, then re-read the
    /// listing regardless of the outcome.
    #[instrument(skip(self, gate))]
    pub async fn transition_status(
        &self,
        id: OrderId,
        status: OrderStatus,
        gate: &dyn ConfirmationGate,
        filter: Option<OrderStatus>,
    ) -> TransitionReport {
        let prompt = format!("Change order status to {status}?");

        let outcome = if gate.confirm(&prompt) {
            match self.orders.update_status(id, status).await {
                Ok(order) => {
                    tracing::info!(order_id = %id, status = %order.status, "Order status updated");
                    TransitionOutcome::Applied(order)
                }
                Err(e) => {
                    tracing::warn!(order_id = %id, error = %e, "Order status update failed");
                    TransitionOutcome::Failed(e)
                }
            }
        } else {
            TransitionOutcome::Declined
        };

        TransitionReport {
            outcome,
            orders: self.admin_orders(filter).await,
        }
    }

    /// Username for an account id, cached for the projector's lifetime.
    ///
    /// Falls back to `User {id}` (uncached) if the lookup fails.
    pub async fn username(&self, id: UserId) -> String {
        if let Some(name) = self.usernames.get(&id).await {
            return name;
        }

        match self.auth.user(id).await {
            Ok(user) => {
                self.usernames.insert(id, user.username.clone()).await;
                user.username
            }
            Err(e) => {
                tracing::debug!(user_id = %id, error = %e, "Username lookup failed");
                format!("User {id}")
            }
        }
    }

    async fn ensure_admin(&self) -> Result<()> {
        let profile = self.auth.profile().await?;
        if profile.is_staff {
            Ok(())
        } else {
            Err(ClientError::Forbidden("Admin access required".to_string()))
        }
    }
}

impl std::fmt::Debug for OrderStatusProjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStatusProjector")
            .field("cached_usernames", &self.usernames.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::gateway::{Endpoints, Gateway};
    use crate::orders::tests::order_json;
    use crate::session::{Credential, Session};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn projector_for(server: &MockServer) -> OrderStatusProjector {
        let base = Url::parse(&server.uri()).unwrap();
        let session = Session::ephemeral();
        session.set_credential(Credential::new("tok").unwrap());
        let gateway =
            Gateway::new(Endpoints::uniform(&base), session, Duration::from_secs(5)).unwrap();
        OrderStatusProjector::new(
            OrdersClient::new(gateway.clone()),
            AuthClient::new(gateway),
            100,
        )
    }

    async fn mount_profile(server: &MockServer, is_staff: bool) {
        Mock::given(method("GET"))
            .and(path("/api/auth/profile/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "user": { "id": 1, "username": "admin", "is_staff": is_staff }
            })))
            .mount(server)
            .await;
    }

    fn admin_order(id: i64, status: &str, user_id: i64) -> serde_json::Value {
        let mut json = order_json(id, status);
        json["user_id"] = serde_json::json!(user_id);
        json
    }

    fn order(status: &str) -> Order {
        serde_json::from_value(order_json(5, status)).unwrap()
    }

    #[test]
    fn test_view_labels() {
        let view = OrderView::new(order("confirmed"));
        assert_eq!(view.status_label, "CONFIRMED");
        assert!(view.cancellable);
        assert_eq!(view.item_count, 2);
        assert_eq!(view.total_display(), "$28.05");

        assert!(!OrderView::new(order("shipped")).cancellable);
    }

    #[test]
    fn test_address_display() {
        let mut delivery = order("pending").delivery;
        assert_eq!(
            AddressDisplay::for_delivery(&delivery),
            AddressDisplay::MapLink {
                url: "https://www.google.com/maps?q=37.422,-122.084".to_string(),
                text: "1600 Amphitheatre Parkway".to_string(),
            }
        );

        delivery.latitude = None;
        assert_eq!(
            AddressDisplay::for_delivery(&delivery),
            AddressDisplay::Text("1600 Amphitheatre Parkway".to_string())
        );

        delivery.address.clear();
        assert_eq!(AddressDisplay::for_delivery(&delivery), AddressDisplay::Unavailable);
        assert_eq!(AddressDisplay::Unavailable.to_string(), "N/A");
    }

    #[tokio::test]
    async fn test_cancel_gated_client_side() {
        let server = MockServer::start().await;
        let projector = projector_for(&server);

        let err = projector.cancel(&order("shipped")).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Validation(ValidationError::NotCancellable(OrderStatus::Shipped))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forced_cancel_surfaces_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_json(5, "pending")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/orders/5/cancel"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "Order cannot be cancelled" })),
            )
            .mount(&server)
            .await;

        let err = projector_for(&server)
            .cancel_order(OrderId::new(5))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Order cannot be cancelled");
    }

    #[tokio::test]
    async fn test_list_all_requires_staff() {
        let server = MockServer::start().await;
        mount_profile(&server, false).await;

        let err = projector_for(&server)
            .list_orders(OrderScope::All)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_admin_orders_filter_and_username_cache() {
        let server = MockServer::start().await;
        mount_profile(&server, true).await;
        Mock::given(method("GET"))
            .and(path("/api/orders/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                admin_order(1, "pending", 3),
                admin_order(2, "shipped", 3),
                admin_order(3, "pending", 3),
                admin_order(4, "pending", 4),
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/3/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": 3, "username": "alice" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/4/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let views = projector_for(&server)
            .admin_orders(Some(OrderStatus::Pending))
            .await
            .unwrap();

        let ids: Vec<i64> = views.iter().map(|v| v.view.order.id.as_i64()).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(views[0].username.as_deref(), Some("alice"));
        assert_eq!(views[2].username.as_deref(), Some("User 4"));
        assert_eq!(views[0].customer, "Alice Liddell");
    }

    #[tokio::test]
    async fn test_declined_transition_sends_nothing_but_refetches() {
        let server = MockServer::start().await;
        mount_profile(&server, true).await;
        Mock::given(method("GET"))
            .and(path("/api/orders/all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/orders/5/status"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let prompts = AtomicUsize::new(0);
        let gate = |prompt: &str| {
            assert_eq!(prompt, "Change order status to shipped?");
            prompts.fetch_add(1, Ordering::SeqCst);
            false
        };

        let report = projector_for(&server)
            .transition_status(OrderId::new(5), OrderStatus::Shipped, &gate, None)
            .await;

        assert!(matches!(report.outcome, TransitionOutcome::Declined));
        assert!(report.orders.unwrap().is_empty());
        assert_eq!(prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_transition_refetches_authoritative_state() {
        let server = MockServer::start().await;
        mount_profile(&server, true).await;
        Mock::given(method("PUT"))
            .and(path("/api/orders/5/status"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({ "error": "Invalid status" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/orders/all"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([admin_order(5, "pending", 3)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/3/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": 3, "username": "alice" })),
            )
            .mount(&server)
            .await;

        let report = projector_for(&server)
            .transition_status(OrderId::new(5), OrderStatus::Delivered, &|_: &str| true, None)
            .await;

        assert!(matches!(
            report.outcome,
            TransitionOutcome::Failed(ClientError::Rejected { status: 400, .. })
        ));
        let orders = report.orders.unwrap();
        assert_eq!(orders[0].view.order.status, OrderStatus::Pending);
    }
}
