//! Integration tests for the Bamazon client.
//!
//! Every test runs a [`ShopContext`] against one `wiremock` server standing
//! in for all four backends, so no external services are needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bamazon-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `shopping_flow` - browse, cart, checkout, cancel
//! - `admin_orders` - staff listing and status changes
//! - `session` - credential persistence and expiry

#![allow(clippy::missing_panics_doc)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use bamazon_client::ShopContext;
use bamazon_client::cart::CartMode;
use bamazon_client::config::ClientConfig;
use bamazon_client::geocode::{
    AddressComponent, GeocodeError, Geocoder, Geometry, LatLng, Place,
};
use bamazon_client::storage::{ClientStorage, MemoryStorage, keys};

/// Token handed out by [`TestShop::mock_login`].
pub const TEST_TOKEN: &str = "9944b09199c62bcf9418ad846dd0e4bbdfc6ee4b";

/// A client wired to a mock backend.
pub struct TestShop {
    pub server: MockServer,
    pub storage: Arc<MemoryStorage>,
    pub ctx: ShopContext,
}

impl TestShop {
    /// Signed-out client.
    pub async fn start(mode: CartMode) -> Self {
        Self::with_storage(mode, Arc::new(MemoryStorage::new())).await
    }

    /// Client restored from storage that already holds a credential.
    pub async fn signed_in(mode: CartMode) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(keys::TOKEN, TEST_TOKEN)
            .expect("Failed to seed token");
        Self::with_storage(mode, storage).await
    }

    /// Client over existing storage, e.g. to simulate a restart.
    pub async fn with_storage(mode: CartMode, storage: Arc<MemoryStorage>) -> Self {
        let server = MockServer::start().await;
        let ctx = context(&server, mode, Arc::clone(&storage));
        Self {
            server,
            storage,
            ctx,
        }
    }

    /// A second client sharing this one's storage and backend.
    #[must_use]
    pub fn restart(&self, mode: CartMode) -> ShopContext {
        context(&self.server, mode, Arc::clone(&self.storage))
    }

    /// Accept a login for `user`.
    pub async fn mock_login(&self, user: &Value) {
        Mock::given(method("POST"))
            .and(path("/api/auth/login/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "token": TEST_TOKEN, "user": user })),
            )
            .mount(&self.server)
            .await;
    }

    /// Serve `user` as the current profile.
    pub async fn mock_profile(&self, user: &Value) {
        Mock::given(method("GET"))
            .and(path("/api/auth/profile/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "user": user })))
            .mount(&self.server)
            .await;
    }

    /// Serve `product` on its detail endpoint.
    pub async fn mock_product(&self, product: &Value) {
        let id = product["id"].as_i64().expect("product id");
        Mock::given(method("GET"))
            .and(path(format!("/api/products/product/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(product))
            .mount(&self.server)
            .await;
    }
}

/// In-memory stand-in for the cart backend.
///
/// Clones share the same cart, so a test can inspect or clear it (as the
/// orders backend does when it accepts an order).
#[derive(Clone, Default)]
pub struct CartStub {
    items: Arc<Mutex<Vec<Value>>>,
}

impl CartStub {
    /// Serve every `/api/cart` route from this stub.
    pub async fn mount(&self, server: &MockServer) {
        Mock::given(path_regex("^/api/cart"))
            .respond_with(self.clone())
            .mount(server)
            .await;
    }

    pub fn clear(&self) {
        self.items.lock().expect("cart stub lock").clear();
    }

    /// Quantity held for `product_id`, or 0.
    #[must_use]
    pub fn quantity(&self, product_id: i64) -> i64 {
        self.items
            .lock()
            .expect("cart stub lock")
            .iter()
            .find(|item| item["product_id"] == product_id)
            .and_then(|item| item["quantity"].as_i64())
            .unwrap_or(0)
    }
}

impl Respond for CartStub {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut items = self.items.lock().expect("cart stub lock");
        let route = request.url.path().trim_end_matches('/').to_string();
        let line_id = route
            .strip_prefix("/api/cart/items/")
            .and_then(|rest| rest.split('/').next())
            .and_then(|id| id.parse::<i64>().ok());
        let position = line_id.and_then(|id| items.iter().position(|item| item["id"] == id));

        match (request.method.as_str(), route.as_str(), position) {
            ("GET", "/api/cart", _) => {}
            ("POST", "/api/cart/add", _) => {
                let body: Value = request.body_json().expect("add body");
                let product_id = body["product_id"].as_i64().unwrap_or_default();
                let quantity = body["quantity"].as_i64().unwrap_or_default();
                if let Some(item) = items.iter_mut().find(|item| item["product_id"] == product_id) {
                    let current = item["quantity"].as_i64().unwrap_or_default();
                    item["quantity"] = json!(current + quantity);
                } else {
                    let id = items
                        .iter()
                        .filter_map(|item| item["id"].as_i64())
                        .max()
                        .unwrap_or(100)
                        + 1;
                    items.push(json!({
                        "id": id,
                        "product_id": product_id,
                        "quantity": quantity,
                        "price": body["price"],
                    }));
                }
            }
            ("DELETE", "/api/cart/clear", _) => items.clear(),
            ("PUT", _, Some(index)) => {
                let body: Value = request.body_json().expect("quantity body");
                if let Some(item) = items.get_mut(index) {
                    item["quantity"] = body["quantity"].clone();
                }
            }
            ("DELETE", _, Some(index)) => {
                items.remove(index);
            }
            _ => {
                return ResponseTemplate::new(404).set_body_json(json!({ "error": "Cart item not found" }));
            }
        }

        ResponseTemplate::new(200).set_body_json(json!({ "items": items.clone() }))
    }
}

/// Signed-in client whose backends refuse connections.
#[must_use]
pub fn offline() -> ShopContext {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(keys::TOKEN, TEST_TOKEN)
        .expect("Failed to seed token");
    let base = Url::parse("http://127.0.0.1:9").expect("offline URL");
    context_at(&base, CartMode::Remote, storage)
}

fn context(server: &MockServer, mode: CartMode, storage: Arc<MemoryStorage>) -> ShopContext {
    let base = Url::parse(&server.uri()).expect("mock server URL");
    context_at(&base, mode, storage)
}

fn context_at(base: &Url, mode: CartMode, storage: Arc<MemoryStorage>) -> ShopContext {
    let config = ClientConfig::from_lookup(|key| match key {
        "BAMAZON_AUTH_URL" | "BAMAZON_PRODUCTS_URL" | "BAMAZON_CART_URL" | "BAMAZON_ORDERS_URL" => {
            Some(base.to_string())
        }
        "BAMAZON_CART_MODE" => Some(mode.as_str().to_string()),
        "BAMAZON_REQUEST_TIMEOUT_SECS" => Some("5".to_string()),
        _ => None,
    })
    .expect("Failed to build test config");

    ShopContext::with_parts(config, storage, Arc::new(StaticGeocoder(madrid())))
        .expect("Failed to build client context")
}

/// Geocoder that resolves every lookup to the same place.
pub struct StaticGeocoder(pub Place);

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn forward(&self, _query: &str) -> Result<Place, GeocodeError> {
        Ok(self.0.clone())
    }

    async fn reverse(&self, _point: LatLng) -> Result<Place, GeocodeError> {
        Ok(self.0.clone())
    }
}

fn component(name: &str, short: &str, kind: &str) -> AddressComponent {
    AddressComponent {
        long_name: name.to_string(),
        short_name: short.to_string(),
        types: vec![kind.to_string()],
    }
}

/// A fully specified street address.
#[must_use]
pub fn madrid() -> Place {
    Place {
        formatted_address: "Calle Mayor 1, 28013 Madrid, Spain".to_string(),
        geometry: Some(Geometry {
            location: LatLng {
                lat: 40.416_775_4,
                lng: -3.703_790_2,
            },
        }),
        address_components: vec![
            component("1", "1", "street_number"),
            component("Calle Mayor", "C. Mayor", "route"),
            component("Madrid", "Madrid", "locality"),
            component("Comunidad de Madrid", "MD", "administrative_area_level_1"),
            component("28013", "28013", "postal_code"),
            component("Spain", "ES", "country"),
        ],
    }
}

#[must_use]
pub fn customer() -> Value {
    json!({
        "id": 3,
        "username": "alice",
        "email": "alice@bamazon.com",
        "first_name": "Alice",
        "last_name": "Liddell",
        "is_staff": false,
    })
}

#[must_use]
pub fn staff() -> Value {
    json!({
        "id": 1,
        "username": "admin",
        "email": "admin@bamazon.com",
        "first_name": "",
        "last_name": "",
        "is_staff": true,
    })
}

#[must_use]
pub fn product(id: i64, name: &str, price: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": "",
        "price": price,
        "category": 1,
        "stock": 10,
    })
}

/// Order as returned by the orders backend.
#[must_use]
pub fn order(id: i64, status: &str, user_id: Option<i64>) -> Value {
    json!({
        "id": id,
        "order_number": format!("ORD-{id:06}"),
        "status": status,
        "total_amount": "28.05",
        "tax_amount": "2.55",
        "delivery_name": "Alice Liddell",
        "delivery_phone": "555-0100",
        "delivery_address": "1 Calle Mayor",
        "delivery_city": "Madrid",
        "delivery_state": "MD",
        "delivery_postal_code": "28013",
        "delivery_country": "Spain",
        "delivery_latitude": "40.4167754",
        "delivery_longitude": "-3.7037902",
        "payment_method": "COD",
        "user_id": user_id,
        "created_at": "2026-10-01T09:15:00Z",
        "items": [
            { "id": 1, "product_id": 1, "product_name": "Lamp", "quantity": 2, "price": "10.00", "subtotal": "20.00" },
            { "id": 2, "product_id": 2, "product_name": "Mug", "quantity": 1, "price": "5.50", "subtotal": "5.50" }
        ],
    })
}
