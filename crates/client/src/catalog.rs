//! Catalog domain: categories and products.
//!
//! Product details are cached per session (bounded, no TTL) because cart and
//! checkout views look the same product up repeatedly. Staleness of a price
//! or name within one session is accepted; the orders backend prices the
//! order itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use bamazon_core::{CategoryId, ProductId};

use crate::error::Result;
use crate::gateway::{ApiRequest, Domain, Gateway};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Category create/update payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryInput {
    pub name: String,
    pub description: String,
}

/// Category reference on a product: an id in listings, the full category on
/// the detail endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProductCategory {
    Id(CategoryId),
    Nested(Category),
}

impl ProductCategory {
    #[must_use]
    pub const fn id(&self) -> CategoryId {
        match self {
            Self::Id(id) => *id,
            Self::Nested(category) => category.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<ProductCategory>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub image: Option<String>,
}

impl Product {
    /// Stand-in shown when a product cannot be looked up.
    #[must_use]
    pub fn placeholder(id: ProductId) -> Self {
        Self {
            id,
            name: format!("Product {id}"),
            description: String::new(),
            price: Decimal::ZERO,
            category: None,
            category_name: None,
            stock: 0,
            image: None,
        }
    }

    /// Category name from either representation.
    #[must_use]
    pub fn category_label(&self) -> Option<&str> {
        match (&self.category_name, &self.category) {
            (Some(name), _) => Some(name),
            (None, Some(ProductCategory::Nested(category))) => Some(&category.name),
            _ => None,
        }
    }
}

/// Product create/update payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: CategoryId,
    pub stock: u32,
}

// =============================================================================
// CatalogClient
// =============================================================================

/// Client for the catalog domain.
#[derive(Clone)]
pub struct CatalogClient {
    inner: Arc<CatalogClientInner>,
}

struct CatalogClientInner {
    gateway: Gateway,
    products: Cache<ProductId, Product>,
}

impl CatalogClient {
    /// Create a catalog client whose product cache holds at most
    /// `cache_capacity` entries.
    #[must_use]
    pub fn new(gateway: Gateway, cache_capacity: u64) -> Self {
        Self {
            inner: Arc::new(CatalogClientInner {
                gateway,
                products: Cache::builder().max_capacity(cache_capacity).build(),
            }),
        }
    }

    // =========================================================================
    // Category Methods
    // =========================================================================

    /// List all categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let request = ApiRequest::get(Domain::Catalog, "/api/products/category");
        self.inner.gateway.call(request).await.into_result()
    }

    /// Get one category.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the category does not exist.
    #[instrument(skip(self))]
    pub async fn category(&self, id: CategoryId) -> Result<Category> {
        let request = ApiRequest::get(Domain::Catalog, format!("/api/products/category/{id}"));
        self.inner.gateway.call(request).await.into_result()
    }

    /// Create a category (staff only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-staff callers.
    #[instrument(skip(self))]
    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category> {
        self.inner.gateway.require_credential()?;
        let request = ApiRequest::post(Domain::Catalog, "/api/products/category")
            .authenticated()
            .json(input)?;
        self.inner.gateway.call(request).await.into_result()
    }

    /// Update a category (staff only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-staff callers.
    #[instrument(skip(self))]
    pub async fn update_category(&self, id: CategoryId, input: &CategoryInput) -> Result<Category> {
        self.inner.gateway.require_credential()?;
        let request = ApiRequest::put(Domain::Catalog, format!("/api/products/category/{id}"))
            .authenticated()
            .json(input)?;
        self.inner.gateway.call(request).await.into_result()
    }

    /// Delete a category (staff only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-staff callers.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.inner.gateway.require_credential()?;
        let request =
            ApiRequest::delete(Domain::Catalog, format!("/api/products/category/{id}")).authenticated();
        self.inner.gateway.call(request).await.into_unit()?;
        // Products embed category data.
        self.inner.products.invalidate_all();
        Ok(())
    }

    // =========================================================================
    // Product Methods
    // =========================================================================

    /// List products, optionally restricted to one category.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the category does not exist.
    #[instrument(skip(self))]
    pub async fn products(&self, category: Option<CategoryId>) -> Result<Vec<Product>> {
        let mut request = ApiRequest::get(Domain::Catalog, "/api/products/product");
        if let Some(category) = category {
            request = request.query("category_id", category);
        }
        self.inner.gateway.call(request).await.into_result()
    }

    /// Get one product, bypassing the cache.
    ///
    /// # Errors
    ///
    /// Returns a rejection if the product does not exist.
    #[instrument(skip(self))]
    pub async fn product(&self, id: ProductId) -> Result<Product> {
        let request = ApiRequest::get(Domain::Catalog, format!("/api/products/product/{id}"));
        let product: Product = self.inner.gateway.call(request).await.into_result()?;
        self.inner.products.insert(id, product.clone()).await;
        Ok(product)
    }

    /// Cached product lookup for display.
    ///
    /// Never fails: an unreachable or missing product yields
    /// [`Product::placeholder`], which is not cached.
    #[instrument(skip(self))]
    pub async fn product_details(&self, id: ProductId) -> Product {
        if let Some(product) = self.inner.products.get(&id).await {
            debug!("Cache hit for product");
            return product;
        }

        match self.product(id).await {
            Ok(product) => product,
            Err(e) => {
                tracing::warn!(error = %e, "Product lookup failed, using placeholder");
                Product::placeholder(id)
            }
        }
    }

    /// Create a product (staff only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-staff callers, or field errors.
    #[instrument(skip(self))]
    pub async fn create_product(&self, input: &ProductInput) -> Result<Product> {
        self.inner.gateway.require_credential()?;
        let request = ApiRequest::post(Domain::Catalog, "/api/products/product")
            .authenticated()
            .json(input)?;
        self.inner.gateway.call(request).await.into_result()
    }

    /// Update a product (staff only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-staff callers, or field errors.
    #[instrument(skip(self))]
    pub async fn update_product(&self, id: ProductId, input: &ProductInput) -> Result<Product> {
        self.inner.gateway.require_credential()?;
        let request = ApiRequest::put(Domain::Catalog, format!("/api/products/product/{id}"))
            .authenticated()
            .json(input)?;
        let product: Product = self.inner.gateway.call(request).await.into_result()?;
        self.inner.products.invalidate(&id).await;
        Ok(product)
    }

    /// Delete a product (staff only).
    ///
    /// # Errors
    ///
    /// Returns an authorization error for non-staff callers.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.inner.gateway.require_credential()?;
        let request =
            ApiRequest::delete(Domain::Catalog, format!("/api/products/product/{id}")).authenticated();
        self.inner.gateway.call(request).await.into_unit()?;
        self.inner.products.invalidate(&id).await;
        Ok(())
    }
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("cached_products", &self.inner.products.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::gateway::Endpoints;
    use crate::session::Session;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> CatalogClient {
        let base = Url::parse(&server.uri()).unwrap();
        let gateway =
            Gateway::new(Endpoints::uniform(&base), Session::ephemeral(), Duration::from_secs(5))
                .unwrap();
        CatalogClient::new(gateway, 100)
    }

    #[test]
    fn test_product_category_shapes() {
        let listed: Product = serde_json::from_value(serde_json::json!({
            "id": 1, "name": "Lamp", "price": "19.99", "category": 4,
            "category_name": "Home", "stock": 3, "image": null
        }))
        .unwrap();
        assert_eq!(listed.category.as_ref().unwrap().id(), CategoryId::new(4));
        assert_eq!(listed.category_label(), Some("Home"));
        assert_eq!(listed.price, Decimal::new(1999, 2));

        let detailed: Product = serde_json::from_value(serde_json::json!({
            "id": 1, "name": "Lamp", "price": "19.99",
            "category": { "id": 4, "name": "Home", "description": "" }
        }))
        .unwrap();
        assert_eq!(detailed.category_label(), Some("Home"));
    }

    #[test]
    fn test_placeholder() {
        let product = Product::placeholder(ProductId::new(42));
        assert_eq!(product.name, "Product 42");
        assert_eq!(product.price, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_products_filtered_by_category() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/product"))
            .and(query_param("category_id", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 5, "name": "Mug", "price": "7.50", "category": 2 }
            ])))
            .mount(&server)
            .await;

        let catalog = client_for(&server);
        let products = catalog.products(Some(CategoryId::new(2))).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Mug");
    }

    #[tokio::test]
    async fn test_unknown_category_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/product"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "error": "Category not found." })),
            )
            .mount(&server)
            .await;

        let catalog = client_for(&server);
        let err = catalog.products(Some(CategoryId::new(99))).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected { status: 404, .. }));
        assert_eq!(err.user_message(), "Category not found.");
    }

    #[tokio::test]
    async fn test_product_details_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/product/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1, "name": "Lamp", "price": "19.99"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = client_for(&server);
        let first = catalog.product_details(ProductId::new(1)).await;
        let second = catalog.product_details(ProductId::new(1)).await;
        assert_eq!(first, second);
        assert_eq!(second.name, "Lamp");
    }

    #[tokio::test]
    async fn test_product_details_placeholder_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products/product/8"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let catalog = client_for(&server);
        assert_eq!(catalog.product_details(ProductId::new(8)).await.name, "Product 8");
        assert_eq!(catalog.product_details(ProductId::new(8)).await.name, "Product 8");
    }

    #[tokio::test]
    async fn test_admin_mutations_require_credential() {
        let server = MockServer::start().await;
        let catalog = client_for(&server);
        let input = CategoryInput {
            name: "Toys".to_string(),
            description: String::new(),
        };
        assert!(matches!(
            catalog.create_category(&input).await,
            Err(ClientError::Unauthorized)
        ));
    }
}
