//! Shared client context.

use std::sync::Arc;

use crate::auth::AuthClient;
use crate::cart::{CartBackend, CartCoordinator, CartMode, LocalCart, RemoteCart};
use crate::catalog::CatalogClient;
use crate::checkout::CheckoutSequencer;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::geocode::{Geocoder, GoogleGeocoder};
use crate::orders::{OrderStatusProjector, OrdersClient};
use crate::session::Session;
use crate::storage::{ClientStorage, FileStorage};

/// Everything a front end needs, wired from one [`ClientConfig`].
///
/// This struct is cheaply cloneable via `Arc`; clones share the session,
/// the cart snapshot and the caches.
#[derive(Clone)]
pub struct ShopContext {
    inner: Arc<ShopContextInner>,
}

struct ShopContextInner {
    config: ClientConfig,
    session: Session,
    gateway: Gateway,
    auth: AuthClient,
    catalog: CatalogClient,
    cart: CartCoordinator,
    orders: OrdersClient,
    projector: OrderStatusProjector,
    geocoder: Arc<dyn Geocoder>,
}

impl ShopContext {
    /// Create a context backed by a file store and the Google geocoder.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let storage: Arc<dyn ClientStorage> =
            Arc::new(FileStorage::new(config.storage_path.clone()));
        let geocoder: Arc<dyn Geocoder> =
            Arc::new(GoogleGeocoder::new(&config.geocoder, config.request_timeout)?);
        Self::with_parts(config, storage, geocoder)
    }

    /// Create a context from explicit storage and geocoder implementations.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_parts(
        config: ClientConfig,
        storage: Arc<dyn ClientStorage>,
        geocoder: Arc<dyn Geocoder>,
    ) -> Result<Self> {
        let session = Session::restore(Arc::clone(&storage));
        let gateway = Gateway::new(
            config.endpoints.clone(),
            session.clone(),
            config.request_timeout,
        )?;

        let backend: Arc<dyn CartBackend> = match config.cart_mode {
            CartMode::Remote => Arc::new(RemoteCart::new(gateway.clone())),
            CartMode::Local => Arc::new(LocalCart::new(storage)),
        };

        let auth = AuthClient::new(gateway.clone());
        let orders = OrdersClient::new(gateway.clone());
        let projector =
            OrderStatusProjector::new(orders.clone(), auth.clone(), config.cache_capacity);

        tracing::debug!(cart_mode = %config.cart_mode, "Client context created");

        Ok(Self {
            inner: Arc::new(ShopContextInner {
                catalog: CatalogClient::new(gateway.clone(), config.cache_capacity),
                cart: CartCoordinator::new(backend),
                config,
                session,
                gateway,
                auth,
                orders,
                projector,
                geocoder,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    #[must_use]
    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    #[must_use]
    pub fn auth(&self) -> &AuthClient {
        &self.inner.auth
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogClient {
        &self.inner.catalog
    }

    #[must_use]
    pub fn cart(&self) -> &CartCoordinator {
        &self.inner.cart
    }

    #[must_use]
    pub fn orders(&self) -> &OrdersClient {
        &self.inner.orders
    }

    #[must_use]
    pub fn projector(&self) -> &OrderStatusProjector {
        &self.inner.projector
    }

    /// Start a fresh checkout flow.
    #[must_use]
    pub fn checkout(&self) -> CheckoutSequencer {
        CheckoutSequencer::new(
            self.inner.cart.clone(),
            self.inner.catalog.clone(),
            self.inner.auth.clone(),
            self.inner.orders.clone(),
            Arc::clone(&self.inner.geocoder),
        )
    }

    /// Log out and reset the cart view.
    ///
    /// The session is cleared even if the backend call fails. A local cart
    /// is emptied; a remote cart snapshot becomes empty because the session
    /// no longer has a credential.
    pub async fn logout(&self) {
        self.inner.auth.logout().await;

        let reset = match self.inner.cart.mode() {
            CartMode::Local => self.inner.cart.clear().await,
            CartMode::Remote => self.inner.cart.refresh().await,
        };
        if let Err(e) = reset {
            tracing::warn!(error = %e, "Failed to reset cart after logout");
        }
    }
}

impl std::fmt::Debug for ShopContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopContext")
            .field("config", &self.inner.config)
            .field("authenticated", &self.inner.session.is_authenticated())
            .finish_non_exhaustive()
    }
}
