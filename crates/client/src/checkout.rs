//! Checkout sequencing.
//!
//! ```text
//! Idle -> AddressPending -> AddressResolved -> Validating -> Submitting -> Completed
//!                                                                     \-> Failed
//! ```
//!
//! [`CheckoutSequencer`] is driven by explicit commands (`begin`, address
//! selection, `submit`). It guards against concurrent submission itself:
//! a second `submit` while one is in flight is rejected, whatever the
//! presentation layer does.

use std::sync::{Arc, Mutex, PoisonError};

use rust_decimal::Decimal;
use tracing::instrument;

use bamazon_core::{DerivedTotals, ProductId};

use crate::auth::AuthClient;
use crate::cart::CartCoordinator;
use crate::catalog::CatalogClient;
use crate::error::{ClientError, Result, ValidationError};
use crate::geocode::{DeliveryAddress, Geocoder, LatLng, Place};
use crate::orders::{CreateOrderRequest, Order, OrdersClient, PaymentMethod};

/// Checkout flow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckoutState {
    #[default]
    Idle,
    AddressPending,
    AddressResolved,
    Validating,
    Submitting,
    Completed,
    Failed,
}

/// Where the presentation layer should go next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Login,
    Cart,
    Orders,
}

/// Contact and payment details entered by the customer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryForm {
    pub name: String,
    pub phone: String,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryLine {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Cart contents as shown on the checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSummary {
    pub lines: Vec<SummaryLine>,
    pub totals: DerivedTotals,
}

/// Result of [`CheckoutSequencer::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Checkout cannot proceed; go elsewhere.
    Redirect(Navigation),
    /// Waiting for an address.
    Ready {
        summary: OrderSummary,
        /// Name to prefill from the customer's profile.
        suggested_name: Option<String>,
    },
}

/// Result of a successful [`CheckoutSequencer::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub next: Navigation,
}

#[derive(Debug, Default)]
struct Progress {
    state: CheckoutState,
    address: Option<DeliveryAddress>,
    form: Option<DeliveryForm>,
    last_error: Option<String>,
}

/// Drives one checkout attempt.
pub struct CheckoutSequencer {
    cart: CartCoordinator,
    catalog: CatalogClient,
    auth: AuthClient,
    orders: OrdersClient,
    geocoder: Arc<dyn Geocoder>,
    progress: Mutex<Progress>,
}

impl CheckoutSequencer {
    #[must_use]
    pub fn new(
        cart: CartCoordinator,
        catalog: CatalogClient,
        auth: AuthClient,
        orders: OrdersClient,
        geocoder: Arc<dyn Geocoder>,
    ) -> Self {
        Self {
            cart,
            catalog,
            auth,
            orders,
            geocoder,
            progress: Mutex::new(Progress::default()),
        }
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> CheckoutState {
        self.progress().state
    }

    /// Resolved delivery address, if any.
    #[must_use]
    pub fn address(&self) -> Option<DeliveryAddress> {
        self.progress().address.clone()
    }

    /// Form data from the last submit attempt.
    #[must_use]
    pub fn form(&self) -> Option<DeliveryForm> {
        self.progress().form.clone()
    }

    /// User-facing message from the last failed step.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.progress().last_error.clone()
    }

    /// Whether the submit control should be enabled.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        matches!(
            self.state(),
            CheckoutState::AddressPending | CheckoutState::AddressResolved | CheckoutState::Failed
        )
    }

    /// Open the checkout: load the cart and the prefill name.
    ///
    /// Signed out redirects to login; an empty cart redirects to the cart and
    /// leaves the flow idle.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SubmissionInFlight` while an order is being
    /// placed, or the cart fetch error (the flow returns to idle).
    #[instrument(skip(self))]
    pub async fn begin(&self) -> Result<BeginOutcome> {
        if !self.auth.is_authenticated() {
            return Ok(BeginOutcome::Redirect(Navigation::Login));
        }

        {
            let mut progress = self.progress();
            if progress.state == CheckoutState::Submitting {
                return Err(ClientError::SubmissionInFlight);
            }
            *progress = Progress {
                state: CheckoutState::AddressPending,
                ..Progress::default()
            };
        }

        let lines = match self.cart.get_cart().await {
            Ok(lines) => lines,
            Err(e) => {
                self.progress().state = CheckoutState::Idle;
                if e.requires_login() {
                    return Ok(BeginOutcome::Redirect(Navigation::Login));
                }
                return Err(e);
            }
        };

        if lines.is_empty() {
            tracing::info!("Cart is empty, leaving checkout");
            self.progress().state = CheckoutState::Idle;
            return Ok(BeginOutcome::Redirect(Navigation::Cart));
        }

        let mut summary_lines = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = self.catalog.product_details(line.product_id).await;
            summary_lines.push(SummaryLine {
                product_id: line.product_id,
                name: product.name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total(),
            });
        }

        let suggested_name = match self.auth.profile().await {
            Ok(user) => Some(user.display_name()),
            Err(e) => {
                tracing::debug!(error = %e, "Could not load profile for name prefill");
                None
            }
        };

        Ok(BeginOutcome::Ready {
            summary: OrderSummary {
                lines: summary_lines,
                totals: crate::cart::totals(&lines),
            },
            suggested_name,
        })
    }

    /// Use a place picked from autocomplete.
    ///
    /// # Errors
    ///
    /// Returns a geocoding error if the place has no coordinates (state is
    /// unchanged), or a state error outside the address steps.
    pub fn select_place(&self, place: &Place) -> Result<DeliveryAddress> {
        self.check_address_step()?;
        let address = DeliveryAddress::from_place(place)?;
        self.apply_address(address)
    }

    /// Resolve free text through the geocoder.
    ///
    /// # Errors
    ///
    /// Returns the geocoding error (state is unchanged), or a state error
    /// outside the address steps.
    #[instrument(skip(self))]
    pub async fn search_address(&self, query: &str) -> Result<DeliveryAddress> {
        self.check_address_step()?;
        let place = self.geocoder.forward(query).await?;
        let address = DeliveryAddress::from_place(&place)?;
        self.apply_address(address)
    }

    /// Resolve a map marker position through the geocoder.
    ///
    /// # Errors
    ///
    /// Returns the geocoding error (state is unchanged), or a state error
    /// outside the address steps.
    #[instrument(skip(self))]
    pub async fn place_marker(&self, point: LatLng) -> Result<DeliveryAddress> {
        self.check_address_step()?;
        let place = self.geocoder.reverse(point).await?;
        let address = DeliveryAddress::from_place(&place)?;
        self.apply_address(address)
    }

    fn check_address_step(&self) -> Result<()> {
        match self.state() {
            CheckoutState::AddressPending
            | CheckoutState::AddressResolved
            | CheckoutState::Failed => Ok(()),
            CheckoutState::Submitting | CheckoutState::Validating => {
                Err(ClientError::SubmissionInFlight)
            }
            CheckoutState::Idle => Err(ClientError::InvalidState(
                "Checkout has not started".to_string(),
            )),
            CheckoutState::Completed => Err(ClientError::InvalidState(
                "Order already placed".to_string(),
            )),
        }
    }

    fn apply_address(&self, address: DeliveryAddress) -> Result<DeliveryAddress> {
        let mut progress = self.progress();
        // A lookup may finish after a submission started.
        match progress.state {
            CheckoutState::Submitting | CheckoutState::Validating => {
                return Err(ClientError::SubmissionInFlight);
            }
            CheckoutState::Idle | CheckoutState::Completed => {
                return Err(ClientError::InvalidState(
                    "Checkout is not collecting an address".to_string(),
                ));
            }
            _ => {}
        }
        progress.state = CheckoutState::AddressResolved;
        progress.address = Some(address.clone());
        progress.last_error = None;
        Ok(address)
    }

    /// Validate and place the order.
    ///
    /// Checks, in order: delivery name, delivery phone, resolved address. On
    /// failure the form and address are kept so the customer can retry.
    ///
    /// # Errors
    ///
    /// Returns a validation error before anything is sent,
    /// `ClientError::SubmissionInFlight` if an order is already being placed,
    /// or the orders backend error.
    #[instrument(skip(self, form))]
    pub async fn submit(&self, form: DeliveryForm) -> Result<PlacedOrder> {
        let request = {
            let mut progress = self.progress();
            let previous = progress.state;
            match previous {
                CheckoutState::Submitting | CheckoutState::Validating => {
                    return Err(ClientError::SubmissionInFlight);
                }
                CheckoutState::Idle => {
                    return Err(ClientError::InvalidState(
                        "Checkout has not started".to_string(),
                    ));
                }
                CheckoutState::Completed => {
                    return Err(ClientError::InvalidState("Order already placed".to_string()));
                }
                _ => {}
            }

            progress.state = CheckoutState::Validating;
            progress.form = Some(form.clone());

            let address = match validate(&form, progress.address.as_ref()) {
                Ok(address) => address.clone(),
                Err(e) => {
                    progress.state = previous;
                    progress.last_error = Some(e.to_string());
                    return Err(e.into());
                }
            };

            progress.state = CheckoutState::Submitting;
            progress.last_error = None;

            CreateOrderRequest::new(
                &form.name,
                &form.phone,
                &address,
                form.payment_method.clone(),
                &self.cart.snapshot().lines,
            )
        };

        match self.orders.create(&request).await {
            Ok(order) => {
                self.progress().state = CheckoutState::Completed;
                if let Err(e) = self.cart.order_placed().await {
                    tracing::warn!(error = %e, "Order placed but cart could not be refreshed");
                }
                Ok(PlacedOrder {
                    order,
                    next: Navigation::Orders,
                })
            }
            Err(e) => {
                let mut progress = self.progress();
                progress.state = CheckoutState::Failed;
                progress.last_error = Some(e.message_or("Failed to place order"));
                Err(e)
            }
        }
    }
}

fn validate<'a>(
    form: &DeliveryForm,
    address: Option<&'a DeliveryAddress>,
) -> std::result::Result<&'a DeliveryAddress, ValidationError> {
    if form.name.trim().is_empty() {
        return Err(ValidationError::MissingDeliveryName);
    }
    if form.phone.trim().is_empty() {
        return Err(ValidationError::MissingDeliveryPhone);
    }
    address.ok_or(ValidationError::MissingDeliveryAddress)
}

impl std::fmt::Debug for CheckoutSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSequencer")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
