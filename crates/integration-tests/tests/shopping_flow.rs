//! End-to-end customer flows: log in, fill the cart, check out, cancel.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, Request, ResponseTemplate};

use bamazon_client::cart::{CartMode, LineRef};
use bamazon_client::checkout::{BeginOutcome, CheckoutState, DeliveryForm, Navigation};
use bamazon_client::orders::{OrderScope, PaymentMethod};
use bamazon_client::{ClientError, ValidationError};
use bamazon_core::{OrderId, OrderStatus, ProductId};
use bamazon_integration_tests::{CartStub, TestShop, customer, order, product};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_remote_cart_checkout_flow() {
    let shop = TestShop::start(CartMode::Remote).await;
    let cart = CartStub::default();
    cart.mount(&shop.server).await;
    shop.mock_login(&customer()).await;
    shop.mock_profile(&customer()).await;
    shop.mock_product(&product(1, "Lamp", "10.00")).await;
    shop.mock_product(&product(2, "Mug", "5.50")).await;

    Mock::given(method("POST"))
        .and(path("/api/orders/create"))
        .and(body_partial_json(json!({
            "delivery_name": "Alice Liddell",
            "delivery_phone": "555-0100",
            "delivery_address": "1 Calle Mayor",
            "delivery_city": "Madrid",
            "delivery_state": "MD",
            "delivery_postal_code": "28013",
            "delivery_country": "Spain",
            "payment_method": "COD",
        })))
        .respond_with({
            let cart = cart.clone();
            move |_: &Request| {
                cart.clear();
                ResponseTemplate::new(201).set_body_json(order(7, "pending", None))
            }
        })
        .expect(1)
        .mount(&shop.server)
        .await;

    // Signed out: empty cart, no request
    assert!(shop.ctx.cart().refresh().await.unwrap().is_empty());

    let user = shop.ctx.auth().login("alice", "wonderland").await.unwrap();
    assert_eq!(user.display_name(), "Alice Liddell");

    let cart_view = shop.ctx.cart();
    cart_view.add_item(ProductId::new(1), dec("10.00"), 1).await.unwrap();
    cart_view.add_item(ProductId::new(1), dec("10.00"), 1).await.unwrap();
    let snapshot = cart_view
        .add_item(ProductId::new(2), dec("5.50"), 1)
        .await
        .unwrap();
    assert_eq!(snapshot.item_count, 3);
    assert_eq!(snapshot.totals.total, dec("28.05"));
    assert_eq!(cart.quantity(1), 2);

    let mut updates = cart_view.subscribe();
    let checkout = shop.ctx.checkout();
    let BeginOutcome::Ready {
        summary,
        suggested_name,
    } = checkout.begin().await.unwrap()
    else {
        panic!("expected checkout to be ready");
    };
    assert_eq!(summary.lines.len(), 2);
    assert_eq!(summary.lines[0].name, "Lamp");
    assert_eq!(summary.lines[0].line_total, dec("20.00"));

    let address = checkout.search_address("calle mayor 1").await.unwrap();
    assert_eq!(address.street, "1 Calle Mayor");

    let placed = checkout
        .submit(DeliveryForm {
            name: suggested_name.unwrap(),
            phone: "555-0100".to_string(),
            payment_method: PaymentMethod::default(),
        })
        .await
        .unwrap();

    assert_eq!(placed.next, Navigation::Orders);
    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(checkout.state(), CheckoutState::Completed);

    // The cart view follows the server-side clear
    assert!(updates.has_changed().unwrap());
    assert!(updates.borrow_and_update().is_empty());
    assert_eq!(shop.ctx.cart().item_count(), 0);
}

#[tokio::test]
async fn test_local_cart_checkout_sends_items() {
    let shop = TestShop::signed_in(CartMode::Local).await;
    shop.mock_profile(&customer()).await;
    shop.mock_product(&product(3, "Kettle", "24.99")).await;

    Mock::given(method("POST"))
        .and(path("/api/orders/create"))
        .and(body_partial_json(json!({
            "payment_method": "CARD",
            "items": [{ "product_id": 3, "quantity": 2, "price": "24.99" }],
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(order(8, "pending", None)))
        .expect(1)
        .mount(&shop.server)
        .await;

    let cart = shop.ctx.cart();
    cart.add_item(ProductId::new(3), dec("24.99"), 3).await.unwrap();
    cart.set_quantity_input(LineRef::Product(ProductId::new(3)), "2")
        .await
        .unwrap();

    let checkout = shop.ctx.checkout();
    assert!(matches!(
        checkout.begin().await.unwrap(),
        BeginOutcome::Ready { .. }
    ));
    checkout.select_place(&bamazon_integration_tests::madrid()).unwrap();
    checkout
        .submit(DeliveryForm {
            name: "Alice".to_string(),
            phone: "555-0100".to_string(),
            payment_method: PaymentMethod::new("CARD"),
        })
        .await
        .unwrap();

    assert!(shop.ctx.cart().snapshot().is_empty());
    assert!(shop.restart(CartMode::Local).cart().get_cart().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_quantity_leaves_cart_untouched() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    let stub = CartStub::default();
    stub.mount(&shop.server).await;

    let cart = shop.ctx.cart();
    cart.add_item(ProductId::new(1), dec("10.00"), 2).await.unwrap();

    let err = cart
        .set_quantity_input(LineRef::Product(ProductId::new(1)), "two")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::InvalidQuantity(_))
    ));
    assert_eq!(stub.quantity(1), 2);

    cart.set_quantity_input(LineRef::Product(ProductId::new(1)), "0")
        .await
        .unwrap();
    assert_eq!(stub.quantity(1), 0);
    assert!(cart.snapshot().is_empty());
}

#[tokio::test]
async fn test_cancel_pending_order() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            order(7, "pending", None),
            order(6, "delivered", None),
        ])))
        .mount(&shop.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order(7, "pending", None)))
        .mount(&shop.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/7/cancel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(order(7, "cancelled", None)))
        .expect(1)
        .mount(&shop.server)
        .await;

    let views = shop.ctx.projector().list_orders(OrderScope::Mine).await.unwrap();
    assert_eq!(views.len(), 2);
    assert!(views[0].cancellable);
    assert!(!views[1].cancellable);
    assert_eq!(views[1].status_label, "DELIVERED");

    let cancelled = shop.ctx.projector().cancel_order(OrderId::new(7)).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Delivered orders are refused before any request is made
    let delivered = views[1].order.clone();
    let err = shop.ctx.projector().cancel(&delivered).await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::NotCancellable(OrderStatus::Delivered))
    ));
}

#[tokio::test]
async fn test_checkout_with_empty_cart_redirects() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    CartStub::default().mount(&shop.server).await;

    let checkout = shop.ctx.checkout();
    assert_eq!(
        checkout.begin().await.unwrap(),
        BeginOutcome::Redirect(Navigation::Cart)
    );
    assert!(!checkout.can_submit());
}
