//! Staff order management: listing, usernames, confirmed status changes.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

use bamazon_client::ClientError;
use bamazon_client::cart::CartMode;
use bamazon_client::orders::{AddressDisplay, TransitionOutcome};
use bamazon_core::{OrderId, OrderStatus};
use bamazon_integration_tests::{TestShop, customer, order, staff};

async fn mount_listing(shop: &TestShop) {
    Mock::given(method("GET"))
        .and(path("/api/orders/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            order(12, "pending", Some(3)),
            order(11, "shipped", Some(3)),
            order(10, "pending", None),
        ])))
        .mount(&shop.server)
        .await;
}

#[tokio::test]
async fn test_admin_listing_resolves_usernames_once() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    shop.mock_profile(&staff()).await;
    mount_listing(&shop).await;
    Mock::given(method("GET"))
        .and(path("/api/users/3/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 3, "username": "alice", "email": "alice@bamazon.com"
        })))
        .expect(1)
        .mount(&shop.server)
        .await;

    let projector = shop.ctx.projector();
    let rows = projector.admin_orders(None).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].username.as_deref(), Some("alice"));
    assert_eq!(rows[0].customer, "Alice Liddell");
    assert!(rows[2].username.is_none());
    assert_eq!(
        rows[0].address,
        AddressDisplay::MapLink {
            url: "https://www.google.com/maps?q=40.4167754,-3.7037902".to_string(),
            text: "1 Calle Mayor".to_string(),
        }
    );

    let pending = projector
        .admin_orders(Some(OrderStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|row| row.view.order.status == OrderStatus::Pending));
}

#[tokio::test]
async fn test_non_staff_cannot_list_all_orders() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    shop.mock_profile(&customer()).await;
    Mock::given(method("GET"))
        .and(path("/api/orders/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&shop.server)
        .await;

    let err = shop.ctx.projector().admin_orders(None).await.unwrap_err();
    assert!(matches!(err, ClientError::Forbidden(_)));
    assert_eq!(err.user_message(), "Admin access required");
}

#[tokio::test]
async fn test_confirmed_transition_is_sent_and_listing_reread() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    shop.mock_profile(&staff()).await;
    mount_listing(&shop).await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/12/status"))
        .and(body_json(json!({ "status": "confirmed" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(order(12, "confirmed", Some(3))))
        .expect(1)
        .mount(&shop.server)
        .await;

    let prompts = AtomicUsize::new(0);
    let gate = |prompt: &str| {
        assert_eq!(prompt, "Change order status to confirmed?");
        prompts.fetch_add(1, Ordering::SeqCst);
        true
    };

    let report = shop
        .ctx
        .projector()
        .transition_status(OrderId::new(12), OrderStatus::Confirmed, &gate, None)
        .await;

    assert_eq!(prompts.load(Ordering::SeqCst), 1);
    let TransitionOutcome::Applied(updated) = report.outcome else {
        panic!("expected the change to be applied");
    };
    assert_eq!(updated.status, OrderStatus::Confirmed);
    // The listing comes from the backend, not from the applied change
    assert_eq!(report.orders.unwrap()[0].view.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_declined_transition_sends_nothing() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    shop.mock_profile(&staff()).await;
    mount_listing(&shop).await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/12/status"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&shop.server)
        .await;

    let report = shop
        .ctx
        .projector()
        .transition_status(
            OrderId::new(12),
            OrderStatus::Delivered,
            &|_: &str| false,
            None,
        )
        .await;

    assert!(matches!(report.outcome, TransitionOutcome::Declined));
    assert_eq!(report.orders.unwrap().len(), 3);
}

#[tokio::test]
async fn test_rejected_transition_still_rereads() {
    let shop = TestShop::signed_in(CartMode::Remote).await;
    shop.mock_profile(&staff()).await;
    mount_listing(&shop).await;
    Mock::given(method("PUT"))
        .and(path("/api/orders/11/status"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "Invalid status transition" })),
        )
        .mount(&shop.server)
        .await;

    let report = shop
        .ctx
        .projector()
        .transition_status(
            OrderId::new(11),
            OrderStatus::Pending,
            &|_: &str| true,
            Some(OrderStatus::Shipped),
        )
        .await;

    let TransitionOutcome::Failed(err) = report.outcome else {
        panic!("expected the change to fail");
    };
    assert_eq!(err.user_message(), "Invalid status transition");

    let rows = report.orders.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].view.status_label, "SHIPPED");
}
