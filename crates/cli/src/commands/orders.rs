//! Order listing and status commands.

use bamazon_client::ShopContext;
use bamazon_client::orders::{AdminOrderView, OrderScope, OrderView, TransitionOutcome};
use bamazon_core::{OrderId, OrderStatus};

use super::{CliError, confirm_on_terminal};

/// List orders. `all` switches to the staff listing.
pub async fn list(
    ctx: &ShopContext,
    all: bool,
    status: Option<OrderStatus>,
) -> Result<String, CliError> {
    if all {
        let orders = ctx.projector().admin_orders(status).await?;
        return Ok(render_admin(&orders));
    }

    let orders: Vec<OrderView> = ctx
        .projector()
        .list_orders(OrderScope::Mine)
        .await?
        .into_iter()
        .filter(|view| status.is_none_or(|s| view.order.status == s))
        .collect();
    Ok(render_mine(&orders))
}

pub async fn cancel(ctx: &ShopContext, id: OrderId) -> Result<String, CliError> {
    let order = ctx.projector().cancel_order(id).await?;
    Ok(format!(
        "Order {} is now {}",
        order.order_number,
        order.status.label()
    ))
}

/// Change an order's status after confirmation, then show the re-read list.
pub async fn set_status(
    ctx: &ShopContext,
    id: OrderId,
    status: OrderStatus,
    assume_yes: bool,
) -> Result<String, CliError> {
    let report = if assume_yes {
        ctx.projector()
            .transition_status(id, status, &|_: &str| true, None)
            .await
    } else {
        ctx.projector()
            .transition_status(id, status, &confirm_on_terminal, None)
            .await
    };

    let headline = match report.outcome {
        TransitionOutcome::Applied(order) => format!(
            "Order {} is now {}",
            order.order_number,
            order.status.label()
        ),
        TransitionOutcome::Declined => "No change made".to_string(),
        TransitionOutcome::Failed(e) => return Err(e.into()),
    };

    let orders = report.orders?;
    Ok(format!("{headline}\n\n{}", render_admin(&orders)))
}

fn render_mine(orders: &[OrderView]) -> String {
    if orders.is_empty() {
        return "You have no orders yet".to_string();
    }
    orders
        .iter()
        .map(|view| {
            let marker = if view.cancellable { "  (cancellable)" } else { "" };
            format!(
                "{:>4}  {}  {:<10}  {:>10}  {} item(s){marker}",
                view.order.id,
                view.order.created_at.format("%Y-%m-%d %H:%M"),
                view.status_label,
                view.total_display(),
                view.item_count,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_admin(orders: &[AdminOrderView]) -> String {
    if orders.is_empty() {
        return "No orders found".to_string();
    }
    orders
        .iter()
        .map(|row| {
            format!(
                "{:>4}  {:<14}  {:<20}  {:<10}  {:>10}  {}",
                row.view.order.id,
                row.view.order.order_number,
                row.customer,
                row.view.status_label,
                row.view.total_display(),
                row.address,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
