//! Cart commands.

use bamazon_client::ShopContext;
use bamazon_client::cart::{CartSnapshot, LineRef};
use bamazon_core::{DerivedTotals, ProductId, format_amount};

use super::CliError;

/// Show the cart, re-read from its backend.
pub async fn show(ctx: &ShopContext) -> Result<String, CliError> {
    let snapshot = ctx.cart().refresh().await?;
    render(ctx, &snapshot).await
}

/// Add a product at its current catalog price.
pub async fn add(ctx: &ShopContext, id: ProductId, quantity: u32) -> Result<String, CliError> {
    let product = ctx.catalog().product(id).await?;
    let snapshot = ctx.cart().add_item(id, product.price, quantity).await?;
    Ok(format!(
        "Added {quantity} x {} to your cart ({} items)",
        product.name, snapshot.item_count
    ))
}

/// Set a line quantity from raw input; `0` removes the line.
pub async fn set(ctx: &ShopContext, id: ProductId, quantity: &str) -> Result<String, CliError> {
    let snapshot = ctx
        .cart()
        .set_quantity_input(LineRef::Product(id), quantity)
        .await?;
    render(ctx, &snapshot).await
}

pub async fn remove(ctx: &ShopContext, id: ProductId) -> Result<String, CliError> {
    let snapshot = ctx.cart().remove_item(LineRef::Product(id)).await?;
    render(ctx, &snapshot).await
}

pub async fn clear(ctx: &ShopContext) -> Result<String, CliError> {
    ctx.cart().clear().await?;
    Ok("Cart cleared".to_string())
}

async fn render(ctx: &ShopContext, snapshot: &CartSnapshot) -> Result<String, CliError> {
    if snapshot.is_empty() {
        return Ok("Your cart is empty".to_string());
    }

    let mut rows = Vec::with_capacity(snapshot.lines.len());
    for line in &snapshot.lines {
        let product = ctx.catalog().product_details(line.product_id).await;
        rows.push(format!(
            "{:>4}  {:<32}  {:>3} x {:>10}  {:>10}",
            line.product_id,
            product.name,
            line.quantity,
            format_amount(line.unit_price),
            format_amount(line.line_total())
        ));
    }
    rows.push(String::new());
    rows.extend(render_totals(&snapshot.totals));
    Ok(rows.join("\n"))
}

pub(crate) fn render_totals(totals: &DerivedTotals) -> Vec<String> {
    let totals = totals.rounded();
    vec![
        format!("Subtotal: {:>10}", format_amount(totals.subtotal)),
        format!("Tax:      {:>10}", format_amount(totals.tax)),
        format!("Total:    {:>10}", format_amount(totals.total)),
    ]
}
