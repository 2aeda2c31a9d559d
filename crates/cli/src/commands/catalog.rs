//! Browsing commands.

use bamazon_client::ShopContext;
use bamazon_client::catalog::{Category, Product};
use bamazon_core::{CategoryId, ProductId, format_amount};

use super::CliError;

pub async fn categories(ctx: &ShopContext) -> Result<String, CliError> {
    let categories = ctx.catalog().categories().await?;
    Ok(render_categories(&categories))
}

pub async fn products(ctx: &ShopContext, category: Option<CategoryId>) -> Result<String, CliError> {
    let products = ctx.catalog().products(category).await?;
    Ok(render_products(&products))
}

pub async fn product(ctx: &ShopContext, id: ProductId) -> Result<String, CliError> {
    let product = ctx.catalog().product(id).await?;

    let mut lines = vec![
        format!("{} (#{})", product.name, product.id),
        format!("Price:    {}", format_amount(product.price)),
        format!("In stock: {}", product.stock),
    ];
    if let Some(category) = product.category_label() {
        lines.push(format!("Category: {category}"));
    }
    if !product.description.is_empty() {
        lines.push(String::new());
        lines.push(product.description.clone());
    }
    Ok(lines.join("\n"))
}

fn render_categories(categories: &[Category]) -> String {
    if categories.is_empty() {
        return "No categories".to_string();
    }
    categories
        .iter()
        .map(|c| format!("{:>4}  {}", c.id, c.name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_products(products: &[Product]) -> String {
    if products.is_empty() {
        return "No products found".to_string();
    }
    products
        .iter()
        .map(|p| {
            format!(
                "{:>4}  {:<32}  {:>10}  stock {}",
                p.id,
                p.name,
                format_amount(p.price),
                p.stock
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
