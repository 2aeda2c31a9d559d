//! Checkout command.
//!
//! Runs the whole flow in one go: load the cart, resolve the address from
//! text or coordinates, then submit.

use bamazon_client::ShopContext;
use bamazon_client::checkout::{BeginOutcome, DeliveryForm, Navigation, OrderSummary};
use bamazon_client::geocode::LatLng;
use bamazon_client::orders::PaymentMethod;
use bamazon_core::format_amount;

use super::CliError;
use super::cart::render_totals;

/// Where to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum AddressInput {
    /// Free text, resolved by forward geocoding.
    Search(String),
    /// Map coordinates, resolved by reverse geocoding.
    Point(LatLng),
    Missing,
}

#[derive(Debug, Clone)]
pub struct CheckoutArgs {
    /// Defaults to the profile name.
    pub name: Option<String>,
    pub phone: String,
    pub address: AddressInput,
    pub payment: Option<String>,
}

pub async fn run(ctx: &ShopContext, args: CheckoutArgs) -> Result<String, CliError> {
    let checkout = ctx.checkout();

    let (summary, suggested_name) = match checkout.begin().await? {
        BeginOutcome::Redirect(Navigation::Login) => {
            return Err(CliError::Redirect("Please log in to check out".to_string()));
        }
        BeginOutcome::Redirect(_) => {
            return Err(CliError::Redirect("Your cart is empty".to_string()));
        }
        BeginOutcome::Ready {
            summary,
            suggested_name,
        } => (summary, suggested_name),
    };

    let address = match args.address {
        AddressInput::Search(query) => Some(checkout.search_address(&query).await?),
        AddressInput::Point(point) => Some(checkout.place_marker(point).await?),
        AddressInput::Missing => None,
    };

    let form = DeliveryForm {
        name: args.name.or(suggested_name).unwrap_or_default(),
        phone: args.phone,
        payment_method: PaymentMethod::new(args.payment.as_deref().unwrap_or_default()),
    };
    let placed = checkout.submit(form).await?;

    let mut lines = render_summary(&summary);
    lines.push(String::new());
    if let Some(address) = address {
        lines.push(format!("Delivering to {}", address.formatted_address));
    }
    lines.push(format!(
        "Order {} placed ({}). Total {}.",
        placed.order.order_number,
        placed.order.status.label(),
        format_amount(placed.order.total_amount)
    ));
    Ok(lines.join("\n"))
}

fn render_summary(summary: &OrderSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .lines
        .iter()
        .map(|line| {
            format!(
                "{:<32}  {:>3} x {:>10}  {:>10}",
                line.name,
                line.quantity,
                format_amount(line.unit_price),
                format_amount(line.line_total)
            )
        })
        .collect();
    lines.push(String::new());
    lines.extend(render_totals(&summary.totals));
    lines
}
