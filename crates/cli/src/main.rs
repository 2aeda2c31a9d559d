//! Bamazon CLI - shop from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Log in (prompts for the password)
//! bz-cli login -u alice
//!
//! # Browse and fill the cart
//! bz-cli products --category 2
//! bz-cli cart add 14 -q 2
//!
//! # Check out
//! bz-cli checkout --phone 555-0100 --address "1 Infinite Loop, Cupertino"
//!
//! # Staff: move an order along
//! bz-cli orders set-status 31 shipped
//! ```
//!
//! # Environment Variables
//!
//! - `BAMAZON_AUTH_URL`, `BAMAZON_PRODUCTS_URL`, `BAMAZON_CART_URL`,
//!   `BAMAZON_ORDERS_URL` - backend base URLs
//! - `BAMAZON_CART_MODE` - `remote` (default) or `local`
//! - `GEOCODER_API_KEY` - required for address lookup
//! - `SENTRY_DSN` - optional error reporting

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bamazon_client::ShopContext;
use bamazon_client::config::ClientConfig;
use bamazon_client::geocode::LatLng;
use bamazon_core::{CategoryId, OrderId, OrderStatus, ProductId};

mod commands;

use commands::CliError;
use commands::account::RegisterArgs;
use commands::checkout::{AddressInput, CheckoutArgs};

#[derive(Parser)]
#[command(name = "bz-cli")]
#[command(author, version, about = "Bamazon shopping client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to your account
    Login {
        #[arg(short, long)]
        username: String,

        /// Read from the terminal when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(short, long)]
        username: String,

        /// Defaults to `<username>@bamazon.com`
        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        /// Read from the terminal when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Log out and forget the stored credential
    Logout,
    /// Show your profile
    Profile,
    /// List product categories
    Categories,
    /// List products
    Products {
        /// Only products in this category
        #[arg(short, long)]
        category: Option<CategoryId>,
    },
    /// Show one product
    Product { id: ProductId },
    /// Show or change the cart
    Cart {
        #[command(subcommand)]
        action: Option<CartAction>,
    },
    /// Place an order for the current cart
    Checkout {
        /// Delivery name; defaults to the profile name
        #[arg(short, long)]
        name: Option<String>,

        /// Delivery phone
        #[arg(long, default_value = "")]
        phone: String,

        /// Address to look up
        #[arg(short, long, conflicts_with_all = ["lat", "lng"])]
        address: Option<String>,

        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,

        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,

        /// Payment method (defaults to COD)
        #[arg(long)]
        payment: Option<String>,
    },
    /// View and manage orders
    Orders {
        #[command(subcommand)]
        action: OrdersAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show cart contents and totals
    Show,
    /// Add a product
    Add {
        product: ProductId,

        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line quantity (0 removes it)
    Set {
        product: ProductId,
        #[arg(allow_hyphen_values = true)]
        quantity: String,
    },
    /// Remove a product
    Remove { product: ProductId },
    /// Empty the cart
    Clear,
}

#[derive(Subcommand)]
enum OrdersAction {
    /// List orders
    List {
        /// Every customer's orders (staff only)
        #[arg(long)]
        all: bool,

        #[arg(short, long)]
        status: Option<OrderStatus>,
    },
    /// Cancel one of your orders (pending or confirmed)
    Cancel { id: OrderId },
    /// Change an order's status (staff only)
    SetStatus {
        id: OrderId,
        status: OrderStatus,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    // Logs go to stderr so command output stays clean
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bamazon_client=info,bamazon_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            let _ = writeln!(std::io::stderr(), "Configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Sentry must be initialized before the tracing subscriber
    let sentry_guard = init_sentry(&config);
    init_tracing();

    let result = match ShopContext::new(config) {
        Ok(ctx) => run(&ctx, cli.command).await,
        Err(e) => Err(e.into()),
    };

    let code = match result {
        Ok(output) => {
            let _ = writeln!(std::io::stdout().lock(), "{output}");
            0
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            let _ = writeln!(std::io::stderr(), "{e}");
            1
        }
    };

    drop(sentry_guard);
    std::process::exit(code);
}

async fn run(ctx: &ShopContext, command: Commands) -> Result<String, CliError> {
    match command {
        Commands::Login { username, password } => {
            commands::account::login(ctx, &username, password).await
        }
        Commands::Register {
            username,
            email,
            first_name,
            last_name,
            password,
        } => {
            let args = RegisterArgs {
                username,
                email,
                first_name,
                last_name,
                password,
            };
            commands::account::register(ctx, args).await
        }
        Commands::Logout => Ok(commands::account::logout(ctx).await),
        Commands::Profile => commands::account::profile(ctx).await,
        Commands::Categories => commands::catalog::categories(ctx).await,
        Commands::Products { category } => commands::catalog::products(ctx, category).await,
        Commands::Product { id } => commands::catalog::product(ctx, id).await,
        Commands::Cart { action } => match action.unwrap_or(CartAction::Show) {
            CartAction::Show => commands::cart::show(ctx).await,
            CartAction::Add { product, quantity } => {
                commands::cart::add(ctx, product, quantity).await
            }
            CartAction::Set { product, quantity } => {
                commands::cart::set(ctx, product, &quantity).await
            }
            CartAction::Remove { product } => commands::cart::remove(ctx, product).await,
            CartAction::Clear => commands::cart::clear(ctx).await,
        },
        Commands::Checkout {
            name,
            phone,
            address,
            lat,
            lng,
            payment,
        } => {
            let address = match (address, lat, lng) {
                (Some(query), _, _) => AddressInput::Search(query),
                (None, Some(lat), Some(lng)) => AddressInput::Point(LatLng { lat, lng }),
                _ => AddressInput::Missing,
            };
            let args = CheckoutArgs {
                name,
                phone,
                address,
                payment,
            };
            commands::checkout::run(ctx, args).await
        }
        Commands::Orders { action } => match action {
            OrdersAction::List { all, status } => commands::orders::list(ctx, all, status).await,
            OrdersAction::Cancel { id } => commands::orders::cancel(ctx, id).await,
            OrdersAction::SetStatus { id, status, yes } => {
                commands::orders::set_status(ctx, id, status, yes).await
            }
        },
    }
}
