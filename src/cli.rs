use clap::{Parser, Subcommand};
use sqlx::PgPool;
use std::sync::Arc;

use estate_core::config::{mask_password, mask_secret, profiles::Profile, Config};
use estate_core::db::{self, PgStore};
use estate_core::paystack::PaystackClient;
use estate_core::ports::Store;
use estate_core::services::{GatewaySettings, Services, SystemClock};

#[derive(Parser)]
#[command(name = "estate-core")]
#[command(about = "Estate Core - property marketplace payments and workflow API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Promotion maintenance commands
    #[command(subcommand)]
    Promotions(PromotionCommands),

    /// Print the resolved configuration with secrets masked
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Verify a transaction against Paystack and settle it
    Verify {
        /// Transaction reference
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum PromotionCommands {
    /// Mark every active promotion past its expiry as expired
    Expire,
}

/// Wires the Postgres store and the Paystack client into the domain services.
pub fn build_services(config: &Config, pool: PgPool) -> (Arc<dyn Store>, Services) {
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let gateway = Arc::new(PaystackClient::new(
        config.paystack_base_url.clone(),
        config.paystack_secret_key.clone(),
    ));
    let settings = GatewaySettings {
        callback_url: config.paystack_callback_url.clone(),
        transfers_enabled: config.transfers_enabled,
    };
    let services = Services::new(store.clone(), gateway, Arc::new(SystemClock), settings);
    (store, services)
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_tx_verify(config: &Config, reference: &str) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    let (_, services) = build_services(config, pool);

    let tx = services.transactions.verify(reference).await?;
    tracing::info!(reference, status = %tx.status, "Transaction verified");
    println!("✓ Transaction {} is {}", tx.reference, tx.status);
    println!("  Kind: {}", tx.kind.as_str());
    println!("  Amount: {} (fee {}, net {})", tx.amount, tx.fee, tx.net_amount);

    Ok(())
}

pub async fn handle_promotions_expire(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    let (_, services) = build_services(config, pool);

    let expired = services.promotions.expire_due().await?;
    println!("✓ Expired {} promotion(s)", expired);

    Ok(())
}

pub fn handle_config_validate(config: &Config, profile: Profile, overrides: &[String]) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration ({} profile):", profile.as_str());
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Database Max Connections: {}", config.database_max_connections);
    println!("  Paystack Base URL: {}", config.paystack_base_url);
    println!("  Paystack Secret Key: {}", mask_secret(&config.paystack_secret_key));
    println!(
        "  Paystack Callback URL: {}",
        config.paystack_callback_url.as_deref().unwrap_or("(none)")
    );
    println!("  Site URL: {}", config.site_url);
    println!("  Rate Limit: {}/min", config.rate_limit_per_minute);
    println!(
        "  Rate Limit Redis: {}",
        config
            .rate_limit_redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(in process)".to_string())
    );
    println!("  Rate Limit Trusts Proxy: {}", config.rate_limit_trust_proxy);
    println!("  Transfers Enabled: {}", config.transfers_enabled);
    println!("  Promotion Sweep: {}", config.promotion_sweep_schedule);
    println!(
        "  CORS Origins: {}",
        config.cors_allowed_origins.as_deref().unwrap_or("(any)")
    );
    if !overrides.is_empty() {
        println!("  Set from environment: {}", overrides.join(", "));
    }

    println!("✓ Configuration is valid");

    Ok(())
}
