mod cli;

use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, DbCommands, PromotionCommands, TxCommands};
use estate_core::config::{Config, ConfigInfo};
use estate_core::health::{HealthChecker, RedisChecker, StoreChecker};
use estate_core::middleware::rate_limit::RateLimitPruneJob;
use estate_core::services::{JobScheduler, PromotionExpiryJob};
use estate_core::{create_app, db, AppState};

const RATE_LIMIT_PRUNE_SCHEDULE: &str = "30 * * * * *";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let ConfigInfo {
        config,
        profile,
        overrides,
    } = Config::from_env()?;
    tracing::info!(profile = profile.as_str(), overrides = ?overrides, "Configuration loaded");

    match cli.command {
        Some(Commands::Serve) | None => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Tx(TxCommands::Verify { reference })) => {
            cli::handle_tx_verify(&config, &reference).await
        }
        Some(Commands::Promotions(PromotionCommands::Expire)) => {
            cli::handle_promotions_expire(&config).await
        }
        Some(Commands::Config) => cli::handle_config_validate(&config, profile, &overrides),
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let (store, services) = cli::build_services(&config, pool);

    let mut health = HealthChecker::new().add_checker(Box::new(StoreChecker::new(store)));
    if let Some(url) = &config.rate_limit_redis_url {
        health = health.add_checker(Box::new(RedisChecker::new(url.clone())));
    }

    let state = AppState::new(&config, services, health);

    let scheduler = JobScheduler::new();
    scheduler
        .register_job(Box::new(PromotionExpiryJob::new(
            state.services.promotions.clone(),
            config.promotion_sweep_schedule.clone(),
        )))
        .await?;
    scheduler
        .register_job(Box::new(RateLimitPruneJob::new(
            state.rate_limiter.clone(),
            RATE_LIMIT_PRUNE_SCHEDULE.to_string(),
        )))
        .await?;
    scheduler.start().await?;

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
