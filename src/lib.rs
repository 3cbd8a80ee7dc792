pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod paystack;
pub mod ports;
pub mod services;
pub mod utils;
pub mod validation;


use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::handlers::{
    admin, handovers, inspections, leads, notifications, promotions, properties, transactions,
    wallet, webhook,
};
use crate::health::HealthChecker;
use crate::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::middleware::request_logger::request_logger_middleware;
use crate::middleware::validate::{validate_lead, validate_withdrawal};
use crate::services::Services;

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub health: Arc<HealthChecker>,
    pub rate_limiter: RateLimiter,
    /// Paystack secret key; also the webhook HMAC key.
    pub webhook_secret: String,
    /// Public site that tracking links redirect into.
    pub site_url: String,
    pub cors_allowed_origins: Option<String>,
}

impl AppState {
    pub fn new(config: &Config, services: Services, health: HealthChecker) -> Self {
        Self {
            services,
            health: Arc::new(health),
            rate_limiter: RateLimiter::from_settings(
                config.rate_limit_redis_url.as_deref(),
                config.rate_limit_per_minute,
            )
            .trusting_forwarded_for(config.rate_limit_trust_proxy),
            webhook_secret: config.paystack_secret_key.clone(),
            site_url: config.site_url.clone(),
            cors_allowed_origins: config.cors_allowed_origins.clone(),
        }
    }
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(state.cors_allowed_origins.as_deref());

    let api = Router::new()
        .route("/properties", get(properties::list_properties))
        .route("/properties/:id", get(properties::get_property))
        .route("/developer/properties", post(properties::create_property))
        .route("/leads", post(leads::create_lead).layer(from_fn(validate_lead)))
        .route("/developer/leads", get(leads::list_developer_leads))
        .route("/developer/leads/:id", patch(leads::update_lead))
        .route("/t/:code", get(promotions::track_click))
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/setup", post(wallet::setup_wallet))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/withdraw", post(wallet::withdraw).layer(from_fn(validate_withdrawal)))
        .route(
            "/wallet/bank-accounts",
            get(wallet::list_bank_accounts).post(wallet::add_bank_account),
        )
        .route("/wallet/bank-accounts/:id", delete(wallet::delete_bank_account))
        .route(
            "/wallet/bank-accounts/:id/primary",
            post(wallet::set_primary_bank_account),
        )
        .route("/transactions", get(transactions::list_transactions))
        .route(
            "/transactions/:reference/verify",
            get(transactions::verify_transaction),
        )
        .route(
            "/buyer/properties/:id/purchase",
            post(transactions::purchase_property),
        )
        .route(
            "/buyer/inspections",
            post(inspections::book_inspection).get(inspections::list_buyer_inspections),
        )
        .route(
            "/developer/inspections",
            get(inspections::list_developer_inspections),
        )
        .route("/inspections/:id/confirm", post(inspections::confirm_inspection))
        .route("/inspections/:id/complete", post(inspections::complete_inspection))
        .route("/inspections/:id/cancel", post(inspections::cancel_inspection))
        .route("/inspections/:id/withdraw", post(inspections::withdraw_inspection))
        .route(
            "/inspections/:id/reschedule",
            post(inspections::reschedule_inspection),
        )
        .route(
            "/creator/promotions",
            post(promotions::create_promotion).get(promotions::list_promotions),
        )
        .route("/creator/promotions/:id", get(promotions::get_promotion))
        .route("/creator/promotions/:id/pause", post(promotions::pause_promotion))
        .route("/creator/promotions/:id/resume", post(promotions::resume_promotion))
        .route("/creator/promotions/:id/stop", post(promotions::stop_promotion))
        .route("/handovers/:id", get(handovers::get_handover))
        .route("/handovers/:id/documents", post(handovers::upload_documents))
        .route("/handovers/:id/sign", post(handovers::sign_handover))
        .route("/handovers/:id/complete", post(handovers::complete_handover))
        .route("/handovers/:id/cancel", post(handovers::cancel_handover))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/admin/payouts", get(admin::list_payouts))
        .route("/admin/payouts/:id/approve", post(admin::approve_payout))
        .route("/admin/payouts/:id/reject", post(admin::reject_payout))
        .route("/admin/promotions/expire", post(admin::expire_promotions))
        .layer(from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ));

    // Health probes and gateway callbacks are not rate limited.
    api.route("/health", get(handlers::health))
        .route("/webhooks/paystack", post(webhook::paystack_webhook))
        .layer(from_fn(request_logger_middleware))
        .layer(cors)
        .with_state(state)
}
