pub mod handovers;
pub mod inspections;
pub mod leads;
pub mod notifications;
pub mod payouts;
pub mod promotions;
pub mod properties;
pub mod scheduler;
pub mod transactions;
pub mod wallet;

pub use handovers::HandoverService;
pub use inspections::InspectionService;
pub use leads::LeadService;
pub use notifications::Notifier;
pub use payouts::PayoutService;
pub use promotions::{PromotionExpiryJob, PromotionService};
pub use properties::PropertyService;
pub use scheduler::{Job, JobScheduler, JobStatus};
pub use transactions::TransactionService;
pub use wallet::WalletService;

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::paystack::PaymentGateway;
use crate::ports::Store;

/// Source of the current time, injectable so time-based rules can be tested.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {}

/// Gateway behaviour switches taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct GatewaySettings {
    pub callback_url: Option<String>,
    pub transfers_enabled: bool,
}

/// All domain services, wired over one store and one gateway.
#[derive(Clone)]
pub struct Services {
    pub wallet: WalletService,
    pub payouts: PayoutService,
    pub transactions: TransactionService,
    pub inspections: InspectionService,
    pub promotions: PromotionService,
    pub handovers: HandoverService,
    pub leads: LeadService,
    pub notifications: Notifier,
    pub properties: PropertyService,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        settings: GatewaySettings,
    ) -> Self {
        let notifier = Notifier::new(store.clone());
        let wallet = WalletService::new(store.clone(), gateway.clone(), settings.clone());
        Self {
            payouts: PayoutService::new(
                store.clone(),
                gateway.clone(),
                notifier.clone(),
                wallet.clone(),
                settings,
            ),
            transactions: TransactionService::new(
                store.clone(),
                gateway,
                notifier.clone(),
                wallet.clone(),
            ),
            wallet,
            inspections: InspectionService::new(store.clone(), notifier.clone(), clock.clone()),
            promotions: PromotionService::new(store.clone(), clock.clone()),
            handovers: HandoverService::new(store.clone(), notifier.clone(), clock.clone()),
            leads: LeadService::new(store.clone(), notifier.clone(), clock),
            properties: PropertyService::new(store),
            notifications: notifier,
        }
    }
}
