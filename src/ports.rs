//! Storage ports. Services depend on these traits; `db::PgStore` implements them
//! over Postgres.
//!
//! Every method that changes a status takes the statuses it may move *from*, and
//! returns `None` when the row was not in one of them. Balance changes that go
//! with a status change are applied in the same database transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    BankAccount, Handover, HandoverStatus, Inspection, InspectionStatus, Lead, LeadStatus,
    Notification, Promotion, PromotionStatus, Property, PropertyStatus, Transaction,
    TransactionKind, TransactionStatus, Wallet, WalletDelta,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Insufficient funds")]
    InsufficientFunds,
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// Side effects applied together with a transaction status change.
#[derive(Debug, Clone, Default)]
pub struct TransitionEffects {
    /// Merged into the stored metadata.
    pub metadata: Option<Value>,
    pub gateway_reference: Option<String>,
    /// Balance change on the given wallet.
    pub wallet: Option<(Uuid, WalletDelta)>,
}

/// Keyset position for paging newest-first listings.
pub type Cursor = (DateTime<Utc>, Uuid);

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn find_wallet_by_user(&self, user_id: Uuid) -> RepoResult<Option<Wallet>>;
    /// Inserts the wallet unless the user already has one; returns the stored wallet.
    async fn insert_wallet(&self, wallet: &Wallet) -> RepoResult<Wallet>;
    /// Stores the PIN hash and activates the wallet.
    async fn activate_wallet(&self, wallet_id: Uuid, pin_hash: &str) -> RepoResult<Wallet>;

    async fn list_bank_accounts(&self, wallet_id: Uuid) -> RepoResult<Vec<BankAccount>>;
    async fn find_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>>;
    /// Inserts unless the wallet already holds `limit` accounts (`Conflict`).
    /// The first account of a wallet becomes primary.
    async fn insert_bank_account(&self, account: &BankAccount, limit: usize) -> RepoResult<BankAccount>;
    async fn set_primary_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>>;
    /// Deletes the account. If it was primary, the oldest remaining account is
    /// promoted and returned.
    async fn delete_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>>;
    async fn set_recipient_code(&self, id: Uuid, recipient_code: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert_transaction(&self, tx: &Transaction) -> RepoResult<Transaction>;
    async fn find_transaction(&self, id: Uuid) -> RepoResult<Option<Transaction>>;
    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Transaction>>;
    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        after: Option<Cursor>,
        limit: i64,
    ) -> RepoResult<Vec<Transaction>>;
    async fn list_by_kind(
        &self,
        kind: TransactionKind,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Transaction>>;
    /// Holds `tx.amount` on the wallet and inserts the pending withdrawal.
    /// Fails with `InsufficientFunds` if the available balance is short.
    async fn create_withdrawal(&self, wallet_id: Uuid, tx: &Transaction) -> RepoResult<Transaction>;
    /// Moves the transaction to `to` if its status is in `from`, applying `effects`
    /// atomically with the status change.
    async fn transition_transaction(
        &self,
        id: Uuid,
        from: &[TransactionStatus],
        to: TransactionStatus,
        effects: TransitionEffects,
    ) -> RepoResult<Option<Transaction>>;
    async fn merge_transaction_metadata(&self, id: Uuid, patch: Value) -> RepoResult<Transaction>;
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn insert_property(&self, property: &Property) -> RepoResult<Property>;
    async fn find_property(&self, id: Uuid) -> RepoResult<Option<Property>>;
    async fn list_properties(
        &self,
        status: Option<PropertyStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Property>>;
    async fn update_property_status(
        &self,
        id: Uuid,
        from: &[PropertyStatus],
        to: PropertyStatus,
    ) -> RepoResult<Option<Property>>;
}

#[async_trait]
pub trait InspectionRepository: Send + Sync {
    async fn insert_inspection(&self, inspection: &Inspection) -> RepoResult<Inspection>;
    async fn find_inspection(&self, id: Uuid) -> RepoResult<Option<Inspection>>;
    async fn list_buyer_inspections(&self, buyer_id: Uuid) -> RepoResult<Vec<Inspection>>;
    async fn list_developer_inspections(&self, developer_id: Uuid) -> RepoResult<Vec<Inspection>>;
    /// Active (booked/confirmed) inspections on the property with a slot in `[start, end)`.
    async fn find_conflicting_inspections(
        &self,
        property_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> RepoResult<Vec<Inspection>>;
    /// Persists the mutable fields if the stored status still equals `expected`.
    async fn update_inspection(
        &self,
        inspection: &Inspection,
        expected: InspectionStatus,
    ) -> RepoResult<Option<Inspection>>;
}

#[async_trait]
pub trait PromotionRepository: Send + Sync {
    async fn insert_promotion(&self, promotion: &Promotion) -> RepoResult<Promotion>;
    async fn find_promotion(&self, id: Uuid) -> RepoResult<Option<Promotion>>;
    async fn find_promotion_by_code(&self, code: &str) -> RepoResult<Option<Promotion>>;
    async fn list_creator_promotions(&self, creator_id: Uuid) -> RepoResult<Vec<Promotion>>;
    async fn update_promotion_status(
        &self,
        id: Uuid,
        from: PromotionStatus,
        to: PromotionStatus,
    ) -> RepoResult<Option<Promotion>>;
    async fn increment_clicks(&self, id: Uuid) -> RepoResult<()>;
    async fn increment_leads(&self, id: Uuid) -> RepoResult<()>;
    /// Marks every active promotion with `expires_at <= now` as expired; returns how many.
    async fn expire_due_promotions(&self, now: DateTime<Utc>) -> RepoResult<u64>;
}

#[async_trait]
pub trait HandoverRepository: Send + Sync {
    async fn insert_handover(&self, handover: &Handover) -> RepoResult<Handover>;
    async fn find_handover(&self, id: Uuid) -> RepoResult<Option<Handover>>;
    async fn find_handover_by_transaction(&self, transaction_id: Uuid) -> RepoResult<Option<Handover>>;
    async fn update_handover(
        &self,
        handover: &Handover,
        expected: HandoverStatus,
    ) -> RepoResult<Option<Handover>>;
    /// Saves `handover` guarded on `expected`, inserts the settled `release` and
    /// credits its amount to `release.wallet_id`, all in one transaction.
    async fn complete_handover(
        &self,
        handover: &Handover,
        expected: HandoverStatus,
        release: &Transaction,
    ) -> RepoResult<Option<Handover>>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    async fn insert_lead(&self, lead: &Lead) -> RepoResult<Lead>;
    async fn list_developer_leads(&self, developer_id: Uuid) -> RepoResult<Vec<Lead>>;
    async fn update_lead_status(
        &self,
        id: Uuid,
        developer_id: Uuid,
        status: LeadStatus,
    ) -> RepoResult<Option<Lead>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> RepoResult<()>;
    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> RepoResult<Vec<Notification>>;
    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> RepoResult<Option<Notification>>;
    async fn mark_all_notifications_read(&self, user_id: Uuid) -> RepoResult<u64>;
}

/// Everything the services need from persistence.
#[async_trait]
pub trait Store:
    WalletRepository
    + TransactionRepository
    + PropertyRepository
    + InspectionRepository
    + PromotionRepository
    + HandoverRepository
    + LeadRepository
    + NotificationRepository
{
    async fn ping(&self) -> RepoResult<()>;
}
