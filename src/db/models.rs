//! Row shapes as stored in Postgres. Status columns are TEXT and are parsed into
//! the domain enums on the way out.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    BankAccount, Handover, Inspection, Lead, Notification, Promotion, Property, Transaction,
    UnknownVariant, Wallet,
};
use crate::ports::RepositoryError;

impl From<UnknownVariant> for RepositoryError {
    fn from(err: UnknownVariant) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

#[derive(Debug, FromRow)]
pub struct WalletRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub available_balance: BigDecimal,
    pub locked_balance: BigDecimal,
    pub is_setup: bool,
    pub is_active: bool,
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(r: WalletRow) -> Self {
        Wallet {
            id: r.id,
            user_id: r.user_id,
            available_balance: r.available_balance,
            locked_balance: r.locked_balance,
            is_setup: r.is_setup,
            is_active: r.is_active,
            pin_hash: r.pin_hash,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct BankAccountRow {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub is_primary: bool,
    pub recipient_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<BankAccountRow> for BankAccount {
    fn from(r: BankAccountRow) -> Self {
        BankAccount {
            id: r.id,
            wallet_id: r.wallet_id,
            bank_code: r.bank_code,
            bank_name: r.bank_name,
            account_number: r.account_number,
            account_name: r.account_name,
            is_primary: r.is_primary,
            recipient_code: r.recipient_code,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub kind: String,
    pub status: String,
    pub amount: BigDecimal,
    pub fee: BigDecimal,
    pub net_amount: BigDecimal,
    pub reference: String,
    pub gateway_reference: Option<String>,
    pub bank_account_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = RepositoryError;

    fn try_from(r: TransactionRow) -> Result<Self, Self::Error> {
        Ok(Transaction {
            id: r.id,
            user_id: r.user_id,
            wallet_id: r.wallet_id,
            kind: r.kind.parse()?,
            status: r.status.parse()?,
            amount: r.amount,
            fee: r.fee,
            net_amount: r.net_amount,
            reference: r.reference,
            gateway_reference: r.gateway_reference,
            bank_account_id: r.bank_account_id,
            property_id: r.property_id,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PropertyRow {
    pub id: Uuid,
    pub developer_id: Uuid,
    pub title: String,
    pub location: String,
    pub price: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PropertyRow> for Property {
    type Error = RepositoryError;

    fn try_from(r: PropertyRow) -> Result<Self, Self::Error> {
        Ok(Property {
            id: r.id,
            developer_id: r.developer_id,
            title: r.title,
            location: r.location,
            price: r.price,
            status: r.status.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct InspectionRow {
    pub id: Uuid,
    pub property_id: Uuid,
    pub buyer_id: Uuid,
    pub developer_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub slot_time: DateTime<Utc>,
    pub status: String,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<InspectionRow> for Inspection {
    type Error = RepositoryError;

    fn try_from(r: InspectionRow) -> Result<Self, Self::Error> {
        Ok(Inspection {
            id: r.id,
            property_id: r.property_id,
            buyer_id: r.buyer_id,
            developer_id: r.developer_id,
            lead_id: r.lead_id,
            slot_time: r.slot_time,
            status: r.status.parse()?,
            notes: r.notes,
            cancellation_reason: r.cancellation_reason,
            cancelled_by: r.cancelled_by.map(|s| s.parse()).transpose()?,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct PromotionRow {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub property_id: Uuid,
    pub code: String,
    pub status: String,
    pub clicks: i64,
    pub leads: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PromotionRow> for Promotion {
    type Error = RepositoryError;

    fn try_from(r: PromotionRow) -> Result<Self, Self::Error> {
        Ok(Promotion {
            id: r.id,
            creator_id: r.creator_id,
            property_id: r.property_id,
            code: r.code,
            status: r.status.parse()?,
            clicks: r.clicks,
            leads: r.leads,
            expires_at: r.expires_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct HandoverRow {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub property_id: Uuid,
    pub buyer_id: Uuid,
    pub developer_id: Uuid,
    pub status: String,
    pub documents: Vec<String>,
    pub buyer_signed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<HandoverRow> for Handover {
    type Error = RepositoryError;

    fn try_from(r: HandoverRow) -> Result<Self, Self::Error> {
        Ok(Handover {
            id: r.id,
            transaction_id: r.transaction_id,
            property_id: r.property_id,
            buyer_id: r.buyer_id,
            developer_id: r.developer_id,
            status: r.status.parse()?,
            documents: r.documents,
            buyer_signed_at: r.buyer_signed_at,
            completed_at: r.completed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub property_id: Uuid,
    pub developer_id: Uuid,
    pub buyer_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub promotion_code: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = RepositoryError;

    fn try_from(r: LeadRow) -> Result<Self, Self::Error> {
        Ok(Lead {
            id: r.id,
            property_id: r.property_id,
            developer_id: r.developer_id,
            buyer_id: r.buyer_id,
            name: r.name,
            email: r.email,
            phone: r.phone,
            message: r.message,
            promotion_code: r.promotion_code,
            status: r.status.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(r: NotificationRow) -> Self {
        Notification {
            id: r.id,
            user_id: r.user_id,
            kind: r.kind,
            title: r.title,
            body: r.body,
            read_at: r.read_at,
            created_at: r.created_at,
        }
    }
}

/// Converts a batch of rows, failing on the first unparseable one.
pub fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, RepositoryError>
where
    T: TryFrom<R, Error = RepositoryError>,
{
    rows.into_iter().map(T::try_from).collect()
}
