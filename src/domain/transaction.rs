//! Transaction domain entity.
//! Covers deposits, property purchases, escrow releases and payouts (withdrawals).

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    PropertyPurchase,
    EscrowRelease,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::PropertyPurchase => "property_purchase",
            Self::EscrowRelease => "escrow_release",
        }
    }

    /// Kinds paid through a gateway checkout, and so settled by charge verification.
    pub fn is_gateway_charge(&self) -> bool {
        matches!(self, Self::Deposit | Self::PropertyPurchase)
    }

    /// Prefix used when minting references for this kind.
    fn reference_prefix(&self) -> &'static str {
        match self {
            Self::Deposit => "DEP",
            Self::Withdrawal => "WDR",
            Self::PropertyPurchase => "PUR",
            Self::EscrowRelease => "ESC",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "property_purchase" => Ok(Self::PropertyPurchase),
            "escrow_release" => Ok(Self::EscrowRelease),
            _ => Err(UnknownVariant::new("transaction kind", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
    Failed,
    Successful,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Successful => "successful",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Failed | Self::Successful
        )
    }

    /// Statuses a payout may move to from `self`.
    ///
    /// pending -> processing (approved) | cancelled (rejected);
    /// processing -> completed | failed (transfer outcome).
    pub fn payout_successors(&self) -> &'static [TransactionStatus] {
        match self {
            Self::Pending => &[Self::Processing, Self::Cancelled],
            Self::Processing => &[Self::Completed, Self::Failed],
            _ => &[],
        }
    }

    pub fn can_payout_transition_to(&self, next: TransactionStatus) -> bool {
        self.payout_successors().contains(&next)
    }
}

impl FromStr for TransactionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            "successful" => Ok(Self::Successful),
            _ => Err(UnknownVariant::new("transaction status", s)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain entity representing a money movement.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wallet_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
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

impl Transaction {
    pub fn new(user_id: Uuid, kind: TransactionKind, amount: BigDecimal, fee: BigDecimal) -> Self {
        let now = Utc::now();
        let net_amount = &amount - &fee;
        Self {
            id: Uuid::new_v4(),
            user_id,
            wallet_id: None,
            kind,
            status: TransactionStatus::Pending,
            amount,
            fee,
            net_amount,
            reference: new_reference(kind),
            gateway_reference: None,
            bank_account_id: None,
            property_id: None,
            metadata: Value::Object(Default::default()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_wallet(mut self, wallet_id: Uuid) -> Self {
        self.wallet_id = Some(wallet_id);
        self
    }

    pub fn with_bank_account(mut self, bank_account_id: Uuid) -> Self {
        self.bank_account_id = Some(bank_account_id);
        self
    }

    pub fn with_property(mut self, property_id: Uuid) -> Self {
        self.property_id = Some(property_id);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// References look like `DEP-<32 hex chars>` and are unique per transaction.
pub fn new_reference(kind: TransactionKind) -> String {
    format!("{}-{}", kind.reference_prefix(), Uuid::new_v4().simple())
}

/// Shallow-merges `patch` into `metadata`; keys in `patch` win.
pub fn merge_metadata(metadata: &mut Value, patch: Value) {
    match (metadata.as_object_mut(), patch) {
        (Some(target), Value::Object(source)) => {
            for (key, value) in source {
                target.insert(key, value);
            }
        }
        (_, patch) => *metadata = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transaction_new() {
        let user = Uuid::new_v4();
        let tx = Transaction::new(
            user,
            TransactionKind::Withdrawal,
            BigDecimal::from(1_000),
            BigDecimal::from(10),
        );

        assert_eq!(tx.user_id, user);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.net_amount, BigDecimal::from(990));
        assert!(tx.reference.starts_with("WDR-"));
        assert!(tx.created_at <= Utc::now());
    }

    #[test]
    fn test_references_are_unique() {
        let a = new_reference(TransactionKind::Deposit);
        let b = new_reference(TransactionKind::Deposit);
        assert_ne!(a, b);
        assert_eq!(a.len(), "DEP-".len() + 32);
    }

    #[test]
    fn test_payout_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_payout_transition_to(Processing));
        assert!(Pending.can_payout_transition_to(Cancelled));
        assert!(!Pending.can_payout_transition_to(Completed));
        assert!(Processing.can_payout_transition_to(Completed));
        assert!(Processing.can_payout_transition_to(Failed));
        assert!(!Processing.can_payout_transition_to(Cancelled));
        assert!(Cancelled.payout_successors().is_empty());
        assert!(Completed.payout_successors().is_empty());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TransactionStatus::Successful.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(!TransactionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("successful".parse::<TransactionStatus>().unwrap(), TransactionStatus::Successful);
        assert!("done".parse::<TransactionStatus>().is_err());
        assert_eq!("property_purchase".parse::<TransactionKind>().unwrap(), TransactionKind::PropertyPurchase);
    }

    #[test]
    fn test_merge_metadata() {
        let mut metadata = json!({"channel": "card", "note": "a"});
        merge_metadata(&mut metadata, json!({"note": "b", "paid_at": "2024-01-01"}));
        assert_eq!(metadata, json!({"channel": "card", "note": "b", "paid_at": "2024-01-01"}));
    }
}
