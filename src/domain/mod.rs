//! Domain entities and their status machines.
//! Framework-agnostic: nothing in here touches HTTP or SQL.

pub mod handover;
pub mod inspection;
pub mod lead;
pub mod money;
pub mod notification;
pub mod promotion;
pub mod property;
pub mod transaction;
pub mod wallet;

pub use handover::{Handover, HandoverStatus};
pub use inspection::{Inspection, InspectionStatus};
pub use lead::{Lead, LeadStatus};
pub use notification::Notification;
pub use promotion::{Promotion, PromotionStatus};
pub use property::{Property, PropertyStatus};
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
pub use wallet::{BankAccount, Wallet, WalletDelta};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or submitted status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Role of the authenticated caller, as asserted by the upstream auth proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Buyer,
    Developer,
    Creator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Buyer => "buyer",
            Role::Developer => "developer",
            Role::Creator => "creator",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buyer" => Ok(Role::Buyer),
            "developer" => Ok(Role::Developer),
            "creator" => Ok(Role::Creator),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownVariant::new("role", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
