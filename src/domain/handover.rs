use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoverStatus {
    PendingDeveloperDocs,
    DocsUploaded,
    BuyerSigned,
    Completed,
    Cancelled,
}

impl HandoverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDeveloperDocs => "pending_developer_docs",
            Self::DocsUploaded => "docs_uploaded",
            Self::BuyerSigned => "buyer_signed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl FromStr for HandoverStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_developer_docs" => Ok(Self::PendingDeveloperDocs),
            "docs_uploaded" => Ok(Self::DocsUploaded),
            "buyer_signed" => Ok(Self::BuyerSigned),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(UnknownVariant::new("handover status", s)),
        }
    }
}

impl fmt::Display for HandoverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandoverRuleError {
    #[error("handover is {0}; expected {1}")]
    WrongStage(HandoverStatus, HandoverStatus),
    #[error("handover is already {0}")]
    Closed(HandoverStatus),
    #[error("at least one document reference is required")]
    NoDocuments,
}

/// Post-sale paperwork between buyer and developer, created when a purchase settles.
#[derive(Debug, Clone, Serialize)]
pub struct Handover {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub property_id: Uuid,
    pub buyer_id: Uuid,
    pub developer_id: Uuid,
    pub status: HandoverStatus,
    pub documents: Vec<String>,
    pub buyer_signed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Handover {
    pub fn new(transaction_id: Uuid, property_id: Uuid, buyer_id: Uuid, developer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            property_id,
            buyer_id,
            developer_id,
            status: HandoverStatus::PendingDeveloperDocs,
            documents: Vec::new(),
            buyer_signed_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn expect(&self, stage: HandoverStatus) -> Result<(), HandoverRuleError> {
        if self.status == stage {
            Ok(())
        } else if self.status.is_terminal() {
            Err(HandoverRuleError::Closed(self.status))
        } else {
            Err(HandoverRuleError::WrongStage(self.status, stage))
        }
    }

    /// Developer attaches document references. Allowed again until the buyer signs.
    pub fn upload_documents(
        &mut self,
        documents: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(), HandoverRuleError> {
        if documents.iter().all(|d| d.trim().is_empty()) {
            return Err(HandoverRuleError::NoDocuments);
        }
        if self.status != HandoverStatus::DocsUploaded {
            self.expect(HandoverStatus::PendingDeveloperDocs)?;
        }
        self.documents
            .extend(documents.into_iter().filter(|d| !d.trim().is_empty()));
        self.status = HandoverStatus::DocsUploaded;
        self.updated_at = now;
        Ok(())
    }

    pub fn sign(&mut self, now: DateTime<Utc>) -> Result<(), HandoverRuleError> {
        self.expect(HandoverStatus::DocsUploaded)?;
        self.status = HandoverStatus::BuyerSigned;
        self.buyer_signed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), HandoverRuleError> {
        self.expect(HandoverStatus::BuyerSigned)?;
        self.status = HandoverStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), HandoverRuleError> {
        if self.status.is_terminal() {
            return Err(HandoverRuleError::Closed(self.status));
        }
        self.status = HandoverStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}
