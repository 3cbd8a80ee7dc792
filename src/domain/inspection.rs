use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Role, UnknownVariant};

/// Two active bookings on one property must be at least this far apart.
pub const SLOT_WINDOW_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Booked,
    Confirmed,
    Completed,
    Cancelled,
    Withdrawn,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booked => "booked",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Withdrawn => "withdrawn",
        }
    }

    /// Booked and confirmed inspections still occupy their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Booked | Self::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl FromStr for InspectionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(Self::Booked),
            "confirmed" => Ok(Self::Confirmed),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "withdrawn" => Ok(Self::Withdrawn),
            _ => Err(UnknownVariant::new("inspection status", s)),
        }
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an inspection transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectionRuleError {
    #[error("inspection cannot move from {from} to {to}")]
    InvalidTransition {
        from: InspectionStatus,
        to: InspectionStatus,
    },
    #[error("inspection cannot be completed before its scheduled time")]
    NotYetDue,
    #[error("inspection slot must be in the future")]
    SlotInPast,
    #[error("{0} is not allowed to change this inspection")]
    NotPermitted(Role),
}

#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub id: Uuid,
    pub property_id: Uuid,
    pub buyer_id: Uuid,
    pub developer_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub slot_time: DateTime<Utc>,
    pub status: InspectionStatus,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Role>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inspection {
    pub fn book(
        property_id: Uuid,
        buyer_id: Uuid,
        developer_id: Uuid,
        slot_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, InspectionRuleError> {
        if slot_time <= now {
            return Err(InspectionRuleError::SlotInPast);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            property_id,
            buyer_id,
            developer_id,
            lead_id: None,
            slot_time,
            status: InspectionStatus::Booked,
            notes: None,
            cancellation_reason: None,
            cancelled_by: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether `role`/`user` is a party allowed to act on this inspection at all.
    pub fn is_party(&self, user: Uuid, role: Role) -> bool {
        match role {
            Role::Admin => true,
            Role::Buyer => self.buyer_id == user,
            Role::Developer => self.developer_id == user,
            Role::Creator => false,
        }
    }

    fn transition(
        &mut self,
        to: InspectionStatus,
        allowed_from: &[InspectionStatus],
        now: DateTime<Utc>,
    ) -> Result<(), InspectionRuleError> {
        if !allowed_from.contains(&self.status) {
            return Err(InspectionRuleError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn confirm(&mut self, by: Role, now: DateTime<Utc>) -> Result<(), InspectionRuleError> {
        if !matches!(by, Role::Developer | Role::Admin) {
            return Err(InspectionRuleError::NotPermitted(by));
        }
        self.transition(InspectionStatus::Confirmed, &[InspectionStatus::Booked], now)
    }

    pub fn complete(&mut self, by: Role, now: DateTime<Utc>) -> Result<(), InspectionRuleError> {
        if !matches!(by, Role::Developer | Role::Admin) {
            return Err(InspectionRuleError::NotPermitted(by));
        }
        if now < self.slot_time {
            return Err(InspectionRuleError::NotYetDue);
        }
        self.transition(InspectionStatus::Completed, &[InspectionStatus::Confirmed], now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(
        &mut self,
        by: Role,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InspectionRuleError> {
        if by == Role::Creator {
            return Err(InspectionRuleError::NotPermitted(by));
        }
        self.transition(
            InspectionStatus::Cancelled,
            &[InspectionStatus::Booked, InspectionStatus::Confirmed],
            now,
        )?;
        self.cancellation_reason = reason;
        self.cancelled_by = Some(by);
        Ok(())
    }

    /// A buyer backs out after having inspected the property.
    pub fn withdraw(
        &mut self,
        by: Role,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), InspectionRuleError> {
        if !matches!(by, Role::Buyer | Role::Admin) {
            return Err(InspectionRuleError::NotPermitted(by));
        }
        self.transition(InspectionStatus::Withdrawn, &[InspectionStatus::Completed], now)?;
        self.notes = reason.or(self.notes.take());
        Ok(())
    }

    pub fn reschedule(
        &mut self,
        by: Role,
        slot_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), InspectionRuleError> {
        if by == Role::Creator {
            return Err(InspectionRuleError::NotPermitted(by));
        }
        if slot_time <= now {
            return Err(InspectionRuleError::SlotInPast);
        }
        self.transition(
            InspectionStatus::Booked,
            &[InspectionStatus::Booked, InspectionStatus::Confirmed],
            now,
        )?;
        self.slot_time = slot_time;
        Ok(())
    }
}

/// The open window `(slot - w, slot + w)` another active booking may not fall in;
/// bookings exactly `w` apart do not conflict.
pub fn conflict_window(slot_time: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let width = Duration::minutes(SLOT_WINDOW_MINUTES);
    (slot_time - width, slot_time + width)
}
