use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::UnknownVariant;

const CODE_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    Active,
    Paused,
    Stopped,
    Expired,
}

impl PromotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Expired)
    }
}

impl FromStr for PromotionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "expired" => Ok(Self::Expired),
            _ => Err(UnknownVariant::new("promotion status", s)),
        }
    }
}

impl fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A creator-attributed tracking link for one property.
#[derive(Debug, Clone, Serialize)]
pub struct Promotion {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub property_id: Uuid,
    pub code: String,
    pub status: PromotionStatus,
    pub clicks: i64,
    pub leads: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    pub fn new(
        creator_id: Uuid,
        property_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id,
            property_id,
            code: new_code(),
            status: PromotionStatus::Active,
            clicks: 0,
            leads: 0,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }

    /// Status as observed at `now`: an active link past its expiry reads as expired
    /// even before the sweep has persisted it.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PromotionStatus {
        if self.status == PromotionStatus::Active && self.is_past_expiry(now) {
            PromotionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == PromotionStatus::Active
    }

    /// Copy with the lazily-derived status applied, for responses.
    pub fn observed(mut self, now: DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }
}

/// Resolves where a requested status change leads, or `None` if it is not allowed.
///
/// Resuming a paused link that has passed its expiry lands on `Expired`.
pub fn next_status(
    promotion: &Promotion,
    requested: PromotionStatus,
    now: DateTime<Utc>,
) -> Option<PromotionStatus> {
    use PromotionStatus::*;
    match (promotion.effective_status(now), requested) {
        (Active, Paused) => Some(Paused),
        (Paused, Active) if promotion.is_past_expiry(now) => Some(Expired),
        (Paused, Active) => Some(Active),
        (Active | Paused, Stopped) => Some(Stopped),
        _ => None,
    }
}

fn new_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
