use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{Clock, Job};
use crate::domain::promotion::next_status;
use crate::domain::{Promotion, PromotionStatus, Role};
use crate::error::AppError;
use crate::ports::{RepositoryError, Store};

/// Attempts at drawing an unused tracking code before giving up.
const CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePromotion {
    pub property_id: Uuid,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PromotionService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PromotionService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create(&self, creator_id: Uuid, req: CreatePromotion) -> Result<Promotion, AppError> {
        let now = self.clock.now();
        if req.expires_at.map_or(false, |at| at <= now) {
            return Err(AppError::ValidationError("Expiry must be in the future".to_string()));
        }
        let property = self
            .store
            .find_property(req.property_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", req.property_id)))?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let promotion = Promotion::new(creator_id, property.id, req.expires_at, now);
            match self.store.insert_promotion(&promotion).await {
                Ok(promotion) => {
                    tracing::info!(promotion_id = %promotion.id, code = %promotion.code, "Promotion created");
                    return Ok(promotion);
                }
                Err(RepositoryError::Conflict(_)) if attempt < CODE_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// The promotion as currently observed: an active link past expiry reads as expired.
    pub async fn get(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Promotion, AppError> {
        let promotion = self.find_owned(id, user_id, role).await?;
        Ok(promotion.observed(self.clock.now()))
    }

    async fn find_owned(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Promotion, AppError> {
        self.store
            .find_promotion(id)
            .await?
            .filter(|p| role == Role::Admin || p.creator_id == user_id)
            .ok_or_else(|| AppError::NotFound(format!("Promotion {} not found", id)))
    }

    pub async fn list(&self, creator_id: Uuid) -> Result<Vec<Promotion>, AppError> {
        let now = self.clock.now();
        Ok(self
            .store
            .list_creator_promotions(creator_id)
            .await?
            .into_iter()
            .map(|p| p.observed(now))
            .collect())
    }

    pub async fn pause(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Promotion, AppError> {
        self.change_status(id, user_id, role, PromotionStatus::Paused).await
    }

    /// Resuming a paused link past its expiry expires it instead.
    pub async fn resume(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Promotion, AppError> {
        self.change_status(id, user_id, role, PromotionStatus::Active).await
    }

    pub async fn stop(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Promotion, AppError> {
        self.change_status(id, user_id, role, PromotionStatus::Stopped).await
    }

    async fn change_status(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: Role,
        requested: PromotionStatus,
    ) -> Result<Promotion, AppError> {
        let promotion = self.find_owned(id, user_id, role).await?;
        let now = self.clock.now();
        let observed = promotion.effective_status(now);
        let to = next_status(&promotion, requested, now).ok_or_else(|| {
            AppError::Conflict(format!("Promotion is {} and cannot become {}", observed, requested))
        })?;

        let updated = self
            .store
            .update_promotion_status(promotion.id, promotion.status, to)
            .await?
            .ok_or_else(|| AppError::Conflict("Promotion was changed concurrently".to_string()))?;
        tracing::info!(promotion_id = %updated.id, from = %promotion.status, to = %updated.status, "Promotion status changed");
        Ok(updated)
    }

    /// Counts a click on a live tracking link and returns the promoted property.
    pub async fn record_click(&self, code: &str) -> Result<Uuid, AppError> {
        let promotion = self
            .store
            .find_promotion_by_code(code)
            .await?
            .filter(|p| p.is_live(self.clock.now()))
            .ok_or_else(|| AppError::NotFound("Tracking link not found".to_string()))?;
        self.store.increment_clicks(promotion.id).await?;
        Ok(promotion.property_id)
    }

    /// Persists expiry for every active promotion past its `expires_at`.
    /// Running it again right away expires nothing.
    pub async fn expire_due(&self) -> Result<u64, AppError> {
        let expired = self.store.expire_due_promotions(self.clock.now()).await?;
        if expired > 0 {
            tracing::info!(expired, "Expired promotions");
        }
        Ok(expired)
    }
}

/// Scheduled sweep that persists promotion expiry.
pub struct PromotionExpiryJob {
    service: PromotionService,
    schedule: String,
}

impl PromotionExpiryJob {
    pub fn new(service: PromotionService, schedule: String) -> Self {
        Self { service, schedule }
    }
}

#[async_trait]
impl Job for PromotionExpiryJob {
    fn name(&self) -> &str {
        "promotion_expiry"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn execute(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.service.expire_due().await?;
        Ok(())
    }
}
