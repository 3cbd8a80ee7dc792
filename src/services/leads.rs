use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{Clock, Notifier};
use crate::domain::{Lead, LeadStatus};
use crate::error::AppError;
use crate::ports::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLead {
    pub property_id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    /// Tracking code of the promotion that referred this enquiry.
    #[serde(default)]
    pub promotion_code: Option<String>,
}

#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn Store>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl LeadService {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Records an enquiry. A code naming a live promotion of the same property
    /// is attributed and counted; any other code is dropped.
    pub async fn create_lead(&self, buyer_id: Option<Uuid>, req: CreateLead) -> Result<Lead, AppError> {
        let name = req.name.trim();
        let email = req.email.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AppError::ValidationError("A valid email is required".to_string()));
        }

        let property = self
            .store
            .find_property(req.property_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", req.property_id)))?;

        let mut lead = Lead::new(property.id, property.developer_id, name.to_string(), email.to_string());
        lead.buyer_id = buyer_id;
        lead.phone = req.phone;
        lead.message = req.message;

        if let Some(code) = req.promotion_code.as_deref() {
            let now = self.clock.now();
            let promotion = self
                .store
                .find_promotion_by_code(code)
                .await?
                .filter(|p| p.property_id == property.id && p.is_live(now));
            match promotion {
                Some(promotion) => {
                    self.store.increment_leads(promotion.id).await?;
                    lead.promotion_code = Some(promotion.code);
                }
                None => tracing::debug!(code, "Ignoring promotion code that is not live"),
            }
        }

        let lead = self.store.insert_lead(&lead).await?;
        tracing::info!(lead_id = %lead.id, property_id = %property.id, "Lead captured");

        self.notifier
            .notify(
                property.developer_id,
                "lead_created",
                "New lead",
                format!("{} is interested in {}.", lead.name, property.title),
            )
            .await;
        Ok(lead)
    }

    pub async fn list_developer_leads(&self, developer_id: Uuid) -> Result<Vec<Lead>, AppError> {
        Ok(self.store.list_developer_leads(developer_id).await?)
    }

    pub async fn update_lead_status(
        &self,
        id: Uuid,
        developer_id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead, AppError> {
        let lead = self
            .store
            .update_lead_status(id, developer_id, status)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        tracing::info!(lead_id = %lead.id, status = lead.status.as_str(), "Lead status updated");
        Ok(lead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Promotion;
    use crate::ports::PromotionRepository;
    use crate::services::testing::harness;

    fn enquiry(property_id: Uuid, code: Option<&str>) -> CreateLead {
        CreateLead {
            property_id,
            name: "Ada Obi".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
            message: Some("Is it still available?".to_string()),
            promotion_code: code.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_live_promotion_code_is_attributed() {
        let h = harness();
        let developer = Uuid::new_v4();
        let property = h.listed_property(developer, 8_000_000).await;
        let promo = Promotion::new(Uuid::new_v4(), property.id, None, h.clock.now());
        h.store.put_promotion(promo.clone());

        let lead = h
            .services
            .leads
            .create_lead(None, enquiry(property.id, Some(&promo.code)))
            .await
            .unwrap();
        assert_eq!(lead.promotion_code.as_deref(), Some(promo.code.as_str()));
        assert_eq!(lead.developer_id, developer);
        assert_eq!(h.store.find_promotion(promo.id).await.unwrap().unwrap().leads, 1);

        let notes = h.services.notifications.list(developer, true).await.unwrap();
        assert_eq!(notes.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_code_is_dropped() {
        let h = harness();
        let property = h.listed_property(Uuid::new_v4(), 8_000_000).await;
        let lead = h
            .services
            .leads
            .create_lead(Some(Uuid::new_v4()), enquiry(property.id, Some("NOPE1234")))
            .await
            .unwrap();
        assert!(lead.promotion_code.is_none());
    }

    #[tokio::test]
    async fn test_lead_validation_and_scoped_updates() {
        let h = harness();
        let developer = Uuid::new_v4();
        let property = h.listed_property(developer, 8_000_000).await;

        let mut bad = enquiry(property.id, None);
        bad.email = "not-an-email".to_string();
        assert!(matches!(
            h.services.leads.create_lead(None, bad).await,
            Err(AppError::ValidationError(_))
        ));

        let lead = h.services.leads.create_lead(None, enquiry(property.id, None)).await.unwrap();
        assert!(matches!(
            h.services.leads.update_lead_status(lead.id, Uuid::new_v4(), LeadStatus::Contacted).await,
            Err(AppError::NotFound(_))
        ));
        let updated = h
            .services
            .leads
            .update_lead_status(lead.id, developer, LeadStatus::Contacted)
            .await
            .unwrap();
        assert_eq!(updated.status, LeadStatus::Contacted);
        assert_eq!(h.services.leads.list_developer_leads(developer).await.unwrap().len(), 1);
    }
}
