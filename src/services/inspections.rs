use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{Clock, Notifier};
use crate::domain::inspection::{conflict_window, InspectionRuleError};
use crate::domain::{Inspection, Role};
use crate::error::AppError;
use crate::ports::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct BookInspection {
    pub property_id: Uuid,
    pub slot_time: DateTime<Utc>,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A status change requested on an existing inspection.
#[derive(Debug, Clone)]
pub enum InspectionAction {
    Confirm,
    Complete,
    Cancel { reason: Option<String> },
    Withdraw { reason: Option<String> },
    Reschedule { slot_time: DateTime<Utc> },
}

impl InspectionAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Complete => "complete",
            Self::Cancel { .. } => "cancel",
            Self::Withdraw { .. } => "withdraw",
            Self::Reschedule { .. } => "reschedule",
        }
    }
}

#[derive(Clone)]
pub struct InspectionService {
    store: Arc<dyn Store>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl InspectionService {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    pub async fn book(&self, buyer_id: Uuid, req: BookInspection) -> Result<Inspection, AppError> {
        let property = self
            .store
            .find_property(req.property_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", req.property_id)))?;

        let now = self.clock.now();
        let mut inspection = Inspection::book(property.id, buyer_id, property.developer_id, req.slot_time, now)?;
        inspection.lead_id = req.lead_id;
        inspection.notes = req.notes;

        self.ensure_slot_free(&inspection, None).await?;
        let inspection = self.store.insert_inspection(&inspection).await?;
        tracing::info!(
            inspection_id = %inspection.id,
            property_id = %property.id,
            slot_time = %inspection.slot_time,
            "Inspection booked"
        );

        self.notifier
            .notify(
                property.developer_id,
                "inspection_booked",
                "New inspection booked",
                format!("An inspection of {} was booked for {}.", property.title, inspection.slot_time),
            )
            .await;
        Ok(inspection)
    }

    async fn ensure_slot_free(&self, inspection: &Inspection, exclude: Option<Uuid>) -> Result<(), AppError> {
        let (start, end) = conflict_window(inspection.slot_time);
        let clashes = self
            .store
            .find_conflicting_inspections(inspection.property_id, start, end, exclude)
            .await?;
        if clashes.is_empty() {
            Ok(())
        } else {
            Err(AppError::Conflict(
                "Another inspection is booked within an hour of this slot".to_string(),
            ))
        }
    }

    pub async fn get(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Inspection, AppError> {
        self.store
            .find_inspection(id)
            .await?
            .filter(|i| i.is_party(user_id, role))
            .ok_or_else(|| AppError::NotFound(format!("Inspection {} not found", id)))
    }

    /// Applies `action` for the caller and persists it, guarded on the status the
    /// inspection had when it was read.
    pub async fn act(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: Role,
        action: InspectionAction,
    ) -> Result<Inspection, AppError> {
        let current = self.get(id, user_id, role).await?;
        let now = self.clock.now();
        let mut next = current.clone();

        match &action {
            InspectionAction::Confirm => next.confirm(role, now)?,
            InspectionAction::Complete => next.complete(role, now)?,
            InspectionAction::Cancel { reason } => next.cancel(role, reason.clone(), now)?,
            InspectionAction::Withdraw { reason } => next.withdraw(role, reason.clone(), now)?,
            InspectionAction::Reschedule { slot_time } => {
                next.reschedule(role, *slot_time, now)?;
                self.ensure_slot_free(&next, Some(next.id)).await?;
            }
        }

        let saved = self
            .store
            .update_inspection(&next, current.status)
            .await?
            .ok_or_else(|| {
                AppError::from(InspectionRuleError::InvalidTransition {
                    from: current.status,
                    to: next.status,
                })
            })?;
        tracing::info!(
            inspection_id = %saved.id,
            action = action.name(),
            from = %current.status,
            to = %saved.status,
            "Inspection updated"
        );

        let counterpart = if role == Role::Buyer {
            saved.developer_id
        } else {
            saved.buyer_id
        };
        self.notifier
            .notify(
                counterpart,
                "inspection_updated",
                "Inspection updated",
                format!("Inspection on {} is now {}.", saved.slot_time, saved.status),
            )
            .await;
        Ok(saved)
    }

    pub async fn list_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<Inspection>, AppError> {
        Ok(self.store.list_buyer_inspections(buyer_id).await?)
    }

    pub async fn list_for_developer(&self, developer_id: Uuid) -> Result<Vec<Inspection>, AppError> {
        Ok(self.store.list_developer_inspections(developer_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InspectionStatus;
    use crate::services::testing::{harness, Harness};
    use chrono::Duration;

    async fn booked(h: &Harness, developer: Uuid, buyer: Uuid, in_hours: i64) -> Inspection {
        let property = h.listed_property(developer, 10_000_000).await;
        h.services
            .inspections
            .book(
                buyer,
                BookInspection {
                    property_id: property.id,
                    slot_time: h.clock.now() + Duration::hours(in_hours),
                    lead_id: None,
                    notes: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_cannot_complete_before_slot_time() {
        let h = harness();
        let (developer, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let inspection = booked(&h, developer, buyer, 2).await;
        let svc = &h.services.inspections;

        svc.act(inspection.id, developer, Role::Developer, InspectionAction::Confirm)
            .await
            .unwrap();
        let early = svc
            .act(inspection.id, developer, Role::Developer, InspectionAction::Complete)
            .await;
        assert!(matches!(early, Err(AppError::ValidationError(_))));
        assert_eq!(
            svc.get(inspection.id, developer, Role::Developer).await.unwrap().status,
            InspectionStatus::Confirmed
        );

        h.clock.advance(Duration::hours(2));
        let done = svc
            .act(inspection.id, developer, Role::Developer, InspectionAction::Complete)
            .await
            .unwrap();
        assert_eq!(done.status, InspectionStatus::Completed);
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_booking_conflicts_within_an_hour() {
        let h = harness();
        let developer = Uuid::new_v4();
        let first = booked(&h, developer, Uuid::new_v4(), 24).await;

        let clash = h
            .services
            .inspections
            .book(
                Uuid::new_v4(),
                BookInspection {
                    property_id: first.property_id,
                    slot_time: first.slot_time + Duration::minutes(30),
                    lead_id: None,
                    notes: None,
                },
            )
            .await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));

        let later = h
            .services
            .inspections
            .book(
                Uuid::new_v4(),
                BookInspection {
                    property_id: first.property_id,
                    slot_time: first.slot_time + Duration::minutes(90),
                    lead_id: None,
                    notes: None,
                },
            )
            .await;
        assert!(later.is_ok());
    }

    #[tokio::test]
    async fn test_window_is_symmetric_in_booking_order() {
        let h = harness();
        let developer = Uuid::new_v4();
        let book_at = |property_id: Uuid, slot_time: DateTime<Utc>| {
            let svc = h.services.inspections.clone();
            async move {
                svc.book(
                    Uuid::new_v4(),
                    BookInspection {
                        property_id,
                        slot_time,
                        lead_id: None,
                        notes: None,
                    },
                )
                .await
            }
        };
        let ten = h.clock.now() + Duration::days(1);
        let eleven = ten + Duration::minutes(60);

        // Exactly an hour apart is allowed whichever slot is booked first.
        let earlier_first = h.listed_property(developer, 10_000_000).await;
        assert!(book_at(earlier_first.id, ten).await.is_ok());
        assert!(book_at(earlier_first.id, eleven).await.is_ok());

        let later_first = h.listed_property(developer, 10_000_000).await;
        assert!(book_at(later_first.id, eleven).await.is_ok());
        assert!(book_at(later_first.id, ten).await.is_ok());

        // A minute closer clashes in both directions.
        let near = h.listed_property(developer, 10_000_000).await;
        assert!(book_at(near.id, eleven).await.is_ok());
        assert!(matches!(
            book_at(near.id, eleven - Duration::minutes(59)).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            book_at(near.id, eleven + Duration::minutes(59)).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_slot_frees_the_window() {
        let h = harness();
        let buyer = Uuid::new_v4();
        let first = booked(&h, Uuid::new_v4(), buyer, 24).await;
        h.services
            .inspections
            .act(first.id, buyer, Role::Buyer, InspectionAction::Cancel { reason: Some("Travel".into()) })
            .await
            .unwrap();

        let rebook = h
            .services
            .inspections
            .book(
                Uuid::new_v4(),
                BookInspection {
                    property_id: first.property_id,
                    slot_time: first.slot_time,
                    lead_id: None,
                    notes: None,
                },
            )
            .await;
        assert!(rebook.is_ok());
    }

    #[tokio::test]
    async fn test_buyer_cannot_confirm_and_strangers_see_nothing() {
        let h = harness();
        let (developer, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let inspection = booked(&h, developer, buyer, 5).await;
        let svc = &h.services.inspections;

        assert!(matches!(
            svc.act(inspection.id, buyer, Role::Buyer, InspectionAction::Confirm).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            svc.act(inspection.id, Uuid::new_v4(), Role::Developer, InspectionAction::Confirm).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_only_after_completion() {
        let h = harness();
        let (developer, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let inspection = booked(&h, developer, buyer, 1).await;
        let svc = &h.services.inspections;

        assert!(matches!(
            svc.act(inspection.id, buyer, Role::Buyer, InspectionAction::Withdraw { reason: None }).await,
            Err(AppError::Conflict(_))
        ));

        svc.act(inspection.id, developer, Role::Developer, InspectionAction::Confirm).await.unwrap();
        h.clock.advance(Duration::hours(1));
        svc.act(inspection.id, developer, Role::Developer, InspectionAction::Complete).await.unwrap();
        let withdrawn = svc
            .act(
                inspection.id,
                buyer,
                Role::Buyer,
                InspectionAction::Withdraw { reason: Some("Too far".into()) },
            )
            .await
            .unwrap();
        assert_eq!(withdrawn.status, InspectionStatus::Withdrawn);
    }

    #[tokio::test]
    async fn test_reschedule_returns_to_booked_and_ignores_itself() {
        let h = harness();
        let (developer, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let inspection = booked(&h, developer, buyer, 10).await;
        let svc = &h.services.inspections;
        svc.act(inspection.id, developer, Role::Developer, InspectionAction::Confirm).await.unwrap();

        let moved = svc
            .act(
                inspection.id,
                buyer,
                Role::Buyer,
                InspectionAction::Reschedule {
                    slot_time: inspection.slot_time + Duration::minutes(30),
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.status, InspectionStatus::Booked);
        assert_eq!(moved.slot_time, inspection.slot_time + Duration::minutes(30));
    }
}
