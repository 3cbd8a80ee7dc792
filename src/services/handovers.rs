//! Post-sale handover: developer uploads documents, buyer signs, completion
//! releases the escrowed purchase money to the developer's wallet.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::{Clock, Notifier};
use crate::domain::handover::HandoverRuleError;
use crate::domain::{Handover, Role, Transaction, TransactionKind, TransactionStatus, Wallet};
use crate::error::AppError;
use crate::ports::Store;

#[derive(Clone)]
pub struct HandoverService {
    store: Arc<dyn Store>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl HandoverService {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    pub async fn get(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Handover, AppError> {
        self.store
            .find_handover(id)
            .await?
            .filter(|h| match role {
                Role::Admin => true,
                Role::Buyer => h.buyer_id == user_id,
                Role::Developer => h.developer_id == user_id,
                Role::Creator => false,
            })
            .ok_or_else(|| AppError::NotFound(format!("Handover {} not found", id)))
    }

    /// Loads a handover the caller is party to and checks the caller's role may
    /// run the step.
    async fn authorize(&self, id: Uuid, user_id: Uuid, role: Role, allowed: &[Role]) -> Result<Handover, AppError> {
        let current = self.get(id, user_id, role).await?;
        if !allowed.contains(&role) {
            return Err(AppError::Forbidden(format!("{} cannot perform this handover step", role)));
        }
        Ok(current)
    }

    /// Loads the handover, applies `change` and saves it guarded on the prior status.
    async fn update<F>(&self, id: Uuid, user_id: Uuid, role: Role, allowed: &[Role], change: F) -> Result<Handover, AppError>
    where
        F: FnOnce(&mut Handover, DateTime<Utc>) -> Result<(), HandoverRuleError>,
    {
        let current = self.authorize(id, user_id, role, allowed).await?;
        let mut next = current.clone();
        change(&mut next, self.clock.now())?;
        let saved = self
            .store
            .update_handover(&next, current.status)
            .await?
            .ok_or_else(|| AppError::Conflict("Handover was changed concurrently".to_string()))?;
        tracing::info!(handover_id = %saved.id, from = %current.status, to = %saved.status, "Handover updated");
        Ok(saved)
    }

    pub async fn upload_documents(
        &self,
        id: Uuid,
        user_id: Uuid,
        role: Role,
        documents: Vec<String>,
    ) -> Result<Handover, AppError> {
        let handover = self
            .update(id, user_id, role, &[Role::Developer, Role::Admin], |h, now| {
                h.upload_documents(documents, now)
            })
            .await?;
        self.notifier
            .notify(
                handover.buyer_id,
                "handover_documents",
                "Handover documents ready",
                "The developer has uploaded your property documents for review and signing.",
            )
            .await;
        Ok(handover)
    }

    pub async fn sign(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Handover, AppError> {
        let handover = self
            .update(id, user_id, role, &[Role::Buyer, Role::Admin], |h, now| h.sign(now))
            .await?;
        self.notifier
            .notify(
                handover.developer_id,
                "handover_signed",
                "Handover signed",
                "The buyer has signed the handover documents.",
            )
            .await;
        Ok(handover)
    }

    /// Completes the handover and releases escrow to the developer. The status
    /// change, the release record and the wallet credit are stored together.
    pub async fn complete(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Handover, AppError> {
        let current = self
            .authorize(id, user_id, role, &[Role::Developer, Role::Admin])
            .await?;
        let mut next = current.clone();
        next.complete(self.clock.now())?;

        let release = self.escrow_release(&next).await?;
        let handover = self
            .store
            .complete_handover(&next, current.status, &release)
            .await?
            .ok_or_else(|| AppError::Conflict("Handover was changed concurrently".to_string()))?;
        tracing::info!(
            handover_id = %handover.id,
            reference = %release.reference,
            amount = %release.amount,
            "Escrow released"
        );

        for user in [handover.buyer_id, handover.developer_id] {
            self.notifier
                .notify(user, "handover_completed", "Handover completed", "The property handover is complete.")
                .await;
        }
        Ok(handover)
    }

    pub async fn cancel(&self, id: Uuid, user_id: Uuid, role: Role) -> Result<Handover, AppError> {
        self.update(id, user_id, role, &[Role::Admin], |h, now| h.cancel(now))
            .await
    }

    /// Builds the settled escrow_release crediting the developer with the
    /// purchase's net amount.
    async fn escrow_release(&self, handover: &Handover) -> Result<Transaction, AppError> {
        let purchase = self
            .store
            .find_transaction(handover.transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Purchase {} not found", handover.transaction_id)))?;

        let wallet = match self.store.find_wallet_by_user(handover.developer_id).await? {
            Some(wallet) => wallet,
            None => self.store.insert_wallet(&Wallet::new(handover.developer_id)).await?,
        };

        let mut release = Transaction::new(
            handover.developer_id,
            TransactionKind::EscrowRelease,
            purchase.net_amount.clone(),
            BigDecimal::from(0),
        )
        .with_wallet(wallet.id)
        .with_property(handover.property_id)
        .with_metadata(json!({
            "handover_id": handover.id,
            "purchase_reference": purchase.reference,
        }));
        release.status = TransactionStatus::Completed;
        Ok(release)
    }
}
