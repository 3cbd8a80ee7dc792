use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::wallet::{CheckoutSession, WalletService};
use super::Notifier;
use crate::domain::money;
use crate::domain::{
    Handover, PropertyStatus, Role, Transaction, TransactionKind, TransactionStatus, WalletDelta,
};
use crate::error::AppError;
use crate::paystack::{ChargeOutcome, InitializeRequest, PaymentGateway, Verification};
use crate::ports::{RepositoryError, Store, TransitionEffects};
use crate::utils::cursor;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Statuses a charge may still be settled from.
const OPEN: &[TransactionStatus] = &[TransactionStatus::Pending, TransactionStatus::Processing];

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    wallet: WalletService,
}

impl TransactionService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        wallet: WalletService,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            wallet,
        }
    }

    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        after: Option<&str>,
        limit: Option<i64>,
    ) -> Result<TransactionPage, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let after = after
            .map(cursor::decode)
            .transpose()
            .map_err(|e| AppError::BadRequest(format!("Invalid cursor: {}", e)))?;

        let mut items = self
            .store
            .list_user_transactions(user_id, after, limit + 1)
            .await?;
        let next_cursor = if items.len() as i64 > limit {
            items.truncate(limit as usize);
            items.last().map(|tx| cursor::encode(tx.created_at, tx.id))
        } else {
            None
        };
        Ok(TransactionPage { items, next_cursor })
    }

    /// Verification on behalf of a caller: only the owner or an admin may trigger it.
    pub async fn verify_as(&self, user_id: Uuid, role: Role, reference: &str) -> Result<Transaction, AppError> {
        let tx = self.find(reference).await?;
        if tx.user_id != user_id && role != Role::Admin {
            return Err(AppError::NotFound(format!("Transaction {} not found", reference)));
        }
        self.verify(reference).await
    }

    async fn find(&self, reference: &str) -> Result<Transaction, AppError> {
        self.store
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", reference)))
    }

    /// Reconciles a charge with the gateway.
    ///
    /// Only deposits and purchases are gateway charges; payouts and escrow
    /// releases are returned as stored. A transaction already `successful` is
    /// not sent to the gateway again, though a purchase whose completion did not
    /// finish is completed now. Otherwise the gateway's status decides: `success`
    /// settles, `failed`/`abandoned`/`reversed` fails, anything else only records
    /// metadata.
    pub async fn verify(&self, reference: &str) -> Result<Transaction, AppError> {
        let tx = self.find(reference).await?;
        if !tx.kind.is_gateway_charge() {
            tracing::info!(reference, kind = tx.kind.as_str(), "Not a gateway charge; nothing to verify");
            return Ok(tx);
        }
        if tx.status == TransactionStatus::Successful {
            if tx.kind == TransactionKind::PropertyPurchase
                && self.store.find_handover_by_transaction(tx.id).await?.is_none()
            {
                tracing::warn!(reference, "Purchase settled without a handover; completing it");
                self.complete_purchase(&tx).await?;
            }
            return Ok(tx);
        }

        let verification = self.gateway.verify(reference).await?;
        let patch = json!({
            "gateway_status": verification.status,
            "channel": verification.channel,
            "paid_at": verification.paid_at,
            "gateway_response": verification.gateway_response,
        });

        let settled = match ChargeOutcome::from_gateway_status(&verification.status) {
            ChargeOutcome::Succeeded if !amount_matches(&tx, &verification) => {
                tracing::warn!(
                    reference,
                    expected_kobo = ?money::to_kobo(&tx.amount),
                    paid_kobo = verification.amount,
                    "Charge amount mismatch"
                );
                let mut patch = patch;
                patch["failure_reason"] = json!("amount_mismatch");
                self.fail(&tx, patch).await?
            }
            ChargeOutcome::Succeeded => self.succeed(&tx, patch).await?,
            ChargeOutcome::Failed => self.fail(&tx, patch).await?,
            ChargeOutcome::Undecided => {
                tracing::info!(reference, status = %verification.status, "Charge not settled yet");
                return Ok(self.store.merge_transaction_metadata(tx.id, patch).await?);
            }
        };

        match settled {
            Some(tx) => Ok(tx),
            // Settled concurrently, or already terminal: report what is stored.
            None => self.find(reference).await,
        }
    }

    async fn succeed(&self, tx: &Transaction, patch: serde_json::Value) -> Result<Option<Transaction>, AppError> {
        let wallet = match (tx.kind, tx.wallet_id) {
            (TransactionKind::Deposit, Some(wallet_id)) => {
                Some((wallet_id, WalletDelta::credit(tx.amount.clone())))
            }
            _ => None,
        };
        let effects = TransitionEffects {
            metadata: Some(patch),
            gateway_reference: None,
            wallet,
        };
        let updated = self
            .store
            .transition_transaction(tx.id, OPEN, TransactionStatus::Successful, effects)
            .await?;

        if let Some(updated) = &updated {
            tracing::info!(reference = %updated.reference, kind = updated.kind.as_str(), "Charge successful");
            match updated.kind {
                TransactionKind::Deposit => {
                    self.notifier
                        .notify(
                            updated.user_id,
                            "deposit_successful",
                            "Deposit received",
                            format!("{} has been added to your wallet.", updated.amount),
                        )
                        .await;
                }
                TransactionKind::PropertyPurchase => self.complete_purchase(updated).await?,
                _ => {}
            }
        }
        Ok(updated)
    }

    async fn fail(&self, tx: &Transaction, patch: serde_json::Value) -> Result<Option<Transaction>, AppError> {
        let effects = TransitionEffects {
            metadata: Some(patch),
            ..Default::default()
        };
        let updated = self
            .store
            .transition_transaction(tx.id, OPEN, TransactionStatus::Failed, effects)
            .await?;
        if let Some(updated) = &updated {
            tracing::info!(reference = %updated.reference, "Charge failed");
            if let (TransactionKind::PropertyPurchase, Some(property_id)) = (updated.kind, updated.property_id) {
                self.store
                    .update_property_status(property_id, &[PropertyStatus::Reserved], PropertyStatus::Available)
                    .await?;
            }
        }
        Ok(updated)
    }

    /// Marks the property sold, opens its handover and tells both parties.
    async fn complete_purchase(&self, tx: &Transaction) -> Result<(), AppError> {
        let property_id = tx
            .property_id
            .ok_or_else(|| AppError::InternalError(format!("Purchase {} has no property", tx.reference)))?;
        let property = self
            .store
            .find_property(property_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", property_id)))?;

        self.store
            .update_property_status(
                property.id,
                &[PropertyStatus::Available, PropertyStatus::Reserved],
                PropertyStatus::Sold,
            )
            .await?;

        let handover = Handover::new(tx.id, property.id, tx.user_id, property.developer_id);
        match self.store.insert_handover(&handover).await {
            Ok(handover) => {
                tracing::info!(handover_id = %handover.id, property_id = %property.id, "Handover opened");
            }
            Err(RepositoryError::Conflict(_)) => {
                tracing::info!(reference = %tx.reference, "Handover already exists");
            }
            Err(e) => return Err(e.into()),
        }

        self.notifier
            .notify(
                tx.user_id,
                "purchase_successful",
                "Purchase confirmed",
                format!("Your payment for {} was received.", property.title),
            )
            .await;
        self.notifier
            .notify(
                property.developer_id,
                "property_sold",
                "Property sold",
                format!("{} has been paid for. Please upload the handover documents.", property.title),
            )
            .await;
        Ok(())
    }

    /// Reserves an available property and opens a checkout for its price.
    pub async fn initiate_purchase(
        &self,
        buyer_id: Uuid,
        property_id: Uuid,
        email: &str,
    ) -> Result<CheckoutSession, AppError> {
        let property = self
            .store
            .find_property(property_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Property {} not found", property_id)))?;
        if property.developer_id == buyer_id {
            return Err(AppError::ValidationError("You cannot buy your own property".to_string()));
        }
        let amount = money::to_kobo(&property.price)
            .ok_or_else(|| AppError::ValidationError("Property price is out of range".to_string()))?;

        self.store
            .update_property_status(property.id, &[PropertyStatus::Available], PropertyStatus::Reserved)
            .await?
            .ok_or_else(|| AppError::Conflict("Property is not available".to_string()))?;

        let tx = Transaction::new(
            buyer_id,
            TransactionKind::PropertyPurchase,
            property.price.clone(),
            bigdecimal::BigDecimal::from(0),
        )
        .with_property(property.id)
        .with_metadata(json!({ "property_title": property.title }));
        let tx = self.store.insert_transaction(&tx).await?;

        let request = InitializeRequest {
            email: email.to_string(),
            amount,
            reference: tx.reference.clone(),
            callback_url: self.wallet.callback_url(),
            metadata: Some(json!({ "kind": tx.kind.as_str(), "property_id": property.id })),
        };
        match self.wallet.start_checkout(&tx, &request).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.store
                    .update_property_status(property.id, &[PropertyStatus::Reserved], PropertyStatus::Available)
                    .await?;
                Err(e)
            }
        }
    }
}

fn amount_matches(tx: &Transaction, verification: &Verification) -> bool {
    money::to_kobo(&tx.amount) == Some(verification.amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use crate::domain::HandoverStatus;
    use crate::ports::{HandoverRepository, PropertyRepository, WalletRepository};
    use crate::services::testing::{harness, harness_with, FakeGateway};
    use crate::services::GatewaySettings;

    #[tokio::test]
    async fn test_successful_transaction_is_not_reverified() {
        let h = harness();
        let user = Uuid::new_v4();
        let session = h
            .services
            .wallet
            .initialize_deposit(user, "ada@example.com", BigDecimal::from(1_000))
            .await
            .unwrap();

        let first = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(first.status, TransactionStatus::Successful);
        assert_eq!(h.gateway.verify_calls(), 1);

        let second = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(second.status, TransactionStatus::Successful);
        assert_eq!(h.gateway.verify_calls(), 1);

        // Credited exactly once.
        let wallet = h.store.find_wallet_by_user(user).await.unwrap().unwrap();
        assert_eq!(wallet.available_balance, BigDecimal::from(1_000));
    }

    #[tokio::test]
    async fn test_verification_merges_gateway_metadata() {
        let h = harness();
        let session = h
            .services
            .wallet
            .initialize_deposit(Uuid::new_v4(), "ada@example.com", BigDecimal::from(500))
            .await
            .unwrap();
        let tx = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(tx.metadata["channel"], "card");
        assert_eq!(tx.metadata["gateway_response"], "Approved");
    }

    #[tokio::test]
    async fn test_abandoned_charge_fails_without_credit() {
        let h = harness_with(FakeGateway::with_status("abandoned"), GatewaySettings::default());
        let user = Uuid::new_v4();
        let session = h
            .services
            .wallet
            .initialize_deposit(user, "ada@example.com", BigDecimal::from(1_000))
            .await
            .unwrap();
        let tx = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        let wallet = h.store.find_wallet_by_user(user).await.unwrap().unwrap();
        assert_eq!(wallet.available_balance, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_pending_gateway_status_leaves_transaction_pending() {
        let h = harness_with(FakeGateway::with_status("ongoing"), GatewaySettings::default());
        let session = h
            .services
            .wallet
            .initialize_deposit(Uuid::new_v4(), "ada@example.com", BigDecimal::from(1_000))
            .await
            .unwrap();
        let tx = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.metadata["gateway_status"], "ongoing");
    }

    #[tokio::test]
    async fn test_amount_mismatch_fails_the_charge() {
        let gateway = FakeGateway::with_status("success");
        *gateway.verify_amount.lock().unwrap() = Some(100);
        let h = harness_with(gateway, GatewaySettings::default());
        let user = Uuid::new_v4();
        let session = h
            .services
            .wallet
            .initialize_deposit(user, "ada@example.com", BigDecimal::from(1_000))
            .await
            .unwrap();
        let tx = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.metadata["failure_reason"], "amount_mismatch");
    }

    #[tokio::test]
    async fn test_purchase_completion_sells_property_and_opens_handover() {
        let h = harness();
        let developer = Uuid::new_v4();
        let buyer = Uuid::new_v4();
        let property = h.listed_property(developer, 25_000_000).await;

        let session = h
            .services
            .transactions
            .initiate_purchase(buyer, property.id, "buyer@example.com")
            .await
            .unwrap();
        let reserved = h.store.find_property(property.id).await.unwrap().unwrap();
        assert_eq!(reserved.status, PropertyStatus::Reserved);

        let tx = h.services.transactions.verify(&session.reference).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Successful);

        let sold = h.store.find_property(property.id).await.unwrap().unwrap();
        assert_eq!(sold.status, PropertyStatus::Sold);
        let handover = h.store.find_handover_by_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(handover.status, HandoverStatus::PendingDeveloperDocs);
        assert_eq!(handover.developer_id, developer);
        assert_eq!(h.services.notifications.list(developer, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_requires_available_property() {
        let h = harness();
        let property = h.listed_property(Uuid::new_v4(), 1_000_000).await;
        h.services
            .transactions
            .initiate_purchase(Uuid::new_v4(), property.id, "a@example.com")
            .await
            .unwrap();
        let second = h
            .services
            .transactions
            .initiate_purchase(Uuid::new_v4(), property.id, "b@example.com")
            .await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_failed_purchase_releases_reservation() {
        let h = harness_with(FakeGateway::with_status("failed"), GatewaySettings::default());
        let property = h.listed_property(Uuid::new_v4(), 1_000_000).await;
        let session = h
            .services
            .transactions
            .initiate_purchase(Uuid::new_v4(), property.id, "a@example.com")
            .await
            .unwrap();
        h.services.transactions.verify(&session.reference).await.unwrap();
        let property = h.store.find_property(property.id).await.unwrap().unwrap();
        assert_eq!(property.status, PropertyStatus::Available);
    }

    #[tokio::test]
    async fn test_verify_as_hides_other_users_transactions() {
        let h = harness();
        let session = h
            .services
            .wallet
            .initialize_deposit(Uuid::new_v4(), "ada@example.com", BigDecimal::from(1_000))
            .await
            .unwrap();
        let stranger = h
            .services
            .transactions
            .verify_as(Uuid::new_v4(), Role::Buyer, &session.reference)
            .await;
        assert!(matches!(stranger, Err(AppError::NotFound(_))));
        assert_eq!(h.gateway.verify_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_transactions_pages_with_cursor() {
        let h = harness();
        let user = Uuid::new_v4();
        for amount in [100, 200, 300] {
            h.services
                .wallet
                .initialize_deposit(user, "ada@example.com", BigDecimal::from(amount))
                .await
                .unwrap();
        }
        let first = h.services.transactions.list_transactions(user, None, Some(2)).await.unwrap();
        assert_eq!(first.items.len(), 2);
        let cursor = first.next_cursor.expect("more pages");

        let second = h
            .services
            .transactions
            .list_transactions(user, Some(&cursor), Some(2))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(second.next_cursor.is_none());
        assert!(first.items.iter().all(|a| second.items.iter().all(|b| a.id != b.id)));

        assert!(matches!(
            h.services.transactions.list_transactions(user, Some("%%"), None).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_payout_reference_is_not_verified_as_a_charge() {
        let h = harness_with(FakeGateway::with_status("failed"), GatewaySettings::default());
        let user = Uuid::new_v4();
        h.funded_wallet(user, 10_000).await;
        let account = h
            .services
            .wallet
            .add_bank_account(
                user,
                crate::services::wallet::NewBankAccount {
                    bank_code: "058".to_string(),
                    bank_name: "GTBank".to_string(),
                    account_number: "0123456789".to_string(),
                    account_name: "Ada Obi".to_string(),
                },
            )
            .await
            .unwrap();
        let payout = h
            .services
            .payouts
            .request_withdrawal(
                user,
                crate::services::payouts::WithdrawalRequest {
                    amount: BigDecimal::from(4_000),
                    bank_account_id: account.id,
                    pin: "1234".to_string(),
                },
            )
            .await
            .unwrap();

        let tx = h
            .services
            .transactions
            .verify_as(user, Role::Buyer, &payout.reference)
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(h.gateway.verify_calls(), 0);

        // Still pending, so the admin can reject it and refund the hold.
        let rejected = h.services.payouts.reject(payout.id, Uuid::new_v4(), None).await.unwrap();
        assert_eq!(rejected.status, TransactionStatus::Cancelled);
        let wallet = h.store.find_wallet_by_user(user).await.unwrap().unwrap();
        assert_eq!(wallet.available_balance, BigDecimal::from(9_990));
        assert_eq!(wallet.locked_balance, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_unfinished_purchase_completion_resumes_on_verify() {
        let h = harness();
        let (developer, buyer) = (Uuid::new_v4(), Uuid::new_v4());
        let property = h.listed_property(developer, 1_000_000).await;
        h.store
            .update_property_status(property.id, &[PropertyStatus::Available], PropertyStatus::Reserved)
            .await
            .unwrap();
        // Settled, but the process stopped before the property was sold.
        let mut purchase = Transaction::new(
            buyer,
            TransactionKind::PropertyPurchase,
            BigDecimal::from(1_000_000),
            BigDecimal::from(0),
        )
        .with_property(property.id);
        purchase.status = TransactionStatus::Successful;
        h.store.put_transaction(purchase.clone());

        let tx = h.services.transactions.verify(&purchase.reference).await.unwrap();
        assert_eq!(tx.status, TransactionStatus::Successful);
        assert_eq!(h.gateway.verify_calls(), 0);
        let sold = h.store.find_property(property.id).await.unwrap().unwrap();
        assert_eq!(sold.status, PropertyStatus::Sold);
        assert!(h.store.find_handover_by_transaction(purchase.id).await.unwrap().is_some());

        // Once the handover exists, verifying again changes nothing.
        h.services.transactions.verify(&purchase.reference).await.unwrap();
        assert_eq!(h.services.notifications.list(developer, true).await.unwrap().len(), 1);
    }
}
