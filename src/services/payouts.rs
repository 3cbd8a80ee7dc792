//! Withdrawal (payout) lifecycle.
//!
//! pending -> processing -> completed | failed, and pending -> cancelled.
//! Requesting a payout moves the amount from available into locked. Rejection and
//! failed transfers give back `net_amount`: the transfer fee is kept.

use bigdecimal::BigDecimal;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::wallet::WalletService;
use super::{GatewaySettings, Notifier};
use crate::domain::money::{self, withdrawal_fee, MIN_WITHDRAWAL};
use crate::domain::{Transaction, TransactionKind, TransactionStatus, WalletDelta};
use crate::error::AppError;
use crate::paystack::{PaymentGateway, TransferRequest};
use crate::ports::{Store, TransitionEffects};

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: BigDecimal,
    pub bank_account_id: Uuid,
    pub pin: String,
}

/// How a gateway transfer ended, as reported by webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded,
    Failed,
    Reversed,
}

#[derive(Clone)]
pub struct PayoutService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Notifier,
    wallet: WalletService,
    settings: GatewaySettings,
}

impl PayoutService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        wallet: WalletService,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            wallet,
            settings,
        }
    }

    pub async fn request_withdrawal(&self, user_id: Uuid, req: WithdrawalRequest) -> Result<Transaction, AppError> {
        let wallet = self
            .store
            .find_wallet_by_user(user_id)
            .await?
            .filter(|w| w.is_setup && w.is_active)
            .ok_or_else(|| AppError::ValidationError("Wallet is not set up".to_string()))?;

        self.wallet.verify_pin(&wallet, &req.pin)?;

        if req.amount < BigDecimal::from(MIN_WITHDRAWAL) {
            return Err(AppError::ValidationError(format!(
                "Minimum withdrawal is {}",
                MIN_WITHDRAWAL
            )));
        }

        let account = self
            .store
            .find_bank_account(wallet.id, req.bank_account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bank account {} not found", req.bank_account_id)))?;

        let fee = withdrawal_fee(&req.amount);
        let tx = Transaction::new(user_id, TransactionKind::Withdrawal, req.amount, fee)
            .with_wallet(wallet.id)
            .with_bank_account(account.id)
            .with_metadata(json!({
                "bank_name": account.bank_name,
                "account_number": account.account_number,
            }));

        let tx = self.store.create_withdrawal(wallet.id, &tx).await?;
        tracing::info!(
            reference = %tx.reference,
            amount = %tx.amount,
            fee = %tx.fee,
            "Withdrawal requested"
        );
        Ok(tx)
    }

    pub async fn list_payouts(
        &self,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self
            .store
            .list_by_kind(TransactionKind::Withdrawal, status, limit, offset)
            .await?)
    }

    async fn find_payout(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .find_transaction(id)
            .await?
            .filter(|tx| tx.kind == TransactionKind::Withdrawal)
            .ok_or_else(|| AppError::NotFound(format!("Payout {} not found", id)))
    }

    /// pending -> processing, then hands the money to the gateway when possible.
    pub async fn approve(&self, id: Uuid, admin_id: Uuid) -> Result<Transaction, AppError> {
        let payout = self.find_payout(id).await?;
        let effects = TransitionEffects {
            metadata: Some(json!({ "approved_by": admin_id })),
            ..Default::default()
        };
        let mut payout = self
            .store
            .transition_transaction(
                payout.id,
                &[TransactionStatus::Pending],
                TransactionStatus::Processing,
                effects,
            )
            .await?
            .ok_or_else(|| invalid_state(&payout, TransactionStatus::Processing))?;
        tracing::info!(reference = %payout.reference, "Payout approved");

        if let Some(updated) = self.start_transfer(&payout).await? {
            payout = updated;
        }
        self.notifier
            .notify(
                payout.user_id,
                "payout_approved",
                "Withdrawal approved",
                format!("Your withdrawal {} is being processed.", payout.reference),
            )
            .await;
        Ok(payout)
    }

    /// Initiates the gateway transfer for an approved payout. A failed
    /// initiation leaves the payout in processing for manual follow-up.
    async fn start_transfer(&self, payout: &Transaction) -> Result<Option<Transaction>, AppError> {
        if !self.settings.transfers_enabled {
            return Ok(None);
        }
        let Some(wallet_id) = payout.wallet_id else {
            return Ok(None);
        };
        let Some(account_id) = payout.bank_account_id else {
            return Ok(None);
        };
        let recipient = self
            .store
            .find_bank_account(wallet_id, account_id)
            .await?
            .and_then(|a| a.recipient_code);
        let Some(recipient) = recipient else {
            tracing::warn!(reference = %payout.reference, "No transfer recipient; payout needs manual transfer");
            return Ok(None);
        };
        let Some(amount) = money::to_kobo(&payout.net_amount) else {
            return Ok(None);
        };

        let request = TransferRequest {
            source: "balance".to_string(),
            amount,
            recipient,
            reference: payout.reference.clone(),
            reason: Some("Wallet withdrawal".to_string()),
        };
        match self.gateway.initiate_transfer(&request).await {
            Ok(transfer) => {
                let updated = self
                    .store
                    .merge_transaction_metadata(payout.id, json!({ "transfer_code": transfer.transfer_code }))
                    .await?;
                tracing::info!(reference = %payout.reference, transfer_code = %transfer.transfer_code, "Transfer initiated");
                Ok(Some(updated))
            }
            Err(e) => {
                tracing::error!(reference = %payout.reference, error = %e, "Transfer initiation failed");
                let updated = self
                    .store
                    .merge_transaction_metadata(payout.id, json!({ "transfer_error": e.to_string() }))
                    .await?;
                Ok(Some(updated))
            }
        }
    }

    /// pending -> cancelled, refunding `net_amount` and releasing the hold in the
    /// same database transaction as the status change.
    pub async fn reject(&self, id: Uuid, admin_id: Uuid, reason: Option<String>) -> Result<Transaction, AppError> {
        let payout = self.find_payout(id).await?;
        let wallet_id = payout
            .wallet_id
            .ok_or_else(|| AppError::InternalError(format!("Payout {} has no wallet", payout.id)))?;
        let effects = TransitionEffects {
            metadata: Some(json!({ "rejected_by": admin_id, "rejection_reason": reason })),
            gateway_reference: None,
            wallet: Some((wallet_id, WalletDelta::refund_hold(&payout.amount, &payout.net_amount))),
        };
        let payout = self
            .store
            .transition_transaction(
                payout.id,
                &[TransactionStatus::Pending],
                TransactionStatus::Cancelled,
                effects,
            )
            .await?
            .ok_or_else(|| invalid_state(&payout, TransactionStatus::Cancelled))?;
        tracing::info!(reference = %payout.reference, refund = %payout.net_amount, "Payout rejected");

        self.notifier
            .notify(
                payout.user_id,
                "payout_rejected",
                "Withdrawal rejected",
                format!(
                    "Your withdrawal {} was rejected and {} returned to your wallet.",
                    payout.reference, payout.net_amount
                ),
            )
            .await;
        Ok(payout)
    }

    /// Settles a processing payout from a transfer webhook. Returns `None` when
    /// the reference is unknown or the payout already settled.
    pub async fn record_transfer_outcome(
        &self,
        reference: &str,
        outcome: TransferOutcome,
        transfer_code: Option<String>,
    ) -> Result<Option<Transaction>, AppError> {
        let Some(payout) = self
            .store
            .find_by_reference(reference)
            .await?
            .filter(|tx| tx.kind == TransactionKind::Withdrawal)
        else {
            tracing::warn!(reference, "Transfer webhook for unknown payout");
            return Ok(None);
        };
        let wallet_id = payout
            .wallet_id
            .ok_or_else(|| AppError::InternalError(format!("Payout {} has no wallet", payout.id)))?;

        let (to, delta) = match outcome {
            TransferOutcome::Succeeded => (
                TransactionStatus::Completed,
                WalletDelta::release_hold(&payout.amount),
            ),
            TransferOutcome::Failed | TransferOutcome::Reversed => (
                TransactionStatus::Failed,
                WalletDelta::refund_hold(&payout.amount, &payout.net_amount),
            ),
        };
        let effects = TransitionEffects {
            metadata: Some(json!({ "transfer_outcome": format!("{:?}", outcome).to_lowercase() })),
            gateway_reference: transfer_code,
            wallet: Some((wallet_id, delta)),
        };
        let settled = self
            .store
            .transition_transaction(payout.id, &[TransactionStatus::Processing], to, effects)
            .await?;

        match &settled {
            Some(tx) => {
                tracing::info!(reference = %tx.reference, status = %tx.status, "Payout settled");
                let (title, body) = if tx.status == TransactionStatus::Completed {
                    ("Withdrawal completed", format!("{} has been sent to your bank.", tx.net_amount))
                } else {
                    (
                        "Withdrawal failed",
                        format!("Your withdrawal {} failed and {} was returned.", tx.reference, tx.net_amount),
                    )
                };
                self.notifier.notify(tx.user_id, "payout_settled", title, body).await;
            }
            None => {
                tracing::info!(reference, status = %payout.status, "Transfer webhook ignored; payout not processing");
            }
        }
        Ok(settled)
    }
}

fn invalid_state(tx: &Transaction, to: TransactionStatus) -> AppError {
    AppError::Conflict(format!(
        "Payout {} cannot move from {} to {}",
        tx.reference, tx.status, to
    ))
}
