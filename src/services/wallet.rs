use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::GatewaySettings;
use crate::domain::money::{self, MIN_DEPOSIT};
use crate::domain::wallet::{is_valid_account_number, is_valid_pin, MAX_BANK_ACCOUNTS};
use crate::domain::{BankAccount, Transaction, TransactionKind, TransactionStatus, Wallet};
use crate::error::AppError;
use crate::paystack::{InitializeRequest, PaymentGateway, RecipientRequest};
use crate::ports::{Store, TransitionEffects};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBankAccount {
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

/// Where to send the payer to complete a gateway charge.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub reference: String,
    pub authorization_url: String,
    pub access_code: String,
}

#[derive(Clone)]
pub struct WalletService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: GatewaySettings,
}

impl WalletService {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, settings: GatewaySettings) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    pub(crate) fn callback_url(&self) -> Option<String> {
        self.settings.callback_url.clone()
    }

    /// Returns the user's wallet, creating an empty inactive one on first access.
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Wallet, AppError> {
        if let Some(wallet) = self.store.find_wallet_by_user(user_id).await? {
            return Ok(wallet);
        }
        let wallet = self.store.insert_wallet(&Wallet::new(user_id)).await?;
        tracing::info!(user_id = %user_id, wallet_id = %wallet.id, "Wallet created");
        Ok(wallet)
    }

    pub async fn setup_wallet(&self, user_id: Uuid, pin: &str) -> Result<Wallet, AppError> {
        if !is_valid_pin(pin) {
            return Err(AppError::ValidationError("PIN must be exactly 4 digits".to_string()));
        }
        let wallet = self.get_wallet(user_id).await?;
        if wallet.is_setup {
            return Err(AppError::ValidationError("Wallet is already set up".to_string()));
        }
        let pin_hash = hash_pin(pin)?;
        let wallet = self.store.activate_wallet(wallet.id, &pin_hash).await?;
        tracing::info!(wallet_id = %wallet.id, "Wallet activated");
        Ok(wallet)
    }

    pub fn verify_pin(&self, wallet: &Wallet, pin: &str) -> Result<(), AppError> {
        let matches = wallet
            .pin_hash
            .as_deref()
            .map_or(false, |hash| pin_matches(hash, pin));
        if matches {
            Ok(())
        } else {
            Err(AppError::ValidationError("Invalid PIN".to_string()))
        }
    }

    /// Opens a pending deposit and a gateway checkout for it. The wallet is
    /// credited once the charge verifies.
    pub async fn initialize_deposit(
        &self,
        user_id: Uuid,
        email: &str,
        amount: BigDecimal,
    ) -> Result<CheckoutSession, AppError> {
        if amount < BigDecimal::from(MIN_DEPOSIT) {
            return Err(AppError::ValidationError(format!(
                "Minimum deposit is {}",
                MIN_DEPOSIT
            )));
        }
        let kobo = money::to_kobo(&amount)
            .ok_or_else(|| AppError::ValidationError("Amount is out of range".to_string()))?;
        let wallet = self.get_wallet(user_id).await?;

        let tx = Transaction::new(user_id, TransactionKind::Deposit, amount, BigDecimal::from(0))
            .with_wallet(wallet.id);
        let tx = self.store.insert_transaction(&tx).await?;

        let request = InitializeRequest {
            email: email.to_string(),
            amount: kobo,
            reference: tx.reference.clone(),
            callback_url: self.settings.callback_url.clone(),
            metadata: Some(json!({ "kind": tx.kind.as_str(), "wallet_id": wallet.id })),
        };
        self.start_checkout(&tx, &request).await
    }

    /// Initializes the gateway charge for `tx`, failing the transaction if the
    /// gateway refuses.
    pub(crate) async fn start_checkout(
        &self,
        tx: &Transaction,
        request: &InitializeRequest,
    ) -> Result<CheckoutSession, AppError> {
        match self.gateway.initialize(request).await {
            Ok(auth) => {
                tracing::info!(reference = %tx.reference, kind = tx.kind.as_str(), "Checkout initialized");
                Ok(CheckoutSession {
                    reference: tx.reference.clone(),
                    authorization_url: auth.authorization_url,
                    access_code: auth.access_code,
                })
            }
            Err(e) => {
                let effects = TransitionEffects {
                    metadata: Some(json!({ "initialize_error": e.to_string() })),
                    ..Default::default()
                };
                self.store
                    .transition_transaction(
                        tx.id,
                        &[TransactionStatus::Pending],
                        TransactionStatus::Failed,
                        effects,
                    )
                    .await?;
                Err(e.into())
            }
        }
    }

    pub async fn add_bank_account(&self, user_id: Uuid, input: NewBankAccount) -> Result<BankAccount, AppError> {
        if !is_valid_account_number(&input.account_number) {
            return Err(AppError::ValidationError(
                "Account number must be 10 digits".to_string(),
            ));
        }
        if input.bank_code.trim().is_empty() || input.account_name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Bank code and account name are required".to_string(),
            ));
        }

        let wallet = self.get_wallet(user_id).await?;
        let existing = self.store.list_bank_accounts(wallet.id).await?;
        if existing.len() >= MAX_BANK_ACCOUNTS {
            return Err(AppError::ValidationError(format!(
                "A wallet can hold at most {} bank accounts",
                MAX_BANK_ACCOUNTS
            )));
        }
        if existing.iter().any(|a| a.account_number == input.account_number) {
            return Err(AppError::Conflict("Bank account already added".to_string()));
        }

        let account = BankAccount::new(
            wallet.id,
            input.bank_code,
            input.bank_name,
            input.account_number,
            input.account_name,
        );
        let mut account = self
            .store
            .insert_bank_account(&account, MAX_BANK_ACCOUNTS)
            .await?;

        let recipient = RecipientRequest::nuban(&account.account_name, &account.account_number, &account.bank_code);
        match self.gateway.create_recipient(&recipient).await {
            Ok(code) => {
                self.store.set_recipient_code(account.id, &code).await?;
                account.recipient_code = Some(code);
            }
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Transfer recipient not created");
            }
        }
        Ok(account)
    }

    pub async fn list_bank_accounts(&self, user_id: Uuid) -> Result<Vec<BankAccount>, AppError> {
        let wallet = self.get_wallet(user_id).await?;
        Ok(self.store.list_bank_accounts(wallet.id).await?)
    }

    pub async fn set_primary_bank_account(&self, user_id: Uuid, id: Uuid) -> Result<BankAccount, AppError> {
        let wallet = self.get_wallet(user_id).await?;
        self.store
            .set_primary_bank_account(wallet.id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Bank account {} not found", id)))
    }

    /// Removes the account; returns the account promoted to primary, if any.
    pub async fn delete_bank_account(&self, user_id: Uuid, id: Uuid) -> Result<Option<BankAccount>, AppError> {
        let wallet = self.get_wallet(user_id).await?;
        let promoted = self.store.delete_bank_account(wallet.id, id).await?;
        if let Some(account) = &promoted {
            tracing::info!(wallet_id = %wallet.id, account_id = %account.id, "Primary bank account reassigned");
        }
        Ok(promoted)
    }
}

fn hash_pin(pin: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("PIN hashing failed: {}", e)))
}

fn pin_matches(hash: &str, pin: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(pin.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}
