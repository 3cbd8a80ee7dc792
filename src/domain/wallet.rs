use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Bank accounts a single wallet may hold.
pub const MAX_BANK_ACCOUNTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub available_balance: BigDecimal,
    pub locked_balance: BigDecimal,
    pub is_setup: bool,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            available_balance: BigDecimal::from(0),
            locked_balance: BigDecimal::from(0),
            is_setup: false,
            is_active: false,
            pin_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a balance change, refusing any result that would go negative.
    pub fn apply(&mut self, delta: &WalletDelta) -> bool {
        let available = &self.available_balance + &delta.available;
        let locked = &self.locked_balance + &delta.locked;
        let zero = BigDecimal::from(0);
        if available < zero || locked < zero {
            return false;
        }
        self.available_balance = available;
        self.locked_balance = locked;
        self.updated_at = Utc::now();
        true
    }
}

/// Signed change to a wallet's balances, applied atomically by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletDelta {
    pub available: BigDecimal,
    pub locked: BigDecimal,
}

impl WalletDelta {
    pub fn credit(amount: BigDecimal) -> Self {
        Self {
            available: amount,
            locked: BigDecimal::from(0),
        }
    }

    /// Moves `amount` from available into locked.
    pub fn hold(amount: &BigDecimal) -> Self {
        Self {
            available: -amount.clone(),
            locked: amount.clone(),
        }
    }

    /// Drops a held amount after the money left the platform.
    pub fn release_hold(amount: &BigDecimal) -> Self {
        Self {
            available: BigDecimal::from(0),
            locked: -amount.clone(),
        }
    }

    /// Undoes a hold of `held`, returning `refund` to the available balance.
    /// The difference is the non-refundable transfer fee.
    pub fn refund_hold(held: &BigDecimal, refund: &BigDecimal) -> Self {
        Self {
            available: refund.clone(),
            locked: -held.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BankAccount {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub is_primary: bool,
    pub recipient_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BankAccount {
    pub fn new(
        wallet_id: Uuid,
        bank_code: String,
        bank_name: String,
        account_number: String,
        account_name: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            bank_code,
            bank_name,
            account_number,
            account_name,
            is_primary: false,
            recipient_code: None,
            created_at: Utc::now(),
        }
    }
}

/// NUBAN account numbers are exactly ten digits.
pub fn is_valid_account_number(account_number: &str) -> bool {
    account_number.len() == 10 && account_number.chars().all(|c| c.is_ascii_digit())
}

pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == 4 && pin.chars().all(|c| c.is_ascii_digit())
}
