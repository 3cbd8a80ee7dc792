//! In-memory store for service and router tests. A single mutex makes every
//! method atomic, which is what the Postgres store provides through transactions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::transaction::merge_metadata;
use crate::domain::{
    BankAccount, Handover, HandoverStatus, Inspection, InspectionStatus, Lead, LeadStatus,
    Notification, Promotion, PromotionStatus, Property, PropertyStatus, Transaction,
    TransactionKind, TransactionStatus, Wallet,
};
use crate::ports::{
    Cursor, HandoverRepository, InspectionRepository, LeadRepository, NotificationRepository,
    PromotionRepository, PropertyRepository, RepoResult, RepositoryError, Store,
    TransactionRepository, TransitionEffects, WalletRepository,
};

#[derive(Default)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    bank_accounts: Vec<BankAccount>,
    transactions: Vec<Transaction>,
    properties: HashMap<Uuid, Property>,
    inspections: HashMap<Uuid, Inspection>,
    promotions: HashMap<Uuid, Promotion>,
    handovers: HashMap<Uuid, Handover>,
    leads: HashMap<Uuid, Lead>,
    notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store poisoned")
    }

    /// Test helper: overwrite a wallet's balances directly.
    pub fn set_balances(&self, wallet_id: Uuid, available: i64, locked: i64) {
        let mut t = self.lock();
        if let Some(w) = t.wallets.get_mut(&wallet_id) {
            w.available_balance = available.into();
            w.locked_balance = locked.into();
        }
    }

    /// Test helper: store an entity bypassing service rules.
    pub fn put_inspection(&self, inspection: Inspection) {
        self.lock().inspections.insert(inspection.id, inspection);
    }

    pub fn put_promotion(&self, promotion: Promotion) {
        self.lock().promotions.insert(promotion.id, promotion);
    }

    pub fn put_transaction(&self, tx: Transaction) {
        self.lock().transactions.push(tx);
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn find_wallet_by_user(&self, user_id: Uuid) -> RepoResult<Option<Wallet>> {
        Ok(self.lock().wallets.values().find(|w| w.user_id == user_id).cloned())
    }

    async fn insert_wallet(&self, wallet: &Wallet) -> RepoResult<Wallet> {
        let mut t = self.lock();
        if let Some(existing) = t.wallets.values().find(|w| w.user_id == wallet.user_id) {
            return Ok(existing.clone());
        }
        t.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet.clone())
    }

    async fn activate_wallet(&self, wallet_id: Uuid, pin_hash: &str) -> RepoResult<Wallet> {
        let mut t = self.lock();
        let wallet = t
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;
        wallet.pin_hash = Some(pin_hash.to_string());
        wallet.is_setup = true;
        wallet.is_active = true;
        Ok(wallet.clone())
    }

    async fn list_bank_accounts(&self, wallet_id: Uuid) -> RepoResult<Vec<BankAccount>> {
        Ok(self
            .lock()
            .bank_accounts
            .iter()
            .filter(|a| a.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn find_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>> {
        Ok(self
            .lock()
            .bank_accounts
            .iter()
            .find(|a| a.wallet_id == wallet_id && a.id == id)
            .cloned())
    }

    async fn insert_bank_account(&self, account: &BankAccount, limit: usize) -> RepoResult<BankAccount> {
        let mut t = self.lock();
        let existing: Vec<&BankAccount> = t
            .bank_accounts
            .iter()
            .filter(|a| a.wallet_id == account.wallet_id)
            .collect();
        if existing.len() >= limit {
            return Err(RepositoryError::Conflict(format!(
                "wallet already has {} bank accounts",
                limit
            )));
        }
        if existing.iter().any(|a| a.account_number == account.account_number) {
            return Err(RepositoryError::Conflict("duplicate account number".into()));
        }
        let mut stored = account.clone();
        stored.is_primary = existing.is_empty();
        t.bank_accounts.push(stored.clone());
        Ok(stored)
    }

    async fn set_primary_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>> {
        let mut t = self.lock();
        if !t.bank_accounts.iter().any(|a| a.wallet_id == wallet_id && a.id == id) {
            return Ok(None);
        }
        let mut chosen = None;
        for account in t.bank_accounts.iter_mut().filter(|a| a.wallet_id == wallet_id) {
            account.is_primary = account.id == id;
            if account.is_primary {
                chosen = Some(account.clone());
            }
        }
        Ok(chosen)
    }

    async fn delete_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>> {
        let mut t = self.lock();
        let index = t
            .bank_accounts
            .iter()
            .position(|a| a.wallet_id == wallet_id && a.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("bank account {}", id)))?;
        let removed = t.bank_accounts.remove(index);
        if !removed.is_primary {
            return Ok(None);
        }
        let next = t
            .bank_accounts
            .iter_mut()
            .filter(|a| a.wallet_id == wallet_id)
            .min_by_key(|a| a.created_at);
        Ok(next.map(|a| {
            a.is_primary = true;
            a.clone()
        }))
    }

    async fn set_recipient_code(&self, id: Uuid, recipient_code: &str) -> RepoResult<()> {
        let mut t = self.lock();
        if let Some(a) = t.bank_accounts.iter_mut().find(|a| a.id == id) {
            a.recipient_code = Some(recipient_code.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn insert_transaction(&self, tx: &Transaction) -> RepoResult<Transaction> {
        let mut t = self.lock();
        if t.transactions.iter().any(|x| x.reference == tx.reference) {
            return Err(RepositoryError::Conflict("duplicate reference".into()));
        }
        t.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn find_transaction(&self, id: Uuid) -> RepoResult<Option<Transaction>> {
        Ok(self.lock().transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Transaction>> {
        Ok(self
            .lock()
            .transactions
            .iter()
            .find(|t| t.reference == reference)
            .cloned())
    }

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        after: Option<Cursor>,
        limit: i64,
    ) -> RepoResult<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .filter(|t| after.map_or(true, |c| (t.created_at, t.id) < c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn list_by_kind(
        &self,
        kind: TransactionKind,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self
            .lock()
            .transactions
            .iter()
            .filter(|t| t.kind == kind && status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn create_withdrawal(&self, wallet_id: Uuid, tx: &Transaction) -> RepoResult<Transaction> {
        let mut t = self.lock();
        let wallet = t
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;
        if !wallet.apply(&crate::domain::WalletDelta::hold(&tx.amount)) {
            return Err(RepositoryError::InsufficientFunds);
        }
        t.transactions.push(tx.clone());
        Ok(tx.clone())
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        from: &[TransactionStatus],
        to: TransactionStatus,
        effects: TransitionEffects,
    ) -> RepoResult<Option<Transaction>> {
        let mut t = self.lock();
        let Some(index) = t
            .transactions
            .iter()
            .position(|x| x.id == id && from.contains(&x.status))
        else {
            return Ok(None);
        };

        if let Some((wallet_id, delta)) = &effects.wallet {
            let wallet = t
                .wallets
                .get_mut(wallet_id)
                .ok_or(RepositoryError::InsufficientFunds)?;
            if !wallet.apply(delta) {
                return Err(RepositoryError::InsufficientFunds);
            }
        }

        let tx = &mut t.transactions[index];
        tx.status = to;
        if let Some(patch) = effects.metadata {
            merge_metadata(&mut tx.metadata, patch);
        }
        if effects.gateway_reference.is_some() {
            tx.gateway_reference = effects.gateway_reference;
        }
        tx.updated_at = Utc::now();
        Ok(Some(tx.clone()))
    }

    async fn merge_transaction_metadata(&self, id: Uuid, patch: Value) -> RepoResult<Transaction> {
        let mut t = self.lock();
        let tx = t
            .transactions
            .iter_mut()
            .find(|x| x.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;
        merge_metadata(&mut tx.metadata, patch);
        Ok(tx.clone())
    }
}

#[async_trait]
impl PropertyRepository for MemoryStore {
    async fn insert_property(&self, property: &Property) -> RepoResult<Property> {
        self.lock().properties.insert(property.id, property.clone());
        Ok(property.clone())
    }

    async fn find_property(&self, id: Uuid) -> RepoResult<Option<Property>> {
        Ok(self.lock().properties.get(&id).cloned())
    }

    async fn list_properties(
        &self,
        status: Option<PropertyStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Property>> {
        let mut rows: Vec<Property> = self
            .lock()
            .properties
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_property_status(
        &self,
        id: Uuid,
        from: &[PropertyStatus],
        to: PropertyStatus,
    ) -> RepoResult<Option<Property>> {
        let mut t = self.lock();
        Ok(t.properties
            .get_mut(&id)
            .filter(|p| from.contains(&p.status))
            .map(|p| {
                p.status = to;
                p.updated_at = Utc::now();
                p.clone()
            }))
    }
}

#[async_trait]
impl InspectionRepository for MemoryStore {
    async fn insert_inspection(&self, inspection: &Inspection) -> RepoResult<Inspection> {
        self.lock().inspections.insert(inspection.id, inspection.clone());
        Ok(inspection.clone())
    }

    async fn find_inspection(&self, id: Uuid) -> RepoResult<Option<Inspection>> {
        Ok(self.lock().inspections.get(&id).cloned())
    }

    async fn list_buyer_inspections(&self, buyer_id: Uuid) -> RepoResult<Vec<Inspection>> {
        Ok(self
            .lock()
            .inspections
            .values()
            .filter(|i| i.buyer_id == buyer_id)
            .cloned()
            .collect())
    }

    async fn list_developer_inspections(&self, developer_id: Uuid) -> RepoResult<Vec<Inspection>> {
        Ok(self
            .lock()
            .inspections
            .values()
            .filter(|i| i.developer_id == developer_id)
            .cloned()
            .collect())
    }

    async fn find_conflicting_inspections(
        &self,
        property_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> RepoResult<Vec<Inspection>> {
        Ok(self
            .lock()
            .inspections
            .values()
            .filter(|i| {
                i.property_id == property_id
                    && i.status.is_active()
                    && i.slot_time > start
                    && i.slot_time < end
                    && Some(i.id) != exclude
            })
            .cloned()
            .collect())
    }

    async fn update_inspection(
        &self,
        inspection: &Inspection,
        expected: InspectionStatus,
    ) -> RepoResult<Option<Inspection>> {
        let mut t = self.lock();
        match t.inspections.get_mut(&inspection.id) {
            Some(stored) if stored.status == expected => {
                *stored = inspection.clone();
                Ok(Some(inspection.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl PromotionRepository for MemoryStore {
    async fn insert_promotion(&self, promotion: &Promotion) -> RepoResult<Promotion> {
        self.lock().promotions.insert(promotion.id, promotion.clone());
        Ok(promotion.clone())
    }

    async fn find_promotion(&self, id: Uuid) -> RepoResult<Option<Promotion>> {
        Ok(self.lock().promotions.get(&id).cloned())
    }

    async fn find_promotion_by_code(&self, code: &str) -> RepoResult<Option<Promotion>> {
        Ok(self
            .lock()
            .promotions
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn list_creator_promotions(&self, creator_id: Uuid) -> RepoResult<Vec<Promotion>> {
        Ok(self
            .lock()
            .promotions
            .values()
            .filter(|p| p.creator_id == creator_id)
            .cloned()
            .collect())
    }

    async fn update_promotion_status(
        &self,
        id: Uuid,
        from: PromotionStatus,
        to: PromotionStatus,
    ) -> RepoResult<Option<Promotion>> {
        let mut t = self.lock();
        Ok(t.promotions
            .get_mut(&id)
            .filter(|p| p.status == from)
            .map(|p| {
                p.status = to;
                p.updated_at = Utc::now();
                p.clone()
            }))
    }

    async fn increment_clicks(&self, id: Uuid) -> RepoResult<()> {
        if let Some(p) = self.lock().promotions.get_mut(&id) {
            p.clicks += 1;
        }
        Ok(())
    }

    async fn increment_leads(&self, id: Uuid) -> RepoResult<()> {
        if let Some(p) = self.lock().promotions.get_mut(&id) {
            p.leads += 1;
        }
        Ok(())
    }

    async fn expire_due_promotions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let mut t = self.lock();
        let mut expired = 0;
        for p in t.promotions.values_mut() {
            if p.status == PromotionStatus::Active && p.is_past_expiry(now) {
                p.status = PromotionStatus::Expired;
                p.updated_at = now;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl HandoverRepository for MemoryStore {
    async fn insert_handover(&self, handover: &Handover) -> RepoResult<Handover> {
        let mut t = self.lock();
        if t.handovers.values().any(|h| h.transaction_id == handover.transaction_id) {
            return Err(RepositoryError::Conflict("handover exists".into()));
        }
        t.handovers.insert(handover.id, handover.clone());
        Ok(handover.clone())
    }

    async fn find_handover(&self, id: Uuid) -> RepoResult<Option<Handover>> {
        Ok(self.lock().handovers.get(&id).cloned())
    }

    async fn find_handover_by_transaction(&self, transaction_id: Uuid) -> RepoResult<Option<Handover>> {
        Ok(self
            .lock()
            .handovers
            .values()
            .find(|h| h.transaction_id == transaction_id)
            .cloned())
    }

    async fn update_handover(
        &self,
        handover: &Handover,
        expected: HandoverStatus,
    ) -> RepoResult<Option<Handover>> {
        let mut t = self.lock();
        match t.handovers.get_mut(&handover.id) {
            Some(stored) if stored.status == expected => {
                *stored = handover.clone();
                Ok(Some(handover.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn complete_handover(
        &self,
        handover: &Handover,
        expected: HandoverStatus,
        release: &Transaction,
    ) -> RepoResult<Option<Handover>> {
        let mut t = self.lock();
        if t.handovers.get(&handover.id).map(|h| h.status) != Some(expected) {
            return Ok(None);
        }
        if t.transactions.iter().any(|x| x.reference == release.reference) {
            return Err(RepositoryError::Conflict("duplicate reference".into()));
        }
        let wallet = release
            .wallet_id
            .and_then(|id| t.wallets.get_mut(&id))
            .ok_or_else(|| RepositoryError::NotFound("release wallet".into()))?;
        if !wallet.apply(&crate::domain::WalletDelta::credit(release.amount.clone())) {
            return Err(RepositoryError::InsufficientFunds);
        }
        t.transactions.push(release.clone());
        t.handovers.insert(handover.id, handover.clone());
        Ok(Some(handover.clone()))
    }
}

#[async_trait]
impl LeadRepository for MemoryStore {
    async fn insert_lead(&self, lead: &Lead) -> RepoResult<Lead> {
        self.lock().leads.insert(lead.id, lead.clone());
        Ok(lead.clone())
    }

    async fn list_developer_leads(&self, developer_id: Uuid) -> RepoResult<Vec<Lead>> {
        Ok(self
            .lock()
            .leads
            .values()
            .filter(|l| l.developer_id == developer_id)
            .cloned()
            .collect())
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        developer_id: Uuid,
        status: LeadStatus,
    ) -> RepoResult<Option<Lead>> {
        let mut t = self.lock();
        Ok(t.leads
            .get_mut(&id)
            .filter(|l| l.developer_id == developer_id)
            .map(|l| {
                l.status = status;
                l.updated_at = Utc::now();
                l.clone()
            }))
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> RepoResult<()> {
        self.lock().notifications.push(notification.clone());
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> RepoResult<Vec<Notification>> {
        Ok(self
            .lock()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || n.read_at.is_none()))
            .cloned()
            .collect())
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> RepoResult<Option<Notification>> {
        let mut t = self.lock();
        Ok(t.notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
            .map(|n| {
                n.read_at.get_or_insert_with(Utc::now);
                n.clone()
            }))
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> RepoResult<u64> {
        let mut t = self.lock();
        let mut count = 0;
        for n in t
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && n.read_at.is_none())
        {
            n.read_at = Some(Utc::now());
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> RepoResult<()> {
        Ok(())
    }
}
