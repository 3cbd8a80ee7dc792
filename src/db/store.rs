use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::models::{
    convert_all, BankAccountRow, HandoverRow, InspectionRow, LeadRow, NotificationRow,
    PromotionRow, PropertyRow, TransactionRow, WalletRow,
};
use crate::domain::{
    BankAccount, Handover, HandoverStatus, Inspection, InspectionStatus, Lead, LeadStatus,
    Notification, Promotion, PromotionStatus, Property, PropertyStatus, Transaction,
    TransactionKind, TransactionStatus, Wallet, WalletDelta,
};
use crate::ports::{
    Cursor, HandoverRepository, InspectionRepository, LeadRepository, NotificationRepository,
    PromotionRepository, PropertyRepository, RepoResult, RepositoryError, Store,
    TransactionRepository, TransitionEffects, WalletRepository,
};

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Applies `delta` in place, refusing to take either balance below zero.
/// Returns `false` when the guard rejected the change (or the wallet is missing).
async fn apply_wallet_delta(
    conn: &mut PgConnection,
    wallet_id: Uuid,
    delta: &WalletDelta,
) -> RepoResult<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE wallets
        SET available_balance = available_balance + $2,
            locked_balance = locked_balance + $3,
            updated_at = NOW()
        WHERE id = $1
          AND available_balance + $2 >= 0
          AND locked_balance + $3 >= 0
        "#,
    )
    .bind(wallet_id)
    .bind(&delta.available)
    .bind(&delta.locked)
    .execute(conn)
    .await?;

    Ok(updated.rows_affected() == 1)
}

fn status_list<T, F: Fn(&T) -> &'static str>(statuses: &[T], as_str: F) -> Vec<String> {
    statuses.iter().map(|s| as_str(s).to_string()).collect()
}

#[async_trait]
impl WalletRepository for PgStore {
    async fn find_wallet_by_user(&self, user_id: Uuid) -> RepoResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Wallet::from))
    }

    async fn insert_wallet(&self, wallet: &Wallet) -> RepoResult<Wallet> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, available_balance, locked_balance, is_setup, is_active, pin_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.user_id)
        .bind(&wallet.available_balance)
        .bind(&wallet.locked_balance)
        .bind(wallet.is_setup)
        .bind(wallet.is_active)
        .bind(&wallet.pin_hash)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, WalletRow>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(wallet.user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn activate_wallet(&self, wallet_id: Uuid, pin_hash: &str) -> RepoResult<Wallet> {
        let row = sqlx::query_as::<_, WalletRow>(
            "UPDATE wallets SET pin_hash = $2, is_setup = TRUE, is_active = TRUE, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(wallet_id)
        .bind(pin_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet_id)))?;
        Ok(row.into())
    }

    async fn list_bank_accounts(&self, wallet_id: Uuid) -> RepoResult<Vec<BankAccount>> {
        let rows = sqlx::query_as::<_, BankAccountRow>(
            "SELECT * FROM bank_accounts WHERE wallet_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BankAccount::from).collect())
    }

    async fn find_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>> {
        let row = sqlx::query_as::<_, BankAccountRow>(
            "SELECT * FROM bank_accounts WHERE wallet_id = $1 AND id = $2",
        )
        .bind(wallet_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BankAccount::from))
    }

    async fn insert_bank_account(&self, account: &BankAccount, limit: usize) -> RepoResult<BankAccount> {
        let mut tx = self.pool.begin().await?;

        // Serialises concurrent inserts for the same wallet.
        sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(account.wallet_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", account.wallet_id)))?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM bank_accounts WHERE wallet_id = $1")
                .bind(account.wallet_id)
                .fetch_one(&mut *tx)
                .await?;
        if count as usize >= limit {
            return Err(RepositoryError::Conflict(format!(
                "wallet already has {} bank accounts",
                limit
            )));
        }

        let row = sqlx::query_as::<_, BankAccountRow>(
            r#"
            INSERT INTO bank_accounts (id, wallet_id, bank_code, bank_name, account_number, account_name, is_primary, recipient_code, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(account.id)
        .bind(account.wallet_id)
        .bind(&account.bank_code)
        .bind(&account.bank_name)
        .bind(&account.account_number)
        .bind(&account.account_name)
        .bind(count == 0)
        .bind(&account.recipient_code)
        .bind(account.created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn set_primary_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM bank_accounts WHERE wallet_id = $1 AND id = $2 FOR UPDATE")
            .bind(wallet_id)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        sqlx::query("UPDATE bank_accounts SET is_primary = FALSE WHERE wallet_id = $1 AND is_primary")
            .bind(wallet_id)
            .execute(&mut *tx)
            .await?;
        let row = sqlx::query_as::<_, BankAccountRow>(
            "UPDATE bank_accounts SET is_primary = TRUE WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn delete_bank_account(&self, wallet_id: Uuid, id: Uuid) -> RepoResult<Option<BankAccount>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(wallet_id)
            .fetch_optional(&mut *tx)
            .await?;

        let deleted = sqlx::query_as::<_, BankAccountRow>(
            "DELETE FROM bank_accounts WHERE wallet_id = $1 AND id = $2 RETURNING *",
        )
        .bind(wallet_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("bank account {}", id)))?;

        let promoted = if deleted.is_primary {
            sqlx::query_as::<_, BankAccountRow>(
                r#"
                UPDATE bank_accounts SET is_primary = TRUE
                WHERE id = (
                    SELECT id FROM bank_accounts WHERE wallet_id = $1
                    ORDER BY created_at ASC, id ASC LIMIT 1
                )
                RETURNING *
                "#,
            )
            .bind(wallet_id)
            .fetch_optional(&mut *tx)
            .await?
        } else {
            None
        };

        tx.commit().await?;
        Ok(promoted.map(BankAccount::from))
    }

    async fn set_recipient_code(&self, id: Uuid, recipient_code: &str) -> RepoResult<()> {
        sqlx::query("UPDATE bank_accounts SET recipient_code = $2 WHERE id = $1")
            .bind(id)
            .bind(recipient_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn insert_transaction_row(conn: &mut PgConnection, tx: &Transaction) -> RepoResult<Transaction> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (
            id, user_id, wallet_id, kind, status, amount, fee, net_amount, reference,
            gateway_reference, bank_account_id, property_id, metadata, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(tx.wallet_id)
    .bind(tx.kind.as_str())
    .bind(tx.status.as_str())
    .bind(&tx.amount)
    .bind(&tx.fee)
    .bind(&tx.net_amount)
    .bind(&tx.reference)
    .bind(&tx.gateway_reference)
    .bind(tx.bank_account_id)
    .bind(tx.property_id)
    .bind(&tx.metadata)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(conn)
    .await?;
    row.try_into()
}

#[async_trait]
impl TransactionRepository for PgStore {
    async fn insert_transaction(&self, tx: &Transaction) -> RepoResult<Transaction> {
        let mut conn = self.pool.acquire().await?;
        insert_transaction_row(&mut *conn, tx).await
    }

    async fn find_transaction(&self, id: Uuid) -> RepoResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> RepoResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?
            .map(Transaction::try_from)
            .transpose()
    }

    async fn list_user_transactions(
        &self,
        user_id: Uuid,
        after: Option<Cursor>,
        limit: i64,
    ) -> RepoResult<Vec<Transaction>> {
        let (after_ts, after_id) = match after {
            Some((ts, id)) => (Some(ts), Some(id)),
            None => (None, None),
        };
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1
              AND ($2::timestamptz IS NULL OR (created_at, id) < ($2, $3::uuid))
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(user_id)
        .bind(after_ts)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_by_kind(
        &self,
        kind: TransactionKind,
        status: Option<TransactionStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE kind = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(kind.as_str())
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn create_withdrawal(&self, wallet_id: Uuid, tx: &Transaction) -> RepoResult<Transaction> {
        let mut db_tx = self.pool.begin().await?;

        if !apply_wallet_delta(&mut *db_tx, wallet_id, &WalletDelta::hold(&tx.amount)).await? {
            return Err(RepositoryError::InsufficientFunds);
        }
        let stored = insert_transaction_row(&mut *db_tx, tx).await?;

        db_tx.commit().await?;
        Ok(stored)
    }

    async fn transition_transaction(
        &self,
        id: Uuid,
        from: &[TransactionStatus],
        to: TransactionStatus,
        effects: TransitionEffects,
    ) -> RepoResult<Option<Transaction>> {
        let mut db_tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $2,
                metadata = metadata || $3::jsonb,
                gateway_reference = COALESCE($4, gateway_reference),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(effects.metadata.unwrap_or_else(|| json!({})))
        .bind(effects.gateway_reference)
        .bind(status_list(from, TransactionStatus::as_str))
        .fetch_optional(&mut *db_tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        if let Some((wallet_id, delta)) = effects.wallet {
            if !apply_wallet_delta(&mut *db_tx, wallet_id, &delta).await? {
                // Dropping the transaction rolls the status change back too.
                return Err(RepositoryError::InsufficientFunds);
            }
        }

        db_tx.commit().await?;
        Ok(Some(row.try_into()?))
    }

    async fn merge_transaction_metadata(&self, id: Uuid, patch: Value) -> RepoResult<Transaction> {
        sqlx::query_as::<_, TransactionRow>(
            "UPDATE transactions SET metadata = metadata || $2::jsonb, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(patch)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?
        .try_into()
    }
}

#[async_trait]
impl PropertyRepository for PgStore {
    async fn insert_property(&self, property: &Property) -> RepoResult<Property> {
        sqlx::query_as::<_, PropertyRow>(
            r#"
            INSERT INTO properties (id, developer_id, title, location, price, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(property.id)
        .bind(property.developer_id)
        .bind(&property.title)
        .bind(&property.location)
        .bind(&property.price)
        .bind(property.status.as_str())
        .bind(property.created_at)
        .bind(property.updated_at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_property(&self, id: Uuid) -> RepoResult<Option<Property>> {
        sqlx::query_as::<_, PropertyRow>("SELECT * FROM properties WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Property::try_from)
            .transpose()
    }

    async fn list_properties(
        &self,
        status: Option<PropertyStatus>,
        limit: i64,
        offset: i64,
    ) -> RepoResult<Vec<Property>> {
        let rows = sqlx::query_as::<_, PropertyRow>(
            r#"
            SELECT * FROM properties
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_property_status(
        &self,
        id: Uuid,
        from: &[PropertyStatus],
        to: PropertyStatus,
    ) -> RepoResult<Option<Property>> {
        sqlx::query_as::<_, PropertyRow>(
            "UPDATE properties SET status = $2, updated_at = NOW() WHERE id = $1 AND status = ANY($3) RETURNING *",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(status_list(from, PropertyStatus::as_str))
        .fetch_optional(&self.pool)
        .await?
        .map(Property::try_from)
        .transpose()
    }
}

#[async_trait]
impl InspectionRepository for PgStore {
    async fn insert_inspection(&self, inspection: &Inspection) -> RepoResult<Inspection> {
        sqlx::query_as::<_, InspectionRow>(
            r#"
            INSERT INTO inspections (
                id, property_id, buyer_id, developer_id, lead_id, slot_time, status, notes,
                cancellation_reason, cancelled_by, completed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(inspection.id)
        .bind(inspection.property_id)
        .bind(inspection.buyer_id)
        .bind(inspection.developer_id)
        .bind(inspection.lead_id)
        .bind(inspection.slot_time)
        .bind(inspection.status.as_str())
        .bind(&inspection.notes)
        .bind(&inspection.cancellation_reason)
        .bind(inspection.cancelled_by.map(|r| r.as_str()))
        .bind(inspection.completed_at)
        .bind(inspection.created_at)
        .bind(inspection.updated_at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_inspection(&self, id: Uuid) -> RepoResult<Option<Inspection>> {
        sqlx::query_as::<_, InspectionRow>("SELECT * FROM inspections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Inspection::try_from)
            .transpose()
    }

    async fn list_buyer_inspections(&self, buyer_id: Uuid) -> RepoResult<Vec<Inspection>> {
        let rows = sqlx::query_as::<_, InspectionRow>(
            "SELECT * FROM inspections WHERE buyer_id = $1 ORDER BY slot_time DESC",
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_developer_inspections(&self, developer_id: Uuid) -> RepoResult<Vec<Inspection>> {
        let rows = sqlx::query_as::<_, InspectionRow>(
            "SELECT * FROM inspections WHERE developer_id = $1 ORDER BY slot_time DESC",
        )
        .bind(developer_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn find_conflicting_inspections(
        &self,
        property_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: Option<Uuid>,
    ) -> RepoResult<Vec<Inspection>> {
        let rows = sqlx::query_as::<_, InspectionRow>(
            r#"
            SELECT * FROM inspections
            WHERE property_id = $1
              AND status IN ('booked', 'confirmed')
              AND slot_time > $2 AND slot_time < $3
              AND ($4::uuid IS NULL OR id <> $4)
            "#,
        )
        .bind(property_id)
        .bind(start)
        .bind(end)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_inspection(
        &self,
        inspection: &Inspection,
        expected: InspectionStatus,
    ) -> RepoResult<Option<Inspection>> {
        sqlx::query_as::<_, InspectionRow>(
            r#"
            UPDATE inspections
            SET slot_time = $2, status = $3, notes = $4, cancellation_reason = $5,
                cancelled_by = $6, completed_at = $7, updated_at = $8
            WHERE id = $1 AND status = $9
            RETURNING *
            "#,
        )
        .bind(inspection.id)
        .bind(inspection.slot_time)
        .bind(inspection.status.as_str())
        .bind(&inspection.notes)
        .bind(&inspection.cancellation_reason)
        .bind(inspection.cancelled_by.map(|r| r.as_str()))
        .bind(inspection.completed_at)
        .bind(inspection.updated_at)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Inspection::try_from)
        .transpose()
    }
}

#[async_trait]
impl PromotionRepository for PgStore {
    async fn insert_promotion(&self, promotion: &Promotion) -> RepoResult<Promotion> {
        sqlx::query_as::<_, PromotionRow>(
            r#"
            INSERT INTO promotions (id, creator_id, property_id, code, status, clicks, leads, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(promotion.id)
        .bind(promotion.creator_id)
        .bind(promotion.property_id)
        .bind(&promotion.code)
        .bind(promotion.status.as_str())
        .bind(promotion.clicks)
        .bind(promotion.leads)
        .bind(promotion.expires_at)
        .bind(promotion.created_at)
        .bind(promotion.updated_at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_promotion(&self, id: Uuid) -> RepoResult<Option<Promotion>> {
        sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Promotion::try_from)
            .transpose()
    }

    async fn find_promotion_by_code(&self, code: &str) -> RepoResult<Option<Promotion>> {
        sqlx::query_as::<_, PromotionRow>("SELECT * FROM promotions WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(Promotion::try_from)
            .transpose()
    }

    async fn list_creator_promotions(&self, creator_id: Uuid) -> RepoResult<Vec<Promotion>> {
        let rows = sqlx::query_as::<_, PromotionRow>(
            "SELECT * FROM promotions WHERE creator_id = $1 ORDER BY created_at DESC",
        )
        .bind(creator_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_promotion_status(
        &self,
        id: Uuid,
        from: PromotionStatus,
        to: PromotionStatus,
    ) -> RepoResult<Option<Promotion>> {
        sqlx::query_as::<_, PromotionRow>(
            "UPDATE promotions SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3 RETURNING *",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(from.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Promotion::try_from)
        .transpose()
    }

    async fn increment_clicks(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE promotions SET clicks = clicks + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn increment_leads(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("UPDATE promotions SET leads = leads + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire_due_promotions(&self, now: DateTime<Utc>) -> RepoResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE promotions SET status = 'expired', updated_at = NOW()
            WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl HandoverRepository for PgStore {
    async fn insert_handover(&self, handover: &Handover) -> RepoResult<Handover> {
        sqlx::query_as::<_, HandoverRow>(
            r#"
            INSERT INTO handovers (
                id, transaction_id, property_id, buyer_id, developer_id, status, documents,
                buyer_signed_at, completed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(handover.id)
        .bind(handover.transaction_id)
        .bind(handover.property_id)
        .bind(handover.buyer_id)
        .bind(handover.developer_id)
        .bind(handover.status.as_str())
        .bind(&handover.documents)
        .bind(handover.buyer_signed_at)
        .bind(handover.completed_at)
        .bind(handover.created_at)
        .bind(handover.updated_at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn find_handover(&self, id: Uuid) -> RepoResult<Option<Handover>> {
        sqlx::query_as::<_, HandoverRow>("SELECT * FROM handovers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Handover::try_from)
            .transpose()
    }

    async fn find_handover_by_transaction(&self, transaction_id: Uuid) -> RepoResult<Option<Handover>> {
        sqlx::query_as::<_, HandoverRow>("SELECT * FROM handovers WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Handover::try_from)
            .transpose()
    }

    async fn update_handover(
        &self,
        handover: &Handover,
        expected: HandoverStatus,
    ) -> RepoResult<Option<Handover>> {
        let mut conn = self.pool.acquire().await?;
        update_handover_row(&mut *conn, handover, expected).await
    }

    async fn complete_handover(
        &self,
        handover: &Handover,
        expected: HandoverStatus,
        release: &Transaction,
    ) -> RepoResult<Option<Handover>> {
        let wallet_id = release
            .wallet_id
            .ok_or_else(|| RepositoryError::Database(format!("release {} has no wallet", release.reference)))?;
        let mut db_tx = self.pool.begin().await?;

        let Some(saved) = update_handover_row(&mut *db_tx, handover, expected).await? else {
            return Ok(None);
        };
        insert_transaction_row(&mut *db_tx, release).await?;
        if !apply_wallet_delta(&mut *db_tx, wallet_id, &WalletDelta::credit(release.amount.clone())).await? {
            return Err(RepositoryError::NotFound(format!("wallet {}", wallet_id)));
        }

        db_tx.commit().await?;
        Ok(Some(saved))
    }
}

async fn update_handover_row(
    conn: &mut PgConnection,
    handover: &Handover,
    expected: HandoverStatus,
) -> RepoResult<Option<Handover>> {
    sqlx::query_as::<_, HandoverRow>(
        r#"
        UPDATE handovers
        SET status = $2, documents = $3, buyer_signed_at = $4, completed_at = $5, updated_at = $6
        WHERE id = $1 AND status = $7
        RETURNING *
        "#,
    )
    .bind(handover.id)
    .bind(handover.status.as_str())
    .bind(&handover.documents)
    .bind(handover.buyer_signed_at)
    .bind(handover.completed_at)
    .bind(handover.updated_at)
    .bind(expected.as_str())
    .fetch_optional(conn)
    .await?
    .map(Handover::try_from)
    .transpose()
}

#[async_trait]
impl LeadRepository for PgStore {
    async fn insert_lead(&self, lead: &Lead) -> RepoResult<Lead> {
        sqlx::query_as::<_, LeadRow>(
            r#"
            INSERT INTO leads (
                id, property_id, developer_id, buyer_id, name, email, phone, message,
                promotion_code, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(lead.id)
        .bind(lead.property_id)
        .bind(lead.developer_id)
        .bind(lead.buyer_id)
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.message)
        .bind(&lead.promotion_code)
        .bind(lead.status.as_str())
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn list_developer_leads(&self, developer_id: Uuid) -> RepoResult<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(
            "SELECT * FROM leads WHERE developer_id = $1 ORDER BY created_at DESC",
        )
        .bind(developer_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn update_lead_status(
        &self,
        id: Uuid,
        developer_id: Uuid,
        status: LeadStatus,
    ) -> RepoResult<Option<Lead>> {
        sqlx::query_as::<_, LeadRow>(
            "UPDATE leads SET status = $3, updated_at = NOW() WHERE id = $1 AND developer_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(developer_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Lead::try_from)
        .transpose()
    }
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, read_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.read_at)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> RepoResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT * FROM notifications
            WHERE user_id = $1 AND (NOT $2 OR read_at IS NULL)
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(user_id)
        .bind(unread_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Notification::from).collect())
    }

    async fn mark_notification_read(&self, user_id: Uuid, id: Uuid) -> RepoResult<Option<Notification>> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r#"
            UPDATE notifications SET read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Notification::from))
    }

    async fn mark_all_notifications_read(&self, user_id: Uuid) -> RepoResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = NOW() WHERE user_id = $1 AND read_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
