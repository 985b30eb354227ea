//! Transaction persistence
//!
//! The unique index on `idempotency_key` is the concurrency control:
//! duplicate insert races lose and re-read the winner's row. Terminal
//! transitions use atomic CAS on the status column so the engine and
//! the payment sweeper can never double-resolve a charge.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::error::PaymentError;
use super::types::{Transaction, TransactionStatus};

/// Result of an idempotent insert attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same idempotency key already exists.
    DuplicateKey,
}

/// Transaction store operations
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a PENDING row; the unique idempotency-key index decides
    /// races.
    async fn insert_pending(&self, txn: &Transaction) -> Result<InsertOutcome, PaymentError>;

    async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>, PaymentError>;

    async fn find_by_idempotency_key(&self, key: &str)
    -> Result<Option<Transaction>, PaymentError>;

    /// CAS PENDING → SUCCESS. Returns false when the row already left
    /// PENDING.
    async fn mark_success(
        &self,
        transaction_id: Uuid,
        gateway_reference: &str,
    ) -> Result<bool, PaymentError>;

    /// CAS PENDING → FAILED. Returns false when the row already left
    /// PENDING.
    async fn mark_failed(&self, transaction_id: Uuid, reason: &str)
    -> Result<bool, PaymentError>;

    /// PENDING rows untouched for at least `older_than`, oldest first.
    async fn find_stale_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Transaction>, PaymentError>;
}

// ============================================================
// IN-MEMORY STORE
// ============================================================

/// In-memory transaction store
///
/// Rows keyed by idempotency key (the uniqueness constraint), with an
/// id → key index for lookups by transaction id.
#[derive(Default)]
pub struct MemoryTransactionStore {
    by_key: DashMap<String, Transaction>,
    key_by_id: DashMap<Uuid, String>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition<F>(&self, transaction_id: Uuid, apply: F) -> Result<bool, PaymentError>
    where
        F: FnOnce(&mut Transaction),
    {
        let Some(key) = self.key_by_id.get(&transaction_id).map(|k| k.clone()) else {
            return Err(PaymentError::TransactionNotFound(transaction_id.to_string()));
        };
        let Some(mut row) = self.by_key.get_mut(&key) else {
            return Err(PaymentError::TransactionNotFound(transaction_id.to_string()));
        };
        if row.status != TransactionStatus::Pending {
            return Ok(false);
        }
        apply(&mut row);
        row.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn insert_pending(&self, txn: &Transaction) -> Result<InsertOutcome, PaymentError> {
        match self.by_key.entry(txn.idempotency_key.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::DuplicateKey),
            Entry::Vacant(vacant) => {
                vacant.insert(txn.clone());
                self.key_by_id
                    .insert(txn.transaction_id, txn.idempotency_key.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>, PaymentError> {
        let Some(key) = self.key_by_id.get(&transaction_id) else {
            return Ok(None);
        };
        Ok(self.by_key.get(key.value()).map(|row| row.clone()))
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, PaymentError> {
        Ok(self.by_key.get(key).map(|row| row.clone()))
    }

    async fn mark_success(
        &self,
        transaction_id: Uuid,
        gateway_reference: &str,
    ) -> Result<bool, PaymentError> {
        self.transition(transaction_id, |row| {
            row.status = TransactionStatus::Success;
            row.gateway_reference = Some(gateway_reference.to_string());
        })
    }

    async fn mark_failed(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<bool, PaymentError> {
        self.transition(transaction_id, |row| {
            row.status = TransactionStatus::Failed;
            row.failure_reason = Some(reason.to_string());
        })
    }

    async fn find_stale_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Transaction>, PaymentError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| PaymentError::Internal(e.to_string()))?;

        let mut stale: Vec<Transaction> = self
            .by_key
            .iter()
            .filter(|row| row.status == TransactionStatus::Pending && row.updated_at < cutoff)
            .map(|row| row.clone())
            .collect();
        stale.sort_by_key(|t| t.updated_at);
        stale.truncate(limit);
        Ok(stale)
    }
}

// ============================================================
// POSTGRESQL STORE
// ============================================================

/// PostgreSQL transaction store
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: &sqlx::postgres::PgRow) -> Result<Transaction, PaymentError> {
        let id_str: String = row.get("transaction_id");
        let transaction_id: Uuid = id_str
            .parse()
            .map_err(|_| PaymentError::Internal(format!("Invalid transaction_id: {}", id_str)))?;

        let status_id: i16 = row.get("status");
        let status = TransactionStatus::from_id(status_id)
            .ok_or_else(|| PaymentError::Internal(format!("Invalid status ID: {}", status_id)))?;

        Ok(Transaction {
            transaction_id,
            idempotency_key: row.get("idempotency_key"),
            booking_id: row.get::<i64, _>("booking_id") as u64,
            user_id: row.get::<i64, _>("user_id") as u64,
            amount: row.get("amount"),
            currency: row.get("currency"),
            status,
            gateway_reference: row.get("gateway_reference"),
            failure_reason: row.get("failure_reason"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

const TXN_COLUMNS: &str = "transaction_id, idempotency_key, booking_id, user_id, amount, \
                           currency, status, gateway_reference, failure_reason, \
                           created_at, updated_at";

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn insert_pending(&self, txn: &Transaction) -> Result<InsertOutcome, PaymentError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions_tb
                (transaction_id, idempotency_key, booking_id, user_id, amount,
                 currency, status, created_at, updated_at)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(txn.transaction_id.to_string())
        .bind(&txn.idempotency_key)
        .bind(txn.booking_id as i64)
        .bind(txn.user_id as i64)
        .bind(txn.amount)
        .bind(&txn.currency)
        .bind(txn.status.id())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::DuplicateKey)
        }
    }

    async fn get(&self, transaction_id: Uuid) -> Result<Option<Transaction>, PaymentError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions_tb WHERE transaction_id = $1",
            TXN_COLUMNS
        ))
        .bind(transaction_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Transaction>, PaymentError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transactions_tb WHERE idempotency_key = $1",
            TXN_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn mark_success(
        &self,
        transaction_id: Uuid,
        gateway_reference: &str,
    ) -> Result<bool, PaymentError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions_tb
            SET status = $1, gateway_reference = $2, updated_at = NOW()
            WHERE transaction_id = $3 AND status = $4
            "#,
        )
        .bind(TransactionStatus::Success.id())
        .bind(gateway_reference)
        .bind(transaction_id.to_string())
        .bind(TransactionStatus::Pending.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        transaction_id: Uuid,
        reason: &str,
    ) -> Result<bool, PaymentError> {
        let result = sqlx::query(
            r#"
            UPDATE transactions_tb
            SET status = $1, failure_reason = $2, updated_at = NOW()
            WHERE transaction_id = $3 AND status = $4
            "#,
        )
        .bind(TransactionStatus::Failed.id())
        .bind(reason)
        .bind(transaction_id.to_string())
        .bind(TransactionStatus::Pending.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_stale_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<Transaction>, PaymentError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transactions_tb
            WHERE status = $1
              AND updated_at < NOW() - INTERVAL '1 second' * $2
            ORDER BY updated_at ASC
            LIMIT $3
            "#,
            TXN_COLUMNS
        ))
        .bind(TransactionStatus::Pending.id())
        .bind(older_than.as_secs() as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_transaction).collect()
    }
}
