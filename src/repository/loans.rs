//! Borrow record storage and the paired ledger commits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::PgRepository;
use crate::{
    error::AppResult,
    models::{
        equipment::EquipmentStatus,
        loan::{BorrowRecord, LoanQuery, NewBorrowRecord},
    },
};

/// Outcome of a version-checked commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit<T> {
    Applied(T),
    /// A row changed since it was read; nothing was written
    Stale,
}

/// Everything a borrow writes, stamped with the versions it was validated against
#[derive(Debug, Clone)]
pub struct BorrowCommit {
    pub user_id: i32,
    pub user_version: i64,
    pub equipment_id: i32,
    pub equipment_version: i64,
    pub quantity_after: i32,
    pub status_after: EquipmentStatus,
    pub record: NewBorrowRecord,
}

/// Quantity credited back to an equipment row on return
#[derive(Debug, Clone)]
pub struct EquipmentCredit {
    pub equipment_id: i32,
    pub equipment_version: i64,
    pub quantity_after: i32,
    pub status_after: EquipmentStatus,
}

/// Everything a return writes. `credit` is `None` when the equipment row is gone.
#[derive(Debug, Clone)]
pub struct ReturnCommit {
    pub record_id: i32,
    pub returned_at: DateTime<Utc>,
    pub credit: Option<EquipmentCredit>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanRepository: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<BorrowRecord>>;

    /// List records matching the filters, newest first
    async fn list(&self, query: &LoanQuery) -> AppResult<Vec<BorrowRecord>>;

    /// Number of the user's records still in `Borrowed` state
    async fn count_outstanding(&self, user_id: i32) -> AppResult<i64>;

    /// Atomically decrement the equipment, bump the user version and insert
    /// the record, provided neither row changed since validation.
    async fn commit_borrow(&self, commit: &BorrowCommit) -> AppResult<Commit<BorrowRecord>>;

    /// Atomically mark the record returned and credit the equipment, provided
    /// the record is still borrowed and the equipment row is unchanged.
    async fn commit_return(&self, commit: &ReturnCommit) -> AppResult<Commit<BorrowRecord>>;
}

#[async_trait]
impl LoanRepository for PgRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        let record =
            sqlx::query_as::<_, BorrowRecord>("SELECT * FROM borrow_records WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(record)
    }

    async fn list(&self, query: &LoanQuery) -> AppResult<Vec<BorrowRecord>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM borrow_records WHERE TRUE");
        if let Some(user_id) = query.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(equipment_id) = query.equipment_id {
            builder.push(" AND equipment_id = ").push_bind(equipment_id);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        builder.push(" ORDER BY borrow_date DESC, id DESC");

        let records = builder
            .build_query_as::<BorrowRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn count_outstanding(&self, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE user_id = $1 AND status = 'Borrowed'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn commit_borrow(&self, commit: &BorrowCommit) -> AppResult<Commit<BorrowRecord>> {
        let mut tx = self.pool.begin().await?;

        // The user stamp serializes quota checks for one borrower
        let user_rows = sqlx::query(
            "UPDATE users SET version = version + 1 WHERE id = $1 AND version = $2",
        )
        .bind(commit.user_id)
        .bind(commit.user_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if user_rows == 0 {
            tx.rollback().await?;
            return Ok(Commit::Stale);
        }

        let equipment_rows = sqlx::query(
            r#"
            UPDATE equipment
            SET quantity = $1, status = $2, version = version + 1, updated_at = $3
            WHERE id = $4 AND version = $5
            "#,
        )
        .bind(commit.quantity_after)
        .bind(commit.status_after)
        .bind(commit.record.borrow_date)
        .bind(commit.equipment_id)
        .bind(commit.equipment_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if equipment_rows == 0 {
            tx.rollback().await?;
            return Ok(Commit::Stale);
        }

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records
                (user_id, equipment_id, quantity, purpose, borrow_date,
                 expected_return_date, return_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, NULL, 'Borrowed')
            RETURNING *
            "#,
        )
        .bind(commit.record.user_id)
        .bind(commit.record.equipment_id)
        .bind(commit.record.quantity)
        .bind(&commit.record.purpose)
        .bind(commit.record.borrow_date)
        .bind(commit.record.expected_return_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Commit::Applied(record))
    }

    async fn commit_return(&self, commit: &ReturnCommit) -> AppResult<Commit<BorrowRecord>> {
        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records
            SET status = 'Returned', return_date = $1
            WHERE id = $2 AND status = 'Borrowed'
            RETURNING *
            "#,
        )
        .bind(commit.returned_at)
        .bind(commit.record_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(record) = record else {
            tx.rollback().await?;
            return Ok(Commit::Stale);
        };

        if let Some(ref credit) = commit.credit {
            let rows = sqlx::query(
                r#"
                UPDATE equipment
                SET quantity = $1, status = $2, version = version + 1, updated_at = $3
                WHERE id = $4 AND version = $5
                "#,
            )
            .bind(credit.quantity_after)
            .bind(credit.status_after)
            .bind(commit.returned_at)
            .bind(credit.equipment_id)
            .bind(credit.equipment_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            if rows == 0 {
                tx.rollback().await?;
                return Ok(Commit::Stale);
            }
        }

        tx.commit().await?;
        Ok(Commit::Applied(record))
    }
}
