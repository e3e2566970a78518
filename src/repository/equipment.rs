//! Equipment ledger storage

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};

use super::{DeleteOutcome, PgRepository};
use crate::{
    error::AppResult,
    models::equipment::{
        CreateEquipment, Equipment, EquipmentLabel, EquipmentQuery, EquipmentStatus,
        UpdateEquipment,
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EquipmentRepository: Send + Sync {
    /// List catalog items matching the filters, ordered by type then name
    async fn list(&self, query: &EquipmentQuery) -> AppResult<Vec<Equipment>>;

    async fn get_by_id(&self, id: i32) -> AppResult<Option<Equipment>>;

    /// Insert an item; its status is projected from the initial quantity
    async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment>;

    /// Apply an administrator edit and re-project the status
    async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Option<Equipment>>;

    /// Delete an item unless a borrow record references it
    async fn delete(&self, id: i32) -> AppResult<DeleteOutcome>;
}

/// Lowercased substring pattern with the LIKE wildcards in `search` taken literally
pub(crate) fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl EquipmentRepository for PgRepository {
    async fn list(&self, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM equipment WHERE TRUE");

        if let Some(ref search) = query.search {
            let pattern = like_pattern(search);
            builder
                .push(" AND (LOWER(name) LIKE ")
                .push_bind(pattern.clone())
                .push(r" ESCAPE '\' OR LOWER(COALESCE(description, '')) LIKE ")
                .push_bind(pattern)
                .push(r" ESCAPE '\')");
        }
        if let Some(ref equipment_type) = query.equipment_type {
            builder.push(" AND equipment_type = ").push_bind(equipment_type.clone());
        }
        if let Some(label) = query.label {
            builder.push(" AND label = ").push_bind(label);
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if query.borrowable_only.unwrap_or(false) {
            builder
                .push(" AND label = ")
                .push_bind(EquipmentLabel::Borrowable)
                .push(" AND quantity > 0");
        }
        builder.push(" ORDER BY equipment_type, name, id");

        let rows = builder
            .build_query_as::<Equipment>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Option<Equipment>> {
        let row = sqlx::query_as::<_, Equipment>("SELECT * FROM equipment WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        let now = Utc::now();
        let row = sqlx::query_as::<_, Equipment>(
            r#"
            INSERT INTO equipment
                (name, description, equipment_type, label, quantity, status, image_path,
                 version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $8)
            RETURNING *
            "#,
        )
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.equipment_type)
        .bind(data.label)
        .bind(data.quantity)
        .bind(EquipmentStatus::project(data.quantity, 0))
        .bind(&data.image_path)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Option<Equipment>> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Equipment>(
            "SELECT * FROM equipment WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut equipment) = current else {
            return Ok(None);
        };
        data.apply_to(&mut equipment);

        let on_loan: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(quantity), 0)::bigint FROM borrow_records
            WHERE equipment_id = $1 AND status = 'Borrowed'
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let updated = sqlx::query_as::<_, Equipment>(
            r#"
            UPDATE equipment
            SET name = $1, description = $2, equipment_type = $3, label = $4,
                quantity = $5, status = $6, image_path = $7,
                version = version + 1, updated_at = $8
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(&equipment.name)
        .bind(&equipment.description)
        .bind(&equipment.equipment_type)
        .bind(equipment.label)
        .bind(equipment.quantity)
        .bind(EquipmentStatus::project(equipment.quantity, on_loan))
        .bind(&equipment.image_path)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn delete(&self, id: i32) -> AppResult<DeleteOutcome> {
        let result = sqlx::query(
            r#"
            DELETE FROM equipment
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM borrow_records WHERE equipment_id = $1)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(DeleteOutcome::Deleted),
            Ok(_) => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM equipment WHERE id = $1)")
                        .bind(id)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(if exists {
                    DeleteOutcome::Referenced
                } else {
                    DeleteOutcome::NotFound
                })
            }
            // A borrow committed between the check and the delete
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                Ok(DeleteOutcome::Referenced)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Projector"), "%projector%");
        assert_eq!(like_pattern("100%"), r"%100\%%");
        assert_eq!(like_pattern("usb_c"), r"%usb\_c%");
        assert_eq!(like_pattern(r"a\b"), r"%a\\b%");
    }
}
