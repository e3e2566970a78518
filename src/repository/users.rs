//! User account storage

use async_trait::async_trait;
use chrono::Utc;

use super::{DeleteOutcome, PgRepository};
use crate::{
    error::{AppError, AppResult},
    models::user::{NewUser, User, UserChanges, UserQuery},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>>;

    /// List users, pending accounts first
    async fn list(&self, query: &UserQuery) -> AppResult<Vec<User>>;

    /// Whether the username or the email (case-insensitive) is already registered
    async fn identity_taken(&self, username: &str, email: &str) -> AppResult<bool>;

    async fn create(&self, user: &NewUser) -> AppResult<User>;

    /// Overwrite the given fields and bump the row version. A username or
    /// email already held by another account is a conflict.
    async fn update(&self, id: i32, changes: &UserChanges) -> AppResult<Option<User>>;

    /// Delete a user unless a borrow record references them
    async fn delete(&self, id: i32) -> AppResult<DeleteOutcome>;
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY CASE status WHEN 'Pending' THEN 0 ELSE 1 END, full_name, id
            "#,
        )
        .bind(query.status)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn identity_taken(&self, username: &str, email: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($2)
            )
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users
                (full_name, username, email, password_hash, role, user_type, status,
                 contact_number, address, version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10)
            RETURNING *
            "#,
        )
        .bind(&user.full_name)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .bind(&user.user_type)
        .bind(user.status)
        .bind(&user.contact_number)
        .bind(&user.address)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                "Username or email is already registered".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, id: i32, changes: &UserChanges) -> AppResult<Option<User>> {
        let result = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                full_name = COALESCE($1, full_name),
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                password_hash = COALESCE($4, password_hash),
                role = COALESCE($5, role),
                user_type = COALESCE($6, user_type),
                status = COALESCE($7, status),
                version = version + 1
            WHERE id = $8
            RETURNING *
            "#,
        )
        .bind(&changes.full_name)
        .bind(&changes.username)
        .bind(&changes.email)
        .bind(&changes.password_hash)
        .bind(changes.role)
        .bind(&changes.user_type)
        .bind(changes.status)
        .bind(id)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
                "Username or email is already used by another account".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, id: i32) -> AppResult<DeleteOutcome> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM borrow_records WHERE user_id = $1)
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(DeleteOutcome::Deleted),
            Ok(_) => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                        .bind(id)
                        .fetch_one(&self.pool)
                        .await?;
                Ok(if exists {
                    DeleteOutcome::Referenced
                } else {
                    DeleteOutcome::NotFound
                })
            }
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                Ok(DeleteOutcome::Referenced)
            }
            Err(e) => Err(e.into()),
        }
    }
}
