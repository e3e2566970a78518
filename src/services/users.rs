//! User registration and account administration

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use validator::Validate;

use crate::{
    error::{AppError, AppResult, LendingError},
    models::user::{
        NewUser, RegisterUser, Role, UpdateSettings, UpdateUser, User, UserChanges, UserQuery,
        UserStatus,
    },
    repository::{DeleteOutcome, Repository},
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Create a `Pending` account; an administrator must approve it before
    /// the user can borrow.
    pub async fn register(&self, data: &RegisterUser) -> AppResult<User> {
        let data = data.normalized();
        data.validate()?;

        if self
            .repository
            .users
            .identity_taken(&data.username, &data.email)
            .await?
        {
            return Err(AppError::Conflict(
                "Username or email is already registered".to_string(),
            ));
        }

        let user = self
            .repository
            .users
            .create(&NewUser {
                password_hash: hash_password(&data.password)?,
                full_name: data.full_name,
                username: data.username,
                email: data.email,
                role: Role::User,
                user_type: data.user_type,
                status: UserStatus::Pending,
                contact_number: data.contact_number,
                address: data.address,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered, awaiting approval");
        Ok(user)
    }

    pub async fn list(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        self.repository.users.list(query).await
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository
            .users
            .get_by_id(id)
            .await?
            .ok_or_else(|| LendingError::UserNotFound(id).into())
    }

    pub async fn approve(&self, id: i32) -> AppResult<User> {
        self.set_status(id, UserStatus::Active).await
    }

    pub async fn reject(&self, id: i32) -> AppResult<User> {
        self.set_status(id, UserStatus::Rejected).await
    }

    pub async fn disable(&self, id: i32) -> AppResult<User> {
        self.set_status(id, UserStatus::Disabled).await
    }

    async fn set_status(&self, id: i32, status: UserStatus) -> AppResult<User> {
        let user = self.apply(id, &UserChanges::status(status)).await?;
        tracing::info!(user_id = id, status = %status, "User status changed");
        Ok(user)
    }

    /// Administrator edit: name, username, role, user type and status
    pub async fn update(&self, id: i32, data: &UpdateUser) -> AppResult<User> {
        let data = data.normalized();
        data.validate()?;

        let user = self
            .apply(
                id,
                &UserChanges {
                    full_name: data.full_name,
                    username: data.username,
                    role: data.role,
                    user_type: data.user_type,
                    status: data.status,
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(user_id = id, "User updated");
        Ok(user)
    }

    /// Self-service edit of username, email and password
    pub async fn update_settings(&self, id: i32, data: &UpdateSettings) -> AppResult<User> {
        let data = data.normalized();
        data.validate()?;
        if data.password.is_some() && data.password != data.confirm_password {
            return Err(AppError::Validation(
                "Password and confirmation do not match".to_string(),
            ));
        }

        let password_hash = data.password.as_deref().map(hash_password).transpose()?;
        let user = self
            .apply(
                id,
                &UserChanges {
                    username: data.username,
                    email: data.email,
                    password_hash,
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(user_id = id, "Account settings updated");
        Ok(user)
    }

    async fn apply(&self, id: i32, changes: &UserChanges) -> AppResult<User> {
        self.repository
            .users
            .update(id, changes)
            .await?
            .ok_or_else(|| LendingError::UserNotFound(id).into())
    }

    /// Delete an account that has never borrowed anything
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        match self.repository.users.delete(id).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(user_id = id, "User deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(LendingError::UserNotFound(id).into()),
            DeleteOutcome::Referenced => {
                Err(LendingError::HasActiveReferences { entity: "User", id }.into())
            }
        }
    }
}

fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}
