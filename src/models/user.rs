//! User model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub use super::enums::{Role, UserStatus};

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub full_name: String,
    pub username: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    /// Borrower category, e.g. "Instructor", "Student" or "Staff"
    pub user_type: Option<String>,
    pub email: String,
    pub status: UserStatus,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    /// Incremented on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Self-service registration request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(length(min = 1, max = 200, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    pub user_type: Option<String>,
    #[validate(length(max = 30))]
    pub contact_number: Option<String>,
    #[validate(length(max = 255))]
    pub address: Option<String>,
}

impl RegisterUser {
    /// Copy with surrounding whitespace stripped; blank optional fields become `None`
    pub fn normalized(&self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            user_type: trimmed(&self.user_type),
            contact_number: trimmed(&self.contact_number),
            address: trimmed(&self.address),
        }
    }
}

/// Administrator edit of an account
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 1, max = 200, message = "Full name is required"))]
    pub full_name: Option<String>,
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: Option<String>,
    pub role: Option<Role>,
    pub user_type: Option<String>,
    pub status: Option<UserStatus>,
}

impl UpdateUser {
    pub fn normalized(&self) -> Self {
        Self {
            full_name: self.full_name.as_deref().map(|v| v.trim().to_string()),
            username: self.username.as_deref().map(|v| v.trim().to_string()),
            role: self.role,
            user_type: trimmed(&self.user_type),
            status: self.status,
        }
    }
}

/// Self-service account settings
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSettings {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

impl UpdateSettings {
    pub fn normalized(&self) -> Self {
        Self {
            username: self.username.as_deref().map(|v| v.trim().to_string()),
            email: self.email.as_deref().map(|v| v.trim().to_string()),
            password: self.password.clone(),
            confirm_password: self.confirm_password.clone(),
        }
    }
}

/// Fields to overwrite on a stored account; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
    pub user_type: Option<String>,
    pub status: Option<UserStatus>,
}

impl UserChanges {
    pub fn status(status: UserStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, user: &mut User) {
        if let Some(ref full_name) = self.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(ref username) = self.username {
            user.username = username.clone();
        }
        if let Some(ref email) = self.email {
            user.email = email.clone();
        }
        if let Some(ref password_hash) = self.password_hash {
            user.password_hash = password_hash.clone();
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(ref user_type) = self.user_type {
            user.user_type = Some(user_type.clone());
        }
        if let Some(status) = self.status {
            user.status = status;
        }
    }
}

/// Row to insert once a registration has been validated and hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub user_type: Option<String>,
    pub status: UserStatus,
    pub contact_number: Option<String>,
    pub address: Option<String>,
}

/// User listing filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct UserQuery {
    pub status: Option<UserStatus>,
}

#[cfg(test)]
pub(crate) fn sample(id: i32, user_type: &str, status: UserStatus) -> User {
    User {
        id,
        full_name: format!("User {}", id),
        username: format!("user{}", id),
        password_hash: String::new(),
        role: Role::User,
        user_type: Some(user_type.to_string()),
        email: format!("user{}@example.edu", id),
        status,
        contact_number: None,
        address: None,
        version: 0,
        created_at: Utc::now(),
    }
}
