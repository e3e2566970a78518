//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use chrono::Utc;

use crate::{
    error::AppResult,
    models::{
        loan::BorrowRecord,
        report::UserDashboard,
        user::{RegisterUser, UpdateSettings, UpdateUser, User, UserQuery},
    },
    AppState,
};

use super::Caller;

/// Register a new account (pending approval)
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created, awaiting approval", body = User),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(data): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state.services.users.register(&data).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// List users, pending accounts first
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = Vec<User>),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<User>>> {
    caller.require_admin()?;
    let users = state.services.users.list(&query).await?;
    Ok(Json(users))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    caller.require_self_or_admin(id)?;
    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user))
}

/// Approve a pending account
#[utoipa::path(
    post,
    path = "/users/{id}/approve",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account activated", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn approve_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    caller.require_admin()?;
    Ok(Json(state.services.users.approve(id).await?))
}

/// Reject a pending account
#[utoipa::path(
    post,
    path = "/users/{id}/reject",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account rejected", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn reject_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    caller.require_admin()?;
    Ok(Json(state.services.users.reject(id).await?))
}

/// Disable an account; its open loans stay open
#[utoipa::path(
    post,
    path = "/users/{id}/disable",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Account disabled", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn disable_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    caller.require_admin()?;
    Ok(Json(state.services.users.disable(id).await?))
}

/// Delete a user without borrow history
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User is referenced by borrow records")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;
    state.services.users.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Borrowing history of a user, newest first
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Borrow records", body = Vec<BorrowRecord>),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<Vec<BorrowRecord>>> {
    caller.require_self_or_admin(id)?;
    let loans = state.services.loans.user_loans(id).await?;
    Ok(Json(loans))
}

/// Edit an account (administrators)
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username already used by another account")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(data): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    caller.require_admin()?;
    Ok(Json(state.services.users.update(id, &data).await?))
}

/// Change one's own username, email or password
#[utoipa::path(
    put,
    path = "/users/{id}/settings",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateSettings,
    responses(
        (status = 200, description = "Settings saved", body = User),
        (status = 400, description = "Invalid input or password mismatch"),
        (status = 403, description = "Not your account"),
        (status = 409, description = "Username or email already used by another account")
    )
)]
pub async fn update_settings(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
    Json(data): Json<UpdateSettings>,
) -> AppResult<Json<User>> {
    caller.require_self_or_admin(id)?;
    Ok(Json(state.services.users.update_settings(id, &data).await?))
}

/// Borrower dashboard: shelf availability and the user's loans
#[utoipa::path(
    get,
    path = "/users/{id}/dashboard",
    tag = "users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Dashboard", body = UserDashboard),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_dashboard(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i32>,
) -> AppResult<Json<UserDashboard>> {
    caller.require_self_or_admin(id)?;
    let dashboard = state.services.loans.dashboard(id, Utc::now()).await?;
    Ok(Json(dashboard))
}
