//! Loan management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppResult,
    models::loan::{BorrowRecord, CreateLoan, OverdueEntry, OverdueScope},
    services::loans::ReturnOutcome,
    AppState,
};

use super::Caller;

/// Borrow equipment as the calling user
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = BorrowRecord),
        (status = 400, description = "Invalid quantity or return date"),
        (status = 403, description = "Account is not active"),
        (status = 404, description = "User or equipment not found"),
        (status = 409, description = "Concurrent modification, retry"),
        (status = 422, description = "Quota reached, not borrowable or not enough units")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    request.validate()?;
    let record = state
        .services
        .loans
        .borrow(caller.user_id, &request, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Get a borrow record
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(("id" = i32, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Borrow record", body = BorrowRecord),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    caller: Caller,
    Path(record_id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    let record = state.services.loans.get_loan(record_id).await?;
    caller.require_self_or_admin(record.user_id)?;
    Ok(Json(record))
}

/// Return borrowed equipment
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(("id" = i32, Path, description = "Borrow record ID")),
    responses(
        (status = 200, description = "Equipment returned", body = ReturnOutcome),
        (status = 404, description = "Borrow record not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    caller: Caller,
    Path(record_id): Path<i32>,
) -> AppResult<Json<ReturnOutcome>> {
    let record = state.services.loans.get_loan(record_id).await?;
    caller.require_self_or_admin(record.user_id)?;

    let outcome = state
        .services
        .loans
        .return_loan(record_id, Utc::now())
        .await?;
    Ok(Json(outcome))
}

/// Overdue loans: every user's for administrators, the caller's own otherwise
#[utoipa::path(
    get,
    path = "/loans/overdue",
    tag = "loans",
    responses(
        (status = 200, description = "Overdue loans", body = Vec<OverdueEntry>)
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    caller: Caller,
) -> AppResult<Json<Vec<OverdueEntry>>> {
    let scope = if caller.is_admin() {
        OverdueScope::All
    } else {
        OverdueScope::User(caller.user_id)
    };
    let entries: Vec<OverdueEntry> = state
        .services
        .loans
        .compute_overdue(scope, Utc::now())
        .await?
        .collect();
    Ok(Json(entries))
}
