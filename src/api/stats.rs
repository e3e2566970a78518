//! Statistics endpoints

use axum::{extract::Query, extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{error::AppResult, models::report::ReportSummary, AppState};

use super::Caller;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct StatsQuery {
    /// Evaluate overdue loans as of this instant instead of now
    pub at: Option<DateTime<Utc>>,
}

/// Admin report: stock, accounts, loans and overdue items
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    params(StatsQuery),
    responses(
        (status = 200, description = "Report summary", body = ReportSummary),
        (status = 403, description = "Administrator role required")
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<ReportSummary>> {
    caller.require_admin()?;
    let report = state
        .services
        .stats
        .report(query.at.unwrap_or_else(Utc::now))
        .await?;
    Ok(Json(report))
}
