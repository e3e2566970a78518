//! Report summary returned to the admin dashboard

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use utoipa::ToSchema;

use super::loan::{BorrowRecord, OverdueEntry};

/// Aggregated counts over equipment, users and borrow records
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    pub total_equipment: i64,
    pub available_equipment: i64,
    pub borrowable_equipment: i64,
    pub non_borrowable_equipment: i64,
    /// Borrow records still out
    pub borrowed_records: i64,
    pub returned_records: i64,
    pub overdue_records: i64,
    pub active_users: i64,
    pub pending_users: i64,
    /// Outstanding loans per borrower type
    #[schema(value_type = Object)]
    pub borrowed_by_user_type: IndexMap<String, i64>,
    /// Total units ever borrowed, top items first
    #[schema(value_type = Object)]
    pub top_borrowed_equipment: IndexMap<String, i64>,
    #[schema(value_type = Object)]
    pub equipment_by_type: IndexMap<String, i64>,
    /// Borrow count per month (`YYYY-MM`), oldest first
    #[schema(value_type = Object)]
    pub borrow_activity: IndexMap<String, i64>,
    pub overdue: Vec<OverdueRow>,
}

/// A borrower's own view: what is on the shelf and what they hold
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserDashboard {
    pub generated_at: DateTime<Utc>,
    /// Borrowable items with at least one unit on the shelf
    pub available_items: i64,
    pub borrowed_count: i64,
    pub returned_count: i64,
    pub overdue_count: i64,
    pub current_loans: Vec<BorrowRecord>,
    pub overdue_loans: Vec<OverdueEntry>,
}

/// One line of the overdue table
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverdueRow {
    pub record_id: i32,
    pub borrower: String,
    pub equipment: String,
    pub borrow_date: DateTime<Utc>,
    pub expected_return_date: DateTime<Utc>,
    pub days_overdue: i64,
}
