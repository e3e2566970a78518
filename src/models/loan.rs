//! Borrow record (loan) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

pub use super::enums::LoanStatus;

/// One loan transaction
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub user_id: i32,
    pub equipment_id: i32,
    pub quantity: i32,
    pub purpose: String,
    pub borrow_date: DateTime<Utc>,
    pub expected_return_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
}

impl BorrowRecord {
    pub fn is_outstanding(&self) -> bool {
        self.status == LoanStatus::Borrowed
    }

    /// Whole days overdue at `now`, or `None` when the loan is not overdue
    pub fn days_overdue(&self, now: DateTime<Utc>) -> Option<i64> {
        if self.is_outstanding() && self.expected_return_date < now {
            Some(days_between(self.expected_return_date, now))
        } else {
            None
        }
    }
}

/// Calendar days from `from` to `to`, ignoring the time of day
pub fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

/// Overdue view of a borrowed record, computed at read time
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OverdueEntry {
    pub record: BorrowRecord,
    pub days_overdue: i64,
}

/// Which borrowers an overdue query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdueScope {
    User(i32),
    All,
}

/// Borrow request body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub equipment_id: i32,
    pub quantity: i32,
    #[validate(length(max = 500))]
    pub purpose: String,
    pub expected_return_date: DateTime<Utc>,
}

/// Row to insert when a borrow commits
#[derive(Debug, Clone)]
pub struct NewBorrowRecord {
    pub user_id: i32,
    pub equipment_id: i32,
    pub quantity: i32,
    pub purpose: String,
    pub borrow_date: DateTime<Utc>,
    pub expected_return_date: DateTime<Utc>,
}

/// Borrow record listing filters
#[derive(Debug, Clone, Default)]
pub struct LoanQuery {
    pub user_id: Option<i32>,
    pub equipment_id: Option<i32>,
    pub status: Option<LoanStatus>,
}

impl LoanQuery {
    pub fn matches(&self, record: &BorrowRecord) -> bool {
        self.user_id.map_or(true, |id| id == record.user_id)
            && self.equipment_id.map_or(true, |id| id == record.equipment_id)
            && self.status.map_or(true, |status| status == record.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn borrowed(expected: DateTime<Utc>) -> BorrowRecord {
        BorrowRecord {
            id: 1,
            user_id: 1,
            equipment_id: 1,
            quantity: 1,
            purpose: "Lecture".to_string(),
            borrow_date: expected - Duration::days(7),
            expected_return_date: expected,
            return_date: None,
            status: LoanStatus::Borrowed,
        }
    }

    #[test]
    fn test_days_overdue_counts_calendar_days() {
        let due = Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap();
        let record = borrowed(due);

        assert_eq!(record.days_overdue(due + Duration::days(3)), Some(3));
        assert_eq!(record.days_overdue(due - Duration::hours(1)), None);
        // Late on the due date itself counts as overdue by zero whole days
        assert_eq!(record.days_overdue(due + Duration::hours(2)), Some(0));
        // Date truncation: 09:00 two days later is still two days
        let next = Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap();
        assert_eq!(record.days_overdue(next), Some(2));
    }

    #[test]
    fn test_returned_records_are_never_overdue() {
        let due = Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap();
        let mut record = borrowed(due);
        record.status = LoanStatus::Returned;
        record.return_date = Some(due + Duration::days(1));
        assert_eq!(record.days_overdue(due + Duration::days(30)), None);
    }

    #[test]
    fn test_loan_query_matches() {
        let record = borrowed(Utc::now());
        assert!(LoanQuery::default().matches(&record));
        let query = LoanQuery {
            user_id: Some(1),
            status: Some(LoanStatus::Returned),
            ..Default::default()
        };
        assert!(!query.matches(&record));
    }
}
