//! Borrow/return engine: quota, availability and overdue accounting
//!
//! Every mutation follows the same cycle: read the user and equipment rows
//! with their version stamps, validate, then hand a [`BorrowCommit`] or
//! [`ReturnCommit`] to the store. The store applies it only if none of the
//! rows moved since they were read; otherwise the cycle starts over, up to
//! `max_commit_attempts` times.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::LendingConfig,
    error::{AppResult, LendingError, LendingWarning},
    models::{
        equipment::{EquipmentQuery, EquipmentStatus},
        report::UserDashboard,
        loan::{
            BorrowRecord, CreateLoan, LoanQuery, LoanStatus, NewBorrowRecord, OverdueEntry,
            OverdueScope,
        },
    },
    repository::{BorrowCommit, Commit, EquipmentCredit, Repository, ReturnCommit},
};

/// Concurrent loan limits keyed by user type
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    default_quota: u32,
    instructor_quota: u32,
    instructor_types: Vec<String>,
}

impl QuotaPolicy {
    pub fn from_config(config: &LendingConfig) -> Self {
        Self {
            default_quota: config.default_quota,
            instructor_quota: config.instructor_quota,
            instructor_types: config.instructor_types.clone(),
        }
    }

    /// Maximum number of loans a user of this type may hold at once
    pub fn max_borrow(&self, user_type: Option<&str>) -> u32 {
        let is_instructor = user_type.is_some_and(|t| {
            self.instructor_types
                .iter()
                .any(|it| it.eq_ignore_ascii_case(t.trim()))
        });
        if is_instructor {
            self.instructor_quota
        } else {
            self.default_quota
        }
    }
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::from_config(&LendingConfig::default())
    }
}

/// Result of a successful return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnOutcome {
    pub record: BorrowRecord,
    pub warning: Option<LendingWarning>,
}

/// Lazy view of the overdue records among a set of borrow records
pub struct OverdueEntries {
    records: std::vec::IntoIter<BorrowRecord>,
    now: DateTime<Utc>,
}

impl OverdueEntries {
    pub fn new(records: Vec<BorrowRecord>, now: DateTime<Utc>) -> Self {
        Self {
            records: records.into_iter(),
            now,
        }
    }
}

impl Iterator for OverdueEntries {
    type Item = OverdueEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let now = self.now;
        self.records.by_ref().find_map(|record| {
            record
                .days_overdue(now)
                .map(|days_overdue| OverdueEntry {
                    record,
                    days_overdue,
                })
        })
    }
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    quota: QuotaPolicy,
    max_commit_attempts: u32,
}

impl LoansService {
    pub fn new(repository: Repository, config: &LendingConfig) -> Self {
        Self {
            repository,
            quota: QuotaPolicy::from_config(config),
            max_commit_attempts: config.max_commit_attempts.max(1),
        }
    }

    /// Borrow `request.quantity` units of an item on behalf of `user_id`
    pub async fn borrow(
        &self,
        user_id: i32,
        request: &CreateLoan,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        if request.quantity <= 0 {
            return Err(LendingError::InvalidQuantity(request.quantity).into());
        }
        if request.expected_return_date <= now {
            return Err(LendingError::ReturnDateNotInFuture.into());
        }

        for attempt in 1..=self.max_commit_attempts {
            let commit = self.validate_borrow(user_id, request, now).await?;
            match self.repository.loans.commit_borrow(&commit).await? {
                Commit::Applied(record) => {
                    tracing::info!(
                        record_id = record.id,
                        user_id,
                        equipment_id = record.equipment_id,
                        quantity = record.quantity,
                        remaining = commit.quantity_after,
                        "Equipment borrowed"
                    );
                    return Ok(record);
                }
                Commit::Stale => {
                    tracing::debug!(attempt, user_id, equipment_id = request.equipment_id, "Borrow commit was stale, retrying");
                }
            }
        }

        tracing::warn!(
            user_id,
            equipment_id = request.equipment_id,
            attempts = self.max_commit_attempts,
            "Borrow abandoned after repeated concurrent modifications"
        );
        Err(LendingError::ConcurrentModification.into())
    }

    async fn validate_borrow(
        &self,
        user_id: i32,
        request: &CreateLoan,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowCommit> {
        let user = self
            .repository
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(LendingError::UserNotFound(user_id))?;
        if !user.is_active() {
            return Err(LendingError::UserNotActive {
                id: user.id,
                status: user.status,
            }
            .into());
        }

        let max_borrow = self.quota.max_borrow(user.user_type.as_deref());
        let currently_borrowed = self.repository.loans.count_outstanding(user_id).await?;
        if currently_borrowed >= i64::from(max_borrow) {
            return Err(LendingError::QuotaExceeded(max_borrow).into());
        }

        let equipment = self
            .repository
            .equipment
            .get_by_id(request.equipment_id)
            .await?
            .ok_or(LendingError::EquipmentNotFound(request.equipment_id))?;
        if !equipment.is_borrowable() {
            return Err(LendingError::NotBorrowable(equipment.id).into());
        }
        if equipment.quantity < request.quantity {
            return Err(LendingError::InsufficientQuantity(equipment.quantity).into());
        }

        let quantity_after = equipment.quantity - request.quantity;
        Ok(BorrowCommit {
            user_id,
            user_version: user.version,
            equipment_id: equipment.id,
            equipment_version: equipment.version,
            quantity_after,
            // this loan is itself on loan, so an emptied shelf reads Borrowed
            status_after: EquipmentStatus::project(quantity_after, i64::from(request.quantity)),
            record: NewBorrowRecord {
                user_id,
                equipment_id: equipment.id,
                quantity: request.quantity,
                purpose: request.purpose.clone(),
                borrow_date: now,
                expected_return_date: request.expected_return_date,
            },
        })
    }

    /// Close a loan and credit its units back to the equipment
    pub async fn return_loan(&self, record_id: i32, now: DateTime<Utc>) -> AppResult<ReturnOutcome> {
        for attempt in 1..=self.max_commit_attempts {
            let record = self.get_loan(record_id).await?;
            if record.status != LoanStatus::Borrowed {
                return Err(LendingError::AlreadyReturned(record_id).into());
            }

            let equipment = self
                .repository
                .equipment
                .get_by_id(record.equipment_id)
                .await?;
            let credit = match equipment {
                Some(e) => {
                    let quantity_after = e
                        .quantity
                        .checked_add(record.quantity)
                        .ok_or(LendingError::QuantityOverflow(e.id))?;
                    Some(EquipmentCredit {
                        equipment_id: e.id,
                        equipment_version: e.version,
                        quantity_after,
                        // quantity_after is positive, other loans cannot change the projection
                        status_after: EquipmentStatus::project(quantity_after, 0),
                    })
                }
                None => None,
            };
            let warning = credit.is_none().then_some(LendingWarning::OrphanedEquipment {
                equipment_id: record.equipment_id,
            });

            let commit = ReturnCommit {
                record_id,
                returned_at: now.max(record.borrow_date),
                credit,
            };
            match self.repository.loans.commit_return(&commit).await? {
                Commit::Applied(record) => {
                    if let Some(ref warning) = warning {
                        tracing::warn!(record_id, "{}", warning);
                    }
                    tracing::info!(
                        record_id,
                        equipment_id = record.equipment_id,
                        quantity = record.quantity,
                        "Equipment returned"
                    );
                    return Ok(ReturnOutcome { record, warning });
                }
                Commit::Stale => {
                    tracing::debug!(attempt, record_id, "Return commit was stale, retrying");
                }
            }
        }

        tracing::warn!(
            record_id,
            attempts = self.max_commit_attempts,
            "Return abandoned after repeated concurrent modifications"
        );
        Err(LendingError::ConcurrentModification.into())
    }

    /// Overdue loans for one user or everyone, as of `now`
    pub async fn compute_overdue(
        &self,
        scope: OverdueScope,
        now: DateTime<Utc>,
    ) -> AppResult<OverdueEntries> {
        let query = LoanQuery {
            user_id: match scope {
                OverdueScope::User(id) => Some(id),
                OverdueScope::All => None,
            },
            status: Some(LoanStatus::Borrowed),
            ..Default::default()
        };
        let records = self.repository.loans.list(&query).await?;
        Ok(OverdueEntries::new(records, now))
    }

    pub async fn get_loan(&self, record_id: i32) -> AppResult<BorrowRecord> {
        self.repository
            .loans
            .get_by_id(record_id)
            .await?
            .ok_or_else(|| LendingError::RecordNotFound(record_id).into())
    }

    /// Full borrowing history of a user, newest first
    pub async fn user_loans(&self, user_id: i32) -> AppResult<Vec<BorrowRecord>> {
        self.repository
            .users
            .get_by_id(user_id)
            .await?
            .ok_or(LendingError::UserNotFound(user_id))?;
        self.repository
            .loans
            .list(&LoanQuery {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
    }

    /// Loans the user still holds
    pub async fn active_loans(&self, user_id: i32) -> AppResult<Vec<BorrowRecord>> {
        self.repository
            .loans
            .list(&LoanQuery {
                user_id: Some(user_id),
                status: Some(LoanStatus::Borrowed),
                ..Default::default()
            })
            .await
    }

    /// Counts and open loans for one borrower, as of `now`
    pub async fn dashboard(&self, user_id: i32, now: DateTime<Utc>) -> AppResult<UserDashboard> {
        let history = self.user_loans(user_id).await?;
        let returned_count = history
            .iter()
            .filter(|r| r.status == LoanStatus::Returned)
            .count() as i64;

        let current_loans = self.active_loans(user_id).await?;
        let overdue_loans: Vec<OverdueEntry> =
            OverdueEntries::new(current_loans.clone(), now).collect();

        let available_items = self
            .repository
            .equipment
            .list(&EquipmentQuery {
                borrowable_only: Some(true),
                ..Default::default()
            })
            .await?
            .len() as i64;

        Ok(UserDashboard {
            generated_at: now,
            available_items,
            borrowed_count: current_loans.len() as i64,
            returned_count,
            overdue_count: overdue_loans.len() as i64,
            current_loans,
            overdue_loans,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{
            equipment::{self, CreateEquipment, Equipment, EquipmentLabel},
            user::{self, NewUser, Role, UserStatus},
        },
        repository::{
            equipment::MockEquipmentRepository, loans::MockLoanRepository,
            memory::MemoryRepository, users::MockUserRepository,
        },
    };
    use chrono::Duration;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    struct Fixture {
        store: MemoryRepository,
        loans: LoansService,
        repository: Repository,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryRepository::new();
            let repository = Repository::from_memory(store.clone());
            let loans = LoansService::new(repository.clone(), &LendingConfig::default());
            Self {
                store,
                loans,
                repository,
            }
        }

        async fn equipment(&self, quantity: i32, label: EquipmentLabel) -> Equipment {
            self.repository
                .equipment
                .create(&CreateEquipment {
                    name: "Projector".to_string(),
                    description: None,
                    equipment_type: "Audio-Visual Equipment".to_string(),
                    label,
                    quantity,
                    image_path: None,
                })
                .await
                .unwrap()
        }

        async fn user(&self, username: &str, user_type: &str, status: UserStatus) -> i32 {
            self.repository
                .users
                .create(&NewUser {
                    full_name: username.to_string(),
                    username: username.to_string(),
                    email: format!("{}@example.edu", username),
                    password_hash: String::new(),
                    role: Role::User,
                    user_type: Some(user_type.to_string()),
                    status,
                    contact_number: None,
                    address: None,
                })
                .await
                .unwrap()
                .id
        }

        async fn quantity_of(&self, id: i32) -> (i32, EquipmentStatus) {
            let e = self.repository.equipment.get_by_id(id).await.unwrap().unwrap();
            (e.quantity, e.status)
        }
    }

    fn request(equipment_id: i32, quantity: i32, now: DateTime<Utc>) -> CreateLoan {
        CreateLoan {
            equipment_id,
            quantity,
            purpose: "Lab session".to_string(),
            expected_return_date: now + Duration::days(3),
        }
    }

    fn lending_error(result: AppResult<impl std::fmt::Debug>) -> LendingError {
        match result {
            Err(AppError::Lending(e)) => e,
            other => panic!("expected a lending error, got {:?}", other),
        }
    }

    #[test]
    fn test_quota_policy() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.max_borrow(Some("Instructor")), 3);
        assert_eq!(policy.max_borrow(Some("instructor ")), 3);
        assert_eq!(policy.max_borrow(Some("Student")), 1);
        assert_eq!(policy.max_borrow(Some("Staff")), 1);
        assert_eq!(policy.max_borrow(None), 1);
    }

    #[tokio::test]
    async fn test_borrow_then_return_scenario() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(5, EquipmentLabel::Borrowable).await;
        let other = fx.equipment(2, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;

        let record = fx.loans.borrow(student, &request(item.id, 2, now), now).await.unwrap();
        assert_eq!(record.status, LoanStatus::Borrowed);
        assert_eq!(record.quantity, 2);
        assert_eq!(record.borrow_date, now);
        assert_eq!(fx.quantity_of(item.id).await, (3, EquipmentStatus::Available));

        let second = fx.loans.borrow(student, &request(other.id, 1, now), now).await;
        assert_eq!(lending_error(second), LendingError::QuotaExceeded(1));
        assert_eq!(fx.quantity_of(other.id).await, (2, EquipmentStatus::Available));

        let later = now + Duration::hours(5);
        let outcome = fx.loans.return_loan(record.id, later).await.unwrap();
        assert_eq!(outcome.record.status, LoanStatus::Returned);
        assert_eq!(outcome.record.return_date, Some(later));
        assert!(outcome.warning.is_none());
        assert_eq!(fx.quantity_of(item.id).await, (5, EquipmentStatus::Available));
    }

    #[tokio::test]
    async fn test_instructor_quota_is_three() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(10, EquipmentLabel::Borrowable).await;
        let instructor = fx.user("turing", "Instructor", UserStatus::Active).await;

        for _ in 0..3 {
            assert_ok!(fx.loans.borrow(instructor, &request(item.id, 1, now), now).await);
        }
        let fourth = fx.loans.borrow(instructor, &request(item.id, 1, now), now).await;
        assert_eq!(lending_error(fourth), LendingError::QuotaExceeded(3));
        assert_eq!(fx.quantity_of(item.id).await.0, 7);
    }

    #[tokio::test]
    async fn test_empty_shelf_is_insufficient_regardless_of_amount() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(0, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;

        for quantity in [1, 4, 100] {
            let result = fx.loans.borrow(student, &request(item.id, quantity, now), now).await;
            assert_eq!(lending_error(result), LendingError::InsufficientQuantity(0));
        }
    }

    #[tokio::test]
    async fn test_emptying_the_shelf_marks_borrowed() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(2, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;

        let record = fx.loans.borrow(student, &request(item.id, 2, now), now).await.unwrap();
        assert_eq!(fx.quantity_of(item.id).await, (0, EquipmentStatus::Borrowed));

        fx.loans.return_loan(record.id, now).await.unwrap();
        assert_eq!(fx.quantity_of(item.id).await, (2, EquipmentStatus::Available));
    }

    #[tokio::test]
    async fn test_validation_failures_leave_state_untouched() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(3, EquipmentLabel::Borrowable).await;
        let fixed = fx.equipment(3, EquipmentLabel::NonBorrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;
        let pending = fx.user("bob", "Student", UserStatus::Pending).await;

        let cases = [
            (student, request(item.id, 0, now), LendingError::InvalidQuantity(0)),
            (student, request(item.id, 4, now), LendingError::InsufficientQuantity(3)),
            (student, request(fixed.id, 1, now), LendingError::NotBorrowable(fixed.id)),
            (student, request(999, 1, now), LendingError::EquipmentNotFound(999)),
            (404, request(item.id, 1, now), LendingError::UserNotFound(404)),
            (
                pending,
                request(item.id, 1, now),
                LendingError::UserNotActive {
                    id: pending,
                    status: UserStatus::Pending,
                },
            ),
        ];
        for (user_id, req, expected) in cases {
            let result = fx.loans.borrow(user_id, &req, now).await;
            assert_eq!(lending_error(result), expected);
        }

        let mut past = request(item.id, 1, now);
        past.expected_return_date = now;
        let result = fx.loans.borrow(student, &past, now).await;
        assert_eq!(lending_error(result), LendingError::ReturnDateNotInFuture);

        assert_eq!(fx.quantity_of(item.id).await, (3, EquipmentStatus::Available));
        assert_eq!(fx.quantity_of(fixed.id).await, (3, EquipmentStatus::Available));
        assert!(fx.loans.user_loans(student).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_return_is_idempotent() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(4, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;
        let record = fx.loans.borrow(student, &request(item.id, 3, now), now).await.unwrap();

        assert_ok!(fx.loans.return_loan(record.id, now).await);
        let again = fx.loans.return_loan(record.id, now).await;
        assert_eq!(lending_error(again), LendingError::AlreadyReturned(record.id));
        assert_eq!(fx.quantity_of(item.id).await.0, 4);

        let missing = fx.loans.return_loan(12345, now).await;
        assert_eq!(lending_error(missing), LendingError::RecordNotFound(12345));
    }

    #[tokio::test]
    async fn test_return_clamps_to_borrow_date() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(1, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;
        let record = fx.loans.borrow(student, &request(item.id, 1, now), now).await.unwrap();

        let outcome = fx
            .loans
            .return_loan(record.id, now - Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(outcome.record.return_date, Some(record.borrow_date));
    }

    #[tokio::test]
    async fn test_return_with_missing_equipment_warns() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(2, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;
        let record = fx.loans.borrow(student, &request(item.id, 1, now), now).await.unwrap();

        assert!(fx.store.purge_equipment(item.id).await);
        let outcome = fx.loans.return_loan(record.id, now).await.unwrap();
        assert_eq!(outcome.record.status, LoanStatus::Returned);
        assert!(outcome.record.return_date.is_some());
        assert_eq!(
            outcome.warning,
            Some(LendingWarning::OrphanedEquipment {
                equipment_id: item.id
            })
        );
    }

    #[tokio::test]
    async fn test_conservation_across_borrows_and_returns() {
        let fx = Fixture::new();
        let now = Utc::now();
        let catalog_quantity = 9;
        let item = fx.equipment(catalog_quantity, EquipmentLabel::Borrowable).await;
        let mut open = Vec::new();
        for (i, user_type) in ["Instructor", "Student", "Instructor", "Staff"].iter().enumerate() {
            let user = fx.user(&format!("u{}", i), user_type, UserStatus::Active).await;
            let record = fx.loans.borrow(user, &request(item.id, 2, now), now).await.unwrap();
            open.push(record.id);
        }

        assert_conserved(&fx, item.id, catalog_quantity, 4).await;
        fx.loans.return_loan(open[1], now).await.unwrap();
        assert_conserved(&fx, item.id, catalog_quantity, 3).await;
        fx.loans.return_loan(open[3], now).await.unwrap();
        assert_err!(fx.loans.return_loan(open[3], now).await);
        assert_conserved(&fx, item.id, catalog_quantity, 2).await;
    }

    #[tokio::test]
    async fn test_return_refuses_to_overflow_stock() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(2, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;
        let record = fx.loans.borrow(student, &request(item.id, 1, now), now).await.unwrap();

        fx.repository
            .equipment
            .update(
                item.id,
                &equipment::UpdateEquipment {
                    quantity: Some(i32::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let result = fx.loans.return_loan(record.id, now).await;
        assert_eq!(lending_error(result), LendingError::QuantityOverflow(item.id));
        assert_eq!(fx.loans.get_loan(record.id).await.unwrap().status, LoanStatus::Borrowed);
        assert_eq!(fx.quantity_of(item.id).await.0, i32::MAX);
    }

    async fn assert_conserved(fx: &Fixture, equipment_id: i32, total: i32, expected_open: usize) {
        let records = fx
            .repository
            .loans
            .list(&LoanQuery {
                equipment_id: Some(equipment_id),
                status: Some(LoanStatus::Borrowed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(records.len(), expected_open);
        let on_loan: i32 = records.iter().map(|r| r.quantity).sum();
        let (quantity, _) = fx.quantity_of(equipment_id).await;
        assert_eq!(quantity + on_loan, total);
    }

    #[tokio::test]
    async fn test_overdue_is_derived_at_read_time() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(3, EquipmentLabel::Borrowable).await;
        let amy = fx.user("amy", "Student", UserStatus::Active).await;
        let bob = fx.user("bob", "Student", UserStatus::Active).await;

        let due = now + Duration::days(3);
        let mut req = request(item.id, 1, now);
        req.expected_return_date = due;
        let amys = fx.loans.borrow(amy, &req, now).await.unwrap();
        let bobs = fx.loans.borrow(bob, &req, now).await.unwrap();
        fx.loans.return_loan(bobs.id, now).await.unwrap();

        let before: Vec<_> = fx
            .loans
            .compute_overdue(OverdueScope::All, due - Duration::hours(1))
            .await
            .unwrap()
            .collect();
        assert!(before.is_empty());

        let after: Vec<_> = fx
            .loans
            .compute_overdue(OverdueScope::User(amy), due + Duration::days(3))
            .await
            .unwrap()
            .collect();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].record.id, amys.id);
        assert_eq!(after[0].days_overdue, 3);

        // Nothing was persisted by the overdue query
        let stored = fx.loans.get_loan(amys.id).await.unwrap();
        assert_eq!(stored.status, LoanStatus::Borrowed);

        let none_for_bob = fx
            .loans
            .compute_overdue(OverdueScope::User(bob), due + Duration::days(3))
            .await
            .unwrap()
            .count();
        assert_eq!(none_for_bob, 0);
    }

    #[tokio::test]
    async fn test_dashboard_counts_for_one_borrower() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(1, EquipmentLabel::Borrowable).await;
        fx.equipment(1, EquipmentLabel::Borrowable).await;
        fx.equipment(4, EquipmentLabel::NonBorrowable).await;
        fx.equipment(0, EquipmentLabel::Borrowable).await;
        let teacher = fx.user("ida", "Instructor", UserStatus::Active).await;
        let other = fx.user("bob", "Student", UserStatus::Active).await;

        let first = fx.loans.borrow(teacher, &request(item.id, 1, now), now).await.unwrap();
        fx.loans.return_loan(first.id, now).await.unwrap();
        let held = fx.loans.borrow(teacher, &request(item.id, 1, now), now).await.unwrap();
        let dashboard = fx.loans.dashboard(teacher, now + Duration::days(5)).await.unwrap();

        assert_eq!(dashboard.available_items, 1);
        assert_eq!(dashboard.borrowed_count, 1);
        assert_eq!(dashboard.returned_count, 1);
        assert_eq!(dashboard.overdue_count, 1);
        assert_eq!(dashboard.current_loans[0].id, held.id);
        assert_eq!(dashboard.overdue_loans[0].days_overdue, 2);

        let idle = fx.loans.dashboard(other, now).await.unwrap();
        assert_eq!(idle.borrowed_count, 0);
        assert!(idle.current_loans.is_empty());

        let missing = fx.loans.dashboard(999, now).await;
        assert_eq!(lending_error(missing), LendingError::UserNotFound(999));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrows_never_overdraw() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(5, EquipmentLabel::Borrowable).await;
        let amy = fx.user("amy", "Student", UserStatus::Active).await;
        let bob = fx.user("bob", "Student", UserStatus::Active).await;

        let first = {
            let loans = fx.loans.clone();
            let req = request(item.id, 3, now);
            tokio::spawn(async move { loans.borrow(amy, &req, now).await })
        };
        let second = {
            let loans = fx.loans.clone();
            let req = request(item.id, 3, now);
            tokio::spawn(async move { loans.borrow(bob, &req, now).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        let failure = results.into_iter().find(|r| r.is_err()).unwrap();
        assert_eq!(lending_error(failure), LendingError::InsufficientQuantity(2));
        assert_eq!(fx.quantity_of(item.id).await, (2, EquipmentStatus::Available));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_borrowers_conserve_quantity() {
        let fx = Fixture::new();
        let now = Utc::now();
        let item = fx.equipment(5, EquipmentLabel::Borrowable).await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let user = fx.user(&format!("s{}", i), "Student", UserStatus::Active).await;
            let loans = fx.loans.clone();
            let req = request(item.id, 1, now);
            handles.push(tokio::spawn(async move { loans.borrow(user, &req, now).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(AppError::Lending(LendingError::InsufficientQuantity(_)))
                | Err(AppError::Lending(LendingError::ConcurrentModification)) => {}
                Err(other) => panic!("unexpected error: {:?}", other),
            }
        }

        let (quantity, status) = fx.quantity_of(item.id).await;
        assert!(succeeded <= 5);
        assert!(quantity >= 0);
        assert_eq!(quantity, 5 - succeeded);
        assert_eq!(status, EquipmentStatus::project(quantity, i64::from(succeeded)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_borrower_racing_for_two_items_gets_one() {
        let fx = Fixture::new();
        let now = Utc::now();
        let projector = fx.equipment(3, EquipmentLabel::Borrowable).await;
        let laptop = fx.equipment(3, EquipmentLabel::Borrowable).await;
        let student = fx.user("amy", "Student", UserStatus::Active).await;

        let handles: Vec<_> = [projector.id, laptop.id]
            .into_iter()
            .map(|equipment_id| {
                let loans = fx.loans.clone();
                let req = request(equipment_id, 1, now);
                tokio::spawn(async move { loans.borrow(student, &req, now).await })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let failure = results.into_iter().find(|r| r.is_err()).unwrap();
        assert_eq!(lending_error(failure), LendingError::QuotaExceeded(1));

        let open = fx.loans.active_loans(student).await.unwrap();
        assert_eq!(open.len(), 1);
        let on_shelf = fx.quantity_of(projector.id).await.0 + fx.quantity_of(laptop.id).await.0;
        assert_eq!(on_shelf, 5);
    }

    fn mocked(
        users: MockUserRepository,
        equipment: MockEquipmentRepository,
        loans: MockLoanRepository,
    ) -> LoansService {
        let repository =
            Repository::from_parts(Arc::new(equipment), Arc::new(users), Arc::new(loans));
        LoansService::new(repository, &LendingConfig::default())
    }

    fn applied(commit: &BorrowCommit) -> Commit<BorrowRecord> {
        Commit::Applied(BorrowRecord {
            id: 77,
            user_id: commit.record.user_id,
            equipment_id: commit.record.equipment_id,
            quantity: commit.record.quantity,
            purpose: commit.record.purpose.clone(),
            borrow_date: commit.record.borrow_date,
            expected_return_date: commit.record.expected_return_date,
            return_date: None,
            status: LoanStatus::Borrowed,
        })
    }

    #[tokio::test]
    async fn test_stale_commits_are_retried_with_fresh_reads() {
        let now = Utc::now();
        let mut users = MockUserRepository::new();
        users
            .expect_get_by_id()
            .times(3)
            .returning(|id| Ok(Some(user::sample(id, "Student", UserStatus::Active))));

        let mut equipment = MockEquipmentRepository::new();
        let mut reads = 0;
        equipment.expect_get_by_id().times(3).returning(move |id| {
            reads += 1;
            let mut item = equipment::sample(id, 5, EquipmentLabel::Borrowable);
            item.version = reads;
            Ok(Some(item))
        });

        let mut loans = MockLoanRepository::new();
        loans.expect_count_outstanding().times(3).returning(|_| Ok(0));
        let mut commits = 0;
        loans
            .expect_commit_borrow()
            .times(3)
            .returning(move |commit| {
                commits += 1;
                assert_eq!(commit.equipment_version, commits);
                if commits < 3 {
                    Ok(Commit::Stale)
                } else {
                    Ok(applied(commit))
                }
            });

        let service = mocked(users, equipment, loans);
        let record = service.borrow(1, &request(2, 1, now), now).await.unwrap();
        assert_eq!(record.id, 77);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_concurrent_modification() {
        let now = Utc::now();
        let attempts = LendingConfig::default().max_commit_attempts as usize;

        let mut users = MockUserRepository::new();
        users
            .expect_get_by_id()
            .returning(|id| Ok(Some(user::sample(id, "Instructor", UserStatus::Active))));
        let mut equipment = MockEquipmentRepository::new();
        equipment
            .expect_get_by_id()
            .returning(|id| Ok(Some(equipment::sample(id, 5, EquipmentLabel::Borrowable))));
        let mut loans = MockLoanRepository::new();
        loans.expect_count_outstanding().returning(|_| Ok(0));
        loans
            .expect_commit_borrow()
            .times(attempts)
            .returning(|_| Ok(Commit::Stale));

        let service = mocked(users, equipment, loans);
        let result = service.borrow(1, &request(2, 1, now), now).await;
        let error = lending_error(result);
        assert_eq!(error, LendingError::ConcurrentModification);
        assert!(error.is_retryable());
    }
}
