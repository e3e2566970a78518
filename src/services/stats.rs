//! Statistics service

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::{
    error::AppResult,
    models::{
        equipment::{Equipment, EquipmentQuery, EquipmentStatus},
        loan::{BorrowRecord, LoanQuery, LoanStatus},
        report::{OverdueRow, ReportSummary},
        user::{User, UserQuery, UserStatus},
    },
    repository::Repository,
};

/// Number of entries in the most-borrowed ranking
const TOP_BORROWED: usize = 5;

const UNKNOWN: &str = "Unknown";

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Build the admin report as of `now`. Read-only.
    pub async fn report(&self, now: DateTime<Utc>) -> AppResult<ReportSummary> {
        let equipment = self.repository.equipment.list(&EquipmentQuery::default()).await?;
        let users = self.repository.users.list(&UserQuery::default()).await?;
        let records = self.repository.loans.list(&LoanQuery::default()).await?;
        Ok(summarize(&equipment, &users, &records, now))
    }
}

fn count_where<T>(items: &[T], predicate: impl Fn(&T) -> bool) -> i64 {
    items.iter().filter(|item| predicate(item)).count() as i64
}

/// Aggregate the three tables into a [`ReportSummary`]
pub fn summarize(
    equipment: &[Equipment],
    users: &[User],
    records: &[BorrowRecord],
    now: DateTime<Utc>,
) -> ReportSummary {
    let users_by_id: HashMap<i32, &User> = users.iter().map(|u| (u.id, u)).collect();
    let equipment_by_id: HashMap<i32, &Equipment> = equipment.iter().map(|e| (e.id, e)).collect();
    let equipment_name = |id: i32| {
        equipment_by_id
            .get(&id)
            .map_or_else(|| UNKNOWN.to_string(), |e| e.name.clone())
    };

    let mut borrowed_by_user_type: IndexMap<String, i64> = IndexMap::new();
    for record in records.iter().filter(|r| r.is_outstanding()) {
        let user_type = users_by_id
            .get(&record.user_id)
            .and_then(|u| u.user_type.clone())
            .unwrap_or_else(|| UNKNOWN.to_string());
        *borrowed_by_user_type.entry(user_type).or_default() += 1;
    }
    borrowed_by_user_type.sort_by(|ka, va, kb, vb| vb.cmp(va).then_with(|| ka.cmp(kb)));

    let mut top_borrowed_equipment: IndexMap<String, i64> = IndexMap::new();
    for record in records {
        *top_borrowed_equipment
            .entry(equipment_name(record.equipment_id))
            .or_default() += i64::from(record.quantity);
    }
    top_borrowed_equipment.sort_by(|ka, va, kb, vb| vb.cmp(va).then_with(|| ka.cmp(kb)));
    top_borrowed_equipment.truncate(TOP_BORROWED);

    let mut equipment_by_type: IndexMap<String, i64> = IndexMap::new();
    for item in equipment {
        *equipment_by_type.entry(item.equipment_type.clone()).or_default() += 1;
    }
    equipment_by_type.sort_keys();

    let mut borrow_activity: IndexMap<String, i64> = IndexMap::new();
    for record in records {
        let month = record.borrow_date.format("%Y-%m").to_string();
        *borrow_activity.entry(month).or_default() += 1;
    }
    borrow_activity.sort_keys();

    let mut overdue: Vec<OverdueRow> = records
        .iter()
        .filter_map(|record| {
            record.days_overdue(now).map(|days_overdue| OverdueRow {
                record_id: record.id,
                borrower: users_by_id
                    .get(&record.user_id)
                    .map_or_else(|| UNKNOWN.to_string(), |u| u.full_name.clone()),
                equipment: equipment_name(record.equipment_id),
                borrow_date: record.borrow_date,
                expected_return_date: record.expected_return_date,
                days_overdue,
            })
        })
        .collect();
    overdue.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });

    ReportSummary {
        generated_at: now,
        total_equipment: equipment.len() as i64,
        available_equipment: count_where(equipment, |e| e.status == EquipmentStatus::Available),
        borrowable_equipment: count_where(equipment, |e| e.is_borrowable()),
        non_borrowable_equipment: count_where(equipment, |e| !e.is_borrowable()),
        borrowed_records: count_where(records, |r| r.status == LoanStatus::Borrowed),
        returned_records: count_where(records, |r| r.status == LoanStatus::Returned),
        overdue_records: overdue.len() as i64,
        active_users: count_where(users, |u| u.status == UserStatus::Active),
        pending_users: count_where(users, |u| u.status == UserStatus::Pending),
        borrowed_by_user_type,
        top_borrowed_equipment,
        equipment_by_type,
        borrow_activity,
        overdue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{equipment, equipment::EquipmentLabel, user};
    use chrono::{Duration, TimeZone};

    fn record(
        id: i32,
        user_id: i32,
        equipment_id: i32,
        quantity: i32,
        borrow_date: DateTime<Utc>,
        status: LoanStatus,
    ) -> BorrowRecord {
        BorrowRecord {
            id,
            user_id,
            equipment_id,
            quantity,
            purpose: String::new(),
            borrow_date,
            expected_return_date: borrow_date + Duration::days(2),
            return_date: (status == LoanStatus::Returned).then_some(borrow_date + Duration::days(1)),
            status,
        }
    }

    fn named(id: i32, name: &str, kind: &str, quantity: i32, label: EquipmentLabel) -> Equipment {
        let mut item = equipment::sample(id, quantity, label);
        item.name = name.to_string();
        item.equipment_type = kind.to_string();
        item
    }

    #[test]
    fn test_summarize_report() {
        let now = Utc.with_ymd_and_hms(2025, 4, 20, 9, 0, 0).unwrap();
        let march = Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2025, 4, 19, 10, 0, 0).unwrap();

        let equipment = vec![
            named(1, "Projector", "Audio-Visual Equipment", 2, EquipmentLabel::Borrowable),
            named(2, "Laptop", "ICT Equipment", 0, EquipmentLabel::Borrowable),
            named(3, "Stapler", "Office Supplies", 10, EquipmentLabel::NonBorrowable),
        ];
        let mut no_type = user::sample(3, "", UserStatus::Active);
        no_type.user_type = None;
        let users = vec![
            user::sample(1, "Instructor", UserStatus::Active),
            user::sample(2, "Student", UserStatus::Active),
            no_type,
            user::sample(4, "Student", UserStatus::Pending),
        ];
        let records = vec![
            record(1, 1, 1, 2, march, LoanStatus::Borrowed),
            record(2, 2, 2, 1, march, LoanStatus::Returned),
            record(3, 2, 2, 3, april, LoanStatus::Borrowed),
            record(4, 3, 9, 1, april, LoanStatus::Borrowed),
        ];

        let report = summarize(&equipment, &users, &records, now);

        assert_eq!(report.total_equipment, 3);
        assert_eq!(report.borrowable_equipment, 2);
        assert_eq!(report.non_borrowable_equipment, 1);
        assert_eq!(report.borrowed_records, 3);
        assert_eq!(report.returned_records, 1);
        assert_eq!(report.active_users, 3);
        assert_eq!(report.pending_users, 1);

        assert_eq!(report.borrowed_by_user_type["Instructor"], 1);
        assert_eq!(report.borrowed_by_user_type["Student"], 1);
        assert_eq!(report.borrowed_by_user_type["Unknown"], 1);

        let top: Vec<_> = report.top_borrowed_equipment.iter().collect();
        assert_eq!(top[0], (&"Laptop".to_string(), &4));
        assert_eq!(top[1], (&"Projector".to_string(), &2));

        let months: Vec<_> = report.borrow_activity.keys().cloned().collect();
        assert_eq!(months, vec!["2025-03", "2025-04"]);
        assert_eq!(report.borrow_activity["2025-04"], 2);

        // Only record 1 is past due; the April loans are due on the 21st
        assert_eq!(report.overdue_records, 1);
        assert_eq!(report.overdue[0].record_id, 1);
        assert_eq!(report.overdue[0].borrower, "User 1");
        assert_eq!(report.overdue[0].equipment, "Projector");
        assert_eq!(report.overdue[0].days_overdue, 46);
    }

    #[test]
    fn test_top_borrowed_keeps_five() {
        let now = Utc::now();
        let equipment: Vec<_> = (1..=7)
            .map(|id| named(id, &format!("Item {}", id), "Sports Equipment", 5, EquipmentLabel::Borrowable))
            .collect();
        let records: Vec<_> = (1..=7)
            .map(|id| record(id, 1, id, id, now, LoanStatus::Returned))
            .collect();

        let report = summarize(&equipment, &[], &records, now);
        assert_eq!(report.top_borrowed_equipment.len(), 5);
        assert_eq!(report.top_borrowed_equipment.first(), Some((&"Item 7".to_string(), &7)));
        assert_eq!(report.equipment_by_type["Sports Equipment"], 7);
        assert!(report.overdue.is_empty());
    }

    #[tokio::test]
    async fn test_report_leaves_state_untouched() {
        let repository = Repository::in_memory();
        let stats = StatsService::new(repository.clone());
        let first = stats.report(Utc::now()).await.unwrap();
        let second = stats.report(Utc::now()).await.unwrap();
        assert_eq!(first.total_equipment, 0);
        assert_eq!(second.borrowed_records, 0);
    }
}
