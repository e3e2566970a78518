//! In-memory backend
//!
//! All three stores share one state behind a single async mutex, so every
//! commit is applied atomically with respect to every other operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::{
    BorrowCommit, Commit, DeleteOutcome, EquipmentRepository, LoanRepository, ReturnCommit,
    UserRepository,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        equipment::{CreateEquipment, Equipment, EquipmentQuery, EquipmentStatus, UpdateEquipment},
        loan::{BorrowRecord, LoanQuery, LoanStatus},
        user::{NewUser, User, UserChanges, UserQuery, UserStatus},
    },
};

#[derive(Debug, Default)]
struct MemoryState {
    equipment: BTreeMap<i32, Equipment>,
    users: BTreeMap<i32, User>,
    records: BTreeMap<i32, BorrowRecord>,
    next_equipment_id: i32,
    next_user_id: i32,
    next_record_id: i32,
}

impl MemoryState {
    fn units_on_loan(&self, equipment_id: i32) -> i64 {
        self.records
            .values()
            .filter(|r| r.equipment_id == equipment_id && r.is_outstanding())
            .map(|r| i64::from(r.quantity))
            .sum()
    }

    fn is_referenced(&self, predicate: impl Fn(&BorrowRecord) -> bool) -> bool {
        self.records.values().any(predicate)
    }
}

/// Process-local store; clones share the same state
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove an equipment row without the referential guard, as an external
    /// catalog tool writing straight to storage would.
    pub async fn purge_equipment(&self, id: i32) -> bool {
        self.state.lock().await.equipment.remove(&id).is_some()
    }
}

#[async_trait]
impl EquipmentRepository for MemoryRepository {
    async fn list(&self, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        let state = self.state.lock().await;
        let mut items: Vec<Equipment> = state
            .equipment
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            (&a.equipment_type, &a.name, a.id).cmp(&(&b.equipment_type, &b.name, b.id))
        });
        Ok(items)
    }

    async fn get_by_id(&self, id: i32) -> AppResult<Option<Equipment>> {
        Ok(self.state.lock().await.equipment.get(&id).cloned())
    }

    async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        let mut state = self.state.lock().await;
        state.next_equipment_id += 1;
        let now = Utc::now();
        let equipment = Equipment {
            id: state.next_equipment_id,
            name: data.name.clone(),
            description: data.description.clone(),
            equipment_type: data.equipment_type.clone(),
            label: data.label,
            quantity: data.quantity,
            status: EquipmentStatus::project(data.quantity, 0),
            image_path: data.image_path.clone(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        state.equipment.insert(equipment.id, equipment.clone());
        Ok(equipment)
    }

    async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Option<Equipment>> {
        let mut state = self.state.lock().await;
        let on_loan = state.units_on_loan(id);
        let Some(equipment) = state.equipment.get_mut(&id) else {
            return Ok(None);
        };
        data.apply_to(equipment);
        equipment.status = EquipmentStatus::project(equipment.quantity, on_loan);
        equipment.version += 1;
        equipment.updated_at = Utc::now();
        Ok(Some(equipment.clone()))
    }

    async fn delete(&self, id: i32) -> AppResult<DeleteOutcome> {
        let mut state = self.state.lock().await;
        if !state.equipment.contains_key(&id) {
            return Ok(DeleteOutcome::NotFound);
        }
        if state.is_referenced(|r| r.equipment_id == id) {
            return Ok(DeleteOutcome::Referenced);
        }
        state.equipment.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn list(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| query.status.map_or(true, |status| u.status == status))
            .cloned()
            .collect();
        users.sort_by(|a, b| {
            let rank = |u: &User| u.status != UserStatus::Pending;
            (rank(a), &a.full_name, a.id).cmp(&(rank(b), &b.full_name, b.id))
        });
        Ok(users)
    }

    async fn identity_taken(&self, username: &str, email: &str) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state.users.values().any(|u| {
            u.username.eq_ignore_ascii_case(username) || u.email.eq_ignore_ascii_case(email)
        }))
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let taken = state.users.values().any(|u| {
            u.username.eq_ignore_ascii_case(&user.username)
                || u.email.eq_ignore_ascii_case(&user.email)
        });
        if taken {
            return Err(AppError::Conflict(
                "Username or email is already registered".to_string(),
            ));
        }
        state.next_user_id += 1;
        let created = User {
            id: state.next_user_id,
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            user_type: user.user_type.clone(),
            email: user.email.clone(),
            status: user.status,
            contact_number: user.contact_number.clone(),
            address: user.address.clone(),
            version: 0,
            created_at: Utc::now(),
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i32, changes: &UserChanges) -> AppResult<Option<User>> {
        let mut state = self.state.lock().await;
        let clash = state.users.values().filter(|u| u.id != id).any(|u| {
            changes
                .username
                .as_deref()
                .is_some_and(|name| u.username.eq_ignore_ascii_case(name))
                || changes
                    .email
                    .as_deref()
                    .is_some_and(|email| u.email.eq_ignore_ascii_case(email))
        });
        if clash {
            return Err(AppError::Conflict(
                "Username or email is already used by another account".to_string(),
            ));
        }
        Ok(state.users.get_mut(&id).map(|user| {
            changes.apply_to(user);
            user.version += 1;
            user.clone()
        }))
    }

    async fn delete(&self, id: i32) -> AppResult<DeleteOutcome> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&id) {
            return Ok(DeleteOutcome::NotFound);
        }
        if state.is_referenced(|r| r.user_id == id) {
            return Ok(DeleteOutcome::Referenced);
        }
        state.users.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl LoanRepository for MemoryRepository {
    async fn get_by_id(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.lock().await.records.get(&id).cloned())
    }

    async fn list(&self, query: &LoanQuery) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowRecord> = state
            .records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.borrow_date, b.id).cmp(&(a.borrow_date, a.id)));
        Ok(records)
    }

    async fn count_outstanding(&self, user_id: i32) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.user_id == user_id && r.is_outstanding())
            .count() as i64)
    }

    async fn commit_borrow(&self, commit: &BorrowCommit) -> AppResult<Commit<BorrowRecord>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let user_current = state
            .users
            .get(&commit.user_id)
            .is_some_and(|u| u.version == commit.user_version);
        let equipment_current = state
            .equipment
            .get(&commit.equipment_id)
            .is_some_and(|e| e.version == commit.equipment_version);
        if !user_current || !equipment_current {
            return Ok(Commit::Stale);
        }

        if let Some(user) = state.users.get_mut(&commit.user_id) {
            user.version += 1;
        }
        if let Some(equipment) = state.equipment.get_mut(&commit.equipment_id) {
            equipment.quantity = commit.quantity_after;
            equipment.status = commit.status_after;
            equipment.version += 1;
            equipment.updated_at = commit.record.borrow_date;
        }

        state.next_record_id += 1;
        let record = BorrowRecord {
            id: state.next_record_id,
            user_id: commit.record.user_id,
            equipment_id: commit.record.equipment_id,
            quantity: commit.record.quantity,
            purpose: commit.record.purpose.clone(),
            borrow_date: commit.record.borrow_date,
            expected_return_date: commit.record.expected_return_date,
            return_date: None,
            status: LoanStatus::Borrowed,
        };
        state.records.insert(record.id, record.clone());
        Ok(Commit::Applied(record))
    }

    async fn commit_return(&self, commit: &ReturnCommit) -> AppResult<Commit<BorrowRecord>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let record_open = state
            .records
            .get(&commit.record_id)
            .is_some_and(|r| r.is_outstanding());
        let equipment_current = match commit.credit {
            Some(ref credit) => state
                .equipment
                .get(&credit.equipment_id)
                .is_some_and(|e| e.version == credit.equipment_version),
            None => true,
        };
        if !record_open || !equipment_current {
            return Ok(Commit::Stale);
        }

        if let Some(ref credit) = commit.credit {
            if let Some(equipment) = state.equipment.get_mut(&credit.equipment_id) {
                equipment.quantity = credit.quantity_after;
                equipment.status = credit.status_after;
                equipment.version += 1;
                equipment.updated_at = commit.returned_at;
            }
        }

        let Some(record) = state.records.get_mut(&commit.record_id) else {
            return Ok(Commit::Stale);
        };
        record.status = LoanStatus::Returned;
        record.return_date = Some(commit.returned_at);
        Ok(Commit::Applied(record.clone()))
    }
}
