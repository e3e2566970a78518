//! Repository layer: storage traits and their backends
//!
//! The services only see the traits below. Two backends implement them:
//! [`PgRepository`] over PostgreSQL and [`memory::MemoryRepository`], a
//! process-local store used in development and tests.

pub mod equipment;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use sqlx::{Pool, Postgres};

pub use equipment::EquipmentRepository;
pub use loans::{BorrowCommit, Commit, EquipmentCredit, LoanRepository, ReturnCommit};
pub use users::UserRepository;

/// Result of a guarded delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Borrow records still point at the row
    Referenced,
}

/// PostgreSQL backend
#[derive(Clone)]
pub struct PgRepository {
    pool: Pool<Postgres>,
}

impl PgRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Main repository struct handing out the per-entity stores
#[derive(Clone)]
pub struct Repository {
    pub equipment: Arc<dyn EquipmentRepository>,
    pub users: Arc<dyn UserRepository>,
    pub loans: Arc<dyn LoanRepository>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        let pg = Arc::new(PgRepository::new(pool));
        Self {
            equipment: pg.clone(),
            users: pg.clone(),
            loans: pg,
        }
    }

    /// Create a repository backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::from_memory(memory::MemoryRepository::default())
    }

    pub fn from_memory(store: memory::MemoryRepository) -> Self {
        let store = Arc::new(store);
        Self {
            equipment: store.clone(),
            users: store.clone(),
            loans: store,
        }
    }

    /// Assemble a repository from individual stores
    pub fn from_parts(
        equipment: Arc<dyn EquipmentRepository>,
        users: Arc<dyn UserRepository>,
        loans: Arc<dyn LoanRepository>,
    ) -> Self {
        Self {
            equipment,
            users,
            loans,
        }
    }
}
