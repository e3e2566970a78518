//! Business logic services

pub mod equipment;
pub mod loans;
pub mod stats;
pub mod users;

use crate::{config::LendingConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub equipment: equipment::EquipmentService,
    pub users: users::UsersService,
    pub loans: loans::LoansService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(repository: Repository, lending: &LendingConfig) -> Self {
        Self {
            equipment: equipment::EquipmentService::new(repository.clone()),
            users: users::UsersService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), lending),
            stats: stats::StatsService::new(repository),
        }
    }
}
