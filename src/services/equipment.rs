//! Equipment service

use validator::Validate;

use crate::{
    error::{AppResult, LendingError},
    models::equipment::{CreateEquipment, Equipment, EquipmentQuery, UpdateEquipment},
    repository::{DeleteOutcome, Repository},
};

#[derive(Clone)]
pub struct EquipmentService {
    repository: Repository,
}

impl EquipmentService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self, query: &EquipmentQuery) -> AppResult<Vec<Equipment>> {
        self.repository.equipment.list(query).await
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<Equipment> {
        self.repository
            .equipment
            .get_by_id(id)
            .await?
            .ok_or_else(|| LendingError::EquipmentNotFound(id).into())
    }

    pub async fn create(&self, data: &CreateEquipment) -> AppResult<Equipment> {
        data.validate()?;
        let equipment = self.repository.equipment.create(data).await?;
        tracing::info!(equipment_id = equipment.id, name = %equipment.name, "Equipment created");
        Ok(equipment)
    }

    /// Edit catalog fields. Status is recomputed from the resulting quantity.
    pub async fn update(&self, id: i32, data: &UpdateEquipment) -> AppResult<Equipment> {
        data.validate()?;
        self.repository
            .equipment
            .update(id, data)
            .await?
            .ok_or_else(|| LendingError::EquipmentNotFound(id).into())
    }

    /// Delete an item that no borrow record references
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        match self.repository.equipment.delete(id).await? {
            DeleteOutcome::Deleted => {
                tracing::info!(equipment_id = id, "Equipment deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(LendingError::EquipmentNotFound(id).into()),
            DeleteOutcome::Referenced => Err(LendingError::HasActiveReferences {
                entity: "Equipment",
                id,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::equipment::{EquipmentLabel, EquipmentStatus};
    use crate::repository::equipment::MockEquipmentRepository;
    use std::sync::Arc;

    fn service(mock: MockEquipmentRepository) -> EquipmentService {
        let memory = Repository::in_memory();
        EquipmentService::new(Repository::from_parts(
            Arc::new(mock),
            memory.users,
            memory.loans,
        ))
    }

    #[tokio::test]
    async fn test_delete_maps_outcomes() {
        let mut mock = MockEquipmentRepository::new();
        mock.expect_delete().returning(|id| {
            Ok(match id {
                1 => DeleteOutcome::Deleted,
                2 => DeleteOutcome::Referenced,
                _ => DeleteOutcome::NotFound,
            })
        });
        let service = service(mock);

        assert!(service.delete(1).await.is_ok());
        assert!(matches!(
            service.delete(2).await,
            Err(AppError::Lending(LendingError::HasActiveReferences { id: 2, .. }))
        ));
        assert!(matches!(
            service.delete(3).await,
            Err(AppError::Lending(LendingError::EquipmentNotFound(3)))
        ));
    }

    #[tokio::test]
    async fn test_zero_quantity_creates_out_of_stock() {
        let service = EquipmentService::new(Repository::in_memory());
        let created = service
            .create(&CreateEquipment {
                name: "Whiteboard markers".to_string(),
                description: None,
                equipment_type: "Office Supplies".to_string(),
                label: EquipmentLabel::NonBorrowable,
                quantity: 0,
                image_path: None,
            })
            .await
            .unwrap();
        assert_eq!(created.status, EquipmentStatus::OutOfStock);

        let restocked = service
            .update(
                created.id,
                &UpdateEquipment {
                    quantity: Some(12),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(restocked.status, EquipmentStatus::Available);

        let negative = service
            .update(
                created.id,
                &UpdateEquipment {
                    quantity: Some(-1),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(negative, Err(AppError::Validation(_))));

        let oversized = service
            .update(
                created.id,
                &UpdateEquipment {
                    quantity: Some(i32::MAX),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(oversized, Err(AppError::Validation(_))));
        assert_eq!(service.get_by_id(created.id).await.unwrap().quantity, 12);
    }
}
