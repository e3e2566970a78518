//! Equipment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub use super::enums::{EquipmentLabel, EquipmentStatus};

/// Equipment catalog record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Equipment {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    /// Category, e.g. "ICT Equipment" or "Office Supplies"
    pub equipment_type: String,
    pub label: EquipmentLabel,
    /// Units currently on the shelf, available for loan
    pub quantity: i32,
    pub status: EquipmentStatus,
    pub image_path: Option<String>,
    /// Incremented on every write
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Equipment {
    pub fn is_borrowable(&self) -> bool {
        self.label == EquipmentLabel::Borrowable
    }
}

/// Create equipment request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEquipment {
    #[validate(length(min = 1, max = 200, message = "Item name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Please select a type"))]
    pub equipment_type: String,
    pub label: EquipmentLabel,
    #[validate(range(min = 0, max = 1_000_000, message = "Quantity must be between 0 and 1000000"))]
    pub quantity: i32,
    pub image_path: Option<String>,
}

/// Update equipment request. Status is not settable: it follows the quantity.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEquipment {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub equipment_type: Option<String>,
    pub label: Option<EquipmentLabel>,
    #[validate(range(min = 0, max = 1_000_000, message = "Quantity must be between 0 and 1000000"))]
    pub quantity: Option<i32>,
    pub image_path: Option<String>,
}

impl UpdateEquipment {
    /// Apply the requested changes onto `equipment`, leaving status untouched
    pub fn apply_to(&self, equipment: &mut Equipment) {
        if let Some(ref name) = self.name {
            equipment.name = name.clone();
        }
        if let Some(ref description) = self.description {
            equipment.description = Some(description.clone());
        }
        if let Some(ref equipment_type) = self.equipment_type {
            equipment.equipment_type = equipment_type.clone();
        }
        if let Some(label) = self.label {
            equipment.label = label;
        }
        if let Some(quantity) = self.quantity {
            equipment.quantity = quantity;
        }
        if let Some(ref image_path) = self.image_path {
            equipment.image_path = Some(image_path.clone());
        }
    }
}

/// Catalog filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct EquipmentQuery {
    /// Case-insensitive match on name or description
    pub search: Option<String>,
    pub equipment_type: Option<String>,
    pub label: Option<EquipmentLabel>,
    pub status: Option<EquipmentStatus>,
    /// Only items a user can borrow right now
    pub borrowable_only: Option<bool>,
}

impl EquipmentQuery {
    pub fn matches(&self, equipment: &Equipment) -> bool {
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let in_name = equipment.name.to_lowercase().contains(&needle);
            let in_description = equipment
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_name && !in_description {
                return false;
            }
        }
        if let Some(ref equipment_type) = self.equipment_type {
            if &equipment.equipment_type != equipment_type {
                return false;
            }
        }
        if self.label.is_some_and(|label| label != equipment.label) {
            return false;
        }
        if self.status.is_some_and(|status| status != equipment.status) {
            return false;
        }
        if self.borrowable_only.unwrap_or(false)
            && !(equipment.is_borrowable() && equipment.quantity > 0)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) fn sample(id: i32, quantity: i32, label: EquipmentLabel) -> Equipment {
    let now = Utc::now();
    Equipment {
        id,
        name: format!("Projector {}", id),
        description: Some("Portable HD projector".to_string()),
        equipment_type: "Audio-Visual Equipment".to_string(),
        label,
        quantity,
        status: EquipmentStatus::project(quantity, 0),
        image_path: None,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}
