use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Quantity of a material reserved for a project.
///
/// `0 <= quantity_consumed <= quantity_allocated` holds for every stored allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub material_id: Uuid,
    pub quantity_allocated: Decimal,
    pub quantity_consumed: Decimal,
    pub allocated_at: DateTime<Utc>,
    /// Ledger entry of the last movement that changed the reservation.
    pub movement_id: Option<Uuid>,
}

impl Allocation {
    pub fn remainder(&self) -> Decimal {
        self.quantity_allocated - self.quantity_consumed
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Allocations(pub Vec<Allocation>);

impl Allocations {
    pub fn find(&self, material_id: Uuid) -> Option<&Allocation> {
        self.0.iter().find(|a| a.material_id == material_id)
    }

    pub fn find_mut(&mut self, material_id: Uuid) -> Option<&mut Allocation> {
        self.0.iter_mut().find(|a| a.material_id == material_id)
    }
}

/// Weighted, completable condition contributing to the progress score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub weight: f64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Criteria(pub Vec<Criterion>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub project_type: String,
    pub priority: String,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub manual_progress: f64,
    /// Last persisted progress total.
    pub progress: i32,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub active: bool,
    #[sea_orm(column_type = "Json")]
    pub materials: Allocations,
    #[sea_orm(column_type = "Json")]
    pub criteria: Criteria,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::budget::Entity")]
    Budget,
}

impl Related<super::budget::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Budget.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
