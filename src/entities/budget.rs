use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLine {
    pub material_id: Uuid,
    pub quantity_planned: Decimal,
    pub unit_cost_planned: Decimal,
}

impl BudgetLine {
    pub fn subtotal(&self) -> Result<Decimal, ServiceError> {
        self.quantity_planned
            .checked_mul(self.unit_cost_planned)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "planned cost for material {} is out of range",
                    self.material_id
                ))
            })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct BudgetLines(pub Vec<BudgetLine>);

impl BudgetLines {
    pub fn sum(&self) -> Result<Decimal, ServiceError> {
        self.0.iter().try_fold(Decimal::ZERO, |acc, line| {
            acc.checked_add(line.subtotal()?).ok_or_else(|| {
                ServiceError::ValidationError("budget line total is out of range".into())
            })
        })
    }

    /// Planned unit cost of the first line for `material_id`.
    pub fn unit_cost_for(&self, material_id: Uuid) -> Option<Decimal> {
        self.0
            .iter()
            .find(|line| line.material_id == material_id)
            .map(|line| line.unit_cost_planned)
    }
}

/// One budget per project.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub project_id: Uuid,
    pub total: Decimal,
    #[sea_orm(column_type = "Json")]
    pub lines: BudgetLines,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
