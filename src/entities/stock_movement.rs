use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    #[sea_orm(string_value = "entry")]
    Entry,
    #[sea_orm(string_value = "exit")]
    Exit,
    #[sea_orm(string_value = "adjustment")]
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Exit => "exit",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Computes the stock after moving `quantity` from `before`.
    ///
    /// Never yields a negative stock: an exit larger than `before` is rejected
    /// before anything is written.
    pub fn apply(&self, before: Decimal, quantity: Decimal) -> Result<Decimal, ServiceError> {
        if quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "{} quantity must not be negative",
                self.as_str()
            )));
        }
        match self {
            MovementKind::Entry => before.checked_add(quantity).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "entry of {quantity} onto stock {before} is out of range"
                ))
            }),
            MovementKind::Exit if quantity > before => Err(ServiceError::InsufficientStock(
                format!("available {before}, requested {quantity}"),
            )),
            MovementKind::Exit => Ok(before - quantity),
            MovementKind::Adjustment => Ok(quantity),
        }
    }

    /// The movement that undoes this one for the same quantity, if any.
    pub fn inverse(&self) -> Option<MovementKind> {
        match self {
            MovementKind::Entry => Some(MovementKind::Exit),
            MovementKind::Exit => Some(MovementKind::Entry),
            MovementKind::Adjustment => None,
        }
    }
}

impl std::str::FromStr for MovementKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "entrada" => Ok(MovementKind::Entry),
            "exit" | "salida" => Ok(MovementKind::Exit),
            "adjustment" | "ajuste" => Ok(MovementKind::Adjustment),
            other => Err(ServiceError::ValidationError(format!(
                "unknown movement kind '{other}'"
            ))),
        }
    }
}

/// Immutable ledger entry. Only `description` may change after creation.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub material_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub project_id: Option<Uuid>,
    pub reason: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::material::Entity",
        from = "Column::MaterialId",
        to = "super::material::Column::Id"
    )]
    Material,
}

impl Related<super::material::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Material.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn entry_and_exit_move_stock() {
        assert_eq!(MovementKind::Entry.apply(dec!(10), dec!(5)).unwrap(), dec!(15));
        assert_eq!(MovementKind::Exit.apply(dec!(10), dec!(10)).unwrap(), dec!(0));
    }

    #[test]
    fn adjustment_forces_stock() {
        assert_eq!(MovementKind::Adjustment.apply(dec!(10), dec!(3)).unwrap(), dec!(3));
        assert_eq!(MovementKind::Adjustment.apply(dec!(10), dec!(0)).unwrap(), dec!(0));
    }

    #[test]
    fn exit_beyond_stock_is_rejected() {
        assert_matches!(
            MovementKind::Exit.apply(dec!(4), dec!(4.5)),
            Err(ServiceError::InsufficientStock(_))
        );
    }

    #[test]
    fn negative_quantity_is_rejected() {
        assert_matches!(
            MovementKind::Entry.apply(dec!(4), dec!(-1)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn entry_overflow_is_a_validation_error() {
        assert_matches!(
            MovementKind::Entry.apply(Decimal::MAX, dec!(1)),
            Err(ServiceError::ValidationError(msg)) if msg.contains("out of range")
        );
    }

    #[test]
    fn parses_spanish_and_english_kinds() {
        assert_eq!("Salida".parse::<MovementKind>().unwrap(), MovementKind::Exit);
        assert_eq!("entry".parse::<MovementKind>().unwrap(), MovementKind::Entry);
        assert!("transfer".parse::<MovementKind>().is_err());
    }
}
