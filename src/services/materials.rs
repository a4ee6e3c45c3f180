//! Warehouse and material catalog. Stock itself only moves through the ledger.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::{
    material,
    stock_movement::{self, MovementKind},
    warehouse,
};
use crate::errors::ServiceError;
use crate::repositories::Store;
use crate::services::stock_ledger::{MovementContext, StockLedger};

pub const INITIAL_STOCK_REASON: &str = "initial stock";

#[derive(Debug, Clone, Default)]
pub struct NewMaterial {
    pub name: String,
    pub category: Option<String>,
    pub unit: String,
    pub unit_price: Decimal,
    pub minimum_stock: Decimal,
    pub initial_quantity: Decimal,
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ManualMovement {
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub description: Option<String>,
    pub project_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    ledger: StockLedger,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, ledger: StockLedger) -> Self {
        Self { store, ledger }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub async fn create_warehouse(
        &self,
        name: String,
        location: Option<String>,
    ) -> Result<warehouse::Model, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::ValidationError(
                "warehouse name is required".into(),
            ));
        }
        let warehouse = self
            .store
            .insert_warehouse(warehouse::Model::new(name, location))
            .await?;
        info!(warehouse_id = %warehouse.id, "warehouse created");
        Ok(warehouse)
    }

    pub async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        self.store.list_warehouses().await
    }

    /// Creates a material with zero stock, then books any initial quantity as an
    /// entry so the ledger explains every unit on hand.
    #[instrument(skip(self, input, actor), fields(name = %input.name))]
    pub async fn create_material(
        &self,
        input: NewMaterial,
        actor: Actor,
    ) -> Result<material::Model, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "material name is required".into(),
            ));
        }
        if input.unit.trim().is_empty() {
            return Err(ServiceError::ValidationError("unit is required".into()));
        }
        for (field, value) in [
            ("unit_price", input.unit_price),
            ("minimum_stock", input.minimum_stock),
            ("quantity", input.initial_quantity),
        ] {
            if value < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "{field} must not be negative"
                )));
            }
        }
        if let Some(warehouse_id) = input.warehouse_id {
            if self.store.find_warehouse(warehouse_id).await?.is_none() {
                return Err(ServiceError::NotFound(format!("warehouse {warehouse_id}")));
            }
        }

        let now = Utc::now();
        let material = self
            .store
            .insert_material(material::Model {
                id: Uuid::new_v4(),
                name: input.name.trim().to_string(),
                category: input.category,
                unit: input.unit.trim().to_string(),
                unit_price: input.unit_price,
                quantity: Decimal::ZERO,
                minimum_stock: input.minimum_stock,
                warehouse_id: input.warehouse_id,
                deleted: false,
                created_at: now,
                updated_at: now,
            })
            .await?;
        info!(material_id = %material.id, "material created");

        if input.initial_quantity > Decimal::ZERO {
            self.ledger
                .record(
                    material.id,
                    MovementKind::Entry,
                    input.initial_quantity,
                    MovementContext::new(INITIAL_STOCK_REASON).by(actor.user_id),
                )
                .await?;
            return self.get_material(material.id).await;
        }
        Ok(material)
    }

    pub async fn get_material(&self, id: Uuid) -> Result<material::Model, ServiceError> {
        self.store
            .find_material(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("material {id}")))
    }

    pub async fn list_materials(
        &self,
        include_deleted: bool,
    ) -> Result<Vec<material::Model>, ServiceError> {
        self.store.list_materials(include_deleted).await
    }

    /// Soft delete. Existing allocations and ledger entries keep referring to it.
    #[instrument(skip(self))]
    pub async fn delete_material(&self, id: Uuid) -> Result<material::Model, ServiceError> {
        let mut material = self.get_material(id).await?;
        if material.deleted {
            return Ok(material);
        }
        material.deleted = true;
        material.updated_at = Utc::now();
        let material = self.store.update_material(material).await?;
        info!(material_id = %id, "material deleted");
        Ok(material)
    }

    pub async fn record_movement(
        &self,
        material_id: Uuid,
        input: ManualMovement,
        actor: Actor,
    ) -> Result<stock_movement::Model, ServiceError> {
        let reason = input
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("manual {}", input.kind.as_str()));
        let mut context = MovementContext::new(reason)
            .by(actor.user_id)
            .described(input.description);
        if let Some(project_id) = input.project_id {
            context = context.for_project(project_id);
        }
        self.ledger
            .record(material_id, input.kind, input.quantity, context)
            .await
    }
}
