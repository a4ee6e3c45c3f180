//! Persistence seams. Services depend on these traits only; `SeaOrmStore` backs them
//! with a relational database and `InMemoryStore` with process memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::{
    alert::{self, AlertKind},
    budget, material, project,
    stock_movement::{self, MovementKind},
    user, warehouse,
};
use crate::errors::ServiceError;

pub mod memory;
pub mod sea_orm_store;

pub use memory::InMemoryStore;
pub use sea_orm_store::SeaOrmStore;

/// A movement about to be written by [`LedgerStore::commit_movement`].
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub material_id: Uuid,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub project_id: Option<Uuid>,
    pub reason: String,
    pub description: Option<String>,
    pub created_by: Option<Uuid>,
}

impl NewMovement {
    /// Builds the ledger entry for a material whose stock moves from `before` to `after`.
    pub fn into_entry(
        self,
        warehouse_id: Option<Uuid>,
        before: Decimal,
        after: Decimal,
        at: DateTime<Utc>,
    ) -> stock_movement::Model {
        stock_movement::Model {
            id: Uuid::new_v4(),
            material_id: self.material_id,
            warehouse_id,
            kind: self.kind,
            quantity: self.quantity,
            stock_before: before,
            stock_after: after,
            project_id: self.project_id,
            reason: self.reason,
            description: self.description,
            created_by: self.created_by,
            created_at: at,
        }
    }
}

/// Result of a committed movement: the ledger entry and the material as written.
#[derive(Debug, Clone)]
pub struct CommittedMovement {
    pub entry: stock_movement::Model,
    pub material: material::Model,
}

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub kind: Option<AlertKind>,
    pub resolved: Option<bool>,
    pub recipient: Option<Uuid>,
}

impl AlertFilter {
    pub fn matches(&self, alert: &alert::Model) -> bool {
        self.project_id.map_or(true, |id| alert.project_id == Some(id))
            && self.material_id.map_or(true, |id| alert.material_id == Some(id))
            && self.kind.map_or(true, |kind| alert.kind == kind)
            && self.resolved.map_or(true, |resolved| alert.resolved == resolved)
            && self
                .recipient
                .map_or(true, |id| alert.recipients.0.contains(&id))
    }
}

#[async_trait]
pub trait MaterialStore: Send + Sync {
    async fn find_material(&self, id: Uuid) -> Result<Option<material::Model>, ServiceError>;
    async fn list_materials(
        &self,
        include_deleted: bool,
    ) -> Result<Vec<material::Model>, ServiceError>;
    async fn insert_material(
        &self,
        material: material::Model,
    ) -> Result<material::Model, ServiceError>;
    /// Writes catalog fields. Stock is left untouched; it only moves through the ledger.
    async fn update_material(
        &self,
        material: material::Model,
    ) -> Result<material::Model, ServiceError>;
    async fn find_warehouse(&self, id: Uuid) -> Result<Option<warehouse::Model>, ServiceError>;
    async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError>;
    async fn insert_warehouse(
        &self,
        warehouse: warehouse::Model,
    ) -> Result<warehouse::Model, ServiceError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Reads the material stock, applies the movement and appends the ledger entry as
    /// one atomic step. Nothing is written when the movement is rejected.
    async fn commit_movement(
        &self,
        movement: NewMovement,
    ) -> Result<CommittedMovement, ServiceError>;
    async fn find_movement(
        &self,
        id: Uuid,
    ) -> Result<Option<stock_movement::Model>, ServiceError>;
    /// Newest first.
    async fn movements_for_material(
        &self,
        material_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError>;
    /// Newest first; `page` starts at 1. Returns the page and the total count.
    async fn list_movements(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError>;
    async fn annotate_movement(
        &self,
        id: Uuid,
        description: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError>;
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn find_project(&self, id: Uuid) -> Result<Option<project::Model>, ServiceError>;
    async fn list_projects(&self, active_only: bool) -> Result<Vec<project::Model>, ServiceError>;
    async fn insert_project(&self, project: project::Model)
        -> Result<project::Model, ServiceError>;
    /// Full-document replace.
    async fn update_project(&self, project: project::Model)
        -> Result<project::Model, ServiceError>;
    async fn delete_project(&self, id: Uuid) -> Result<(), ServiceError>;
    async fn find_budget(&self, project_id: Uuid) -> Result<Option<budget::Model>, ServiceError>;
    /// Upsert keyed by project.
    async fn save_budget(&self, budget: budget::Model) -> Result<budget::Model, ServiceError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Unresolved alert of `kind` for exactly this (project, material) pair.
    async fn find_open_alert(
        &self,
        kind: AlertKind,
        project_id: Option<Uuid>,
        material_id: Option<Uuid>,
    ) -> Result<Option<alert::Model>, ServiceError>;
    async fn insert_alert(&self, alert: alert::Model) -> Result<alert::Model, ServiceError>;
    async fn find_alert(&self, id: Uuid) -> Result<Option<alert::Model>, ServiceError>;
    async fn update_alert(&self, alert: alert::Model) -> Result<alert::Model, ServiceError>;
    /// Newest first.
    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<alert::Model>, ServiceError>;
    /// Resolves every open alert of the project, returning how many changed.
    async fn resolve_project_alerts(
        &self,
        project_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, ServiceError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError>;
    async fn list_users(&self) -> Result<Vec<user::Model>, ServiceError>;
    async fn insert_user(&self, user: user::Model) -> Result<user::Model, ServiceError>;
    async fn active_admin_ids(&self) -> Result<Vec<Uuid>, ServiceError>;
}

/// Everything the engine needs from persistence.
pub trait Store: MaterialStore + LedgerStore + ProjectStore + AlertStore + UserDirectory {}

impl<T> Store for T where T: MaterialStore + LedgerStore + ProjectStore + AlertStore + UserDirectory
{}
