use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::stock_movement::{self, MovementKind};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{CommittedMovement, NewMovement, Store};
use crate::services::alerts::AlertDetector;

/// Why a movement happens and on whose behalf.
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub project_id: Option<Uuid>,
    pub reason: String,
    pub description: Option<String>,
    pub actor: Option<Uuid>,
}

impl MovementContext {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn for_project(mut self, project_id: Uuid) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn by(mut self, actor: Option<Uuid>) -> Self {
        self.actor = actor;
        self
    }

    pub fn described(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// Single entry point for stock changes. Every write goes through `record`.
#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn Store>,
    alerts: AlertDetector,
    events: EventSender,
}

impl StockLedger {
    pub fn new(store: Arc<dyn Store>, alerts: AlertDetector, events: EventSender) -> Self {
        Self {
            store,
            alerts,
            events,
        }
    }

    /// Applies a movement to the material stock and appends its ledger entry.
    ///
    /// Entries and exits need a positive quantity; an adjustment sets the stock to
    /// `quantity` and accepts zero. An exit larger than the stock fails with
    /// `InsufficientStock` without writing anything.
    #[instrument(skip(self, context), fields(reason = %context.reason))]
    pub async fn record(
        &self,
        material_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        context: MovementContext,
    ) -> Result<stock_movement::Model, ServiceError> {
        let valid = match kind {
            MovementKind::Adjustment => quantity >= Decimal::ZERO,
            MovementKind::Entry | MovementKind::Exit => quantity > Decimal::ZERO,
        };
        if !valid {
            return Err(ServiceError::ValidationError(format!(
                "invalid {} quantity {}",
                kind.as_str(),
                quantity
            )));
        }

        let committed = self
            .store
            .commit_movement(NewMovement {
                material_id,
                kind,
                quantity,
                project_id: context.project_id,
                reason: context.reason,
                description: context.description,
                created_by: context.actor,
            })
            .await
            .map_err(|e| {
                if matches!(e, ServiceError::InsufficientStock(_)) {
                    metrics::counter!("obra.stock_movements.rejected", 1);
                    warn!(%material_id, %quantity, "exit rejected for insufficient stock");
                }
                e.with_context(format!("material {material_id}"))
            })?;

        metrics::counter!("obra.stock_movements.recorded", 1, "kind" => kind.as_str());
        let CommittedMovement { entry, .. } = &committed;
        info!(
            movement_id = %entry.id,
            %material_id,
            kind = kind.as_str(),
            %quantity,
            stock_before = %entry.stock_before,
            stock_after = %entry.stock_after,
            project_id = ?entry.project_id,
            "stock movement recorded"
        );

        self.events
            .publish(Event::StockMovementRecorded {
                movement_id: entry.id,
                material_id,
                kind,
                quantity,
                stock_after: entry.stock_after,
                project_id: entry.project_id,
            })
            .await;
        self.alerts.after_stock_movement(&committed).await;

        Ok(committed.entry)
    }

    /// Entries for one material, newest first.
    pub async fn history(
        &self,
        material_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        if self.store.find_material(material_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("material {material_id}")));
        }
        self.store.movements_for_material(material_id).await
    }

    /// All entries, newest first.
    pub async fn list(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        self.store.list_movements(page.max(1), limit.max(1)).await
    }

    /// Changes the free-text description, the only mutable field of an entry.
    #[instrument(skip(self, description))]
    pub async fn annotate(
        &self,
        movement_id: Uuid,
        description: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        let description = description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self.store.annotate_movement(movement_id, description).await
    }
}
