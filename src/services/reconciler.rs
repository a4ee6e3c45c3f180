//! Converges a project's material allocations to a desired set through the stock
//! ledger. Each ledger step is atomic on its own; the batch is not. A failure part
//! way through is reported as a [`ReconcileError`] listing the committed steps.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::{
    project::{self, Allocation, Allocations},
    stock_movement::{self, MovementKind},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::Store;
use crate::services::alerts::AlertDetector;
use crate::services::stock_ledger::{MovementContext, StockLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredAllocation {
    pub material_id: Uuid,
    pub quantity: Decimal,
}

/// One ledger-level step of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReconcileStep {
    /// Allocation dropped; its unconsumed remainder goes back to stock.
    Release { material_id: Uuid, quantity: Decimal },
    /// Reservation grows from `from` to `to`.
    Increase {
        material_id: Uuid,
        from: Decimal,
        to: Decimal,
    },
    /// Reservation shrinks and the difference returns to stock.
    Decrease {
        material_id: Uuid,
        from: Decimal,
        to: Decimal,
    },
    /// New allocation.
    Reserve { material_id: Uuid, quantity: Decimal },
}

impl ReconcileStep {
    pub fn material_id(&self) -> Uuid {
        match *self {
            ReconcileStep::Release { material_id, .. }
            | ReconcileStep::Increase { material_id, .. }
            | ReconcileStep::Decrease { material_id, .. }
            | ReconcileStep::Reserve { material_id, .. } => material_id,
        }
    }

    /// Ledger movement this step performs.
    pub fn movement(&self) -> (MovementKind, Decimal) {
        match *self {
            ReconcileStep::Release { quantity, .. } => (MovementKind::Entry, quantity),
            ReconcileStep::Increase { from, to, .. } => (MovementKind::Exit, to - from),
            ReconcileStep::Decrease { from, to, .. } => (MovementKind::Entry, from - to),
            ReconcileStep::Reserve { quantity, .. } => (MovementKind::Exit, quantity),
        }
    }

    /// Signed stock delta the step attempts.
    pub fn stock_delta(&self) -> Decimal {
        match self.movement() {
            (MovementKind::Exit, q) => -q,
            (_, q) => q,
        }
    }

    fn takes_stock(&self) -> bool {
        matches!(
            self,
            ReconcileStep::Increase { .. } | ReconcileStep::Reserve { .. }
        )
    }

    fn reason(&self) -> &'static str {
        match self {
            ReconcileStep::Release { .. } => "allocation release",
            ReconcileStep::Increase { .. } => "allocation increase",
            ReconcileStep::Decrease { .. } => "allocation decrease",
            ReconcileStep::Reserve { .. } => "allocation reserve",
        }
    }
}

/// Ordered steps plus the desired quantities they lead to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub steps: Vec<ReconcileStep>,
    /// Materials dropped from the project, including those with nothing to return.
    pub removed: Vec<Uuid>,
    /// Merged desired quantities in first-seen order, zeros excluded.
    pub desired: Vec<(Uuid, Decimal)>,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty() && self.removed.is_empty()
    }
}

/// Diffs current allocations against the desired set, keyed by material.
///
/// Duplicated materials are summed and a quantity of zero removes the material.
/// Steps come out as releases, then quantity changes, then new reservations.
pub fn plan(
    current: &[Allocation],
    desired: &[DesiredAllocation],
) -> Result<ReconciliationPlan, ServiceError> {
    let mut merged: Vec<(Uuid, Decimal)> = Vec::new();
    for item in desired {
        if item.quantity < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "quantity for material {} must not be negative",
                item.material_id
            )));
        }
        match merged.iter_mut().find(|(id, _)| *id == item.material_id) {
            Some((_, qty)) => {
                *qty = qty.checked_add(item.quantity).ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "quantity for material {} is out of range",
                        item.material_id
                    ))
                })?;
            }
            None => merged.push((item.material_id, item.quantity)),
        }
    }
    merged.retain(|(_, qty)| *qty > Decimal::ZERO);
    let wanted: HashMap<Uuid, Decimal> = merged.iter().copied().collect();

    let mut releases = Vec::new();
    let mut changes = Vec::new();
    let mut removed = Vec::new();
    for allocation in current {
        match wanted.get(&allocation.material_id) {
            None => {
                removed.push(allocation.material_id);
                let remainder = allocation.remainder();
                if remainder > Decimal::ZERO {
                    releases.push(ReconcileStep::Release {
                        material_id: allocation.material_id,
                        quantity: remainder,
                    });
                }
            }
            Some(&to) if to > allocation.quantity_allocated => {
                changes.push(ReconcileStep::Increase {
                    material_id: allocation.material_id,
                    from: allocation.quantity_allocated,
                    to,
                });
            }
            Some(&to) if to < allocation.quantity_allocated => {
                changes.push(ReconcileStep::Decrease {
                    material_id: allocation.material_id,
                    from: allocation.quantity_allocated,
                    to,
                });
            }
            Some(_) => {}
        }
    }

    let reserves = merged
        .iter()
        .filter(|(id, _)| !current.iter().any(|a| a.material_id == *id))
        .map(|&(material_id, quantity)| ReconcileStep::Reserve {
            material_id,
            quantity,
        });

    let mut steps = releases;
    steps.extend(changes);
    steps.extend(reserves);

    Ok(ReconciliationPlan {
        steps,
        removed,
        desired: merged,
    })
}

/// Allocation set after a plan has been fully applied.
fn converge(
    current: &Allocations,
    plan: &ReconciliationPlan,
    movements: &HashMap<Uuid, Uuid>,
) -> Allocations {
    let now = Utc::now();
    let wanted: HashMap<Uuid, Decimal> = plan.desired.iter().copied().collect();

    let mut next: Vec<Allocation> = current
        .0
        .iter()
        .filter_map(|a| {
            let quantity = *wanted.get(&a.material_id)?;
            Some(Allocation {
                material_id: a.material_id,
                quantity_allocated: quantity,
                quantity_consumed: a.quantity_consumed.min(quantity),
                allocated_at: a.allocated_at,
                movement_id: movements.get(&a.material_id).copied().or(a.movement_id),
            })
        })
        .collect();

    for &(material_id, quantity) in &plan.desired {
        if current.find(material_id).is_none() {
            next.push(Allocation {
                material_id,
                quantity_allocated: quantity,
                quantity_consumed: Decimal::ZERO,
                allocated_at: now,
                movement_id: movements.get(&material_id).copied(),
            });
        }
    }
    Allocations(next)
}

/// A step that was committed to the ledger before the batch stopped.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedStep {
    pub step: ReconcileStep,
    pub movement: stock_movement::Model,
}

/// Inverse movement undoing a committed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Compensation {
    pub material_id: Uuid,
    pub kind: MovementKind,
    pub quantity: Decimal,
}

/// Partial failure of a reconciliation.
///
/// Steps in `applied` keep their ledger entries and stock changes; the project's
/// allocations were not written.
#[derive(Debug, thiserror::Error)]
#[error(
    "reconciliation of project {project_id} stopped after {} committed step(s): {source}",
    .applied.len()
)]
pub struct ReconcileError {
    pub project_id: Uuid,
    pub failed_step: Option<ReconcileStep>,
    pub source: ServiceError,
    pub applied: Vec<AppliedStep>,
}

impl ReconcileError {
    fn before_writes(project_id: Uuid, source: ServiceError) -> Self {
        Self {
            project_id,
            failed_step: None,
            source,
            applied: Vec::new(),
        }
    }

    /// Movements that undo the committed steps, most recent first.
    pub fn compensations(&self) -> Vec<Compensation> {
        self.applied
            .iter()
            .rev()
            .filter_map(|applied| {
                let movement = &applied.movement;
                Some(Compensation {
                    material_id: movement.material_id,
                    kind: movement.kind.inverse()?,
                    quantity: movement.quantity,
                })
            })
            .collect()
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(err: ReconcileError) -> Self {
        if err.applied.is_empty() {
            return err.source;
        }
        let committed = err.applied.len();
        err.source.with_context(format!(
            "{committed} earlier stock movement(s) for project {} were committed and need manual reconciliation",
            err.project_id
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationChange {
    pub material_id: Uuid,
    pub quantity_moved: Decimal,
    pub quantity_allocated: Decimal,
    pub movement_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub returned: Vec<AllocationChange>,
    pub reserved: Vec<AllocationChange>,
    pub updated: Vec<AllocationChange>,
    #[serde(skip)]
    pub project: project::Model,
}

impl ReconcileOutcome {
    pub fn is_empty(&self) -> bool {
        self.returned.is_empty() && self.reserved.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionOutcome {
    pub allocation: Allocation,
    pub movement: stock_movement::Model,
}

#[derive(Clone)]
pub struct AllocationReconciler {
    store: Arc<dyn Store>,
    ledger: StockLedger,
    alerts: AlertDetector,
    events: EventSender,
}

impl AllocationReconciler {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: StockLedger,
        alerts: AlertDetector,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            ledger,
            alerts,
            events,
        }
    }

    async fn load_project(&self, project_id: Uuid) -> Result<project::Model, ServiceError> {
        self.store
            .find_project(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {project_id}")))
    }

    /// Validation and lookups done before any ledger write.
    async fn check_materials(&self, steps: &[ReconcileStep]) -> Result<(), ServiceError> {
        for step in steps {
            let material_id = step.material_id();
            let material = self
                .store
                .find_material(material_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("material {material_id}")))?;
            if material.deleted && step.takes_stock() {
                return Err(ServiceError::ValidationError(format!(
                    "material {material_id} is deleted and cannot be reserved"
                )));
            }
        }
        Ok(())
    }

    /// Brings the project's allocations to `desired`.
    #[instrument(skip(self, desired, actor), fields(desired = desired.len()))]
    pub async fn reconcile(
        &self,
        project_id: Uuid,
        desired: &[DesiredAllocation],
        actor: Actor,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let project = self
            .load_project(project_id)
            .await
            .map_err(|e| ReconcileError::before_writes(project_id, e))?;
        if !project.active && !desired.is_empty() {
            return Err(ReconcileError::before_writes(
                project_id,
                ServiceError::ValidationError(format!("project {project_id} is inactive")),
            ));
        }

        let plan = plan(&project.materials.0, desired)
            .map_err(|e| ReconcileError::before_writes(project_id, e))?;
        if plan.is_noop() {
            return Ok(ReconcileOutcome {
                returned: Vec::new(),
                reserved: Vec::new(),
                updated: Vec::new(),
                project,
            });
        }
        self.check_materials(&plan.steps)
            .await
            .map_err(|e| ReconcileError::before_writes(project_id, e))?;

        let mut applied: Vec<AppliedStep> = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let (kind, quantity) = step.movement();
            let context = MovementContext::new(step.reason())
                .for_project(project_id)
                .by(actor.user_id);
            match self
                .ledger
                .record(step.material_id(), kind, quantity, context)
                .await
            {
                Ok(movement) => applied.push(AppliedStep {
                    step: *step,
                    movement,
                }),
                Err(source) => return Err(self.abort(project_id, *step, source, applied)),
            }
        }

        let movements: HashMap<Uuid, Uuid> = applied
            .iter()
            .map(|a| (a.step.material_id(), a.movement.id))
            .collect();
        let mut next = project.clone();
        next.materials = converge(&project.materials, &plan, &movements);
        next.updated_at = Utc::now();

        let saved = match self.store.update_project(next).await {
            Ok(saved) => saved,
            Err(source) => {
                error!(
                    %project_id,
                    committed = applied.len(),
                    error = %source,
                    "ledger steps committed but project allocations were not saved"
                );
                metrics::counter!("obra.reconciliations", 1, "outcome" => "partial");
                return Err(ReconcileError {
                    project_id,
                    failed_step: None,
                    source,
                    applied,
                });
            }
        };

        let outcome = summarize(&applied, saved);
        metrics::counter!("obra.reconciliations", 1, "outcome" => "applied");
        info!(
            %project_id,
            returned = outcome.returned.len(),
            reserved = outcome.reserved.len(),
            updated = outcome.updated.len(),
            "allocations reconciled"
        );
        self.events
            .publish(Event::AllocationsReconciled {
                project_id,
                returned: outcome.returned.len(),
                reserved: outcome.reserved.len(),
                updated: outcome.updated.len(),
            })
            .await;
        Ok(outcome)
    }

    fn abort(
        &self,
        project_id: Uuid,
        step: ReconcileStep,
        source: ServiceError,
        applied: Vec<AppliedStep>,
    ) -> ReconcileError {
        metrics::counter!("obra.reconciliations", 1, "outcome" => "partial");
        let committed: Vec<String> = applied
            .iter()
            .map(|a| &a.movement)
            .map(|m| format!("{}:{}:{}", m.material_id, m.kind.as_str(), m.quantity))
            .collect();
        error!(
            %project_id,
            material_id = %step.material_id(),
            attempted_delta = %step.stock_delta(),
            committed = ?committed,
            error = %source,
            "reconciliation aborted; committed movements need manual reconciliation"
        );
        ReconcileError {
            project_id,
            failed_step: Some(step),
            source,
            applied,
        }
    }

    /// Records usage of an allocated material.
    ///
    /// The exit is written to the ledger first; the consumed quantity is stored
    /// only when it succeeded.
    #[instrument(skip(self, actor))]
    pub async fn consume(
        &self,
        project_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
        actor: Actor,
    ) -> Result<ConsumptionOutcome, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "consumed quantity must be positive".into(),
            ));
        }
        let mut project = self.load_project(project_id).await?;
        if !project.active {
            return Err(ServiceError::ValidationError(format!(
                "project {project_id} is inactive"
            )));
        }
        let allocation = project.materials.find(material_id).ok_or_else(|| {
            ServiceError::NotFound(format!(
                "material {material_id} is not allocated to project {project_id}"
            ))
        })?;
        let consumed = allocation
            .quantity_consumed
            .checked_add(quantity)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "consumed quantity for material {material_id} is out of range"
                ))
            })?;
        if consumed > allocation.quantity_allocated {
            return Err(ServiceError::ConsumptionExceedsAllocation(format!(
                "consumed {} + {} exceeds allocated {} for material {}",
                allocation.quantity_consumed, quantity, allocation.quantity_allocated, material_id
            )));
        }

        let context = MovementContext::new("consumption")
            .for_project(project_id)
            .by(actor.user_id);
        let movement = self
            .ledger
            .record(material_id, MovementKind::Exit, quantity, context)
            .await?;

        let allocation = match project.materials.find_mut(material_id) {
            Some(allocation) => {
                allocation.quantity_consumed = consumed;
                allocation.clone()
            }
            None => {
                return Err(ServiceError::InternalError(format!(
                    "allocation for material {material_id} vanished"
                )))
            }
        };
        project.updated_at = Utc::now();
        if let Err(e) = self.store.update_project(project).await {
            error!(
                %project_id,
                %material_id,
                movement_id = %movement.id,
                %quantity,
                error = %e,
                "stock exit committed but consumption was not saved; reconcile manually"
            );
            return Err(e);
        }

        info!(
            %project_id,
            %material_id,
            %quantity,
            consumed = %allocation.quantity_consumed,
            "material consumption recorded"
        );
        self.events
            .publish(Event::MaterialConsumed {
                project_id,
                material_id,
                quantity,
                quantity_consumed: allocation.quantity_consumed,
            })
            .await;
        if let Some(alert) = self.alerts.after_budget_activity(project_id).await {
            warn!(%project_id, alert_id = %alert.id, "budget threshold reached");
        }

        Ok(ConsumptionOutcome {
            allocation,
            movement,
        })
    }
}

fn summarize(applied: &[AppliedStep], project: project::Model) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome {
        returned: Vec::new(),
        reserved: Vec::new(),
        updated: Vec::new(),
        project,
    };
    for AppliedStep { step, movement } in applied {
        let movement_id = Some(movement.id);
        match *step {
            ReconcileStep::Release {
                material_id,
                quantity,
            } => outcome.returned.push(AllocationChange {
                material_id,
                quantity_moved: quantity,
                quantity_allocated: Decimal::ZERO,
                movement_id,
            }),
            ReconcileStep::Increase {
                material_id,
                from,
                to,
            } => outcome.updated.push(AllocationChange {
                material_id,
                quantity_moved: to - from,
                quantity_allocated: to,
                movement_id,
            }),
            ReconcileStep::Decrease {
                material_id,
                from,
                to,
            } => outcome.updated.push(AllocationChange {
                material_id,
                quantity_moved: from - to,
                quantity_allocated: to,
                movement_id,
            }),
            ReconcileStep::Reserve {
                material_id,
                quantity,
            } => outcome.reserved.push(AllocationChange {
                material_id,
                quantity_moved: quantity,
                quantity_allocated: quantity,
                movement_id,
            }),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn allocation(material_id: Uuid, allocated: Decimal, consumed: Decimal) -> Allocation {
        Allocation {
            material_id,
            quantity_allocated: allocated,
            quantity_consumed: consumed,
            allocated_at: Utc::now(),
            movement_id: None,
        }
    }

    fn want(material_id: Uuid, quantity: Decimal) -> DesiredAllocation {
        DesiredAllocation {
            material_id,
            quantity,
        }
    }

    #[test]
    fn removal_releases_unconsumed_remainder() {
        let a = Uuid::new_v4();
        let plan = plan(&[allocation(a, dec!(10), dec!(4))], &[]).unwrap();
        assert_eq!(
            plan.steps,
            vec![ReconcileStep::Release {
                material_id: a,
                quantity: dec!(6)
            }]
        );
        assert_eq!(plan.removed, vec![a]);
    }

    #[test]
    fn fully_consumed_removal_has_no_ledger_step() {
        let a = Uuid::new_v4();
        let plan = plan(&[allocation(a, dec!(5), dec!(5))], &[want(a, dec!(0))]).unwrap();
        assert!(plan.steps.is_empty());
        assert_eq!(plan.removed, vec![a]);
        assert!(!plan.is_noop());
    }

    #[test]
    fn steps_are_ordered_releases_changes_reserves() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let current = [allocation(b, dec!(5), dec!(0)), allocation(a, dec!(3), dec!(1))];
        let plan = plan(&current, &[want(c, dec!(2)), want(b, dec!(8))]).unwrap();
        assert_eq!(
            plan.steps,
            vec![
                ReconcileStep::Release {
                    material_id: a,
                    quantity: dec!(2)
                },
                ReconcileStep::Increase {
                    material_id: b,
                    from: dec!(5),
                    to: dec!(8)
                },
                ReconcileStep::Reserve {
                    material_id: c,
                    quantity: dec!(2)
                },
            ]
        );
    }

    #[test]
    fn decrease_returns_difference_and_clamps_consumed() {
        let a = Uuid::new_v4();
        let plan = plan(&[allocation(a, dec!(10), dec!(6))], &[want(a, dec!(4))]).unwrap();
        let step = plan.steps[0];
        assert_eq!(
            step,
            ReconcileStep::Decrease {
                material_id: a,
                from: dec!(10),
                to: dec!(4)
            }
        );
        assert_eq!(step.movement(), (MovementKind::Entry, dec!(6)));
        assert_eq!(step.stock_delta(), dec!(6));

        let movements = HashMap::new();
        let next = converge(&Allocations(vec![allocation(a, dec!(10), dec!(6))]), &plan, &movements);
        assert_eq!(next.0[0].quantity_allocated, dec!(4));
        assert_eq!(next.0[0].quantity_consumed, dec!(4));
    }

    #[test]
    fn duplicates_are_summed_and_unchanged_is_noop() {
        let a = Uuid::new_v4();
        let plan = plan(
            &[allocation(a, dec!(6), dec!(0))],
            &[want(a, dec!(2)), want(a, dec!(4))],
        )
        .unwrap();
        assert!(plan.is_noop());
        assert_eq!(plan.desired, vec![(a, dec!(6))]);
    }

    #[test]
    fn duplicate_quantities_that_overflow_are_rejected() {
        let a = Uuid::new_v4();
        assert_matches!(
            plan(&[], &[want(a, Decimal::MAX), want(a, dec!(1))]),
            Err(ServiceError::ValidationError(msg)) if msg.contains("out of range")
        );
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let a = Uuid::new_v4();
        assert_matches!(
            plan(&[], &[want(a, dec!(-1))]),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn compensations_invert_committed_movements() {
        let a = Uuid::new_v4();
        let now = Utc::now();
        let entry = stock_movement::Model {
            id: Uuid::new_v4(),
            material_id: a,
            warehouse_id: None,
            kind: MovementKind::Entry,
            quantity: dec!(6),
            stock_before: dec!(0),
            stock_after: dec!(6),
            project_id: None,
            reason: "allocation release".into(),
            description: None,
            created_by: None,
            created_at: now,
        };
        let err = ReconcileError {
            project_id: Uuid::new_v4(),
            failed_step: None,
            source: ServiceError::InsufficientStock("x".into()),
            applied: vec![AppliedStep {
                step: ReconcileStep::Release {
                    material_id: a,
                    quantity: dec!(6),
                },
                movement: entry,
            }],
        };
        assert_eq!(
            err.compensations(),
            vec![Compensation {
                material_id: a,
                kind: MovementKind::Exit,
                quantity: dec!(6)
            }]
        );
        assert_matches!(ServiceError::from(err), ServiceError::InsufficientStock(msg) if msg.contains("manual reconciliation"));
    }
}
