//! Budget documents: one line set per project, kept consistent with its total and
//! with the project's allocations.

use chrono::Utc;
use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::budget::{self, BudgetLine, BudgetLines};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::Store;
use crate::services::alerts::AlertDetector;
use crate::services::reconciler::{AllocationReconciler, DesiredAllocation, ReconcileOutcome};

/// Submitted budget document.
#[derive(Debug, Clone)]
pub struct SaveBudget {
    pub total: Decimal,
    pub lines: Vec<BudgetLine>,
}

/// Returned when the submitted total did not match the line sum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalAdjustment {
    pub submitted: Decimal,
    pub corrected: Decimal,
    pub note: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetSaved {
    pub budget: budget::Model,
    pub adjustment: Option<TotalAdjustment>,
    pub reconciliation: ReconcileOutcome,
}

/// Total to store for `lines`, and the adjustment when it differs from `submitted`
/// by more than `tolerance`. Without lines the submitted total stands.
pub fn reconcile_total(
    submitted: Decimal,
    lines: &BudgetLines,
    tolerance: Decimal,
) -> Result<(Decimal, Option<TotalAdjustment>), ServiceError> {
    if lines.0.is_empty() {
        return Ok((submitted, None));
    }
    let sum = lines.sum()?;
    let matches = submitted
        .checked_sub(sum)
        .map_or(false, |diff| diff.abs() <= tolerance);
    if matches {
        return Ok((sum, None));
    }
    let adjustment = TotalAdjustment {
        submitted,
        corrected: sum,
        note: format!(
            "Submitted total {submitted} did not match the sum of the lines; total set to {sum}"
        ),
    };
    Ok((sum, Some(adjustment)))
}

fn validate(input: &SaveBudget) -> Result<(), ServiceError> {
    if input.total < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "budget total must not be negative".into(),
        ));
    }
    for line in &input.lines {
        if line.quantity_planned < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "planned quantity for material {} must not be negative",
                line.material_id
            )));
        }
        if line.unit_cost_planned < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "planned cost for material {} must not be negative",
                line.material_id
            )));
        }
    }
    Ok(())
}

#[derive(Clone)]
pub struct BudgetService {
    store: Arc<dyn Store>,
    reconciler: AllocationReconciler,
    alerts: AlertDetector,
    events: EventSender,
    tolerance: Decimal,
}

impl BudgetService {
    pub fn new(
        store: Arc<dyn Store>,
        reconciler: AllocationReconciler,
        alerts: AlertDetector,
        events: EventSender,
        tolerance: f64,
    ) -> Self {
        Self {
            store,
            reconciler,
            alerts,
            events,
            tolerance: Decimal::from_f64(tolerance).unwrap_or(Decimal::new(1, 2)),
        }
    }

    pub async fn get(&self, project_id: Uuid) -> Result<budget::Model, ServiceError> {
        self.store
            .find_budget(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("budget for project {project_id}")))
    }

    /// Stores the budget after reconciling the project's allocations to its lines.
    #[instrument(skip(self, input, actor), fields(lines = input.lines.len()))]
    pub async fn save(
        &self,
        project_id: Uuid,
        input: SaveBudget,
        actor: Actor,
    ) -> Result<BudgetSaved, ServiceError> {
        validate(&input)?;
        if self.store.find_project(project_id).await?.is_none() {
            return Err(ServiceError::NotFound(format!("project {project_id}")));
        }
        for line in &input.lines {
            if self.store.find_material(line.material_id).await?.is_none() {
                return Err(ServiceError::NotFound(format!(
                    "material {}",
                    line.material_id
                )));
            }
        }

        let lines = BudgetLines(input.lines);
        let (total, adjustment) = reconcile_total(input.total, &lines, self.tolerance)?;
        let desired: Vec<DesiredAllocation> = lines
            .0
            .iter()
            .filter(|line| line.quantity_planned > Decimal::ZERO)
            .map(|line| DesiredAllocation {
                material_id: line.material_id,
                quantity: line.quantity_planned,
            })
            .collect();

        let reconciliation = self
            .reconciler
            .reconcile(project_id, &desired, actor)
            .await?;

        let now = Utc::now();
        let budget = self
            .store
            .save_budget(budget::Model {
                id: Uuid::new_v4(),
                project_id,
                total,
                lines,
                updated_by: actor.user_id,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(
            %project_id,
            %total,
            corrected = adjustment.is_some(),
            "budget saved"
        );
        self.events
            .publish(Event::BudgetSaved {
                project_id,
                total,
                corrected: adjustment.is_some(),
            })
            .await;
        self.alerts.after_budget_activity(project_id).await;

        Ok(BudgetSaved {
            budget,
            adjustment,
            reconciliation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(quantity: Decimal, cost: Decimal) -> BudgetLine {
        BudgetLine {
            material_id: Uuid::new_v4(),
            quantity_planned: quantity,
            unit_cost_planned: cost,
        }
    }

    #[test]
    fn mismatched_total_is_corrected_to_line_sum() {
        let lines = BudgetLines(vec![line(dec!(10), dec!(50000)), line(dec!(5), dec!(20000))]);
        let (total, adjustment) = reconcile_total(dec!(1000000), &lines, dec!(0.01)).unwrap();
        assert_eq!(total, dec!(600000));
        let adjustment = adjustment.expect("adjustment note");
        assert_eq!(adjustment.submitted, dec!(1000000));
        assert_eq!(adjustment.corrected, dec!(600000));
    }

    #[test]
    fn rounding_noise_is_tolerated() {
        let lines = BudgetLines(vec![line(dec!(3), dec!(0.333))]);
        let (total, adjustment) = reconcile_total(dec!(1.00), &lines, dec!(0.01)).unwrap();
        assert_eq!(total, dec!(0.999));
        assert!(adjustment.is_none());
    }

    #[test]
    fn without_lines_the_submitted_total_stands() {
        let (total, adjustment) =
            reconcile_total(dec!(250), &BudgetLines::default(), dec!(0.01)).unwrap();
        assert_eq!(total, dec!(250));
        assert!(adjustment.is_none());
    }

    #[test]
    fn oversized_lines_are_rejected_instead_of_overflowing() {
        let huge = dec!(1000000000000000);
        let lines = BudgetLines(vec![line(huge, huge)]);
        assert!(matches!(
            reconcile_total(dec!(1), &lines, dec!(0.01)),
            Err(ServiceError::ValidationError(msg)) if msg.contains("out of range")
        ));

        let lines = BudgetLines(vec![line(Decimal::MAX, dec!(1)), line(dec!(1), dec!(1))]);
        assert!(matches!(lines.sum(), Err(ServiceError::ValidationError(_))));
    }

    #[test]
    fn negative_lines_are_rejected() {
        let input = SaveBudget {
            total: dec!(0),
            lines: vec![line(dec!(-1), dec!(10))],
        };
        assert!(matches!(validate(&input), Err(ServiceError::ValidationError(_))));
    }
}
