//! Edge-triggered threshold alerts for stock levels and budget consumption.

use chrono::Utc;
use rust_decimal::{prelude::FromPrimitive, Decimal};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::{
    alert::{self, AlertKind, AlertSeverity, Recipients},
    budget, project,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::{AlertFilter, CommittedMovement, Store};

/// Stock crossed into the low zone on a decreasing movement.
///
/// `before > minimum` is the usual case; a drop that stays inside the zone also
/// qualifies so that a fresh alert opens once the previous one was resolved.
pub fn stock_crossed(before: Decimal, after: Decimal, minimum: Decimal) -> bool {
    minimum > Decimal::ZERO && after <= minimum && after < before
}

/// Cost of the consumed quantities, priced at the budgeted unit cost when the
/// material has a budget line and at the catalog price otherwise.
pub fn consumed_cost(
    allocations: &project::Allocations,
    lines: &budget::BudgetLines,
    catalog_price: impl Fn(Uuid) -> Option<Decimal>,
) -> Result<Decimal, ServiceError> {
    allocations.0.iter().try_fold(Decimal::ZERO, |acc, a| {
        let unit = lines
            .unit_cost_for(a.material_id)
            .or_else(|| catalog_price(a.material_id))
            .unwrap_or(Decimal::ZERO);
        a.quantity_consumed
            .checked_mul(unit)
            .and_then(|cost| acc.checked_add(cost))
            .ok_or_else(|| {
                ServiceError::ValidationError("consumed cost is out of range".into())
            })
    })
}

/// Manually raised alert from other collaborators.
#[derive(Debug, Clone)]
pub struct NewAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub recipients: Vec<Uuid>,
}

#[derive(Clone)]
pub struct AlertDetector {
    store: Arc<dyn Store>,
    events: EventSender,
    budget_ratio: Decimal,
}

impl AlertDetector {
    pub fn new(store: Arc<dyn Store>, events: EventSender, budget_ratio: f64) -> Self {
        let budget_ratio = Decimal::from_f64(budget_ratio)
            .unwrap_or_else(|| Decimal::new(8, 1))
            .round_dp(4);
        Self {
            store,
            events,
            budget_ratio,
        }
    }

    /// Active administrators plus the project lead, without duplicates.
    async fn recipients(&self, project_id: Option<Uuid>) -> Result<Vec<Uuid>, ServiceError> {
        let mut recipients = self.store.active_admin_ids().await?;
        if let Some(project_id) = project_id {
            if let Some(lead) = self
                .store
                .find_project(project_id)
                .await?
                .and_then(|p| p.lead_id)
            {
                if !recipients.contains(&lead) {
                    recipients.push(lead);
                }
            }
        }
        Ok(recipients)
    }

    async fn open(&self, alert: alert::Model) -> Result<alert::Model, ServiceError> {
        let alert = self.store.insert_alert(alert).await?;
        metrics::counter!("obra.alerts.opened", 1, "kind" => alert.kind.as_str());
        info!(
            alert_id = %alert.id,
            kind = alert.kind.as_str(),
            project_id = ?alert.project_id,
            material_id = ?alert.material_id,
            recipients = alert.recipients.0.len(),
            "alert opened"
        );
        self.events
            .publish(Event::AlertOpened {
                alert_id: alert.id,
                kind: alert.kind,
                severity: alert.severity,
                project_id: alert.project_id,
                material_id: alert.material_id,
                recipients: alert.recipients.0.clone(),
                message: alert.message.clone(),
            })
            .await;
        Ok(alert)
    }

    /// Opens a stock alert when the movement crossed the material minimum and no
    /// alert is open for the same (project, material) pair.
    #[instrument(skip(self, committed), fields(material_id = %committed.material.id))]
    pub async fn evaluate_stock(
        &self,
        committed: &CommittedMovement,
    ) -> Result<Option<alert::Model>, ServiceError> {
        let material = &committed.material;
        let entry = &committed.entry;
        if !stock_crossed(entry.stock_before, entry.stock_after, material.minimum_stock) {
            return Ok(None);
        }

        if let Some(existing) = self
            .store
            .find_open_alert(AlertKind::Stock, entry.project_id, Some(material.id))
            .await?
        {
            debug!(alert_id = %existing.id, "stock alert already open");
            return Ok(None);
        }

        let severity = if entry.stock_after.is_zero() {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        let mut alert = alert::Model::open(
            AlertKind::Stock,
            severity,
            format!(
                "Stock of {} is {} {} (minimum {})",
                material.name, entry.stock_after, material.unit, material.minimum_stock
            ),
        );
        alert.project_id = entry.project_id;
        alert.material_id = Some(material.id);
        alert.threshold_value = Some(material.minimum_stock);
        alert.observed_value = Some(entry.stock_after);
        alert.created_by = entry.created_by;
        alert.recipients = Recipients(self.recipients(entry.project_id).await?);

        self.open(alert).await.map(Some)
    }

    /// Stock rule wrapper used after writes; failures are logged, never returned.
    pub async fn after_stock_movement(&self, committed: &CommittedMovement) -> Option<alert::Model> {
        match self.evaluate_stock(committed).await {
            Ok(alert) => alert,
            Err(e) => {
                warn!(
                    material_id = %committed.material.id,
                    movement_id = %committed.entry.id,
                    error = %e,
                    "stock alert evaluation failed"
                );
                None
            }
        }
    }

    /// Opens a budget alert when consumed cost reaches the configured share of the
    /// budget total and none is open for the project.
    #[instrument(skip(self))]
    pub async fn evaluate_budget(
        &self,
        project_id: Uuid,
    ) -> Result<Option<alert::Model>, ServiceError> {
        let Some(budget) = self.store.find_budget(project_id).await? else {
            return Ok(None);
        };
        if budget.total <= Decimal::ZERO {
            return Ok(None);
        }
        let project = self
            .store
            .find_project(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {project_id}")))?;

        let mut prices = Vec::new();
        for allocation in &project.materials.0 {
            if budget.lines.unit_cost_for(allocation.material_id).is_none() {
                if let Some(m) = self.store.find_material(allocation.material_id).await? {
                    prices.push((m.id, m.unit_price));
                }
            }
        }
        let cost = consumed_cost(&project.materials, &budget.lines, |id| {
            prices.iter().find(|(m, _)| *m == id).map(|(_, p)| *p)
        })?;

        let ratio = cost.checked_div(budget.total).ok_or_else(|| {
            ServiceError::ValidationError("budget consumption ratio is out of range".into())
        })?;
        if ratio < self.budget_ratio {
            return Ok(None);
        }
        if let Some(existing) = self
            .store
            .find_open_alert(AlertKind::Budget, Some(project_id), None)
            .await?
        {
            debug!(alert_id = %existing.id, "budget alert already open");
            return Ok(None);
        }

        let percent = ratio
            .checked_mul(Decimal::ONE_HUNDRED)
            .unwrap_or(Decimal::MAX)
            .round_dp(2);
        let severity = if ratio >= Decimal::ONE {
            AlertSeverity::Critical
        } else {
            AlertSeverity::Warning
        };
        let mut alert = alert::Model::open(
            AlertKind::Budget,
            severity,
            format!(
                "Project {} has consumed {}% of its budget ({} of {})",
                project.name,
                percent,
                cost.round_dp(2),
                budget.total
            ),
        );
        alert.project_id = Some(project_id);
        alert.threshold_value = Some(self.budget_ratio * Decimal::ONE_HUNDRED);
        alert.observed_value = Some(percent);
        alert.recipients = Recipients(self.recipients(Some(project_id)).await?);

        self.open(alert).await.map(Some)
    }

    /// Budget rule wrapper used after consumption or budget writes.
    pub async fn after_budget_activity(&self, project_id: Uuid) -> Option<alert::Model> {
        match self.evaluate_budget(project_id).await {
            Ok(alert) => alert,
            Err(e) => {
                warn!(%project_id, error = %e, "budget alert evaluation failed");
                None
            }
        }
    }

    #[instrument(skip(self, input))]
    pub async fn raise(&self, input: NewAlert, actor: Actor) -> Result<alert::Model, ServiceError> {
        if input.message.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "alert message is required".into(),
            ));
        }
        let mut recipients = input.recipients;
        if recipients.is_empty() {
            recipients = self.recipients(input.project_id).await?;
        }
        let mut alert = alert::Model::open(input.kind, input.severity, input.message);
        alert.project_id = input.project_id;
        alert.material_id = input.material_id;
        alert.user_id = input.user_id;
        alert.request_id = input.request_id;
        alert.recipients = Recipients(recipients);
        alert.created_by = actor.user_id;
        self.open(alert).await
    }

    pub async fn list(&self, filter: AlertFilter) -> Result<Vec<alert::Model>, ServiceError> {
        self.store.list_alerts(filter).await
    }

    async fn load(&self, id: Uuid) -> Result<alert::Model, ServiceError> {
        self.store
            .find_alert(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("alert {id}")))
    }

    pub async fn mark_seen(&self, id: Uuid) -> Result<alert::Model, ServiceError> {
        let mut alert = self.load(id).await?;
        if alert.seen {
            return Ok(alert);
        }
        alert.mark_seen(Utc::now());
        self.store.update_alert(alert).await
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, id: Uuid, actor: Actor) -> Result<alert::Model, ServiceError> {
        let mut alert = self.load(id).await?;
        if alert.resolved {
            return Ok(alert);
        }
        alert.resolve(Utc::now());
        let alert = self.store.update_alert(alert).await?;
        info!(alert_id = %alert.id, resolved_by = ?actor.user_id, "alert resolved");
        self.events
            .publish(Event::AlertResolved { alert_id: alert.id })
            .await;
        Ok(alert)
    }

    /// Force-resolves every open alert of a project.
    pub async fn resolve_for_project(&self, project_id: Uuid) -> Result<u64, ServiceError> {
        let count = self
            .store
            .resolve_project_alerts(project_id, Utc::now())
            .await?;
        if count > 0 {
            info!(%project_id, count, "open project alerts resolved");
            self.events
                .publish(Event::ProjectAlertsResolved { project_id, count })
                .await;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::project::{Allocation, Allocations};
    use crate::entities::budget::{BudgetLine, BudgetLines};
    use rust_decimal_macros::dec;

    #[test]
    fn crossing_requires_a_positive_minimum_and_a_drop() {
        assert!(stock_crossed(dec!(10), dec!(5), dec!(5)));
        assert!(stock_crossed(dec!(100), dec!(10), dec!(20)));
        assert!(stock_crossed(dec!(5), dec!(3), dec!(5)));
        assert!(!stock_crossed(dec!(10), dec!(6), dec!(5)));
        assert!(!stock_crossed(dec!(3), dec!(4), dec!(5)));
        assert!(!stock_crossed(dec!(10), dec!(0), dec!(0)));
    }

    #[test]
    fn consumed_cost_prefers_budget_price() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let allocation = |material_id, consumed| Allocation {
            material_id,
            quantity_allocated: dec!(10),
            quantity_consumed: consumed,
            allocated_at: Utc::now(),
            movement_id: None,
        };
        let allocations = Allocations(vec![allocation(a, dec!(4)), allocation(b, dec!(2))]);
        let lines = BudgetLines(vec![BudgetLine {
            material_id: a,
            quantity_planned: dec!(10),
            unit_cost_planned: dec!(100),
        }]);
        let cost = consumed_cost(&allocations, &lines, |id| (id == b).then_some(dec!(7)));
        assert_eq!(cost.unwrap(), dec!(414));
    }

    #[test]
    fn consumed_cost_overflow_is_an_error() {
        let a = Uuid::new_v4();
        let allocations = Allocations(vec![Allocation {
            material_id: a,
            quantity_allocated: Decimal::MAX,
            quantity_consumed: Decimal::MAX,
            allocated_at: Utc::now(),
            movement_id: None,
        }]);
        let cost = consumed_cost(&allocations, &BudgetLines::default(), |_| Some(dec!(2)));
        assert!(matches!(cost, Err(ServiceError::ValidationError(_))));
    }
}
