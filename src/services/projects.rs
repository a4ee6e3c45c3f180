use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::auth::Actor;
use crate::entities::project::{self, Allocations, Criteria, Criterion};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::Store;
use crate::services::alerts::AlertDetector;
use crate::services::progress::{ProgressBreakdown, ProgressEngine, ProgressReport};
use crate::services::reconciler::{AllocationReconciler, DesiredAllocation, ReconcileOutcome};

pub const DEFAULT_STATUS: &str = "planning";

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub project_type: String,
    pub priority: String,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub manual_progress: Option<f64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    /// Explicit criteria; seeded from the catalog when absent.
    pub criteria: Option<Vec<Criterion>>,
    pub materials: Vec<DesiredAllocation>,
}

/// Partial update. `materials`, when present, is the full desired allocation set.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub project_type: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub manual_progress: Option<f64>,
    pub lead_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub criteria: Option<Vec<Criterion>>,
    pub materials: Option<Vec<DesiredAllocation>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectChanged {
    pub project: project::Model,
    pub reconciliation: Option<ReconcileOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressView {
    pub project_id: Uuid,
    pub total: u8,
    pub breakdown: ProgressBreakdown,
    pub previous: i32,
    /// Whether the stored progress now matches `total`.
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deactivation {
    pub project: project::Model,
    pub reconciliation: ReconcileOutcome,
    pub alerts_resolved: u64,
}

fn validate_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::ValidationError(
            "project name is required".into(),
        ));
    }
    Ok(())
}

fn validate_schedule(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ServiceError::ValidationError(
            "end date must not precede start date".into(),
        )),
        _ => Ok(()),
    }
}

fn validate_manual(manual: Option<f64>) -> Result<(), ServiceError> {
    match manual {
        Some(v) if !(0.0..=100.0).contains(&v) => Err(ServiceError::ValidationError(format!(
            "manual progress {v} must be between 0 and 100"
        ))),
        _ => Ok(()),
    }
}

fn validate_criteria(criteria: &[Criterion]) -> Result<(), ServiceError> {
    for (i, c) in criteria.iter().enumerate() {
        if c.code.trim().is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "criterion {i} has no code"
            )));
        }
        if !c.weight.is_finite() || c.weight < 0.0 {
            return Err(ServiceError::ValidationError(format!(
                "criterion {} has an invalid weight",
                c.code
            )));
        }
        if criteria[..i].iter().any(|other| other.code == c.code) {
            return Err(ServiceError::ValidationError(format!(
                "criterion {} is repeated",
                c.code
            )));
        }
    }
    Ok(())
}

/// Completion dates for `next`: an explicit date wins, then the stored date of a
/// criterion with the same code that was already completed, then `now`.
fn carry_completion(
    previous: &[Criterion],
    next: Vec<Criterion>,
    now: DateTime<Utc>,
) -> Vec<Criterion> {
    next.into_iter()
        .map(|mut c| {
            c.completed_at = if c.completed {
                c.completed_at.or_else(|| {
                    previous
                        .iter()
                        .find(|p| p.code == c.code && p.completed)
                        .and_then(|p| p.completed_at)
                        .or(Some(now))
                })
            } else {
                None
            };
            c
        })
        .collect()
}

/// Applies the scalar fields of a patch. Allocations are left to the reconciler.
fn apply_patch(project: &mut project::Model, patch: ProjectPatch, now: DateTime<Utc>) {
    if let Some(name) = patch.name {
        project.name = name.trim().to_string();
    }
    if let Some(project_type) = patch.project_type {
        project.project_type = project_type;
    }
    if let Some(priority) = patch.priority {
        project.priority = priority;
    }
    if let Some(status) = patch.status {
        project.status = status;
    }
    if let Some(start) = patch.start_date {
        project.start_date = Some(start);
    }
    if let Some(end) = patch.end_date {
        project.end_date = Some(end);
    }
    if let Some(manual) = patch.manual_progress {
        project.manual_progress = manual;
    }
    if let Some(lead) = patch.lead_id {
        project.lead_id = Some(lead);
    }
    if let Some(client) = patch.client_id {
        project.client_id = Some(client);
    }
    if let Some(criteria) = patch.criteria {
        project.criteria = Criteria(carry_completion(&project.criteria.0, criteria, now));
    }
}

/// A project scored on read, with the stored total it replaced.
struct Rescored {
    project: project::Model,
    report: ProgressReport,
    previous: i32,
    persisted: bool,
}

#[derive(Clone)]
pub struct ProjectService {
    store: Arc<dyn Store>,
    reconciler: AllocationReconciler,
    alerts: AlertDetector,
    progress: ProgressEngine,
    events: EventSender,
}

impl ProjectService {
    pub fn new(
        store: Arc<dyn Store>,
        reconciler: AllocationReconciler,
        alerts: AlertDetector,
        progress: ProgressEngine,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            reconciler,
            alerts,
            progress,
            events,
        }
    }

    pub fn engine(&self) -> &ProgressEngine {
        &self.progress
    }

    async fn load(&self, id: Uuid) -> Result<project::Model, ServiceError> {
        self.store
            .find_project(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {id}")))
    }

    /// Sets the stored progress to the current score before a write.
    fn score_into(&self, project: &mut project::Model, now: DateTime<Utc>) {
        project.progress = i32::from(self.progress.score(project, now).total);
    }

    /// Scores the project and stores the total when it changed. A failed write is
    /// logged; the returned project still carries the fresh total.
    async fn rescore(&self, mut project: project::Model) -> Rescored {
        let now = Utc::now();
        let report = self.progress.score(&project, now);
        let previous = project.progress;
        let current = i32::from(report.total);
        let id = project.id;

        let mut persisted = previous == current;
        if !persisted {
            project.progress = current;
            project.updated_at = now;
            match self.store.update_project(project.clone()).await {
                Ok(saved) => {
                    project = saved;
                    persisted = true;
                    self.events
                        .publish(Event::ProgressRecomputed {
                            project_id: id,
                            previous,
                            current,
                        })
                        .await;
                }
                Err(e) => {
                    error!(project_id = %id, previous, current, error = %e, "failed to persist progress");
                }
            }
        }

        Rescored {
            project,
            report,
            previous,
            persisted,
        }
    }

    /// The project with its progress scored at read time.
    pub async fn get(&self, id: Uuid) -> Result<project::Model, ServiceError> {
        let project = self.load(id).await?;
        Ok(self.rescore(project).await.project)
    }

    pub async fn list(&self, active_only: bool) -> Result<Vec<project::Model>, ServiceError> {
        let mut projects = Vec::new();
        for project in self.store.list_projects(active_only).await? {
            projects.push(self.rescore(project).await.project);
        }
        Ok(projects)
    }

    #[instrument(skip(self, input, actor), fields(name = %input.name))]
    pub async fn create(
        &self,
        input: NewProject,
        actor: Actor,
    ) -> Result<ProjectChanged, ServiceError> {
        validate_name(&input.name)?;
        validate_schedule(input.start_date, input.end_date)?;
        validate_manual(input.manual_progress)?;
        let now = Utc::now();
        let criteria = match input.criteria {
            Some(criteria) => {
                validate_criteria(&criteria)?;
                carry_completion(&[], criteria, now)
            }
            None => self
                .progress
                .generate_criteria(&input.project_type, &input.priority),
        };

        let mut project = project::Model {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            project_type: input.project_type,
            priority: input.priority,
            status: input.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            start_date: input.start_date,
            end_date: input.end_date,
            manual_progress: input.manual_progress.unwrap_or(0.0),
            progress: 0,
            lead_id: input.lead_id,
            client_id: input.client_id,
            active: true,
            materials: Allocations::default(),
            criteria: Criteria(criteria),
            created_at: now,
            updated_at: now,
        };
        self.score_into(&mut project, now);
        let project = self.store.insert_project(project).await?;
        info!(project_id = %project.id, criteria = project.criteria.0.len(), "project created");

        if input.materials.is_empty() {
            return Ok(ProjectChanged {
                project,
                reconciliation: None,
            });
        }
        let outcome = self
            .reconciler
            .reconcile(project.id, &input.materials, actor)
            .await?;
        Ok(ProjectChanged {
            project: outcome.project.clone(),
            reconciliation: Some(outcome),
        })
    }

    /// Applies a partial update. Allocations are reconciled first so that a failed
    /// reconciliation leaves the other fields untouched.
    #[instrument(skip(self, patch, actor))]
    pub async fn update(
        &self,
        id: Uuid,
        mut patch: ProjectPatch,
        actor: Actor,
    ) -> Result<ProjectChanged, ServiceError> {
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }
        validate_manual(patch.manual_progress)?;
        if let Some(criteria) = &patch.criteria {
            validate_criteria(criteria)?;
        }
        let current = self.load(id).await?;
        validate_schedule(
            patch.start_date.or(current.start_date),
            patch.end_date.or(current.end_date),
        )?;

        let (mut project, reconciliation) = match patch.materials.take() {
            Some(desired) => {
                let outcome = self.reconciler.reconcile(id, &desired, actor).await?;
                (outcome.project.clone(), Some(outcome))
            }
            None => (current, None),
        };

        let now = Utc::now();
        apply_patch(&mut project, patch, now);
        self.score_into(&mut project, now);
        project.updated_at = now;
        let project = self.store.update_project(project).await?;
        info!(project_id = %id, "project updated");
        Ok(ProjectChanged {
            project,
            reconciliation,
        })
    }

    /// Marks a criterion completed or not. Completion only changes through this call.
    #[instrument(skip(self))]
    pub async fn set_criterion(
        &self,
        id: Uuid,
        code: &str,
        completed: bool,
    ) -> Result<project::Model, ServiceError> {
        let mut project = self.load(id).await?;
        let criterion = project
            .criteria
            .0
            .iter_mut()
            .find(|c| c.code == code)
            .ok_or_else(|| ServiceError::NotFound(format!("criterion {code} of project {id}")))?;
        if criterion.completed == completed {
            return Ok(project);
        }
        let now = Utc::now();
        criterion.completed = completed;
        criterion.completed_at = completed.then_some(now);
        self.score_into(&mut project, now);
        project.updated_at = now;
        self.store.update_project(project).await
    }

    /// Scores the project and stores the total when it changed. A failed write is
    /// logged and the computed value is still returned.
    #[instrument(skip(self))]
    pub async fn progress(&self, id: Uuid) -> Result<ProgressView, ServiceError> {
        let project = self.load(id).await?;
        let Rescored {
            report,
            previous,
            persisted,
            ..
        } = self.rescore(project).await;

        Ok(ProgressView {
            project_id: id,
            total: report.total,
            breakdown: report.breakdown,
            previous,
            persisted,
        })
    }

    /// Returns every unconsumed allocation to stock, resolves open alerts and marks
    /// the project inactive.
    #[instrument(skip(self, actor))]
    pub async fn deactivate(&self, id: Uuid, actor: Actor) -> Result<Deactivation, ServiceError> {
        let reconciliation = self.reconciler.reconcile(id, &[], actor).await?;
        let alerts_resolved = self.alerts.resolve_for_project(id).await?;

        let mut project = reconciliation.project.clone();
        if project.active {
            project.active = false;
            project.updated_at = Utc::now();
            project = self.store.update_project(project).await?;
            self.events.publish(Event::ProjectDeactivated(id)).await;
        }
        info!(
            project_id = %id,
            returned = reconciliation.returned.len(),
            alerts_resolved,
            "project deactivated"
        );
        Ok(Deactivation {
            project,
            reconciliation,
            alerts_resolved,
        })
    }

    #[instrument(skip(self, actor))]
    pub async fn delete(&self, id: Uuid, actor: Actor) -> Result<(), ServiceError> {
        self.reconciler.reconcile(id, &[], actor).await?;
        self.alerts.resolve_for_project(id).await?;
        self.store.delete_project(id).await?;
        info!(project_id = %id, "project deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn criterion(code: &str, weight: f64) -> Criterion {
        Criterion {
            code: code.into(),
            name: code.into(),
            description: String::new(),
            weight,
            completed: false,
            completed_at: None,
        }
    }

    #[test]
    fn schedule_must_not_run_backwards() {
        let start = Utc::now();
        assert!(validate_schedule(Some(start), Some(start + Duration::days(1))).is_ok());
        assert!(validate_schedule(Some(start), None).is_ok());
        assert!(validate_schedule(Some(start), Some(start - Duration::days(1))).is_err());
    }

    #[test]
    fn manual_progress_is_bounded() {
        assert!(validate_manual(Some(100.0)).is_ok());
        assert!(validate_manual(Some(-0.5)).is_err());
        assert!(validate_manual(Some(f64::NAN)).is_err());
    }

    #[test]
    fn replaced_criteria_keep_their_completion_dates() {
        let done_at = Utc::now() - Duration::days(30);
        let now = Utc::now();
        let mut stored = criterion("A", 50.0);
        stored.completed = true;
        stored.completed_at = Some(done_at);

        let mut again = criterion("A", 60.0);
        again.completed = true;
        let mut fresh = criterion("B", 40.0);
        fresh.completed = true;
        let mut reopened = criterion("C", 0.0);
        reopened.completed_at = Some(done_at);

        let next = carry_completion(&[stored], vec![again, fresh, reopened], now);
        assert_eq!(next[0].completed_at, Some(done_at));
        assert_eq!(next[1].completed_at, Some(now));
        assert_eq!(next[2].completed_at, None);
    }

    #[test]
    fn criteria_codes_are_unique_and_weights_valid() {
        assert!(validate_criteria(&[criterion("A", 50.0), criterion("B", 50.0)]).is_ok());
        assert!(validate_criteria(&[criterion("A", 50.0), criterion("A", 50.0)]).is_err());
        assert!(validate_criteria(&[criterion("A", -1.0)]).is_err());
        assert!(validate_criteria(&[criterion(" ", 1.0)]).is_err());
    }
}
