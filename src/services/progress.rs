//! Progress scoring: four independent signals combined by a weighted average.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::entities::project::{self, Criterion};
use crate::services::criteria_catalog::CriteriaCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressWeights {
    pub criteria: f64,
    pub time: f64,
    pub status: f64,
    pub manual: f64,
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            criteria: 0.6,
            time: 0.2,
            status: 0.1,
            manual: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressBreakdown {
    pub criteria: u8,
    pub time: u8,
    pub status: u8,
    pub manual: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub total: u8,
    pub breakdown: ProgressBreakdown,
}

/// Coarse lifecycle stage recognised from a free-text status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStage {
    Planning,
    Pending,
    Active,
    Finished,
    Unknown,
}

impl LifecycleStage {
    pub fn classify(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "planning" | "planned" | "planificación" | "planificacion" | "planeación"
            | "planeacion" | "planificado" => LifecycleStage::Planning,
            "pending" | "on hold" | "on_hold" | "waiting" | "pendiente" | "en espera"
            | "pausado" => LifecycleStage::Pending,
            "active" | "in progress" | "in_progress" | "ongoing" | "en progreso"
            | "en curso" | "activo" | "en ejecución" | "en ejecucion" => LifecycleStage::Active,
            "completed" | "complete" | "done" | "finished" | "cancelled" | "canceled"
            | "completado" | "finalizado" | "terminado" | "cancelado" => {
                LifecycleStage::Finished
            }
            _ => LifecycleStage::Unknown,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            LifecycleStage::Planning => 10.0,
            LifecycleStage::Pending => 20.0,
            LifecycleStage::Active => 60.0,
            LifecycleStage::Finished => 100.0,
            LifecycleStage::Unknown => 0.0,
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn to_percent(value: f64) -> u8 {
    clamp_percent(value).round() as u8
}

/// Share of positive criterion weight that is completed, 0 without criteria.
pub fn criteria_score(criteria: &[Criterion]) -> f64 {
    let positive = |c: &&Criterion| c.weight.is_finite() && c.weight > 0.0;
    let total: f64 = criteria.iter().filter(positive).map(|c| c.weight).sum();
    if total <= 0.0 {
        return 0.0;
    }
    let done: f64 = criteria
        .iter()
        .filter(positive)
        .filter(|c| c.completed)
        .map(|c| c.weight)
        .sum();
    clamp_percent(100.0 * done / total)
}

/// Elapsed share of the planned schedule.
pub fn time_score(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> f64 {
    let (Some(start), Some(end)) = (start, end) else {
        return 0.0;
    };
    if end <= start || now <= start {
        return 0.0;
    }
    if now >= end {
        return 100.0;
    }
    let elapsed = (now - start).num_milliseconds() as f64;
    let planned = (end - start).num_milliseconds() as f64;
    clamp_percent(100.0 * elapsed / planned)
}

pub fn status_score(status: &str) -> f64 {
    LifecycleStage::classify(status).score()
}

pub fn manual_score(manual: f64) -> f64 {
    clamp_percent(manual)
}

/// Scores projects with weights and a criteria catalog fixed at construction.
#[derive(Debug, Clone)]
pub struct ProgressEngine {
    weights: ProgressWeights,
    catalog: Arc<CriteriaCatalog>,
}

impl ProgressEngine {
    pub fn new(weights: ProgressWeights, catalog: Arc<CriteriaCatalog>) -> Self {
        Self { weights, catalog }
    }

    pub fn weights(&self) -> ProgressWeights {
        self.weights
    }

    pub fn catalog(&self) -> &CriteriaCatalog {
        &self.catalog
    }

    pub fn score(&self, project: &project::Model, now: DateTime<Utc>) -> ProgressReport {
        self.score_with(project, now, self.weights)
    }

    pub fn score_with(
        &self,
        project: &project::Model,
        now: DateTime<Utc>,
        weights: ProgressWeights,
    ) -> ProgressReport {
        let criteria = criteria_score(&project.criteria.0);
        let time = time_score(project.start_date, project.end_date, now);
        let status = status_score(&project.status);
        let manual = manual_score(project.manual_progress);

        let w = |v: f64| if v.is_finite() && v > 0.0 { v } else { 0.0 };
        let (wc, wt, ws, wm) = (
            w(weights.criteria),
            w(weights.time),
            w(weights.status),
            w(weights.manual),
        );
        let weight_sum = wc + wt + ws + wm;

        let total = if weight_sum > 0.0 {
            (wc * criteria + wt * time + ws * status + wm * manual) / weight_sum
        } else if criteria > 0.0 {
            criteria
        } else {
            manual
        };

        ProgressReport {
            total: to_percent(total),
            breakdown: ProgressBreakdown {
                criteria: to_percent(criteria),
                time: to_percent(time),
                status: to_percent(status),
                manual: to_percent(manual),
            },
        }
    }

    /// Template criteria for a project type and priority, all uncompleted.
    pub fn generate_criteria(&self, project_type: &str, priority: &str) -> Vec<Criterion> {
        self.catalog.generate(project_type, priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::project::{Allocations, Criteria};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rstest::rstest;
    use uuid::Uuid;

    fn criterion(code: &str, weight: f64, completed: bool) -> Criterion {
        Criterion {
            code: code.into(),
            name: code.into(),
            description: String::new(),
            weight,
            completed,
            completed_at: None,
        }
    }

    fn project(criteria: Vec<Criterion>, status: &str, manual: f64) -> project::Model {
        let now = Utc::now();
        project::Model {
            id: Uuid::new_v4(),
            name: "Torre A".into(),
            project_type: "construcción".into(),
            priority: "media".into(),
            status: status.into(),
            start_date: None,
            end_date: None,
            manual_progress: manual,
            progress: 0,
            lead_id: None,
            client_id: None,
            active: true,
            materials: Allocations::default(),
            criteria: Criteria(criteria),
            created_at: now,
            updated_at: now,
        }
    }

    fn engine() -> ProgressEngine {
        ProgressEngine::new(
            ProgressWeights::default(),
            Arc::new(CriteriaCatalog::standard()),
        )
    }

    #[rstest]
    #[case("Planificación", 10.0)]
    #[case("planning", 10.0)]
    #[case("Pendiente", 20.0)]
    #[case("EN ESPERA", 20.0)]
    #[case("En progreso", 60.0)]
    #[case("active", 60.0)]
    #[case("Completado", 100.0)]
    #[case("cancelled", 100.0)]
    #[case("Cancelado", 100.0)]
    #[case("something else", 0.0)]
    fn maps_status_synonyms(#[case] status: &str, #[case] expected: f64) {
        assert_eq!(status_score(status), expected);
    }

    #[test]
    fn criteria_score_ignores_non_positive_weights() {
        let criteria = vec![
            criterion("A", 30.0, true),
            criterion("B", 70.0, false),
            criterion("C", 0.0, true),
            criterion("D", -10.0, true),
        ];
        assert!((criteria_score(&criteria) - 30.0).abs() < 1e-9);
        assert_eq!(criteria_score(&[]), 0.0);
        assert_eq!(criteria_score(&[criterion("Z", 0.0, true)]), 0.0);
    }

    #[test]
    fn time_score_interpolates() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::days(100);
        assert_eq!(time_score(Some(start), Some(end), start), 0.0);
        assert_eq!(time_score(Some(start), Some(end), start - Duration::days(1)), 0.0);
        assert!((time_score(Some(start), Some(end), start + Duration::days(25)) - 25.0).abs() < 1e-9);
        assert_eq!(time_score(Some(start), Some(end), end), 100.0);
        assert_eq!(time_score(Some(end), Some(start), end + Duration::days(1)), 0.0);
        assert_eq!(time_score(None, Some(end), end), 0.0);
    }

    #[test]
    fn weighted_total_uses_default_weights() {
        // criteria 50, time 0, status 60, manual 40 -> 0.6*50 + 0.1*60 + 0.1*40 = 40
        let p = project(
            vec![criterion("A", 50.0, true), criterion("B", 50.0, false)],
            "en curso",
            40.0,
        );
        let report = engine().score(&p, Utc::now());
        assert_eq!(
            report.breakdown,
            ProgressBreakdown {
                criteria: 50,
                time: 0,
                status: 60,
                manual: 40
            }
        );
        assert_eq!(report.total, 40);
    }

    #[test]
    fn zero_weights_fall_back_to_criteria_then_manual() {
        let zero = ProgressWeights {
            criteria: 0.0,
            time: 0.0,
            status: 0.0,
            manual: 0.0,
        };
        let with_criteria = project(vec![criterion("A", 1.0, true)], "active", 30.0);
        assert_eq!(engine().score_with(&with_criteria, Utc::now(), zero).total, 100);

        let without = project(vec![], "active", 30.0);
        assert_eq!(engine().score_with(&without, Utc::now(), zero).total, 30);
    }

    #[test]
    fn manual_value_is_clamped() {
        assert_eq!(manual_score(140.0), 100.0);
        assert_eq!(manual_score(-3.0), 0.0);
        assert_eq!(manual_score(f64::NAN), 0.0);
    }

    fn arb_criteria() -> impl Strategy<Value = Vec<Criterion>> {
        prop::collection::vec(
            (-50.0f64..150.0, any::<bool>()).prop_map(|(w, done)| criterion("X", w, done)),
            0..12,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn total_and_breakdown_stay_in_bounds(
            criteria in arb_criteria(),
            manual in -500.0f64..500.0,
            offset_days in -400i64..400,
            span_days in -50i64..300,
            wc in 0.0f64..5.0, wt in 0.0f64..5.0, ws in 0.0f64..5.0, wm in 0.0f64..5.0,
        ) {
            let now = Utc::now();
            let mut p = project(criteria, "en curso", manual);
            p.start_date = Some(now - Duration::days(offset_days));
            p.end_date = Some(now - Duration::days(offset_days) + Duration::days(span_days));
            let weights = ProgressWeights { criteria: wc, time: wt, status: ws, manual: wm };
            let report = engine().score_with(&p, now, weights);
            prop_assert!(report.total <= 100);
            prop_assert!(report.breakdown.criteria <= 100);
            prop_assert!(report.breakdown.time <= 100);
            prop_assert!(report.breakdown.status <= 100);
            prop_assert!(report.breakdown.manual <= 100);
        }

        #[test]
        fn completing_a_criterion_never_lowers_criteria_score(
            criteria in arb_criteria(),
            index in any::<prop::sample::Index>(),
        ) {
            prop_assume!(!criteria.is_empty());
            let before = criteria_score(&criteria);
            let mut after = criteria.clone();
            let i = index.index(after.len());
            after[i].completed = true;
            prop_assert!(criteria_score(&after) + 1e-9 >= before);
        }
    }
}
