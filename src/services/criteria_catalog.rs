//! Progress criteria templates keyed by project category and priority profile.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::entities::project::Criterion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    NewBuild,
    Maintenance,
    Consulting,
    Generic,
}

impl ProjectCategory {
    pub const ALL: [ProjectCategory; 4] = [
        ProjectCategory::NewBuild,
        ProjectCategory::Maintenance,
        ProjectCategory::Consulting,
        ProjectCategory::Generic,
    ];

    /// Keyword classification of a free-text project type. Consulting and
    /// maintenance are checked first so "remodelación de edificio" is maintenance.
    pub fn classify(project_type: &str) -> Self {
        let text = project_type.to_lowercase();
        let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

        if has(&["consult", "asesor", "estudio", "diseño", "diseno", "design", "audit"]) {
            ProjectCategory::Consulting
        } else if has(&[
            "manten", "maint", "repar", "remodel", "renov", "rehabilit", "restaur",
        ]) {
            ProjectCategory::Maintenance
        } else if has(&[
            "construc", "obra nueva", "nueva", "edific", "build", "new", "vivienda",
        ]) {
            ProjectCategory::NewBuild
        } else {
            ProjectCategory::Generic
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityProfile {
    High,
    Medium,
    Low,
}

impl PriorityProfile {
    pub const ALL: [PriorityProfile; 3] = [
        PriorityProfile::High,
        PriorityProfile::Medium,
        PriorityProfile::Low,
    ];

    /// Defaults to `Medium` when nothing matches.
    pub fn classify(priority: &str) -> Self {
        let text = priority.to_lowercase();
        let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

        if has(&["alta", "high", "urgent", "crít", "crit"]) {
            PriorityProfile::High
        } else if has(&["baja", "low"]) {
            PriorityProfile::Low
        } else {
            PriorityProfile::Medium
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionTemplate {
    pub code: String,
    pub name: String,
    pub description: String,
    pub weight: f64,
}

impl CriterionTemplate {
    fn instantiate(&self) -> Criterion {
        Criterion {
            code: self.code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            weight: self.weight,
            completed: false,
            completed_at: None,
        }
    }
}

/// Immutable lookup table from (category, profile) to an ordered template.
#[derive(Debug, Clone)]
pub struct CriteriaCatalog {
    templates: HashMap<(ProjectCategory, PriorityProfile), Arc<[CriterionTemplate]>>,
}

/// (code, name, description) per stage, in execution order.
type Stages = &'static [(&'static str, &'static str, &'static str)];

const NEW_BUILD: Stages = &[
    ("PERMITS", "Permisos y licencias", "Licencias de obra y permisos municipales aprobados"),
    ("FOUNDATION", "Cimentación", "Excavación y cimentación terminadas"),
    ("STRUCTURE", "Estructura", "Estructura principal levantada"),
    ("INSTALLATIONS", "Instalaciones", "Instalaciones eléctricas, hidráulicas y sanitarias"),
    ("FINISHES", "Acabados", "Acabados interiores y exteriores"),
    ("HANDOVER", "Entrega", "Recepción y entrega al cliente"),
];

const MAINTENANCE: Stages = &[
    ("ASSESSMENT", "Diagnóstico", "Inspección y diagnóstico del estado actual"),
    ("PLANNING", "Planificación", "Alcance, materiales y calendario acordados"),
    ("EXECUTION", "Ejecución", "Trabajos de reparación o mantenimiento ejecutados"),
    ("QUALITY_CHECK", "Control de calidad", "Verificación de los trabajos realizados"),
    ("CLOSEOUT", "Cierre", "Conformidad del cliente y cierre"),
];

const CONSULTING: Stages = &[
    ("KICKOFF", "Inicio", "Reunión de arranque y requisitos"),
    ("ANALYSIS", "Análisis", "Levantamiento y análisis técnico"),
    ("PROPOSAL", "Propuesta", "Propuesta o diseño preliminar entregado"),
    ("REVIEW", "Revisión", "Revisión con el cliente e incorporación de cambios"),
    ("DELIVERY", "Entrega final", "Documentación final entregada"),
];

const GENERIC: Stages = &[
    ("START", "Inicio", "Proyecto iniciado"),
    ("EXECUTION", "Ejecución", "Trabajo principal en curso"),
    ("REVIEW", "Revisión", "Resultados revisados"),
    ("CLOSE", "Cierre", "Proyecto cerrado"),
];

/// Stage weights per profile. Each row sums to 100.
fn weights(category: ProjectCategory, profile: PriorityProfile) -> &'static [f64] {
    use PriorityProfile::*;
    use ProjectCategory::*;
    match (category, profile) {
        (NewBuild, High) => &[10.0, 15.0, 25.0, 20.0, 20.0, 10.0],
        (NewBuild, Medium) => &[15.0, 15.0, 20.0, 20.0, 20.0, 10.0],
        (NewBuild, Low) => &[20.0, 15.0, 20.0, 15.0, 20.0, 10.0],
        (Maintenance, High) => &[15.0, 10.0, 50.0, 15.0, 10.0],
        (Maintenance, Medium) => &[20.0, 15.0, 40.0, 15.0, 10.0],
        (Maintenance, Low) => &[20.0, 20.0, 35.0, 15.0, 10.0],
        (Consulting, High) => &[10.0, 30.0, 30.0, 15.0, 15.0],
        (Consulting, Medium) => &[15.0, 25.0, 25.0, 20.0, 15.0],
        (Consulting, Low) => &[20.0, 25.0, 20.0, 20.0, 15.0],
        (Generic, High) => &[10.0, 60.0, 20.0, 10.0],
        (Generic, Medium) => &[20.0, 50.0, 20.0, 10.0],
        (Generic, Low) => &[25.0, 40.0, 20.0, 15.0],
    }
}

fn stages(category: ProjectCategory) -> Stages {
    match category {
        ProjectCategory::NewBuild => NEW_BUILD,
        ProjectCategory::Maintenance => MAINTENANCE,
        ProjectCategory::Consulting => CONSULTING,
        ProjectCategory::Generic => GENERIC,
    }
}

impl CriteriaCatalog {
    /// Catalog shipped with the service.
    pub fn standard() -> Self {
        let mut templates = HashMap::new();
        for category in ProjectCategory::ALL {
            for profile in PriorityProfile::ALL {
                let template: Vec<CriterionTemplate> = stages(category)
                    .iter()
                    .zip(weights(category, profile))
                    .map(|(&(code, name, description), &weight)| CriterionTemplate {
                        code: code.to_string(),
                        name: name.to_string(),
                        description: description.to_string(),
                        weight,
                    })
                    .collect();
                templates.insert((category, profile), Arc::from(template));
            }
        }
        Self { templates }
    }

    /// Catalog from explicit templates; missing pairs fall back to the standard ones.
    pub fn with_overrides(
        overrides: impl IntoIterator<Item = ((ProjectCategory, PriorityProfile), Vec<CriterionTemplate>)>,
    ) -> Self {
        let mut catalog = Self::standard();
        for (key, template) in overrides {
            catalog.templates.insert(key, Arc::from(template));
        }
        catalog
    }

    pub fn template(
        &self,
        category: ProjectCategory,
        profile: PriorityProfile,
    ) -> &[CriterionTemplate] {
        self.templates
            .get(&(category, profile))
            .map(|t| t.as_ref())
            .unwrap_or(&[])
    }

    /// Fresh, uncompleted criteria for a project of `project_type` and `priority`.
    pub fn generate(&self, project_type: &str, priority: &str) -> Vec<Criterion> {
        let category = ProjectCategory::classify(project_type);
        let profile = PriorityProfile::classify(priority);
        self.template(category, profile)
            .iter()
            .map(CriterionTemplate::instantiate)
            .collect()
    }
}

impl Default for CriteriaCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Construcción de vivienda", ProjectCategory::NewBuild)]
    #[case("Obra nueva", ProjectCategory::NewBuild)]
    #[case("Mantenimiento preventivo", ProjectCategory::Maintenance)]
    #[case("Remodelación de edificio", ProjectCategory::Maintenance)]
    #[case("Consultoría estructural", ProjectCategory::Consulting)]
    #[case("Diseño arquitectónico", ProjectCategory::Consulting)]
    #[case("Otro", ProjectCategory::Generic)]
    #[case("", ProjectCategory::Generic)]
    fn classifies_project_type(#[case] input: &str, #[case] expected: ProjectCategory) {
        assert_eq!(ProjectCategory::classify(input), expected);
    }

    #[rstest]
    #[case("Alta", PriorityProfile::High)]
    #[case("URGENTE", PriorityProfile::High)]
    #[case("baja", PriorityProfile::Low)]
    #[case("media", PriorityProfile::Medium)]
    #[case("", PriorityProfile::Medium)]
    fn classifies_priority(#[case] input: &str, #[case] expected: PriorityProfile) {
        assert_eq!(PriorityProfile::classify(input), expected);
    }

    #[test]
    fn every_template_sums_to_one_hundred() {
        let catalog = CriteriaCatalog::standard();
        for category in ProjectCategory::ALL {
            for profile in PriorityProfile::ALL {
                let template = catalog.template(category, profile);
                assert!(!template.is_empty());
                let total: f64 = template.iter().map(|c| c.weight).sum();
                assert!((total - 100.0).abs() < 1e-9, "{category:?}/{profile:?} = {total}");
            }
        }
    }

    #[test]
    fn generated_criteria_are_fresh_copies() {
        let catalog = CriteriaCatalog::standard();
        let mut first = catalog.generate("Construcción", "alta");
        first[0].completed = true;
        let second = catalog.generate("Construcción", "alta");
        assert_eq!(second[0].code, "PERMITS");
        assert!(second.iter().all(|c| !c.completed && c.completed_at.is_none()));
    }

    #[test]
    fn overrides_replace_single_pair() {
        let custom = vec![CriterionTemplate {
            code: "ONLY".into(),
            name: "Única".into(),
            description: String::new(),
            weight: 100.0,
        }];
        let catalog = CriteriaCatalog::with_overrides([(
            (ProjectCategory::Generic, PriorityProfile::Medium),
            custom,
        )]);
        assert_eq!(catalog.generate("otro", "normal")[0].code, "ONLY");
        assert_eq!(catalog.generate("otro", "alta")[0].code, "START");
    }
}
