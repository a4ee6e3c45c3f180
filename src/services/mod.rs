pub mod alerts;
pub mod budgets;
pub mod criteria_catalog;
pub mod materials;
pub mod progress;
pub mod projects;
pub mod reconciler;
pub mod stock_ledger;
pub mod users;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::repositories::Store;

use self::{
    alerts::AlertDetector, budgets::BudgetService, criteria_catalog::CriteriaCatalog,
    materials::CatalogService, progress::ProgressEngine, projects::ProjectService,
    reconciler::AllocationReconciler, stock_ledger::StockLedger, users::UserService,
};

/// Service container shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub alerts: AlertDetector,
    pub ledger: StockLedger,
    pub reconciler: AllocationReconciler,
    pub budgets: BudgetService,
    pub projects: ProjectService,
    pub catalog: CatalogService,
    pub users: UserService,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>, events: EventSender, config: &AppConfig) -> Self {
        Self::with_catalog(store, events, config, Arc::new(CriteriaCatalog::standard()))
    }

    pub fn with_catalog(
        store: Arc<dyn Store>,
        events: EventSender,
        config: &AppConfig,
        catalog: Arc<CriteriaCatalog>,
    ) -> Self {
        let alerts = AlertDetector::new(store.clone(), events.clone(), config.budget_alert_ratio);
        let ledger = StockLedger::new(store.clone(), alerts.clone(), events.clone());
        let reconciler = AllocationReconciler::new(
            store.clone(),
            ledger.clone(),
            alerts.clone(),
            events.clone(),
        );
        let budgets = BudgetService::new(
            store.clone(),
            reconciler.clone(),
            alerts.clone(),
            events.clone(),
            config.budget_total_tolerance,
        );
        let progress = ProgressEngine::new(config.progress_weights, catalog);
        let projects = ProjectService::new(
            store.clone(),
            reconciler.clone(),
            alerts.clone(),
            progress,
            events,
        );
        let catalog = CatalogService::new(store.clone(), ledger.clone());
        let users = UserService::new(store);

        Self {
            alerts,
            ledger,
            reconciler,
            budgets,
            projects,
            catalog,
            users,
        }
    }
}
