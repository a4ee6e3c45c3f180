pub use sea_orm_migration::prelude::*;

mod m20240601_000001_create_catalog_tables;
mod m20240601_000002_create_stock_movements_table;
mod m20240601_000003_create_projects_and_budgets;
mod m20240601_000004_create_alerts_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_stock_movements_table::Migration),
            Box::new(m20240601_000003_create_projects_and_budgets::Migration),
            Box::new(m20240601_000004_create_alerts_table::Migration),
        ]
    }
}
