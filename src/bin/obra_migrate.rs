//! Applies or rolls back schema migrations against the configured database.
//!
//! `obra-migrate` runs every pending migration, `obra-migrate down` reverts the last one
//! and `obra-migrate status` lists them.

use anyhow::{bail, Context};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use migrations::Migrator;
use obra_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    if cfg.uses_memory_store() {
        bail!("storage_backend is `memory`; nothing to migrate");
    }

    let db = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;

    match std::env::args().nth(1).as_deref() {
        None | Some("up") => {
            Migrator::up(&db, None).await?;
            info!("migrations applied");
        }
        Some("down") => {
            Migrator::down(&db, Some(1)).await?;
            info!("last migration rolled back");
        }
        Some("status") => Migrator::status(&db).await?,
        Some(other) => bail!("unknown command `{other}`; expected up, down or status"),
    }

    Ok(())
}
