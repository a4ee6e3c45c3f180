use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionError, TransactionTrait,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{
    AlertFilter, AlertStore, CommittedMovement, LedgerStore, MaterialStore, NewMovement,
    ProjectStore, UserDirectory,
};
use crate::entities::{
    alert::{self, AlertKind, Entity as Alert},
    budget::{self, Entity as Budget},
    material::{self, Entity as Material},
    project::{self, Entity as Project},
    stock_movement::{self, Entity as StockMovement},
    user::{self, Entity as User, UserRole},
    warehouse::{self, Entity as Warehouse},
};
use crate::errors::ServiceError;

/// Relational store backed by sea-orm.
#[derive(Debug, Clone)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn conn(&self) -> &DatabaseConnection {
        &self.db
    }
}

fn not_updated(entity: &str, id: Uuid) -> impl FnOnce(DbErr) -> ServiceError + '_ {
    move |err| match err {
        DbErr::RecordNotUpdated | DbErr::RecordNotFound(_) => {
            ServiceError::NotFound(format!("{entity} {id}"))
        }
        other => ServiceError::db_error(other),
    }
}

#[async_trait]
impl MaterialStore for SeaOrmStore {
    async fn find_material(&self, id: Uuid) -> Result<Option<material::Model>, ServiceError> {
        Ok(Material::find_by_id(id).one(self.conn()).await?)
    }

    async fn list_materials(
        &self,
        include_deleted: bool,
    ) -> Result<Vec<material::Model>, ServiceError> {
        let mut query = Material::find().order_by_asc(material::Column::Name);
        if !include_deleted {
            query = query.filter(material::Column::Deleted.eq(false));
        }
        Ok(query.all(self.conn()).await?)
    }

    async fn insert_material(
        &self,
        material: material::Model,
    ) -> Result<material::Model, ServiceError> {
        Ok(material
            .into_active_model()
            .reset_all()
            .insert(self.conn())
            .await?)
    }

    async fn update_material(
        &self,
        material: material::Model,
    ) -> Result<material::Model, ServiceError> {
        let id = material.id;
        let active = material::ActiveModel {
            id: Set(id),
            name: Set(material.name),
            category: Set(material.category),
            unit: Set(material.unit),
            unit_price: Set(material.unit_price),
            minimum_stock: Set(material.minimum_stock),
            warehouse_id: Set(material.warehouse_id),
            deleted: Set(material.deleted),
            updated_at: Set(material.updated_at),
            ..Default::default()
        };
        active
            .update(self.conn())
            .await
            .map_err(not_updated("material", id))
    }

    async fn find_warehouse(&self, id: Uuid) -> Result<Option<warehouse::Model>, ServiceError> {
        Ok(Warehouse::find_by_id(id).one(self.conn()).await?)
    }

    async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        Ok(Warehouse::find()
            .order_by_asc(warehouse::Column::Name)
            .all(self.conn())
            .await?)
    }

    async fn insert_warehouse(
        &self,
        warehouse: warehouse::Model,
    ) -> Result<warehouse::Model, ServiceError> {
        Ok(warehouse
            .into_active_model()
            .reset_all()
            .insert(self.conn())
            .await?)
    }
}

#[async_trait]
impl LedgerStore for SeaOrmStore {
    async fn commit_movement(
        &self,
        movement: NewMovement,
    ) -> Result<CommittedMovement, ServiceError> {
        self.conn()
            .transaction::<_, CommittedMovement, ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = Material::find_by_id(movement.material_id)
                        .lock_exclusive()
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("material {}", movement.material_id))
                        })?;

                    let before = current.quantity;
                    let after = movement.kind.apply(before, movement.quantity)?;
                    let now = Utc::now();

                    let mut active: material::ActiveModel = current.into();
                    active.quantity = Set(after);
                    active.updated_at = Set(now);
                    let material = active.update(txn).await?;

                    let entry = movement
                        .into_entry(material.warehouse_id, before, after, now)
                        .into_active_model()
                        .reset_all()
                        .insert(txn)
                        .await?;

                    Ok(CommittedMovement { entry, material })
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })
    }

    async fn find_movement(
        &self,
        id: Uuid,
    ) -> Result<Option<stock_movement::Model>, ServiceError> {
        Ok(StockMovement::find_by_id(id).one(self.conn()).await?)
    }

    async fn movements_for_material(
        &self,
        material_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        Ok(StockMovement::find()
            .filter(stock_movement::Column::MaterialId.eq(material_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .all(self.conn())
            .await?)
    }

    async fn list_movements(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let paginator = StockMovement::find()
            .order_by_desc(stock_movement::Column::CreatedAt)
            .paginate(self.conn(), limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    async fn annotate_movement(
        &self,
        id: Uuid,
        description: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        let active = stock_movement::ActiveModel {
            id: Set(id),
            description: Set(description),
            ..Default::default()
        };
        active
            .update(self.conn())
            .await
            .map_err(not_updated("stock movement", id))
    }
}

#[async_trait]
impl ProjectStore for SeaOrmStore {
    async fn find_project(&self, id: Uuid) -> Result<Option<project::Model>, ServiceError> {
        Ok(Project::find_by_id(id).one(self.conn()).await?)
    }

    async fn list_projects(&self, active_only: bool) -> Result<Vec<project::Model>, ServiceError> {
        let mut query = Project::find().order_by_desc(project::Column::CreatedAt);
        if active_only {
            query = query.filter(project::Column::Active.eq(true));
        }
        Ok(query.all(self.conn()).await?)
    }

    async fn insert_project(
        &self,
        project: project::Model,
    ) -> Result<project::Model, ServiceError> {
        Ok(project
            .into_active_model()
            .reset_all()
            .insert(self.conn())
            .await?)
    }

    async fn update_project(
        &self,
        project: project::Model,
    ) -> Result<project::Model, ServiceError> {
        let id = project.id;
        project
            .into_active_model()
            .reset_all()
            .update(self.conn())
            .await
            .map_err(not_updated("project", id))
    }

    async fn delete_project(&self, id: Uuid) -> Result<(), ServiceError> {
        Budget::delete_many()
            .filter(budget::Column::ProjectId.eq(id))
            .exec(self.conn())
            .await?;
        let result = Project::delete_by_id(id).exec(self.conn()).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("project {id}")));
        }
        Ok(())
    }

    async fn find_budget(&self, project_id: Uuid) -> Result<Option<budget::Model>, ServiceError> {
        Ok(Budget::find()
            .filter(budget::Column::ProjectId.eq(project_id))
            .one(self.conn())
            .await?)
    }

    async fn save_budget(&self, budget: budget::Model) -> Result<budget::Model, ServiceError> {
        match self.find_budget(budget.project_id).await? {
            Some(existing) => {
                let record = budget::Model {
                    id: existing.id,
                    created_at: existing.created_at,
                    ..budget
                };
                Ok(record
                    .into_active_model()
                    .reset_all()
                    .update(self.conn())
                    .await?)
            }
            None => Ok(budget
                .into_active_model()
                .reset_all()
                .insert(self.conn())
                .await?),
        }
    }
}

#[async_trait]
impl AlertStore for SeaOrmStore {
    async fn find_open_alert(
        &self,
        kind: AlertKind,
        project_id: Option<Uuid>,
        material_id: Option<Uuid>,
    ) -> Result<Option<alert::Model>, ServiceError> {
        let mut query = Alert::find()
            .filter(alert::Column::Kind.eq(kind))
            .filter(alert::Column::Resolved.eq(false));
        query = match project_id {
            Some(id) => query.filter(alert::Column::ProjectId.eq(id)),
            None => query.filter(alert::Column::ProjectId.is_null()),
        };
        query = match material_id {
            Some(id) => query.filter(alert::Column::MaterialId.eq(id)),
            None => query.filter(alert::Column::MaterialId.is_null()),
        };
        Ok(query.one(self.conn()).await?)
    }

    async fn insert_alert(&self, alert: alert::Model) -> Result<alert::Model, ServiceError> {
        Ok(alert
            .into_active_model()
            .reset_all()
            .insert(self.conn())
            .await?)
    }

    async fn find_alert(&self, id: Uuid) -> Result<Option<alert::Model>, ServiceError> {
        Ok(Alert::find_by_id(id).one(self.conn()).await?)
    }

    async fn update_alert(&self, alert: alert::Model) -> Result<alert::Model, ServiceError> {
        let id = alert.id;
        alert
            .into_active_model()
            .reset_all()
            .update(self.conn())
            .await
            .map_err(not_updated("alert", id))
    }

    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<alert::Model>, ServiceError> {
        let mut query = Alert::find().order_by_desc(alert::Column::CreatedAt);
        if let Some(id) = filter.project_id {
            query = query.filter(alert::Column::ProjectId.eq(id));
        }
        if let Some(id) = filter.material_id {
            query = query.filter(alert::Column::MaterialId.eq(id));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(alert::Column::Kind.eq(kind));
        }
        if let Some(resolved) = filter.resolved {
            query = query.filter(alert::Column::Resolved.eq(resolved));
        }
        let alerts = query.all(self.conn()).await?;
        // Recipients are a JSON array; filter them after loading.
        Ok(alerts.into_iter().filter(|a| filter.matches(a)).collect())
    }

    async fn resolve_project_alerts(
        &self,
        project_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let result = Alert::update_many()
            .col_expr(alert::Column::Resolved, Expr::value(true))
            .col_expr(alert::Column::ResolvedAt, Expr::value(at))
            .col_expr(alert::Column::Seen, Expr::value(true))
            .filter(alert::Column::ProjectId.eq(project_id))
            .filter(alert::Column::Resolved.eq(false))
            .exec(self.conn())
            .await?;
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl UserDirectory for SeaOrmStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        Ok(User::find_by_id(id).one(self.conn()).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email.to_lowercase()))
            .one(self.conn())
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        Ok(User::find()
            .order_by_asc(user::Column::Name)
            .all(self.conn())
            .await?)
    }

    async fn insert_user(&self, user: user::Model) -> Result<user::Model, ServiceError> {
        Ok(user
            .into_active_model()
            .reset_all()
            .insert(self.conn())
            .await?)
    }

    async fn active_admin_ids(&self) -> Result<Vec<Uuid>, ServiceError> {
        let admins = User::find()
            .filter(user::Column::Role.eq(UserRole::Admin))
            .filter(user::Column::Active.eq(true))
            .order_by_asc(user::Column::Id)
            .all(self.conn())
            .await?;
        Ok(admins.into_iter().map(|u| u.id).collect())
    }
}
