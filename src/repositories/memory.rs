use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AlertFilter, AlertStore, CommittedMovement, LedgerStore, MaterialStore, NewMovement,
    ProjectStore, UserDirectory,
};
use crate::entities::{
    alert::{self, AlertKind},
    budget, material, project, stock_movement,
    user::{self, UserRole},
    warehouse,
};
use crate::errors::ServiceError;

#[derive(Debug, Default)]
struct State {
    warehouses: HashMap<Uuid, warehouse::Model>,
    materials: HashMap<Uuid, material::Model>,
    /// Append order is creation order.
    movements: Vec<stock_movement::Model>,
    projects: HashMap<Uuid, project::Model>,
    budgets: HashMap<Uuid, budget::Model>,
    alerts: Vec<alert::Model>,
    users: HashMap<Uuid, user::Model>,
}

/// Process-local store. Every write holds one lock, so each operation is atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_project_updates: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent project updates fail with a database error.
    pub fn fail_project_updates(&self, fail: bool) {
        self.fail_project_updates.store(fail, Ordering::SeqCst);
    }
}

fn sorted_newest_first<T: Clone>(items: impl Iterator<Item = T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut out: Vec<T> = items.collect();
    out.sort_by_key(|item| std::cmp::Reverse(key(item)));
    out
}

#[async_trait]
impl MaterialStore for InMemoryStore {
    async fn find_material(&self, id: Uuid) -> Result<Option<material::Model>, ServiceError> {
        Ok(self.state.read().await.materials.get(&id).cloned())
    }

    async fn list_materials(
        &self,
        include_deleted: bool,
    ) -> Result<Vec<material::Model>, ServiceError> {
        let state = self.state.read().await;
        let mut materials: Vec<_> = state
            .materials
            .values()
            .filter(|m| include_deleted || !m.deleted)
            .cloned()
            .collect();
        materials.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(materials)
    }

    async fn insert_material(
        &self,
        material: material::Model,
    ) -> Result<material::Model, ServiceError> {
        let mut state = self.state.write().await;
        if state.materials.contains_key(&material.id) {
            return Err(ServiceError::Conflict(format!(
                "material {} already exists",
                material.id
            )));
        }
        state.materials.insert(material.id, material.clone());
        Ok(material)
    }

    async fn update_material(
        &self,
        material: material::Model,
    ) -> Result<material::Model, ServiceError> {
        let mut state = self.state.write().await;
        let stored = state
            .materials
            .get_mut(&material.id)
            .ok_or_else(|| ServiceError::NotFound(format!("material {}", material.id)))?;
        let quantity = stored.quantity;
        *stored = material::Model {
            quantity,
            ..material
        };
        Ok(stored.clone())
    }

    async fn find_warehouse(&self, id: Uuid) -> Result<Option<warehouse::Model>, ServiceError> {
        Ok(self.state.read().await.warehouses.get(&id).cloned())
    }

    async fn list_warehouses(&self) -> Result<Vec<warehouse::Model>, ServiceError> {
        let state = self.state.read().await;
        let mut warehouses: Vec<_> = state.warehouses.values().cloned().collect();
        warehouses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(warehouses)
    }

    async fn insert_warehouse(
        &self,
        warehouse: warehouse::Model,
    ) -> Result<warehouse::Model, ServiceError> {
        self.state
            .write()
            .await
            .warehouses
            .insert(warehouse.id, warehouse.clone());
        Ok(warehouse)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit_movement(
        &self,
        movement: NewMovement,
    ) -> Result<CommittedMovement, ServiceError> {
        let mut state = self.state.write().await;
        let material = state
            .materials
            .get_mut(&movement.material_id)
            .ok_or_else(|| ServiceError::NotFound(format!("material {}", movement.material_id)))?;

        let before = material.quantity;
        let after = movement.kind.apply(before, movement.quantity)?;
        let now = Utc::now();
        material.quantity = after;
        material.updated_at = now;
        let material = material.clone();

        let entry = movement.into_entry(material.warehouse_id, before, after, now);
        state.movements.push(entry.clone());
        Ok(CommittedMovement { entry, material })
    }

    async fn find_movement(
        &self,
        id: Uuid,
    ) -> Result<Option<stock_movement::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(state.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn movements_for_material(
        &self,
        material_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .rev()
            .filter(|m| m.material_id == material_id)
            .cloned()
            .collect())
    }

    async fn list_movements(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
        let state = self.state.read().await;
        let total = state.movements.len() as u64;
        let skip = page.saturating_sub(1).saturating_mul(limit) as usize;
        let items = state
            .movements
            .iter()
            .rev()
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn annotate_movement(
        &self,
        id: Uuid,
        description: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        let mut state = self.state.write().await;
        let entry = state
            .movements
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| ServiceError::NotFound(format!("stock movement {id}")))?;
        entry.description = description;
        Ok(entry.clone())
    }
}

#[async_trait]
impl ProjectStore for InMemoryStore {
    async fn find_project(&self, id: Uuid) -> Result<Option<project::Model>, ServiceError> {
        Ok(self.state.read().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self, active_only: bool) -> Result<Vec<project::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(sorted_newest_first(
            state
                .projects
                .values()
                .filter(|p| !active_only || p.active)
                .cloned(),
            |p| p.created_at,
        ))
    }

    async fn insert_project(
        &self,
        project: project::Model,
    ) -> Result<project::Model, ServiceError> {
        self.state
            .write()
            .await
            .projects
            .insert(project.id, project.clone());
        Ok(project)
    }

    async fn update_project(
        &self,
        project: project::Model,
    ) -> Result<project::Model, ServiceError> {
        if self.fail_project_updates.load(Ordering::SeqCst) {
            return Err(ServiceError::db_error("project store unavailable"));
        }
        let mut state = self.state.write().await;
        match state.projects.get_mut(&project.id) {
            Some(stored) => {
                *stored = project.clone();
                Ok(project)
            }
            None => Err(ServiceError::NotFound(format!("project {}", project.id))),
        }
    }

    async fn delete_project(&self, id: Uuid) -> Result<(), ServiceError> {
        let mut state = self.state.write().await;
        state
            .projects
            .remove(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("project {id}")))?;
        state.budgets.remove(&id);
        Ok(())
    }

    async fn find_budget(&self, project_id: Uuid) -> Result<Option<budget::Model>, ServiceError> {
        Ok(self.state.read().await.budgets.get(&project_id).cloned())
    }

    async fn save_budget(&self, budget: budget::Model) -> Result<budget::Model, ServiceError> {
        let mut state = self.state.write().await;
        let stored = match state.budgets.get(&budget.project_id) {
            Some(existing) => budget::Model {
                id: existing.id,
                created_at: existing.created_at,
                ..budget
            },
            None => budget,
        };
        state.budgets.insert(stored.project_id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl AlertStore for InMemoryStore {
    async fn find_open_alert(
        &self,
        kind: AlertKind,
        project_id: Option<Uuid>,
        material_id: Option<Uuid>,
    ) -> Result<Option<alert::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .find(|a| {
                !a.resolved
                    && a.kind == kind
                    && a.project_id == project_id
                    && a.material_id == material_id
            })
            .cloned())
    }

    async fn insert_alert(&self, alert: alert::Model) -> Result<alert::Model, ServiceError> {
        self.state.write().await.alerts.push(alert.clone());
        Ok(alert)
    }

    async fn find_alert(&self, id: Uuid) -> Result<Option<alert::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(state.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn update_alert(&self, alert: alert::Model) -> Result<alert::Model, ServiceError> {
        let mut state = self.state.write().await;
        let stored = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| ServiceError::NotFound(format!("alert {}", alert.id)))?;
        *stored = alert.clone();
        Ok(alert)
    }

    async fn list_alerts(&self, filter: AlertFilter) -> Result<Vec<alert::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .rev()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn resolve_project_alerts(
        &self,
        project_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, ServiceError> {
        let mut state = self.state.write().await;
        let mut resolved = 0;
        for alert in state
            .alerts
            .iter_mut()
            .filter(|a| a.project_id == Some(project_id) && !a.resolved)
        {
            alert.resolve(at);
            resolved += 1;
        }
        Ok(resolved)
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_user(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<user::Model>, ServiceError> {
        let state = self.state.read().await;
        let mut users: Vec<_> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn insert_user(&self, user: user::Model) -> Result<user::Model, ServiceError> {
        self.state.write().await.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn active_admin_ids(&self) -> Result<Vec<Uuid>, ServiceError> {
        let state = self.state.read().await;
        let mut ids: Vec<_> = state
            .users
            .values()
            .filter(|u| u.active && u.role == UserRole::Admin)
            .map(|u| u.id)
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::stock_movement::MovementKind;
    use assert_matches::assert_matches;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn material(quantity: Decimal) -> material::Model {
        let now = Utc::now();
        material::Model {
            id: Uuid::new_v4(),
            name: "Cemento".into(),
            category: None,
            unit: "saco".into(),
            unit_price: dec!(12.5),
            quantity,
            minimum_stock: Decimal::ZERO,
            warehouse_id: None,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn movement(material_id: Uuid, kind: MovementKind, quantity: Decimal) -> NewMovement {
        NewMovement {
            material_id,
            kind,
            quantity,
            project_id: None,
            reason: "test".into(),
            description: None,
            created_by: None,
        }
    }

    #[tokio::test]
    async fn rejected_exit_leaves_stock_and_ledger_untouched() {
        let store = InMemoryStore::new();
        let m = store.insert_material(material(dec!(3))).await.unwrap();

        let result = store
            .commit_movement(movement(m.id, MovementKind::Exit, dec!(5)))
            .await;
        assert_matches!(result, Err(ServiceError::InsufficientStock(_)));

        let stored = store.find_material(m.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity, dec!(3));
        assert!(store.movements_for_material(m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_material_never_touches_stock() {
        let store = InMemoryStore::new();
        let m = store.insert_material(material(dec!(8))).await.unwrap();
        let edited = material::Model {
            quantity: dec!(999),
            name: "Cemento gris".into(),
            ..m.clone()
        };
        let stored = store.update_material(edited).await.unwrap();
        assert_eq!(stored.quantity, dec!(8));
        assert_eq!(stored.name, "Cemento gris");
    }

    #[tokio::test]
    async fn movements_page_newest_first() {
        let store = InMemoryStore::new();
        let m = store.insert_material(material(dec!(0))).await.unwrap();
        for qty in [dec!(1), dec!(2), dec!(3)] {
            store
                .commit_movement(movement(m.id, MovementKind::Entry, qty))
                .await
                .unwrap();
        }
        let (page, total) = store.list_movements(1, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].quantity, dec!(3));
        assert_eq!(page[0].stock_before, dec!(3));
        assert_eq!(page[0].stock_after, dec!(6));
        let (rest, _) = store.list_movements(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].quantity, dec!(1));
    }
}
