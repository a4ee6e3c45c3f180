use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    #[sea_orm(string_value = "budget")]
    Budget,
    #[sea_orm(string_value = "stock")]
    Stock,
    #[sea_orm(string_value = "assignment")]
    Assignment,
    #[sea_orm(string_value = "request")]
    Request,
    #[sea_orm(string_value = "project")]
    Project,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Budget => "budget",
            AlertKind::Stock => "stock",
            AlertKind::Assignment => "assignment",
            AlertKind::Request => "request",
            AlertKind::Project => "project",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    #[sea_orm(string_value = "info")]
    Info,
    #[sea_orm(string_value = "warning")]
    Warning,
    #[sea_orm(string_value = "critical")]
    Critical,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct Recipients(pub Vec<Uuid>);

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alerts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub material_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub request_id: Option<Uuid>,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold_value: Option<Decimal>,
    pub observed_value: Option<Decimal>,
    #[sea_orm(column_type = "Json")]
    pub recipients: Recipients,
    pub created_by: Option<Uuid>,
    pub seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn open(kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: None,
            material_id: None,
            user_id: None,
            request_id: None,
            kind,
            severity,
            message: message.into(),
            threshold_value: None,
            observed_value: None,
            recipients: Recipients::default(),
            created_by: None,
            seen: false,
            seen_at: None,
            resolved: false,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_seen(&mut self, at: DateTime<Utc>) {
        if !self.seen {
            self.seen = true;
            self.seen_at = Some(at);
        }
    }

    /// Resolving also marks the alert as seen. Resolving twice keeps the first timestamp.
    pub fn resolve(&mut self, at: DateTime<Utc>) {
        self.mark_seen(at);
        if !self.resolved {
            self.resolved = true;
            self.resolved_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_keeps_first_timestamp() {
        let mut alert = Model::open(AlertKind::Stock, AlertSeverity::Warning, "low stock");
        let first = Utc::now();
        alert.resolve(first);
        alert.resolve(first + chrono::Duration::minutes(5));
        assert!(alert.resolved && alert.seen);
        assert_eq!(alert.resolved_at, Some(first));
        assert_eq!(alert.seen_at, Some(first));
    }
}
