use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240601_000004_create_alerts_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Alerts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Alerts::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Alerts::ProjectId).uuid().null())
                    .col(ColumnDef::new(Alerts::MaterialId).uuid().null())
                    .col(ColumnDef::new(Alerts::UserId).uuid().null())
                    .col(ColumnDef::new(Alerts::RequestId).uuid().null())
                    .col(ColumnDef::new(Alerts::Kind).string_len(20).not_null())
                    .col(ColumnDef::new(Alerts::Severity).string_len(16).not_null())
                    .col(ColumnDef::new(Alerts::Message).text().not_null())
                    .col(ColumnDef::new(Alerts::ThresholdValue).decimal_len(20, 4).null())
                    .col(ColumnDef::new(Alerts::ObservedValue).decimal_len(20, 4).null())
                    .col(ColumnDef::new(Alerts::Recipients).json().not_null())
                    .col(ColumnDef::new(Alerts::CreatedBy).uuid().null())
                    .col(ColumnDef::new(Alerts::Seen).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Alerts::SeenAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alerts::Resolved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Alerts::ResolvedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Alerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Open-alert lookups filter on (kind, project, material, resolved).
        manager
            .create_index(
                Index::create()
                    .name("idx_alerts_open_pair")
                    .table(Alerts::Table)
                    .col(Alerts::Kind)
                    .col(Alerts::ProjectId)
                    .col(Alerts::MaterialId)
                    .col(Alerts::Resolved)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Alerts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Alerts {
    Table,
    Id,
    ProjectId,
    MaterialId,
    UserId,
    RequestId,
    Kind,
    Severity,
    Message,
    ThresholdValue,
    ObservedValue,
    Recipients,
    CreatedBy,
    Seen,
    SeenAt,
    Resolved,
    ResolvedAt,
    CreatedAt,
}
