use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240601_000002_create_stock_movements_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockMovements::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::MaterialId).uuid().not_null())
                    .col(ColumnDef::new(StockMovements::WarehouseId).uuid().null())
                    .col(ColumnDef::new(StockMovements::Kind).string_len(16).not_null())
                    .col(
                        ColumnDef::new(StockMovements::Quantity)
                            .decimal_len(18, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::StockBefore)
                            .decimal_len(18, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::StockAfter)
                            .decimal_len(18, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::ProjectId).uuid().null())
                    .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                    .col(ColumnDef::new(StockMovements::Description).text().null())
                    .col(ColumnDef::new(StockMovements::CreatedBy).uuid().null())
                    .col(
                        ColumnDef::new(StockMovements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stock_movements_material")
                            .from(StockMovements::Table, StockMovements::MaterialId)
                            .to(Materials::Table, Materials::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_material_created")
                    .table(StockMovements::Table)
                    .col(StockMovements::MaterialId)
                    .col(StockMovements::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum StockMovements {
    Table,
    Id,
    MaterialId,
    WarehouseId,
    Kind,
    Quantity,
    StockBefore,
    StockAfter,
    ProjectId,
    Reason,
    Description,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
enum Materials {
    Table,
    Id,
}
