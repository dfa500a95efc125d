use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240901_000002_create_lot_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Lots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Lots::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Lots::PresentationId).uuid().not_null())
                    .col(ColumnDef::new(Lots::WarehouseId).integer().not_null())
                    .col(ColumnDef::new(Lots::LotNumber).string_len(64).not_null())
                    .col(ColumnDef::new(Lots::ManufactureDate).date().null())
                    .col(ColumnDef::new(Lots::ExpirationDate).date().null())
                    .col(
                        ColumnDef::new(Lots::ReceivedQuantity)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Lots::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lots_identity")
                    .table(Lots::Table)
                    .col(Lots::PresentationId)
                    .col(Lots::WarehouseId)
                    .col(Lots::LotNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StockPositions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockPositions::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StockPositions::LotId)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(StockPositions::WarehouseId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockPositions::Available)
                            .decimal_len(19, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockPositions::Reserved)
                            .decimal_len(19, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockPositions::MinimumStock)
                            .decimal_len(19, 4)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockPositions::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockPositions::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockMovements::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::OccurredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::MovementType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::LotId).big_integer().not_null())
                    .col(
                        ColumnDef::new(StockMovements::Quantity)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::SourceWarehouseId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::DestWarehouseId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::OriginModule)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::ReferenceId)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(StockMovements::Note).text().null())
                    .col(
                        ColumnDef::new(StockMovements::CreatedBy)
                            .string_len(64)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StockPositions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Lots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Lots {
    Table,
    Id,
    PresentationId,
    WarehouseId,
    LotNumber,
    ManufactureDate,
    ExpirationDate,
    ReceivedQuantity,
    CreatedAt,
}

#[derive(DeriveIden)]
pub enum StockPositions {
    Table,
    Id,
    LotId,
    WarehouseId,
    Available,
    Reserved,
    MinimumStock,
    Version,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum StockMovements {
    Table,
    Id,
    OccurredAt,
    MovementType,
    LotId,
    Quantity,
    SourceWarehouseId,
    DestWarehouseId,
    OriginModule,
    ReferenceId,
    Note,
    CreatedBy,
}
