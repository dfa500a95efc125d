use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240901_000004_create_purchase_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Purchases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Purchases::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Purchases::SupplierId).uuid().not_null())
                    .col(
                        ColumnDef::new(Purchases::Currency)
                            .string_len(3)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Purchases::ExchangeRate)
                            .decimal_len(19, 6)
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Purchases::Status).string_len(24).not_null())
                    .col(ColumnDef::new(Purchases::Notes).text().null())
                    .col(
                        ColumnDef::new(Purchases::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Purchases::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PurchaseLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PurchaseLines::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PurchaseLines::PurchaseId).uuid().not_null())
                    .col(
                        ColumnDef::new(PurchaseLines::PresentationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseLines::Quantity)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PurchaseLines::UnitCost)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PurchaseLines::ExpectedDate).date().null())
                    .col(
                        ColumnDef::new(PurchaseLines::ReceivedQuantity)
                            .decimal_len(19, 4)
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_purchase_lines_purchase")
                    .table(PurchaseLines::Table)
                    .col(PurchaseLines::PurchaseId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Receptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Receptions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Receptions::PurchaseId).uuid().not_null())
                    .col(ColumnDef::new(Receptions::WarehouseId).integer().not_null())
                    .col(
                        ColumnDef::new(Receptions::DocumentNumber)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Receptions::Status).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Receptions::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Receptions::ClosedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReceptionLines::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReceptionLines::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReceptionLines::ReceptionId).uuid().not_null())
                    .col(
                        ColumnDef::new(ReceptionLines::PurchaseLineId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReceptionLines::LotId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReceptionLines::Quantity)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReceptionLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Receptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PurchaseLines::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Purchases::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Purchases {
    Table,
    Id,
    SupplierId,
    Currency,
    ExchangeRate,
    Status,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum PurchaseLines {
    Table,
    Id,
    PurchaseId,
    PresentationId,
    Quantity,
    UnitCost,
    ExpectedDate,
    ReceivedQuantity,
}

#[derive(DeriveIden)]
pub enum Receptions {
    Table,
    Id,
    PurchaseId,
    WarehouseId,
    DocumentNumber,
    Status,
    CreatedAt,
    ClosedAt,
}

#[derive(DeriveIden)]
pub enum ReceptionLines {
    Table,
    Id,
    ReceptionId,
    PurchaseLineId,
    LotId,
    Quantity,
}
