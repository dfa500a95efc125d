use sea_orm_migration::prelude::*;

use super::m20240901_000002_create_lot_tables::{Lots, StockMovements, StockPositions};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // FEFO candidate scan: lots for a presentation in a warehouse by expiration
        manager
            .create_index(
                Index::create()
                    .name("idx_lots_presentation_warehouse_expiration")
                    .table(Lots::Table)
                    .col(Lots::PresentationId)
                    .col(Lots::WarehouseId)
                    .col(Lots::ExpirationDate)
                    .to_owned(),
            )
            .await?;

        // Movement trail lookups, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_lot_occurred")
                    .table(StockMovements::Table)
                    .col(StockMovements::LotId)
                    .col((StockMovements::OccurredAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_positions_warehouse")
                    .table(StockPositions::Table)
                    .col(StockPositions::WarehouseId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_stock_positions_warehouse")
                    .table(StockPositions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_stock_movements_lot_occurred")
                    .table(StockMovements::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_lots_presentation_warehouse_expiration")
                    .table(Lots::Table)
                    .to_owned(),
            )
            .await
    }
}
