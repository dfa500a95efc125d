use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20240901_000005_create_price_tables"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PriceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PriceHistory::PresentationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceHistory::Price)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceHistory::ValidFrom)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PriceHistory::ValidTo).timestamp().null())
                    .col(
                        ColumnDef::new(PriceHistory::Reason)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceHistory::CreatedBy)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PriceHistory::CreatedAt)
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
                    .name("idx_price_history_presentation_from")
                    .table(PriceHistory::Table)
                    .col(PriceHistory::PresentationId)
                    .col(PriceHistory::ValidFrom)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PriceHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum PriceHistory {
    Table,
    Id,
    PresentationId,
    Price,
    ValidFrom,
    ValidTo,
    Reason,
    CreatedBy,
    CreatedAt,
}
