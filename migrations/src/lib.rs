pub use sea_orm_migration::prelude::*;

mod m20240901_000001_create_catalog_tables;
mod m20240901_000002_create_lot_tables;
mod m20240901_000003_create_reservation_tables;
mod m20240901_000004_create_purchase_tables;
mod m20240901_000005_create_price_tables;
mod m20240901_000006_create_exchange_rate_table;
mod m20240901_000007_add_inventory_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240901_000001_create_catalog_tables::Migration),
            Box::new(m20240901_000002_create_lot_tables::Migration),
            Box::new(m20240901_000003_create_reservation_tables::Migration),
            Box::new(m20240901_000004_create_purchase_tables::Migration),
            Box::new(m20240901_000005_create_price_tables::Migration),
            Box::new(m20240901_000006_create_exchange_rate_table::Migration),
            Box::new(m20240901_000007_add_inventory_indexes::Migration),
        ]
    }
}
