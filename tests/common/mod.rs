//! Shared harness: application state backed by an in-memory SQLite
//! database with the real migrations applied.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use almacen_api::{
    auth::CurrentUser,
    config::AppConfig,
    db,
    entities::{lot, presentation, stock_movement::MovementType, warehouse},
    events::{self, EventSender},
    handlers::AppServices,
    services::ledger::{origins, MovementRecord},
    AppState,
};

pub struct TestApp {
    pub state: AppState,
    #[allow(dead_code)]
    event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh application state over a private in-memory database.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        // A single connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db.clone(), event_sender.clone(), &cfg);
        services
            .rounding
            .load()
            .await
            .expect("failed to load rounding config");

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };

        Self { state, event_task }
    }

    /// Router over this state, for request-level tests.
    #[allow(dead_code)]
    pub fn router(&self) -> axum::Router {
        almacen_api::app_router(self.state.clone())
    }

    /// A caller holding every capability.
    pub fn admin() -> CurrentUser {
        CurrentUser::new("test-admin", "admin", ["*".to_string()])
    }

    pub async fn seed_warehouse(&self, code: &str) -> i32 {
        let created = warehouse::ActiveModel {
            code: Set(code.to_string()),
            name: Set(format!("Almacen {code}")),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed warehouse");
        created.id
    }

    pub async fn seed_presentation(
        &self,
        sku: &str,
        cost_currency: &str,
        base_cost: Option<Decimal>,
    ) -> Uuid {
        let created = presentation::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(sku.to_string()),
            name: Set(format!("Presentacion {sku}")),
            cost_currency: Set(cost_currency.to_string()),
            base_cost: Set(base_cost),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed presentation");
        created.id
    }

    /// Creates a lot and posts its opening `ingreso` through the ledger, so
    /// the movement trail covers the seeded quantity.
    pub async fn seed_lot(
        &self,
        presentation_id: Uuid,
        warehouse_id: i32,
        lot_number: &str,
        expiration_date: Option<NaiveDate>,
        quantity: Decimal,
    ) -> i64 {
        let created = lot::ActiveModel {
            presentation_id: Set(presentation_id),
            warehouse_id: Set(warehouse_id),
            lot_number: Set(lot_number.to_string()),
            manufacture_date: Set(None),
            expiration_date: Set(expiration_date),
            received_quantity: Set(quantity),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to seed lot");

        self.state
            .services
            .ledger
            .record_movement(MovementRecord {
                movement_type: MovementType::Ingreso,
                lot_id: created.id,
                quantity,
                source_warehouse_id: None,
                dest_warehouse_id: Some(warehouse_id),
                origin_module: origins::RECEPCIONES.to_string(),
                reference_id: None,
                note: Some("seed".to_string()),
                created_by: "seed".to_string(),
            })
            .await
            .expect("failed to post seed ingreso");

        created.id
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("invalid date")
}
