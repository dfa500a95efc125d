pub mod common;
pub mod exchange_rates;
pub mod inventory;
pub mod prices;
pub mod purchases;
pub mod reservations;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: Arc<crate::services::ledger::LedgerService>,
    pub alerts: Arc<crate::services::alerts::AlertService>,
    pub reservations: Arc<crate::services::reservations::ReservationService>,
    pub purchases: Arc<crate::services::purchases::PurchaseService>,
    pub receptions: Arc<crate::services::receptions::ReceptionService>,
    pub prices: Arc<crate::services::prices::PriceService>,
    pub rounding: Arc<crate::services::rounding::RoundingService>,
    pub exchange_rates: Arc<crate::services::exchange_rates::ExchangeRateService>,
}

impl AppServices {
    /// Wires every service against the shared pool and event channel.
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let ledger = Arc::new(crate::services::ledger::LedgerService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let alerts = Arc::new(crate::services::alerts::AlertService::new(
            db.clone(),
            config.alerts.clone(),
        ));
        let reservations = Arc::new(crate::services::reservations::ReservationService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let purchases = Arc::new(crate::services::purchases::PurchaseService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let receptions = Arc::new(crate::services::receptions::ReceptionService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let rounding = Arc::new(crate::services::rounding::RoundingService::new(db.clone()));
        let exchange_rates = Arc::new(crate::services::exchange_rates::ExchangeRateService::new(
            db.clone(),
            Some(event_sender.clone()),
        ));
        let prices = Arc::new(crate::services::prices::PriceService::new(
            db.clone(),
            exchange_rates.clone(),
            rounding.clone(),
            Some(event_sender),
        ));

        Self {
            ledger,
            alerts,
            reservations,
            purchases,
            receptions,
            prices,
            rounding,
            exchange_rates,
        }
    }
}
