pub mod alerts;
pub mod exchange_rates;
pub mod fefo;
pub mod ledger;
pub mod prices;
pub mod purchases;
pub mod receptions;
pub mod reservations;
pub mod rounding;
