pub mod exchange_rate;
pub mod lot;
pub mod presentation;
pub mod price_history;
pub mod purchase;
pub mod purchase_line;
pub mod reception;
pub mod reception_line;
pub mod reservation;
pub mod reservation_allocation;
pub mod rounding_config;
pub mod stock_movement;
pub mod stock_position;
pub mod warehouse;
