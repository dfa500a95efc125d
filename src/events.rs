use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the services after a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    MovementRecorded {
        movement_id: i64,
        lot_id: i64,
        movement_type: String,
        quantity: Decimal,
    },
    InventoryReserved {
        reservation_id: Uuid,
        presentation_id: Uuid,
        warehouse_id: i32,
        reserved: Decimal,
        shortfall: Decimal,
    },
    ReservationReleased {
        reservation_id: Uuid,
        released: Decimal,
        remaining: Decimal,
    },
    ReservationApplied {
        reservation_id: Uuid,
        applied: Decimal,
        remaining: Decimal,
    },
    PurchaseStatusChanged {
        purchase_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ReceptionRegistered {
        reception_id: Uuid,
        purchase_id: Uuid,
        lots_posted: usize,
    },
    ReceptionClosed {
        reception_id: Uuid,
    },
    PriceChanged {
        presentation_id: Uuid,
        old_price: Option<Decimal>,
        new_price: Decimal,
        reason: String,
    },
    PricesRecalculated {
        origin_currency: String,
        dest_currency: String,
        changed: usize,
        unchanged: usize,
        skipped: usize,
        simulated: bool,
    },
    ExchangeRateCreated {
        origin_currency: String,
        dest_currency: String,
        effective_date: chrono::NaiveDate,
        rate: Decimal,
    },
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

/// Cloneable handle used by services to emit events.
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, failing if the channel is closed.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {e}"))
    }

    /// Sends an event, logging instead of failing. Event delivery never
    /// affects the outcome of the request that produced it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping event: {e}");
        }
    }
}

/// Consumes events from the channel and logs them. The loop ends when every
/// sender has been dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::InventoryReserved {
                reservation_id,
                reserved,
                shortfall,
                ..
            } => {
                info!(
                    reservation_id = %reservation_id,
                    reserved = %reserved,
                    shortfall = %shortfall,
                    "inventory reserved"
                );
            }
            Event::PurchaseStatusChanged {
                purchase_id,
                old_status,
                new_status,
            } => {
                info!(
                    purchase_id = %purchase_id,
                    from = %old_status,
                    to = %new_status,
                    "purchase status changed"
                );
            }
            Event::PricesRecalculated {
                origin_currency,
                dest_currency,
                changed,
                unchanged,
                skipped,
                simulated,
            } => {
                info!(
                    origin = %origin_currency,
                    dest = %dest_currency,
                    changed,
                    unchanged,
                    skipped,
                    simulated,
                    "mass price recalculation"
                );
            }
            other => info!("event: {:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn send_or_log_does_not_fail_on_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let sender = EventSender::new(tx);
        drop(rx);

        // Must not panic or error
        sender
            .send_or_log(Event::MovementRecorded {
                movement_id: 1,
                lot_id: 1,
                movement_type: "ingreso".into(),
                quantity: dec!(5),
            })
            .await;
    }

    #[test]
    fn events_serialize() {
        let event = Event::ReservationReleased {
            reservation_id: Uuid::new_v4(),
            released: dec!(3),
            remaining: dec!(2),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ReservationReleased"));
    }
}
