//! Reservation engine: FEFO-planned holds on lot stock for advance
//! payments and sales.
//!
//! Planning runs over a read-only snapshot; the plan is rebuilt from fresh
//! balances inside the transaction that commits the `reserva` movements, so
//! a stale snapshot can never oversubscribe a lot. Throughout the lifecycle
//! `released_quantity + applied_quantity <= requested_quantity` holds.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::DbPool;
use crate::entities::{
    lot::Entity as LotEntity,
    reservation::{self, Entity as ReservationEntity, OwnerType, ReservationStatus},
    reservation_allocation::{self, Entity as AllocationEntity},
    stock_movement::MovementType,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::fefo;
use crate::services::ledger::{origins, LedgerService, MovementRecord};

/// Lot-level breakdown of a reservation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationView {
    pub lot_id: i64,
    pub lot_number: String,
    pub expiration_date: Option<chrono::NaiveDate>,
    pub allocated: Decimal,
    pub remaining: Decimal,
}

/// Read-only projection of a reservation and its allocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationView {
    pub id: Uuid,
    pub owner_type: String,
    pub owner_id: Uuid,
    pub presentation_id: Uuid,
    pub warehouse_id: i32,
    pub requested_quantity: Decimal,
    pub reserved_quantity: Decimal,
    pub released_quantity: Decimal,
    pub applied_quantity: Decimal,
    pub shortfall_quantity: Decimal,
    pub shortfall_allowed: bool,
    pub status: String,
    pub allocations: Vec<AllocationView>,
}

/// Outcome of a release or apply call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationChange {
    pub reservation_id: Uuid,
    pub quantity: Decimal,
    pub remaining_reserved: Decimal,
    pub status: String,
}

#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl ReservationService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Reserves stock for an owner document using a FEFO plan.
    #[instrument(skip(self, user))]
    pub async fn reserve(
        &self,
        owner_type: OwnerType,
        owner_id: Uuid,
        presentation_id: Uuid,
        warehouse_id: i32,
        quantity: Decimal,
        shortfall_allowed: bool,
        user: &CurrentUser,
    ) -> Result<ReservationView, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "reservation quantity must be positive".into(),
            ));
        }

        let db = &*self.db;

        // Cheap pre-check outside the write transaction; rejects hopeless
        // requests without taking locks.
        let snapshot =
            LedgerService::candidate_lots_in(db, presentation_id, warehouse_id).await?;
        fefo::plan(snapshot, quantity, shortfall_allowed)?;

        let txn = db.begin().await?;

        // Re-validate against fresh balances inside the transaction.
        let candidates =
            LedgerService::candidate_lots_in(&txn, presentation_id, warehouse_id).await?;
        let plan = fefo::plan(candidates, quantity, shortfall_allowed)?;

        let reservation_id = Uuid::new_v4();
        for allocation in &plan.allocations {
            LedgerService::post(
                &txn,
                MovementRecord {
                    movement_type: MovementType::Reserva,
                    lot_id: allocation.lot_id,
                    quantity: allocation.quantity,
                    source_warehouse_id: Some(warehouse_id),
                    dest_warehouse_id: None,
                    origin_module: origins::RESERVAS.to_string(),
                    reference_id: Some(reservation_id.to_string()),
                    note: None,
                    created_by: user.id.clone(),
                },
            )
            .await?;
        }

        let reserved_total = plan.allocated_total();
        reservation::ActiveModel {
            id: Set(reservation_id),
            owner_type: Set(owner_type.as_str().to_string()),
            owner_id: Set(owner_id),
            presentation_id: Set(presentation_id),
            warehouse_id: Set(warehouse_id),
            requested_quantity: Set(quantity),
            reserved_quantity: Set(reserved_total),
            released_quantity: Set(Decimal::ZERO),
            applied_quantity: Set(Decimal::ZERO),
            shortfall_quantity: Set(plan.shortfall),
            shortfall_allowed: Set(shortfall_allowed),
            status: Set(ReservationStatus::Active.as_str().to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        for (sequence, allocation) in plan.allocations.iter().enumerate() {
            reservation_allocation::ActiveModel {
                reservation_id: Set(reservation_id),
                lot_id: Set(allocation.lot_id),
                quantity: Set(allocation.quantity),
                remaining: Set(allocation.quantity),
                sequence: Set(sequence as i32),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::InventoryReserved {
                    reservation_id,
                    presentation_id,
                    warehouse_id,
                    reserved: reserved_total,
                    shortfall: plan.shortfall,
                })
                .await;
        }

        info!(
            %reservation_id,
            %reserved_total,
            shortfall = %plan.shortfall,
            "reservation committed"
        );

        self.view(reservation_id).await
    }

    /// Releases part of the reserved quantity back to availability,
    /// starting from the latest-expiring allocated lot.
    #[instrument(skip(self, user))]
    pub async fn release(
        &self,
        reservation_id: Uuid,
        quantity: Decimal,
        user: &CurrentUser,
    ) -> Result<ReservationChange, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "release quantity must be positive".into(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;
        let change = self
            .release_in(&txn, reservation_id, quantity, user)
            .await?;
        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReservationReleased {
                    reservation_id,
                    released: change.quantity,
                    remaining: change.remaining_reserved,
                })
                .await;
        }

        Ok(change)
    }

    /// Releases the entire remaining reserved quantity. Idempotent: calling
    /// it on a fully released reservation is a zero-effect no-op.
    #[instrument(skip(self, user))]
    pub async fn release_all(
        &self,
        reservation_id: Uuid,
        user: &CurrentUser,
    ) -> Result<ReservationChange, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await?;

        let reservation = Self::load(&txn, reservation_id).await?;
        if reservation.reserved_quantity == Decimal::ZERO {
            txn.commit().await?;
            return Ok(ReservationChange {
                reservation_id,
                quantity: Decimal::ZERO,
                remaining_reserved: Decimal::ZERO,
                status: reservation.status,
            });
        }

        let change = self
            .release_in(&txn, reservation_id, reservation.reserved_quantity, user)
            .await?;
        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReservationReleased {
                    reservation_id,
                    released: change.quantity,
                    remaining: change.remaining_reserved,
                })
                .await;
        }

        Ok(change)
    }

    async fn release_in(
        &self,
        txn: &DatabaseTransaction,
        reservation_id: Uuid,
        quantity: Decimal,
        user: &CurrentUser,
    ) -> Result<ReservationChange, ServiceError> {
        let reservation = Self::load(txn, reservation_id).await?;

        if quantity > reservation.reserved_quantity {
            return Err(ServiceError::Conflict(format!(
                "release of {} exceeds remaining reserved {}",
                quantity, reservation.reserved_quantity
            )));
        }

        // Reverse FEFO: free the latest-expiring lots first so the earliest
        // keep being consumed ahead of expiry.
        let allocations = AllocationEntity::find()
            .filter(reservation_allocation::Column::ReservationId.eq(reservation_id))
            .order_by_desc(reservation_allocation::Column::Sequence)
            .all(txn)
            .await?;

        let mut to_release = quantity;
        for allocation in allocations {
            if to_release == Decimal::ZERO {
                break;
            }
            if allocation.remaining == Decimal::ZERO {
                continue;
            }
            let take = to_release.min(allocation.remaining);

            LedgerService::post(
                txn,
                MovementRecord {
                    movement_type: MovementType::Liberacion,
                    lot_id: allocation.lot_id,
                    quantity: take,
                    source_warehouse_id: Some(reservation.warehouse_id),
                    dest_warehouse_id: None,
                    origin_module: origins::RESERVAS.to_string(),
                    reference_id: Some(reservation_id.to_string()),
                    note: None,
                    created_by: user.id.clone(),
                },
            )
            .await?;

            let mut active: reservation_allocation::ActiveModel = allocation.clone().into();
            active.remaining = Set(allocation.remaining - take);
            active.update(txn).await?;

            to_release -= take;
        }

        let new_reserved = reservation.reserved_quantity - quantity;
        let new_released = reservation.released_quantity + quantity;
        let status = if new_reserved == Decimal::ZERO {
            ReservationStatus::Released
        } else {
            ReservationStatus::PartiallyReleased
        };

        let mut active: reservation::ActiveModel = reservation.into();
        active.reserved_quantity = Set(new_reserved);
        active.released_quantity = Set(new_released);
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.update(txn).await?;

        Ok(ReservationChange {
            reservation_id,
            quantity,
            remaining_reserved: new_reserved,
            status: status.as_str().to_string(),
        })
    }

    /// Permanently consumes reserved quantity against a downstream
    /// document, FEFO-first.
    #[instrument(skip(self, user))]
    pub async fn apply(
        &self,
        reservation_id: Uuid,
        quantity: Decimal,
        reference: Option<String>,
        user: &CurrentUser,
    ) -> Result<ReservationChange, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "apply quantity must be positive".into(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        let reservation = Self::load(&txn, reservation_id).await?;
        if quantity > reservation.reserved_quantity {
            return Err(ServiceError::Conflict(format!(
                "apply of {} exceeds remaining reserved {}",
                quantity, reservation.reserved_quantity
            )));
        }

        let allocations = AllocationEntity::find()
            .filter(reservation_allocation::Column::ReservationId.eq(reservation_id))
            .order_by_asc(reservation_allocation::Column::Sequence)
            .all(&txn)
            .await?;

        let reference_id = reference.unwrap_or_else(|| reservation_id.to_string());
        let mut to_apply = quantity;
        for allocation in allocations {
            if to_apply == Decimal::ZERO {
                break;
            }
            if allocation.remaining == Decimal::ZERO {
                continue;
            }
            let take = to_apply.min(allocation.remaining);

            LedgerService::post(
                &txn,
                MovementRecord {
                    movement_type: MovementType::Salida,
                    lot_id: allocation.lot_id,
                    quantity: -take,
                    source_warehouse_id: Some(reservation.warehouse_id),
                    dest_warehouse_id: None,
                    origin_module: origins::RESERVAS.to_string(),
                    reference_id: Some(reference_id.clone()),
                    note: None,
                    created_by: user.id.clone(),
                },
            )
            .await?;

            let mut active: reservation_allocation::ActiveModel = allocation.clone().into();
            active.remaining = Set(allocation.remaining - take);
            active.update(&txn).await?;

            to_apply -= take;
        }

        let new_reserved = reservation.reserved_quantity - quantity;
        let new_applied = reservation.applied_quantity + quantity;
        let status = if new_reserved == Decimal::ZERO {
            ReservationStatus::Applied
        } else {
            ReservationStatus::from_str(&reservation.status)
                .unwrap_or(ReservationStatus::Active)
        };

        let mut active: reservation::ActiveModel = reservation.into();
        active.reserved_quantity = Set(new_reserved);
        active.applied_quantity = Set(new_applied);
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.update(&txn).await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReservationApplied {
                    reservation_id,
                    applied: quantity,
                    remaining: new_reserved,
                })
                .await;
        }

        Ok(ReservationChange {
            reservation_id,
            quantity,
            remaining_reserved: new_reserved,
            status: status.as_str().to_string(),
        })
    }

    /// Read-only projection of the reservation with its lot breakdown.
    #[instrument(skip(self))]
    pub async fn view(&self, reservation_id: Uuid) -> Result<ReservationView, ServiceError> {
        let db = &*self.db;

        let reservation = ReservationEntity::find_by_id(reservation_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("reservation {reservation_id} not found"))
            })?;

        let allocations = AllocationEntity::find()
            .filter(reservation_allocation::Column::ReservationId.eq(reservation_id))
            .order_by_asc(reservation_allocation::Column::Sequence)
            .find_also_related(LotEntity)
            .all(db)
            .await?;

        let allocations = allocations
            .into_iter()
            .map(|(allocation, lot)| {
                let lot = lot.ok_or_else(|| {
                    ServiceError::InternalError(format!(
                        "allocation {} references missing lot {}",
                        allocation.id, allocation.lot_id
                    ))
                })?;
                Ok(AllocationView {
                    lot_id: allocation.lot_id,
                    lot_number: lot.lot_number,
                    expiration_date: lot.expiration_date,
                    allocated: allocation.quantity,
                    remaining: allocation.remaining,
                })
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        Ok(ReservationView {
            id: reservation.id,
            owner_type: reservation.owner_type,
            owner_id: reservation.owner_id,
            presentation_id: reservation.presentation_id,
            warehouse_id: reservation.warehouse_id,
            requested_quantity: reservation.requested_quantity,
            reserved_quantity: reservation.reserved_quantity,
            released_quantity: reservation.released_quantity,
            applied_quantity: reservation.applied_quantity,
            shortfall_quantity: reservation.shortfall_quantity,
            shortfall_allowed: reservation.shortfall_allowed,
            status: reservation.status,
            allocations,
        })
    }

    /// Reservations owned by a document, newest first.
    #[instrument(skip(self))]
    pub async fn list_by_owner(
        &self,
        owner_type: OwnerType,
        owner_id: Uuid,
    ) -> Result<Vec<reservation::Model>, ServiceError> {
        let db = &*self.db;
        let rows = ReservationEntity::find()
            .filter(reservation::Column::OwnerType.eq(owner_type.as_str()))
            .filter(reservation::Column::OwnerId.eq(owner_id))
            .order_by_desc(reservation::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(rows)
    }

    async fn load(
        txn: &DatabaseTransaction,
        reservation_id: Uuid,
    ) -> Result<reservation::Model, ServiceError> {
        ReservationEntity::find_by_id(reservation_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("reservation {reservation_id} not found"))
            })
    }
}
