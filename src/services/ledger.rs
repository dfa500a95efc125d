//! Lot inventory ledger: per-lot stock positions plus the append-only
//! movement log that is the system of record for every balance.
//!
//! Movement append and position update always commit as one unit. The
//! position row carries a `version` counter; updates are an optimistic
//! compare-and-set retried a bounded number of times, so two concurrent
//! debits can never both observe the same stale balance.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait,
    FromQueryResult, JoinType, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, TransactionTrait,
};
use sea_orm::sea_query::NullOrdering;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    lot::{self, Entity as LotEntity},
    presentation,
    stock_movement::{self, Entity as StockMovementEntity, MovementType},
    stock_position::{self, Entity as StockPositionEntity},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::fefo::LotCandidate;

/// Modules that originate movements, recorded on every log entry.
pub mod origins {
    pub const RECEPCIONES: &str = "recepciones";
    pub const RESERVAS: &str = "reservas";
    pub const AJUSTES: &str = "ajustes";
    pub const TRANSFERENCIAS: &str = "transferencias";
    pub const MANUAL: &str = "manual";
}

const CAS_MAX_ATTEMPTS: u32 = 3;

/// A movement to record. `quantity` is signed: positive for `ingreso`,
/// negative for `salida`, signed for `ajuste`/`transferencia`, and a
/// positive magnitude for `reserva`/`liberacion` (the amount moved between
/// the available and reserved buckets).
#[derive(Debug, Clone)]
pub struct MovementRecord {
    pub movement_type: MovementType,
    pub lot_id: i64,
    pub quantity: Decimal,
    pub source_warehouse_id: Option<i32>,
    pub dest_warehouse_id: Option<i32>,
    pub origin_module: String,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub created_by: String,
}

/// Signed effect of a movement on (available, reserved).
fn deltas(record: &MovementRecord) -> Result<(Decimal, Decimal), ServiceError> {
    let q = record.quantity;
    match record.movement_type {
        MovementType::Ingreso => {
            if q <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "ingreso quantity must be positive".into(),
                ));
            }
            Ok((q, Decimal::ZERO))
        }
        MovementType::Salida => {
            if q >= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "salida quantity must be negative".into(),
                ));
            }
            if record.origin_module == origins::RESERVAS {
                // Consuming a reservation debits the reserved bucket.
                Ok((Decimal::ZERO, q))
            } else {
                Ok((q, Decimal::ZERO))
            }
        }
        MovementType::Ajuste | MovementType::Transferencia => {
            if q == Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "movement quantity must be non-zero".into(),
                ));
            }
            Ok((q, Decimal::ZERO))
        }
        MovementType::Reserva => {
            if q <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "reserva quantity must be positive".into(),
                ));
            }
            Ok((-q, q))
        }
        MovementType::Liberacion => {
            if q <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "liberacion quantity must be positive".into(),
                ));
            }
            Ok((q, -q))
        }
    }
}

/// A lot position row as listed by `positions`.
#[derive(Debug, Clone, FromQueryResult, Serialize, Deserialize)]
pub struct LotPositionRow {
    pub lot_id: i64,
    pub presentation_id: Uuid,
    pub sku: String,
    pub presentation_name: String,
    pub lot_number: String,
    pub warehouse_id: i32,
    pub expiration_date: Option<chrono::NaiveDate>,
    pub available: Decimal,
    pub reserved: Decimal,
    pub minimum_stock: Decimal,
}

/// Typed query over lot positions.
#[derive(Debug, Clone, Default)]
pub struct PositionQuery {
    pub warehouse_id: Option<i32>,
    pub text: Option<String>,
    pub expires_before: Option<chrono::NaiveDate>,
    pub page: u64,
    pub per_page: u64,
}

/// Stored vs replayed balances for one lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub lot_id: i64,
    pub stored_available: Decimal,
    pub stored_reserved: Decimal,
    pub replayed_available: Decimal,
    pub replayed_reserved: Decimal,
    pub movement_count: u64,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct LedgerService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl LedgerService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Atomically applies a movement: position update and log append commit
    /// as one transaction.
    #[instrument(skip(self))]
    pub async fn record_movement(
        &self,
        record: MovementRecord,
    ) -> Result<stock_movement::Model, ServiceError> {
        let db = &*self.db;
        let txn = db.begin().await?;
        let movement = Self::post(&txn, record).await?;
        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::MovementRecorded {
                    movement_id: movement.id,
                    lot_id: movement.lot_id,
                    movement_type: movement.movement_type.clone(),
                    quantity: movement.quantity,
                })
                .await;
        }

        Ok(movement)
    }

    /// Posts a movement inside a caller-owned transaction. Other services
    /// compose several postings with their own writes through this.
    pub async fn post<C: ConnectionTrait>(
        conn: &C,
        record: MovementRecord,
    ) -> Result<stock_movement::Model, ServiceError> {
        let (delta_available, delta_reserved) = deltas(&record)?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let position = StockPositionEntity::find()
                .filter(stock_position::Column::LotId.eq(record.lot_id))
                .one(conn)
                .await?;

            match position {
                Some(position) => {
                    let new_available = position.available + delta_available;
                    let new_reserved = position.reserved + delta_reserved;

                    if new_available < Decimal::ZERO {
                        return Err(ServiceError::InsufficientStock(format!(
                            "lot {}: available {} cannot absorb {}",
                            record.lot_id, position.available, delta_available
                        )));
                    }
                    if new_reserved < Decimal::ZERO {
                        return Err(ServiceError::Conflict(format!(
                            "lot {}: reserved balance cannot go negative",
                            record.lot_id
                        )));
                    }

                    let result = StockPositionEntity::update_many()
                        .col_expr(stock_position::Column::Available, Expr::value(new_available))
                        .col_expr(stock_position::Column::Reserved, Expr::value(new_reserved))
                        .col_expr(
                            stock_position::Column::Version,
                            Expr::value(position.version + 1),
                        )
                        .col_expr(stock_position::Column::UpdatedAt, Expr::value(Utc::now()))
                        .filter(stock_position::Column::Id.eq(position.id))
                        .filter(stock_position::Column::Version.eq(position.version))
                        .exec(conn)
                        .await?;

                    if result.rows_affected == 1 {
                        break;
                    }
                }
                None => {
                    // First movement for this lot: only a credit may create
                    // the position.
                    if delta_available < Decimal::ZERO || delta_reserved != Decimal::ZERO {
                        return Err(ServiceError::InsufficientStock(format!(
                            "lot {} has no stock position",
                            record.lot_id
                        )));
                    }

                    let lot = LotEntity::find_by_id(record.lot_id)
                        .one(conn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("lot {} not found", record.lot_id))
                        })?;

                    let created = stock_position::ActiveModel {
                        lot_id: Set(record.lot_id),
                        warehouse_id: Set(lot.warehouse_id),
                        available: Set(delta_available),
                        reserved: Set(Decimal::ZERO),
                        minimum_stock: Set(Decimal::ZERO),
                        version: Set(0),
                        updated_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(conn)
                    .await;

                    match created {
                        Ok(_) => break,
                        // Lost a create race; retry against the winner's row.
                        Err(_) if attempt < CAS_MAX_ATTEMPTS => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            if attempt >= CAS_MAX_ATTEMPTS {
                return Err(ServiceError::Conflict(format!(
                    "concurrent modification of lot {} position",
                    record.lot_id
                )));
            }
        }

        let movement = stock_movement::ActiveModel {
            occurred_at: Set(Utc::now()),
            movement_type: Set(record.movement_type.as_str().to_string()),
            lot_id: Set(record.lot_id),
            quantity: Set(record.quantity),
            source_warehouse_id: Set(record.source_warehouse_id),
            dest_warehouse_id: Set(record.dest_warehouse_id),
            origin_module: Set(record.origin_module.clone()),
            reference_id: Set(record.reference_id.clone()),
            note: Set(record.note.clone()),
            created_by: Set(record.created_by.clone()),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok(movement)
    }

    /// Moves quantity of a lot to another warehouse, creating the
    /// destination lot (same identity, destination warehouse) when needed.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        lot_id: i64,
        dest_warehouse_id: i32,
        quantity: Decimal,
        created_by: &str,
        note: Option<String>,
    ) -> Result<(), ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "transfer quantity must be positive".into(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        let source = LotEntity::find_by_id(lot_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("lot {lot_id} not found")))?;

        if source.warehouse_id == dest_warehouse_id {
            return Err(ServiceError::ValidationError(
                "source and destination warehouse must differ".into(),
            ));
        }

        let dest_lot = match LotEntity::find()
            .filter(lot::Column::PresentationId.eq(source.presentation_id))
            .filter(lot::Column::WarehouseId.eq(dest_warehouse_id))
            .filter(lot::Column::LotNumber.eq(source.lot_number.clone()))
            .one(&txn)
            .await?
        {
            Some(existing) => existing,
            None => {
                lot::ActiveModel {
                    presentation_id: Set(source.presentation_id),
                    warehouse_id: Set(dest_warehouse_id),
                    lot_number: Set(source.lot_number.clone()),
                    manufacture_date: Set(source.manufacture_date),
                    expiration_date: Set(source.expiration_date),
                    received_quantity: Set(Decimal::ZERO),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&txn)
                .await?
            }
        };

        Self::post(
            &txn,
            MovementRecord {
                movement_type: MovementType::Transferencia,
                lot_id: source.id,
                quantity: -quantity,
                source_warehouse_id: Some(source.warehouse_id),
                dest_warehouse_id: Some(dest_warehouse_id),
                origin_module: origins::TRANSFERENCIAS.to_string(),
                reference_id: Some(dest_lot.id.to_string()),
                note: note.clone(),
                created_by: created_by.to_string(),
            },
        )
        .await?;

        Self::post(
            &txn,
            MovementRecord {
                movement_type: MovementType::Transferencia,
                lot_id: dest_lot.id,
                quantity,
                source_warehouse_id: Some(source.warehouse_id),
                dest_warehouse_id: Some(dest_warehouse_id),
                origin_module: origins::TRANSFERENCIAS.to_string(),
                reference_id: Some(source.id.to_string()),
                note,
                created_by: created_by.to_string(),
            },
        )
        .await?;

        txn.commit().await?;

        info!(
            lot_id,
            dest_warehouse_id,
            %quantity,
            "lot transferred between warehouses"
        );
        Ok(())
    }

    /// Paginated lot positions ordered by expiration (nulls last) then SKU.
    #[instrument(skip(self))]
    pub async fn positions(
        &self,
        query: PositionQuery,
    ) -> Result<(Vec<LotPositionRow>, u64), ServiceError> {
        if query.page == 0 {
            return Err(ServiceError::ValidationError(
                "page number must be greater than 0".into(),
            ));
        }

        let db = &*self.db;
        let mut select = StockPositionEntity::find()
            .join(JoinType::InnerJoin, stock_position::Relation::Lot.def())
            .join(JoinType::InnerJoin, lot::Relation::Presentation.def());

        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_position::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(text) = &query.text {
            let needle = text.trim();
            if !needle.is_empty() {
                select = select.filter(
                    presentation::Column::Sku
                        .contains(needle)
                        .or(presentation::Column::Name.contains(needle))
                        .or(lot::Column::LotNumber.contains(needle)),
                );
            }
        }
        if let Some(before) = query.expires_before {
            select = select.filter(lot::Column::ExpirationDate.lte(before));
        }

        let select = select
            .select_only()
            .column_as(stock_position::Column::LotId, "lot_id")
            .column_as(lot::Column::PresentationId, "presentation_id")
            .column_as(presentation::Column::Sku, "sku")
            .column_as(presentation::Column::Name, "presentation_name")
            .column_as(lot::Column::LotNumber, "lot_number")
            .column_as(stock_position::Column::WarehouseId, "warehouse_id")
            .column_as(lot::Column::ExpirationDate, "expiration_date")
            .column_as(stock_position::Column::Available, "available")
            .column_as(stock_position::Column::Reserved, "reserved")
            .column_as(stock_position::Column::MinimumStock, "minimum_stock")
            .order_by_with_nulls(lot::Column::ExpirationDate, Order::Asc, NullOrdering::Last)
            .order_by_asc(presentation::Column::Sku)
            .into_model::<LotPositionRow>();

        let paginator = select.paginate(db, query.per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(query.page - 1).await?;

        Ok((rows, total))
    }

    /// Most recent movements for a lot, newest first.
    #[instrument(skip(self))]
    pub async fn recent_movements(
        &self,
        lot_id: i64,
        warehouse_id: Option<i32>,
        limit: u64,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        let db = &*self.db;
        let mut query = StockMovementEntity::find()
            .filter(stock_movement::Column::LotId.eq(lot_id));

        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(
                stock_movement::Column::SourceWarehouseId
                    .eq(warehouse_id)
                    .or(stock_movement::Column::DestWarehouseId.eq(warehouse_id)),
            );
        }

        let movements = query
            .order_by_desc(stock_movement::Column::OccurredAt)
            .order_by_desc(stock_movement::Column::Id)
            .limit(limit.clamp(1, 500))
            .all(db)
            .await?;

        Ok(movements)
    }

    /// Replays the full movement log of a lot and compares the result with
    /// the cached position.
    #[instrument(skip(self))]
    pub async fn verify_position(&self, lot_id: i64) -> Result<ConsistencyReport, ServiceError> {
        let db = &*self.db;

        let position = StockPositionEntity::find()
            .filter(stock_position::Column::LotId.eq(lot_id))
            .one(db)
            .await?;
        let (stored_available, stored_reserved) = position
            .map(|p| (p.available, p.reserved))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO));

        let movements = StockMovementEntity::find()
            .filter(stock_movement::Column::LotId.eq(lot_id))
            .order_by_asc(stock_movement::Column::Id)
            .all(db)
            .await?;

        let mut available = Decimal::ZERO;
        let mut reserved = Decimal::ZERO;
        for movement in &movements {
            let movement_type = MovementType::from_str(&movement.movement_type).ok_or_else(
                || ServiceError::InternalError(format!(
                    "unknown movement type {} in log",
                    movement.movement_type
                )),
            )?;
            let q = movement.quantity;
            match movement_type {
                MovementType::Ingreso
                | MovementType::Ajuste
                | MovementType::Transferencia => available += q,
                MovementType::Salida => {
                    if movement.origin_module == origins::RESERVAS {
                        reserved += q;
                    } else {
                        available += q;
                    }
                }
                MovementType::Reserva => {
                    available -= q;
                    reserved += q;
                }
                MovementType::Liberacion => {
                    available += q;
                    reserved -= q;
                }
            }
        }

        Ok(ConsistencyReport {
            lot_id,
            stored_available,
            stored_reserved,
            replayed_available: available,
            replayed_reserved: reserved,
            movement_count: movements.len() as u64,
            consistent: available == stored_available && reserved == stored_reserved,
        })
    }

    /// Updates the minimum-stock threshold of a lot position.
    #[instrument(skip(self))]
    pub async fn set_minimum_stock(
        &self,
        lot_id: i64,
        minimum: Decimal,
    ) -> Result<(), ServiceError> {
        if minimum < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "minimum stock cannot be negative".into(),
            ));
        }

        let db = &*self.db;
        let result = StockPositionEntity::update_many()
            .col_expr(stock_position::Column::MinimumStock, Expr::value(minimum))
            .col_expr(stock_position::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_position::Column::LotId.eq(lot_id))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "no stock position for lot {lot_id}"
            )));
        }
        Ok(())
    }

    /// Candidate lots for FEFO planning: positive availability for the
    /// presentation in the warehouse.
    pub async fn candidate_lots(
        &self,
        presentation_id: Uuid,
        warehouse_id: i32,
    ) -> Result<Vec<LotCandidate>, ServiceError> {
        Self::candidate_lots_in(&*self.db, presentation_id, warehouse_id).await
    }

    /// Same as [`candidate_lots`] but inside a caller-owned transaction, for
    /// commit-time re-validation.
    pub async fn candidate_lots_in<C: ConnectionTrait>(
        conn: &C,
        presentation_id: Uuid,
        warehouse_id: i32,
    ) -> Result<Vec<LotCandidate>, ServiceError> {
        #[derive(FromQueryResult)]
        struct CandidateRow {
            lot_id: i64,
            expiration_date: Option<chrono::NaiveDate>,
            available: Decimal,
        }

        let rows = StockPositionEntity::find()
            .join(JoinType::InnerJoin, stock_position::Relation::Lot.def())
            .filter(lot::Column::PresentationId.eq(presentation_id))
            .filter(stock_position::Column::WarehouseId.eq(warehouse_id))
            .filter(stock_position::Column::Available.gt(Decimal::ZERO))
            .select_only()
            .column_as(stock_position::Column::LotId, "lot_id")
            .column_as(lot::Column::ExpirationDate, "expiration_date")
            .column_as(stock_position::Column::Available, "available")
            .into_model::<CandidateRow>()
            .all(conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| LotCandidate {
                lot_id: r.lot_id,
                expiration_date: r.expiration_date,
                available: r.available,
            })
            .collect())
    }
}
