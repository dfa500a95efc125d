//! Goods receipt against approved purchases.
//!
//! Each received item finds or creates its lot, posts an `ingreso` into the
//! ledger and counts against the originating purchase line, which is capped
//! at the ordered quantity. Closing a reception is one-way.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::DbPool;
use crate::entities::{
    lot::{self, Entity as LotEntity},
    purchase::{self, Entity as PurchaseEntity, PurchaseStatus},
    purchase_line::{self, Entity as PurchaseLineEntity},
    reception::{self, Entity as ReceptionEntity, ReceptionStatus},
    reception_line::{self, Entity as ReceptionLineEntity},
    stock_movement::MovementType,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::ledger::{origins, LedgerService, MovementRecord};

/// One item of a goods receipt.
#[derive(Debug, Clone)]
pub struct ReceptionItemInput {
    pub purchase_line_id: i64,
    pub lot_number: String,
    pub manufacture_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub quantity: Decimal,
}

#[derive(Clone)]
pub struct ReceptionService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl ReceptionService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Registers a reception: creates the document and posts its items in
    /// one transaction, then advances the purchase status.
    #[instrument(skip(self, items, user))]
    pub async fn register(
        &self,
        purchase_id: Uuid,
        warehouse_id: i32,
        document_number: String,
        items: Vec<ReceptionItemInput>,
        user: &CurrentUser,
    ) -> Result<reception::Model, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "a reception needs at least one item".into(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        let purchase = Self::load_purchase(&txn, purchase_id).await?;
        Self::require_receivable(&purchase)?;

        let created = reception::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_id: Set(purchase_id),
            warehouse_id: Set(warehouse_id),
            document_number: Set(document_number),
            status: Set(ReceptionStatus::Open.as_str().to_string()),
            created_at: Set(Utc::now()),
            closed_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let posted = Self::post_items(&txn, &purchase, &created, &items, user).await?;
        let status_change = Self::advance_purchase(&txn, purchase).await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReceptionRegistered {
                    reception_id: created.id,
                    purchase_id,
                    lots_posted: posted,
                })
                .await;
            if let Some((old_status, new_status)) = status_change {
                sender
                    .send_or_log(Event::PurchaseStatusChanged {
                        purchase_id,
                        old_status,
                        new_status,
                    })
                    .await;
            }
        }

        info!(reception_id = %created.id, %purchase_id, posted, "reception registered");
        Ok(created)
    }

    /// Posts additional items to an open reception.
    #[instrument(skip(self, items, user))]
    pub async fn add_items(
        &self,
        reception_id: Uuid,
        items: Vec<ReceptionItemInput>,
        user: &CurrentUser,
    ) -> Result<reception::Model, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "no items to post".into(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await?;

        let reception = Self::load_reception(&txn, reception_id).await?;
        if ReceptionStatus::from_str(&reception.status) != Some(ReceptionStatus::Open) {
            return Err(ServiceError::IllegalState(format!(
                "reception {reception_id} is closed"
            )));
        }

        let purchase = Self::load_purchase(&txn, reception.purchase_id).await?;
        Self::require_receivable(&purchase)?;

        let posted = Self::post_items(&txn, &purchase, &reception, &items, user).await?;
        let status_change = Self::advance_purchase(&txn, purchase).await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReceptionRegistered {
                    reception_id,
                    purchase_id: reception.purchase_id,
                    lots_posted: posted,
                })
                .await;
            if let Some((old_status, new_status)) = status_change {
                sender
                    .send_or_log(Event::PurchaseStatusChanged {
                        purchase_id: reception.purchase_id,
                        old_status,
                        new_status,
                    })
                    .await;
            }
        }

        Ok(reception)
    }

    /// One-way terminal transition of the reception document.
    #[instrument(skip(self))]
    pub async fn close(&self, reception_id: Uuid) -> Result<reception::Model, ServiceError> {
        let db = &*self.db;
        let reception = Self::load_reception(db, reception_id).await?;

        if ReceptionStatus::from_str(&reception.status) == Some(ReceptionStatus::Closed) {
            return Err(ServiceError::IllegalState(format!(
                "reception {reception_id} is already closed"
            )));
        }

        let mut active: reception::ActiveModel = reception.into();
        active.status = Set(ReceptionStatus::Closed.as_str().to_string());
        active.closed_at = Set(Some(Utc::now()));
        let updated = active.update(db).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ReceptionClosed { reception_id })
                .await;
        }

        info!(%reception_id, "reception closed");
        Ok(updated)
    }

    pub async fn get(&self, reception_id: Uuid) -> Result<reception::Model, ServiceError> {
        Self::load_reception(&*self.db, reception_id).await
    }

    pub async fn lines(
        &self,
        reception_id: Uuid,
    ) -> Result<Vec<reception_line::Model>, ServiceError> {
        let db = &*self.db;
        let lines = ReceptionLineEntity::find()
            .filter(reception_line::Column::ReceptionId.eq(reception_id))
            .order_by_asc(reception_line::Column::Id)
            .all(db)
            .await?;
        Ok(lines)
    }

    async fn load_purchase<C: sea_orm::ConnectionTrait>(
        conn: &C,
        purchase_id: Uuid,
    ) -> Result<purchase::Model, ServiceError> {
        PurchaseEntity::find_by_id(purchase_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase {purchase_id} not found")))
    }

    async fn load_reception<C: sea_orm::ConnectionTrait>(
        conn: &C,
        reception_id: Uuid,
    ) -> Result<reception::Model, ServiceError> {
        ReceptionEntity::find_by_id(reception_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("reception {reception_id} not found")))
    }

    fn require_receivable(purchase: &purchase::Model) -> Result<(), ServiceError> {
        let status = PurchaseStatus::from_str(&purchase.status).map_err(|_| {
            ServiceError::InternalError(format!("unknown purchase status {}", purchase.status))
        })?;
        if !status.accepts_receptions() {
            return Err(ServiceError::IllegalState(format!(
                "purchase {} is {} and cannot receive goods",
                purchase.id, purchase.status
            )));
        }
        Ok(())
    }

    /// Posts every item: cap check, lot find-or-create, `ingreso` movement,
    /// reception line, purchase-line accumulation.
    async fn post_items(
        txn: &DatabaseTransaction,
        purchase: &purchase::Model,
        reception: &reception::Model,
        items: &[ReceptionItemInput],
        user: &CurrentUser,
    ) -> Result<usize, ServiceError> {
        for item in items {
            if item.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "received quantity must be positive".into(),
                ));
            }
            if item.lot_number.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "lot number is required".into(),
                ));
            }

            let line = PurchaseLineEntity::find_by_id(item.purchase_line_id)
                .one(txn)
                .await?
                .filter(|l| l.purchase_id == purchase.id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "purchase line {} not found on purchase {}",
                        item.purchase_line_id, purchase.id
                    ))
                })?;

            if line.received_quantity + item.quantity > line.quantity {
                return Err(ServiceError::Conflict(format!(
                    "line {}: ordered {}, already received {}, cannot receive {}",
                    line.id, line.quantity, line.received_quantity, item.quantity
                )));
            }

            let lot = Self::find_or_create_lot(txn, &line, reception.warehouse_id, item).await?;

            LedgerService::post(
                txn,
                MovementRecord {
                    movement_type: MovementType::Ingreso,
                    lot_id: lot.id,
                    quantity: item.quantity,
                    source_warehouse_id: None,
                    dest_warehouse_id: Some(reception.warehouse_id),
                    origin_module: origins::RECEPCIONES.to_string(),
                    reference_id: Some(reception.id.to_string()),
                    note: None,
                    created_by: user.id.clone(),
                },
            )
            .await?;

            reception_line::ActiveModel {
                reception_id: Set(reception.id),
                purchase_line_id: Set(line.id),
                lot_id: Set(lot.id),
                quantity: Set(item.quantity),
                ..Default::default()
            }
            .insert(txn)
            .await?;

            let new_received = line.received_quantity + item.quantity;
            let mut active: purchase_line::ActiveModel = line.into();
            active.received_quantity = Set(new_received);
            active.update(txn).await?;
        }

        Ok(items.len())
    }

    async fn find_or_create_lot(
        txn: &DatabaseTransaction,
        line: &purchase_line::Model,
        warehouse_id: i32,
        item: &ReceptionItemInput,
    ) -> Result<lot::Model, ServiceError> {
        let existing = LotEntity::find()
            .filter(lot::Column::PresentationId.eq(line.presentation_id))
            .filter(lot::Column::WarehouseId.eq(warehouse_id))
            .filter(lot::Column::LotNumber.eq(item.lot_number.clone()))
            .one(txn)
            .await?;

        match existing {
            Some(found) => {
                if found.manufacture_date != item.manufacture_date
                    || found.expiration_date != item.expiration_date
                {
                    return Err(ServiceError::Conflict(format!(
                        "lot {} exists with different manufacture/expiration dates",
                        item.lot_number
                    )));
                }
                let new_received = found.received_quantity + item.quantity;
                let mut active: lot::ActiveModel = found.clone().into();
                active.received_quantity = Set(new_received);
                let updated = active.update(txn).await?;
                Ok(updated)
            }
            None => {
                let created = lot::ActiveModel {
                    presentation_id: Set(line.presentation_id),
                    warehouse_id: Set(warehouse_id),
                    lot_number: Set(item.lot_number.clone()),
                    manufacture_date: Set(item.manufacture_date),
                    expiration_date: Set(item.expiration_date),
                    received_quantity: Set(item.quantity),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(txn)
                .await?;
                Ok(created)
            }
        }
    }

    /// Advances the purchase after receipts: partially received while any
    /// line is short, closed once every line is fully received.
    async fn advance_purchase(
        txn: &DatabaseTransaction,
        purchase: purchase::Model,
    ) -> Result<Option<(String, String)>, ServiceError> {
        let lines = PurchaseLineEntity::find()
            .filter(purchase_line::Column::PurchaseId.eq(purchase.id))
            .all(txn)
            .await?;

        let fully_received =
            !lines.is_empty() && lines.iter().all(|l| l.received_quantity >= l.quantity);
        let target = if fully_received {
            PurchaseStatus::Closed
        } else {
            PurchaseStatus::PartiallyReceived
        };

        if purchase.status == target.as_str() {
            return Ok(None);
        }

        let current = PurchaseStatus::from_str(&purchase.status).map_err(|_| {
            ServiceError::InternalError(format!("unknown purchase status {}", purchase.status))
        })?;
        if !current.can_transition_to(target) {
            return Err(ServiceError::IllegalState(format!(
                "purchase {} cannot go from {} to {}",
                purchase.id,
                current.as_str(),
                target.as_str()
            )));
        }

        let old_status = purchase.status.clone();
        let mut active: purchase::ActiveModel = purchase.into();
        active.status = Set(target.as_str().to_string());
        active.updated_at = Set(Some(Utc::now()));
        active.update(txn).await?;

        Ok(Some((old_status, target.as_str().to_string())))
    }
}
