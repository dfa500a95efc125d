//! Purchase order lifecycle.
//!
//! Detail lines are mutable only while the purchase is a draft; status
//! changes go through the explicit transition table on `PurchaseStatus`.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::purchase::{self, Entity as PurchaseEntity, PurchaseStatus};
use crate::entities::purchase_line::{self, Entity as PurchaseLineEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Input for a new or updated purchase line.
#[derive(Debug, Clone)]
pub struct PurchaseLineInput {
    pub presentation_id: Uuid,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub expected_date: Option<NaiveDate>,
}

impl PurchaseLineInput {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "line quantity must be positive".into(),
            ));
        }
        if self.unit_cost < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "unit cost cannot be negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PurchaseService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl PurchaseService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a draft purchase with its initial lines.
    #[instrument(skip(self, lines))]
    pub async fn create(
        &self,
        supplier_id: Uuid,
        currency: &str,
        exchange_rate: Decimal,
        notes: Option<String>,
        lines: Vec<PurchaseLineInput>,
    ) -> Result<purchase::Model, ServiceError> {
        if currency.len() != 3 {
            return Err(ServiceError::ValidationError(
                "currency must be a 3-letter code".into(),
            ));
        }
        if exchange_rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "exchange rate must be positive".into(),
            ));
        }
        for line in &lines {
            line.validate()?;
        }

        let db = &*self.db;
        let purchase = purchase::ActiveModel {
            id: Set(Uuid::new_v4()),
            supplier_id: Set(supplier_id),
            currency: Set(currency.to_uppercase()),
            exchange_rate: Set(exchange_rate),
            status: Set(PurchaseStatus::Draft.as_str().to_string()),
            notes: Set(notes),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(db)
        .await?;

        for line in lines {
            purchase_line::ActiveModel {
                purchase_id: Set(purchase.id),
                presentation_id: Set(line.presentation_id),
                quantity: Set(line.quantity),
                unit_cost: Set(line.unit_cost),
                expected_date: Set(line.expected_date),
                received_quantity: Set(Decimal::ZERO),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }

        info!(purchase_id = %purchase.id, "purchase created");
        Ok(purchase)
    }

    pub async fn get(&self, purchase_id: Uuid) -> Result<purchase::Model, ServiceError> {
        let db = &*self.db;
        PurchaseEntity::find_by_id(purchase_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("purchase {purchase_id} not found")))
    }

    pub async fn lines(
        &self,
        purchase_id: Uuid,
    ) -> Result<Vec<purchase_line::Model>, ServiceError> {
        let db = &*self.db;
        let lines = PurchaseLineEntity::find()
            .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
            .order_by_asc(purchase_line::Column::Id)
            .all(db)
            .await?;
        Ok(lines)
    }

    /// Paginated listing with optional status/supplier filters.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        status: Option<PurchaseStatus>,
        supplier_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<purchase::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "page number must be greater than 0".into(),
            ));
        }

        let db = &*self.db;
        let mut query = PurchaseEntity::find();
        if let Some(status) = status {
            query = query.filter(purchase::Column::Status.eq(status.as_str()));
        }
        if let Some(supplier_id) = supplier_id {
            query = query.filter(purchase::Column::SupplierId.eq(supplier_id));
        }
        query = query.order_by_desc(purchase::Column::CreatedAt);

        let paginator = query.paginate(db, per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;
        Ok((rows, total))
    }

    async fn require_draft(&self, purchase_id: Uuid) -> Result<purchase::Model, ServiceError> {
        let purchase = self.get(purchase_id).await?;
        let status = PurchaseStatus::from_str(&purchase.status);
        if status != Ok(PurchaseStatus::Draft) {
            return Err(ServiceError::IllegalState(format!(
                "purchase {} is {}; lines are only editable in draft",
                purchase_id, purchase.status
            )));
        }
        Ok(purchase)
    }

    /// Adds a detail line to a draft purchase.
    #[instrument(skip(self))]
    pub async fn add_line(
        &self,
        purchase_id: Uuid,
        line: PurchaseLineInput,
    ) -> Result<purchase_line::Model, ServiceError> {
        line.validate()?;
        self.require_draft(purchase_id).await?;

        let db = &*self.db;
        let created = purchase_line::ActiveModel {
            purchase_id: Set(purchase_id),
            presentation_id: Set(line.presentation_id),
            quantity: Set(line.quantity),
            unit_cost: Set(line.unit_cost),
            expected_date: Set(line.expected_date),
            received_quantity: Set(Decimal::ZERO),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(created)
    }

    /// Rewrites a detail line of a draft purchase.
    #[instrument(skip(self))]
    pub async fn update_line(
        &self,
        purchase_id: Uuid,
        line_id: i64,
        line: PurchaseLineInput,
    ) -> Result<purchase_line::Model, ServiceError> {
        line.validate()?;
        self.require_draft(purchase_id).await?;

        let db = &*self.db;
        let existing = PurchaseLineEntity::find_by_id(line_id)
            .one(db)
            .await?
            .filter(|l| l.purchase_id == purchase_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "line {line_id} not found on purchase {purchase_id}"
                ))
            })?;

        let mut active: purchase_line::ActiveModel = existing.into();
        active.presentation_id = Set(line.presentation_id);
        active.quantity = Set(line.quantity);
        active.unit_cost = Set(line.unit_cost);
        active.expected_date = Set(line.expected_date);
        let updated = active.update(db).await?;
        Ok(updated)
    }

    /// Removes a detail line from a draft purchase.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, purchase_id: Uuid, line_id: i64) -> Result<(), ServiceError> {
        self.require_draft(purchase_id).await?;

        let db = &*self.db;
        let result = PurchaseLineEntity::delete_many()
            .filter(purchase_line::Column::Id.eq(line_id))
            .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "line {line_id} not found on purchase {purchase_id}"
            )));
        }
        Ok(())
    }

    /// Deletes a purchase. Only allowed while it has zero detail lines.
    #[instrument(skip(self))]
    pub async fn delete(&self, purchase_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        self.get(purchase_id).await?;

        let line_count = PurchaseLineEntity::find()
            .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
            .count(db)
            .await?;
        if line_count > 0 {
            return Err(ServiceError::Conflict(format!(
                "purchase {purchase_id} has {line_count} lines and cannot be deleted"
            )));
        }

        PurchaseEntity::delete_by_id(purchase_id).exec(db).await?;
        info!(%purchase_id, "purchase deleted");
        Ok(())
    }

    /// Applies a status change, validated against the transition table.
    #[instrument(skip(self))]
    pub async fn change_status(
        &self,
        purchase_id: Uuid,
        new_status: PurchaseStatus,
    ) -> Result<purchase::Model, ServiceError> {
        let db = &*self.db;
        let purchase = self.get(purchase_id).await?;

        let current = PurchaseStatus::from_str(&purchase.status).map_err(|_| {
            ServiceError::InternalError(format!("unknown purchase status {}", purchase.status))
        })?;

        if !current.can_transition_to(new_status) {
            return Err(ServiceError::IllegalState(format!(
                "purchase {} cannot go from {} to {}",
                purchase_id,
                current.as_str(),
                new_status.as_str()
            )));
        }

        if current == PurchaseStatus::Draft && new_status == PurchaseStatus::Approved {
            let line_count = PurchaseLineEntity::find()
                .filter(purchase_line::Column::PurchaseId.eq(purchase_id))
                .count(db)
                .await?;
            if line_count == 0 {
                return Err(ServiceError::IllegalState(format!(
                    "purchase {purchase_id} has no lines to approve"
                )));
            }
        }

        let old_status = purchase.status.clone();
        let mut active: purchase::ActiveModel = purchase.into();
        active.status = Set(new_status.as_str().to_string());
        active.updated_at = Set(Some(Utc::now()));
        let updated = active.update(db).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PurchaseStatusChanged {
                    purchase_id,
                    old_status: old_status.clone(),
                    new_status: new_status.as_str().to_string(),
                })
                .await;
        }

        info!(%purchase_id, from = %old_status, to = %new_status.as_str(), "purchase status changed");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(PurchaseStatus::Draft, PurchaseStatus::Approved, true)]
    #[case(PurchaseStatus::Draft, PurchaseStatus::Cancelled, true)]
    #[case(PurchaseStatus::Draft, PurchaseStatus::Closed, false)]
    #[case(PurchaseStatus::Draft, PurchaseStatus::PartiallyReceived, false)]
    #[case(PurchaseStatus::Approved, PurchaseStatus::PartiallyReceived, true)]
    #[case(PurchaseStatus::Approved, PurchaseStatus::Closed, true)]
    #[case(PurchaseStatus::Approved, PurchaseStatus::Cancelled, true)]
    #[case(PurchaseStatus::Approved, PurchaseStatus::Draft, false)]
    #[case(PurchaseStatus::PartiallyReceived, PurchaseStatus::Closed, true)]
    #[case(PurchaseStatus::PartiallyReceived, PurchaseStatus::PartiallyReceived, true)]
    #[case(PurchaseStatus::PartiallyReceived, PurchaseStatus::Cancelled, false)]
    #[case(PurchaseStatus::Closed, PurchaseStatus::Approved, false)]
    #[case(PurchaseStatus::Cancelled, PurchaseStatus::Draft, false)]
    fn transition_table(
        #[case] from: PurchaseStatus,
        #[case] to: PurchaseStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn line_input_validation() {
        use rust_decimal_macros::dec;

        let bad_quantity = PurchaseLineInput {
            presentation_id: Uuid::new_v4(),
            quantity: dec!(0),
            unit_cost: dec!(1),
            expected_date: None,
        };
        assert!(bad_quantity.validate().is_err());

        let bad_cost = PurchaseLineInput {
            presentation_id: Uuid::new_v4(),
            quantity: dec!(1),
            unit_cost: dec!(-1),
            expected_date: None,
        };
        assert!(bad_cost.validate().is_err());
    }
}
