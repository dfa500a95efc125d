//! Price historization: per-presentation non-overlapping validity windows
//! with exactly one open ("vigente") row, plus mass recalculation from
//! exchange rates and the configured rounding policy.
//!
//! History is append-only. A change closes the vigente window and opens a
//! new one in the same transaction; `revert` copies an old price forward
//! instead of rewriting rows.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait,
    FromQueryResult, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::DbPool;
use crate::entities::{
    presentation::{self, Entity as PresentationEntity},
    price_history::{self, Entity as PriceHistoryEntity},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::exchange_rates::ExchangeRateService;
use crate::services::rounding::RoundingService;

/// One price delta of a recalculation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationItem {
    pub presentation_id: Uuid,
    pub sku: String,
    pub old_price: Option<Decimal>,
    pub new_price: Decimal,
}

/// Summary of a mass recalculation (simulated or committed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecalculationSummary {
    pub origin_currency: String,
    pub dest_currency: String,
    pub effective_date: NaiveDate,
    pub rate_used: Decimal,
    pub simulated: bool,
    pub changed: u64,
    pub unchanged: u64,
    pub skipped: u64,
    pub items: Vec<RecalculationItem>,
}

/// Typed query over the price history.
#[derive(Debug, Clone, Default)]
pub struct PriceSearchQuery {
    pub sku: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub reason_contains: Option<String>,
    pub user_contains: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

/// History row joined with its presentation's SKU.
#[derive(Debug, Clone, FromQueryResult, Serialize, Deserialize)]
pub struct PriceHistoryRow {
    pub id: i64,
    pub presentation_id: Uuid,
    pub sku: String,
    pub price: Decimal,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub reason: String,
    pub created_by: String,
}

#[derive(Clone)]
pub struct PriceService {
    db: Arc<DbPool>,
    exchange_rates: Arc<ExchangeRateService>,
    rounding: Arc<RoundingService>,
    event_sender: Option<EventSender>,
}

impl PriceService {
    pub fn new(
        db: Arc<DbPool>,
        exchange_rates: Arc<ExchangeRateService>,
        rounding: Arc<RoundingService>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            exchange_rates,
            rounding,
            event_sender,
        }
    }

    /// The vigente price of a presentation, if any was ever set.
    pub async fn current(
        &self,
        presentation_id: Uuid,
    ) -> Result<Option<price_history::Model>, ServiceError> {
        Self::current_in(&*self.db, presentation_id).await
    }

    async fn current_in<C: ConnectionTrait>(
        conn: &C,
        presentation_id: Uuid,
    ) -> Result<Option<price_history::Model>, ServiceError> {
        let row = PriceHistoryEntity::find()
            .filter(price_history::Column::PresentationId.eq(presentation_id))
            .filter(price_history::Column::ValidTo.is_null())
            .one(conn)
            .await?;
        Ok(row)
    }

    /// Closes the vigente window at `effective` and opens a new one. Must
    /// run inside the caller's transaction.
    async fn change_in<C: ConnectionTrait>(
        conn: &C,
        presentation_id: Uuid,
        new_price: Decimal,
        reason: &str,
        effective: DateTime<Utc>,
        user: &CurrentUser,
    ) -> Result<(Option<Decimal>, price_history::Model), ServiceError> {
        let vigente = Self::current_in(conn, presentation_id).await?;
        let old_price = vigente.as_ref().map(|v| v.price);

        if let Some(vigente) = vigente {
            if effective < vigente.valid_from {
                return Err(ServiceError::Conflict(format!(
                    "effective time {} precedes the vigente window start {}",
                    effective, vigente.valid_from
                )));
            }
            let mut active: price_history::ActiveModel = vigente.into();
            active.valid_to = Set(Some(effective));
            active.update(conn).await?;
        }

        let created = price_history::ActiveModel {
            presentation_id: Set(presentation_id),
            price: Set(new_price),
            valid_from: Set(effective),
            valid_to: Set(None),
            reason: Set(reason.to_string()),
            created_by: Set(user.id.clone()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await?;

        Ok((old_price, created))
    }

    /// Manual price change for one presentation.
    #[instrument(skip(self, user))]
    pub async fn manual_change(
        &self,
        presentation_id: Uuid,
        new_price: Decimal,
        reason: &str,
        effective_at: Option<DateTime<Utc>>,
        user: &CurrentUser,
    ) -> Result<price_history::Model, ServiceError> {
        if new_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "price cannot be negative".into(),
            ));
        }

        let db = &*self.db;
        PresentationEntity::find_by_id(presentation_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("presentation {presentation_id} not found"))
            })?;

        let effective = effective_at.unwrap_or_else(Utc::now);
        let txn = db.begin().await?;
        let (old_price, created) =
            Self::change_in(&txn, presentation_id, new_price, reason, effective, user).await?;
        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PriceChanged {
                    presentation_id,
                    old_price,
                    new_price,
                    reason: reason.to_string(),
                })
                .await;
        }

        info!(%presentation_id, %new_price, "manual price change");
        Ok(created)
    }

    /// Copies a historical price into a new vigente window starting now.
    #[instrument(skip(self, user))]
    pub async fn revert(
        &self,
        history_id: i64,
        user: &CurrentUser,
    ) -> Result<price_history::Model, ServiceError> {
        let db = &*self.db;
        let historical = PriceHistoryEntity::find_by_id(history_id)
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("price history record {history_id} not found"))
            })?;

        let reason = format!("reversion al registro {history_id}");
        let txn = db.begin().await?;
        let (old_price, created) = Self::change_in(
            &txn,
            historical.presentation_id,
            historical.price,
            &reason,
            Utc::now(),
            user,
        )
        .await?;
        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PriceChanged {
                    presentation_id: historical.presentation_id,
                    old_price,
                    new_price: historical.price,
                    reason,
                })
                .await;
        }

        Ok(created)
    }

    /// Recomputes every presentation priced from `origin` using the vigente
    /// exchange rate and the active rounding policy. With `simulate` the
    /// call is a pure projection: repeated runs over unchanged inputs
    /// return identical summaries and write nothing. Committed runs write
    /// all differing items in one all-or-nothing transaction, skipping
    /// no-op rows.
    #[instrument(skip(self, user))]
    pub async fn mass_recalculate(
        &self,
        origin_currency: &str,
        dest_currency: &str,
        simulate: bool,
        reason: &str,
        effective_date: Option<NaiveDate>,
        user: &CurrentUser,
    ) -> Result<RecalculationSummary, ServiceError> {
        let effective_date = effective_date.unwrap_or_else(|| Utc::now().date_naive());

        let rate = self
            .exchange_rates
            .vigente(origin_currency, dest_currency, effective_date)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "no exchange rate for {origin_currency}/{dest_currency} as of {effective_date}"
                ))
            })?;

        let policy = self.rounding.current();
        let db = &*self.db;

        let presentations = PresentationEntity::find()
            .filter(presentation::Column::IsActive.eq(true))
            .filter(presentation::Column::CostCurrency.eq(origin_currency))
            .order_by_asc(presentation::Column::Sku)
            .all(db)
            .await?;

        let mut changed = Vec::new();
        let mut unchanged = 0u64;
        let mut skipped = 0u64;

        for p in &presentations {
            let base_cost = match p.base_cost {
                Some(cost) => cost,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            let target = policy.apply(base_cost * rate.rate);
            let vigente = Self::current_in(db, p.id).await?;
            let old_price = vigente.as_ref().map(|v| v.price);

            if old_price == Some(target) {
                unchanged += 1;
            } else {
                changed.push(RecalculationItem {
                    presentation_id: p.id,
                    sku: p.sku.clone(),
                    old_price,
                    new_price: target,
                });
            }
        }

        if !simulate && !changed.is_empty() {
            let now = Utc::now();
            let txn = db.begin().await?;
            for item in &changed {
                Self::change_in(&txn, item.presentation_id, item.new_price, reason, now, user)
                    .await?;
            }
            txn.commit().await?;
        }

        let summary = RecalculationSummary {
            origin_currency: origin_currency.to_string(),
            dest_currency: dest_currency.to_string(),
            effective_date,
            rate_used: rate.rate,
            simulated: simulate,
            changed: changed.len() as u64,
            unchanged,
            skipped,
            items: changed,
        };

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PricesRecalculated {
                    origin_currency: origin_currency.to_string(),
                    dest_currency: dest_currency.to_string(),
                    changed: summary.changed as usize,
                    unchanged: summary.unchanged as usize,
                    skipped: summary.skipped as usize,
                    simulated: simulate,
                })
                .await;
        }

        info!(
            origin = origin_currency,
            dest = dest_currency,
            changed = summary.changed,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            simulated = simulate,
            "mass recalculation finished"
        );

        Ok(summary)
    }

    /// Paginated history query across presentations, newest first.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: PriceSearchQuery,
    ) -> Result<(Vec<PriceHistoryRow>, u64), ServiceError> {
        if query.page == 0 {
            return Err(ServiceError::ValidationError(
                "page number must be greater than 0".into(),
            ));
        }

        let db = &*self.db;
        let mut select = PriceHistoryEntity::find()
            .join(JoinType::InnerJoin, price_history::Relation::Presentation.def());

        if let Some(sku) = query.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(presentation::Column::Sku.contains(sku));
        }
        if let Some(from) = query.from {
            select = select.filter(price_history::Column::ValidFrom.gte(from));
        }
        if let Some(to) = query.to {
            select = select.filter(price_history::Column::ValidFrom.lte(to));
        }
        if let Some(reason) = query
            .reason_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            select = select.filter(price_history::Column::Reason.contains(reason));
        }
        if let Some(created_by) = query
            .user_contains
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            select = select.filter(price_history::Column::CreatedBy.contains(created_by));
        }

        let select = select
            .select_only()
            .column(price_history::Column::Id)
            .column(price_history::Column::PresentationId)
            .column_as(presentation::Column::Sku, "sku")
            .column(price_history::Column::Price)
            .column(price_history::Column::ValidFrom)
            .column(price_history::Column::ValidTo)
            .column(price_history::Column::Reason)
            .column(price_history::Column::CreatedBy)
            .order_by_desc(price_history::Column::ValidFrom)
            .order_by_desc(price_history::Column::Id)
            .into_model::<PriceHistoryRow>();

        let paginator = select.paginate(db, query.per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(query.page - 1).await?;

        Ok((rows, total))
    }

    /// Full window timeline of one presentation, oldest first.
    pub async fn timeline(
        &self,
        presentation_id: Uuid,
    ) -> Result<Vec<price_history::Model>, ServiceError> {
        let db = &*self.db;
        let rows = PriceHistoryEntity::find()
            .filter(price_history::Column::PresentationId.eq(presentation_id))
            .order_by_asc(price_history::Column::ValidFrom)
            .order_by_asc(price_history::Column::Id)
            .all(db)
            .await?;
        Ok(rows)
    }
}
