//! Append-only exchange rate store with "vigente as of date" lookups.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::entities::exchange_rate::{self, Entity as ExchangeRateEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Result of a currency conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub origin_currency: String,
    pub dest_currency: String,
    pub rate_used: Decimal,
    pub effective_date: NaiveDate,
    pub amount: Decimal,
    pub converted: Decimal,
}

#[derive(Clone)]
pub struct ExchangeRateService {
    db: Arc<DbPool>,
    event_sender: Option<EventSender>,
}

impl ExchangeRateService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<EventSender>) -> Self {
        Self { db, event_sender }
    }

    fn validate_pair(origin: &str, dest: &str, rate: Decimal) -> Result<(), ServiceError> {
        if origin == dest {
            return Err(ServiceError::ValidationError(
                "origin and destination currency must differ".into(),
            ));
        }
        if rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "rate must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Appends a rate record. Duplicate same-day entries for a pair are a
    /// `Conflict`.
    #[instrument(skip(self))]
    pub async fn create(
        &self,
        origin: &str,
        dest: &str,
        effective_date: NaiveDate,
        rate: Decimal,
        created_by: &str,
    ) -> Result<exchange_rate::Model, ServiceError> {
        Self::validate_pair(origin, dest, rate)?;

        let db = &*self.db;
        let existing = ExchangeRateEntity::find()
            .filter(exchange_rate::Column::OriginCurrency.eq(origin))
            .filter(exchange_rate::Column::DestCurrency.eq(dest))
            .filter(exchange_rate::Column::EffectiveDate.eq(effective_date))
            .one(db)
            .await?;

        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "rate for {origin}/{dest} on {effective_date} already exists"
            )));
        }

        let row = exchange_rate::ActiveModel {
            origin_currency: Set(origin.to_string()),
            dest_currency: Set(dest.to_string()),
            effective_date: Set(effective_date),
            rate: Set(rate),
            created_by: Set(created_by.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let created = row.insert(db).await?;

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::ExchangeRateCreated {
                    origin_currency: origin.to_string(),
                    dest_currency: dest.to_string(),
                    effective_date,
                    rate,
                })
                .await;
        }

        info!(origin, dest, %effective_date, %rate, "exchange rate created");
        Ok(created)
    }

    /// Create-if-absent variant for internal callers: returns the existing
    /// same-day record instead of failing.
    #[instrument(skip(self))]
    pub async fn create_if_absent(
        &self,
        origin: &str,
        dest: &str,
        effective_date: NaiveDate,
        rate: Decimal,
        created_by: &str,
    ) -> Result<exchange_rate::Model, ServiceError> {
        match self.create(origin, dest, effective_date, rate, created_by).await {
            Err(ServiceError::Conflict(_)) => {
                let db = &*self.db;
                let existing = ExchangeRateEntity::find()
                    .filter(exchange_rate::Column::OriginCurrency.eq(origin))
                    .filter(exchange_rate::Column::DestCurrency.eq(dest))
                    .filter(exchange_rate::Column::EffectiveDate.eq(effective_date))
                    .one(db)
                    .await?;
                existing.ok_or_else(|| {
                    ServiceError::InternalError("duplicate rate vanished during lookup".into())
                })
            }
            other => other,
        }
    }

    /// The record with the greatest `effective_date ≤ date` for the pair,
    /// or `None` before the first recorded rate.
    #[instrument(skip(self))]
    pub async fn vigente(
        &self,
        origin: &str,
        dest: &str,
        date: NaiveDate,
    ) -> Result<Option<exchange_rate::Model>, ServiceError> {
        let db = &*self.db;
        let rate = ExchangeRateEntity::find()
            .filter(exchange_rate::Column::OriginCurrency.eq(origin))
            .filter(exchange_rate::Column::DestCurrency.eq(dest))
            .filter(exchange_rate::Column::EffectiveDate.lte(date))
            .order_by_desc(exchange_rate::Column::EffectiveDate)
            .one(db)
            .await?;

        Ok(rate)
    }

    /// Converts an amount using today's vigente rate.
    #[instrument(skip(self))]
    pub async fn convert(
        &self,
        origin: &str,
        dest: &str,
        amount: Decimal,
    ) -> Result<ConversionResult, ServiceError> {
        let today = Utc::now().date_naive();
        let rate = self.vigente(origin, dest, today).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("no exchange rate recorded for {origin}/{dest}"))
        })?;

        Ok(ConversionResult {
            origin_currency: origin.to_string(),
            dest_currency: dest.to_string(),
            rate_used: rate.rate,
            effective_date: rate.effective_date,
            amount,
            converted: amount * rate.rate,
        })
    }

    /// Rate history for a pair (or all pairs), newest effective date first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        origin: Option<&str>,
        dest: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<exchange_rate::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "page number must be greater than 0".into(),
            ));
        }

        let db = &*self.db;
        let mut query = ExchangeRateEntity::find();
        if let Some(origin) = origin {
            query = query.filter(exchange_rate::Column::OriginCurrency.eq(origin));
        }
        if let Some(dest) = dest {
            query = query.filter(exchange_rate::Column::DestCurrency.eq(dest));
        }
        query = query
            .order_by_desc(exchange_rate::Column::EffectiveDate)
            .order_by_desc(exchange_rate::Column::Id);

        let paginator = query.paginate(db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page - 1).await?;

        Ok((rows, total))
    }
}
