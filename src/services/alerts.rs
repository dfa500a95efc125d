//! Inventory alert feed, derived from positions and lot expirations.
//!
//! Nothing here is persisted: alerts are a classification of current
//! balances against the configured thresholds, computed on demand.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, EntityTrait, FromQueryResult, JoinType, QueryFilter, QuerySelect, RelationTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::config::AlertConfig;
use crate::db::DbPool;
use crate::entities::{
    lot, presentation,
    stock_position::{self, Entity as StockPositionEntity},
};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Vencimiento,
    Stock,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Vencimiento => "vencimiento",
            AlertType::Stock => "stock",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "vencimiento" => Some(AlertType::Vencimiento),
            "stock" => Some(AlertType::Stock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Urgente,
    Advertencia,
    Proximo,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Urgente => "urgente",
            AlertSeverity::Advertencia => "advertencia",
            AlertSeverity::Proximo => "proximo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "urgente" => Some(AlertSeverity::Urgente),
            "advertencia" => Some(AlertSeverity::Advertencia),
            "proximo" => Some(AlertSeverity::Proximo),
            _ => None,
        }
    }

    /// Listing priority; lower sorts first.
    fn rank(&self) -> u8 {
        match self {
            AlertSeverity::Urgente => 0,
            AlertSeverity::Advertencia => 1,
            AlertSeverity::Proximo => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryAlert {
    pub lot_id: i64,
    pub presentation_id: Uuid,
    pub sku: String,
    pub presentation_name: String,
    pub lot_number: String,
    pub warehouse_id: i32,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub expiration_date: Option<NaiveDate>,
    pub days_to_expiry: Option<i64>,
    pub available: Decimal,
    pub reserved: Decimal,
    pub minimum_stock: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub warehouse_id: Option<i32>,
    pub text: Option<String>,
    pub page: u64,
    pub per_page: u64,
}

/// Aggregate counts for the alert dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_type: BTreeMap<String, u64>,
}

#[derive(FromQueryResult)]
struct AlertSourceRow {
    lot_id: i64,
    presentation_id: Uuid,
    sku: String,
    presentation_name: String,
    lot_number: String,
    warehouse_id: i32,
    expiration_date: Option<NaiveDate>,
    available: Decimal,
    reserved: Decimal,
    minimum_stock: Decimal,
}

#[derive(Clone)]
pub struct AlertService {
    db: Arc<DbPool>,
    thresholds: AlertConfig,
}

impl AlertService {
    pub fn new(db: Arc<DbPool>, thresholds: AlertConfig) -> Self {
        Self { db, thresholds }
    }

    async fn source_rows(
        &self,
        warehouse_id: Option<i32>,
        text: Option<&str>,
    ) -> Result<Vec<AlertSourceRow>, ServiceError> {
        let db = &*self.db;
        let mut select = StockPositionEntity::find()
            .join(JoinType::InnerJoin, stock_position::Relation::Lot.def())
            .join(JoinType::InnerJoin, lot::Relation::Presentation.def());

        if let Some(warehouse_id) = warehouse_id {
            select = select.filter(stock_position::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(needle) = text.map(str::trim).filter(|s| !s.is_empty()) {
            select = select.filter(
                presentation::Column::Sku
                    .contains(needle)
                    .or(presentation::Column::Name.contains(needle))
                    .or(lot::Column::LotNumber.contains(needle)),
            );
        }

        let rows = select
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
            .into_model::<AlertSourceRow>()
            .all(db)
            .await?;

        Ok(rows)
    }

    fn classify(&self, row: &AlertSourceRow, today: NaiveDate) -> Vec<InventoryAlert> {
        let mut alerts = Vec::new();

        let base = |alert_type: AlertType, severity: AlertSeverity, days: Option<i64>| {
            InventoryAlert {
                lot_id: row.lot_id,
                presentation_id: row.presentation_id,
                sku: row.sku.clone(),
                presentation_name: row.presentation_name.clone(),
                lot_number: row.lot_number.clone(),
                warehouse_id: row.warehouse_id,
                alert_type,
                severity,
                expiration_date: row.expiration_date,
                days_to_expiry: days,
                available: row.available,
                reserved: row.reserved,
                minimum_stock: row.minimum_stock,
            }
        };

        // Expiry alerts only matter while stock remains on hand.
        if row.available + row.reserved > Decimal::ZERO {
            if let Some(expiration) = row.expiration_date {
                let days = (expiration - today).num_days();
                let severity = if days <= self.thresholds.urgente_days {
                    Some(AlertSeverity::Urgente)
                } else if days <= self.thresholds.advertencia_days {
                    Some(AlertSeverity::Advertencia)
                } else if days <= self.thresholds.proximo_days {
                    Some(AlertSeverity::Proximo)
                } else {
                    None
                };
                if let Some(severity) = severity {
                    alerts.push(base(AlertType::Vencimiento, severity, Some(days)));
                }
            }
        }

        let factor = Decimal::from_f64_retain(self.thresholds.low_stock_factor)
            .unwrap_or(Decimal::ONE);
        let stock_severity = if row.available == Decimal::ZERO
            && (row.reserved > Decimal::ZERO || row.minimum_stock > Decimal::ZERO)
        {
            Some(AlertSeverity::Urgente)
        } else if row.minimum_stock > Decimal::ZERO && row.available < row.minimum_stock {
            Some(AlertSeverity::Advertencia)
        } else if row.minimum_stock > Decimal::ZERO
            && row.available < row.minimum_stock * factor
        {
            Some(AlertSeverity::Proximo)
        } else {
            None
        };
        if let Some(severity) = stock_severity {
            let days = row.expiration_date.map(|e| (e - today).num_days());
            alerts.push(base(AlertType::Stock, severity, days));
        }

        alerts
    }

    fn sort_by_priority(alerts: &mut [InventoryAlert]) {
        alerts.sort_by(|a, b| {
            a.severity
                .rank()
                .cmp(&b.severity.rank())
                .then_with(|| match (a.days_to_expiry, b.days_to_expiry) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then_with(|| a.sku.cmp(&b.sku))
        });
    }

    async fn compute(
        &self,
        alert_type: Option<AlertType>,
        severity: Option<AlertSeverity>,
        warehouse_id: Option<i32>,
        text: Option<&str>,
    ) -> Result<Vec<InventoryAlert>, ServiceError> {
        let today = Utc::now().date_naive();
        let rows = self.source_rows(warehouse_id, text).await?;

        let mut alerts: Vec<InventoryAlert> = rows
            .iter()
            .flat_map(|row| self.classify(row, today))
            .filter(|a| alert_type.map_or(true, |t| a.alert_type == t))
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .collect();

        Self::sort_by_priority(&mut alerts);
        Ok(alerts)
    }

    /// Filterable, paginated alert listing in priority order.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        query: AlertQuery,
    ) -> Result<(Vec<InventoryAlert>, u64), ServiceError> {
        if query.page == 0 {
            return Err(ServiceError::ValidationError(
                "page number must be greater than 0".into(),
            ));
        }

        let alerts = self
            .compute(
                query.alert_type,
                query.severity,
                query.warehouse_id,
                query.text.as_deref(),
            )
            .await?;

        let total = alerts.len() as u64;
        let per_page = query.per_page.max(1) as usize;
        let start = (query.page as usize - 1) * per_page;
        let page = alerts.into_iter().skip(start).take(per_page).collect();

        Ok((page, total))
    }

    /// Aggregate counts by severity and by type.
    #[instrument(skip(self))]
    pub async fn summary(&self, warehouse_id: Option<i32>) -> Result<AlertSummary, ServiceError> {
        let alerts = self.compute(None, None, warehouse_id, None).await?;

        let mut by_severity = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for alert in &alerts {
            *by_severity
                .entry(alert.severity.as_str().to_string())
                .or_insert(0) += 1;
            *by_type
                .entry(alert.alert_type.as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(AlertSummary {
            total: alerts.len() as u64,
            by_severity,
            by_type,
        })
    }

    /// The N highest-priority alerts, same ordering as the listing.
    #[instrument(skip(self))]
    pub async fn top(
        &self,
        n: usize,
        warehouse_id: Option<i32>,
    ) -> Result<Vec<InventoryAlert>, ServiceError> {
        let mut alerts = self.compute(None, None, warehouse_id, None).await?;
        alerts.truncate(n);
        Ok(alerts)
    }
}
