use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::common::{success_response, validate_input, PaginatedResponse};
use crate::auth::{permissions, CurrentUser};
use crate::errors::ApiError;
use crate::services::alerts::{AlertQuery, AlertSeverity, AlertType};
use crate::services::ledger::PositionQuery;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/inventario/por-lote", get(list_positions))
        .route(
            "/inventario/por-lote/:lot_id/movimientos",
            get(list_movements),
        )
        .route(
            "/inventario/por-lote/:lot_id/verificar",
            get(verify_position),
        )
        .route("/inventario/por-lote/:lot_id/minimo", put(set_minimum))
        .route("/inventario/transferencias", post(transfer))
        .route("/inventario/alertas", get(list_alerts))
        .route("/inventario/alertas/resumen", get(alert_summary))
        .route("/inventario/alertas/top", get(top_alerts))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PositionFilters {
    pub almacen_id: Option<i32>,
    /// Free text over SKU, presentation name and lot number
    pub q: Option<String>,
    pub vence_antes: Option<NaiveDate>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

/// Lot inventory listing ordered by expiration, then SKU.
#[utoipa::path(
    get,
    path = "/api/v1/inventario/por-lote",
    params(PositionFilters),
    responses(
        (status = 200, description = "Paginated lot positions"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "inventario"
)]
pub async fn list_positions(
    State(state): State<AppState>,
    Query(filters): Query<PositionFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let (rows, total) = state
        .services
        .ledger
        .positions(PositionQuery {
            warehouse_id: filters.almacen_id,
            text: filters.q,
            expires_before: filters.vence_antes,
            page: filters.page,
            per_page: filters.per_page,
        })
        .await?;

    Ok(success_response(PaginatedResponse::new(
        rows,
        filters.page,
        filters.per_page,
        total,
    )))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MovementFilters {
    pub almacen_id: Option<i32>,
    #[serde(default = "default_movement_limit")]
    pub limit: u64,
}

fn default_movement_limit() -> u64 {
    50
}

/// Most recent movements of a lot, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/inventario/por-lote/{lot_id}/movimientos",
    params(("lot_id" = i64, Path, description = "Lot id"), MovementFilters),
    responses((status = 200, description = "Recent movements")),
    tag = "inventario"
)]
pub async fn list_movements(
    State(state): State<AppState>,
    Path(lot_id): Path<i64>,
    Query(filters): Query<MovementFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let movements = state
        .services
        .ledger
        .recent_movements(lot_id, filters.almacen_id, filters.limit)
        .await?;
    Ok(success_response(movements))
}

/// Replays the lot's movement log and compares it with the cached position.
#[utoipa::path(
    get,
    path = "/api/v1/inventario/por-lote/{lot_id}/verificar",
    params(("lot_id" = i64, Path, description = "Lot id")),
    responses((status = 200, description = "Consistency report")),
    tag = "inventario"
)]
pub async fn verify_position(
    State(state): State<AppState>,
    Path(lot_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.services.ledger.verify_position(lot_id).await?;
    Ok(success_response(report))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetMinimumRequest {
    pub minimo: Decimal,
}

/// Updates the minimum-stock threshold of a lot position.
#[utoipa::path(
    put,
    path = "/api/v1/inventario/por-lote/{lot_id}/minimo",
    request_body = SetMinimumRequest,
    responses((status = 200, description = "Threshold updated")),
    tag = "inventario"
)]
pub async fn set_minimum(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(lot_id): Path<i64>,
    Json(payload): Json<SetMinimumRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::INVENTARIO_MOVER)?;
    state
        .services
        .ledger
        .set_minimum_stock(lot_id, payload.minimo)
        .await?;
    Ok(success_response(serde_json::json!({
        "lot_id": lot_id,
        "minimo": payload.minimo
    })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    pub lot_id: i64,
    pub almacen_destino_id: i32,
    pub cantidad: Decimal,
    pub nota: Option<String>,
}

/// Transfers lot quantity to another warehouse.
#[utoipa::path(
    post,
    path = "/api/v1/inventario/transferencias",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer posted"),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "inventario"
)]
pub async fn transfer(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::INVENTARIO_MOVER)?;
    validate_input(&payload)?;

    state
        .services
        .ledger
        .transfer(
            payload.lot_id,
            payload.almacen_destino_id,
            payload.cantidad,
            &user.id,
            payload.nota,
        )
        .await?;

    Ok(success_response(serde_json::json!({
        "lot_id": payload.lot_id,
        "almacen_destino_id": payload.almacen_destino_id,
        "cantidad": payload.cantidad
    })))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AlertFilters {
    /// vencimiento | stock
    pub tipo: Option<String>,
    /// urgente | advertencia | proximo
    pub severidad: Option<String>,
    pub almacen_id: Option<i32>,
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

/// Inventory alerts in priority order.
#[utoipa::path(
    get,
    path = "/api/v1/inventario/alertas",
    params(AlertFilters),
    responses((status = 200, description = "Paginated alerts")),
    tag = "inventario"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(filters): Query<AlertFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let alert_type = match filters.tipo.as_deref() {
        None => None,
        Some(raw) => Some(AlertType::from_str(raw).ok_or_else(|| {
            ApiError::ValidationError(format!("unknown alert type {raw}"))
        })?),
    };
    let severity = match filters.severidad.as_deref() {
        None => None,
        Some(raw) => Some(AlertSeverity::from_str(raw).ok_or_else(|| {
            ApiError::ValidationError(format!("unknown severity {raw}"))
        })?),
    };

    let (rows, total) = state
        .services
        .alerts
        .list(AlertQuery {
            alert_type,
            severity,
            warehouse_id: filters.almacen_id,
            text: filters.q,
            page: filters.page,
            per_page: filters.per_page,
        })
        .await?;

    Ok(success_response(PaginatedResponse::new(
        rows,
        filters.page,
        filters.per_page,
        total,
    )))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AlertSummaryFilters {
    pub almacen_id: Option<i32>,
}

/// Aggregate alert counts by severity and type.
#[utoipa::path(
    get,
    path = "/api/v1/inventario/alertas/resumen",
    params(AlertSummaryFilters),
    responses((status = 200, description = "Alert summary")),
    tag = "inventario"
)]
pub async fn alert_summary(
    State(state): State<AppState>,
    Query(filters): Query<AlertSummaryFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.services.alerts.summary(filters.almacen_id).await?;
    Ok(success_response(summary))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct TopAlertFilters {
    #[serde(default = "default_top_n")]
    pub n: usize,
    pub almacen_id: Option<i32>,
}

fn default_top_n() -> usize {
    10
}

/// The N highest-priority alerts.
#[utoipa::path(
    get,
    path = "/api/v1/inventario/alertas/top",
    params(TopAlertFilters),
    responses((status = 200, description = "Top alerts")),
    tag = "inventario"
)]
pub async fn top_alerts(
    State(state): State<AppState>,
    Query(filters): Query<TopAlertFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let alerts = state
        .services
        .alerts
        .top(filters.n, filters.almacen_id)
        .await?;
    Ok(success_response(alerts))
}
