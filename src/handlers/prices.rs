use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{success_response, validate_input, PaginatedResponse};
use crate::auth::{permissions, CurrentUser};
use crate::entities::rounding_config::RoundingMode;
use crate::errors::ApiError;
use crate::services::prices::PriceSearchQuery;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/precios/presentaciones/:id/manual", post(manual_change))
        .route("/precios/presentaciones/:id/vigente", get(current_price))
        .route("/precios/presentaciones/:id/historial", get(timeline))
        .route("/precios/recalcular", post(mass_recalculate))
        .route("/precios/revertir/:id_historico", post(revert))
        .route("/precios/historial", get(search))
        .route("/precios/redondeo", get(get_rounding).put(set_rounding))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ManualChangeRequest {
    pub precio: Decimal,
    #[validate(length(min = 1, max = 255))]
    pub motivo: String,
    pub fecha_vigencia: Option<DateTime<Utc>>,
}

/// Manual price change: closes the vigente window and opens a new one.
#[utoipa::path(
    post,
    path = "/api/v1/precios/presentaciones/{id}/manual",
    params(("id" = Uuid, Path, description = "Presentation id")),
    request_body = ManualChangeRequest,
    responses(
        (status = 200, description = "Price changed"),
        (status = 400, description = "Invalid price", body = crate::errors::ErrorResponse)
    ),
    tag = "precios"
)]
pub async fn manual_change(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(presentation_id): Path<Uuid>,
    Json(payload): Json<ManualChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::PRECIOS_CAMBIAR)?;
    validate_input(&payload)?;

    let created = state
        .services
        .prices
        .manual_change(
            presentation_id,
            payload.precio,
            &payload.motivo,
            payload.fecha_vigencia,
            &user,
        )
        .await?;

    Ok(success_response(created))
}

/// Vigente price of a presentation.
#[utoipa::path(
    get,
    path = "/api/v1/precios/presentaciones/{id}/vigente",
    params(("id" = Uuid, Path, description = "Presentation id")),
    responses(
        (status = 200, description = "Vigente price"),
        (status = 404, description = "No price set", body = crate::errors::ErrorResponse)
    ),
    tag = "precios"
)]
pub async fn current_price(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let vigente = state
        .services
        .prices
        .current(presentation_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("presentation {presentation_id} has no vigente price"))
        })?;
    Ok(success_response(vigente))
}

/// Full window timeline of one presentation, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/precios/presentaciones/{id}/historial",
    params(("id" = Uuid, Path, description = "Presentation id")),
    responses((status = 200, description = "Price timeline")),
    tag = "precios"
)]
pub async fn timeline(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state.services.prices.timeline(presentation_id).await?;
    Ok(success_response(rows))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecalculateParams {
    pub moneda_origen: String,
    pub moneda_destino: String,
    #[serde(default)]
    pub simular: bool,
    pub motivo: Option<String>,
    pub fecha_vigencia: Option<NaiveDate>,
}

/// Mass recalculation from the vigente exchange rate and rounding policy.
#[utoipa::path(
    post,
    path = "/api/v1/precios/recalcular",
    params(RecalculateParams),
    responses(
        (status = 200, description = "Recalculation summary"),
        (status = 404, description = "No exchange rate", body = crate::errors::ErrorResponse)
    ),
    tag = "precios"
)]
pub async fn mass_recalculate(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<RecalculateParams>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::PRECIOS_RECALCULAR)?;

    let reason = params
        .motivo
        .unwrap_or_else(|| "recalculo masivo".to_string());
    let summary = state
        .services
        .prices
        .mass_recalculate(
            &params.moneda_origen,
            &params.moneda_destino,
            params.simular,
            &reason,
            params.fecha_vigencia,
            &user,
        )
        .await?;

    Ok(success_response(summary))
}

/// Appends a new vigente window copying a historical record's price.
#[utoipa::path(
    post,
    path = "/api/v1/precios/revertir/{id_historico}",
    params(("id_historico" = i64, Path, description = "Historical record id")),
    responses(
        (status = 200, description = "Price reverted"),
        (status = 404, description = "Record not found", body = crate::errors::ErrorResponse)
    ),
    tag = "precios"
)]
pub async fn revert(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(history_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::PRECIOS_CAMBIAR)?;
    let created = state.services.prices.revert(history_id, &user).await?;
    Ok(success_response(created))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PriceSearchParams {
    pub sku: Option<String>,
    pub desde: Option<DateTime<Utc>>,
    pub hasta: Option<DateTime<Utc>>,
    pub motivo: Option<String>,
    pub usuario: Option<String>,
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

/// Paginated history search across presentations.
#[utoipa::path(
    get,
    path = "/api/v1/precios/historial",
    params(PriceSearchParams),
    responses((status = 200, description = "Paginated history")),
    tag = "precios"
)]
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<PriceSearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (rows, total) = state
        .services
        .prices
        .search(PriceSearchQuery {
            sku: params.sku,
            from: params.desde,
            to: params.hasta,
            reason_contains: params.motivo,
            user_contains: params.usuario,
            page: params.page,
            per_page: params.per_page,
        })
        .await?;

    Ok(success_response(PaginatedResponse::new(
        rows,
        params.page,
        params.per_page,
        total,
    )))
}

/// The rounding policy currently in effect.
#[utoipa::path(
    get,
    path = "/api/v1/precios/redondeo",
    responses((status = 200, description = "Rounding configuration")),
    tag = "precios"
)]
pub async fn get_rounding(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(success_response(state.services.rounding.current()))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SetRoundingRequest {
    /// none | integer | multiple | decimals
    pub modo: String,
    pub multiplo: Option<Decimal>,
    pub decimales: Option<i16>,
}

/// Updates the process-wide rounding configuration.
#[utoipa::path(
    put,
    path = "/api/v1/precios/redondeo",
    request_body = SetRoundingRequest,
    responses(
        (status = 200, description = "Configuration updated"),
        (status = 400, description = "Invalid configuration", body = crate::errors::ErrorResponse)
    ),
    tag = "precios"
)]
pub async fn set_rounding(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<SetRoundingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::PRECIOS_CAMBIAR)?;

    let mode = RoundingMode::from_str(&payload.modo).ok_or_else(|| {
        ApiError::ValidationError(format!("unknown rounding mode {}", payload.modo))
    })?;

    let policy = state
        .services
        .rounding
        .update(mode, payload.multiplo, payload.decimales)
        .await?;

    Ok(success_response(policy))
}
