use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::common::{created_response, success_response, validate_input, PaginatedResponse};
use crate::auth::{permissions, CurrentUser};
use crate::errors::ApiError;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/finanzas/tipos-cambio",
            post(create_rate).get(rate_history),
        )
        .route("/finanzas/tipos-cambio/vigente", get(vigente_rate))
        .route("/finanzas/tipos-cambio/convertir", get(convert))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRateRequest {
    #[validate(length(min = 3, max = 3))]
    pub moneda_origen: String,
    #[validate(length(min = 3, max = 3))]
    pub moneda_destino: String,
    pub fecha_vigencia: Option<NaiveDate>,
    pub tasa: Decimal,
}

/// Appends a new rate record for a currency pair.
#[utoipa::path(
    post,
    path = "/api/v1/finanzas/tipos-cambio",
    request_body = CreateRateRequest,
    responses(
        (status = 201, description = "Rate created"),
        (status = 409, description = "Duplicate same-day rate", body = crate::errors::ErrorResponse)
    ),
    tag = "finanzas"
)]
pub async fn create_rate(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateRateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::FINANZAS_TIPOS_CAMBIO)?;
    validate_input(&payload)?;

    let effective_date = payload
        .fecha_vigencia
        .unwrap_or_else(|| Utc::now().date_naive());
    let created = state
        .services
        .exchange_rates
        .create(
            &payload.moneda_origen.to_uppercase(),
            &payload.moneda_destino.to_uppercase(),
            effective_date,
            payload.tasa,
            &user.id,
        )
        .await?;

    Ok(created_response(created))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VigenteParams {
    pub moneda_origen: String,
    pub moneda_destino: String,
    /// Defaults to today
    pub fecha: Option<NaiveDate>,
}

/// The vigente rate for a pair as of a date.
#[utoipa::path(
    get,
    path = "/api/v1/finanzas/tipos-cambio/vigente",
    params(VigenteParams),
    responses(
        (status = 200, description = "Vigente rate"),
        (status = 404, description = "No rate recorded", body = crate::errors::ErrorResponse)
    ),
    tag = "finanzas"
)]
pub async fn vigente_rate(
    State(state): State<AppState>,
    Query(params): Query<VigenteParams>,
) -> Result<impl IntoResponse, ApiError> {
    let date = params.fecha.unwrap_or_else(|| Utc::now().date_naive());
    let rate = state
        .services
        .exchange_rates
        .vigente(&params.moneda_origen, &params.moneda_destino, date)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "no exchange rate for {}/{} as of {date}",
                params.moneda_origen, params.moneda_destino
            ))
        })?;

    Ok(success_response(rate))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConvertParams {
    pub moneda_origen: String,
    pub moneda_destino: String,
    pub monto: Decimal,
}

/// Converts an amount using today's vigente rate.
#[utoipa::path(
    get,
    path = "/api/v1/finanzas/tipos-cambio/convertir",
    params(ConvertParams),
    responses(
        (status = 200, description = "Conversion result"),
        (status = 404, description = "No rate recorded", body = crate::errors::ErrorResponse)
    ),
    tag = "finanzas"
)]
pub async fn convert(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .exchange_rates
        .convert(&params.moneda_origen, &params.moneda_destino, params.monto)
        .await?;

    Ok(success_response(result))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryParams {
    pub moneda_origen: Option<String>,
    pub moneda_destino: Option<String>,
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

/// Rate history, newest effective date first.
#[utoipa::path(
    get,
    path = "/api/v1/finanzas/tipos-cambio",
    params(HistoryParams),
    responses((status = 200, description = "Paginated rate history")),
    tag = "finanzas"
)]
pub async fn rate_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (rows, total) = state
        .services
        .exchange_rates
        .history(
            params.moneda_origen.as_deref(),
            params.moneda_destino.as_deref(),
            params.page,
            params.per_page,
        )
        .await?;

    Ok(success_response(PaginatedResponse::new(
        rows,
        params.page,
        params.per_page,
        total,
    )))
}
