use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::auth::{permissions, CurrentUser};
use crate::entities::reservation::OwnerType;
use crate::errors::ApiError;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/anticipos/:id/reservas", post(reserve))
        .route("/anticipos/:id/reservas/liberar", post(release))
        .route("/anticipos/:id/reservas/liberar-todo", post(release_all))
        .route("/anticipos/:id/reservas/aplicar", post(apply))
        .route("/anticipos/:id/reservas/detalle", get(detail))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReserveParams {
    #[serde(default)]
    pub permitir_sin_stock: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReserveRequest {
    pub presentacion_id: Uuid,
    pub almacen_id: i32,
    pub cantidad: Decimal,
}

/// Reserves stock against an anticipo using a FEFO plan.
#[utoipa::path(
    post,
    path = "/api/v1/anticipos/{id}/reservas",
    params(("id" = Uuid, Path, description = "Anticipo id"), ReserveParams),
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation created"),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "anticipos"
)]
pub async fn reserve(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(anticipo_id): Path<Uuid>,
    Query(params): Query<ReserveParams>,
    Json(payload): Json<ReserveRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::RESERVAS_CREAR)?;

    let view = state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            anticipo_id,
            payload.presentacion_id,
            payload.almacen_id,
            payload.cantidad,
            params.permitir_sin_stock,
            &user,
        )
        .await?;

    Ok(created_response(view))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseRequest {
    /// Target reservation; defaults to the anticipo's most recent one with
    /// a reserved balance.
    pub reserva_id: Option<Uuid>,
    pub cantidad: Decimal,
}

async fn resolve_reservation(
    state: &AppState,
    anticipo_id: Uuid,
    explicit: Option<Uuid>,
    require_reserved: bool,
) -> Result<Uuid, ApiError> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    let reservations = state
        .services
        .reservations
        .list_by_owner(OwnerType::Anticipo, anticipo_id)
        .await?;

    let chosen = reservations
        .iter()
        .find(|r| !require_reserved || r.reserved_quantity > Decimal::ZERO)
        .or(reservations.first())
        .ok_or_else(|| {
            ApiError::NotFound(format!("anticipo {anticipo_id} has no reservations"))
        })?;

    Ok(chosen.id)
}

/// Releases part of a reservation back to availability.
#[utoipa::path(
    post,
    path = "/api/v1/anticipos/{id}/reservas/liberar",
    params(("id" = Uuid, Path, description = "Anticipo id")),
    request_body = ReleaseRequest,
    responses(
        (status = 200, description = "Quantity released"),
        (status = 409, description = "Over-release", body = crate::errors::ErrorResponse)
    ),
    tag = "anticipos"
)]
pub async fn release(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(anticipo_id): Path<Uuid>,
    Json(payload): Json<ReleaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::RESERVAS_LIBERAR)?;

    let reservation_id =
        resolve_reservation(&state, anticipo_id, payload.reserva_id, true).await?;
    let change = state
        .services
        .reservations
        .release(reservation_id, payload.cantidad, &user)
        .await?;

    Ok(success_response(change))
}

#[derive(Debug, Deserialize, Default, ToSchema)]
pub struct ReleaseAllRequest {
    pub reserva_id: Option<Uuid>,
}

/// Releases the entire remaining reserved quantity. Idempotent.
#[utoipa::path(
    post,
    path = "/api/v1/anticipos/{id}/reservas/liberar-todo",
    params(("id" = Uuid, Path, description = "Anticipo id")),
    request_body = ReleaseAllRequest,
    responses((status = 200, description = "Remaining quantity released")),
    tag = "anticipos"
)]
pub async fn release_all(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(anticipo_id): Path<Uuid>,
    payload: Option<Json<ReleaseAllRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::RESERVAS_LIBERAR)?;

    let explicit = payload.and_then(|Json(p)| p.reserva_id);
    let reservation_id = resolve_reservation(&state, anticipo_id, explicit, true).await?;
    let change = state
        .services
        .reservations
        .release_all(reservation_id, &user)
        .await?;

    Ok(success_response(change))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyRequest {
    pub reserva_id: Option<Uuid>,
    pub cantidad: Decimal,
    /// Downstream document reference (sale id, application id)
    pub referencia: Option<String>,
}

/// Permanently consumes reserved quantity against a downstream document.
#[utoipa::path(
    post,
    path = "/api/v1/anticipos/{id}/reservas/aplicar",
    params(("id" = Uuid, Path, description = "Anticipo id")),
    request_body = ApplyRequest,
    responses(
        (status = 200, description = "Quantity applied"),
        (status = 409, description = "Over-apply", body = crate::errors::ErrorResponse)
    ),
    tag = "anticipos"
)]
pub async fn apply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(anticipo_id): Path<Uuid>,
    Json(payload): Json<ApplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::RESERVAS_APLICAR)?;

    let reservation_id =
        resolve_reservation(&state, anticipo_id, payload.reserva_id, true).await?;
    let change = state
        .services
        .reservations
        .apply(reservation_id, payload.cantidad, payload.referencia, &user)
        .await?;

    Ok(success_response(change))
}

/// Lot-level detail of every reservation owned by the anticipo.
#[utoipa::path(
    get,
    path = "/api/v1/anticipos/{id}/reservas/detalle",
    params(("id" = Uuid, Path, description = "Anticipo id")),
    responses((status = 200, description = "Reservation detail")),
    tag = "anticipos"
)]
pub async fn detail(
    State(state): State<AppState>,
    Path(anticipo_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reservations = state
        .services
        .reservations
        .list_by_owner(OwnerType::Anticipo, anticipo_id)
        .await?;

    let mut views = Vec::with_capacity(reservations.len());
    for reservation in reservations {
        views.push(state.services.reservations.view(reservation.id).await?);
    }

    Ok(success_response(views))
}
