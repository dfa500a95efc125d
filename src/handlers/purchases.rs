use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::common::{created_response, success_response, validate_input, PaginatedResponse};
use crate::auth::{permissions, CurrentUser};
use crate::entities::purchase::PurchaseStatus;
use crate::errors::ApiError;
use crate::services::purchases::PurchaseLineInput;
use crate::services::receptions::ReceptionItemInput;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/compras", post(create_purchase).get(list_purchases))
        .route("/compras/recepciones", post(create_reception))
        .route("/compras/recepciones/:id", get(get_reception))
        .route("/compras/recepciones/:id/items", post(add_reception_items))
        .route("/compras/recepciones/:id/cerrar", patch(close_reception))
        .route("/compras/:id", get(get_purchase).delete(delete_purchase))
        .route("/compras/:id/estado", post(change_status))
        .route("/compras/:id/lineas", post(add_line))
        .route(
            "/compras/:id/lineas/:line_id",
            put(update_line).delete(remove_line),
        )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PurchaseLineRequest {
    pub presentacion_id: Uuid,
    pub cantidad: Decimal,
    pub costo_unitario: Decimal,
    pub fecha_esperada: Option<NaiveDate>,
}

impl From<PurchaseLineRequest> for PurchaseLineInput {
    fn from(req: PurchaseLineRequest) -> Self {
        Self {
            presentation_id: req.presentacion_id,
            quantity: req.cantidad,
            unit_cost: req.costo_unitario,
            expected_date: req.fecha_esperada,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseRequest {
    pub proveedor_id: Uuid,
    #[validate(length(min = 3, max = 3))]
    pub moneda: String,
    pub tipo_cambio: Decimal,
    pub notas: Option<String>,
    #[serde(default)]
    pub lineas: Vec<PurchaseLineRequest>,
}

/// Creates a draft purchase with its initial lines.
#[utoipa::path(
    post,
    path = "/api/v1/compras",
    request_body = CreatePurchaseRequest,
    responses(
        (status = 201, description = "Purchase created"),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn create_purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreatePurchaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_GESTIONAR)?;
    validate_input(&payload)?;

    let purchase = state
        .services
        .purchases
        .create(
            payload.proveedor_id,
            &payload.moneda,
            payload.tipo_cambio,
            payload.notas,
            payload.lineas.into_iter().map(Into::into).collect(),
        )
        .await?;

    Ok(created_response(purchase))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PurchaseFilters {
    /// draft | approved | partially_received | closed | cancelled
    pub estado: Option<String>,
    pub proveedor_id: Option<Uuid>,
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

/// Paginated purchase listing.
#[utoipa::path(
    get,
    path = "/api/v1/compras",
    params(PurchaseFilters),
    responses((status = 200, description = "Paginated purchases")),
    tag = "compras"
)]
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(filters): Query<PurchaseFilters>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match filters.estado.as_deref() {
        None => None,
        Some(raw) => Some(PurchaseStatus::from_str(raw).map_err(|_| {
            ApiError::ValidationError(format!("unknown purchase status {raw}"))
        })?),
    };

    let (rows, total) = state
        .services
        .purchases
        .list(status, filters.proveedor_id, filters.page, filters.per_page)
        .await?;

    Ok(success_response(PaginatedResponse::new(
        rows,
        filters.page,
        filters.per_page,
        total,
    )))
}

/// Purchase with its detail lines.
#[utoipa::path(
    get,
    path = "/api/v1/compras/{id}",
    params(("id" = Uuid, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Purchase detail"),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn get_purchase(
    State(state): State<AppState>,
    Path(purchase_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let purchase = state.services.purchases.get(purchase_id).await?;
    let lines = state.services.purchases.lines(purchase_id).await?;

    Ok(success_response(serde_json::json!({
        "compra": purchase,
        "lineas": lines
    })))
}

/// Deletes a purchase with zero detail lines.
#[utoipa::path(
    delete,
    path = "/api/v1/compras/{id}",
    params(("id" = Uuid, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Purchase deleted"),
        (status = 409, description = "Purchase has lines", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn delete_purchase(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_GESTIONAR)?;
    state.services.purchases.delete(purchase_id).await?;
    Ok(success_response(serde_json::json!({
        "deleted_id": purchase_id
    })))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatusParams {
    /// Target status
    pub nuevo: String,
}

/// Applies a status change validated against the transition table.
#[utoipa::path(
    post,
    path = "/api/v1/compras/{id}/estado",
    params(("id" = Uuid, Path, description = "Purchase id"), StatusParams),
    responses(
        (status = 200, description = "Status changed"),
        (status = 409, description = "Illegal transition", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn change_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Query(params): Query<StatusParams>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_GESTIONAR)?;

    let new_status = PurchaseStatus::from_str(&params.nuevo).map_err(|_| {
        ApiError::ValidationError(format!("unknown purchase status {}", params.nuevo))
    })?;

    let updated = state
        .services
        .purchases
        .change_status(purchase_id, new_status)
        .await?;

    Ok(success_response(updated))
}

/// Adds a line to a draft purchase.
#[utoipa::path(
    post,
    path = "/api/v1/compras/{id}/lineas",
    params(("id" = Uuid, Path, description = "Purchase id")),
    request_body = PurchaseLineRequest,
    responses((status = 201, description = "Line added")),
    tag = "compras"
)]
pub async fn add_line(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(purchase_id): Path<Uuid>,
    Json(payload): Json<PurchaseLineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_GESTIONAR)?;
    let line = state
        .services
        .purchases
        .add_line(purchase_id, payload.into())
        .await?;
    Ok(created_response(line))
}

/// Rewrites a line of a draft purchase.
#[utoipa::path(
    put,
    path = "/api/v1/compras/{id}/lineas/{line_id}",
    params(
        ("id" = Uuid, Path, description = "Purchase id"),
        ("line_id" = i64, Path, description = "Line id")
    ),
    request_body = PurchaseLineRequest,
    responses((status = 200, description = "Line updated")),
    tag = "compras"
)]
pub async fn update_line(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((purchase_id, line_id)): Path<(Uuid, i64)>,
    Json(payload): Json<PurchaseLineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_GESTIONAR)?;
    let line = state
        .services
        .purchases
        .update_line(purchase_id, line_id, payload.into())
        .await?;
    Ok(success_response(line))
}

/// Removes a line from a draft purchase.
#[utoipa::path(
    delete,
    path = "/api/v1/compras/{id}/lineas/{line_id}",
    params(
        ("id" = Uuid, Path, description = "Purchase id"),
        ("line_id" = i64, Path, description = "Line id")
    ),
    responses((status = 200, description = "Line removed")),
    tag = "compras"
)]
pub async fn remove_line(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((purchase_id, line_id)): Path<(Uuid, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_GESTIONAR)?;
    state
        .services
        .purchases
        .remove_line(purchase_id, line_id)
        .await?;
    Ok(success_response(serde_json::json!({
        "deleted_line_id": line_id
    })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReceptionItemRequest {
    pub linea_compra_id: i64,
    #[validate(length(min = 1))]
    pub numero_lote: String,
    pub fecha_fabricacion: Option<NaiveDate>,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub cantidad: Decimal,
}

impl From<ReceptionItemRequest> for ReceptionItemInput {
    fn from(req: ReceptionItemRequest) -> Self {
        Self {
            purchase_line_id: req.linea_compra_id,
            lot_number: req.numero_lote,
            manufacture_date: req.fecha_fabricacion,
            expiration_date: req.fecha_vencimiento,
            quantity: req.cantidad,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReceptionRequest {
    pub compra_id: Uuid,
    pub almacen_id: i32,
    #[validate(length(min = 1))]
    pub numero_documento: String,
    pub items: Vec<ReceptionItemRequest>,
}

/// Registers a goods receipt against an approved purchase.
#[utoipa::path(
    post,
    path = "/api/v1/compras/recepciones",
    request_body = CreateReceptionRequest,
    responses(
        (status = 201, description = "Reception registered"),
        (status = 409, description = "Cap exceeded or illegal state", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn create_reception(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(payload): Json<CreateReceptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_RECIBIR)?;
    validate_input(&payload)?;

    let reception = state
        .services
        .receptions
        .register(
            payload.compra_id,
            payload.almacen_id,
            payload.numero_documento,
            payload.items.into_iter().map(Into::into).collect(),
            &user,
        )
        .await?;

    Ok(created_response(reception))
}

/// Reception document with its posted lines.
#[utoipa::path(
    get,
    path = "/api/v1/compras/recepciones/{id}",
    params(("id" = Uuid, Path, description = "Reception id")),
    responses((status = 200, description = "Reception detail")),
    tag = "compras"
)]
pub async fn get_reception(
    State(state): State<AppState>,
    Path(reception_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reception = state.services.receptions.get(reception_id).await?;
    let lines = state.services.receptions.lines(reception_id).await?;

    Ok(success_response(serde_json::json!({
        "recepcion": reception,
        "items": lines
    })))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddReceptionItemsRequest {
    pub items: Vec<ReceptionItemRequest>,
}

/// Posts additional items to an open reception.
#[utoipa::path(
    post,
    path = "/api/v1/compras/recepciones/{id}/items",
    params(("id" = Uuid, Path, description = "Reception id")),
    request_body = AddReceptionItemsRequest,
    responses(
        (status = 200, description = "Items posted"),
        (status = 409, description = "Reception closed", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn add_reception_items(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reception_id): Path<Uuid>,
    Json(payload): Json<AddReceptionItemsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_RECIBIR)?;

    let reception = state
        .services
        .receptions
        .add_items(
            reception_id,
            payload.items.into_iter().map(Into::into).collect(),
            &user,
        )
        .await?;

    Ok(success_response(reception))
}

/// One-way terminal close of a reception.
#[utoipa::path(
    patch,
    path = "/api/v1/compras/recepciones/{id}/cerrar",
    params(("id" = Uuid, Path, description = "Reception id")),
    responses(
        (status = 200, description = "Reception closed"),
        (status = 409, description = "Already closed", body = crate::errors::ErrorResponse)
    ),
    tag = "compras"
)]
pub async fn close_reception(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(reception_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    user.require(permissions::COMPRAS_RECIBIR)?;
    let reception = state.services.receptions.close(reception_id).await?;
    Ok(success_response(reception))
}
