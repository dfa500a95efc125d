//! Request-level tests over the assembled router: identity headers,
//! capability checks and a reservation round trip.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{date, TestApp};

fn request(method: Method, uri: &str, body: Option<Value>, permissions: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(perms) = permissions {
        builder = builder
            .header("x-user-id", "u-100")
            .header("x-user-name", "ana")
            .header("x-user-permissions", perms);
    }
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let app = TestApp::new().await;
    let response = app
        .router()
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn mutating_endpoints_require_identity_and_capability() {
    let app = TestApp::new().await;
    let anticipo = Uuid::new_v4();
    let payload = json!({
        "presentacion_id": Uuid::new_v4(),
        "almacen_id": 1,
        "cantidad": "5"
    });

    // No identity headers -> 401
    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/anticipos/{anticipo}/reservas"),
            Some(payload.clone()),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Identity without the capability -> 403
    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/anticipos/{anticipo}/reservas"),
            Some(payload),
            Some("inventario:ver"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn reserve_release_view_round_trip() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-HTTP", "USD", None).await;
    app.seed_lot(presentation, warehouse, "A", Some(date(2025, 1, 1)), dec!(10))
        .await;
    app.seed_lot(presentation, warehouse, "B", Some(date(2025, 2, 1)), dec!(10))
        .await;

    let anticipo = Uuid::new_v4();
    let payload = json!({
        "presentacion_id": presentation,
        "almacen_id": warehouse,
        "cantidad": "15"
    });

    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/anticipos/{anticipo}/reservas"),
            Some(payload),
            Some("reservas:*"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["reserved_quantity"], "15");
    assert_eq!(body["allocations"].as_array().unwrap().len(), 2);
    assert_eq!(body["allocations"][0]["lot_number"], "A");
    assert_eq!(body["allocations"][0]["allocated"], "10");
    assert_eq!(body["allocations"][1]["lot_number"], "B");
    assert_eq!(body["allocations"][1]["allocated"], "5");

    // Release part of it
    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/anticipos/{anticipo}/reservas/liberar"),
            Some(json!({ "cantidad": "5" })),
            Some("reservas:*"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["remaining_reserved"], "10");

    // Detail projection
    let response = app
        .router()
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/anticipos/{anticipo}/reservas/detalle"),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["released_quantity"], "5");
}

#[tokio::test]
async fn oversell_maps_to_unprocessable_entity() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-OVER", "USD", None).await;
    app.seed_lot(presentation, warehouse, "A", None, dec!(10)).await;

    let anticipo = Uuid::new_v4();
    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/anticipos/{anticipo}/reservas"),
            Some(json!({
                "presentacion_id": presentation,
                "almacen_id": warehouse,
                "cantidad": "25"
            })),
            Some("reservas:crear"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Insufficient stock"));
}

#[tokio::test]
async fn shortfall_flag_comes_from_the_query_string() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-SF", "USD", None).await;
    app.seed_lot(presentation, warehouse, "A", None, dec!(10)).await;

    let anticipo = Uuid::new_v4();
    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/anticipos/{anticipo}/reservas?permitir_sin_stock=true"),
            Some(json!({
                "presentacion_id": presentation,
                "almacen_id": warehouse,
                "cantidad": "25"
            })),
            Some("reservas:crear"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["reserved_quantity"], "10");
    assert_eq!(body["shortfall_quantity"], "15");
}

#[tokio::test]
async fn inventory_listing_and_alerts_are_readable() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-INV", "USD", None).await;
    let expiring_soon = chrono::Utc::now().date_naive() + chrono::Duration::days(3);
    app.seed_lot(presentation, warehouse, "A", Some(expiring_soon), dec!(10))
        .await;

    let response = app
        .router()
        .oneshot(request(
            Method::GET,
            &format!("/api/v1/inventario/por-lote?almacen_id={warehouse}"),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["sku"], "SKU-INV");

    let response = app
        .router()
        .oneshot(request(
            Method::GET,
            "/api/v1/inventario/alertas?severidad=urgente",
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["alert_type"], "vencimiento");

    let response = app
        .router()
        .oneshot(request(
            Method::GET,
            "/api/v1/inventario/alertas/resumen",
            None,
            None,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["by_severity"]["urgente"], 1);
}

#[tokio::test]
async fn purchase_status_change_via_query_param() {
    let app = TestApp::new().await;
    let presentation = app.seed_presentation("SKU-PO", "USD", None).await;

    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            "/api/v1/compras",
            Some(json!({
                "proveedor_id": Uuid::new_v4(),
                "moneda": "USD",
                "tipo_cambio": "3.5",
                "lineas": [{
                    "presentacion_id": presentation,
                    "cantidad": "10",
                    "costo_unitario": "2.50"
                }]
            })),
            Some("compras:*"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let purchase_id = body["id"].as_str().unwrap().to_string();

    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/compras/{purchase_id}/estado?nuevo=approved"),
            None,
            Some("compras:*"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "approved");

    // Illegal jump surfaces as 409
    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            &format!("/api/v1/compras/{purchase_id}/estado?nuevo=draft"),
            None,
            Some("compras:*"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn exchange_rate_convert_round_trip() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(request(
            Method::GET,
            "/api/v1/finanzas/tipos-cambio/convertir?moneda_origen=USD&moneda_destino=PEN&monto=100",
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router()
        .oneshot(request(
            Method::POST,
            "/api/v1/finanzas/tipos-cambio",
            Some(json!({
                "moneda_origen": "USD",
                "moneda_destino": "PEN",
                "fecha_vigencia": "2020-01-01",
                "tasa": "3.5"
            })),
            Some("finanzas:*"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .router()
        .oneshot(request(
            Method::GET,
            "/api/v1/finanzas/tipos-cambio/convertir?moneda_origen=USD&moneda_destino=PEN&monto=100",
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let rate_used: rust_decimal::Decimal = body["rate_used"].as_str().unwrap().parse().unwrap();
    let converted: rust_decimal::Decimal = body["converted"].as_str().unwrap().parse().unwrap();
    assert_eq!(rate_used, dec!(3.5));
    assert_eq!(converted, dec!(350));
}
