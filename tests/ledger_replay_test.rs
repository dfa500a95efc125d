//! Ledger conservation: the cached position always equals a full replay of
//! the movement log, with exact decimal arithmetic.

mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use almacen_api::entities::stock_movement::MovementType;
use almacen_api::errors::ServiceError;
use almacen_api::services::ledger::{origins, MovementRecord, PositionQuery};
use common::{date, TestApp};

fn movement(
    movement_type: MovementType,
    lot_id: i64,
    quantity: Decimal,
    origin: &str,
) -> MovementRecord {
    MovementRecord {
        movement_type,
        lot_id,
        quantity,
        source_warehouse_id: None,
        dest_warehouse_id: None,
        origin_module: origin.to_string(),
        reference_id: None,
        note: None,
        created_by: "test".to_string(),
    }
}

#[tokio::test]
async fn replay_reproduces_position_after_mixed_movements() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-010", "USD", None).await;
    let lot = app
        .seed_lot(presentation, warehouse, "L-1", Some(date(2025, 6, 1)), dec!(100))
        .await;
    let ledger = &app.state.services.ledger;

    ledger
        .record_movement(movement(MovementType::Salida, lot, dec!(-12.5), origins::MANUAL))
        .await
        .unwrap();
    ledger
        .record_movement(movement(MovementType::Ajuste, lot, dec!(0.5), origins::AJUSTES))
        .await
        .unwrap();
    ledger
        .record_movement(movement(MovementType::Reserva, lot, dec!(30), origins::RESERVAS))
        .await
        .unwrap();
    ledger
        .record_movement(movement(MovementType::Liberacion, lot, dec!(10), origins::RESERVAS))
        .await
        .unwrap();
    // Consume part of the reservation
    ledger
        .record_movement(movement(MovementType::Salida, lot, dec!(-5), origins::RESERVAS))
        .await
        .unwrap();

    let report = ledger.verify_position(lot).await.unwrap();
    assert!(report.consistent, "replay diverged: {report:?}");
    assert_eq!(report.stored_available, dec!(68.0));
    assert_eq!(report.stored_reserved, dec!(15));
    assert_eq!(report.movement_count, 6);
}

#[tokio::test]
async fn overdraw_is_rejected_and_not_logged() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-011", "USD", None).await;
    let lot = app
        .seed_lot(presentation, warehouse, "L-1", None, dec!(5))
        .await;
    let ledger = &app.state.services.ledger;

    let err = ledger
        .record_movement(movement(MovementType::Salida, lot, dec!(-6), origins::MANUAL))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let report = ledger.verify_position(lot).await.unwrap();
    assert!(report.consistent);
    assert_eq!(report.stored_available, dec!(5));
    assert_eq!(report.movement_count, 1);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouse_lots() {
    let app = TestApp::new().await;
    let origin_wh = app.seed_warehouse("CEN").await;
    let dest_wh = app.seed_warehouse("SUR").await;
    let presentation = app.seed_presentation("SKU-012", "USD", None).await;
    let lot = app
        .seed_lot(presentation, origin_wh, "L-9", Some(date(2026, 1, 1)), dec!(40))
        .await;
    let ledger = &app.state.services.ledger;

    ledger
        .transfer(lot, dest_wh, dec!(15), "test", None)
        .await
        .unwrap();

    let source = ledger.verify_position(lot).await.unwrap();
    assert!(source.consistent);
    assert_eq!(source.stored_available, dec!(25));

    // The destination lot shows up in the destination warehouse listing
    let (rows, total) = ledger
        .positions(PositionQuery {
            warehouse_id: Some(dest_wh),
            page: 1,
            per_page: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].available, dec!(15));
    assert_eq!(rows[0].lot_number, "L-9");

    let dest_report = ledger.verify_position(rows[0].lot_id).await.unwrap();
    assert!(dest_report.consistent);
}

#[tokio::test]
async fn transfer_rejects_overdraw_and_same_warehouse() {
    let app = TestApp::new().await;
    let origin_wh = app.seed_warehouse("CEN").await;
    let dest_wh = app.seed_warehouse("SUR").await;
    let presentation = app.seed_presentation("SKU-013", "USD", None).await;
    let lot = app
        .seed_lot(presentation, origin_wh, "L-2", None, dec!(10))
        .await;
    let ledger = &app.state.services.ledger;

    let err = ledger
        .transfer(lot, dest_wh, dec!(11), "test", None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let err = ledger
        .transfer(lot, origin_wh, dec!(1), "test", None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    // Nothing posted by the failed attempts
    let report = ledger.verify_position(lot).await.unwrap();
    assert_eq!(report.movement_count, 1);
    assert_eq!(report.stored_available, dec!(10));
}

#[tokio::test]
async fn positions_listing_orders_by_expiration_then_sku() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let p_b = app.seed_presentation("SKU-B", "USD", None).await;
    let p_a = app.seed_presentation("SKU-A", "USD", None).await;

    app.seed_lot(p_b, warehouse, "B-LATE", Some(date(2026, 12, 1)), dec!(5))
        .await;
    app.seed_lot(p_a, warehouse, "A-NONE", None, dec!(5)).await;
    app.seed_lot(p_a, warehouse, "A-SOON", Some(date(2025, 9, 1)), dec!(5))
        .await;

    let (rows, total) = app
        .state
        .services
        .ledger
        .positions(PositionQuery {
            warehouse_id: Some(warehouse),
            page: 1,
            per_page: 10,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(total, 3);
    assert_eq!(rows[0].lot_number, "A-SOON");
    assert_eq!(rows[1].lot_number, "B-LATE");
    // Null expiration sorts last
    assert_eq!(rows[2].lot_number, "A-NONE");
}

#[tokio::test]
async fn recent_movements_come_newest_first() {
    let app = TestApp::new().await;
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-014", "USD", None).await;
    let lot = app
        .seed_lot(presentation, warehouse, "L-3", None, dec!(50))
        .await;
    let ledger = &app.state.services.ledger;

    ledger
        .record_movement(movement(MovementType::Salida, lot, dec!(-1), origins::MANUAL))
        .await
        .unwrap();
    ledger
        .record_movement(movement(MovementType::Salida, lot, dec!(-2), origins::MANUAL))
        .await
        .unwrap();

    let movements = ledger.recent_movements(lot, None, 2).await.unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].quantity, dec!(-2));
    assert_eq!(movements[1].quantity, dec!(-1));
}
