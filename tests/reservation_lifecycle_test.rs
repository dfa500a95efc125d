//! Reservation engine lifecycle over a real (SQLite) ledger: FEFO
//! commitment, shortfall handling, release/apply accounting and the
//! `released + applied <= requested` invariant.

mod common;

use assert_matches::assert_matches;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use almacen_api::entities::reservation::OwnerType;
use almacen_api::errors::ServiceError;
use almacen_api::services::reservations::ReservationView;
use common::{date, TestApp};

async fn reserved_pool(app: &TestApp) -> (Uuid, i32, i64, i64) {
    let warehouse = app.seed_warehouse("CEN").await;
    let presentation = app.seed_presentation("SKU-001", "USD", None).await;
    let lot_x = app
        .seed_lot(presentation, warehouse, "X", Some(date(2025, 1, 1)), dec!(10))
        .await;
    let lot_y = app
        .seed_lot(presentation, warehouse, "Y", Some(date(2025, 2, 1)), dec!(10))
        .await;
    (presentation, warehouse, lot_x, lot_y)
}

fn assert_lifecycle_invariant(view: &ReservationView) {
    assert!(
        view.released_quantity + view.applied_quantity <= view.requested_quantity,
        "released {} + applied {} exceeds requested {}",
        view.released_quantity,
        view.applied_quantity,
        view.requested_quantity
    );
}

#[tokio::test]
async fn scenario_a_reserve_15_across_two_lots() {
    let app = TestApp::new().await;
    let (presentation, warehouse, lot_x, lot_y) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(15),
            false,
            &user,
        )
        .await
        .unwrap();

    assert_eq!(view.reserved_quantity, dec!(15));
    assert_eq!(view.shortfall_quantity, Decimal::ZERO);
    assert_eq!(view.allocations.len(), 2);
    assert_eq!(view.allocations[0].lot_id, lot_x);
    assert_eq!(view.allocations[0].allocated, dec!(10));
    assert_eq!(view.allocations[1].lot_id, lot_y);
    assert_eq!(view.allocations[1].allocated, dec!(5));
    assert_lifecycle_invariant(&view);

    // Resulting positions: X fully reserved, Y split 5/5
    let x = app.state.services.ledger.verify_position(lot_x).await.unwrap();
    assert_eq!(x.stored_available, Decimal::ZERO);
    assert_eq!(x.stored_reserved, dec!(10));
    assert!(x.consistent);

    let y = app.state.services.ledger.verify_position(lot_y).await.unwrap();
    assert_eq!(y.stored_available, dec!(5));
    assert_eq!(y.stored_reserved, dec!(5));
    assert!(y.consistent);
}

#[tokio::test]
async fn scenario_b_insufficient_stock_leaves_no_trace() {
    let app = TestApp::new().await;
    let (presentation, warehouse, lot_x, lot_y) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let err = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(25),
            false,
            &user,
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InsufficientStock(_));

    for lot in [lot_x, lot_y] {
        let report = app.state.services.ledger.verify_position(lot).await.unwrap();
        assert_eq!(report.stored_available, dec!(10));
        assert_eq!(report.stored_reserved, Decimal::ZERO);
        // Seed ingreso is the only movement
        assert_eq!(report.movement_count, 1);
    }
}

#[tokio::test]
async fn shortfall_allowed_records_backorder_without_negative_balances() {
    let app = TestApp::new().await;
    let (presentation, warehouse, _, _) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(25),
            true,
            &user,
        )
        .await
        .unwrap();

    assert_eq!(view.reserved_quantity, dec!(20));
    assert_eq!(view.shortfall_quantity, dec!(5));
    assert_eq!(view.requested_quantity, dec!(25));
    assert_lifecycle_invariant(&view);
}

#[tokio::test]
async fn release_goes_back_to_latest_expiring_lot_first() {
    let app = TestApp::new().await;
    let (presentation, warehouse, lot_x, lot_y) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(15),
            false,
            &user,
        )
        .await
        .unwrap();

    let change = app
        .state
        .services
        .reservations
        .release(view.id, dec!(8), &user)
        .await
        .unwrap();
    assert_eq!(change.remaining_reserved, dec!(7));
    assert_eq!(change.status, "partially_released");

    // Y's 5 freed first (reverse FEFO), then 3 from X
    let y = app.state.services.ledger.verify_position(lot_y).await.unwrap();
    assert_eq!(y.stored_reserved, Decimal::ZERO);
    assert_eq!(y.stored_available, dec!(10));

    let x = app.state.services.ledger.verify_position(lot_x).await.unwrap();
    assert_eq!(x.stored_reserved, dec!(7));
    assert_eq!(x.stored_available, dec!(3));

    let after = app.state.services.reservations.view(view.id).await.unwrap();
    assert_lifecycle_invariant(&after);
}

#[tokio::test]
async fn over_release_is_a_conflict() {
    let app = TestApp::new().await;
    let (presentation, warehouse, _, _) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(10),
            false,
            &user,
        )
        .await
        .unwrap();

    let err = app
        .state
        .services
        .reservations
        .release(view.id, dec!(11), &user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn release_all_is_idempotent() {
    let app = TestApp::new().await;
    let (presentation, warehouse, _, _) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(12),
            false,
            &user,
        )
        .await
        .unwrap();

    let first = app
        .state
        .services
        .reservations
        .release_all(view.id, &user)
        .await
        .unwrap();
    assert_eq!(first.quantity, dec!(12));
    assert_eq!(first.remaining_reserved, Decimal::ZERO);
    assert_eq!(first.status, "released");

    // Second call: zero-effect summary, not an error
    let second = app
        .state
        .services
        .reservations
        .release_all(view.id, &user)
        .await
        .unwrap();
    assert_eq!(second.quantity, Decimal::ZERO);
    assert_eq!(second.remaining_reserved, Decimal::ZERO);

    let after = app.state.services.reservations.view(view.id).await.unwrap();
    assert_eq!(after.reserved_quantity, Decimal::ZERO);
    assert_lifecycle_invariant(&after);
}

#[tokio::test]
async fn apply_consumes_fefo_first_and_marks_applied() {
    let app = TestApp::new().await;
    let (presentation, warehouse, lot_x, lot_y) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(15),
            false,
            &user,
        )
        .await
        .unwrap();

    let partial = app
        .state
        .services
        .reservations
        .apply(view.id, dec!(10), Some("venta-77".to_string()), &user)
        .await
        .unwrap();
    assert_eq!(partial.remaining_reserved, dec!(5));
    assert_eq!(partial.status, "active");

    // X (earliest expiration) consumed first
    let x = app.state.services.ledger.verify_position(lot_x).await.unwrap();
    assert_eq!(x.stored_reserved, Decimal::ZERO);
    assert_eq!(x.stored_available, Decimal::ZERO);
    assert!(x.consistent);

    let rest = app
        .state
        .services
        .reservations
        .apply(view.id, dec!(5), None, &user)
        .await
        .unwrap();
    assert_eq!(rest.remaining_reserved, Decimal::ZERO);
    assert_eq!(rest.status, "applied");

    let y = app.state.services.ledger.verify_position(lot_y).await.unwrap();
    assert_eq!(y.stored_reserved, Decimal::ZERO);
    assert_eq!(y.stored_available, dec!(5));
    assert!(y.consistent);

    let after = app.state.services.reservations.view(view.id).await.unwrap();
    assert_eq!(after.applied_quantity, dec!(15));
    assert_lifecycle_invariant(&after);

    // Applying against an exhausted reservation is a conflict
    let err = app
        .state
        .services
        .reservations
        .apply(view.id, dec!(1), None, &user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn mixed_release_and_apply_keep_the_invariant() {
    let app = TestApp::new().await;
    let (presentation, warehouse, _, _) = reserved_pool(&app).await;
    let user = TestApp::admin();

    let view = app
        .state
        .services
        .reservations
        .reserve(
            OwnerType::Anticipo,
            Uuid::new_v4(),
            presentation,
            warehouse,
            dec!(20),
            false,
            &user,
        )
        .await
        .unwrap();

    app.state
        .services
        .reservations
        .apply(view.id, dec!(6), None, &user)
        .await
        .unwrap();
    app.state
        .services
        .reservations
        .release(view.id, dec!(4), &user)
        .await
        .unwrap();
    let last = app
        .state
        .services
        .reservations
        .release_all(view.id, &user)
        .await
        .unwrap();

    assert_eq!(last.remaining_reserved, Decimal::ZERO);

    let after = app.state.services.reservations.view(view.id).await.unwrap();
    assert_eq!(after.applied_quantity, dec!(6));
    assert_eq!(after.released_quantity, dec!(14));
    assert_eq!(after.reserved_quantity, Decimal::ZERO);
    assert_lifecycle_invariant(&after);
}
