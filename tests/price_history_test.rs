//! Price historization: vigente-window semantics, manual change, revert,
//! and mass recalculation (simulate idempotence, rounding, no-op skips).

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;

use almacen_api::entities::rounding_config::RoundingMode;
use almacen_api::errors::ServiceError;
use almacen_api::services::prices::PriceSearchQuery;
use common::{date, TestApp};

#[tokio::test]
async fn scenario_c_manual_change_closes_the_vigente_window() {
    let app = TestApp::new().await;
    let presentation = app.seed_presentation("SKU-200", "USD", None).await;
    let user = TestApp::admin();
    let prices = &app.state.services.prices;

    let t0 = Utc::now() - Duration::days(10);
    let t1 = Utc::now();

    prices
        .manual_change(presentation, dec!(100), "precio inicial", Some(t0), &user)
        .await
        .unwrap();
    prices
        .manual_change(presentation, dec!(150), "ajuste comercial", Some(t1), &user)
        .await
        .unwrap();

    let timeline = prices.timeline(presentation).await.unwrap();
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].price, dec!(100));
    // Row 1 closes exactly where row 2 opens
    assert_eq!(timeline[0].valid_to, Some(timeline[1].valid_from));
    assert_eq!(timeline[1].price, dec!(150));
    assert_eq!(timeline[1].valid_to, None);

    let vigente = prices.current(presentation).await.unwrap().unwrap();
    assert_eq!(vigente.price, dec!(150));
}

#[tokio::test]
async fn at_most_one_vigente_row_and_windows_partition_time() {
    let app = TestApp::new().await;
    let presentation = app.seed_presentation("SKU-201", "USD", None).await;
    let user = TestApp::admin();
    let prices = &app.state.services.prices;

    for (i, price) in [dec!(10), dec!(11), dec!(12), dec!(13)].iter().enumerate() {
        let at = Utc::now() - Duration::days(9 - i as i64 * 3);
        prices
            .manual_change(presentation, *price, "cambio", Some(at), &user)
            .await
            .unwrap();
    }

    let timeline = prices.timeline(presentation).await.unwrap();
    assert_eq!(timeline.len(), 4);

    let open_rows = timeline.iter().filter(|r| r.valid_to.is_none()).count();
    assert_eq!(open_rows, 1);

    for pair in timeline.windows(2) {
        // Each window closes exactly where the next one starts
        assert_eq!(pair[0].valid_to, Some(pair[1].valid_from));
        assert!(pair[0].valid_from <= pair[1].valid_from);
    }
}

#[tokio::test]
async fn negative_price_and_overlapping_effective_time_are_rejected() {
    let app = TestApp::new().await;
    let presentation = app.seed_presentation("SKU-202", "USD", None).await;
    let user = TestApp::admin();
    let prices = &app.state.services.prices;

    let err = prices
        .manual_change(presentation, dec!(-1), "negativo", None, &user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    prices
        .manual_change(presentation, dec!(100), "inicial", Some(Utc::now()), &user)
        .await
        .unwrap();

    // An effective time before the vigente window start would overlap
    let err = prices
        .manual_change(
            presentation,
            dec!(90),
            "retroactivo",
            Some(Utc::now() - Duration::days(1)),
            &user,
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn revert_appends_instead_of_rewriting() {
    let app = TestApp::new().await;
    let presentation = app.seed_presentation("SKU-203", "USD", None).await;
    let user = TestApp::admin();
    let prices = &app.state.services.prices;

    prices
        .manual_change(
            presentation,
            dec!(100),
            "inicial",
            Some(Utc::now() - Duration::days(5)),
            &user,
        )
        .await
        .unwrap();
    prices
        .manual_change(
            presentation,
            dec!(150),
            "subida",
            Some(Utc::now() - Duration::days(1)),
            &user,
        )
        .await
        .unwrap();

    let timeline = prices.timeline(presentation).await.unwrap();
    let original_id = timeline[0].id;

    let reverted = prices.revert(original_id, &user).await.unwrap();
    assert_eq!(reverted.price, dec!(100));
    assert!(reverted.valid_to.is_none());

    let timeline = prices.timeline(presentation).await.unwrap();
    assert_eq!(timeline.len(), 3);
    // The historical row is untouched
    assert_eq!(timeline[0].id, original_id);
    assert_eq!(timeline[0].price, dec!(100));
    assert!(timeline[0].valid_to.is_some());
    // And the new vigente copies its price
    assert_eq!(timeline[2].price, dec!(100));
    assert!(timeline[2].valid_to.is_none());
}

#[tokio::test]
async fn scenario_d_simulated_recalculation_is_idempotent_and_writes_nothing() {
    let app = TestApp::new().await;
    let user = TestApp::admin();
    let services = &app.state.services;

    let p1 = app.seed_presentation("SKU-210", "USD", Some(dec!(10))).await;
    let p2 = app.seed_presentation("SKU-211", "USD", Some(dec!(20))).await;
    // No base cost: skipped
    app.seed_presentation("SKU-212", "USD", None).await;
    // Different cost currency: not in scope
    app.seed_presentation("SKU-213", "EUR", Some(dec!(5))).await;

    services
        .exchange_rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.5), "test")
        .await
        .unwrap();

    // p1 already priced at the recomputed value; p2 differs
    services
        .prices
        .manual_change(p1, dec!(35), "inicial", None, &user)
        .await
        .unwrap();
    services
        .prices
        .manual_change(p2, dec!(60), "inicial", None, &user)
        .await
        .unwrap();

    let first = services
        .prices
        .mass_recalculate("USD", "PEN", true, "simulacion", None, &user)
        .await
        .unwrap();
    let second = services
        .prices
        .mass_recalculate("USD", "PEN", true, "simulacion", None, &user)
        .await
        .unwrap();

    assert_eq!(first.changed, 1);
    assert_eq!(first.unchanged, 1);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.items.len(), 1);
    assert_eq!(first.items[0].new_price, dec!(70));

    // Identical summaries, zero rows persisted
    assert_eq!(first.changed, second.changed);
    assert_eq!(first.unchanged, second.unchanged);
    assert_eq!(first.skipped, second.skipped);
    assert_eq!(first.items[0].old_price, second.items[0].old_price);
    assert_eq!(first.items[0].new_price, second.items[0].new_price);

    let p2_timeline = services.prices.timeline(p2).await.unwrap();
    assert_eq!(p2_timeline.len(), 1, "simulation must not write history");
}

#[tokio::test]
async fn committed_recalculation_writes_only_differing_items() {
    let app = TestApp::new().await;
    let user = TestApp::admin();
    let services = &app.state.services;

    let p1 = app.seed_presentation("SKU-220", "USD", Some(dec!(10))).await;
    let p2 = app.seed_presentation("SKU-221", "USD", Some(dec!(20))).await;

    services
        .exchange_rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.5), "test")
        .await
        .unwrap();
    services
        .prices
        .manual_change(p1, dec!(35), "inicial", None, &user)
        .await
        .unwrap();

    let summary = services
        .prices
        .mass_recalculate("USD", "PEN", false, "recalculo", None, &user)
        .await
        .unwrap();
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.unchanged, 1);

    // p1 untouched (no no-op history row), p2 gained its first window
    assert_eq!(services.prices.timeline(p1).await.unwrap().len(), 1);
    let p2_timeline = services.prices.timeline(p2).await.unwrap();
    assert_eq!(p2_timeline.len(), 1);
    assert_eq!(p2_timeline[0].price, dec!(70));
    assert!(p2_timeline[0].valid_to.is_none());

    // Re-running commits nothing further
    let again = services
        .prices
        .mass_recalculate("USD", "PEN", false, "recalculo", None, &user)
        .await
        .unwrap();
    assert_eq!(again.changed, 0);
    assert_eq!(again.unchanged, 2);
    assert_eq!(services.prices.timeline(p2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn recalculation_applies_the_rounding_policy() {
    let app = TestApp::new().await;
    let user = TestApp::admin();
    let services = &app.state.services;

    let p = app.seed_presentation("SKU-230", "USD", Some(dec!(3.33))).await;
    services
        .exchange_rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.5), "test")
        .await
        .unwrap();

    services
        .rounding
        .update(RoundingMode::Integer, None, None)
        .await
        .unwrap();

    let summary = services
        .prices
        .mass_recalculate("USD", "PEN", true, "simulacion", None, &user)
        .await
        .unwrap();
    // 3.33 * 3.5 = 11.655 -> 12
    assert_eq!(summary.items[0].new_price, dec!(12));
    assert_eq!(summary.items[0].presentation_id, p);

    services
        .rounding
        .update(RoundingMode::Multiple, Some(dec!(0.25)), None)
        .await
        .unwrap();
    let summary = services
        .prices
        .mass_recalculate("USD", "PEN", true, "simulacion", None, &user)
        .await
        .unwrap();
    // 11.655 -> 11.75
    assert_eq!(summary.items[0].new_price, dec!(11.75));
}

#[tokio::test]
async fn recalculation_without_a_rate_is_not_found() {
    let app = TestApp::new().await;
    let user = TestApp::admin();
    app.seed_presentation("SKU-240", "USD", Some(dec!(1))).await;

    let err = app
        .state
        .services
        .prices
        .mass_recalculate("USD", "PEN", true, "simulacion", None, &user)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn search_filters_by_sku_reason_and_user() {
    let app = TestApp::new().await;
    let user = TestApp::admin();
    let prices = &app.state.services.prices;

    let p1 = app.seed_presentation("SKU-250", "USD", None).await;
    let p2 = app.seed_presentation("OTRA-9", "USD", None).await;

    prices
        .manual_change(p1, dec!(10), "apertura de temporada", None, &user)
        .await
        .unwrap();
    prices
        .manual_change(p2, dec!(20), "correccion", None, &user)
        .await
        .unwrap();

    let (rows, total) = prices
        .search(PriceSearchQuery {
            sku: Some("SKU-250".to_string()),
            page: 1,
            per_page: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].sku, "SKU-250");

    let (rows, total) = prices
        .search(PriceSearchQuery {
            reason_contains: Some("temporada".to_string()),
            page: 1,
            per_page: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].reason, "apertura de temporada");

    let (_, total) = prices
        .search(PriceSearchQuery {
            user_contains: Some("test-admin".to_string()),
            page: 1,
            per_page: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
}
