//! Exchange rate store semantics: append-only records, vigente-as-of-date
//! lookups and conversion.

mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use almacen_api::errors::ServiceError;
use common::{date, TestApp};

#[tokio::test]
async fn vigente_picks_the_greatest_effective_date_not_after() {
    let app = TestApp::new().await;
    let rates = &app.state.services.exchange_rates;

    rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.50), "test")
        .await
        .unwrap();
    rates
        .create("USD", "PEN", date(2025, 3, 1), dec!(3.70), "test")
        .await
        .unwrap();
    rates
        .create("USD", "PEN", date(2025, 6, 1), dec!(3.90), "test")
        .await
        .unwrap();

    // Before the first record: none
    assert!(rates
        .vigente("USD", "PEN", date(2024, 12, 31))
        .await
        .unwrap()
        .is_none());

    // Exactly on a boundary
    let on_boundary = rates.vigente("USD", "PEN", date(2025, 3, 1)).await.unwrap().unwrap();
    assert_eq!(on_boundary.rate, dec!(3.70));

    // Between records: the earlier one still rules
    let between = rates.vigente("USD", "PEN", date(2025, 5, 30)).await.unwrap().unwrap();
    assert_eq!(between.rate, dec!(3.70));

    // After the last record
    let latest = rates.vigente("USD", "PEN", date(2026, 1, 1)).await.unwrap().unwrap();
    assert_eq!(latest.rate, dec!(3.90));

    // The inverse pair is a different series
    assert!(rates
        .vigente("PEN", "USD", date(2025, 6, 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn create_validations() {
    let app = TestApp::new().await;
    let rates = &app.state.services.exchange_rates;

    let err = rates
        .create("USD", "USD", date(2025, 1, 1), dec!(1), "test")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(0), "test")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(-3.5), "test")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn duplicate_same_day_rate_conflicts_but_create_if_absent_returns_it() {
    let app = TestApp::new().await;
    let rates = &app.state.services.exchange_rates;

    let original = rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.50), "test")
        .await
        .unwrap();

    let err = rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.60), "test")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    let existing = rates
        .create_if_absent("USD", "PEN", date(2025, 1, 1), dec!(3.60), "test")
        .await
        .unwrap();
    assert_eq!(existing.id, original.id);
    assert_eq!(existing.rate, dec!(3.50));
}

#[tokio::test]
async fn convert_uses_todays_vigente_rate() {
    let app = TestApp::new().await;
    let rates = &app.state.services.exchange_rates;

    let err = rates.convert("USD", "PEN", dec!(100)).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    rates
        .create("USD", "PEN", date(2020, 1, 1), dec!(3.50), "test")
        .await
        .unwrap();

    let result = rates.convert("USD", "PEN", dec!(100)).await.unwrap();
    assert_eq!(result.rate_used, dec!(3.50));
    assert_eq!(result.converted, dec!(350.00));
    assert_eq!(result.effective_date, date(2020, 1, 1));
}

#[tokio::test]
async fn history_is_ordered_newest_first_and_filterable() {
    let app = TestApp::new().await;
    let rates = &app.state.services.exchange_rates;

    rates
        .create("USD", "PEN", date(2025, 1, 1), dec!(3.50), "test")
        .await
        .unwrap();
    rates
        .create("USD", "PEN", date(2025, 2, 1), dec!(3.60), "test")
        .await
        .unwrap();
    rates
        .create("EUR", "PEN", date(2025, 1, 15), dec!(4.00), "test")
        .await
        .unwrap();

    let (rows, total) = rates.history(Some("USD"), Some("PEN"), 1, 10).await.unwrap();
    assert_eq!(total, 2);
    assert_eq!(rows[0].effective_date, date(2025, 2, 1));
    assert_eq!(rows[1].effective_date, date(2025, 1, 1));

    let (_, total) = rates.history(None, None, 1, 10).await.unwrap();
    assert_eq!(total, 3);
}
