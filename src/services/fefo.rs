//! FEFO allocation planning.
//!
//! Pure planning over a snapshot of candidate lots: first-expires-first-out,
//! lots without an expiration date last, ties broken by ascending lot id.
//! Planning never touches storage; the reservation engine re-validates the
//! plan inside the transaction that commits it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceError;

/// A lot eligible for allocation, as observed at planning time.
#[derive(Debug, Clone, PartialEq)]
pub struct LotCandidate {
    pub lot_id: i64,
    pub expiration_date: Option<chrono::NaiveDate>,
    pub available: Decimal,
}

/// One lot's share of an allocation plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotAllocation {
    pub lot_id: i64,
    pub quantity: Decimal,
}

/// Result of planning: ordered allocations plus the unmet remainder
/// (zero unless shortfall was allowed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<LotAllocation>,
    pub shortfall: Decimal,
}

impl AllocationPlan {
    pub fn allocated_total(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

/// Plans an allocation of `requested` units over `candidates`.
///
/// Fails with `InsufficientStock` when the pool cannot cover the request
/// and shortfall is disallowed; in that case no plan is produced.
pub fn plan(
    mut candidates: Vec<LotCandidate>,
    requested: Decimal,
    shortfall_allowed: bool,
) -> Result<AllocationPlan, ServiceError> {
    if requested <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "requested quantity must be positive".into(),
        ));
    }

    candidates.retain(|c| c.available > Decimal::ZERO);
    candidates.sort_by(|a, b| {
        match (a.expiration_date, b.expiration_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then(a.lot_id.cmp(&b.lot_id))
    });

    let mut remaining = requested;
    let mut allocations = Vec::new();

    for candidate in &candidates {
        if remaining == Decimal::ZERO {
            break;
        }
        let take = remaining.min(candidate.available);
        allocations.push(LotAllocation {
            lot_id: candidate.lot_id,
            quantity: take,
        });
        remaining -= take;
    }

    if remaining > Decimal::ZERO && !shortfall_allowed {
        let pool: Decimal = candidates.iter().map(|c| c.available).sum();
        return Err(ServiceError::InsufficientStock(format!(
            "requested {requested}, available {pool}"
        )));
    }

    Ok(AllocationPlan {
        allocations,
        shortfall: remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn lot(id: i64, exp: Option<(i32, u32, u32)>, available: Decimal) -> LotCandidate {
        LotCandidate {
            lot_id: id,
            expiration_date: exp.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            available,
        }
    }

    #[test]
    fn allocates_earliest_expiring_first() {
        let candidates = vec![
            lot(2, Some((2025, 2, 1)), dec!(10)),
            lot(1, Some((2025, 1, 1)), dec!(10)),
        ];
        let plan = plan(candidates, dec!(15), false).unwrap();
        assert_eq!(plan.allocations.len(), 2);
        assert_eq!(plan.allocations[0].lot_id, 1);
        assert_eq!(plan.allocations[0].quantity, dec!(10));
        assert_eq!(plan.allocations[1].lot_id, 2);
        assert_eq!(plan.allocations[1].quantity, dec!(5));
        assert_eq!(plan.shortfall, Decimal::ZERO);
    }

    #[test]
    fn equal_expirations_break_ties_by_lot_id() {
        let candidates = vec![
            lot(9, Some((2025, 3, 1)), dec!(4)),
            lot(3, Some((2025, 3, 1)), dec!(4)),
        ];
        let plan = plan(candidates, dec!(5), false).unwrap();
        assert_eq!(plan.allocations[0].lot_id, 3);
        assert_eq!(plan.allocations[1].lot_id, 9);
    }

    #[test]
    fn lots_without_expiration_sort_last() {
        let candidates = vec![
            lot(1, None, dec!(10)),
            lot(2, Some((2026, 6, 30)), dec!(3)),
        ];
        let plan = plan(candidates, dec!(5), false).unwrap();
        assert_eq!(plan.allocations[0].lot_id, 2);
        assert_eq!(plan.allocations[0].quantity, dec!(3));
        assert_eq!(plan.allocations[1].lot_id, 1);
        assert_eq!(plan.allocations[1].quantity, dec!(2));
    }

    #[test]
    fn insufficient_stock_without_shortfall() {
        let candidates = vec![
            lot(1, Some((2025, 1, 1)), dec!(10)),
            lot(2, Some((2025, 2, 1)), dec!(10)),
        ];
        let err = plan(candidates, dec!(25), false).unwrap_err();
        assert!(matches!(err, ServiceError::InsufficientStock(_)));
    }

    #[test]
    fn shortfall_allowed_returns_partial_plan() {
        let candidates = vec![lot(1, Some((2025, 1, 1)), dec!(10))];
        let plan = plan(candidates, dec!(25), true).unwrap();
        assert_eq!(plan.allocated_total(), dec!(10));
        assert_eq!(plan.shortfall, dec!(15));
    }

    #[test]
    fn empty_pool_with_shortfall_is_a_pure_backorder() {
        let plan = plan(vec![], dec!(5), true).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.shortfall, dec!(5));
    }

    #[test]
    fn zero_request_is_rejected() {
        let err = plan(vec![], Decimal::ZERO, true).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn exhausted_lots_are_skipped() {
        let candidates = vec![
            lot(1, Some((2025, 1, 1)), Decimal::ZERO),
            lot(2, Some((2025, 2, 1)), dec!(8)),
        ];
        let plan = plan(candidates, dec!(5), false).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].lot_id, 2);
    }
}
