//! Price rounding policy and its process-wide configuration.
//!
//! The single `rounding_config` row governs the final rounding step of every
//! computed price. The service loads it once at startup and keeps a shared
//! in-memory copy that `update`/`reload` refresh.

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{info, instrument};

use crate::db::DbPool;
use crate::entities::rounding_config::{self, Entity as RoundingConfigEntity, RoundingMode};
use crate::errors::ServiceError;

/// In-memory view of the rounding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    pub mode: RoundingMode,
    pub multiple: Option<Decimal>,
    pub decimal_places: Option<i16>,
}

impl RoundingPolicy {
    pub fn none() -> Self {
        Self {
            mode: RoundingMode::None,
            multiple: None,
            decimal_places: None,
        }
    }

    fn from_model(model: &rounding_config::Model) -> Self {
        Self {
            mode: RoundingMode::from_str(&model.mode).unwrap_or(RoundingMode::None),
            multiple: model.multiple,
            decimal_places: model.decimal_places,
        }
    }

    /// Applies the policy as the final step of a price computation.
    /// Midpoints round away from zero (commercial half-up).
    pub fn apply(&self, price: Decimal) -> Decimal {
        match self.mode {
            RoundingMode::None => price,
            RoundingMode::Integer => {
                price.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            }
            RoundingMode::Multiple => match self.multiple {
                Some(m) if m > Decimal::ZERO => {
                    let steps =
                        (price / m).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
                    (steps * m).normalize()
                }
                _ => price,
            },
            RoundingMode::Decimals => {
                let places = self.decimal_places.unwrap_or(2).max(0) as u32;
                price.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero)
            }
        }
    }
}

/// Owns the persisted configuration row and the shared in-memory copy.
#[derive(Clone)]
pub struct RoundingService {
    db: Arc<DbPool>,
    current: Arc<RwLock<RoundingPolicy>>,
}

impl RoundingService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self {
            db,
            current: Arc::new(RwLock::new(RoundingPolicy::none())),
        }
    }

    /// Loads the configuration row, creating the default one when missing,
    /// and primes the in-memory copy. Called once at startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<RoundingPolicy, ServiceError> {
        let db = &*self.db;

        let model = match RoundingConfigEntity::find_by_id(rounding_config::SINGLETON_ID)
            .one(db)
            .await?
        {
            Some(model) => model,
            None => {
                let row = rounding_config::ActiveModel {
                    id: Set(rounding_config::SINGLETON_ID),
                    mode: Set(RoundingMode::None.as_str().to_string()),
                    multiple: Set(None),
                    decimal_places: Set(None),
                    updated_at: Set(Utc::now()),
                };
                row.insert(db).await?
            }
        };

        let policy = RoundingPolicy::from_model(&model);
        *self.current.write().expect("rounding policy lock poisoned") = policy.clone();
        info!(mode = %model.mode, "rounding configuration loaded");
        Ok(policy)
    }

    /// The policy currently in effect.
    pub fn current(&self) -> RoundingPolicy {
        self.current
            .read()
            .expect("rounding policy lock poisoned")
            .clone()
    }

    /// Persists a new configuration and refreshes the in-memory copy.
    #[instrument(skip(self))]
    pub async fn update(
        &self,
        mode: RoundingMode,
        multiple: Option<Decimal>,
        decimal_places: Option<i16>,
    ) -> Result<RoundingPolicy, ServiceError> {
        if mode == RoundingMode::Multiple {
            match multiple {
                Some(m) if m > Decimal::ZERO => {}
                _ => {
                    return Err(ServiceError::ValidationError(
                        "multiple mode requires a positive multiple".into(),
                    ))
                }
            }
        }
        if mode == RoundingMode::Decimals && decimal_places.map_or(true, |d| d < 0) {
            return Err(ServiceError::ValidationError(
                "decimals mode requires a non-negative decimal count".into(),
            ));
        }

        let db = &*self.db;
        let existing = RoundingConfigEntity::find_by_id(rounding_config::SINGLETON_ID)
            .one(db)
            .await?;

        let row = rounding_config::ActiveModel {
            id: Set(rounding_config::SINGLETON_ID),
            mode: Set(mode.as_str().to_string()),
            multiple: Set(multiple),
            decimal_places: Set(decimal_places),
            updated_at: Set(Utc::now()),
        };

        if existing.is_some() {
            row.update(db).await?;
        } else {
            row.insert(db).await?;
        }

        self.reload().await
    }

    /// Re-reads the persisted row into the shared copy.
    pub async fn reload(&self) -> Result<RoundingPolicy, ServiceError> {
        self.load().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn policy(mode: RoundingMode, multiple: Option<Decimal>, places: Option<i16>) -> RoundingPolicy {
        RoundingPolicy {
            mode,
            multiple,
            decimal_places: places,
        }
    }

    #[test]
    fn none_mode_is_identity() {
        assert_eq!(RoundingPolicy::none().apply(dec!(12.3456)), dec!(12.3456));
    }

    #[test_case(dec!(12.5), dec!(13) ; "midpoint rounds up")]
    #[test_case(dec!(12.49), dec!(12) ; "below midpoint rounds down")]
    #[test_case(dec!(-2.5), dec!(-3) ; "negative midpoint away from zero")]
    fn integer_mode(input: Decimal, expected: Decimal) {
        assert_eq!(policy(RoundingMode::Integer, None, None).apply(input), expected);
    }

    #[test_case(dec!(7.30), dec!(7.25) ; "snaps down to step")]
    #[test_case(dec!(7.38), dec!(7.5) ; "snaps up to step")]
    #[test_case(dec!(7.25), dec!(7.25) ; "on step unchanged")]
    fn multiple_mode(input: Decimal, expected: Decimal) {
        assert_eq!(
            policy(RoundingMode::Multiple, Some(dec!(0.25)), None).apply(input),
            expected
        );
    }

    #[test]
    fn multiple_mode_without_step_is_identity() {
        assert_eq!(
            policy(RoundingMode::Multiple, None, None).apply(dec!(9.99)),
            dec!(9.99)
        );
    }

    #[test_case(dec!(3.14159), dec!(3.14) ; "truncating half up")]
    #[test_case(dec!(3.145), dec!(3.15) ; "midpoint at scale")]
    fn decimals_mode(input: Decimal, expected: Decimal) {
        assert_eq!(
            policy(RoundingMode::Decimals, None, Some(2)).apply(input),
            expected
        );
    }
}
