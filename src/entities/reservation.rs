use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle states of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    PartiallyReleased,
    Released,
    Applied,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::PartiallyReleased => "partially_released",
            ReservationStatus::Released => "released",
            ReservationStatus::Applied => "applied",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ReservationStatus::Active),
            "partially_released" => Some(ReservationStatus::PartiallyReleased),
            "released" => Some(ReservationStatus::Released),
            "applied" => Some(ReservationStatus::Applied),
            _ => None,
        }
    }
}

/// What kind of document owns the reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    Anticipo,
    Venta,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::Anticipo => "anticipo",
            OwnerType::Venta => "venta",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "anticipo" => Some(OwnerType::Anticipo),
            "venta" => Some(OwnerType::Venta),
            _ => None,
        }
    }
}

/// A hold on specific lot quantities pending application or release.
/// `shortfall_quantity` records the unmet remainder of a shortfall-allowed
/// request; balances themselves never go negative.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_type: String,
    pub owner_id: Uuid,
    pub presentation_id: Uuid,
    pub warehouse_id: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub requested_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub reserved_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub released_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub applied_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shortfall_quantity: Decimal,
    pub shortfall_allowed: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::reservation_allocation::Entity")]
    Allocations,
}

impl Related<super::reservation_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        assert_eq!(
            ReservationStatus::from_str("partially_released"),
            Some(ReservationStatus::PartiallyReleased)
        );
        assert_eq!(ReservationStatus::Applied.as_str(), "applied");
        assert_eq!(ReservationStatus::from_str("expired"), None);
    }
}
