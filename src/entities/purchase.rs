use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Purchase order lifecycle states.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Draft,
    Approved,
    PartiallyReceived,
    Closed,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Draft => "draft",
            PurchaseStatus::Approved => "approved",
            PurchaseStatus::PartiallyReceived => "partially_received",
            PurchaseStatus::Closed => "closed",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    /// Explicit allowed-transition table. Anything not listed is illegal.
    pub fn can_transition_to(&self, next: PurchaseStatus) -> bool {
        use PurchaseStatus::*;
        matches!(
            (self, next),
            (Draft, Approved)
                | (Draft, Cancelled)
                | (Approved, PartiallyReceived)
                | (Approved, Closed)
                | (Approved, Cancelled)
                | (PartiallyReceived, PartiallyReceived)
                | (PartiallyReceived, Closed)
        )
    }

    /// Whether goods may be received against the purchase in this state.
    pub fn accepts_receptions(&self) -> bool {
        matches!(
            self,
            PurchaseStatus::Approved | PurchaseStatus::PartiallyReceived
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub currency: String,
    #[sea_orm(column_type = "Decimal(Some((19, 6)))")]
    pub exchange_rate: Decimal,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_line::Entity")]
    Lines,
    #[sea_orm(has_many = "super::reception::Entity")]
    Receptions,
}

impl Related<super::purchase_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::reception::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn strum_round_trip() {
        assert_eq!(PurchaseStatus::PartiallyReceived.to_string(), "partially_received");
        assert_eq!(
            PurchaseStatus::from_str("cancelled").unwrap(),
            PurchaseStatus::Cancelled
        );
        assert!(PurchaseStatus::from_str("received").is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        use PurchaseStatus::*;
        for next in [Draft, Approved, PartiallyReceived, Closed, Cancelled] {
            assert!(!Cancelled.can_transition_to(next));
            assert!(!Closed.can_transition_to(next));
        }
    }
}
