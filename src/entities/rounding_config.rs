use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const SINGLETON_ID: i32 = 1;

/// Final-rounding modes applied to computed prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    None,
    Integer,
    Multiple,
    Decimals,
}

impl RoundingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundingMode::None => "none",
            RoundingMode::Integer => "integer",
            RoundingMode::Multiple => "multiple",
            RoundingMode::Decimals => "decimals",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(RoundingMode::None),
            "integer" => Some(RoundingMode::Integer),
            "multiple" => Some(RoundingMode::Multiple),
            "decimals" => Some(RoundingMode::Decimals),
            _ => None,
        }
    }
}

/// Process-wide rounding configuration. A single row (`id = 1`) exists.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rounding_config")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub mode: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub multiple: Option<Decimal>,
    pub decimal_places: Option<i16>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
