use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kinds of stock movement. Stored as strings in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Ingreso,
    Salida,
    Transferencia,
    Ajuste,
    Reserva,
    Liberacion,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Ingreso => "ingreso",
            MovementType::Salida => "salida",
            MovementType::Transferencia => "transferencia",
            MovementType::Ajuste => "ajuste",
            MovementType::Reserva => "reserva",
            MovementType::Liberacion => "liberacion",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ingreso" => Some(MovementType::Ingreso),
            "salida" => Some(MovementType::Salida),
            "transferencia" => Some(MovementType::Transferencia),
            "ajuste" => Some(MovementType::Ajuste),
            "reserva" => Some(MovementType::Reserva),
            "liberacion" => Some(MovementType::Liberacion),
            _ => None,
        }
    }
}

/// Append-only movement log entry, the source of truth for all balances.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub movement_type: String,
    pub lot_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,
    pub source_warehouse_id: Option<i32>,
    pub dest_warehouse_id: Option<i32>,
    pub origin_module: String,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    pub created_by: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lot::Entity",
        from = "Column::LotId",
        to = "super::lot::Column::Id"
    )]
    Lot,
}

impl Related<super::lot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_round_trip() {
        for t in [
            MovementType::Ingreso,
            MovementType::Salida,
            MovementType::Transferencia,
            MovementType::Ajuste,
            MovementType::Reserva,
            MovementType::Liberacion,
        ] {
            assert_eq!(MovementType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(MovementType::from_str("devolucion"), None);
    }
}
