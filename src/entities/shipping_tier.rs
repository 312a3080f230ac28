use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shipping tier: a contiguous range of order amounts mapped to a flat
/// charge. Active tiers must form pairwise non-overlapping ranges; the
/// service enforces that invariant at write time.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipping_tiers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Inclusive lower bound.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub min_amount: Decimal,
    /// Inclusive upper bound; `None` means unbounded above.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub max_amount: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub shipping_charge: Decimal,
    /// Inactive tiers are exempt from the overlap invariant and excluded
    /// from lookup; the check re-fires when a tier is activated.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Display label for the covered range, e.g. `"500 - 999"` or `"1000+"`.
    pub fn range_label(&self) -> String {
        match self.max_amount {
            Some(max) => format!("{} - {}", self.min_amount, max),
            None => format!("{}+", self.min_amount),
        }
    }
}
