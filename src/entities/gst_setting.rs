use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single-row GST configuration. Reads fall back to 18% when the row is
/// absent; only admin writes touch it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "gst_settings")]
pub struct Model {
    /// Always [`SINGLETON_ID`]; the table never holds more than one row.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub gst_percentage: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Primary key of the one and only settings row.
pub const SINGLETON_ID: i32 = 1;

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
