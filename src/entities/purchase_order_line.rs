use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum OrderLineStatus {
    #[sea_orm(string_value = "open")]
    Open,

    #[sea_orm(string_value = "closed")]
    Closed,

    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl fmt::Display for OrderLineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderLineStatus::Open => write!(f, "open"),
            OrderLineStatus::Closed => write!(f, "closed"),
            OrderLineStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One line of a purchase order. `requirement_id` carries the linkage back
/// to the aggregated requirement the line was cut for; undelivered quantity
/// on open lines feeds `total_in_order`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_order_lines")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "Uuid")]
    pub id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub purchase_order_id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub nomenclature_item_id: Uuid,

    pub requirement_id: Option<Uuid>,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub ordered: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub delivered: Decimal,

    pub status: OrderLineStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_order::Entity",
        from = "Column::PurchaseOrderId",
        to = "super::purchase_order::Column::Id"
    )]
    PurchaseOrder,
}

impl Related<super::purchase_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrder.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Quantity still expected on this line; zero once closed or cancelled.
    pub fn outstanding(&self) -> Decimal {
        match self.status {
            OrderLineStatus::Open => (self.ordered - self.delivered).max(Decimal::ZERO),
            OrderLineStatus::Closed | OrderLineStatus::Cancelled => Decimal::ZERO,
        }
    }
}
