use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    #[sea_orm(string_value = "open")]
    Open,

    #[sea_orm(string_value = "delivered")]
    Delivered,

    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseOrderStatus::Open => write!(f, "open"),
            PurchaseOrderStatus::Delivered => write!(f, "delivered"),
            PurchaseOrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Purchase order header created by the linker on behalf of the purchasing
/// system. Only headers created from requirements are tracked here.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "Uuid")]
    pub id: Uuid,

    pub order_number: String,

    #[sea_orm(column_type = "Uuid")]
    pub supplier_id: Uuid,

    pub status: PurchaseOrderStatus,

    pub delivery_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_order_line::Entity")]
    PurchaseOrderLines,
}

impl Related<super::purchase_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseOrderLines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
