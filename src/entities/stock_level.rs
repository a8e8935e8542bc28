use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-warehouse stock position for one nomenclature item. Read-only to
/// this core; maintained by the warehouse system.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_levels")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "Uuid")]
    pub id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub nomenclature_item_id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub warehouse_id: Uuid,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub on_hand: Decimal,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub reserved: Decimal,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::nomenclature_item::Entity",
        from = "Column::NomenclatureItemId",
        to = "super::nomenclature_item::Column::Id"
    )]
    NomenclatureItem,
}

impl Related<super::nomenclature_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NomenclatureItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
