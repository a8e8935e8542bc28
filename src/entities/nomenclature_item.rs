use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry for a purchasable nomenclature item. Owned by the catalog
/// service upstream; this core only reads it to denormalize display fields.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "nomenclature_items")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "Uuid")]
    pub id: Uuid,

    pub item_code: String,

    pub name: String,

    pub unit: String,

    pub category: Option<String>,

    pub purchasable: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::material_requirement::Entity")]
    MaterialRequirements,

    #[sea_orm(has_many = "super::project_demand_line::Entity")]
    ProjectDemandLines,

    #[sea_orm(has_many = "super::stock_level::Entity")]
    StockLevels,
}

impl Related<super::material_requirement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MaterialRequirements.def()
    }
}

impl Related<super::project_demand_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProjectDemandLines.def()
    }
}

impl Related<super::stock_level::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockLevels.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
