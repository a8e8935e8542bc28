use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One outstanding purchasable quantity contributed by one project item.
///
/// Read-only to this core. Lines flagged `by_contractor` or `planning_stage`
/// exist in the table but are skipped by the aggregator.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "project_demand_lines")]
pub struct Model {
    #[sea_orm(primary_key, column_type = "Uuid")]
    pub id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub nomenclature_item_id: Uuid,

    #[sea_orm(column_type = "Uuid")]
    pub project_id: Uuid,

    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity: Decimal,

    pub required_by: Option<NaiveDate>,

    pub responsible_id: Option<Uuid>,

    /// Purchased by the contractor directly; excluded from aggregation.
    pub by_contractor: bool,

    /// Still at planning stage; excluded from aggregation.
    pub planning_stage: bool,

    pub created_at: DateTime<Utc>,

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

impl Model {
    /// True when this line contributes to aggregated demand.
    pub fn counted(&self) -> bool {
        !self.by_contractor && !self.planning_stage
    }
}
