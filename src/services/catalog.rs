use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    entities::nomenclature_item::{self, Entity as NomenclatureItemEntity},
    errors::ServiceError,
};

/// Display attributes of a nomenclature item, denormalized onto
/// requirement rows.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSummary {
    pub id: Uuid,
    pub item_code: String,
    pub name: String,
    pub unit: String,
    pub category: Option<String>,
    pub purchasable: bool,
}

impl From<nomenclature_item::Model> for ItemSummary {
    fn from(model: nomenclature_item::Model) -> Self {
        Self {
            id: model.id,
            item_code: model.item_code,
            name: model.name,
            unit: model.unit,
            category: model.category,
            purchasable: model.purchasable,
        }
    }
}

/// Read-only view over the item catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogView: Send + Sync {
    async fn item_summary(&self, item_id: Uuid) -> Result<Option<ItemSummary>, ServiceError>;
}

/// Catalog view backed by the local projection of nomenclature items.
#[derive(Clone)]
pub struct SqlCatalogView {
    db: Arc<DatabaseConnection>,
}

impl SqlCatalogView {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogView for SqlCatalogView {
    #[instrument(skip(self))]
    async fn item_summary(&self, item_id: Uuid) -> Result<Option<ItemSummary>, ServiceError> {
        let item = NomenclatureItemEntity::find_by_id(item_id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to read catalog item {}: {}", item_id, e);
                ServiceError::UpstreamUnavailable(format!("catalog: {}", e))
            })?;

        Ok(item.map(ItemSummary::from))
    }
}
