use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    entities::stock_level::{self, Entity as StockLevelEntity},
    errors::ServiceError,
};

/// Stock position of one item in one warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct StockPosition {
    pub warehouse_id: Uuid,
    pub on_hand: Decimal,
    pub reserved: Decimal,
}

impl StockPosition {
    /// Quantity usable for netting; reservations in excess of stock never
    /// produce negative availability.
    pub fn available(&self) -> Decimal {
        (self.on_hand - self.reserved).max(Decimal::ZERO)
    }
}

impl From<stock_level::Model> for StockPosition {
    fn from(model: stock_level::Model) -> Self {
        Self {
            warehouse_id: model.warehouse_id,
            on_hand: model.on_hand,
            reserved: model.reserved,
        }
    }
}

/// Read-only view over warehouse stock.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryView: Send + Sync {
    /// Per-warehouse positions for one item. Missing rows mean zero stock.
    async fn stock_positions(&self, item_id: Uuid) -> Result<Vec<StockPosition>, ServiceError>;
}

/// Inventory view backed by the local projection of warehouse stock levels.
#[derive(Clone)]
pub struct SqlInventoryView {
    db: Arc<DatabaseConnection>,
}

impl SqlInventoryView {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InventoryView for SqlInventoryView {
    #[instrument(skip(self))]
    async fn stock_positions(&self, item_id: Uuid) -> Result<Vec<StockPosition>, ServiceError> {
        let positions = StockLevelEntity::find()
            .filter(stock_level::Column::NomenclatureItemId.eq(item_id))
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to read stock positions for item {}: {}", item_id, e);
                ServiceError::UpstreamUnavailable(format!("inventory view: {}", e))
            })?;

        Ok(positions.into_iter().map(StockPosition::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn available_floors_at_zero_per_warehouse() {
        let over_reserved = StockPosition {
            warehouse_id: Uuid::new_v4(),
            on_hand: dec!(5),
            reserved: dec!(8),
        };
        assert_eq!(over_reserved.available(), Decimal::ZERO);

        let normal = StockPosition {
            warehouse_id: Uuid::new_v4(),
            on_hand: dec!(12),
            reserved: dec!(2),
        };
        assert_eq!(normal.available(), dec!(10));
    }
}
