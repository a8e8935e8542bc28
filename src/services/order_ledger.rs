use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{error, instrument};
use uuid::Uuid;

use crate::{
    entities::purchase_order_line::{self, Entity as PurchaseOrderLineEntity, OrderLineStatus},
    errors::ServiceError,
};

/// One open purchase-order line as seen by the aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrderLine {
    pub line_id: Uuid,
    pub purchase_order_id: Uuid,
    pub requirement_id: Option<Uuid>,
    pub ordered: Decimal,
    pub delivered: Decimal,
}

impl OpenOrderLine {
    /// Quantity still expected on this line.
    pub fn outstanding(&self) -> Decimal {
        (self.ordered - self.delivered).max(Decimal::ZERO)
    }
}

impl From<purchase_order_line::Model> for OpenOrderLine {
    fn from(model: purchase_order_line::Model) -> Self {
        Self {
            line_id: model.id,
            purchase_order_id: model.purchase_order_id,
            requirement_id: model.requirement_id,
            ordered: model.ordered,
            delivered: model.delivered,
        }
    }
}

/// Read-only view over the purchasing ledger; only open lines count.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderLedgerView: Send + Sync {
    /// Open lines for one item across all purchase orders.
    async fn open_lines(&self, item_id: Uuid) -> Result<Vec<OpenOrderLine>, ServiceError>;

    /// Open lines carrying a linkage to the given requirement.
    async fn open_lines_for_requirement(
        &self,
        requirement_id: Uuid,
    ) -> Result<Vec<OpenOrderLine>, ServiceError>;
}

/// Order ledger view backed by the local purchase order tables.
#[derive(Clone)]
pub struct SqlOrderLedgerView {
    db: Arc<DatabaseConnection>,
}

impl SqlOrderLedgerView {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderLedgerView for SqlOrderLedgerView {
    #[instrument(skip(self))]
    async fn open_lines(&self, item_id: Uuid) -> Result<Vec<OpenOrderLine>, ServiceError> {
        let lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::NomenclatureItemId.eq(item_id))
            .filter(purchase_order_line::Column::Status.eq(OrderLineStatus::Open))
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!("Failed to read open order lines for item {}: {}", item_id, e);
                ServiceError::UpstreamUnavailable(format!("order ledger: {}", e))
            })?;

        Ok(lines.into_iter().map(OpenOrderLine::from).collect())
    }

    #[instrument(skip(self))]
    async fn open_lines_for_requirement(
        &self,
        requirement_id: Uuid,
    ) -> Result<Vec<OpenOrderLine>, ServiceError> {
        let lines = PurchaseOrderLineEntity::find()
            .filter(purchase_order_line::Column::RequirementId.eq(requirement_id))
            .filter(purchase_order_line::Column::Status.eq(OrderLineStatus::Open))
            .all(&*self.db)
            .await
            .map_err(|e| {
                error!(
                    "Failed to read open order lines for requirement {}: {}",
                    requirement_id, e
                );
                ServiceError::UpstreamUnavailable(format!("order ledger: {}", e))
            })?;

        Ok(lines.into_iter().map(OpenOrderLine::from).collect())
    }
}
