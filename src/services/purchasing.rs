use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::purchase_order_line::{self, OrderLineStatus};
use crate::errors::ServiceError;

/// One order line to be placed, optionally carrying the requirement it
/// fulfils.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLineSpec {
    pub nomenclature_item_id: Uuid,
    pub requirement_id: Option<Uuid>,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub purchase_order_id: Uuid,
    pub order_number: String,
}

/// Seam to the purchasing system. Methods run inside the caller's
/// transaction so order writes and requirement linking commit or roll back
/// together; a remote implementation would treat the transaction as opaque.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchasingGateway: Send + Sync {
    async fn create_purchase_order(
        &self,
        txn: &DatabaseTransaction,
        supplier_id: Uuid,
        delivery_date: Option<NaiveDate>,
        lines: Vec<OrderLineSpec>,
    ) -> Result<CreatedOrder, ServiceError>;

    async fn cancel_purchase_order(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<(), ServiceError>;
}

/// Writes purchase orders straight into the shared schema.
#[derive(Clone)]
pub struct SqlPurchasingGateway {
    number_prefix: String,
}

impl SqlPurchasingGateway {
    pub fn new(number_prefix: impl Into<String>) -> Self {
        Self {
            number_prefix: number_prefix.into(),
        }
    }

    /// Per-day sequential order number, `{prefix}-{yyyymmdd}-{seq}`. The
    /// unique index on `order_number` catches the rare same-instant race.
    async fn next_order_number<C: ConnectionTrait>(&self, db: &C) -> Result<String, ServiceError> {
        let today = Utc::now().date_naive();
        let day_start = today.and_time(NaiveTime::MIN).and_utc();
        let issued_today = purchase_order::Entity::find()
            .filter(purchase_order::Column::CreatedAt.gte(day_start))
            .count(db)
            .await?;

        Ok(format!(
            "{}-{}-{:04}",
            self.number_prefix,
            today.format("%Y%m%d"),
            issued_today + 1
        ))
    }
}

#[async_trait]
impl PurchasingGateway for SqlPurchasingGateway {
    #[instrument(skip(self, txn, lines))]
    async fn create_purchase_order(
        &self,
        txn: &DatabaseTransaction,
        supplier_id: Uuid,
        delivery_date: Option<NaiveDate>,
        lines: Vec<OrderLineSpec>,
    ) -> Result<CreatedOrder, ServiceError> {
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "Purchase order must contain at least one line".to_string(),
            ));
        }
        for line in &lines {
            if line.quantity <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Order line for item {} has non-positive quantity {}",
                    line.nomenclature_item_id, line.quantity
                )));
            }
        }

        let order_number = self.next_order_number(txn).await?;
        let now = Utc::now();
        let header = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_number: Set(order_number.clone()),
            supplier_id: Set(supplier_id),
            status: Set(PurchaseOrderStatus::Open),
            delivery_date: Set(delivery_date),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let header = header.insert(txn).await?;

        for line in &lines {
            let row = purchase_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(header.id),
                nomenclature_item_id: Set(line.nomenclature_item_id),
                requirement_id: Set(line.requirement_id),
                ordered: Set(line.quantity),
                delivered: Set(Decimal::ZERO),
                status: Set(OrderLineStatus::Open),
                created_at: Set(now),
                updated_at: Set(now),
            };
            row.insert(txn).await?;
        }

        info!(
            "Created purchase order {} with {} line(s)",
            order_number,
            lines.len()
        );
        Ok(CreatedOrder {
            purchase_order_id: header.id,
            order_number,
        })
    }

    #[instrument(skip(self, txn))]
    async fn cancel_purchase_order(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let order = purchase_order::Entity::find_by_id(order_id)
            .one(txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Purchase order {} not found", order_id))
            })?;

        match order.status {
            PurchaseOrderStatus::Cancelled => {
                return Err(ServiceError::Conflict(format!(
                    "Purchase order {} is already cancelled",
                    order_id
                )));
            }
            PurchaseOrderStatus::Delivered => {
                return Err(ServiceError::ValidationError(format!(
                    "Purchase order {} is delivered and cannot be cancelled",
                    order_id
                )));
            }
            PurchaseOrderStatus::Open => {}
        }

        let line_update = purchase_order_line::ActiveModel {
            status: Set(OrderLineStatus::Cancelled),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        purchase_order_line::Entity::update_many()
            .set(line_update)
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order_id))
            .filter(purchase_order_line::Column::Status.eq(OrderLineStatus::Open))
            .exec(txn)
            .await?;

        let mut header: purchase_order::ActiveModel = order.into();
        header.status = Set(PurchaseOrderStatus::Cancelled);
        header.updated_at = Set(Utc::now());
        header.update(txn).await?;

        info!("Cancelled purchase order {}", order_id);
        Ok(())
    }
}
