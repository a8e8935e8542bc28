use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::entities::material_requirement;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::purchasing::{CreatedOrder, OrderLineSpec, PurchasingGateway};
use crate::services::recalc::RecalculationCoordinator;
use crate::services::requirements::commit_versioned;

lazy_static! {
    pub(crate) static ref ORDERS_CREATED: IntCounter = IntCounter::new(
        "purchase_orders_created_total",
        "Total purchase orders created from requirements"
    )
    .expect("metric can be created");
    pub(crate) static ref ORDER_CREATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "purchase_order_creation_failures_total",
            "Purchase order creation failures by error type"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    pub(crate) static ref ORDERS_CANCELLED: IntCounter = IntCounter::new(
        "purchase_orders_cancelled_total",
        "Total purchase orders cancelled"
    )
    .expect("metric can be created");
}

fn error_label(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::ValidationError(_) => "validation",
        ServiceError::Conflict(_) => "conflict",
        ServiceError::ConcurrentModification(_) => "concurrent_modification",
        ServiceError::NotFound(_) => "not_found",
        ServiceError::DatabaseError(_) => "database",
        _ => "other",
    }
}

/// Turns waiting requirements into purchase orders and back. All link
/// transitions go through here; recalculation never touches order links.
#[derive(Clone)]
pub struct ProcurementService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PurchasingGateway>,
    coordinator: Arc<RecalculationCoordinator>,
    event_sender: Option<EventSender>,
}

impl ProcurementService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PurchasingGateway>,
        coordinator: Arc<RecalculationCoordinator>,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            coordinator,
            event_sender,
        }
    }

    /// Creates one purchase order covering the given requirements, one line
    /// per requirement at its current `to_order` quantity. All-or-nothing:
    /// any missing, linked or ineligible requirement fails the whole call
    /// and nothing is written.
    #[instrument(skip(self))]
    pub async fn create_order_for_requirements(
        &self,
        requirement_ids: Vec<Uuid>,
        supplier_id: Uuid,
        delivery_date: Option<NaiveDate>,
    ) -> Result<CreatedOrder, ServiceError> {
        if requirement_ids.is_empty() {
            ORDER_CREATION_FAILURES
                .with_label_values(&["validation"])
                .inc();
            return Err(ServiceError::ValidationError(
                "At least one requirement id is required".to_string(),
            ));
        }

        let mut ids = requirement_ids;
        ids.sort_unstable();
        ids.dedup();
        let requirement_count = ids.len();

        let gateway = Arc::clone(&self.gateway);
        let result = self
            .db
            .transaction::<_, CreatedOrder, ServiceError>(move |txn| {
                Box::pin(async move {
                    let rows = material_requirement::Entity::find()
                        .filter(material_requirement::Column::Id.is_in(ids.iter().copied()))
                        .all(txn)
                        .await?;

                    if rows.len() != ids.len() {
                        let found: HashSet<Uuid> = rows.iter().map(|r| r.id).collect();
                        let missing: Vec<String> = ids
                            .iter()
                            .filter(|id| !found.contains(id))
                            .map(Uuid::to_string)
                            .collect();
                        return Err(ServiceError::NotFound(format!(
                            "Requirements not found: {}",
                            missing.join(", ")
                        )));
                    }

                    let already_linked: Vec<String> = rows
                        .iter()
                        .filter(|r| r.purchase_order_id.is_some())
                        .map(|r| r.id.to_string())
                        .collect();
                    if !already_linked.is_empty() {
                        return Err(ServiceError::Conflict(format!(
                            "Requirements already linked to an order: {}",
                            already_linked.join(", ")
                        )));
                    }

                    let ineligible: Vec<String> = rows
                        .iter()
                        .filter(|r| !r.orderable())
                        .map(|r| format!("{} ({}, to_order {})", r.id, r.status, r.to_order))
                        .collect();
                    if !ineligible.is_empty() {
                        return Err(ServiceError::ValidationError(format!(
                            "Requirements not eligible for ordering: {}",
                            ineligible.join(", ")
                        )));
                    }

                    let lines: Vec<OrderLineSpec> = rows
                        .iter()
                        .map(|r| OrderLineSpec {
                            nomenclature_item_id: r.nomenclature_item_id,
                            requirement_id: Some(r.id),
                            quantity: r.to_order,
                        })
                        .collect();

                    let order = gateway
                        .create_purchase_order(txn, supplier_id, delivery_date, lines)
                        .await?;

                    for mut row in rows {
                        let expected_version = row.version;
                        row.link_to_order(order.purchase_order_id, supplier_id, delivery_date)?;
                        let update = material_requirement::ActiveModel {
                            status: Set(row.status),
                            purchase_order_id: Set(row.purchase_order_id),
                            supplier_id: Set(row.supplier_id),
                            delivery_date: Set(row.delivery_date),
                            updated_at: Set(row.updated_at),
                            version: Set(row.version),
                            ..Default::default()
                        };
                        commit_versioned(txn, row.id, expected_version, update).await?;
                    }

                    Ok(order)
                })
            })
            .await
            .map_err(ServiceError::from);

        match &result {
            Ok(order) => {
                ORDERS_CREATED.inc();
                info!(
                    "Linked {} requirement(s) to purchase order {}",
                    requirement_count, order.order_number
                );
                if let Some(sender) = &self.event_sender {
                    sender
                        .send(Event::PurchaseOrderCreated {
                            purchase_order_id: order.purchase_order_id,
                            order_number: order.order_number.clone(),
                            requirement_count,
                        })
                        .await
                        .map_err(ServiceError::EventError)?;
                }
            }
            Err(e) => {
                error!("Purchase order creation failed: {}", e);
                ORDER_CREATION_FAILURES
                    .with_label_values(&[error_label(e)])
                    .inc();
            }
        }

        result
    }

    /// Cancels an order and releases its requirement links back to
    /// `waiting_order` (written-off rows keep their status). The affected
    /// items are queued so the next recompute sees the returned supply.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<material_requirement::Model>, ServiceError> {
        let gateway = Arc::clone(&self.gateway);
        let released = self
            .db
            .transaction::<_, Vec<material_requirement::Model>, ServiceError>(move |txn| {
                Box::pin(async move {
                    gateway.cancel_purchase_order(txn, order_id).await?;

                    let linked = material_requirement::Entity::find()
                        .filter(material_requirement::Column::PurchaseOrderId.eq(order_id))
                        .all(txn)
                        .await?;

                    let mut released = Vec::with_capacity(linked.len());
                    for mut row in linked {
                        let expected_version = row.version;
                        row.release_order_link()?;
                        let update = material_requirement::ActiveModel {
                            status: Set(row.status),
                            purchase_order_id: Set(None),
                            supplier_id: Set(None),
                            delivery_date: Set(None),
                            updated_at: Set(row.updated_at),
                            version: Set(row.version),
                            ..Default::default()
                        };
                        commit_versioned(txn, row.id, expected_version, update).await?;
                        released.push(row);
                    }

                    Ok(released)
                })
            })
            .await
            .map_err(|e| {
                error!("Purchase order cancellation failed: {}", e);
                ServiceError::from(e)
            })?;

        ORDERS_CANCELLED.inc();
        info!(
            "Cancelled purchase order {} and released {} requirement(s)",
            order_id,
            released.len()
        );

        self.coordinator
            .queue_items(released.iter().map(|r| r.nomenclature_item_id));

        if let Some(sender) = &self.event_sender {
            sender
                .send(Event::PurchaseOrderCancelled(order_id))
                .await
                .map_err(ServiceError::EventError)?;
        }

        Ok(released)
    }
}
