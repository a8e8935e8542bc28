use super::common::{created_response, success_response, validate_input};
use super::requirements::OrderCreatedResponse;
use crate::entities::material_requirement;
use crate::errors::ServiceError;
use crate::services::procurement::ProcurementService;
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Trait for purchase order handler state
pub trait PurchaseOrdersHandlerState: Clone + Send + Sync + 'static {
    fn procurement_service(&self) -> &ProcurementService;
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    /// Requirements to cover, one order line each at its current
    /// `to_order` quantity
    #[validate(length(min = 1, message = "at least one requirement id is required"))]
    pub requirement_ids: Vec<Uuid>,
    pub supplier_id: Uuid,
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderCancelledResponse {
    pub purchase_order_id: Uuid,
    /// Rows released back to `waiting_order` (written-off rows keep
    /// their status)
    pub released_requirements: Vec<material_requirement::Model>,
}

/// Create the purchase orders router
pub fn purchase_orders_router<S>() -> Router<S>
where
    S: PurchaseOrdersHandlerState,
{
    Router::new()
        .route("/", post(create_purchase_order::<S>))
        .route("/:id/cancel", post(cancel_purchase_order::<S>))
}

/// Create a purchase order covering several requirements
///
/// All-or-nothing: any missing, already linked or ineligible requirement
/// fails the whole call and nothing is written.
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 201, description = "Purchase order created", body = OrderCreatedResponse),
        (status = 400, description = "Invalid request or ineligible requirement", body = crate::errors::ErrorResponse),
        (status = 404, description = "Requirement not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Requirement already linked to an open order", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn create_purchase_order<S>(
    State(state): State<S>,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PurchaseOrdersHandlerState,
{
    validate_input(&payload)?;

    let created = state
        .procurement_service()
        .create_order_for_requirements(
            payload.requirement_ids,
            payload.supplier_id,
            payload.delivery_date,
        )
        .await?;

    info!("Purchase order created: {}", created.order_number);

    Ok(created_response(OrderCreatedResponse {
        purchase_order_id: created.purchase_order_id,
        purchase_order_number: created.order_number,
    }))
}

/// Cancel a purchase order
///
/// Open lines are closed and linked requirements drop back to
/// `waiting_order`; their items are queued for the next recompute.
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/{id}/cancel",
    params(
        ("id" = Uuid, Path, description = "Purchase order ID")
    ),
    responses(
        (status = 200, description = "Purchase order cancelled", body = OrderCancelledResponse),
        (status = 400, description = "Order already delivered", body = crate::errors::ErrorResponse),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already cancelled", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "purchase-orders"
)]
pub async fn cancel_purchase_order<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: PurchaseOrdersHandlerState,
{
    let released = state.procurement_service().cancel_order(id).await?;

    info!(
        "Purchase order cancelled: {} ({} requirement(s) released)",
        id,
        released.len()
    );

    Ok(success_response(OrderCancelledResponse {
        purchase_order_id: id,
        released_requirements: released,
    }))
}
