use crate::config::AppConfig;
use crate::entities::material_requirement::{
    self, RequirementPriority, RequirementStatus,
};
use crate::errors::ServiceError;
use crate::handlers::common::{no_content_response, resolve_page};
use crate::services::procurement::ProcurementService;
use crate::services::recalc::{RecalcScope, RecalculationCoordinator, RunReport};
use crate::services::requirements::{RequirementFilter, RequirementService, RequirementSummary};
use crate::PaginatedResponse;
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

// Trait for requirement handler state that provides access to the services
// behind the requirement board
pub trait RequirementsHandlerState: Clone + Send + Sync + 'static {
    fn requirement_service(&self) -> &RequirementService;
    fn coordinator(&self) -> &Arc<RecalculationCoordinator>;
    fn procurement_service(&self) -> &ProcurementService;
    fn app_config(&self) -> &AppConfig;
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct RequirementFilters {
    /// Restrict to one procurement status
    pub status: Option<RequirementStatus>,
    /// Restrict to one priority band
    pub priority: Option<RequirementPriority>,
    /// Shorthand for `priority=critical`
    #[serde(default)]
    pub critical_only: bool,
    pub category: Option<String>,
    /// Restrict to one project scope; omit for all scopes
    pub project_id: Option<Uuid>,
    /// Substring match against item code and item name
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecalculateRequest {
    /// Recompute every item with demand or existing rows instead of only
    /// the queued ones
    #[serde(default)]
    pub recalculate_all: bool,
    /// Extra item ids to fold into the run scope
    #[serde(default)]
    pub item_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncFromProjectsResponse {
    /// Requirement rows brought up to date by the incremental run
    pub synced_count: u64,
    pub run_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderForRequirementRequest {
    pub supplier_id: Uuid,
    pub delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderCreatedResponse {
    pub purchase_order_id: Uuid,
    pub purchase_order_number: String,
}

/// Create the requirements router
pub fn requirements_router<S>() -> Router<S>
where
    S: RequirementsHandlerState,
{
    Router::new()
        .route("/", get(list_requirements::<S>))
        .route("/summary", get(requirement_summary::<S>))
        .route("/recalculate", post(recalculate::<S>))
        .route("/sync-from-projects", post(sync_from_projects::<S>))
        .route("/:id", get(get_requirement::<S>))
        .route("/:id", delete(delete_requirement::<S>))
        .route("/:id/order", post(order_requirement::<S>))
        .route("/:id/write-off", post(write_off_requirement::<S>))
}

/// List requirement rows with optional filtering
#[utoipa::path(
    get,
    path = "/api/v1/requirements",
    params(RequirementFilters),
    responses(
        (status = 200, description = "Requirement list returned", body = PaginatedResponse<material_requirement::Model>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn list_requirements<S>(
    State(state): State<S>,
    Query(filters): Query<RequirementFilters>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let page = resolve_page(filters.page, filters.limit, state.app_config());

    let filter = RequirementFilter {
        status: filters.status,
        priority: filters.priority,
        critical_only: filters.critical_only,
        category: filters.category,
        project_id: filters.project_id,
        search: filters.search,
    };

    let (rows, total) = state
        .requirement_service()
        .list(filter, page.page, page.limit)
        .await?;

    Ok((
        StatusCode::OK,
        Json(PaginatedResponse::new(rows, total, page.page, page.limit)),
    ))
}

/// Dashboard counts for the whole requirement board
#[utoipa::path(
    get,
    path = "/api/v1/requirements/summary",
    responses(
        (status = 200, description = "Summary returned", body = RequirementSummary),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn requirement_summary<S>(
    State(state): State<S>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let summary = state.requirement_service().summary().await?;
    Ok((StatusCode::OK, Json(summary)))
}

/// Get a single requirement row
#[utoipa::path(
    get,
    path = "/api/v1/requirements/{id}",
    params(
        ("id" = Uuid, Path, description = "Requirement ID")
    ),
    responses(
        (status = 200, description = "Requirement returned", body = material_requirement::Model),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn get_requirement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let row = state.requirement_service().get(id).await?;
    Ok((StatusCode::OK, Json(row)))
}

/// Trigger a recalculation run
///
/// Returns 409 when a run is already in flight; the requested scope is
/// queued and picked up by the next run.
#[utoipa::path(
    post,
    path = "/api/v1/requirements/recalculate",
    request_body = RecalculateRequest,
    responses(
        (status = 200, description = "Run completed", body = RunReport),
        (status = 409, description = "A run is already in flight", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn recalculate<S>(
    State(state): State<S>,
    Json(payload): Json<RecalculateRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let scope = if payload.recalculate_all {
        RecalcScope::All
    } else {
        RecalcScope::Items(payload.item_ids)
    };

    let report = state.coordinator().recalculate(scope).await?;

    info!(
        run_id = %report.run_id,
        calculated = report.calculated,
        skipped = report.skipped,
        "Recalculation run completed"
    );

    Ok((StatusCode::OK, Json(report)))
}

/// Recompute only the items whose project demand changed since the last run
#[utoipa::path(
    post,
    path = "/api/v1/requirements/sync-from-projects",
    responses(
        (status = 200, description = "Sync completed", body = SyncFromProjectsResponse),
        (status = 409, description = "A run is already in flight", body = crate::errors::ErrorResponse),
        (status = 502, description = "Project demand source unavailable", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn sync_from_projects<S>(
    State(state): State<S>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let report = state.coordinator().sync_from_projects().await?;

    info!(
        run_id = %report.run_id,
        synced = report.calculated + report.unchanged,
        "Project sync completed"
    );

    Ok((
        StatusCode::OK,
        Json(SyncFromProjectsResponse {
            synced_count: report.calculated + report.unchanged,
            run_id: report.run_id,
        }),
    ))
}

/// Create a purchase order covering a single requirement
#[utoipa::path(
    post,
    path = "/api/v1/requirements/{id}/order",
    request_body = CreateOrderForRequirementRequest,
    params(
        ("id" = Uuid, Path, description = "Requirement ID")
    ),
    responses(
        (status = 201, description = "Purchase order created", body = OrderCreatedResponse),
        (status = 400, description = "Requirement not orderable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Requirement already linked to an open order", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn order_requirement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateOrderForRequirementRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let created = state
        .procurement_service()
        .create_order_for_requirements(vec![id], payload.supplier_id, payload.delivery_date)
        .await?;

    info!(
        "Purchase order {} created for requirement {}",
        created.order_number, id
    );

    Ok((
        StatusCode::CREATED,
        Json(OrderCreatedResponse {
            purchase_order_id: created.purchase_order_id,
            purchase_order_number: created.order_number,
        }),
    ))
}

/// Write off a requirement
///
/// The row keeps its quantities but stops asking for procurement until
/// demand for the item reappears.
#[utoipa::path(
    post,
    path = "/api/v1/requirements/{id}/write-off",
    params(
        ("id" = Uuid, Path, description = "Requirement ID")
    ),
    responses(
        (status = 200, description = "Requirement written off", body = material_requirement::Model),
        (status = 400, description = "Already written off", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn write_off_requirement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    let row = state.requirement_service().write_off(id).await?;
    Ok((StatusCode::OK, Json(row)))
}

/// Delete a requirement row
///
/// Only allowed while the row is not in order and no open order line
/// still references it.
#[utoipa::path(
    delete,
    path = "/api/v1/requirements/{id}",
    params(
        ("id" = Uuid, Path, description = "Requirement ID")
    ),
    responses(
        (status = 204, description = "Requirement deleted"),
        (status = 400, description = "Requirement is in order or still linked", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "requirements"
)]
pub async fn delete_requirement<S>(
    State(state): State<S>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: RequirementsHandlerState,
{
    state.requirement_service().delete(id).await?;
    Ok(no_content_response())
}
