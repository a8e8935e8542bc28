use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MatReq API",
        version = "0.3.0",
        description = r#"
# Material Requirements & Procurement Status API

Aggregates project demand, warehouse stock and open purchase orders into one
procurement board: what is needed, what is covered, what is left to order and
how urgent it is.

## Features

- **Requirement Board**: one row per item and scope (org-wide or per project)
- **Netting**: `to_order = max(0, required - available - in_order)`
- **Status Machine**: `waiting_order`, `in_order`, `closed`, `written_off`
- **Priority Bands**: depletion forecast against the nearest required-by date
- **Order Linking**: create and cancel purchase orders straight from the board
- **Incremental Sync**: recompute only items whose project demand changed

## Recalculation

Runs are serialized: `POST /requirements/recalculate` returns `409` while a
run is in flight, and the requested scope is queued for the next run.

## Error Handling

Non-2xx responses share one body shape:

```json
{
  "error": "Conflict",
  "message": "Requirement is already linked to a purchase order",
  "timestamp": "2025-08-25T10:30:00Z"
}
```

## Pagination

List endpoints accept `page` (one-based) and `limit`; the limit is clamped
to the configured maximum.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "requirements", description = "Requirement board and recalculation endpoints"),
        (name = "purchase-orders", description = "Order creation and cancellation endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    paths(
        // Requirements
        crate::handlers::requirements::list_requirements,
        crate::handlers::requirements::requirement_summary,
        crate::handlers::requirements::get_requirement,
        crate::handlers::requirements::recalculate,
        crate::handlers::requirements::sync_from_projects,
        crate::handlers::requirements::order_requirement,
        crate::handlers::requirements::write_off_requirement,
        crate::handlers::requirements::delete_requirement,

        // Purchase orders
        crate::handlers::purchase_orders::create_purchase_order,
        crate::handlers::purchase_orders::cancel_purchase_order,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<crate::entities::material_requirement::Model>,

            // Requirement types
            crate::entities::material_requirement::Model,
            crate::entities::material_requirement::RequirementStatus,
            crate::entities::material_requirement::RequirementPriority,
            crate::services::requirements::RequirementSummary,
            crate::services::requirements::StatusBreakdown,
            crate::services::requirements::PriorityBreakdown,
            crate::services::recalc::RunReport,
            crate::handlers::requirements::RecalculateRequest,
            crate::handlers::requirements::SyncFromProjectsResponse,
            crate::handlers::requirements::CreateOrderForRequirementRequest,
            crate::handlers::requirements::OrderCreatedResponse,

            // Purchase order types
            crate::handlers::purchase_orders::CreatePurchaseOrderRequest,
            crate::handlers::purchase_orders::OrderCancelledResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_covers_the_api_surface() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("MatReq API"));
        assert!(json.contains("/api/v1/requirements"));
        assert!(json.contains("/api/v1/requirements/recalculate"));
        assert!(json.contains("/api/v1/purchase-orders"));
    }
}
