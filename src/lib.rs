//! MatReq API Library
//!
//! Core functionality for the material requirements and procurement status
//! engine: demand aggregation, stock netting, classification and order linking.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;
use utoipa::ToSchema;

use handlers::purchase_orders::PurchaseOrdersHandlerState;
use handlers::requirements::RequirementsHandlerState;
use services::catalog::{CatalogView, SqlCatalogView};
use services::demand::{DemandSource, SqlDemandSource};
use services::inventory::{InventoryView, SqlInventoryView};
use services::order_ledger::{OrderLedgerView, SqlOrderLedgerView};
use services::procurement::ProcurementService;
use services::purchasing::{PurchasingGateway, SqlPurchasingGateway};
use services::recalc::RecalculationCoordinator;
use services::requirements::RequirementService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub requirement_service: RequirementService,
    pub coordinator: Arc<RecalculationCoordinator>,
    pub procurement_service: ProcurementService,
}

impl AppState {
    /// Wires the full service graph over one database connection. The
    /// shutdown receiver lets in-flight recalculation runs stop between
    /// items when the process goes down.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let requirement_service =
            RequirementService::new(Arc::clone(&db), Some(event_sender.clone()));

        let demand: Arc<dyn DemandSource> = Arc::new(SqlDemandSource::new(Arc::clone(&db)));
        let inventory: Arc<dyn InventoryView> = Arc::new(SqlInventoryView::new(Arc::clone(&db)));
        let orders: Arc<dyn OrderLedgerView> = Arc::new(SqlOrderLedgerView::new(Arc::clone(&db)));
        let catalog: Arc<dyn CatalogView> = Arc::new(SqlCatalogView::new(Arc::clone(&db)));

        let coordinator = Arc::new(RecalculationCoordinator::new(
            requirement_service.clone(),
            demand,
            inventory,
            orders,
            catalog,
            Some(event_sender.clone()),
            shutdown,
        ));

        let gateway: Arc<dyn PurchasingGateway> =
            Arc::new(SqlPurchasingGateway::new(config.po_number_prefix.clone()));
        let procurement_service = ProcurementService::new(
            Arc::clone(&db),
            gateway,
            Arc::clone(&coordinator),
            Some(event_sender.clone()),
        );

        Self {
            db,
            config,
            event_sender,
            requirement_service,
            coordinator,
            procurement_service,
        }
    }
}

impl RequirementsHandlerState for AppState {
    fn requirement_service(&self) -> &RequirementService {
        &self.requirement_service
    }

    fn coordinator(&self) -> &Arc<RecalculationCoordinator> {
        &self.coordinator
    }

    fn procurement_service(&self) -> &ProcurementService {
        &self.procurement_service
    }

    fn app_config(&self) -> &config::AppConfig {
        &self.config
    }
}

impl PurchaseOrdersHandlerState for AppState {
    fn procurement_service(&self) -> &ProcurementService {
        &self.procurement_service
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit.max(1)
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

// API routes under /api/v1
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        // Requirement board
        .nest(
            "/requirements",
            handlers::requirements::requirements_router::<AppState>(),
        )
        // Order linking
        .nest(
            "/purchase-orders",
            handlers::purchase_orders::purchase_orders_router::<AppState>(),
        )
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "build_time": build_time,
        "service": "matreq-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    // Check database connectivity
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
