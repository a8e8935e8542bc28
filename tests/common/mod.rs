//! Helper harness for spinning up an application state backed by a
//! file-based SQLite database in a temp directory.
//!
//! Each test gets its own database, its own event pipeline and a router
//! wired exactly like the production one, minus the network listener.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tower::ServiceExt;
use uuid::Uuid;

use matreq_api::{
    config::AppConfig,
    db,
    entities::{
        material_requirement, nomenclature_item, project_demand_line,
        purchase_order::{self, PurchaseOrderStatus},
        purchase_order_line::{self, OrderLineStatus},
        stock_level,
    },
    events::{self, EventSender},
    AppState,
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    // Kept alive for the duration of the test; dropping the sender would
    // flip the shutdown flag mid-run.
    _shutdown_tx: watch::Sender<bool>,
    _event_task: tokio::task::JoinHandle<()>,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_dir = tempfile::tempdir().expect("create temp dir for test database");
        let db_path = db_dir.path().join("matreq_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect to test database");
        db::run_migrations(&pool)
            .await
            .expect("run migrations on test database");
        let pool = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppState::new(Arc::clone(&pool), cfg, event_sender, shutdown_rx);

        let router = Router::new()
            .nest("/api/v1", matreq_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _shutdown_tx: shutdown_tx,
            _event_task: event_task,
            _db_dir: db_dir,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("build request");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router never fails")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> Response {
        self.request(Method::DELETE, uri, None).await
    }

    /// Runs a full recalculation and fails the test if it does not succeed.
    pub async fn recalculate_all(&self) {
        let response = self
            .post(
                "/api/v1/requirements/recalculate",
                serde_json::json!({ "recalculate_all": true }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // --- seed helpers -----------------------------------------------------

    pub async fn seed_item(&self, code: &str, name: &str, unit: &str) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        nomenclature_item::ActiveModel {
            id: Set(id),
            item_code: Set(code.to_string()),
            name: Set(name.to_string()),
            unit: Set(unit.to_string()),
            category: Set(None),
            purchasable: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed nomenclature item");
        id
    }

    pub async fn seed_demand(
        &self,
        item_id: Uuid,
        project_id: Uuid,
        quantity: Decimal,
        required_by: Option<NaiveDate>,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        project_demand_line::ActiveModel {
            id: Set(id),
            nomenclature_item_id: Set(item_id),
            project_id: Set(project_id),
            quantity: Set(quantity),
            required_by: Set(required_by),
            responsible_id: Set(None),
            by_contractor: Set(false),
            planning_stage: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed demand line");
        id
    }

    pub async fn seed_stock(&self, item_id: Uuid, on_hand: Decimal, reserved: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        stock_level::ActiveModel {
            id: Set(id),
            nomenclature_item_id: Set(item_id),
            warehouse_id: Set(Uuid::new_v4()),
            on_hand: Set(on_hand),
            reserved: Set(reserved),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed stock level");
        id
    }

    /// Open purchase order with one line that is not linked to any
    /// requirement, as if placed manually in the purchasing system.
    pub async fn seed_unlinked_order_line(
        &self,
        item_id: Uuid,
        ordered: Decimal,
        delivered: Decimal,
    ) -> Uuid {
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        purchase_order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("MANUAL-{}", &order_id.to_string()[..8])),
            supplier_id: Set(Uuid::new_v4()),
            status: Set(PurchaseOrderStatus::Open),
            delivery_date: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed purchase order header");

        purchase_order_line::ActiveModel {
            id: Set(Uuid::new_v4()),
            purchase_order_id: Set(order_id),
            nomenclature_item_id: Set(item_id),
            requirement_id: Set(None),
            ordered: Set(ordered),
            delivered: Set(delivered),
            status: Set(OrderLineStatus::Open),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed purchase order line");

        order_id
    }

    /// Marks every line of an order as fully delivered and closes it, the
    /// way the purchasing system does on goods receipt.
    pub async fn deliver_order(&self, order_id: Uuid) {
        let lines = purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order_id))
            .all(&*self.state.db)
            .await
            .expect("load order lines");

        for line in lines {
            let ordered = line.ordered;
            let mut line: purchase_order_line::ActiveModel = line.into();
            line.delivered = Set(ordered);
            line.status = Set(OrderLineStatus::Closed);
            line.updated_at = Set(Utc::now());
            line.update(&*self.state.db).await.expect("deliver line");
        }

        let header = purchase_order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("load order header")
            .expect("order header exists");
        let mut header: purchase_order::ActiveModel = header.into();
        header.status = Set(PurchaseOrderStatus::Delivered);
        header.updated_at = Set(Utc::now());
        header.update(&*self.state.db).await.expect("deliver order");
    }

    // --- direct reads -----------------------------------------------------

    pub async fn requirement_rows(&self, item_id: Uuid) -> Vec<material_requirement::Model> {
        material_requirement::Entity::find()
            .filter(material_requirement::Column::NomenclatureItemId.eq(item_id))
            .all(&*self.state.db)
            .await
            .expect("load requirement rows")
    }

    /// The org-wide row of an item. Panics when recalculation has not
    /// produced one yet.
    pub async fn global_row(&self, item_id: Uuid) -> material_requirement::Model {
        self.requirement_rows(item_id)
            .await
            .into_iter()
            .find(|row| row.project_id.is_none())
            .expect("global requirement row exists")
    }

    pub async fn project_row(
        &self,
        item_id: Uuid,
        project_id: Uuid,
    ) -> material_requirement::Model {
        self.requirement_rows(item_id)
            .await
            .into_iter()
            .find(|row| row.project_id == Some(project_id))
            .expect("project requirement row exists")
    }

    pub async fn order_header(&self, order_id: Uuid) -> purchase_order::Model {
        purchase_order::Entity::find_by_id(order_id)
            .one(&*self.state.db)
            .await
            .expect("load order header")
            .expect("order header exists")
    }

    pub async fn order_lines(&self, order_id: Uuid) -> Vec<purchase_order_line::Model> {
        purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(order_id))
            .all(&*self.state.db)
            .await
            .expect("load order lines")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
