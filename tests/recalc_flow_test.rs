//! End-to-end recalculation runs through the HTTP surface: netting,
//! classification, idempotence and demand sync.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, ModelTrait};
use serde_json::json;
use uuid::Uuid;

use matreq_api::entities::material_requirement::{RequirementPriority, RequirementStatus};
use matreq_api::entities::project_demand_line;

#[tokio::test]
async fn full_run_nets_demand_against_stock_and_open_supply() {
    let app = TestApp::new().await;
    let project = Uuid::new_v4();
    let due = Utc::now().date_naive() + Duration::days(10);

    let item = app.seed_item("ST-100", "Steel profile 100mm", "kg").await;
    app.seed_demand(item, project, dec!(100), Some(due)).await;
    app.seed_stock(item, dec!(50), dec!(10)).await;
    app.seed_unlinked_order_line(item, dec!(30), dec!(10)).await;

    let response = app
        .post(
            "/api/v1/requirements/recalculate",
            json!({ "recalculate_all": true }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = response_json(response).await;
    assert_eq!(report["calculated"], 2);
    assert_eq!(report["unchanged"], 0);
    assert_eq!(report["skipped"], 0);
    assert_eq!(report["conflicts"], 0);
    assert_eq!(report["invariant_violations"], 0);

    // Org-wide rollup plus one project scope
    let rows = app.requirement_rows(item).await;
    assert_eq!(rows.len(), 2);

    let global = app.global_row(item).await;
    assert_eq!(global.item_code, "ST-100");
    assert_eq!(global.total_required, dec!(100));
    assert_eq!(global.total_available, dec!(40));
    assert_eq!(global.total_reserved, dec!(10));
    assert_eq!(global.total_in_order, dec!(20));
    assert_eq!(global.to_order, dec!(40));
    assert_eq!(global.status, RequirementStatus::WaitingOrder);
    assert_eq!(global.priority, RequirementPriority::Normal);
    assert_eq!(global.days_until_depletion, Some(10));
    assert_eq!(global.order_by_date, Some(due));
    assert!(!global.stale);
    assert_eq!(global.version, 1);

    let scoped = app.project_row(item, project).await;
    assert_eq!(scoped.total_required, dec!(100));
    assert_eq!(scoped.total_available, dec!(40));
    assert_eq!(scoped.to_order, dec!(40));
}

#[tokio::test]
async fn rerun_with_unchanged_inputs_writes_nothing() {
    let app = TestApp::new().await;
    let item = app.seed_item("CB-25", "Cable 25mm", "m").await;
    app.seed_demand(item, Uuid::new_v4(), dec!(60), None).await;
    app.seed_stock(item, dec!(15), dec!(0)).await;

    app.recalculate_all().await;
    let first_pass = app.requirement_rows(item).await;

    let response = app
        .post(
            "/api/v1/requirements/recalculate",
            json!({ "recalculate_all": true }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let report = response_json(response).await;
    assert_eq!(report["calculated"], 0);
    assert_eq!(report["unchanged"], 2);

    // Versions, timestamps and run markers must all survive the rerun.
    let second_pass = app.requirement_rows(item).await;
    assert_eq!(first_pass, second_pass);
}

#[tokio::test]
async fn coverage_and_deadlines_drive_status_and_priority() {
    let app = TestApp::new().await;
    let project = Uuid::new_v4();
    let today = Utc::now().date_naive();

    // Fully covered by stock, no deadline
    let covered = app.seed_item("BT-01", "Bolt M10", "pcs").await;
    app.seed_demand(covered, project, dec!(10), None).await;
    app.seed_stock(covered, dec!(50), dec!(0)).await;

    // Nothing in stock and the deadline already passed
    let overdue = app.seed_item("PN-07", "Panel 7mm", "pcs").await;
    app.seed_demand(overdue, project, dec!(25), Some(today - Duration::days(3)))
        .await;

    app.recalculate_all().await;

    let covered_row = app.global_row(covered).await;
    assert_eq!(covered_row.status, RequirementStatus::Closed);
    assert_eq!(covered_row.priority, RequirementPriority::Low);
    assert_eq!(covered_row.to_order, dec!(0));
    assert_eq!(covered_row.days_until_depletion, None);

    let overdue_row = app.global_row(overdue).await;
    assert_eq!(overdue_row.status, RequirementStatus::WaitingOrder);
    assert_eq!(overdue_row.priority, RequirementPriority::Critical);
    assert_eq!(overdue_row.to_order, dec!(25));
    assert_eq!(overdue_row.days_until_depletion, Some(-3));
}

#[tokio::test]
async fn scoped_run_leaves_other_items_untouched() {
    let app = TestApp::new().await;
    let first = app.seed_item("ST-100", "Steel profile 100mm", "kg").await;
    let second = app.seed_item("CB-25", "Cable 25mm", "m").await;
    app.seed_demand(first, Uuid::new_v4(), dec!(40), None).await;
    app.seed_demand(second, Uuid::new_v4(), dec!(70), None).await;

    let response = app
        .post(
            "/api/v1/requirements/recalculate",
            json!({ "item_ids": [first] }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = response_json(response).await;
    assert_eq!(report["calculated"], 2);

    assert_eq!(app.requirement_rows(first).await.len(), 2);
    assert!(app.requirement_rows(second).await.is_empty());

    app.recalculate_all().await;
    assert_eq!(app.requirement_rows(second).await.len(), 2);
}

#[tokio::test]
async fn vanished_demand_retires_the_rows() {
    let app = TestApp::new().await;
    let item = app.seed_item("GL-02", "Glass sheet", "m2").await;
    let line_id = app.seed_demand(item, Uuid::new_v4(), dec!(50), None).await;

    app.recalculate_all().await;
    assert_eq!(
        app.global_row(item).await.status,
        RequirementStatus::WaitingOrder
    );

    let line = project_demand_line::Entity::find_by_id(line_id)
        .one(&*app.state.db)
        .await
        .expect("load demand line")
        .expect("demand line exists");
    line.delete(&*app.state.db).await.expect("delete demand line");

    app.recalculate_all().await;

    // Rows survive for audit but stop asking for anything.
    for row in app.requirement_rows(item).await {
        assert_eq!(row.total_required, dec!(0));
        assert_eq!(row.to_order, dec!(0));
        assert_eq!(row.status, RequirementStatus::Closed);
        assert_eq!(row.priority, RequirementPriority::Low);
    }
}

#[tokio::test]
async fn summary_aggregates_the_whole_board() {
    let app = TestApp::new().await;
    let project = Uuid::new_v4();
    let today = Utc::now().date_naive();

    let waiting = app.seed_item("ST-100", "Steel profile 100mm", "kg").await;
    app.seed_demand(waiting, project, dec!(100), Some(today)).await;

    let closed = app.seed_item("BT-01", "Bolt M10", "pcs").await;
    app.seed_demand(closed, project, dec!(5), None).await;
    app.seed_stock(closed, dec!(20), dec!(0)).await;

    app.recalculate_all().await;

    let response = app.get("/api/v1/requirements/summary").await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = response_json(response).await;

    assert_eq!(summary["total_items"], 4);
    assert_eq!(summary["status_breakdown"]["waiting_order"], 2);
    assert_eq!(summary["status_breakdown"]["closed"], 2);
    assert_eq!(summary["status_breakdown"]["in_order"], 0);
    assert_eq!(summary["items_to_order"], 2);
    // Demand due today is already critical
    assert_eq!(summary["critical_items"], 2);
    assert_eq!(summary["priority_breakdown"]["critical"], 2);
    assert_eq!(summary["priority_breakdown"]["low"], 2);
    assert_eq!(summary["stale_items"], 0);
}

#[tokio::test]
async fn sync_picks_up_only_items_with_changed_demand() {
    let app = TestApp::new().await;
    let first = app.seed_item("ST-100", "Steel profile 100mm", "kg").await;
    app.seed_demand(first, Uuid::new_v4(), dec!(30), None).await;

    // No completed run yet, so the first sync falls back to a full run.
    let response = app.post("/api/v1/requirements/sync-from-projects", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["synced_count"], 2);
    assert!(body["run_id"].is_string());

    // Demand for a new item arrives after the run; the next sync must
    // recompute that item and leave the first one out of scope.
    let second = app.seed_item("CB-25", "Cable 25mm", "m").await;
    app.seed_demand(second, Uuid::new_v4(), dec!(45), None).await;

    let response = app.post("/api/v1/requirements/sync-from-projects", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["synced_count"], 2);

    assert_eq!(app.requirement_rows(first).await.len(), 2);
    assert_eq!(app.requirement_rows(second).await.len(), 2);
}
