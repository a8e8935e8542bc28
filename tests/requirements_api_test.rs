//! Requirement board HTTP surface: listing, filters, single-row reads,
//! write-off lifecycle and deletion rules.

mod common;

use axum::http::StatusCode;
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, ModelTrait};
use serde_json::json;
use uuid::Uuid;

use matreq_api::entities::material_requirement::RequirementStatus;
use matreq_api::entities::project_demand_line;

#[tokio::test]
async fn list_supports_filters_and_pagination() {
    let app = TestApp::new().await;
    let project = Uuid::new_v4();

    let steel = app.seed_item("ST-100", "Steel profile 100mm", "kg").await;
    app.seed_demand(steel, project, dec!(100), None).await;

    let bolt = app.seed_item("BT-01", "Bolt M10", "pcs").await;
    app.seed_demand(bolt, project, dec!(5), None).await;
    app.seed_stock(bolt, dec!(20), dec!(0)).await;

    app.recalculate_all().await;

    // Two items, each with a global and a project row
    let response = app.get("/api/v1/requirements").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["items"].as_array().unwrap().len(), 4);
    assert_eq!(body["page"], 1);
    assert_eq!(body["total_pages"], 1);

    let body = response_json(app.get("/api/v1/requirements?status=waiting_order").await).await;
    assert_eq!(body["total"], 2);
    for item in body["items"].as_array().unwrap() {
        assert_eq!(item["status"], "waiting_order");
        assert_eq!(item["item_code"], "ST-100");
    }

    let body = response_json(app.get("/api/v1/requirements?search=ST-1").await).await;
    assert_eq!(body["total"], 2);

    let body = response_json(
        app.get(&format!("/api/v1/requirements?project_id={}", project))
            .await,
    )
    .await;
    assert_eq!(body["total"], 2);
    for item in body["items"].as_array().unwrap() {
        assert_eq!(item["project_id"], project.to_string());
    }

    let body = response_json(app.get("/api/v1/requirements?limit=3&page=2").await).await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["page"], 2);
    assert_eq!(body["limit"], 3);
    assert_eq!(body["total_pages"], 2);

    // Nothing on the board is critical yet
    let body = response_json(app.get("/api/v1/requirements?critical_only=true").await).await;
    assert_eq!(body["total"], 0);

    let body = response_json(app.get("/api/v1/requirements?priority=normal").await).await;
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn get_returns_the_row_or_404() {
    let app = TestApp::new().await;
    let item = app.seed_item("CB-25", "Cable 25mm", "m").await;
    app.seed_demand(item, Uuid::new_v4(), dec!(12), None).await;
    app.recalculate_all().await;
    let row = app.global_row(item).await;

    let response = app.get(&format!("/api/v1/requirements/{}", row.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["id"], row.id.to_string());
    assert_eq!(body["item_code"], "CB-25");
    assert_eq!(body["unit"], "m");
    assert_eq!(body["status"], "waiting_order");

    let response = app.get(&format!("/api/v1/requirements/{}", Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn write_off_survives_recomputes_until_demand_returns() {
    let app = TestApp::new().await;
    let item = app.seed_item("PN-07", "Panel 7mm", "pcs").await;
    let line_id = app.seed_demand(item, Uuid::new_v4(), dec!(100), None).await;
    app.recalculate_all().await;
    let row = app.global_row(item).await;

    let response = app
        .post(&format!("/api/v1/requirements/{}/write-off", row.id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "written_off");

    // Writing off twice is an error
    let response = app
        .post(&format!("/api/v1/requirements/{}/write-off", row.id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // A recompute with unchanged demand leaves the row written off and
    // does not even rewrite it.
    app.recalculate_all().await;
    let after_recalc = app.global_row(item).await;
    assert_eq!(after_recalc.status, RequirementStatus::WrittenOff);
    assert_eq!(after_recalc.version, row.version + 1);

    // Demand disappears; quantities zero out but the status sticks.
    let line = project_demand_line::Entity::find_by_id(line_id)
        .one(&*app.state.db)
        .await
        .expect("load demand line")
        .expect("demand line exists");
    line.delete(&*app.state.db).await.expect("delete demand line");
    app.recalculate_all().await;

    let zeroed = app.global_row(item).await;
    assert_eq!(zeroed.status, RequirementStatus::WrittenOff);
    assert_eq!(zeroed.total_required, dec!(0));
    assert_eq!(zeroed.to_order, dec!(0));

    // Fresh demand on a row with none reactivates it.
    app.seed_demand(item, Uuid::new_v4(), dec!(30), None).await;
    app.recalculate_all().await;

    let reactivated = app.global_row(item).await;
    assert_eq!(reactivated.status, RequirementStatus::WaitingOrder);
    assert_eq!(reactivated.total_required, dec!(30));
    assert_eq!(reactivated.to_order, dec!(30));
}

#[tokio::test]
async fn closed_rows_can_be_deleted() {
    let app = TestApp::new().await;
    let item = app.seed_item("BT-01", "Bolt M10", "pcs").await;
    app.seed_demand(item, Uuid::new_v4(), dec!(5), None).await;
    app.seed_stock(item, dec!(50), dec!(0)).await;
    app.recalculate_all().await;

    let row = app.global_row(item).await;
    assert_eq!(row.status, RequirementStatus::Closed);

    let response = app.delete(&format!("/api/v1/requirements/{}", row.id)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.delete(&format!("/api/v1/requirements/{}", row.id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/requirements/not-a-uuid").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/api/v1/requirements?status=bogus").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_and_health_report_the_service() {
    let app = TestApp::new().await;

    let response = app.get("/api/v1/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["service"], "matreq-api");
    assert_eq!(body["data"]["status"], "ok");

    let response = app.get("/api/v1/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["checks"]["database"], "healthy");
}
