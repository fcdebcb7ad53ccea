mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use common::TestApp;
use risk_report_service::routes;

fn router(app: &TestApp) -> Router {
    routes::create_router(app.state.clone())
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str, tenant: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, tenant: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-tenant-id", tenant)
        .header("x-user-id", "u1")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_in_memory_backend() {
    let app = TestApp::new(Utc::now());
    let (status, body) = send(router(&app), get("/api/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "in-memory");
}

#[tokio::test]
async fn test_missing_tenant_is_unauthorized() {
    let app = TestApp::new(Utc::now());
    let (status, body) = send(router(&app), get("/api/reports", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 401);
}

#[tokio::test]
async fn test_create_report_is_accepted_then_completes() {
    let mut app = TestApp::new(Utc::now());
    app.seed_assessment("t1", "retail", 61.0).await;

    let (status, body) = send(
        router(&app),
        post_json(
            "/api/reports",
            "t1",
            json!({
                "name": "Q1 Summary",
                "report_type": "executive_summary",
                "format": "text",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let id = body["id"].as_str().unwrap().to_string();

    app.drain().await;

    let (status, body) = send(router(&app), get(&format!("/api/reports/{id}"), Some("t1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["created_by"], "u1");
    assert!(body["file_size"].as_i64().unwrap() > 0);

    let (status, body) = send(router(&app), get("/api/reports/metrics", Some("t1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_reports"], 1);

    let (status, _) = send(router(&app), get(&format!("/api/reports/{id}"), Some("t2"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_report_request_is_rejected() {
    let app = TestApp::new(Utc::now());
    let (status, body) = send(
        router(&app),
        post_json(
            "/api/reports",
            "t1",
            json!({
                "name": "Bad",
                "report_type": "executive_summary",
                "format": "pdf",
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("pdf"));
}

#[tokio::test]
async fn test_unknown_report_is_not_found() {
    let app = TestApp::new(Utc::now());
    let uri = format!("/api/reports/{}", Uuid::new_v4());
    let (status, _) = send(router(&app), get(&uri, Some("t1"))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dashboard_overview_for_empty_tenant_is_stable() {
    let app = TestApp::new(Utc::now());

    let (status, first) = send(router(&app), get("/api/dashboard/overview", Some("t9"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["total_assessments"], 0);
    assert_eq!(first["average_risk_score"], 0.0);

    let (_, second) = send(router(&app), get("/api/dashboard/overview", Some("t9"))).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_schedule_with_bad_time_is_rejected() {
    let app = TestApp::new(Utc::now());
    let (status, _) = send(
        router(&app),
        post_json(
            "/api/schedules",
            "t1",
            json!({
                "name": "Nightly",
                "report_type": "executive_summary",
                "format": "csv",
                "schedule": { "frequency": "daily", "time_of_day": "25:00" },
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_schedule_crud_over_http() {
    let app = TestApp::new(Utc::now());
    let (status, created) = send(
        router(&app),
        post_json(
            "/api/schedules",
            "t1",
            json!({
                "name": "Weekly",
                "report_type": "executive_summary",
                "format": "markdown",
                "schedule": { "frequency": "weekly", "days_of_week": [1], "time_of_day": "08:00" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["next_run_at"].is_string());
    let id = created["id"].as_str().unwrap().to_string();

    let (status, page) = send(router(&app), get("/api/schedules", Some("t1"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/schedules/{id}"))
        .header("x-tenant-id", "t1")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(router(&app), delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(router(&app), get(&format!("/api/schedules/{id}"), Some("t1"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
