use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, handlers};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/reports",
            post(handlers::create_report).get(handlers::list_reports),
        )
        .route("/api/reports/metrics", get(handlers::get_report_metrics))
        .route(
            "/api/reports/{id}",
            get(handlers::get_report).delete(handlers::delete_report),
        )
        .route(
            "/api/templates",
            post(handlers::create_template).get(handlers::list_templates),
        )
        .route(
            "/api/templates/{id}",
            get(handlers::get_template)
                .put(handlers::update_template)
                .delete(handlers::delete_template),
        )
        .route(
            "/api/schedules",
            post(handlers::create_schedule).get(handlers::list_schedules),
        )
        .route(
            "/api/schedules/{id}",
            get(handlers::get_schedule)
                .put(handlers::update_schedule)
                .delete(handlers::delete_schedule),
        )
        .route("/api/schedules/{id}/run", post(handlers::run_schedule))
        .route("/api/dashboard/overview", get(handlers::dashboard_overview))
        .route("/api/dashboard/trends", get(handlers::dashboard_trends))
        .route(
            "/api/dashboard/predictions",
            get(handlers::dashboard_predictions),
        )
        .with_state(state)
}
