use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppResult,
    middleware::TenantContext,
    models::{CreateReportInput, CreateReportResponse, ListReportsQuery, Page, Report, ReportMetrics},
};

/// Answers 202: the report is only pending until a worker picks it up.
pub async fn create_report(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(input): Json<CreateReportInput>,
) -> AppResult<(StatusCode, Json<CreateReportResponse>)> {
    let response = state
        .report_service
        .create_report(&ctx.tenant_id, &ctx.user_id, input)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}

pub async fn get_report(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Report>> {
    let report = state.report_service.get_report(&ctx.tenant_id, id).await?;

    Ok(Json(report))
}

pub async fn list_reports(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListReportsQuery>,
) -> AppResult<Json<Page<Report>>> {
    let page = state.report_service.list_reports(&ctx.tenant_id, query).await?;

    Ok(Json(page))
}

pub async fn delete_report(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.report_service.delete_report(&ctx.tenant_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_report_metrics(
    State(state): State<AppState>,
    ctx: TenantContext,
) -> AppResult<Json<ReportMetrics>> {
    let metrics = state.report_service.get_report_metrics(&ctx.tenant_id).await?;

    Ok(Json(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_defaults() {
        let input: CreateReportInput = serde_json::from_str(
            r#"{"name": "Q1 Summary", "report_type": "executive_summary", "format": "text"}"#,
        )
        .unwrap();
        assert_eq!(input.name, "Q1 Summary");
        assert!(input.template_id.is_none());
        assert!(input.recipients.is_empty());
        assert!(input.metadata.is_none());
    }

    #[test]
    fn test_list_query_defaults() {
        let query: ListReportsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, None);
        assert_eq!(query.status, None);
    }
}
