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
    models::{
        CreateReportResponse, CreateScheduledReportInput, ListScheduledReportsQuery, Page,
        ScheduledReport, UpdateScheduledReportInput,
    },
};

pub async fn create_schedule(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(input): Json<CreateScheduledReportInput>,
) -> AppResult<(StatusCode, Json<ScheduledReport>)> {
    let entry = state
        .scheduler
        .create_scheduled_report(&ctx.tenant_id, &ctx.user_id, input)
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ScheduledReport>> {
    let entry = state.scheduler.get_scheduled_report(&ctx.tenant_id, id).await?;

    Ok(Json(entry))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListScheduledReportsQuery>,
) -> AppResult<Json<Page<ScheduledReport>>> {
    let page = state
        .scheduler
        .list_scheduled_reports(&ctx.tenant_id, query)
        .await?;

    Ok(Json(page))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateScheduledReportInput>,
) -> AppResult<Json<ScheduledReport>> {
    let entry = state
        .scheduler
        .update_scheduled_report(&ctx.tenant_id, id, input)
        .await?;

    Ok(Json(entry))
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state
        .scheduler
        .delete_scheduled_report(&ctx.tenant_id, id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn run_schedule(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<CreateReportResponse>)> {
    let response = state
        .scheduler
        .run_scheduled_report(&ctx.tenant_id, id)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;

    #[test]
    fn test_create_body_with_schedule() {
        let input: CreateScheduledReportInput = serde_json::from_str(
            r#"{
                "name": "Monthly audit",
                "report_type": "compliance_audit",
                "format": "html",
                "schedule": {"frequency": "monthly", "days_of_month": [1], "time_of_day": "00:00"},
                "recipients": [{"channel": "email", "address": "risk@example.com"}]
            }"#,
        )
        .unwrap();
        assert_eq!(input.schedule.frequency, Frequency::Monthly);
        assert_eq!(input.schedule.days_of_month, vec![1]);
        assert_eq!(input.recipients.len(), 1);
        assert_eq!(input.is_active, None);
    }
}
