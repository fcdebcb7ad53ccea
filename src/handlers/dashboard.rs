use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    middleware::TenantContext,
    models::{DashboardPredictions, DashboardQuery, DashboardSummary, DashboardTrends},
};

pub async fn dashboard_overview(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Json<DashboardSummary>> {
    let filters = query.to_filters().map_err(AppError::Validation)?;
    let summary = state
        .dashboard_service
        .get_risk_overview_data(&ctx.tenant_id, &filters)
        .await?;

    Ok(Json(summary))
}

pub async fn dashboard_trends(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Json<DashboardTrends>> {
    let filters = query.to_filters().map_err(AppError::Validation)?;
    let trends = state
        .dashboard_service
        .get_trends_data(&ctx.tenant_id, &filters, query.interval.unwrap_or_default())
        .await?;

    Ok(Json(trends))
}

pub async fn dashboard_predictions(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<DashboardQuery>,
) -> AppResult<Json<DashboardPredictions>> {
    let filters = query.to_filters().map_err(AppError::Validation)?;
    let predictions = state
        .dashboard_service
        .get_predictions_data(&ctx.tenant_id, &filters)
        .await?;

    Ok(Json(predictions))
}
