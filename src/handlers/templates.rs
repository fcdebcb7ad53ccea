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
        CreateTemplateInput, ListTemplatesQuery, Page, ReportTemplate, UpdateTemplateInput,
    },
};

pub async fn create_template(
    State(state): State<AppState>,
    ctx: TenantContext,
    Json(input): Json<CreateTemplateInput>,
) -> AppResult<(StatusCode, Json<ReportTemplate>)> {
    let template = state
        .template_service
        .create_template(&ctx.tenant_id, &ctx.user_id, input)
        .await?;

    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ReportTemplate>> {
    let template = state.template_service.get_template(&ctx.tenant_id, id).await?;

    Ok(Json(template))
}

pub async fn list_templates(
    State(state): State<AppState>,
    ctx: TenantContext,
    Query(query): Query<ListTemplatesQuery>,
) -> AppResult<Json<Page<ReportTemplate>>> {
    let page = state
        .template_service
        .list_templates(&ctx.tenant_id, query)
        .await?;

    Ok(Json(page))
}

pub async fn update_template(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTemplateInput>,
) -> AppResult<Json<ReportTemplate>> {
    let template = state
        .template_service
        .update_template(&ctx.tenant_id, id, input)
        .await?;

    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    ctx: TenantContext,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.template_service.delete_template(&ctx.tenant_id, id).await?;

    Ok(StatusCode::NO_CONTENT)
}
