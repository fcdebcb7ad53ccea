use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use super::{RepoResult, RepositoryError, TemplateRepository};
use crate::models::{ReportTemplate, TemplateListFilter};

const TEMPLATE_COLUMNS: &str = "id, tenant_id, name, report_type, description, template, \
     is_public, is_default, created_by, created_at, updated_at, metadata";

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    report_type: String,
    description: String,
    template: serde_json::Value,
    is_public: bool,
    is_default: bool,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl TryFrom<TemplateRow> for ReportTemplate {
    type Error = RepositoryError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        Ok(ReportTemplate {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            report_type: row.report_type.parse().map_err(RepositoryError::Corrupt)?,
            description: row.description,
            template: serde_json::from_value(row.template)?,
            is_public: row.is_public,
            is_default: row.is_default,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: row.metadata,
        })
    }
}

fn push_list_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    tenant_id: &str,
    filter: &TemplateListFilter,
) {
    qb.push(" WHERE (tenant_id = ")
        .push_bind(tenant_id.to_string())
        .push(" OR is_public)");
    if let Some(report_type) = filter.report_type {
        qb.push(" AND report_type = ").push_bind(report_type.as_str());
    }
    if let Some(is_public) = filter.is_public {
        qb.push(" AND is_public = ").push_bind(is_public);
    }
    if let Some(is_default) = filter.is_default {
        qb.push(" AND is_default = ").push_bind(is_default);
    }
    if let Some(created_by) = &filter.created_by {
        qb.push(" AND created_by = ").push_bind(created_by.clone());
    }
}

#[derive(Clone)]
pub struct PgTemplateRepository {
    pool: PgPool,
}

impl PgTemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateRepository for PgTemplateRepository {
    #[instrument(name = "db.template.create", skip(self, template), fields(template_id = %template.id))]
    async fn create(&self, template: &ReportTemplate) -> RepoResult<()> {
        let config = serde_json::to_value(&template.template)?;

        sqlx::query(
            r#"
            INSERT INTO report_templates
                (id, tenant_id, name, report_type, description, template, is_public,
                 is_default, created_by, created_at, updated_at, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(template.id)
        .bind(&template.tenant_id)
        .bind(&template.name)
        .bind(template.report_type.as_str())
        .bind(&template.description)
        .bind(config)
        .bind(template.is_public)
        .bind(template.is_default)
        .bind(&template.created_by)
        .bind(template.created_at)
        .bind(template.updated_at)
        .bind(&template.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(name = "db.template.get", skip(self))]
    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<ReportTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM report_templates \
             WHERE id = $1 AND (tenant_id = $2 OR is_public)"
        ))
        .bind(id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ReportTemplate::try_from).transpose()
    }

    #[instrument(name = "db.template.list", skip(self, filter))]
    async fn list(
        &self,
        tenant_id: &str,
        filter: &TemplateListFilter,
    ) -> RepoResult<(Vec<ReportTemplate>, i64)> {
        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM report_templates");
        push_list_filter(&mut count_qb, tenant_id, filter);
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {TEMPLATE_COLUMNS} FROM report_templates"
        ));
        push_list_filter(&mut qb, tenant_id, filter);
        qb.push(" ORDER BY name, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build_query_as::<TemplateRow>()
            .fetch_all(&self.pool)
            .await?;
        let templates = rows
            .into_iter()
            .map(ReportTemplate::try_from)
            .collect::<RepoResult<Vec<_>>>()?;

        Ok((templates, total))
    }

    #[instrument(name = "db.template.update", skip(self, template), fields(template_id = %template.id))]
    async fn update(&self, template: &ReportTemplate) -> RepoResult<bool> {
        let config = serde_json::to_value(&template.template)?;

        let result = sqlx::query(
            r#"
            UPDATE report_templates
            SET name = $3,
                description = $4,
                template = $5,
                is_public = $6,
                is_default = $7,
                updated_at = $8,
                metadata = $9
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(template.id)
        .bind(&template.tenant_id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(config)
        .bind(template.is_public)
        .bind(template.is_default)
        .bind(template.updated_at)
        .bind(&template.metadata)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(name = "db.template.delete", skip(self))]
    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM report_templates WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
