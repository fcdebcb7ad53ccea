use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use super::{RepoResult, ReportRepository, RepositoryError, ensure_transition};
use crate::models::{
    Report, ReportData, ReportFilters, ReportListFilter, ReportMetrics, ReportStatus,
    StatusChange,
};

const REPORT_COLUMNS: &str = "id, tenant_id, name, report_type, status, format, template_id, \
     data, filters, generated_at, expires_at, file_size, download_url, created_by, \
     created_at, updated_at, metadata, error";

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    report_type: String,
    status: String,
    format: String,
    template_id: Option<Uuid>,
    data: Option<serde_json::Value>,
    filters: serde_json::Value,
    generated_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    file_size: i64,
    download_url: String,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: serde_json::Value,
    error: Option<String>,
}

impl TryFrom<ReportRow> for Report {
    type Error = RepositoryError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let data: Option<ReportData> = row.data.map(serde_json::from_value).transpose()?;
        let filters: ReportFilters = serde_json::from_value(row.filters)?;

        Ok(Report {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            report_type: row.report_type.parse().map_err(RepositoryError::Corrupt)?,
            status: row.status.parse().map_err(RepositoryError::Corrupt)?,
            format: row.format.parse().map_err(RepositoryError::Corrupt)?,
            template_id: row.template_id,
            data,
            filters,
            generated_at: row.generated_at,
            expires_at: row.expires_at,
            file_size: row.file_size,
            download_url: row.download_url,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: row.metadata,
            error: row.error,
        })
    }
}

fn into_reports(rows: Vec<ReportRow>) -> RepoResult<Vec<Report>> {
    rows.into_iter().map(Report::try_from).collect()
}

fn push_list_filter(qb: &mut QueryBuilder<'_, Postgres>, tenant_id: &str, filter: &ReportListFilter) {
    qb.push(" WHERE tenant_id = ").push_bind(tenant_id.to_string());
    if let Some(report_type) = filter.report_type {
        qb.push(" AND report_type = ").push_bind(report_type.as_str());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(format) = filter.format {
        qb.push(" AND format = ").push_bind(format.as_str());
    }
    if let Some(created_by) = &filter.created_by {
        qb.push(" AND created_by = ").push_bind(created_by.clone());
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[derive(Clone)]
pub struct PgReportRepository {
    pool: PgPool,
}

impl PgReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    #[instrument(name = "db.report.create", skip(self, report), fields(report_id = %report.id))]
    async fn create(&self, report: &Report) -> RepoResult<()> {
        let data = report.data.as_ref().map(serde_json::to_value).transpose()?;
        let filters = serde_json::to_value(&report.filters)?;

        sqlx::query(
            r#"
            INSERT INTO reports
                (id, tenant_id, name, report_type, status, format, template_id, data, filters,
                 generated_at, expires_at, file_size, download_url, created_by, created_at,
                 updated_at, metadata, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(report.id)
        .bind(&report.tenant_id)
        .bind(&report.name)
        .bind(report.report_type.as_str())
        .bind(report.status.as_str())
        .bind(report.format.as_str())
        .bind(report.template_id)
        .bind(data)
        .bind(filters)
        .bind(report.generated_at)
        .bind(report.expires_at)
        .bind(report.file_size)
        .bind(&report.download_url)
        .bind(&report.created_by)
        .bind(report.created_at)
        .bind(report.updated_at)
        .bind(&report.metadata)
        .bind(&report.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(name = "db.report.get", skip(self))]
    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Report::try_from).transpose()
    }

    #[instrument(name = "db.report.list", skip(self, filter))]
    async fn list(
        &self,
        tenant_id: &str,
        filter: &ReportListFilter,
    ) -> RepoResult<(Vec<Report>, i64)> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM reports");
        push_list_filter(&mut count_qb, tenant_id, filter);
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {REPORT_COLUMNS} FROM reports"));
        push_list_filter(&mut qb, tenant_id, filter);
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb.build_query_as::<ReportRow>().fetch_all(&self.pool).await?;

        Ok((into_reports(rows)?, total))
    }

    #[instrument(name = "db.report.delete", skip(self))]
    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        name = "db.report.transition",
        skip(self, change),
        fields(to = %change.status)
    )]
    async fn transition(
        &self,
        tenant_id: &str,
        id: Uuid,
        from: ReportStatus,
        change: &StatusChange,
    ) -> RepoResult<bool> {
        ensure_transition(from, change.status)?;
        let data = change.data.as_ref().map(serde_json::to_value).transpose()?;

        let result = sqlx::query(
            r#"
            UPDATE reports
            SET status = $4,
                data = COALESCE($5, data),
                file_size = COALESCE($6, file_size),
                download_url = COALESCE($7, download_url),
                generated_at = COALESCE($8, generated_at),
                error = COALESCE($9, error),
                updated_at = $10
            WHERE tenant_id = $1 AND id = $2 AND status = $3
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(from.as_str())
        .bind(change.status.as_str())
        .bind(data)
        .bind(change.file_size)
        .bind(&change.download_url)
        .bind(change.generated_at)
        .bind(&change.error)
        .bind(change.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(name = "db.report.metrics", skip(self))]
    async fn metrics(&self, tenant_id: &str) -> RepoResult<ReportMetrics> {
        let rows = sqlx::query(
            r#"
            SELECT status, report_type, format,
                   COUNT(*)::bigint AS count,
                   COALESCE(SUM(file_size), 0)::bigint AS total_size
            FROM reports
            WHERE tenant_id = $1
            GROUP BY status, report_type, format
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = ReportMetrics::default();
        for row in rows {
            let count: i64 = row.get("count");
            let total_size: i64 = row.get("total_size");
            metrics.total_reports += count;
            metrics.total_file_size += total_size;
            *metrics.by_status.entry(row.get("status")).or_insert(0) += count;
            *metrics.by_type.entry(row.get("report_type")).or_insert(0) += count;
            *metrics.by_format.entry(row.get("format")).or_insert(0) += count;
        }

        Ok(metrics.finalize())
    }

    #[instrument(name = "db.report.list_stale", skip(self))]
    async fn list_stale(
        &self,
        statuses: &[ReportStatus],
        updated_before: DateTime<Utc>,
    ) -> RepoResult<Vec<Report>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE status = ANY($1) AND updated_at < $2 \
             ORDER BY updated_at"
        ))
        .bind(&statuses)
        .bind(updated_before)
        .fetch_all(&self.pool)
        .await?;

        into_reports(rows)
    }

    #[instrument(name = "db.report.list_expired", skip(self))]
    async fn list_expired(&self, now: DateTime<Utc>) -> RepoResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports \
             WHERE status = 'completed' AND expires_at IS NOT NULL AND expires_at <= $1 \
             ORDER BY expires_at"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        into_reports(rows)
    }
}
