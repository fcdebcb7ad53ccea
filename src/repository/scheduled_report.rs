use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use super::{RepoResult, RepositoryError, ScheduledReportRepository};
use crate::models::{ScheduleListFilter, ScheduledReport};

const SCHEDULE_COLUMNS: &str = "id, tenant_id, name, report_type, format, template_id, schedule, \
     filters, recipients, is_active, last_run_at, next_run_at, created_by, created_at, \
     updated_at, metadata, version";

#[derive(sqlx::FromRow)]
struct ScheduledReportRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    report_type: String,
    format: String,
    template_id: Option<Uuid>,
    schedule: serde_json::Value,
    filters: serde_json::Value,
    recipients: serde_json::Value,
    is_active: bool,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: serde_json::Value,
    version: i64,
}

impl TryFrom<ScheduledReportRow> for ScheduledReport {
    type Error = RepositoryError;

    fn try_from(row: ScheduledReportRow) -> Result<Self, Self::Error> {
        Ok(ScheduledReport {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            report_type: row.report_type.parse().map_err(RepositoryError::Corrupt)?,
            format: row.format.parse().map_err(RepositoryError::Corrupt)?,
            template_id: row.template_id,
            schedule: serde_json::from_value(row.schedule)?,
            filters: serde_json::from_value(row.filters)?,
            recipients: serde_json::from_value(row.recipients)?,
            is_active: row.is_active,
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            metadata: row.metadata,
            version: row.version,
        })
    }
}

fn into_entries(rows: Vec<ScheduledReportRow>) -> RepoResult<Vec<ScheduledReport>> {
    rows.into_iter().map(ScheduledReport::try_from).collect()
}

fn push_list_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    tenant_id: &str,
    filter: &ScheduleListFilter,
) {
    qb.push(" WHERE tenant_id = ").push_bind(tenant_id.to_string());
    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(report_type) = filter.report_type {
        qb.push(" AND report_type = ").push_bind(report_type.as_str());
    }
    if let Some(created_by) = &filter.created_by {
        qb.push(" AND created_by = ").push_bind(created_by.clone());
    }
}

#[derive(Clone)]
pub struct PgScheduledReportRepository {
    pool: PgPool,
}

impl PgScheduledReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduledReportRepository for PgScheduledReportRepository {
    #[instrument(name = "db.schedule.create", skip(self, entry), fields(schedule_id = %entry.id))]
    async fn create(&self, entry: &ScheduledReport) -> RepoResult<()> {
        let schedule = serde_json::to_value(&entry.schedule)?;
        let filters = serde_json::to_value(&entry.filters)?;
        let recipients = serde_json::to_value(&entry.recipients)?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_reports
                (id, tenant_id, name, report_type, format, template_id, schedule, filters,
                 recipients, is_active, last_run_at, next_run_at, created_by, created_at,
                 updated_at, metadata, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.tenant_id)
        .bind(&entry.name)
        .bind(entry.report_type.as_str())
        .bind(entry.format.as_str())
        .bind(entry.template_id)
        .bind(schedule)
        .bind(filters)
        .bind(recipients)
        .bind(entry.is_active)
        .bind(entry.last_run_at)
        .bind(entry.next_run_at)
        .bind(&entry.created_by)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .bind(&entry.metadata)
        .bind(entry.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(name = "db.schedule.get", skip(self))]
    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<ScheduledReport>> {
        let row = sqlx::query_as::<_, ScheduledReportRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_reports WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ScheduledReport::try_from).transpose()
    }

    #[instrument(name = "db.schedule.list", skip(self, filter))]
    async fn list(
        &self,
        tenant_id: &str,
        filter: &ScheduleListFilter,
    ) -> RepoResult<(Vec<ScheduledReport>, i64)> {
        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS count FROM scheduled_reports");
        push_list_filter(&mut count_qb, tenant_id, filter);
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await?
            .get("count");

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_reports"
        ));
        push_list_filter(&mut qb, tenant_id, filter);
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build_query_as::<ScheduledReportRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok((into_entries(rows)?, total))
    }

    #[instrument(
        name = "db.schedule.update",
        skip(self, entry),
        fields(schedule_id = %entry.id, version = entry.version)
    )]
    async fn update(&self, entry: &ScheduledReport) -> RepoResult<ScheduledReport> {
        let schedule = serde_json::to_value(&entry.schedule)?;
        let filters = serde_json::to_value(&entry.filters)?;
        let recipients = serde_json::to_value(&entry.recipients)?;

        let row = sqlx::query_as::<_, ScheduledReportRow>(&format!(
            r#"
            UPDATE scheduled_reports
            SET name = $4,
                report_type = $5,
                format = $6,
                template_id = $7,
                schedule = $8,
                filters = $9,
                recipients = $10,
                is_active = $11,
                last_run_at = $12,
                next_run_at = $13,
                updated_at = $14,
                metadata = $15,
                version = version + 1
            WHERE tenant_id = $1 AND id = $2 AND version = $3
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(&entry.tenant_id)
        .bind(entry.id)
        .bind(entry.version)
        .bind(&entry.name)
        .bind(entry.report_type.as_str())
        .bind(entry.format.as_str())
        .bind(entry.template_id)
        .bind(schedule)
        .bind(filters)
        .bind(recipients)
        .bind(entry.is_active)
        .bind(entry.last_run_at)
        .bind(entry.next_run_at)
        .bind(entry.updated_at)
        .bind(&entry.metadata)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => ScheduledReport::try_from(row),
            None => Err(RepositoryError::Conflict(format!(
                "scheduled report {} changed since version {}",
                entry.id, entry.version
            ))),
        }
    }

    #[instrument(name = "db.schedule.delete", skip(self))]
    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool> {
        let result =
            sqlx::query("DELETE FROM scheduled_reports WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(name = "db.schedule.list_active", skip(self))]
    async fn list_active(&self) -> RepoResult<Vec<ScheduledReport>> {
        let rows = sqlx::query_as::<_, ScheduledReportRow>(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM scheduled_reports WHERE is_active ORDER BY next_run_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        into_entries(rows)
    }
}
