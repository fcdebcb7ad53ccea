use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    jobs::{GenerationJob, GenerationQueue},
    models::{
        CreateReportInput, CreateReportResponse, ListReportsQuery, Page, Report,
        ReportFormat, ReportListFilter, ReportMetrics, ReportStatus, ReportType,
        ScheduledReport, StatusChange, page_bounds,
    },
    repository::{ReportRepository, TemplateRepository},
    storage::BlobStore,
    telemetry::{REPORTS_CREATED, REPORTS_EXPIRED, REPORTS_FAILED},
};

pub const QUEUE_UNAVAILABLE: &str = "generation queue unavailable";
pub const GENERATION_ABANDONED: &str = "generation abandoned";

/// The synchronous half of the report lifecycle. Creation persists a pending
/// record and hands it to the generation queue without waiting for it.
#[derive(Clone)]
pub struct ReportService {
    reports: Arc<dyn ReportRepository>,
    templates: Arc<dyn TemplateRepository>,
    blobs: Arc<dyn BlobStore>,
    queue: GenerationQueue,
    retention: chrono::Duration,
}

impl ReportService {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        templates: Arc<dyn TemplateRepository>,
        blobs: Arc<dyn BlobStore>,
        queue: GenerationQueue,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            reports,
            templates,
            blobs,
            queue,
            retention,
        }
    }

    #[instrument(name = "report.create", skip(self, input), fields(report_id))]
    pub async fn create_report(
        &self,
        tenant_id: &str,
        user_id: &str,
        input: CreateReportInput,
    ) -> AppResult<CreateReportResponse> {
        self.submit(tenant_id, user_id, input, None).await
    }

    /// Creates one run of a scheduled entry, delivering to its recipients.
    #[instrument(
        name = "report.create_scheduled",
        skip(self, entry),
        fields(scheduled_report_id = %entry.id, report_id)
    )]
    pub async fn create_from_schedule(
        &self,
        entry: &ScheduledReport,
        now: DateTime<Utc>,
    ) -> AppResult<CreateReportResponse> {
        let mut metadata = match &entry.metadata {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        metadata.insert(
            "scheduled_report_id".to_string(),
            serde_json::Value::String(entry.id.to_string()),
        );

        let input = CreateReportInput {
            name: format!("{} ({})", entry.name, now.format("%Y-%m-%d %H:%M UTC")),
            report_type: entry.report_type.as_str().to_string(),
            format: entry.format.as_str().to_string(),
            template_id: entry.template_id,
            filters: entry.filters.clone(),
            recipients: entry.recipients.clone(),
            metadata: Some(serde_json::Value::Object(metadata)),
        };

        self.submit(&entry.tenant_id, &entry.created_by, input, Some(entry.id))
            .await
    }

    async fn submit(
        &self,
        tenant_id: &str,
        user_id: &str,
        input: CreateReportInput,
        scheduled_report_id: Option<Uuid>,
    ) -> AppResult<CreateReportResponse> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        let report_type: ReportType = input.report_type.parse().map_err(AppError::Validation)?;
        let format: ReportFormat = input.format.parse().map_err(AppError::Validation)?;
        input.filters.validate().map_err(AppError::Validation)?;
        if input.recipients.iter().any(|r| r.address.trim().is_empty()) {
            return Err(AppError::Validation(
                "recipient address must not be empty".to_string(),
            ));
        }
        let metadata = match input.metadata {
            None => serde_json::json!({}),
            Some(value @ serde_json::Value::Object(_)) => value,
            Some(_) => {
                return Err(AppError::Validation(
                    "metadata must be a JSON object".to_string(),
                ));
            }
        };

        if let Some(template_id) = input.template_id {
            let template = self
                .templates
                .get(tenant_id, template_id)
                .await?
                .ok_or_else(|| {
                    AppError::Validation(format!("template {template_id} not found"))
                })?;
            if template.report_type != report_type {
                return Err(AppError::Validation(format!(
                    "template {template_id} is for {} reports",
                    template.report_type
                )));
            }
        }

        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            report_type,
            status: ReportStatus::Pending,
            format,
            template_id: input.template_id,
            data: None,
            filters: input.filters,
            generated_at: None,
            expires_at: Some(now + self.retention),
            file_size: 0,
            download_url: String::new(),
            created_by: user_id.to_string(),
            created_at: now,
            updated_at: now,
            metadata,
            error: None,
        };

        self.reports.create(&report).await?;
        tracing::Span::current().record("report_id", report.id.to_string());
        REPORTS_CREATED.add(
            1,
            &[
                KeyValue::new("report_type", report_type.as_str()),
                KeyValue::new("format", format.as_str()),
            ],
        );

        let job = GenerationJob {
            report_id: report.id,
            tenant_id: report.tenant_id.clone(),
            recipients: input.recipients,
            scheduled_report_id,
        };
        if let Err(e) = self.queue.submit(job) {
            tracing::warn!(report_id = %report.id, error = %e, "Report could not be queued");
            REPORTS_FAILED.add(1, &[]);
            if let Err(e) = self
                .reports
                .transition(
                    tenant_id,
                    report.id,
                    ReportStatus::Pending,
                    &StatusChange::failed(QUEUE_UNAVAILABLE),
                )
                .await
            {
                tracing::error!(report_id = %report.id, error = %e, "Failed to mark unqueued report");
            }
        }

        tracing::info!(report_id = %report.id, %report_type, %format, "Report accepted");

        Ok(CreateReportResponse {
            id: report.id,
            status: ReportStatus::Pending,
        })
    }

    #[instrument(name = "report.get", skip(self))]
    pub async fn get_report(&self, tenant_id: &str, id: Uuid) -> AppResult<Report> {
        self.reports
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Report {id} not found")))
    }

    #[instrument(name = "report.list", skip(self, query))]
    pub async fn list_reports(
        &self,
        tenant_id: &str,
        query: ListReportsQuery,
    ) -> AppResult<Page<Report>> {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let filter = ReportListFilter {
            report_type: parse_opt(query.report_type.as_deref())?,
            status: parse_opt(query.status.as_deref())?,
            format: parse_opt(query.format.as_deref())?,
            created_by: query.created_by,
            created_from: query.created_from,
            created_to: query.created_to,
            limit,
            offset,
        };

        let (items, total) = self.reports.list(tenant_id, &filter).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Removes the record and, when one was stored, its file.
    #[instrument(name = "report.delete", skip(self))]
    pub async fn delete_report(&self, tenant_id: &str, id: Uuid) -> AppResult<()> {
        let report = self.get_report(tenant_id, id).await?;
        if !self.reports.delete(tenant_id, id).await? {
            return Err(AppError::NotFound(format!("Report {id} not found")));
        }

        if !report.download_url.is_empty()
            && let Err(e) = self.blobs.delete(&report.storage_key()).await
        {
            tracing::warn!(report_id = %id, error = %e, "Failed to remove report file");
        }

        tracing::info!(report_id = %id, "Report deleted");
        Ok(())
    }

    #[instrument(name = "report.metrics", skip(self))]
    pub async fn get_report_metrics(&self, tenant_id: &str) -> AppResult<ReportMetrics> {
        Ok(self.reports.metrics(tenant_id).await?)
    }

    /// Moves completed reports whose retention ended to `expired` and drops
    /// their files.
    #[instrument(name = "report.sweep_expired", skip(self), fields(expired))]
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut expired = 0;
        for report in self.reports.list_expired(now).await? {
            let moved = self
                .reports
                .transition(
                    &report.tenant_id,
                    report.id,
                    ReportStatus::Completed,
                    &StatusChange::expired(),
                )
                .await?;
            if !moved {
                continue;
            }
            expired += 1;

            if !report.download_url.is_empty()
                && let Err(e) = self.blobs.delete(&report.storage_key()).await
            {
                tracing::warn!(
                    report_id = %report.id,
                    error = %e,
                    "Failed to remove expired report file"
                );
            }
        }

        if expired > 0 {
            REPORTS_EXPIRED.add(expired as u64, &[]);
            tracing::info!(expired, "Expired reports past retention");
        }
        tracing::Span::current().record("expired", expired);
        Ok(expired)
    }

    /// Fails reports stuck in `pending` or `generating` since before
    /// `now - stale_after`.
    #[instrument(name = "report.reconcile_stale", skip(self), fields(reconciled))]
    pub async fn reconcile_stale(
        &self,
        now: DateTime<Utc>,
        stale_after: chrono::Duration,
    ) -> AppResult<usize> {
        let cutoff = now - stale_after;
        let stale = self
            .reports
            .list_stale(&[ReportStatus::Pending, ReportStatus::Generating], cutoff)
            .await?;

        let mut reconciled = 0;
        for report in stale {
            let failed = self
                .reports
                .transition(
                    &report.tenant_id,
                    report.id,
                    report.status,
                    &StatusChange::failed(GENERATION_ABANDONED),
                )
                .await?;
            if failed {
                reconciled += 1;
                REPORTS_FAILED.add(1, &[]);
                tracing::warn!(
                    report_id = %report.id,
                    tenant_id = %report.tenant_id,
                    status = %report.status,
                    "Abandoned report generation marked failed"
                );
            }
        }

        tracing::Span::current().record("reconciled", reconciled);
        Ok(reconciled)
    }
}

pub(crate) fn parse_opt<T>(raw: Option<&str>) -> AppResult<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    raw.filter(|value| !value.trim().is_empty())
        .map(|value| value.parse().map_err(AppError::Validation))
        .transpose()
}
