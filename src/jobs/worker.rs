use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{Instrument, instrument};

use super::queue::GenerationJob;
use crate::aggregator::DataAggregator;
use crate::delivery::{DeliveryNotifier, ReportReference};
use crate::models::{
    MAX_PAGE_SIZE, Report, ReportStatus, ReportTemplate, StatusChange, TemplateListFilter,
};
use crate::render::{ContentGenerator, GenerationError, build_report_data, builtin_template};
use crate::repository::{ReportRepository, TemplateRepository};
use crate::storage::BlobStore;
use crate::telemetry::{
    REPORT_GENERATION_DURATION, REPORT_OUTPUT_SIZE, REPORT_RECORDS, REPORTS_COMPLETED,
    REPORTS_FAILED,
};

/// Runs the asynchronous half of report creation: pending -> generating ->
/// completed | failed. Every failure is written onto the report; nothing is
/// propagated back to whoever queued the job.
#[derive(Clone)]
pub struct GenerationWorker {
    reports: Arc<dyn ReportRepository>,
    templates: Arc<dyn TemplateRepository>,
    aggregator: DataAggregator,
    generator: ContentGenerator,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn DeliveryNotifier>,
}

impl GenerationWorker {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        templates: Arc<dyn TemplateRepository>,
        aggregator: DataAggregator,
        generator: ContentGenerator,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn DeliveryNotifier>,
    ) -> Self {
        Self {
            reports,
            templates,
            aggregator,
            generator,
            blobs,
            notifier,
        }
    }

    /// Pulls jobs until the queue closes or shutdown is signalled, running at
    /// most `max_concurrent` generations at once, then waits for the ones in
    /// flight.
    pub async fn run(
        self,
        mut jobs: mpsc::Receiver<GenerationJob>,
        max_concurrent: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut in_flight = JoinSet::new();

        tracing::info!(max_concurrent, "Generation worker started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Generation worker shutting down");
                    break;
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                job = jobs.recv() => {
                    let Some(job) = job else {
                        break;
                    };
                    let Ok(permit) = permits.clone().acquire_owned().await else {
                        break;
                    };
                    let worker = self.clone();
                    in_flight.spawn(async move {
                        worker.process(job).await;
                        drop(permit);
                    });
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
        tracing::info!("Generation worker stopped");
    }

    #[instrument(
        name = "report.generate",
        skip(self, job),
        fields(report_id = %job.report_id, tenant_id = %job.tenant_id)
    )]
    pub async fn process(&self, job: GenerationJob) {
        let started = Instant::now();

        match self.generate(&job).await {
            Ok(Some(report)) => {
                let attributes = [
                    KeyValue::new("report_type", report.report_type.as_str()),
                    KeyValue::new("format", report.format.as_str()),
                ];
                REPORTS_COMPLETED.add(1, &attributes);
                REPORT_GENERATION_DURATION.record(started.elapsed().as_secs_f64(), &attributes);
                REPORT_OUTPUT_SIZE.record(report.file_size as f64, &attributes);

                tracing::info!(
                    file_size = report.file_size,
                    download_url = %report.download_url,
                    "Report generated"
                );

                self.notify(&job, &report).await;
            }
            Ok(None) => {
                tracing::info!("Report no longer awaiting generation, skipped");
            }
            Err(e) => {
                REPORTS_FAILED.add(1, &[]);
                tracing::error!(error = %e, "Report generation failed");
                self.mark_failed(&job, &e.to_string()).await;
            }
        }
    }

    /// Returns `None` when another writer moved the report first.
    async fn generate(&self, job: &GenerationJob) -> Result<Option<Report>, GenerationError> {
        let Some(mut report) = self.reports.get(&job.tenant_id, job.report_id).await? else {
            return Ok(None);
        };

        let claimed = self
            .reports
            .transition(
                &report.tenant_id,
                report.id,
                ReportStatus::Pending,
                &StatusChange::to(ReportStatus::Generating),
            )
            .await?;
        if !claimed {
            return Ok(None);
        }
        report.status = ReportStatus::Generating;

        let template = self.resolve_template(&report).await?;

        let aggregates = self
            .aggregator
            .collect(&report.tenant_id, &report.filters)
            .instrument(tracing::info_span!("report.aggregate"))
            .await?;
        REPORT_RECORDS.record(
            (aggregates.assessments.len()
                + aggregates.predictions.len()
                + aggregates.batch_jobs.len()) as f64,
            &[KeyValue::new("report_type", report.report_type.as_str())],
        );

        let generated_at = Utc::now();
        report.data = Some(build_report_data(
            report.report_type,
            &report.name,
            &report.filters,
            &aggregates,
        ));
        report.generated_at = Some(generated_at);

        let bytes = self.generator.generate_at(&report, &template, generated_at)?;
        let file_size = bytes.len() as i64;
        let key = report.storage_key();
        let download_url = self
            .blobs
            .put(&key, bytes, report.format.content_type())
            .await
            .map_err(|e| GenerationError::Storage(e.to_string()))?;

        let change = StatusChange {
            data: report.data.clone(),
            file_size: Some(file_size),
            download_url: Some(download_url.clone()),
            generated_at: Some(generated_at),
            ..StatusChange::to(ReportStatus::Completed)
        };
        let completed = self
            .reports
            .transition(&report.tenant_id, report.id, ReportStatus::Generating, &change)
            .await?;
        if !completed {
            tracing::warn!("Report left generating before completion, discarding output");
            if let Err(e) = self.blobs.delete(&key).await {
                tracing::warn!(error = %e, key, "Failed to remove orphaned report file");
            }
            return Ok(None);
        }

        report.status = ReportStatus::Completed;
        report.file_size = file_size;
        report.download_url = download_url;
        report.updated_at = change.updated_at;
        Ok(Some(report))
    }

    /// Explicit template, else the tenant's default for the type, else the
    /// built-in layout.
    async fn resolve_template(&self, report: &Report) -> Result<ReportTemplate, GenerationError> {
        if let Some(id) = report.template_id {
            return self
                .templates
                .get(&report.tenant_id, id)
                .await?
                .ok_or_else(|| GenerationError::Template(format!("template {id} not found")));
        }

        let filter = TemplateListFilter {
            report_type: Some(report.report_type),
            is_default: Some(true),
            limit: MAX_PAGE_SIZE,
            ..Default::default()
        };
        let (candidates, _) = self.templates.list(&report.tenant_id, &filter).await?;

        Ok(candidates
            .into_iter()
            .find(|t| t.tenant_id == report.tenant_id)
            .unwrap_or_else(|| builtin_template(report.report_type)))
    }

    async fn mark_failed(&self, job: &GenerationJob, error: &str) {
        for from in [ReportStatus::Generating, ReportStatus::Pending] {
            match self
                .reports
                .transition(&job.tenant_id, job.report_id, from, &StatusChange::failed(error))
                .await
            {
                Ok(true) => return,
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to record generation failure");
                    return;
                }
            }
        }
    }

    async fn notify(&self, job: &GenerationJob, report: &Report) {
        if job.recipients.is_empty() {
            return;
        }

        let reference = ReportReference {
            report_id: report.id,
            tenant_id: report.tenant_id.clone(),
            name: report.name.clone(),
            status: report.status,
            format: report.format,
            download_url: report.download_url.clone(),
            scheduled_report_id: job.scheduled_report_id,
        };

        for recipient in &job.recipients {
            if let Err(e) = self.notifier.notify(recipient, &reference).await {
                tracing::warn!(
                    error = %e,
                    channel = recipient.channel.as_str(),
                    "Report delivery failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::aggregator::InMemoryRiskDataSource;
    use crate::delivery::InMemoryNotifier;
    use crate::models::{
        DeliveryChannel, Recipient, ReportFilters, ReportFormat, ReportType, RiskAssessment,
        RiskLevel,
    };
    use crate::repository::{InMemoryReportRepository, InMemoryTemplateRepository};
    use crate::storage::InMemoryBlobStore;
    use uuid::Uuid;

    struct Harness {
        worker: GenerationWorker,
        reports: InMemoryReportRepository,
        blobs: InMemoryBlobStore,
        notifier: InMemoryNotifier,
    }

    async fn harness() -> Harness {
        let reports = InMemoryReportRepository::new();
        let templates = InMemoryTemplateRepository::new();
        let source = InMemoryRiskDataSource::new();
        source
            .add_assessment(RiskAssessment {
                id: Uuid::new_v4(),
                tenant_id: "t1".to_string(),
                business_id: "b1".to_string(),
                business_name: "Acme".to_string(),
                industry: "retail".to_string(),
                country: "US".to_string(),
                risk_score: 64.0,
                risk_level: RiskLevel::High,
                confidence: 0.8,
                risk_factors: vec!["leverage".to_string()],
                compliance_flags: vec![],
                attributes: BTreeMap::new(),
                created_at: Utc::now(),
            })
            .await;
        let blobs = InMemoryBlobStore::new();
        let notifier = InMemoryNotifier::new();

        let worker = GenerationWorker::new(
            Arc::new(reports.clone()),
            Arc::new(templates),
            DataAggregator::new(Arc::new(source)),
            ContentGenerator::new().unwrap(),
            Arc::new(blobs.clone()),
            Arc::new(notifier.clone()),
        );

        Harness {
            worker,
            reports,
            blobs,
            notifier,
        }
    }

    async fn pending_report(
        reports: &InMemoryReportRepository,
        format: ReportFormat,
        template_id: Option<Uuid>,
    ) -> Report {
        let now = Utc::now();
        let report = Report {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            name: "Weekly risk".to_string(),
            report_type: ReportType::ExecutiveSummary,
            status: ReportStatus::Pending,
            format,
            template_id,
            data: None,
            filters: ReportFilters::default(),
            generated_at: None,
            expires_at: Some(now + chrono::Duration::days(30)),
            file_size: 0,
            download_url: String::new(),
            created_by: "u1".to_string(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
            error: None,
        };
        reports.create(&report).await.unwrap();
        report
    }

    fn job_for(report: &Report, recipients: Vec<Recipient>) -> GenerationJob {
        GenerationJob {
            report_id: report.id,
            tenant_id: report.tenant_id.clone(),
            recipients,
            scheduled_report_id: None,
        }
    }

    #[tokio::test]
    async fn test_process_completes_and_stores_file() {
        let h = harness().await;
        let report = pending_report(&h.reports, ReportFormat::Csv, None).await;
        let recipient = Recipient {
            channel: DeliveryChannel::Email,
            address: "risk@example.com".to_string(),
        };

        h.worker.process(job_for(&report, vec![recipient])).await;

        let stored = h.reports.get("t1", report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Completed);
        assert!(stored.file_size > 0);
        assert!(!stored.download_url.is_empty());
        assert!(stored.generated_at.is_some());
        assert_eq!(stored.data.unwrap().record_counts.assessments, 1);

        let blob = h.blobs.get(&report.storage_key()).await.unwrap();
        assert_eq!(blob.bytes.len() as i64, stored.file_size);
        assert_eq!(blob.content_type, "text/csv; charset=utf-8");

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.report_id, report.id);
    }

    #[tokio::test]
    async fn test_missing_template_fails_report() {
        let h = harness().await;
        let report = pending_report(&h.reports, ReportFormat::Json, Some(Uuid::new_v4())).await;

        h.worker.process(job_for(&report, vec![])).await;

        let stored = h.reports.get("t1", report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Failed);
        assert!(stored.error.unwrap().contains("not found"));
        assert_eq!(stored.file_size, 0);
        assert!(stored.download_url.is_empty());
        assert!(h.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_process_runs_once_per_report() {
        let h = harness().await;
        let report = pending_report(&h.reports, ReportFormat::Json, None).await;

        h.worker.process(job_for(&report, vec![])).await;
        let first = h.reports.get("t1", report.id).await.unwrap().unwrap();

        h.worker.process(job_for(&report, vec![])).await;
        let second = h.reports.get("t1", report.id).await.unwrap().unwrap();

        assert_eq!(first.status, ReportStatus::Completed);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_run_drains_queue_then_stops() {
        let h = harness().await;
        let (queue, rx) = super::super::GenerationQueue::bounded(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let report = pending_report(&h.reports, ReportFormat::Markdown, None).await;
            queue.submit(job_for(&report, vec![])).unwrap();
            ids.push(report.id);
        }
        drop(queue);

        h.worker.clone().run(rx, 2, shutdown_rx).await;
        drop(shutdown_tx);

        for id in ids {
            let stored = h.reports.get("t1", id).await.unwrap().unwrap();
            assert_eq!(stored.status, ReportStatus::Completed);
        }
    }
}
