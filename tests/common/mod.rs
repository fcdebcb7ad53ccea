#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

use risk_report_service::{
    AppState,
    aggregator::{DataAggregator, InMemoryRiskDataSource},
    delivery::InMemoryNotifier,
    jobs::{GenerationJob, GenerationQueue, GenerationWorker},
    models::{RiskAssessment, RiskLevel},
    render::ContentGenerator,
    repository::{
        InMemoryReportRepository, InMemoryScheduledReportRepository, InMemoryTemplateRepository,
    },
    scheduler::{ManualClock, ReportScheduler},
    services::{DashboardService, ReportService, TemplateService},
    storage::InMemoryBlobStore,
};

/// The whole service wired over in-memory backends, with the generation
/// queue left for the test to drain.
pub struct TestApp {
    pub state: AppState,
    pub worker: GenerationWorker,
    pub jobs: Receiver<GenerationJob>,
    pub source: InMemoryRiskDataSource,
    pub blobs: InMemoryBlobStore,
    pub notifier: InMemoryNotifier,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new(now: DateTime<Utc>) -> Self {
        let reports = Arc::new(InMemoryReportRepository::new());
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let schedules = Arc::new(InMemoryScheduledReportRepository::new());
        let source = InMemoryRiskDataSource::new();
        let blobs = InMemoryBlobStore::new();
        let notifier = InMemoryNotifier::new();
        let clock = Arc::new(ManualClock::new(now));

        let aggregator = DataAggregator::new(Arc::new(source.clone()));
        let (queue, jobs) = GenerationQueue::bounded(16);

        let report_service = ReportService::new(
            reports.clone(),
            templates.clone(),
            Arc::new(blobs.clone()),
            queue,
            chrono::Duration::days(30),
        );
        let scheduler = ReportScheduler::new(
            schedules,
            templates.clone(),
            report_service.clone(),
            clock.clone(),
        );
        let worker = GenerationWorker::new(
            reports,
            templates.clone(),
            aggregator.clone(),
            ContentGenerator::new().unwrap(),
            Arc::new(blobs.clone()),
            Arc::new(notifier.clone()),
        );

        let state = AppState {
            pool: None,
            report_service,
            template_service: TemplateService::new(templates),
            scheduler,
            dashboard_service: DashboardService::new(aggregator),
        };

        Self {
            state,
            worker,
            jobs,
            source,
            blobs,
            notifier,
            clock,
        }
    }

    /// Runs every queued generation job to completion.
    pub async fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(job) = self.jobs.try_recv() {
            self.worker.process(job).await;
            processed += 1;
        }
        processed
    }

    pub async fn seed_assessment(&self, tenant_id: &str, industry: &str, score: f64) {
        self.source
            .add_assessment(RiskAssessment {
                id: Uuid::new_v4(),
                tenant_id: tenant_id.to_string(),
                business_id: format!("biz-{}", Uuid::new_v4()),
                business_name: "Acme Holdings".to_string(),
                industry: industry.to_string(),
                country: "US".to_string(),
                risk_score: score,
                risk_level: RiskLevel::from_score(score),
                confidence: 0.85,
                risk_factors: vec!["leverage".to_string(), "liquidity".to_string()],
                compliance_flags: vec![],
                attributes: BTreeMap::new(),
                created_at: Utc::now(),
            })
            .await;
    }
}
