use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tokio::sync::{RwLock, broadcast};
use tracing::instrument;
use uuid::Uuid;

use super::Clock;
use super::recurrence::{Recurrence, normalize};
use crate::{
    error::{AppError, AppResult},
    models::{
        CreateReportResponse, CreateScheduledReportInput, ListScheduledReportsQuery, Page,
        ReportFormat, ReportType, Schedule, ScheduleListFilter, ScheduledReport,
        UpdateScheduledReportInput, page_bounds,
    },
    repository::{RepositoryError, ScheduledReportRepository, TemplateRepository},
    services::ReportService,
    telemetry::{SCHEDULED_RUNS, SCHEDULER_CONFLICTS, SCHEDULER_TICKS},
};

type Registry = Arc<RwLock<HashMap<Uuid, ScheduledReport>>>;

/// Owns the set of active entries and fires the due ones on each tick.
///
/// The registry is read-locked only to snapshot due entries and write-locked
/// only to apply one recomputed entry, so CRUD calls never wait on report
/// creation inside a tick.
#[derive(Clone)]
pub struct ReportScheduler {
    repo: Arc<dyn ScheduledReportRepository>,
    templates: Arc<dyn TemplateRepository>,
    reports: ReportService,
    registry: Registry,
    clock: Arc<dyn Clock>,
}

impl ReportScheduler {
    pub fn new(
        repo: Arc<dyn ScheduledReportRepository>,
        templates: Arc<dyn TemplateRepository>,
        reports: ReportService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            templates,
            reports,
            registry: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    #[instrument(name = "schedule.create", skip(self, input), fields(scheduled_report_id))]
    pub async fn create_scheduled_report(
        &self,
        tenant_id: &str,
        user_id: &str,
        input: CreateScheduledReportInput,
    ) -> AppResult<ScheduledReport> {
        let now = self.clock.now();
        let name = input.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".to_string()));
        }
        let report_type: ReportType = input.report_type.parse().map_err(AppError::Validation)?;
        let format: ReportFormat = input.format.parse().map_err(AppError::Validation)?;
        input.filters.validate().map_err(AppError::Validation)?;
        self.check_template(tenant_id, input.template_id, report_type).await?;

        let mut schedule = input.schedule;
        let recurrence = prepare_schedule(&mut schedule, now)?;
        let is_active = input.is_active.unwrap_or(true);

        let entry = ScheduledReport {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            report_type,
            format,
            template_id: input.template_id,
            next_run_at: if is_active { recurrence.initial_run(now) } else { None },
            schedule,
            filters: input.filters,
            recipients: input.recipients,
            is_active,
            last_run_at: None,
            created_by: user_id.to_string(),
            created_at: now,
            updated_at: now,
            metadata: metadata_object(input.metadata)?,
            version: 1,
        };

        self.repo.create(&entry).await?;
        self.schedule(entry.clone()).await;

        tracing::Span::current().record("scheduled_report_id", entry.id.to_string());
        tracing::info!(
            scheduled_report_id = %entry.id,
            frequency = %entry.schedule.frequency,
            next_run_at = ?entry.next_run_at,
            "Scheduled report created"
        );
        Ok(entry)
    }

    #[instrument(name = "schedule.get", skip(self))]
    pub async fn get_scheduled_report(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> AppResult<ScheduledReport> {
        self.repo
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Scheduled report {id} not found")))
    }

    #[instrument(name = "schedule.list", skip(self, query))]
    pub async fn list_scheduled_reports(
        &self,
        tenant_id: &str,
        query: ListScheduledReportsQuery,
    ) -> AppResult<Page<ScheduledReport>> {
        let (limit, offset) = page_bounds(query.limit, query.offset);
        let report_type = match query.report_type.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(raw.parse().map_err(AppError::Validation)?),
            _ => None,
        };
        let filter = ScheduleListFilter {
            is_active: query.is_active,
            report_type,
            created_by: query.created_by,
            limit,
            offset,
        };

        let (items, total) = self.repo.list(tenant_id, &filter).await?;
        Ok(Page {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Applies a partial edit. `next_run_at` is recomputed from now, and the
    /// write fails with a conflict if the entry changed since it was read.
    #[instrument(name = "schedule.update", skip(self, input))]
    pub async fn update_scheduled_report(
        &self,
        tenant_id: &str,
        id: Uuid,
        input: UpdateScheduledReportInput,
    ) -> AppResult<ScheduledReport> {
        let now = self.clock.now();
        let mut entry = self.get_scheduled_report(tenant_id, id).await?;

        if let Some(name) = input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("name is required".to_string()));
            }
            entry.name = name.to_string();
        }
        if let Some(raw) = input.report_type {
            entry.report_type = raw.parse().map_err(AppError::Validation)?;
        }
        if let Some(raw) = input.format {
            entry.format = raw.parse().map_err(AppError::Validation)?;
        }
        if let Some(template_id) = input.template_id {
            entry.template_id = template_id;
        }
        if let Some(filters) = input.filters {
            filters.validate().map_err(AppError::Validation)?;
            entry.filters = filters;
        }
        if let Some(recipients) = input.recipients {
            entry.recipients = recipients;
        }
        if let Some(metadata) = input.metadata {
            entry.metadata = metadata_object(Some(metadata))?;
        }
        if let Some(is_active) = input.is_active {
            entry.is_active = is_active;
        }
        if let Some(schedule) = input.schedule {
            entry.schedule = schedule;
        }
        self.check_template(tenant_id, entry.template_id, entry.report_type)
            .await?;

        let recurrence = prepare_schedule(&mut entry.schedule, now)?;
        entry.next_run_at = if entry.is_active {
            recurrence.initial_run(now)
        } else {
            None
        };
        entry.updated_at = now;

        let stored = self.repo.update(&entry).await?;
        self.schedule(stored.clone()).await;

        tracing::info!(
            scheduled_report_id = %id,
            is_active = stored.is_active,
            next_run_at = ?stored.next_run_at,
            "Scheduled report updated"
        );
        Ok(stored)
    }

    #[instrument(name = "schedule.delete", skip(self))]
    pub async fn delete_scheduled_report(&self, tenant_id: &str, id: Uuid) -> AppResult<()> {
        if !self.repo.delete(tenant_id, id).await? {
            return Err(AppError::NotFound(format!("Scheduled report {id} not found")));
        }
        self.unschedule(id).await;
        tracing::info!(scheduled_report_id = %id, "Scheduled report deleted");
        Ok(())
    }

    /// Manual trigger. Creates one report now and records `last_run_at`;
    /// the regular series is left as it was.
    #[instrument(name = "schedule.run", skip(self))]
    pub async fn run_scheduled_report(
        &self,
        tenant_id: &str,
        id: Uuid,
    ) -> AppResult<CreateReportResponse> {
        let now = self.clock.now();
        let mut entry = self.get_scheduled_report(tenant_id, id).await?;
        let response = self.reports.create_from_schedule(&entry, now).await?;

        for attempt in 0..2 {
            entry.last_run_at = Some(now);
            entry.updated_at = now;
            match self.repo.update(&entry).await {
                Ok(stored) => {
                    self.refresh(stored).await;
                    break;
                }
                Err(RepositoryError::Conflict(_)) if attempt == 0 => {
                    SCHEDULER_CONFLICTS.add(1, &[]);
                    entry = self.get_scheduled_report(tenant_id, id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!(scheduled_report_id = %id, report_id = %response.id, "Scheduled report run manually");
        Ok(response)
    }

    /// Adds `entry` to the tick set, or drops it when it has nothing left to run.
    pub async fn schedule(&self, entry: ScheduledReport) -> bool {
        let mut registry = self.registry.write().await;
        if entry.is_active && entry.next_run_at.is_some() {
            registry.insert(entry.id, entry);
            true
        } else {
            registry.remove(&entry.id);
            false
        }
    }

    /// Removes `id` from the tick set without touching the stored entry.
    pub async fn unschedule(&self, id: Uuid) -> bool {
        self.registry.write().await.remove(&id).is_some()
    }

    pub async fn is_scheduled(&self, id: Uuid) -> bool {
        self.registry.read().await.contains_key(&id)
    }

    /// Seeds the tick set from every active stored entry.
    #[instrument(name = "schedule.load_active", skip(self))]
    pub async fn load_active(&self) -> AppResult<usize> {
        let mut loaded = 0;
        for entry in self.repo.list_active().await? {
            if self.schedule(entry).await {
                loaded += 1;
            }
        }
        tracing::info!(loaded, "Scheduler registry loaded");
        Ok(loaded)
    }

    /// One evaluation pass. Returns how many entries fired.
    #[instrument(name = "schedule.tick", skip(self), fields(fired))]
    pub async fn tick(&self) -> usize {
        let now = self.clock.now();
        SCHEDULER_TICKS.add(1, &[]);

        let mut due: Vec<ScheduledReport> = {
            let registry = self.registry.read().await;
            registry.values().filter(|e| e.is_due(now)).cloned().collect()
        };
        due.sort_by_key(|e| (e.next_run_at, e.id));

        let mut fired = 0;
        for entry in due {
            match self.reports.create_from_schedule(&entry, now).await {
                Ok(response) => {
                    SCHEDULED_RUNS.add(
                        1,
                        &[KeyValue::new("frequency", entry.schedule.frequency.as_str())],
                    );
                    tracing::info!(
                        scheduled_report_id = %entry.id,
                        report_id = %response.id,
                        "Scheduled report fired"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        scheduled_report_id = %entry.id,
                        error = %e,
                        "Scheduled report run failed"
                    );
                }
            }
            fired += 1;

            let id = entry.id;
            let advanced = self.advance(entry, now).await;
            self.apply(id, advanced).await;
        }

        tracing::Span::current().record("fired", fired);
        fired
    }

    /// Runs [`tick`](Self::tick) every `every` until shutdown.
    pub async fn run(self, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(tick_secs = every.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Persists `last_run_at` and the next run after a fired entry. Returns
    /// `None` once the entry no longer exists.
    async fn advance(&self, entry: ScheduledReport, now: DateTime<Utc>) -> Option<ScheduledReport> {
        let previous = entry.next_run_at;
        let mut target = entry.clone();
        target.last_run_at = Some(now);
        target.next_run_at = next_after(&entry.schedule, previous, now);
        target.updated_at = now;

        match self.repo.update(&target).await {
            Ok(stored) => return Some(stored),
            Err(RepositoryError::Conflict(_)) => {
                SCHEDULER_CONFLICTS.add(1, &[]);
            }
            Err(e) => {
                tracing::error!(scheduled_report_id = %entry.id, error = %e, "Failed to persist next run");
                return Some(target);
            }
        }

        // Someone else wrote in between. An edit that touched the schedule or
        // the next run keeps its own next run; otherwise re-apply ours.
        let mut fresh = match self.repo.get(&entry.tenant_id, entry.id).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!(scheduled_report_id = %entry.id, error = %e, "Failed to re-read scheduled report");
                return Some(target);
            }
        };
        let edited = fresh.schedule != entry.schedule || fresh.next_run_at != previous;
        fresh.last_run_at = Some(now);
        fresh.updated_at = now;
        if !edited {
            fresh.next_run_at = target.next_run_at;
        }
        if !fresh.is_active {
            fresh.next_run_at = None;
        }

        match self.repo.update(&fresh).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                tracing::warn!(scheduled_report_id = %entry.id, error = %e, "Scheduled report changed again; keeping stored state");
                self.repo.get(&entry.tenant_id, entry.id).await.ok().flatten()
            }
        }
    }

    /// Writes a recomputed entry back into the tick set unless it was
    /// unscheduled while the tick was running.
    async fn apply(&self, id: Uuid, advanced: Option<ScheduledReport>) {
        let mut registry = self.registry.write().await;
        if !registry.contains_key(&id) {
            return;
        }
        match advanced {
            Some(entry) if entry.is_active && entry.next_run_at.is_some() => {
                registry.insert(id, entry);
            }
            _ => {
                registry.remove(&id);
            }
        }
    }

    async fn refresh(&self, stored: ScheduledReport) {
        let mut registry = self.registry.write().await;
        if registry.contains_key(&stored.id) {
            if stored.is_active && stored.next_run_at.is_some() {
                registry.insert(stored.id, stored);
            } else {
                registry.remove(&stored.id);
            }
        }
    }

    async fn check_template(
        &self,
        tenant_id: &str,
        template_id: Option<Uuid>,
        report_type: ReportType,
    ) -> AppResult<()> {
        let Some(template_id) = template_id else {
            return Ok(());
        };
        let template = self
            .templates
            .get(tenant_id, template_id)
            .await?
            .ok_or_else(|| AppError::Validation(format!("template {template_id} not found")))?;
        if template.report_type != report_type {
            return Err(AppError::Validation(format!(
                "template {template_id} is for {} reports",
                template.report_type
            )));
        }
        Ok(())
    }
}

fn prepare_schedule(schedule: &mut Schedule, now: DateTime<Utc>) -> AppResult<Recurrence> {
    normalize(schedule, now).map_err(|e| AppError::Validation(e.to_string()))?;
    Recurrence::parse(schedule).map_err(|e| AppError::Validation(e.to_string()))
}

fn next_after(
    schedule: &Schedule,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let recurrence = Recurrence::parse(schedule).ok()?;
    match previous {
        Some(previous) => recurrence.following_run(previous, now),
        None => recurrence.initial_run(now),
    }
}

fn metadata_object(metadata: Option<serde_json::Value>) -> AppResult<serde_json::Value> {
    match metadata {
        None => Ok(serde_json::json!({})),
        Some(value @ serde_json::Value::Object(_)) => Ok(value),
        Some(_) => Err(AppError::Validation(
            "metadata must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::jobs::{GenerationJob, GenerationQueue};
    use crate::models::{Frequency, ReportFilters};
    use crate::repository::{
        InMemoryReportRepository, InMemoryScheduledReportRepository, InMemoryTemplateRepository,
    };
    use crate::scheduler::ManualClock;
    use crate::storage::InMemoryBlobStore;

    struct Harness {
        scheduler: ReportScheduler,
        repo: InMemoryScheduledReportRepository,
        clock: Arc<ManualClock>,
        jobs: tokio::sync::mpsc::Receiver<GenerationJob>,
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let repo = InMemoryScheduledReportRepository::new();
        let templates = Arc::new(InMemoryTemplateRepository::new());
        let (queue, jobs) = GenerationQueue::bounded(64);
        let reports = ReportService::new(
            Arc::new(InMemoryReportRepository::new()),
            templates.clone(),
            Arc::new(InMemoryBlobStore::new()),
            queue,
            chrono::Duration::days(30),
        );
        let clock = Arc::new(ManualClock::new(now));
        let scheduler = ReportScheduler::new(Arc::new(repo.clone()), templates, reports, clock.clone());
        Harness {
            scheduler,
            repo,
            clock,
            jobs,
        }
    }

    fn daily_input(time: &str) -> CreateScheduledReportInput {
        CreateScheduledReportInput {
            name: "Daily risk".to_string(),
            report_type: "executive_summary".to_string(),
            format: "json".to_string(),
            template_id: None,
            schedule: Schedule::new(Frequency::Daily, time),
            filters: ReportFilters::default(),
            recipients: vec![],
            is_active: None,
            metadata: None,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[tokio::test]
    async fn test_create_computes_first_run_and_registers() {
        let h = harness(at(2024, 1, 15, 10, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("09:00"))
            .await
            .unwrap();

        assert_eq!(entry.next_run_at, Some(at(2024, 1, 16, 9, 0)));
        assert_eq!(entry.version, 1);
        assert!(h.scheduler.is_scheduled(entry.id).await);
    }

    #[tokio::test]
    async fn test_invalid_schedule_is_validation_error() {
        let h = harness(at(2024, 1, 15, 10, 0));
        let err = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("9am"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_tick_fires_and_advances_from_previous_run() {
        let mut h = harness(at(2024, 1, 15, 10, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("09:00"))
            .await
            .unwrap();

        assert_eq!(h.scheduler.tick().await, 0);

        // Tick arrives late; the series stays on 09:00.
        h.clock.set(at(2024, 1, 16, 9, 7));
        assert_eq!(h.scheduler.tick().await, 1);

        let job = h.jobs.recv().await.unwrap();
        assert_eq!(job.scheduled_report_id, Some(entry.id));

        let stored = h.repo.get("t1", entry.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_at, Some(at(2024, 1, 16, 9, 7)));
        assert_eq!(stored.next_run_at, Some(at(2024, 1, 17, 9, 0)));
        assert_eq!(stored.version, 2);

        assert_eq!(h.scheduler.tick().await, 0);
    }

    #[tokio::test]
    async fn test_inactive_entries_never_fire() {
        let h = harness(at(2024, 1, 15, 10, 0));
        let mut input = daily_input("09:00");
        input.is_active = Some(false);
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", input)
            .await
            .unwrap();

        assert_eq!(entry.next_run_at, None);
        h.clock.advance(chrono::Duration::days(3));
        assert_eq!(h.scheduler.tick().await, 0);
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate() {
        let h = harness(at(2024, 1, 15, 10, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("09:00"))
            .await
            .unwrap();

        let off = UpdateScheduledReportInput {
            is_active: Some(false),
            ..Default::default()
        };
        let stored = h.scheduler.update_scheduled_report("t1", entry.id, off).await.unwrap();
        assert_eq!(stored.next_run_at, None);
        assert!(!h.scheduler.is_scheduled(entry.id).await);

        let on = UpdateScheduledReportInput {
            is_active: Some(true),
            ..Default::default()
        };
        let stored = h.scheduler.update_scheduled_report("t1", entry.id, on).await.unwrap();
        assert_eq!(stored.next_run_at, Some(at(2024, 1, 16, 9, 0)));
        assert!(h.scheduler.is_scheduled(entry.id).await);
        assert_eq!(stored.version, 3);
    }

    #[tokio::test]
    async fn test_concurrent_edit_keeps_user_schedule() {
        let mut h = harness(at(2024, 1, 15, 10, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("09:00"))
            .await
            .unwrap();

        // Edit the stored row behind the registry's back, as another replica would.
        let mut edited = h.repo.get("t1", entry.id).await.unwrap().unwrap();
        edited.schedule.time_of_day = "18:00".to_string();
        edited.next_run_at = Some(at(2024, 1, 16, 18, 0));
        h.repo.update(&edited).await.unwrap();

        h.clock.set(at(2024, 1, 16, 9, 1));
        assert_eq!(h.scheduler.tick().await, 1);
        assert!(h.jobs.recv().await.is_some());

        let stored = h.repo.get("t1", entry.id).await.unwrap().unwrap();
        assert_eq!(stored.schedule.time_of_day, "18:00");
        assert_eq!(stored.next_run_at, Some(at(2024, 1, 16, 18, 0)));
        assert_eq!(stored.last_run_at, Some(at(2024, 1, 16, 9, 1)));
    }

    #[tokio::test]
    async fn test_manual_run_leaves_series_untouched() {
        let mut h = harness(at(2024, 1, 15, 10, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("09:00"))
            .await
            .unwrap();

        h.scheduler.run_scheduled_report("t1", entry.id).await.unwrap();
        assert!(h.jobs.recv().await.is_some());

        let stored = h.repo.get("t1", entry.id).await.unwrap().unwrap();
        assert_eq!(stored.last_run_at, Some(at(2024, 1, 15, 10, 0)));
        assert_eq!(stored.next_run_at, entry.next_run_at);
    }

    #[tokio::test]
    async fn test_unschedule_keeps_entity() {
        let h = harness(at(2024, 1, 15, 10, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", daily_input("09:00"))
            .await
            .unwrap();

        assert!(h.scheduler.unschedule(entry.id).await);
        h.clock.set(at(2024, 1, 16, 9, 0));
        assert_eq!(h.scheduler.tick().await, 0);
        assert!(h.scheduler.get_scheduled_report("t1", entry.id).await.is_ok());

        assert_eq!(h.scheduler.load_active().await.unwrap(), 1);
        assert_eq!(h.scheduler.tick().await, 1);
    }

    #[tokio::test]
    async fn test_once_entry_goes_inert_after_firing() {
        let h = harness(at(2024, 1, 15, 10, 0));
        let mut input = daily_input("00:00");
        input.schedule = Schedule::new(Frequency::Once, "00:00");
        input.schedule.start_date = Some(at(2024, 1, 20, 12, 0));
        let entry = h
            .scheduler
            .create_scheduled_report("t1", "u1", input)
            .await
            .unwrap();
        assert_eq!(entry.next_run_at, Some(at(2024, 1, 20, 12, 0)));

        h.clock.set(at(2024, 1, 20, 12, 0));
        assert_eq!(h.scheduler.tick().await, 1);
        assert!(!h.scheduler.is_scheduled(entry.id).await);

        let stored = h.repo.get("t1", entry.id).await.unwrap().unwrap();
        assert_eq!(stored.next_run_at, None);
        assert!(stored.is_active);
    }
}
