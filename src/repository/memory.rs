//! Process-local repositories used by tests and by the server when no
//! `DATABASE_URL` is configured. They honor the same conditional-write rules
//! as the PostgreSQL implementations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    RepoResult, ReportRepository, RepositoryError, ScheduledReportRepository, TemplateRepository,
    ensure_transition,
};
use crate::models::{
    Report, ReportListFilter, ReportMetrics, ReportStatus, ReportTemplate, ScheduleListFilter,
    ScheduledReport, StatusChange, TemplateListFilter, paginate,
};

#[derive(Clone, Default)]
pub struct InMemoryReportRepository {
    reports: Arc<RwLock<HashMap<Uuid, Report>>>,
}

impl InMemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportRepository for InMemoryReportRepository {
    async fn create(&self, report: &Report) -> RepoResult<()> {
        let mut reports = self.reports.write().await;
        if reports.contains_key(&report.id) {
            return Err(RepositoryError::Conflict(format!(
                "report {} already exists",
                report.id
            )));
        }
        reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<Report>> {
        let reports = self.reports.read().await;
        Ok(reports
            .get(&id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &ReportListFilter,
    ) -> RepoResult<(Vec<Report>, i64)> {
        let reports = self.reports.read().await;
        let mut matching: Vec<Report> = reports
            .values()
            .filter(|r| r.tenant_id == tenant_id && filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        Ok((paginate(&matching, filter.limit, filter.offset), total))
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool> {
        let mut reports = self.reports.write().await;
        match reports.get(&id) {
            Some(r) if r.tenant_id == tenant_id => {
                reports.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition(
        &self,
        tenant_id: &str,
        id: Uuid,
        from: ReportStatus,
        change: &StatusChange,
    ) -> RepoResult<bool> {
        ensure_transition(from, change.status)?;

        let mut reports = self.reports.write().await;
        let Some(report) = reports
            .get_mut(&id)
            .filter(|r| r.tenant_id == tenant_id && r.status == from)
        else {
            return Ok(false);
        };

        report.status = change.status;
        if let Some(data) = &change.data {
            report.data = Some(data.clone());
        }
        if let Some(size) = change.file_size {
            report.file_size = size;
        }
        if let Some(url) = &change.download_url {
            report.download_url = url.clone();
        }
        if let Some(at) = change.generated_at {
            report.generated_at = Some(at);
        }
        if let Some(error) = &change.error {
            report.error = Some(error.clone());
        }
        report.updated_at = change.updated_at;
        Ok(true)
    }

    async fn metrics(&self, tenant_id: &str) -> RepoResult<ReportMetrics> {
        let reports = self.reports.read().await;
        let mut metrics = ReportMetrics::default();
        for report in reports.values().filter(|r| r.tenant_id == tenant_id) {
            metrics.total_reports += 1;
            metrics.total_file_size += report.file_size;
            *metrics
                .by_status
                .entry(report.status.as_str().to_string())
                .or_insert(0) += 1;
            *metrics
                .by_type
                .entry(report.report_type.as_str().to_string())
                .or_insert(0) += 1;
            *metrics
                .by_format
                .entry(report.format.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(metrics.finalize())
    }

    async fn list_stale(
        &self,
        statuses: &[ReportStatus],
        updated_before: DateTime<Utc>,
    ) -> RepoResult<Vec<Report>> {
        let reports = self.reports.read().await;
        let mut stale: Vec<Report> = reports
            .values()
            .filter(|r| statuses.contains(&r.status) && r.updated_at < updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.updated_at);
        Ok(stale)
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> RepoResult<Vec<Report>> {
        let reports = self.reports.read().await;
        let mut expired: Vec<Report> = reports
            .values()
            .filter(|r| {
                r.status == ReportStatus::Completed && r.expires_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        expired.sort_by_key(|r| r.expires_at);
        Ok(expired)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTemplateRepository {
    templates: Arc<RwLock<HashMap<Uuid, ReportTemplate>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn create(&self, template: &ReportTemplate) -> RepoResult<()> {
        let mut templates = self.templates.write().await;
        if templates.contains_key(&template.id) {
            return Err(RepositoryError::Conflict(format!(
                "template {} already exists",
                template.id
            )));
        }
        templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<ReportTemplate>> {
        let templates = self.templates.read().await;
        Ok(templates
            .get(&id)
            .filter(|t| t.tenant_id == tenant_id || t.is_public)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &TemplateListFilter,
    ) -> RepoResult<(Vec<ReportTemplate>, i64)> {
        let templates = self.templates.read().await;
        let mut matching: Vec<ReportTemplate> = templates
            .values()
            .filter(|t| filter.matches(tenant_id, t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        Ok((paginate(&matching, filter.limit, filter.offset), total))
    }

    async fn update(&self, template: &ReportTemplate) -> RepoResult<bool> {
        let mut templates = self.templates.write().await;
        match templates.get_mut(&template.id) {
            Some(stored) if stored.tenant_id == template.tenant_id => {
                *stored = template.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool> {
        let mut templates = self.templates.write().await;
        match templates.get(&id) {
            Some(t) if t.tenant_id == tenant_id => {
                templates.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryScheduledReportRepository {
    entries: Arc<RwLock<HashMap<Uuid, ScheduledReport>>>,
}

impl InMemoryScheduledReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduledReportRepository for InMemoryScheduledReportRepository {
    async fn create(&self, entry: &ScheduledReport) -> RepoResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&entry.id) {
            return Err(RepositoryError::Conflict(format!(
                "scheduled report {} already exists",
                entry.id
            )));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<ScheduledReport>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }

    async fn list(
        &self,
        tenant_id: &str,
        filter: &ScheduleListFilter,
    ) -> RepoResult<(Vec<ScheduledReport>, i64)> {
        let entries = self.entries.read().await;
        let mut matching: Vec<ScheduledReport> = entries
            .values()
            .filter(|e| e.tenant_id == tenant_id && filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        Ok((paginate(&matching, filter.limit, filter.offset), total))
    }

    async fn update(&self, entry: &ScheduledReport) -> RepoResult<ScheduledReport> {
        let mut entries = self.entries.write().await;
        let stored = entries
            .get_mut(&entry.id)
            .filter(|e| e.tenant_id == entry.tenant_id && e.version == entry.version)
            .ok_or_else(|| {
                RepositoryError::Conflict(format!(
                    "scheduled report {} changed since version {}",
                    entry.id, entry.version
                ))
            })?;

        *stored = ScheduledReport {
            version: entry.version + 1,
            ..entry.clone()
        };
        Ok(stored.clone())
    }

    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool> {
        let mut entries = self.entries.write().await;
        match entries.get(&id) {
            Some(e) if e.tenant_id == tenant_id => {
                entries.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active(&self) -> RepoResult<Vec<ScheduledReport>> {
        let entries = self.entries.read().await;
        let mut active: Vec<ScheduledReport> =
            entries.values().filter(|e| e.is_active).cloned().collect();
        active.sort_by_key(|e| e.next_run_at);
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, ReportFilters, ReportFormat, ReportType, Schedule};

    fn report(tenant: &str) -> Report {
        let now = Utc::now();
        Report {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            name: "Weekly risk".to_string(),
            report_type: ReportType::ExecutiveSummary,
            status: ReportStatus::Pending,
            format: ReportFormat::Json,
            template_id: None,
            data: None,
            filters: ReportFilters::default(),
            generated_at: None,
            expires_at: None,
            file_size: 0,
            download_url: String::new(),
            created_by: "u1".to_string(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
            error: None,
        }
    }

    fn entry(tenant: &str) -> ScheduledReport {
        let now = Utc::now();
        ScheduledReport {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            name: "Daily digest".to_string(),
            report_type: ReportType::ExecutiveSummary,
            format: ReportFormat::Json,
            template_id: None,
            schedule: Schedule::new(Frequency::Daily, "09:00"),
            filters: ReportFilters::default(),
            recipients: Vec::new(),
            is_active: true,
            last_run_at: None,
            next_run_at: None,
            created_by: "u1".to_string(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
            version: 0,
        }
    }

    #[tokio::test]
    async fn test_reports_are_tenant_scoped() {
        let repo = InMemoryReportRepository::new();
        let r = report("t1");
        repo.create(&r).await.unwrap();

        assert!(repo.get("t1", r.id).await.unwrap().is_some());
        assert!(repo.get("t2", r.id).await.unwrap().is_none());
        assert!(!repo.delete("t2", r.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_transition_is_compare_and_set() {
        let repo = InMemoryReportRepository::new();
        let r = report("t1");
        repo.create(&r).await.unwrap();

        let moved = repo
            .transition(
                "t1",
                r.id,
                ReportStatus::Pending,
                &StatusChange::to(ReportStatus::Generating),
            )
            .await
            .unwrap();
        assert!(moved);

        // Second writer still believes the report is pending.
        let moved = repo
            .transition(
                "t1",
                r.id,
                ReportStatus::Pending,
                &StatusChange::to(ReportStatus::Generating),
            )
            .await
            .unwrap();
        assert!(!moved);
    }

    #[tokio::test]
    async fn test_transition_rejects_backward_moves() {
        let repo = InMemoryReportRepository::new();
        let r = report("t1");
        repo.create(&r).await.unwrap();

        let result = repo
            .transition(
                "t1",
                r.id,
                ReportStatus::Completed,
                &StatusChange::to(ReportStatus::Generating),
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_paginates_newest_first() {
        let repo = InMemoryReportRepository::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut r = report("t1");
            r.created_at = base + chrono::Duration::minutes(i);
            repo.create(&r).await.unwrap();
        }
        repo.create(&report("t2")).await.unwrap();

        let filter = ReportListFilter {
            limit: 2,
            offset: 0,
            ..Default::default()
        };
        let (page, total) = repo.list("t1", &filter).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at > page[1].created_at);
    }

    #[tokio::test]
    async fn test_list_filters_each_dimension() {
        let repo = InMemoryReportRepository::new();
        let base = Utc::now();

        let mut summary = report("t1");
        summary.created_at = base;
        let mut audit = report("t1");
        audit.report_type = ReportType::ComplianceAudit;
        audit.format = ReportFormat::Csv;
        audit.status = ReportStatus::Completed;
        audit.created_by = "u2".to_string();
        audit.created_at = base + chrono::Duration::hours(1);
        let mut late = report("t1");
        late.format = ReportFormat::Html;
        late.created_at = base + chrono::Duration::hours(2);
        for r in [&summary, &audit, &late] {
            repo.create(r).await.unwrap();
        }

        let ids = |filter: ReportListFilter| {
            let repo = repo.clone();
            async move {
                let (page, total) = repo.list("t1", &filter).await.unwrap();
                assert_eq!(total as usize, page.len());
                let mut ids: Vec<Uuid> = page.into_iter().map(|r| r.id).collect();
                ids.sort();
                ids
            }
        };
        let sorted = |mut v: Vec<Uuid>| {
            v.sort();
            v
        };
        let all = ReportListFilter {
            limit: 50,
            ..Default::default()
        };

        let by_type = ids(ReportListFilter {
            report_type: Some(ReportType::ComplianceAudit),
            ..all.clone()
        })
        .await;
        assert_eq!(by_type, vec![audit.id]);

        let by_status = ids(ReportListFilter {
            status: Some(ReportStatus::Pending),
            ..all.clone()
        })
        .await;
        assert_eq!(by_status, sorted(vec![summary.id, late.id]));

        let by_format = ids(ReportListFilter {
            format: Some(ReportFormat::Html),
            ..all.clone()
        })
        .await;
        assert_eq!(by_format, vec![late.id]);

        let by_creator = ids(ReportListFilter {
            created_by: Some("u2".to_string()),
            ..all.clone()
        })
        .await;
        assert_eq!(by_creator, vec![audit.id]);

        let inclusive = ids(ReportListFilter {
            created_from: Some(summary.created_at),
            created_to: Some(audit.created_at),
            ..all.clone()
        })
        .await;
        assert_eq!(inclusive, sorted(vec![summary.id, audit.id]));

        let upper_only = ids(ReportListFilter {
            created_to: Some(summary.created_at),
            ..all.clone()
        })
        .await;
        assert_eq!(upper_only, vec![summary.id]);

        let lower_only = ids(ReportListFilter {
            created_from: Some(late.created_at),
            ..all.clone()
        })
        .await;
        assert_eq!(lower_only, vec![late.id]);

        let combined = ids(ReportListFilter {
            status: Some(ReportStatus::Pending),
            format: Some(ReportFormat::Json),
            ..all
        })
        .await;
        assert_eq!(combined, vec![summary.id]);
    }

    #[tokio::test]
    async fn test_public_templates_visible_to_other_tenants() {
        let repo = InMemoryTemplateRepository::new();
        let now = Utc::now();
        let template = ReportTemplate {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            name: "Shared".to_string(),
            report_type: ReportType::ComplianceAudit,
            description: String::new(),
            template: Default::default(),
            is_public: true,
            is_default: false,
            created_by: "u1".to_string(),
            created_at: now,
            updated_at: now,
            metadata: serde_json::json!({}),
        };
        repo.create(&template).await.unwrap();

        assert!(repo.get("t2", template.id).await.unwrap().is_some());
        assert!(!repo.delete("t2", template.id).await.unwrap());

        let mut foreign_edit = template.clone();
        foreign_edit.tenant_id = "t2".to_string();
        assert!(!repo.update(&foreign_edit).await.unwrap());
    }

    #[tokio::test]
    async fn test_schedule_update_checks_version() {
        let repo = InMemoryScheduledReportRepository::new();
        let e = entry("t1");
        repo.create(&e).await.unwrap();

        let stored = repo.update(&e).await.unwrap();
        assert_eq!(stored.version, 1);

        // Stale copy still carries version 0.
        let result = repo.update(&e).await;
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_active_skips_inactive() {
        let repo = InMemoryScheduledReportRepository::new();
        let mut inactive = entry("t1");
        inactive.is_active = false;
        repo.create(&inactive).await.unwrap();
        repo.create(&entry("t2")).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].tenant_id, "t2");
    }
}
