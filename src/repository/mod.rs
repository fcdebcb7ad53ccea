//! Persistence contracts and their PostgreSQL and in-memory implementations.

mod memory;
mod report;
mod scheduled_report;
mod template;

pub use memory::{
    InMemoryReportRepository, InMemoryScheduledReportRepository, InMemoryTemplateRepository,
};
pub use report::PgReportRepository;
pub use scheduled_report::PgScheduledReportRepository;
pub use template::PgTemplateRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Report, ReportListFilter, ReportMetrics, ReportStatus, ReportTemplate, ScheduleListFilter,
    ScheduledReport, StatusChange, TemplateListFilter,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

pub(crate) fn ensure_transition(from: ReportStatus, to: ReportStatus) -> RepoResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "illegal report status transition {from} -> {to}"
        )))
    }
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: &Report) -> RepoResult<()>;

    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<Report>>;

    /// Returns one page ordered newest first, plus the total match count.
    async fn list(&self, tenant_id: &str, filter: &ReportListFilter)
    -> RepoResult<(Vec<Report>, i64)>;

    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool>;

    /// Compare-and-set on status: applies `change` only while the stored status
    /// is still `from`. Returns `false` when another writer got there first.
    async fn transition(
        &self,
        tenant_id: &str,
        id: Uuid,
        from: ReportStatus,
        change: &StatusChange,
    ) -> RepoResult<bool>;

    async fn metrics(&self, tenant_id: &str) -> RepoResult<ReportMetrics>;

    /// Reports in any of `statuses` not touched since `updated_before`, across tenants.
    async fn list_stale(
        &self,
        statuses: &[ReportStatus],
        updated_before: DateTime<Utc>,
    ) -> RepoResult<Vec<Report>>;

    /// Completed reports whose retention ended at or before `now`, across tenants.
    async fn list_expired(&self, now: DateTime<Utc>) -> RepoResult<Vec<Report>>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn create(&self, template: &ReportTemplate) -> RepoResult<()>;

    /// Own templates plus templates other tenants marked public.
    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<ReportTemplate>>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: &TemplateListFilter,
    ) -> RepoResult<(Vec<ReportTemplate>, i64)>;

    /// Only the owning tenant may update. Returns `false` when no row matched.
    async fn update(&self, template: &ReportTemplate) -> RepoResult<bool>;

    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool>;
}

#[async_trait]
pub trait ScheduledReportRepository: Send + Sync {
    async fn create(&self, entry: &ScheduledReport) -> RepoResult<()>;

    async fn get(&self, tenant_id: &str, id: Uuid) -> RepoResult<Option<ScheduledReport>>;

    async fn list(
        &self,
        tenant_id: &str,
        filter: &ScheduleListFilter,
    ) -> RepoResult<(Vec<ScheduledReport>, i64)>;

    /// Writes `entry` if the stored version still equals `entry.version` and
    /// returns the stored copy with the bumped version.
    async fn update(&self, entry: &ScheduledReport) -> RepoResult<ScheduledReport>;

    async fn delete(&self, tenant_id: &str, id: Uuid) -> RepoResult<bool>;

    /// Every active entry across tenants, used to seed the scheduler registry.
    async fn list_active(&self) -> RepoResult<Vec<ScheduledReport>>;
}
