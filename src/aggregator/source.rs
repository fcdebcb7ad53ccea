use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{BatchJob, DateRange, RiskAssessment, RiskPrediction};

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed record: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for DataSourceError {
    fn from(err: serde_json::Error) -> Self {
        DataSourceError::Malformed(err.to_string())
    }
}

/// Read access to the raw records produced by the risk-scoring platform.
///
/// Implementations may narrow by tenant and date range; every other filter is
/// applied by the aggregator.
#[async_trait]
pub trait RiskDataSource: Send + Sync {
    async fn fetch_assessments(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<RiskAssessment>, DataSourceError>;

    async fn fetch_predictions(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<RiskPrediction>, DataSourceError>;

    async fn fetch_batch_jobs(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<BatchJob>, DataSourceError>;
}

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, tenant_id: &str, range: Option<DateRange>) {
    qb.push(" WHERE tenant_id = ").push_bind(tenant_id.to_string());
    if let Some(range) = range {
        qb.push(" AND created_at BETWEEN ")
            .push_bind(range.start)
            .push(" AND ")
            .push_bind(range.end);
    }
    qb.push(" ORDER BY created_at, id");
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: Uuid,
    tenant_id: String,
    business_id: String,
    business_name: String,
    industry: String,
    country: String,
    risk_score: f64,
    risk_level: String,
    confidence: f64,
    risk_factors: serde_json::Value,
    compliance_flags: serde_json::Value,
    attributes: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AssessmentRow> for RiskAssessment {
    type Error = DataSourceError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        Ok(RiskAssessment {
            id: row.id,
            tenant_id: row.tenant_id,
            business_id: row.business_id,
            business_name: row.business_name,
            industry: row.industry,
            country: row.country,
            risk_score: row.risk_score,
            risk_level: row.risk_level.parse().map_err(DataSourceError::Malformed)?,
            confidence: row.confidence,
            risk_factors: serde_json::from_value(row.risk_factors)?,
            compliance_flags: serde_json::from_value(row.compliance_flags)?,
            attributes: attributes(row.attributes)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PredictionRow {
    id: Uuid,
    tenant_id: String,
    business_id: String,
    industry: String,
    country: String,
    model_version: String,
    horizon_days: i32,
    predicted_score: f64,
    predicted_level: String,
    confidence: f64,
    attributes: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<PredictionRow> for RiskPrediction {
    type Error = DataSourceError;

    fn try_from(row: PredictionRow) -> Result<Self, Self::Error> {
        Ok(RiskPrediction {
            id: row.id,
            tenant_id: row.tenant_id,
            business_id: row.business_id,
            industry: row.industry,
            country: row.country,
            model_version: row.model_version,
            horizon_days: row.horizon_days,
            predicted_score: row.predicted_score,
            predicted_level: row
                .predicted_level
                .parse()
                .map_err(DataSourceError::Malformed)?,
            confidence: row.confidence,
            attributes: attributes(row.attributes)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BatchJobRow {
    id: Uuid,
    tenant_id: String,
    name: String,
    status: String,
    total_items: i64,
    processed_items: i64,
    failed_items: i64,
    attributes: serde_json::Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BatchJobRow> for BatchJob {
    type Error = DataSourceError;

    fn try_from(row: BatchJobRow) -> Result<Self, Self::Error> {
        Ok(BatchJob {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            status: row.status.parse().map_err(DataSourceError::Malformed)?,
            total_items: row.total_items,
            processed_items: row.processed_items,
            failed_items: row.failed_items,
            attributes: attributes(row.attributes)?,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn attributes(value: serde_json::Value) -> Result<BTreeMap<String, String>, DataSourceError> {
    if value.is_null() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_value(value)?)
}

/// Reads the platform's `risk_assessments`, `risk_predictions` and
/// `batch_jobs` tables.
#[derive(Clone)]
pub struct PgRiskDataSource {
    pool: PgPool,
}

impl PgRiskDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RiskDataSource for PgRiskDataSource {
    #[instrument(name = "db.risk.assessments", skip(self))]
    async fn fetch_assessments(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<RiskAssessment>, DataSourceError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, tenant_id, business_id, business_name, industry, country, risk_score, \
             risk_level, confidence, risk_factors, compliance_flags, attributes, created_at \
             FROM risk_assessments",
        );
        push_scope(&mut qb, tenant_id, range);

        let rows = qb
            .build_query_as::<AssessmentRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RiskAssessment::try_from).collect()
    }

    #[instrument(name = "db.risk.predictions", skip(self))]
    async fn fetch_predictions(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<RiskPrediction>, DataSourceError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, tenant_id, business_id, industry, country, model_version, horizon_days, \
             predicted_score, predicted_level, confidence, attributes, created_at \
             FROM risk_predictions",
        );
        push_scope(&mut qb, tenant_id, range);

        let rows = qb
            .build_query_as::<PredictionRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(RiskPrediction::try_from).collect()
    }

    #[instrument(name = "db.risk.batch_jobs", skip(self))]
    async fn fetch_batch_jobs(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<BatchJob>, DataSourceError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT id, tenant_id, name, status, total_items, processed_items, failed_items, \
             attributes, created_at, started_at, completed_at \
             FROM batch_jobs",
        );
        push_scope(&mut qb, tenant_id, range);

        let rows = qb
            .build_query_as::<BatchJobRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(BatchJob::try_from).collect()
    }
}

#[derive(Default)]
struct Records {
    assessments: Vec<RiskAssessment>,
    predictions: Vec<RiskPrediction>,
    batch_jobs: Vec<BatchJob>,
}

/// Record set held in memory. Seeded by tests and by local runs without a
/// database.
#[derive(Clone, Default)]
pub struct InMemoryRiskDataSource {
    records: Arc<RwLock<Records>>,
}

impl InMemoryRiskDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_assessment(&self, assessment: RiskAssessment) {
        self.records.write().await.assessments.push(assessment);
    }

    pub async fn add_prediction(&self, prediction: RiskPrediction) {
        self.records.write().await.predictions.push(prediction);
    }

    pub async fn add_batch_job(&self, job: BatchJob) {
        self.records.write().await.batch_jobs.push(job);
    }
}

fn in_range(range: Option<DateRange>, at: DateTime<Utc>) -> bool {
    range.is_none_or(|r| r.contains(at))
}

#[async_trait]
impl RiskDataSource for InMemoryRiskDataSource {
    async fn fetch_assessments(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<RiskAssessment>, DataSourceError> {
        let records = self.records.read().await;
        Ok(records
            .assessments
            .iter()
            .filter(|a| a.tenant_id == tenant_id && in_range(range, a.created_at))
            .cloned()
            .collect())
    }

    async fn fetch_predictions(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<RiskPrediction>, DataSourceError> {
        let records = self.records.read().await;
        Ok(records
            .predictions
            .iter()
            .filter(|p| p.tenant_id == tenant_id && in_range(range, p.created_at))
            .cloned()
            .collect())
    }

    async fn fetch_batch_jobs(
        &self,
        tenant_id: &str,
        range: Option<DateRange>,
    ) -> Result<Vec<BatchJob>, DataSourceError> {
        let records = self.records.read().await;
        Ok(records
            .batch_jobs
            .iter()
            .filter(|j| j.tenant_id == tenant_id && in_range(range, j.created_at))
            .cloned()
            .collect())
    }
}
