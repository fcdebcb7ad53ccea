//! Maps a tenant and a filter set onto normalized platform records and the
//! compliance/performance roll-ups built from them.

mod snapshot;
mod source;

pub use snapshot::{
    bucket_trends, compliance_snapshot, filter_assessments, filter_batch_jobs,
    filter_predictions, level_distribution, mean, percentage, performance_snapshot,
    period_start, rank_counts, trend_direction,
};
pub use source::{DataSourceError, InMemoryRiskDataSource, PgRiskDataSource, RiskDataSource};

use std::sync::Arc;

use tracing::instrument;

use crate::models::{
    BatchJob, ComplianceData, PerformanceData, ReportFilters, RiskAssessment, RiskPrediction,
};

/// Everything one report or dashboard needs, fetched once.
#[derive(Debug, Clone, Default)]
pub struct AggregateSet {
    pub assessments: Vec<RiskAssessment>,
    pub predictions: Vec<RiskPrediction>,
    pub batch_jobs: Vec<BatchJob>,
    pub compliance: ComplianceData,
    pub performance: PerformanceData,
}

#[derive(Clone)]
pub struct DataAggregator {
    source: Arc<dyn RiskDataSource>,
}

impl DataAggregator {
    pub fn new(source: Arc<dyn RiskDataSource>) -> Self {
        Self { source }
    }

    #[instrument(name = "aggregator.assessments", skip(self, filters), fields(count))]
    pub async fn get_risk_assessments(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> Result<Vec<RiskAssessment>, DataSourceError> {
        let records = self
            .source
            .fetch_assessments(tenant_id, filters.date_range)
            .await?;
        let records = filter_assessments(records, filters);
        tracing::Span::current().record("count", records.len());
        Ok(records)
    }

    #[instrument(name = "aggregator.predictions", skip(self, filters), fields(count))]
    pub async fn get_risk_predictions(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> Result<Vec<RiskPrediction>, DataSourceError> {
        let records = self
            .source
            .fetch_predictions(tenant_id, filters.date_range)
            .await?;
        let records = filter_predictions(records, filters);
        tracing::Span::current().record("count", records.len());
        Ok(records)
    }

    #[instrument(name = "aggregator.batch_jobs", skip(self, filters), fields(count))]
    pub async fn get_batch_jobs(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> Result<Vec<BatchJob>, DataSourceError> {
        let records = self
            .source
            .fetch_batch_jobs(tenant_id, filters.date_range)
            .await?;
        let records = filter_batch_jobs(records, filters);
        tracing::Span::current().record("count", records.len());
        Ok(records)
    }

    #[instrument(name = "aggregator.compliance", skip(self, filters))]
    pub async fn get_compliance_data(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> Result<ComplianceData, DataSourceError> {
        let assessments = self.get_risk_assessments(tenant_id, filters).await?;
        Ok(compliance_snapshot(&assessments))
    }

    #[instrument(name = "aggregator.performance", skip(self, filters))]
    pub async fn get_performance_data(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> Result<PerformanceData, DataSourceError> {
        let (jobs, assessments) = tokio::try_join!(
            self.get_batch_jobs(tenant_id, filters),
            self.get_risk_assessments(tenant_id, filters),
        )?;
        Ok(performance_snapshot(&jobs, &assessments))
    }

    #[instrument(name = "aggregator.collect", skip(self, filters))]
    pub async fn collect(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> Result<AggregateSet, DataSourceError> {
        let (assessments, predictions, batch_jobs) = tokio::try_join!(
            self.get_risk_assessments(tenant_id, filters),
            self.get_risk_predictions(tenant_id, filters),
            self.get_batch_jobs(tenant_id, filters),
        )?;

        let compliance = compliance_snapshot(&assessments);
        let performance = performance_snapshot(&batch_jobs, &assessments);

        Ok(AggregateSet {
            assessments,
            predictions,
            batch_jobs,
            compliance,
            performance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchJobStatus, RiskLevel};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn assessment(tenant: &str, industry: &str, score: f64) -> RiskAssessment {
        RiskAssessment {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            business_id: "b1".to_string(),
            business_name: "Acme".to_string(),
            industry: industry.to_string(),
            country: "US".to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            confidence: 0.9,
            risk_factors: vec!["leverage".to_string()],
            compliance_flags: vec![],
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_collect_scopes_by_tenant_and_filters() {
        let source = InMemoryRiskDataSource::new();
        source.add_assessment(assessment("t1", "retail", 30.0)).await;
        source.add_assessment(assessment("t1", "banking", 70.0)).await;
        source.add_assessment(assessment("t2", "retail", 90.0)).await;
        source
            .add_batch_job(BatchJob {
                id: Uuid::new_v4(),
                tenant_id: "t1".to_string(),
                name: "nightly".to_string(),
                status: BatchJobStatus::Completed,
                total_items: 2,
                processed_items: 2,
                failed_items: 0,
                attributes: BTreeMap::new(),
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
            })
            .await;

        let aggregator = DataAggregator::new(Arc::new(source));
        let filters = ReportFilters {
            industries: vec!["Retail".to_string()],
            ..Default::default()
        };

        let set = aggregator.collect("t1", &filters).await.unwrap();
        assert_eq!(set.assessments.len(), 1);
        assert_eq!(set.assessments[0].risk_score, 30.0);
        assert_eq!(set.batch_jobs.len(), 1);
        assert_eq!(set.compliance.total_assessments, 1);
        assert_eq!(set.performance.success_rate, 100.0);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_empty_not_error() {
        let aggregator = DataAggregator::new(Arc::new(InMemoryRiskDataSource::new()));
        let compliance = aggregator
            .get_compliance_data("nobody", &ReportFilters::default())
            .await
            .unwrap();
        assert_eq!(compliance, ComplianceData::default());
    }

    #[tokio::test]
    async fn test_performance_for_empty_tenant_is_zero() {
        let aggregator = DataAggregator::new(Arc::new(InMemoryRiskDataSource::new()));
        let performance = aggregator
            .get_performance_data("nobody", &ReportFilters::default())
            .await
            .unwrap();

        assert_eq!(performance.total_jobs, 0);
        assert_eq!(performance.success_rate, 0.0);
        assert_eq!(performance.average_processing_seconds, 0.0);
        assert_eq!(performance.average_assessment_confidence, 0.0);
    }
}
