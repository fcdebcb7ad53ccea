use std::collections::BTreeMap;

use opentelemetry::KeyValue;
use tracing::instrument;

use crate::{
    aggregator::{
        DataAggregator, bucket_trends, level_distribution, mean, rank_counts, trend_direction,
    },
    error::AppResult,
    models::{
        BatchJobStatus, DashboardPredictions, DashboardSummary, DashboardTrends, HorizonSummary,
        PredictionHighlight, ReportFilters, RiskPrediction, TrendInterval,
    },
    telemetry::DASHBOARD_REQUESTS,
};

const TOP_CATEGORIES: usize = 10;
const TOP_PREDICTIONS: usize = 10;

/// Live views computed from the aggregator on every call. Nothing is written.
#[derive(Clone)]
pub struct DashboardService {
    aggregator: DataAggregator,
}

impl DashboardService {
    pub fn new(aggregator: DataAggregator) -> Self {
        Self { aggregator }
    }

    #[instrument(name = "dashboard.overview", skip(self, filters))]
    pub async fn get_risk_overview_data(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> AppResult<DashboardSummary> {
        DASHBOARD_REQUESTS.add(1, &[KeyValue::new("view", "overview")]);

        let set = self.aggregator.collect(tenant_id, filters).await?;
        let assessments = &set.assessments;

        let active_batch_jobs = set
            .batch_jobs
            .iter()
            .filter(|j| matches!(j.status, BatchJobStatus::Pending | BatchJobStatus::Running))
            .count() as u64;

        Ok(DashboardSummary {
            total_assessments: assessments.len() as u64,
            average_risk_score: mean(assessments.iter().map(|a| a.risk_score)),
            high_risk_count: assessments
                .iter()
                .filter(|a| a.risk_level.is_elevated())
                .count() as u64,
            risk_distribution: level_distribution(assessments.iter().map(|a| a.risk_level)),
            industry_breakdown: rank_counts(
                assessments.iter().map(|a| a.industry.as_str()),
                TOP_CATEGORIES,
            ),
            top_risk_factors: rank_counts(
                assessments
                    .iter()
                    .flat_map(|a| a.risk_factors.iter().map(String::as_str)),
                TOP_CATEGORIES,
            ),
            total_predictions: set.predictions.len() as u64,
            average_prediction_confidence: mean(set.predictions.iter().map(|p| p.confidence)),
            active_batch_jobs,
            compliance_rate: set.compliance.compliance_rate,
        })
    }

    #[instrument(name = "dashboard.trends", skip(self, filters))]
    pub async fn get_trends_data(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
        interval: TrendInterval,
    ) -> AppResult<DashboardTrends> {
        DASHBOARD_REQUESTS.add(1, &[KeyValue::new("view", "trends")]);

        let assessments = self.aggregator.get_risk_assessments(tenant_id, filters).await?;
        let points = bucket_trends(&assessments, interval);
        let (risk_score_change, direction) = trend_direction(&points);

        Ok(DashboardTrends {
            interval,
            points,
            risk_score_change,
            direction,
        })
    }

    #[instrument(name = "dashboard.predictions", skip(self, filters))]
    pub async fn get_predictions_data(
        &self,
        tenant_id: &str,
        filters: &ReportFilters,
    ) -> AppResult<DashboardPredictions> {
        DASHBOARD_REQUESTS.add(1, &[KeyValue::new("view", "predictions")]);

        let predictions = self.aggregator.get_risk_predictions(tenant_id, filters).await?;

        Ok(DashboardPredictions {
            total_predictions: predictions.len() as u64,
            average_predicted_score: mean(predictions.iter().map(|p| p.predicted_score)),
            average_confidence: mean(predictions.iter().map(|p| p.confidence)),
            level_distribution: level_distribution(predictions.iter().map(|p| p.predicted_level)),
            by_horizon: horizon_summaries(&predictions),
            top_predicted_risks: top_predictions(&predictions, TOP_PREDICTIONS),
        })
    }
}

fn horizon_summaries(predictions: &[RiskPrediction]) -> Vec<HorizonSummary> {
    let mut by_horizon: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for p in predictions {
        by_horizon
            .entry(p.horizon_days)
            .or_default()
            .push(p.predicted_score);
    }

    by_horizon
        .into_iter()
        .map(|(horizon_days, scores)| HorizonSummary {
            horizon_days,
            predictions: scores.len() as u64,
            average_predicted_score: mean(scores),
        })
        .collect()
}

fn top_predictions(predictions: &[RiskPrediction], limit: usize) -> Vec<PredictionHighlight> {
    let mut ranked: Vec<&RiskPrediction> = predictions.iter().collect();
    ranked.sort_by(|a, b| {
        b.predicted_score
            .total_cmp(&a.predicted_score)
            .then_with(|| a.business_id.cmp(&b.business_id))
            .then_with(|| a.horizon_days.cmp(&b.horizon_days))
    });

    ranked
        .into_iter()
        .take(limit)
        .map(|p| PredictionHighlight {
            business_id: p.business_id.clone(),
            predicted_score: p.predicted_score,
            predicted_level: p.predicted_level,
            confidence: p.confidence,
            horizon_days: p.horizon_days,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use crate::aggregator::InMemoryRiskDataSource;
    use crate::models::{BatchJob, RiskAssessment, RiskLevel};

    fn assessment(industry: &str, score: f64, day: u32) -> RiskAssessment {
        RiskAssessment {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            business_id: format!("biz-{day}"),
            business_name: "Acme".to_string(),
            industry: industry.to_string(),
            country: "US".to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            confidence: 0.8,
            risk_factors: vec!["leverage".to_string()],
            compliance_flags: vec![],
            attributes: BTreeMap::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, day, 10, 0, 0).unwrap(),
        }
    }

    fn prediction(business: &str, horizon: i32, score: f64) -> RiskPrediction {
        RiskPrediction {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            business_id: business.to_string(),
            industry: "retail".to_string(),
            country: "US".to_string(),
            model_version: "v3".to_string(),
            horizon_days: horizon,
            predicted_score: score,
            predicted_level: RiskLevel::from_score(score),
            confidence: 0.7,
            attributes: BTreeMap::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    async fn seeded() -> DashboardService {
        let source = InMemoryRiskDataSource::new();
        source.add_assessment(assessment("retail", 20.0, 1)).await;
        source.add_assessment(assessment("retail", 80.0, 12)).await;
        source.add_assessment(assessment("banking", 50.0, 20)).await;
        source.add_prediction(prediction("b", 90, 60.0)).await;
        source.add_prediction(prediction("a", 30, 60.0)).await;
        source.add_prediction(prediction("c", 30, 20.0)).await;
        source
            .add_batch_job(BatchJob {
                id: Uuid::new_v4(),
                tenant_id: "t1".to_string(),
                name: "nightly".to_string(),
                status: BatchJobStatus::Running,
                total_items: 10,
                processed_items: 4,
                failed_items: 0,
                attributes: BTreeMap::new(),
                created_at: Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap(),
                started_at: None,
                completed_at: None,
            })
            .await;
        DashboardService::new(DataAggregator::new(Arc::new(source)))
    }

    #[tokio::test]
    async fn test_overview_for_empty_tenant_is_zero() {
        let service = seeded().await;
        let summary = service
            .get_risk_overview_data("nobody", &ReportFilters::default())
            .await
            .unwrap();

        assert_eq!(summary.total_assessments, 0);
        assert_eq!(summary.average_risk_score, 0.0);
        assert_eq!(summary.compliance_rate, 0.0);
        assert!(summary.industry_breakdown.is_empty());
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let service = seeded().await;
        let summary = service
            .get_risk_overview_data("t1", &ReportFilters::default())
            .await
            .unwrap();

        assert_eq!(summary.total_assessments, 3);
        assert_eq!(summary.average_risk_score, 50.0);
        assert_eq!(summary.industry_breakdown[0].name, "retail");
        assert_eq!(summary.industry_breakdown[0].count, 2);
        assert_eq!(summary.active_batch_jobs, 1);
        assert_eq!(summary.compliance_rate, 100.0);
    }

    #[tokio::test]
    async fn test_overview_is_repeatable() {
        let service = seeded().await;
        let filters = ReportFilters {
            industries: vec!["retail".to_string()],
            ..Default::default()
        };
        let first = service.get_risk_overview_data("t1", &filters).await.unwrap();
        let second = service.get_risk_overview_data("t1", &filters).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_assessments, 2);
    }

    #[tokio::test]
    async fn test_predictions_ranked_and_grouped() {
        let service = seeded().await;
        let view = service
            .get_predictions_data("t1", &ReportFilters::default())
            .await
            .unwrap();

        let horizons: Vec<i32> = view.by_horizon.iter().map(|h| h.horizon_days).collect();
        assert_eq!(horizons, vec![30, 90]);
        assert_eq!(view.by_horizon[0].average_predicted_score, 40.0);

        let ranked: Vec<&str> = view
            .top_predicted_risks
            .iter()
            .map(|p| p.business_id.as_str())
            .collect();
        assert_eq!(ranked, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_trends_by_month_is_single_stable_point() {
        let service = seeded().await;
        let trends = service
            .get_trends_data("t1", &ReportFilters::default(), TrendInterval::Month)
            .await
            .unwrap();

        assert_eq!(trends.points.len(), 1);
        assert_eq!(trends.points[0].assessments, 3);
        assert_eq!(trends.risk_score_change, 0.0);
    }
}
