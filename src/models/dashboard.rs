use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::filters::{DateRange, ReportFilters};
use super::records::RiskLevel;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_assessments: u64,
    pub average_risk_score: f64,
    pub high_risk_count: u64,
    pub risk_distribution: BTreeMap<RiskLevel, u64>,
    pub industry_breakdown: Vec<CategoryCount>,
    pub top_risk_factors: Vec<CategoryCount>,
    pub total_predictions: u64,
    pub average_prediction_confidence: f64,
    pub active_batch_jobs: u64,
    pub compliance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendInterval {
    Day,
    #[default]
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub period_start: NaiveDate,
    pub assessments: u64,
    pub average_risk_score: f64,
    pub high_risk_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardTrends {
    pub interval: TrendInterval,
    pub points: Vec<TrendPoint>,
    pub risk_score_change: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizonSummary {
    pub horizon_days: i32,
    pub predictions: u64,
    pub average_predicted_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionHighlight {
    pub business_id: String,
    pub predicted_score: f64,
    pub predicted_level: RiskLevel,
    pub confidence: f64,
    pub horizon_days: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardPredictions {
    pub total_predictions: u64,
    pub average_predicted_score: f64,
    pub average_confidence: f64,
    pub level_distribution: BTreeMap<RiskLevel, u64>,
    pub by_horizon: Vec<HorizonSummary>,
    pub top_predicted_risks: Vec<PredictionHighlight>,
}

/// Flat query-string form of [`ReportFilters`] used by the dashboard endpoints.
///
/// List-valued parameters are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub risk_level: Option<String>,
    pub business_id: Option<String>,
    pub interval: Option<TrendInterval>,
}

impl DashboardQuery {
    pub fn to_filters(&self) -> Result<ReportFilters, String> {
        let date_range = match (self.start, self.end) {
            (Some(start), Some(end)) => Some(DateRange { start, end }),
            (Some(start), None) => Some(DateRange {
                start,
                end: DateTime::<Utc>::MAX_UTC,
            }),
            (None, Some(end)) => Some(DateRange {
                start: DateTime::<Utc>::MIN_UTC,
                end,
            }),
            (None, None) => None,
        };

        let risk_levels = split_list(self.risk_level.as_deref())
            .into_iter()
            .map(|level| level.parse::<RiskLevel>())
            .collect::<Result<Vec<_>, _>>()?;

        let filters = ReportFilters {
            date_range,
            industries: split_list(self.industry.as_deref()),
            countries: split_list(self.country.as_deref()),
            risk_levels,
            business_ids: split_list(self.business_id.as_deref()),
            custom: BTreeMap::new(),
        };
        filters.validate()?;
        Ok(filters)
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_splits_comma_lists() {
        let query = DashboardQuery {
            industry: Some("banking, retail,".to_string()),
            risk_level: Some("high,critical".to_string()),
            ..Default::default()
        };
        let filters = query.to_filters().unwrap();
        assert_eq!(filters.industries, vec!["banking", "retail"]);
        assert_eq!(filters.risk_levels, vec![RiskLevel::High, RiskLevel::Critical]);
    }

    #[test]
    fn test_query_rejects_unknown_risk_level() {
        let query = DashboardQuery {
            risk_level: Some("extreme".to_string()),
            ..Default::default()
        };
        assert!(query.to_filters().is_err());
    }

    #[test]
    fn test_query_open_ended_range() {
        let start = Utc::now();
        let query = DashboardQuery {
            start: Some(start),
            ..Default::default()
        };
        let range = query.to_filters().unwrap().date_range.unwrap();
        assert_eq!(range.start, start);
        assert_eq!(range.end, DateTime::<Utc>::MAX_UTC);
    }
}
