//! Filtering and roll-ups over raw platform records. Everything here is pure;
//! the ratios and averages return zero for empty input.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{
    BatchJob, BatchJobStatus, CategoryCount, ComplianceData, PerformanceData, ReportFilters,
    RiskAssessment, RiskLevel, RiskPrediction, TrendDirection, TrendInterval, TrendPoint,
};

/// Average-score movement below this many points counts as stable.
const TREND_TOLERANCE: f64 = 1.0;

pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0u64), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// `part / whole` as a percentage, 0 when `whole` is 0.
pub fn percentage(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { part / whole * 100.0 }
}

pub fn filter_assessments(
    records: Vec<RiskAssessment>,
    filters: &ReportFilters,
) -> Vec<RiskAssessment> {
    let mut matching: Vec<RiskAssessment> = records
        .into_iter()
        .filter(|a| {
            filters.matches_date(a.created_at)
                && filters.matches_industry(&a.industry)
                && filters.matches_country(&a.country)
                && filters.matches_risk_level(a.risk_level)
                && filters.matches_business(&a.business_id)
                && filters.matches_attributes(&a.attributes)
        })
        .collect();
    matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    matching
}

pub fn filter_predictions(
    records: Vec<RiskPrediction>,
    filters: &ReportFilters,
) -> Vec<RiskPrediction> {
    let mut matching: Vec<RiskPrediction> = records
        .into_iter()
        .filter(|p| {
            filters.matches_date(p.created_at)
                && filters.matches_industry(&p.industry)
                && filters.matches_country(&p.country)
                && filters.matches_risk_level(p.predicted_level)
                && filters.matches_business(&p.business_id)
                && filters.matches_attributes(&p.attributes)
        })
        .collect();
    matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    matching
}

/// Batch jobs carry no business dimensions, so only the date range and the
/// custom attribute filters apply to them.
pub fn filter_batch_jobs(records: Vec<BatchJob>, filters: &ReportFilters) -> Vec<BatchJob> {
    let mut matching: Vec<BatchJob> = records
        .into_iter()
        .filter(|j| filters.matches_date(j.created_at) && filters.matches_attributes(&j.attributes))
        .collect();
    matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    matching
}

pub fn compliance_snapshot(assessments: &[RiskAssessment]) -> ComplianceData {
    let total = assessments.len() as u64;
    let compliant = assessments
        .iter()
        .filter(|a| a.compliance_flags.is_empty())
        .count() as u64;

    let mut flag_counts = BTreeMap::new();
    for flag in assessments.iter().flat_map(|a| a.compliance_flags.iter()) {
        *flag_counts.entry(flag.clone()).or_insert(0) += 1;
    }

    let mut critical_businesses: Vec<String> = assessments
        .iter()
        .filter(|a| a.risk_level == RiskLevel::Critical)
        .map(|a| a.business_id.clone())
        .collect();
    critical_businesses.sort();
    critical_businesses.dedup();

    ComplianceData {
        total_assessments: total,
        compliant_assessments: compliant,
        non_compliant_assessments: total - compliant,
        compliance_rate: percentage(compliant as f64, total as f64),
        flag_counts,
        critical_businesses,
    }
}

pub fn performance_snapshot(jobs: &[BatchJob], assessments: &[RiskAssessment]) -> PerformanceData {
    let mut jobs_by_status = BTreeMap::new();
    for job in jobs {
        *jobs_by_status
            .entry(job.status.as_str().to_string())
            .or_insert(0) += 1;
    }

    let succeeded = jobs
        .iter()
        .filter(|j| j.status == BatchJobStatus::Completed)
        .count();
    let finished = jobs
        .iter()
        .filter(|j| {
            matches!(
                j.status,
                BatchJobStatus::Completed | BatchJobStatus::Failed | BatchJobStatus::Cancelled
            )
        })
        .count();

    let items_processed: i64 = jobs.iter().map(|j| j.processed_items).sum();
    let items_failed: i64 = jobs.iter().map(|j| j.failed_items).sum();

    PerformanceData {
        total_jobs: jobs.len() as u64,
        jobs_by_status,
        success_rate: percentage(succeeded as f64, finished as f64),
        average_processing_seconds: mean(jobs.iter().filter_map(BatchJob::processing_seconds)),
        items_processed,
        items_failed,
        item_failure_rate: percentage(items_failed as f64, items_processed as f64),
        average_assessment_confidence: mean(assessments.iter().map(|a| a.confidence)),
    }
}

/// Counts occurrences and returns the `limit` most frequent, ties broken by name.
pub fn rank_counts<'a>(values: impl IntoIterator<Item = &'a str>, limit: usize) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut ranked: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(name, count)| CategoryCount {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

/// Count per risk level, with every level present.
pub fn level_distribution(levels: impl IntoIterator<Item = RiskLevel>) -> BTreeMap<RiskLevel, u64> {
    let mut distribution: BTreeMap<RiskLevel, u64> =
        RiskLevel::ALL.into_iter().map(|level| (level, 0)).collect();
    for level in levels {
        *distribution.entry(level).or_insert(0) += 1;
    }
    distribution
}

pub fn period_start(date: NaiveDate, interval: TrendInterval) -> NaiveDate {
    match interval {
        TrendInterval::Day => date,
        TrendInterval::Week => date - Duration::days(date.weekday().num_days_from_sunday() as i64),
        TrendInterval::Month => date.with_day(1).unwrap_or(date),
    }
}

/// Buckets assessments into consecutive periods, oldest first. Periods with
/// no assessments are omitted.
pub fn bucket_trends(assessments: &[RiskAssessment], interval: TrendInterval) -> Vec<TrendPoint> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&RiskAssessment>> = BTreeMap::new();
    for assessment in assessments {
        let start = period_start(assessment.created_at.date_naive(), interval);
        buckets.entry(start).or_default().push(assessment);
    }

    buckets
        .into_iter()
        .map(|(period_start, records)| TrendPoint {
            period_start,
            assessments: records.len() as u64,
            average_risk_score: mean(records.iter().map(|a| a.risk_score)),
            high_risk_count: records.iter().filter(|a| a.risk_level.is_elevated()).count() as u64,
        })
        .collect()
}

/// Change in average score between the first and last period.
pub fn trend_direction(points: &[TrendPoint]) -> (f64, TrendDirection) {
    let change = match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() > 1 => {
            last.average_risk_score - first.average_risk_score
        }
        _ => 0.0,
    };

    let direction = if change > TREND_TOLERANCE {
        TrendDirection::Increasing
    } else if change < -TREND_TOLERANCE {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };
    (change, direction)
}
