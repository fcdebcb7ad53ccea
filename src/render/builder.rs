//! Builds the format-independent [`ReportData`] for each report type from one
//! aggregate fetch. Insights and recommendations are threshold rules.

use std::collections::BTreeMap;

use crate::aggregator::{
    AggregateSet, bucket_trends, level_distribution, mean, percentage, rank_counts,
    trend_direction,
};
use crate::models::{
    ChartData, ChartSeries, ChartType, RecordCounts, ReportData, ReportFilters, ReportType,
    RiskAssessment, SummaryMetric, TableData, TrendDirection, TrendInterval,
};

const TOP_RISKS_LIMIT: usize = 10;
const ELEVATED_SCORE: f64 = 50.0;
const LOW_SCORE: f64 = 25.0;
const HIGH_RISK_SHARE_ALERT: f64 = 20.0;
const COMPLIANCE_TARGET: f64 = 90.0;
const JOB_SUCCESS_TARGET: f64 = 95.0;
const ITEM_FAILURE_ALERT: f64 = 5.0;

#[tracing::instrument(
    name = "render.build_data",
    skip(filters, set),
    fields(
        report.assessments = set.assessments.len(),
        report.predictions = set.predictions.len(),
        report.batch_jobs = set.batch_jobs.len(),
    )
)]
pub fn build_report_data(
    report_type: ReportType,
    title: &str,
    filters: &ReportFilters,
    set: &AggregateSet,
) -> ReportData {
    let mut data = ReportData {
        title: title.to_string(),
        report_type,
        period: filters.date_range,
        summary: Vec::new(),
        charts: Vec::new(),
        tables: Vec::new(),
        insights: Vec::new(),
        recommendations: Vec::new(),
        record_counts: RecordCounts {
            assessments: set.assessments.len() as u64,
            predictions: set.predictions.len() as u64,
            batch_jobs: set.batch_jobs.len() as u64,
        },
    };

    match report_type {
        ReportType::ExecutiveSummary => executive_summary(&mut data, set),
        ReportType::ComplianceAudit => compliance_audit(&mut data, set),
        ReportType::TrendAnalysis => trend_analysis(&mut data, set),
        ReportType::BatchResults => batch_results(&mut data, set),
        ReportType::Performance => performance(&mut data, set),
        ReportType::RiskAssessment => risk_assessment(&mut data, set),
    }

    if data.recommendations.is_empty() {
        data.recommendations
            .push("No action required; maintain the current monitoring cadence.".to_string());
    }
    data
}

fn executive_summary(data: &mut ReportData, set: &AggregateSet) {
    let assessments = &set.assessments;
    let elevated = elevated_count(assessments);

    data.summary = vec![
        SummaryMetric::new("total_assessments", "Total assessments", assessments.len() as f64),
        SummaryMetric::new(
            "average_risk_score",
            "Average risk score",
            average_score(assessments),
        ),
        SummaryMetric::new("high_risk_count", "High or critical risk", elevated as f64),
        SummaryMetric::new(
            "high_risk_share",
            "High or critical share",
            percentage(elevated as f64, assessments.len() as f64),
        )
        .with_unit("%"),
        SummaryMetric::new(
            "compliance_rate",
            "Compliance rate",
            set.compliance.compliance_rate,
        )
        .with_unit("%"),
        SummaryMetric::new(
            "total_predictions",
            "Predictions",
            set.predictions.len() as f64,
        ),
        SummaryMetric::new(
            "average_predicted_score",
            "Average predicted score",
            mean(set.predictions.iter().map(|p| p.predicted_score)),
        ),
        SummaryMetric::new(
            "batch_success_rate",
            "Batch job success rate",
            set.performance.success_rate,
        )
        .with_unit("%"),
    ];

    data.charts = vec![
        risk_distribution_chart(assessments),
        industry_risk_chart(assessments),
    ];
    data.tables = vec![top_risks_table(assessments)];

    risk_insights(data, set);
    compliance_insights(data, set);
    job_insights(data, set);
    prediction_insights(data, set);
}

fn compliance_audit(data: &mut ReportData, set: &AggregateSet) {
    let compliance = &set.compliance;

    data.summary = vec![
        SummaryMetric::new(
            "total_assessments",
            "Total assessments",
            compliance.total_assessments as f64,
        ),
        SummaryMetric::new(
            "compliant_assessments",
            "Compliant",
            compliance.compliant_assessments as f64,
        ),
        SummaryMetric::new(
            "non_compliant_assessments",
            "Non-compliant",
            compliance.non_compliant_assessments as f64,
        ),
        SummaryMetric::new("compliance_rate", "Compliance rate", compliance.compliance_rate)
            .with_unit("%"),
        SummaryMetric::new(
            "critical_businesses",
            "Businesses at critical risk",
            compliance.critical_businesses.len() as f64,
        ),
    ];

    let flags: Vec<(&String, &u64)> = compliance.flag_counts.iter().collect();
    data.charts = vec![ChartData {
        id: "compliance_flags".to_string(),
        title: "Findings by compliance flag".to_string(),
        chart_type: ChartType::Bar,
        labels: flags.iter().map(|(flag, _)| flag.to_string()).collect(),
        series: vec![ChartSeries {
            name: "Findings".to_string(),
            values: flags.iter().map(|(_, count)| **count as f64).collect(),
        }],
    }];

    let flagged_total: u64 = compliance.flag_counts.values().sum();
    data.tables = vec![
        TableData {
            id: "flag_summary".to_string(),
            title: "Compliance flags".to_string(),
            columns: columns(&["Flag", "Findings", "Share"]),
            rows: flags
                .iter()
                .map(|(flag, count)| {
                    vec![
                        flag.to_string(),
                        count.to_string(),
                        format!("{:.2}%", percentage(**count as f64, flagged_total as f64)),
                    ]
                })
                .collect(),
        },
        TableData {
            id: "non_compliant".to_string(),
            title: "Non-compliant assessments".to_string(),
            columns: columns(&["Business", "Industry", "Country", "Flags", "Score"]),
            rows: set
                .assessments
                .iter()
                .filter(|a| !a.compliance_flags.is_empty())
                .map(|a| {
                    vec![
                        a.business_name.clone(),
                        a.industry.clone(),
                        a.country.clone(),
                        a.compliance_flags.join(", "),
                        format!("{:.1}", a.risk_score),
                    ]
                })
                .collect(),
        },
    ];

    compliance_insights(data, set);
    risk_insights(data, set);
}

fn trend_analysis(data: &mut ReportData, set: &AggregateSet) {
    let points = bucket_trends(&set.assessments, TrendInterval::Week);
    let (change, direction) = trend_direction(&points);

    data.summary = vec![
        SummaryMetric::new("periods", "Weekly periods", points.len() as f64),
        SummaryMetric::new(
            "first_period_score",
            "Opening average score",
            points.first().map_or(0.0, |p| p.average_risk_score),
        ),
        SummaryMetric::new(
            "last_period_score",
            "Closing average score",
            points.last().map_or(0.0, |p| p.average_risk_score),
        ),
        SummaryMetric::new("risk_score_change", "Change in average score", change),
    ];

    let labels: Vec<String> = points.iter().map(|p| p.period_start.to_string()).collect();
    data.charts = vec![
        ChartData {
            id: "risk_trend".to_string(),
            title: "Average risk score by week".to_string(),
            chart_type: ChartType::Line,
            labels: labels.clone(),
            series: vec![ChartSeries {
                name: "Average score".to_string(),
                values: points.iter().map(|p| p.average_risk_score).collect(),
            }],
        },
        ChartData {
            id: "assessment_volume".to_string(),
            title: "Assessments by week".to_string(),
            chart_type: ChartType::Bar,
            labels,
            series: vec![
                ChartSeries {
                    name: "Assessments".to_string(),
                    values: points.iter().map(|p| p.assessments as f64).collect(),
                },
                ChartSeries {
                    name: "High or critical".to_string(),
                    values: points.iter().map(|p| p.high_risk_count as f64).collect(),
                },
            ],
        },
    ];

    data.tables = vec![TableData {
        id: "trend_points".to_string(),
        title: "Weekly trend".to_string(),
        columns: columns(&["Week of", "Assessments", "Average score", "High or critical"]),
        rows: points
            .iter()
            .map(|p| {
                vec![
                    p.period_start.to_string(),
                    p.assessments.to_string(),
                    format!("{:.2}", p.average_risk_score),
                    p.high_risk_count.to_string(),
                ]
            })
            .collect(),
    }];

    match direction {
        TrendDirection::Increasing => data.insights.push(format!(
            "Average risk score rose by {change:.2} points over the period."
        )),
        TrendDirection::Decreasing => data.insights.push(format!(
            "Average risk score fell by {:.2} points over the period.",
            change.abs()
        )),
        TrendDirection::Stable if points.len() > 1 => data
            .insights
            .push("Average risk score was stable over the period.".to_string()),
        TrendDirection::Stable => {}
    }
    if direction == TrendDirection::Increasing {
        data.recommendations.push(
            "Risk is trending upward; review the drivers behind the most recent periods."
                .to_string(),
        );
    }
    risk_insights(data, set);
    prediction_insights(data, set);
}

fn batch_results(data: &mut ReportData, set: &AggregateSet) {
    let performance = &set.performance;

    data.summary = vec![
        SummaryMetric::new("total_jobs", "Batch jobs", performance.total_jobs as f64),
        SummaryMetric::new("success_rate", "Success rate", performance.success_rate)
            .with_unit("%"),
        SummaryMetric::new(
            "items_processed",
            "Items processed",
            performance.items_processed as f64,
        ),
        SummaryMetric::new("items_failed", "Items failed", performance.items_failed as f64),
        SummaryMetric::new(
            "item_failure_rate",
            "Item failure rate",
            performance.item_failure_rate,
        )
        .with_unit("%"),
        SummaryMetric::new(
            "average_processing_seconds",
            "Average processing time",
            performance.average_processing_seconds,
        )
        .with_unit("s"),
    ];

    data.charts = vec![count_chart(
        "jobs_by_status",
        "Jobs by status",
        ChartType::Pie,
        "Jobs",
        &performance.jobs_by_status,
    )];

    data.tables = vec![TableData {
        id: "batch_jobs".to_string(),
        title: "Batch jobs".to_string(),
        columns: columns(&[
            "Job", "Status", "Total", "Processed", "Failed", "Duration (s)", "Created",
        ]),
        rows: set
            .batch_jobs
            .iter()
            .map(|j| {
                vec![
                    j.name.clone(),
                    j.status.as_str().to_string(),
                    j.total_items.to_string(),
                    j.processed_items.to_string(),
                    j.failed_items.to_string(),
                    j.processing_seconds()
                        .map(|s| format!("{s:.1}"))
                        .unwrap_or_default(),
                    j.created_at.to_rfc3339(),
                ]
            })
            .collect(),
    }];

    job_insights(data, set);
}

fn performance(data: &mut ReportData, set: &AggregateSet) {
    let performance = &set.performance;

    data.summary = vec![
        SummaryMetric::new(
            "average_processing_seconds",
            "Average processing time",
            performance.average_processing_seconds,
        )
        .with_unit("s"),
        SummaryMetric::new("success_rate", "Job success rate", performance.success_rate)
            .with_unit("%"),
        SummaryMetric::new(
            "item_failure_rate",
            "Item failure rate",
            performance.item_failure_rate,
        )
        .with_unit("%"),
        SummaryMetric::new(
            "average_assessment_confidence",
            "Average assessment confidence",
            performance.average_assessment_confidence,
        ),
        SummaryMetric::new(
            "average_prediction_confidence",
            "Average prediction confidence",
            mean(set.predictions.iter().map(|p| p.confidence)),
        ),
        SummaryMetric::new("total_jobs", "Batch jobs", performance.total_jobs as f64),
    ];

    let mut by_model: BTreeMap<&str, Vec<(f64, f64)>> = BTreeMap::new();
    for prediction in &set.predictions {
        by_model
            .entry(prediction.model_version.as_str())
            .or_default()
            .push((prediction.confidence, prediction.predicted_score));
    }

    data.charts = vec![ChartData {
        id: "model_confidence".to_string(),
        title: "Average confidence by model version".to_string(),
        chart_type: ChartType::Bar,
        labels: by_model.keys().map(|m| m.to_string()).collect(),
        series: vec![ChartSeries {
            name: "Confidence".to_string(),
            values: by_model
                .values()
                .map(|v| mean(v.iter().map(|(c, _)| *c)))
                .collect(),
        }],
    }];

    data.tables = vec![TableData {
        id: "model_performance".to_string(),
        title: "Model performance".to_string(),
        columns: columns(&["Model", "Predictions", "Average confidence", "Average predicted score"]),
        rows: by_model
            .iter()
            .map(|(model, values)| {
                vec![
                    model.to_string(),
                    values.len().to_string(),
                    format!("{:.3}", mean(values.iter().map(|(c, _)| *c))),
                    format!("{:.2}", mean(values.iter().map(|(_, s)| *s))),
                ]
            })
            .collect(),
    }];

    job_insights(data, set);
}

fn risk_assessment(data: &mut ReportData, set: &AggregateSet) {
    let assessments = &set.assessments;

    data.summary = vec![
        SummaryMetric::new("total_assessments", "Total assessments", assessments.len() as f64),
        SummaryMetric::new(
            "average_risk_score",
            "Average risk score",
            average_score(assessments),
        ),
        SummaryMetric::new(
            "high_risk_count",
            "High or critical risk",
            elevated_count(assessments) as f64,
        ),
        SummaryMetric::new(
            "average_confidence",
            "Average confidence",
            mean(assessments.iter().map(|a| a.confidence)),
        ),
    ];

    data.charts = vec![risk_distribution_chart(assessments)];
    data.tables = vec![TableData {
        id: "assessments".to_string(),
        title: "Assessments".to_string(),
        columns: columns(&[
            "Business ID",
            "Business",
            "Industry",
            "Country",
            "Score",
            "Level",
            "Confidence",
            "Risk factors",
            "Compliance flags",
            "Assessed at",
        ]),
        rows: assessments
            .iter()
            .map(|a| {
                vec![
                    a.business_id.clone(),
                    a.business_name.clone(),
                    a.industry.clone(),
                    a.country.clone(),
                    format!("{:.1}", a.risk_score),
                    a.risk_level.as_str().to_string(),
                    format!("{:.2}", a.confidence),
                    a.risk_factors.join(", "),
                    a.compliance_flags.join(", "),
                    a.created_at.to_rfc3339(),
                ]
            })
            .collect(),
    }];

    risk_insights(data, set);
    compliance_insights(data, set);
}

fn risk_insights(data: &mut ReportData, set: &AggregateSet) {
    let assessments = &set.assessments;
    if assessments.is_empty() {
        data.insights
            .push("No risk assessments matched the selected filters.".to_string());
        return;
    }

    let average = average_score(assessments);
    if average >= ELEVATED_SCORE {
        data.insights
            .push(format!("Average risk score of {average:.2} is elevated."));
    } else if average < LOW_SCORE {
        data.insights
            .push(format!("Average risk score of {average:.2} is low."));
    } else {
        data.insights
            .push(format!("Average risk score of {average:.2} is moderate."));
    }

    let share = percentage(elevated_count(assessments) as f64, assessments.len() as f64);
    if share > HIGH_RISK_SHARE_ALERT {
        data.insights.push(format!(
            "{share:.2}% of assessed businesses are rated high or critical risk."
        ));
    }

    if let Some(top) = rank_counts(
        assessments
            .iter()
            .flat_map(|a| a.risk_factors.iter().map(String::as_str)),
        1,
    )
    .first()
    {
        data.insights.push(format!(
            "Most frequent risk factor: {} ({} assessments).",
            top.name, top.count
        ));
    }

    let critical = &set.compliance.critical_businesses;
    if !critical.is_empty() {
        data.recommendations.push(format!(
            "Review the {} business(es) at critical risk: {}.",
            critical.len(),
            critical.join(", ")
        ));
    }
}

fn compliance_insights(data: &mut ReportData, set: &AggregateSet) {
    let compliance = &set.compliance;
    if compliance.total_assessments == 0 {
        return;
    }

    if compliance.compliance_rate < COMPLIANCE_TARGET {
        data.insights.push(format!(
            "Compliance rate is {:.2}%, below the {COMPLIANCE_TARGET:.0}% target.",
            compliance.compliance_rate
        ));
        let top_flag = compliance
            .flag_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)));
        if let Some((flag, count)) = top_flag {
            data.recommendations.push(format!(
                "Prioritize remediation of '{flag}' findings ({count} occurrences)."
            ));
        }
    } else {
        data.insights.push(format!(
            "Compliance rate of {:.2}% meets the {COMPLIANCE_TARGET:.0}% target.",
            compliance.compliance_rate
        ));
    }
}

fn job_insights(data: &mut ReportData, set: &AggregateSet) {
    let performance = &set.performance;
    if performance.total_jobs == 0 {
        data.insights
            .push("No batch jobs ran in the selected period.".to_string());
        return;
    }

    let finished = performance
        .jobs_by_status
        .iter()
        .filter(|(status, _)| matches!(status.as_str(), "completed" | "failed" | "cancelled"))
        .map(|(_, count)| *count)
        .sum::<u64>();
    if finished > 0 && performance.success_rate < JOB_SUCCESS_TARGET {
        data.insights.push(format!(
            "Batch job success rate of {:.2}% is below the {JOB_SUCCESS_TARGET:.0}% target.",
            performance.success_rate
        ));
        data.recommendations.push(
            "Investigate failed and cancelled batch jobs before the next scoring run.".to_string(),
        );
    }
    if performance.item_failure_rate > ITEM_FAILURE_ALERT {
        data.insights.push(format!(
            "{:.2}% of processed items failed.",
            performance.item_failure_rate
        ));
        data.recommendations.push(
            "Check input data quality for the batches with the most failed items.".to_string(),
        );
    }
}

fn prediction_insights(data: &mut ReportData, set: &AggregateSet) {
    if set.predictions.is_empty() || set.assessments.is_empty() {
        return;
    }
    let predicted = mean(set.predictions.iter().map(|p| p.predicted_score));
    let current = average_score(&set.assessments);
    if predicted > current + 1.0 {
        data.insights.push(format!(
            "Predicted average score of {predicted:.2} exceeds the current {current:.2}."
        ));
        data.recommendations.push(
            "Tighten monitoring for businesses whose predicted score rises into a higher band."
                .to_string(),
        );
    }
}

fn average_score(assessments: &[RiskAssessment]) -> f64 {
    mean(assessments.iter().map(|a| a.risk_score))
}

fn elevated_count(assessments: &[RiskAssessment]) -> usize {
    assessments
        .iter()
        .filter(|a| a.risk_level.is_elevated())
        .count()
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn risk_distribution_chart(assessments: &[RiskAssessment]) -> ChartData {
    let distribution = level_distribution(assessments.iter().map(|a| a.risk_level));
    ChartData {
        id: "risk_distribution".to_string(),
        title: "Risk level distribution".to_string(),
        chart_type: ChartType::Pie,
        labels: distribution.keys().map(|l| l.as_str().to_string()).collect(),
        series: vec![ChartSeries {
            name: "Assessments".to_string(),
            values: distribution.values().map(|c| *c as f64).collect(),
        }],
    }
}

fn industry_risk_chart(assessments: &[RiskAssessment]) -> ChartData {
    let mut by_industry: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for a in assessments {
        by_industry
            .entry(a.industry.as_str())
            .or_default()
            .push(a.risk_score);
    }
    ChartData {
        id: "industry_risk".to_string(),
        title: "Average risk score by industry".to_string(),
        chart_type: ChartType::Bar,
        labels: by_industry.keys().map(|i| i.to_string()).collect(),
        series: vec![ChartSeries {
            name: "Average score".to_string(),
            values: by_industry.values().map(|s| mean(s.iter().copied())).collect(),
        }],
    }
}

fn count_chart(
    id: &str,
    title: &str,
    chart_type: ChartType,
    series: &str,
    counts: &BTreeMap<String, u64>,
) -> ChartData {
    ChartData {
        id: id.to_string(),
        title: title.to_string(),
        chart_type,
        labels: counts.keys().cloned().collect(),
        series: vec![ChartSeries {
            name: series.to_string(),
            values: counts.values().map(|c| *c as f64).collect(),
        }],
    }
}

fn top_risks_table(assessments: &[RiskAssessment]) -> TableData {
    let mut ranked: Vec<&RiskAssessment> = assessments.iter().collect();
    ranked.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.business_id.cmp(&b.business_id))
    });
    ranked.truncate(TOP_RISKS_LIMIT);

    TableData {
        id: "top_risks".to_string(),
        title: "Highest-risk businesses".to_string(),
        columns: columns(&["Business", "Industry", "Country", "Score", "Level"]),
        rows: ranked
            .into_iter()
            .map(|a| {
                vec![
                    a.business_name.clone(),
                    a.industry.clone(),
                    a.country.clone(),
                    format!("{:.1}", a.risk_score),
                    a.risk_level.as_str().to_string(),
                ]
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{compliance_snapshot, performance_snapshot};
    use crate::models::{BatchJob, BatchJobStatus, RiskLevel};
    use chrono::Utc;
    use uuid::Uuid;

    fn assessment(business: &str, score: f64, flags: &[&str]) -> RiskAssessment {
        RiskAssessment {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            business_id: business.to_string(),
            business_name: format!("{business} Inc"),
            industry: "retail".to_string(),
            country: "US".to_string(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            confidence: 0.75,
            risk_factors: vec!["late_payments".to_string()],
            compliance_flags: flags.iter().map(|f| f.to_string()).collect(),
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    fn set_with(assessments: Vec<RiskAssessment>, jobs: Vec<BatchJob>) -> AggregateSet {
        AggregateSet {
            compliance: compliance_snapshot(&assessments),
            performance: performance_snapshot(&jobs, &assessments),
            assessments,
            predictions: vec![],
            batch_jobs: jobs,
        }
    }

    #[test]
    fn test_every_type_builds_from_empty_set() {
        let set = AggregateSet::default();
        for report_type in ReportType::ALL {
            let data = build_report_data(report_type, "Empty", &ReportFilters::default(), &set);
            assert_eq!(data.report_type, report_type);
            assert!(!data.summary.is_empty());
            assert!(data.summary.iter().all(|m| m.value.is_finite()));
            assert!(!data.recommendations.is_empty());
        }
    }

    #[test]
    fn test_executive_summary_metrics() {
        let set = set_with(
            vec![
                assessment("b1", 80.0, &["sanctions"]),
                assessment("b2", 20.0, &[]),
            ],
            vec![],
        );
        let data = build_report_data(
            ReportType::ExecutiveSummary,
            "Q1 Summary",
            &ReportFilters::default(),
            &set,
        );

        assert_eq!(data.title, "Q1 Summary");
        assert_eq!(data.metric("total_assessments").unwrap().value, 2.0);
        assert_eq!(data.metric("average_risk_score").unwrap().value, 50.0);
        assert_eq!(data.metric("high_risk_share").unwrap().value, 50.0);
        assert_eq!(data.metric("compliance_rate").unwrap().value, 50.0);
        assert!(data.chart("risk_distribution").is_some());
        assert_eq!(data.table("top_risks").unwrap().rows[0][0], "b1 Inc");
        assert!(data.insights.iter().any(|i| i.contains("elevated")));
        assert!(
            data.recommendations
                .iter()
                .any(|r| r.contains("sanctions"))
        );
        assert!(data.recommendations.iter().any(|r| r.contains("b1")));
    }

    #[test]
    fn test_compliance_audit_lists_non_compliant() {
        let set = set_with(
            vec![
                assessment("b1", 40.0, &["kyc_missing", "sanctions"]),
                assessment("b2", 30.0, &[]),
            ],
            vec![],
        );
        let data = build_report_data(
            ReportType::ComplianceAudit,
            "Audit",
            &ReportFilters::default(),
            &set,
        );
        let table = data.table("non_compliant").unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][3], "kyc_missing, sanctions");
        assert_eq!(data.table("flag_summary").unwrap().rows.len(), 2);
    }

    #[test]
    fn test_batch_results_flags_failures() {
        let job = BatchJob {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            name: "nightly".to_string(),
            status: BatchJobStatus::Failed,
            total_items: 100,
            processed_items: 100,
            failed_items: 40,
            attributes: BTreeMap::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let set = set_with(vec![], vec![job]);
        let data = build_report_data(
            ReportType::BatchResults,
            "Batches",
            &ReportFilters::default(),
            &set,
        );
        assert_eq!(data.metric("success_rate").unwrap().value, 0.0);
        assert_eq!(data.metric("item_failure_rate").unwrap().value, 40.0);
        assert_eq!(data.table("batch_jobs").unwrap().rows[0][5], "");
        assert!(data.insights.iter().any(|i| i.contains("below")));
    }
}
