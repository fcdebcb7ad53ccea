use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ReportTemplate, ReportType, SectionConfig, SectionKind, TableTemplate, TemplateConfig,
};

/// Owner recorded on built-in templates. They are never persisted.
pub const BUILTIN_OWNER: &str = "system";

/// The layout used when a report names no template and its tenant has no
/// default for the report type.
pub fn builtin_template(report_type: ReportType) -> ReportTemplate {
    ReportTemplate {
        id: Uuid::nil(),
        tenant_id: BUILTIN_OWNER.to_string(),
        name: format!("{} (built-in)", report_type.display_name()),
        report_type,
        description: format!("Default layout for {} reports", report_type.display_name()),
        template: builtin_config(report_type),
        is_public: true,
        is_default: true,
        created_by: BUILTIN_OWNER.to_string(),
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        updated_at: DateTime::<Utc>::UNIX_EPOCH,
        metadata: serde_json::json!({ "builtin": true }),
    }
}

pub fn builtin_config(report_type: ReportType) -> TemplateConfig {
    let mut sections = vec![SectionConfig::new("summary", "Summary", SectionKind::Summary, 0)];
    let mut tables = Vec::new();

    let body: &[(&str, &str, SectionKind)] = match report_type {
        ReportType::ExecutiveSummary => &[
            ("risk_distribution", "Risk distribution", SectionKind::Chart),
            ("industry_risk", "Risk by industry", SectionKind::Chart),
            ("top_risks", "Highest-risk businesses", SectionKind::Table),
        ],
        ReportType::ComplianceAudit => &[
            ("compliance_flags", "Findings by flag", SectionKind::Chart),
            ("flag_summary", "Compliance flags", SectionKind::Table),
            ("non_compliant", "Non-compliant assessments", SectionKind::Table),
        ],
        ReportType::TrendAnalysis => &[
            ("risk_trend", "Risk trend", SectionKind::Chart),
            ("assessment_volume", "Assessment volume", SectionKind::Chart),
            ("trend_points", "Weekly trend", SectionKind::Table),
        ],
        ReportType::BatchResults => &[
            ("jobs_by_status", "Jobs by status", SectionKind::Chart),
            ("batch_jobs", "Batch jobs", SectionKind::Table),
        ],
        ReportType::Performance => &[
            ("model_confidence", "Model confidence", SectionKind::Chart),
            ("model_performance", "Model performance", SectionKind::Table),
        ],
        ReportType::RiskAssessment => &[
            ("risk_distribution", "Risk distribution", SectionKind::Chart),
            ("assessments", "Assessments", SectionKind::Table),
        ],
    };

    for (order, (source, title, kind)) in body.iter().enumerate() {
        sections.push(
            SectionConfig::new(&format!("{source}_section"), title, *kind, order as u32 + 1)
                .with_source(source),
        );
    }

    if report_type == ReportType::RiskAssessment {
        tables.push(TableTemplate {
            id: "assessments".to_string(),
            title: None,
            columns: Vec::new(),
            max_rows: Some(500),
        });
    }

    let next = sections.len() as u32;
    sections.push(SectionConfig::new(
        "insights",
        "Key insights",
        SectionKind::Insights,
        next,
    ));
    sections.push(SectionConfig::new(
        "recommendations",
        "Recommendations",
        SectionKind::Recommendations,
        next + 1,
    ));

    TemplateConfig {
        sections,
        tables,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_configs_are_valid() {
        for report_type in ReportType::ALL {
            let config = builtin_config(report_type);
            assert!(config.validate().is_ok(), "{report_type} template invalid");
            let kinds: Vec<SectionKind> = config.ordered_sections().iter().map(|s| s.kind).collect();
            assert_eq!(kinds.first(), Some(&SectionKind::Summary));
            assert_eq!(kinds.last(), Some(&SectionKind::Recommendations));
        }
    }

    #[test]
    fn test_builtin_template_identity() {
        let template = builtin_template(ReportType::Performance);
        assert!(template.id.is_nil());
        assert_eq!(template.report_type, ReportType::Performance);
        assert!(template.is_default);
    }
}
