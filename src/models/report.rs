use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filters::ReportFilters;
use super::report_data::ReportData;
use super::schedule::Recipient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    ExecutiveSummary,
    ComplianceAudit,
    TrendAnalysis,
    BatchResults,
    Performance,
    RiskAssessment,
}

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        ReportType::ExecutiveSummary,
        ReportType::ComplianceAudit,
        ReportType::TrendAnalysis,
        ReportType::BatchResults,
        ReportType::Performance,
        ReportType::RiskAssessment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::ExecutiveSummary => "executive_summary",
            ReportType::ComplianceAudit => "compliance_audit",
            ReportType::TrendAnalysis => "trend_analysis",
            ReportType::BatchResults => "batch_results",
            ReportType::Performance => "performance",
            ReportType::RiskAssessment => "risk_assessment",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ReportType::ExecutiveSummary => "Executive Summary",
            ReportType::ComplianceAudit => "Compliance Audit",
            ReportType::TrendAnalysis => "Trend Analysis",
            ReportType::BatchResults => "Batch Job Results",
            ReportType::Performance => "Performance Report",
            ReportType::RiskAssessment => "Risk Assessment Detail",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unsupported report type: {s}"))
    }
}

/// Lifecycle of a report record.
///
/// `pending -> generating -> completed | failed`, with `completed -> expired`
/// applied by the retention sweep. A pending report may fail directly when it
/// never reaches a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Generating,
    Completed,
    Failed,
    Expired,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Generating => "generating",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
            ReportStatus::Expired => "expired",
        }
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Pending, ReportStatus::Generating)
                | (ReportStatus::Pending, ReportStatus::Failed)
                | (ReportStatus::Generating, ReportStatus::Completed)
                | (ReportStatus::Generating, ReportStatus::Failed)
                | (ReportStatus::Completed, ReportStatus::Expired)
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(ReportStatus::Pending),
            "generating" => Ok(ReportStatus::Generating),
            "completed" => Ok(ReportStatus::Completed),
            "failed" => Ok(ReportStatus::Failed),
            "expired" => Ok(ReportStatus::Expired),
            other => Err(format!("unknown report status: {other}")),
        }
    }
}

/// Output encodings. The logical names are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[serde(alias = "structured-binary")]
    Docx,
    #[serde(alias = "tabular")]
    Csv,
    #[serde(alias = "text")]
    Json,
    #[serde(alias = "markup")]
    Markdown,
    #[serde(alias = "styled-markup")]
    Html,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 5] = [
        ReportFormat::Docx,
        ReportFormat::Csv,
        ReportFormat::Json,
        ReportFormat::Markdown,
        ReportFormat::Html,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Docx => "docx",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "markdown",
            ReportFormat::Html => "html",
        }
    }

    fn logical_name(&self) -> &'static str {
        match self {
            ReportFormat::Docx => "structured-binary",
            ReportFormat::Csv => "tabular",
            ReportFormat::Json => "text",
            ReportFormat::Markdown => "markup",
            ReportFormat::Html => "styled-markup",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Json => "application/json",
            ReportFormat::Markdown => "text/markdown; charset=utf-8",
            ReportFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Docx => "docx",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
            ReportFormat::Html => "html",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        ReportFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == needle || f.logical_name() == needle)
            .ok_or_else(|| format!("unsupported report format: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub format: ReportFormat,
    pub template_id: Option<Uuid>,
    pub data: Option<ReportData>,
    pub filters: ReportFilters,
    pub generated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub file_size: i64,
    pub download_url: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
}

impl Report {
    pub fn storage_key(&self) -> String {
        format!("{}/{}.{}", self.tenant_id, self.id, self.format.extension())
    }
}

/// The fields a status transition may write alongside the new status.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: ReportStatus,
    pub data: Option<ReportData>,
    pub file_size: Option<i64>,
    pub download_url: Option<String>,
    pub generated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StatusChange {
    pub fn to(status: ReportStatus) -> Self {
        Self {
            status,
            data: None,
            file_size: None,
            download_url: None,
            generated_at: None,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Retention ended: the stored file goes away with the link to it.
    pub fn expired() -> Self {
        Self {
            file_size: Some(0),
            download_url: Some(String::new()),
            ..Self::to(ReportStatus::Expired)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::to(ReportStatus::Failed)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReportInput {
    pub name: String,
    pub report_type: String,
    pub format: String,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateReportResponse {
    pub id: Uuid,
    pub status: ReportStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListReportsQuery {
    pub report_type: Option<String>,
    pub status: Option<String>,
    pub format: Option<String>,
    pub created_by: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Typed listing criteria handed to the repository.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReportListFilter {
    pub report_type: Option<ReportType>,
    pub status: Option<ReportStatus>,
    pub format: Option<ReportFormat>,
    pub created_by: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl ReportListFilter {
    pub fn matches(&self, report: &Report) -> bool {
        self.report_type.is_none_or(|t| report.report_type == t)
            && self.status.is_none_or(|s| report.status == s)
            && self.format.is_none_or(|f| report.format == f)
            && self
                .created_by
                .as_deref()
                .is_none_or(|c| report.created_by == c)
            && self.created_from.is_none_or(|from| report.created_at >= from)
            && self.created_to.is_none_or(|to| report.created_at <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ReportMetrics {
    pub total_reports: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub by_format: BTreeMap<String, i64>,
    pub total_file_size: i64,
    pub average_file_size: f64,
    pub success_rate: f64,
}

impl ReportMetrics {
    /// Fills the derived averages from the raw counts.
    pub fn finalize(mut self) -> Self {
        let completed = self.by_status.get("completed").copied().unwrap_or(0)
            + self.by_status.get("expired").copied().unwrap_or(0);
        let failed = self.by_status.get("failed").copied().unwrap_or(0);

        self.average_file_size = if completed > 0 {
            self.total_file_size as f64 / completed as f64
        } else {
            0.0
        };
        self.success_rate = if completed + failed > 0 {
            completed as f64 / (completed + failed) as f64 * 100.0
        } else {
            0.0
        };
        self
    }
}
