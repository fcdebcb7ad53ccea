use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk band derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    pub fn from_score(score: f64) -> Self {
        if score >= 75.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::High
        } else if score >= 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}

/// A scored assessment produced upstream by the risk models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub tenant_id: String,
    pub business_id: String,
    pub business_name: String,
    pub industry: String,
    pub country: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub compliance_flags: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskPrediction {
    pub id: Uuid,
    pub tenant_id: String,
    pub business_id: String,
    pub industry: String,
    pub country: String,
    pub model_version: String,
    pub horizon_days: i32,
    pub predicted_score: f64,
    pub predicted_level: RiskLevel,
    pub confidence: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchJobStatus::Pending => "pending",
            BatchJobStatus::Running => "running",
            BatchJobStatus::Completed => "completed",
            BatchJobStatus::Failed => "failed",
            BatchJobStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BatchJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchJobStatus::Pending),
            "running" => Ok(BatchJobStatus::Running),
            "completed" => Ok(BatchJobStatus::Completed),
            "failed" => Ok(BatchJobStatus::Failed),
            "cancelled" => Ok(BatchJobStatus::Cancelled),
            other => Err(format!("unknown batch job status: {other}")),
        }
    }
}

/// A bulk scoring run on the risk platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub status: BatchJobStatus,
    pub total_items: i64,
    pub processed_items: i64,
    pub failed_items: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub fn processing_seconds(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) if end >= start => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComplianceData {
    pub total_assessments: u64,
    pub compliant_assessments: u64,
    pub non_compliant_assessments: u64,
    pub compliance_rate: f64,
    pub flag_counts: BTreeMap<String, u64>,
    pub critical_businesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceData {
    pub total_jobs: u64,
    pub jobs_by_status: BTreeMap<String, u64>,
    pub success_rate: f64,
    pub average_processing_seconds: f64,
    pub items_processed: i64,
    pub items_failed: i64,
    pub item_failure_rate: f64,
    pub average_assessment_confidence: f64,
}
