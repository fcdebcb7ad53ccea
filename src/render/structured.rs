use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::GenerationError;
use crate::models::{Report, ReportData, ReportFormat, ReportStatus, ReportType};

/// Stable pretty-printed export of a report. `status` is the status the
/// report carries once the rendered file is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub format: ReportFormat,
    pub template_id: Option<Uuid>,
    pub generated_at: DateTime<Utc>,
    pub data: ReportData,
    pub metadata: serde_json::Value,
}

#[tracing::instrument(name = "render.json", skip_all, fields(report_id = %report.id))]
pub fn render_json(
    report: &Report,
    data: &ReportData,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>, GenerationError> {
    let document = JsonDocument {
        id: report.id,
        tenant_id: report.tenant_id.clone(),
        name: report.name.clone(),
        report_type: report.report_type,
        status: ReportStatus::Completed,
        format: report.format,
        template_id: report.template_id,
        generated_at,
        data: data.clone(),
        metadata: report.metadata.clone(),
    };

    let mut bytes = serde_json::to_vec_pretty(&document)?;
    bytes.push(b'\n');
    Ok(bytes)
}
