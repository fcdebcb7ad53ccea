use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::ReportType;
use super::report_data::ChartType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub report_type: ReportType,
    pub description: String,
    pub template: TemplateConfig,
    pub is_public: bool,
    pub is_default: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Layout, section order and styling applied when rendering a report.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub layout: LayoutConfig,
    pub sections: Vec<SectionConfig>,
    pub charts: Vec<ChartTemplate>,
    pub tables: Vec<TableTemplate>,
    pub styling: Styling,
    pub branding: Branding,
}

impl TemplateConfig {
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::HashSet::new();
        for section in &self.sections {
            if section.id.trim().is_empty() {
                return Err("section id must not be empty".to_string());
            }
            if !seen.insert(section.id.as_str()) {
                return Err(format!("duplicate section id: {}", section.id));
            }
            if matches!(section.kind, SectionKind::Chart | SectionKind::Table)
                && section.source.as_deref().is_none_or(|s| s.trim().is_empty())
            {
                return Err(format!(
                    "section {} must reference a chart or table through `source`",
                    section.id
                ));
            }
        }
        if self.styling.font_size == 0 {
            return Err("styling.font_size must be positive".to_string());
        }
        Ok(())
    }

    /// Visible sections in render order.
    pub fn ordered_sections(&self) -> Vec<&SectionConfig> {
        let mut sections: Vec<&SectionConfig> = self.sections.iter().filter(|s| s.visible).collect();
        sections.sort_by_key(|s| s.order);
        sections
    }

    pub fn chart_template(&self, id: &str) -> Option<&ChartTemplate> {
        self.charts.iter().find(|c| c.id == id)
    }

    pub fn table_template(&self, id: &str) -> Option<&TableTemplate> {
        self.tables.iter().find(|t| t.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub page_size: String,
    pub orientation: Orientation,
    pub columns: u8,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            orientation: Orientation::Portrait,
            columns: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Chart,
    Table,
    Insights,
    Recommendations,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub id: String,
    pub title: String,
    pub kind: SectionKind,
    #[serde(default)]
    pub order: u32,
    /// Chart or table id for `chart` and `table` sections.
    #[serde(default)]
    pub source: Option<String>,
    /// Static body for `text` sections.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
}

impl SectionConfig {
    pub fn new(id: &str, title: &str, kind: SectionKind, order: u32) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            kind,
            order,
            source: None,
            content: None,
            visible: true,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

fn default_true() -> bool {
    true
}

/// Overrides applied to a generated chart with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartTemplate {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub chart_type: Option<ChartType>,
    #[serde(default)]
    pub colors: Vec<String>,
}

/// Column selection and row cap applied to a generated table with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableTemplate {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub max_rows: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Styling {
    pub font_family: String,
    pub heading_font: String,
    pub font_size: u32,
    pub primary_color: String,
    pub secondary_color: String,
}

impl Default for Styling {
    fn default() -> Self {
        Self {
            font_family: "Calibri".to_string(),
            heading_font: "Arial".to_string(),
            font_size: 11,
            primary_color: "1F3A5F".to_string(),
            secondary_color: "4F6D8F".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Branding {
    pub company_name: Option<String>,
    pub logo_url: Option<String>,
    pub footer_text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateInput {
    pub name: String,
    pub report_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub template: Option<TemplateConfig>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTemplateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub template: Option<TemplateConfig>,
    pub is_public: Option<bool>,
    pub is_default: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTemplatesQuery {
    pub report_type: Option<String>,
    pub is_public: Option<bool>,
    pub created_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Typed listing criteria handed to the repository.
///
/// Listing returns the tenant's own templates plus public templates shared by
/// other tenants.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateListFilter {
    pub report_type: Option<ReportType>,
    pub is_public: Option<bool>,
    pub is_default: Option<bool>,
    pub created_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl TemplateListFilter {
    pub fn matches(&self, tenant_id: &str, template: &ReportTemplate) -> bool {
        (template.tenant_id == tenant_id || template.is_public)
            && self.report_type.is_none_or(|t| template.report_type == t)
            && self.is_public.is_none_or(|p| template.is_public == p)
            && self.is_default.is_none_or(|d| template.is_default == d)
            && self
                .created_by
                .as_deref()
                .is_none_or(|c| template.created_by == c)
    }
}
