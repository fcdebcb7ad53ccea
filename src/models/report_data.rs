use serde::{Deserialize, Serialize};

use super::filters::DateRange;
use super::report::ReportType;

/// Format-independent report content. Every renderer consumes this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub title: String,
    pub report_type: ReportType,
    pub period: Option<DateRange>,
    pub summary: Vec<SummaryMetric>,
    pub charts: Vec<ChartData>,
    pub tables: Vec<TableData>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub record_counts: RecordCounts,
}

impl ReportData {
    pub fn chart(&self, id: &str) -> Option<&ChartData> {
        self.charts.iter().find(|c| c.id == id)
    }

    pub fn table(&self, id: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.id == id)
    }

    pub fn metric(&self, key: &str) -> Option<&SummaryMetric> {
        self.summary.iter().find(|m| m.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetric {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub unit: Option<String>,
}

impl SummaryMetric {
    pub fn new(key: &str, label: &str, value: f64) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            value,
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn display_value(&self) -> String {
        let number = if self.value.fract() == 0.0 {
            format!("{:.0}", self.value)
        } else {
            format!("{:.2}", self.value)
        };
        match &self.unit {
            Some(unit) if unit == "%" => format!("{number}%"),
            Some(unit) => format!("{number} {unit}"),
            None => number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub id: String,
    pub title: String,
    pub chart_type: ChartType,
    pub labels: Vec<String>,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub id: String,
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordCounts {
    pub assessments: u64,
    pub predictions: u64,
    pub batch_jobs: u64,
}
