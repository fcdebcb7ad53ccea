//! Resolves a template's section list against report data, producing the
//! flat view every document renderer walks.

use serde::Serialize;

use crate::models::{
    Branding, ChartData, ChartTemplate, ChartType, LayoutConfig, Report, ReportData,
    SectionKind, Styling, TableData, TableTemplate, TemplateConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricView {
    pub label: String,
    pub value: String,
}

/// Rows of cells with a header; charts are flattened to one row per label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridView {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderedSection {
    Summary {
        title: String,
        metrics: Vec<MetricView>,
    },
    Chart {
        title: String,
        chart_type: ChartType,
        colors: Vec<String>,
        grid: GridView,
    },
    Table {
        title: String,
        grid: GridView,
        truncated: bool,
    },
    Insights {
        title: String,
        items: Vec<String>,
    },
    Recommendations {
        title: String,
        items: Vec<String>,
    },
    Text {
        title: String,
        content: String,
    },
}

impl RenderedSection {
    pub fn title(&self) -> &str {
        match self {
            RenderedSection::Summary { title, .. }
            | RenderedSection::Chart { title, .. }
            | RenderedSection::Table { title, .. }
            | RenderedSection::Insights { title, .. }
            | RenderedSection::Recommendations { title, .. }
            | RenderedSection::Text { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportHeader {
    pub id: String,
    pub name: String,
    pub report_type: String,
    pub format: String,
    pub generated_at: String,
    pub period: Option<String>,
}

/// Everything a document template needs, already formatted.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub title: String,
    pub report: ReportHeader,
    pub sections: Vec<RenderedSection>,
    pub layout: LayoutConfig,
    pub styling: Styling,
    pub branding: Branding,
}

impl DocumentView {
    pub fn build(
        report: &Report,
        data: &ReportData,
        config: &TemplateConfig,
        generated_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let mut styling = config.styling.clone();
        styling.primary_color = hex_color(&styling.primary_color);
        styling.secondary_color = hex_color(&styling.secondary_color);

        Self {
            title: data.title.clone(),
            report: ReportHeader {
                id: report.id.to_string(),
                name: report.name.clone(),
                report_type: report.report_type.display_name().to_string(),
                format: report.format.as_str().to_string(),
                generated_at: generated_at.format("%Y-%m-%d %H:%M UTC").to_string(),
                period: data.period.map(|p| {
                    format!(
                        "{} to {}",
                        p.start.format("%Y-%m-%d"),
                        p.end.format("%Y-%m-%d")
                    )
                }),
            },
            sections: resolve_sections(data, config),
            layout: config.layout.clone(),
            styling,
            branding: config.branding.clone(),
        }
    }
}

fn hex_color(raw: &str) -> String {
    format!("#{}", raw.trim().trim_start_matches('#'))
}

/// Walks the template's visible sections in order. Sections whose chart or
/// table is absent from the data are dropped.
pub fn resolve_sections(data: &ReportData, config: &TemplateConfig) -> Vec<RenderedSection> {
    let mut rendered = Vec::new();

    for section in config.ordered_sections() {
        let title = section.title.clone();
        let source = section.source.as_deref().unwrap_or_default();

        let resolved = match section.kind {
            SectionKind::Summary => Some(RenderedSection::Summary {
                title,
                metrics: data
                    .summary
                    .iter()
                    .map(|m| MetricView {
                        label: m.label.clone(),
                        value: m.display_value(),
                    })
                    .collect(),
            }),
            SectionKind::Chart => data.chart(source).map(|chart| {
                let chart = apply_chart_template(chart, config.chart_template(source));
                RenderedSection::Chart {
                    title,
                    chart_type: chart.chart_type,
                    colors: config
                        .chart_template(source)
                        .map(|t| t.colors.clone())
                        .unwrap_or_default(),
                    grid: chart_grid(&chart),
                }
            }),
            SectionKind::Table => data.table(source).map(|table| {
                let original_rows = table.rows.len();
                let table = apply_table_template(table, config.table_template(source));
                RenderedSection::Table {
                    title,
                    truncated: table.rows.len() < original_rows,
                    grid: GridView {
                        columns: table.columns,
                        rows: table.rows,
                    },
                }
            }),
            SectionKind::Insights => Some(RenderedSection::Insights {
                title,
                items: data.insights.clone(),
            }),
            SectionKind::Recommendations => Some(RenderedSection::Recommendations {
                title,
                items: data.recommendations.clone(),
            }),
            SectionKind::Text => Some(RenderedSection::Text {
                title,
                content: section.content.clone().unwrap_or_default(),
            }),
        };

        match resolved {
            Some(section) => rendered.push(section),
            None => tracing::debug!(
                section = %section.id,
                source,
                "Template section references data not present in this report"
            ),
        }
    }

    rendered
}

pub fn apply_chart_template(chart: &ChartData, template: Option<&ChartTemplate>) -> ChartData {
    let mut chart = chart.clone();
    if let Some(template) = template {
        if let Some(title) = &template.title {
            chart.title = title.clone();
        }
        if let Some(chart_type) = template.chart_type {
            chart.chart_type = chart_type;
        }
    }
    chart
}

/// Applies column selection, row cap and title override. Configured columns
/// missing from the table are ignored.
pub fn apply_table_template(table: &TableData, template: Option<&TableTemplate>) -> TableData {
    let Some(template) = template else {
        return table.clone();
    };

    let indices: Vec<usize> = if template.columns.is_empty() {
        (0..table.columns.len()).collect()
    } else {
        template
            .columns
            .iter()
            .filter_map(|wanted| {
                table
                    .columns
                    .iter()
                    .position(|c| c.eq_ignore_ascii_case(wanted))
            })
            .collect()
    };

    let limit = template.max_rows.unwrap_or(usize::MAX);
    TableData {
        id: table.id.clone(),
        title: template.title.clone().unwrap_or_else(|| table.title.clone()),
        columns: indices.iter().map(|&i| table.columns[i].clone()).collect(),
        rows: table
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect(),
    }
}

fn chart_grid(chart: &ChartData) -> GridView {
    let mut columns = vec!["Label".to_string()];
    columns.extend(chart.series.iter().map(|s| s.name.clone()));

    let rows = chart
        .labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let mut row = vec![label.clone()];
            row.extend(chart.series.iter().map(|s| {
                s.values
                    .get(i)
                    .map(|v| format_number(*v))
                    .unwrap_or_default()
            }));
            row
        })
        .collect();

    GridView { columns, rows }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
