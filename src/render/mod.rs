//! Content generation: report data construction, template layout and the
//! per-format encoders.

mod builder;
mod defaults;
mod document;
mod layout;
mod markup;
mod structured;
mod tabular;

pub use builder::build_report_data;
pub use defaults::{BUILTIN_OWNER, builtin_config, builtin_template};
pub use layout::{
    DocumentView, GridView, MetricView, RenderedSection, apply_chart_template,
    apply_table_template, resolve_sections,
};
pub use structured::JsonDocument;
pub use tabular::CSV_HEADER;

use chrono::{DateTime, Utc};
use tera::Tera;
use thiserror::Error;

use crate::aggregator::DataSourceError;
use crate::models::{Report, ReportFormat, ReportTemplate};
use crate::repository::RepositoryError;

/// Failure inside the asynchronous generation task. Recorded on the report,
/// never returned to the caller that requested it.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("data aggregation failed: {0}")]
    Aggregation(#[from] DataSourceError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("report has no data to render")]
    MissingData,

    #[error("template error: {0}")]
    Template(String),

    #[error("rendering failed: {0}")]
    Render(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("DOCX generation failed: {0}")]
    Document(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<tera::Error> for GenerationError {
    fn from(e: tera::Error) -> Self {
        let mut message = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            message.push_str(": ");
            message.push_str(&inner.to_string());
            source = inner.source();
        }
        GenerationError::Render(message)
    }
}

impl From<csv::Error> for GenerationError {
    fn from(e: csv::Error) -> Self {
        GenerationError::Encoding(e.to_string())
    }
}

/// Converts a report with its aggregated data into the bytes of its format.
#[derive(Clone)]
pub struct ContentGenerator {
    tera: Tera,
}

impl ContentGenerator {
    pub fn new() -> Result<Self, GenerationError> {
        Ok(Self {
            tera: markup::build_engine()?,
        })
    }

    /// Renders `report.data` in `report.format` with `template`'s layout.
    pub fn generate(
        &self,
        report: &Report,
        template: &ReportTemplate,
    ) -> Result<Vec<u8>, GenerationError> {
        let generated_at = report.generated_at.unwrap_or_else(Utc::now);
        self.generate_at(report, template, generated_at)
    }

    #[tracing::instrument(
        name = "render.generate",
        skip(self, report, template),
        fields(report_id = %report.id, format = %report.format, bytes)
    )]
    pub fn generate_at(
        &self,
        report: &Report,
        template: &ReportTemplate,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, GenerationError> {
        let data = report.data.as_ref().ok_or(GenerationError::MissingData)?;
        let config = &template.template;

        let bytes = match report.format {
            ReportFormat::Json => structured::render_json(report, data, generated_at)?,
            ReportFormat::Csv => tabular::render_csv(data, config)?,
            ReportFormat::Markdown => {
                let view = DocumentView::build(report, data, config, generated_at);
                markup::render_markup(&self.tera, markup::MARKDOWN_TEMPLATE, &view)?
            }
            ReportFormat::Html => {
                let view = DocumentView::build(report, data, config, generated_at);
                markup::render_markup(&self.tera, markup::HTML_TEMPLATE, &view)?
            }
            ReportFormat::Docx => {
                let view = DocumentView::build(report, data, config, generated_at);
                document::render_docx(&view)?
            }
        };

        tracing::Span::current().record("bytes", bytes.len());
        Ok(bytes)
    }
}
