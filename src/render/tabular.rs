use csv::{QuoteStyle, WriterBuilder};

use super::GenerationError;
use super::layout::apply_table_template;
use crate::models::{ReportData, TemplateConfig};

pub const CSV_HEADER: [&str; 5] = ["section", "key", "label", "value", "unit"];

/// Writes summary metrics followed by every table. Records have different
/// widths, so the writer runs in flexible mode.
#[tracing::instrument(name = "render.csv", skip_all, fields(tables = data.tables.len()))]
pub fn render_csv(data: &ReportData, config: &TemplateConfig) -> Result<Vec<u8>, GenerationError> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADER)?;
    for metric in &data.summary {
        let value = metric.value.to_string();
        writer.write_record([
            "summary",
            metric.key.as_str(),
            metric.label.as_str(),
            value.as_str(),
            metric.unit.as_deref().unwrap_or(""),
        ])?;
    }

    for table in &data.tables {
        let table = apply_table_template(table, config.table_template(&table.id));
        writer.write_record(["table", table.id.as_str(), table.title.as_str()])?;
        writer.write_record(&table.columns)?;
        for row in &table.rows {
            writer.write_record(row)?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| GenerationError::Encoding(e.to_string()))
}
