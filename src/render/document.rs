use std::io::Cursor;

use docx_rs::{
    AlignmentType, Docx, Paragraph, Run, RunFonts, Style, StyleType, Table, TableCell, TableRow,
};

use super::GenerationError;
use super::layout::{DocumentView, GridView, RenderedSection};
use crate::models::Styling;

const TITLE_SIZE_PT: usize = 20;
const HEADING_SIZE_PT: usize = 14;

#[tracing::instrument(name = "render.docx", skip_all, fields(sections = view.sections.len()))]
pub fn render_docx(view: &DocumentView) -> Result<Vec<u8>, GenerationError> {
    let styling = &view.styling;
    let mut docx = Docx::new()
        .add_style(heading_style("Title", "Title", TITLE_SIZE_PT))
        .add_style(heading_style("Heading1", "heading 1", HEADING_SIZE_PT));

    if let Some(company) = &view.branding.company_name {
        docx = docx.add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Right)
                .add_run(text_run(company, styling).italic()),
        );
    }

    docx = docx.add_paragraph(heading_paragraph(&view.title, "Title", styling));
    docx = docx.add_table(grid_table(
        &GridView {
            columns: vec!["Field".to_string(), "Value".to_string()],
            rows: header_rows(view),
        },
        styling,
    ));

    for section in &view.sections {
        docx = docx.add_paragraph(heading_paragraph(section.title(), "Heading1", styling));

        match section {
            RenderedSection::Summary { metrics, .. } => {
                let grid = GridView {
                    columns: vec!["Metric".to_string(), "Value".to_string()],
                    rows: metrics
                        .iter()
                        .map(|m| vec![m.label.clone(), m.value.clone()])
                        .collect(),
                };
                docx = docx.add_table(grid_table(&grid, styling));
            }
            RenderedSection::Chart { grid, .. } => {
                if !grid.rows.is_empty() {
                    docx = docx.add_table(grid_table(grid, styling));
                }
            }
            RenderedSection::Table {
                grid, truncated, ..
            } => {
                if !grid.rows.is_empty() {
                    docx = docx.add_table(grid_table(grid, styling));
                }
                if *truncated {
                    docx = docx.add_paragraph(body_paragraph(
                        &format!("Showing the first {} rows.", grid.rows.len()),
                        styling,
                    ));
                }
            }
            RenderedSection::Insights { items, .. }
            | RenderedSection::Recommendations { items, .. } => {
                if items.is_empty() {
                    docx = docx.add_paragraph(body_paragraph("None.", styling));
                }
                for item in items {
                    docx = docx.add_paragraph(bullet_paragraph(item, styling));
                }
            }
            RenderedSection::Text { content, .. } => {
                for line in content.lines() {
                    docx = docx.add_paragraph(body_paragraph(line, styling));
                }
            }
        }
    }

    if let Some(footer) = &view.branding.footer_text {
        docx = docx.add_paragraph(Paragraph::new());
        docx = docx.add_paragraph(
            Paragraph::new()
                .align(AlignmentType::Center)
                .add_run(text_run(footer, styling).italic()),
        );
    }

    let mut buf = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut buf)
        .map_err(|e| GenerationError::Document(e.to_string()))?;

    Ok(buf.into_inner())
}

fn header_rows(view: &DocumentView) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["Report".to_string(), view.report.name.clone()],
        vec!["Type".to_string(), view.report.report_type.clone()],
        vec!["Generated".to_string(), view.report.generated_at.clone()],
    ];
    if let Some(period) = &view.report.period {
        rows.push(vec!["Period".to_string(), period.clone()]);
    }
    rows
}

fn heading_style(style_id: &str, name: &str, size_pt: usize) -> Style {
    Style::new(style_id, StyleType::Paragraph)
        .name(name)
        .size(size_pt * 2) // half-points
}

/// OOXML colors carry no leading `#`.
fn docx_color(color: &str) -> String {
    color.trim_start_matches('#').to_string()
}

fn text_run(text: &str, styling: &Styling) -> Run {
    Run::new()
        .add_text(text)
        .size(styling.font_size as usize * 2)
        .fonts(RunFonts::new().ascii(&styling.font_family))
}

fn heading_paragraph(text: &str, style_id: &str, styling: &Styling) -> Paragraph {
    Paragraph::new().style(style_id).add_run(
        Run::new()
            .add_text(text)
            .bold()
            .color(docx_color(&styling.primary_color))
            .fonts(RunFonts::new().ascii(&styling.heading_font)),
    )
}

fn body_paragraph(text: &str, styling: &Styling) -> Paragraph {
    Paragraph::new()
        .align(AlignmentType::Left)
        .add_run(text_run(text, styling))
}

fn bullet_paragraph(text: &str, styling: &Styling) -> Paragraph {
    Paragraph::new()
        .align(AlignmentType::Left)
        .add_run(text_run("\u{2022} ", styling))
        .add_run(text_run(text, styling))
}

fn grid_table(grid: &GridView, styling: &Styling) -> Table {
    let header = TableRow::new(
        grid.columns
            .iter()
            .map(|column| {
                TableCell::new().add_paragraph(
                    Paragraph::new().add_run(
                        text_run(column, styling)
                            .bold()
                            .color(docx_color(&styling.secondary_color)),
                    ),
                )
            })
            .collect(),
    );

    let mut rows = vec![header];
    rows.extend(grid.rows.iter().map(|row| {
        TableRow::new(
            row.iter()
                .map(|cell| {
                    TableCell::new().add_paragraph(Paragraph::new().add_run(text_run(cell, styling)))
                })
                .collect(),
        )
    }));

    Table::new(rows)
}
