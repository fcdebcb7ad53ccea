use std::collections::HashMap;

use tera::{Context, Tera, Value};

use super::GenerationError;
use super::layout::DocumentView;

pub const MARKDOWN_TEMPLATE: &str = "report.md";
/// The `.html` suffix turns on Tera's autoescaping for this template.
pub const HTML_TEMPLATE: &str = "report.html";

/// Compiles the bundled document templates once.
pub fn build_engine() -> Result<Tera, GenerationError> {
    let mut tera = Tera::default();
    tera.register_filter("md_cell", md_cell);
    tera.add_raw_templates(vec![
        (
            MARKDOWN_TEMPLATE,
            include_str!("../../templates/report.md.tera"),
        ),
        (HTML_TEMPLATE, include_str!("../../templates/report.html.tera")),
    ])
    .map_err(|e| GenerationError::Template(e.to_string()))?;
    Ok(tera)
}

#[tracing::instrument(name = "render.markup", skip(tera, view))]
pub fn render_markup(
    tera: &Tera,
    template_name: &str,
    view: &DocumentView,
) -> Result<Vec<u8>, GenerationError> {
    let context = Context::from_serialize(view)?;
    let rendered = tera.render(template_name, &context)?;
    Ok(rendered.into_bytes())
}

/// Keeps a value inside one Markdown table cell.
fn md_cell(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    let escaped = text
        .replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\n', '\r'], "<br>");
    Ok(Value::String(escaped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md_cell_escapes_pipes_and_newlines() {
        let value = md_cell(&Value::String("a|b\nc".to_string()), &HashMap::new()).unwrap();
        assert_eq!(value, Value::String("a\\|b<br>c".to_string()));
    }

    #[test]
    fn test_engine_compiles_bundled_templates() {
        let tera = build_engine().unwrap();
        let names: Vec<&str> = tera.get_template_names().collect();
        assert!(names.contains(&MARKDOWN_TEMPLATE));
        assert!(names.contains(&HTML_TEMPLATE));
    }
}
