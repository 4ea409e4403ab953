use crate::payload::schema::PayloadSchema;
use serde_json::{Map, Value};

/// Trim and drop control characters (newlines and tabs become spaces).
pub fn clean_text(raw: &str) -> String {
    raw.chars()
        .map(|c| if c == '\n' || c == '\t' || c == '\r' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "yes".to_string(),
        Value::Bool(false) => "no".to_string(),
        Value::Array(items) => items.iter().map(display).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// `<dl>` of the accepted fields, in schema order, every value escaped.
pub fn render_definition_list(schema: &PayloadSchema, data: &Map<String, Value>) -> String {
    let mut html = String::from("<dl>");
    for spec in schema.fields() {
        if let Some(value) = data.get(spec.name) {
            html.push_str(&format!(
                "<dt>{}</dt><dd>{}</dd>",
                escape_html(spec.label),
                escape_html(&display(value))
            ));
        }
    }
    html.push_str("</dl>");
    html
}
