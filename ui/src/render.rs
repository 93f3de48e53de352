use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde_json::Value;

const COLUMNS_PREFIX: &str = "columns: ";

/// Renders `execute_query` output as a table; anything else is returned as is.
pub(crate) fn render_tool_output(content: &str) -> String {
    let Some(rest) = content.strip_prefix(COLUMNS_PREFIX) else {
        return content.trim_end().to_string();
    };

    let mut lines = rest.lines();
    let header: Vec<&str> = lines
        .next()
        .map(|line| line.split(", ").collect())
        .unwrap_or_default();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);

    let mut footer = Vec::new();
    for line in lines {
        match serde_json::from_str::<Vec<Value>>(line) {
            Ok(row) => {
                table.add_row(row.iter().map(cell));
            }
            Err(_) => footer.push(line),
        }
    }

    let mut out = table.to_string();
    for line in footer {
        out.push('\n');
        out.push_str(line);
    }
    out
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
