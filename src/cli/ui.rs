use crate::core::metrics::{FieldValue, Metric};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Defines different styles for text elements.
pub enum StyleType {
    Title,
    Error,
    Subtle,
}

/// Applies a consistent style to a string.
pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Error => style(text).red(),
        StyleType::Subtle => style(text).dim(),
    };
    styled.to_string()
}

/// Creates a new `comfy_table::Table` with standard styling.
pub fn new_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Creates a styled header cell for a table.
pub fn header_cell(text: &str) -> Cell {
    Cell::new(text)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

/// Right-aligned numeric cell. Negative values are shown in red.
pub fn value_cell(value: FieldValue) -> Cell {
    let negative = match value {
        FieldValue::Int(i) => i < 0,
        FieldValue::Float(f) => f < 0.0,
    };
    let text = match value {
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(f) => format!("{f:.2}"),
    };
    let cell = Cell::new(text).set_alignment(CellAlignment::Right);
    if negative { cell.fg(Color::Red) } else { cell }
}

/// Renders metrics sharing one measurement as a table: one column per tag
/// and field, one row per metric.
pub fn metrics_table(metrics: &[&Metric]) -> Table {
    let mut table = new_styled_table();
    let Some(first) = metrics.first() else {
        return table;
    };

    let mut header: Vec<Cell> = first.tags.iter().map(|(k, _)| header_cell(k)).collect();
    header.extend(first.fields.iter().map(|(k, _)| header_cell(k)));
    table.set_header(header);

    for metric in metrics {
        let mut row: Vec<Cell> = metric.tags.iter().map(|(_, v)| Cell::new(v)).collect();
        row.extend(metric.fields.iter().map(|(_, v)| value_cell(*v)));
        table.add_row(row);
    }
    table
}

/// Creates a spinner for work of unknown length.
pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg} [{elapsed_precise}]")
    {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Prints a separator line matching the terminal width.
pub fn print_separator() {
    let term_width = console::Term::stdout()
        .size_checked()
        .map(|(_, w)| w as usize)
        .unwrap_or(80);
    println!("\n{}", "─".repeat(term_width));
}
