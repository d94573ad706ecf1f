use crate::driver::{ColumnInfo, DisplayRow};
use crate::error::{VqError, VqResult};
use prettytable::{format, Cell, Row, Table};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::io::Write;
use terminal_size::{terminal_size, Width};

/// Placeholder printed for SQL NULL in the fixed-width table.
pub const NULL_TEXT: &str = "NULL";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Fixed-width columns sized from the result metadata, streamed row by row
    #[default]
    Table,
    /// Boxed table fitted to the terminal, printed per batch
    Box,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = VqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "box" => Ok(OutputFormat::Box),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(VqError::InvalidInput(format!(
                "Unknown output format '{}' (expected table, box, json or csv)",
                other
            ))),
        }
    }
}

/// Get terminal width or default to 120
fn get_terminal_width() -> usize {
    terminal_size()
        .map(|(Width(w), _)| w as usize)
        .unwrap_or(120)
}

/// Truncate string to fit max width with ellipsis
fn truncate_str(s: &str, max_width: usize) -> String {
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        s.chars().take(max_width).collect()
    } else {
        let mut result: String = s.chars().take(max_width - 3).collect();
        result.push_str("...");
        result
    }
}

fn pad(s: &str, width: usize, fill: char) -> String {
    let mut out = s.to_string();
    out.extend(std::iter::repeat(fill).take(width.saturating_sub(s.chars().count())));
    out
}

/// Rendered width of a column: the display width, widened to fit the label.
pub fn column_width(column: &ColumnInfo) -> usize {
    column.display_width.max(column.label.chars().count())
}

/// `|-id--|name------|`
pub fn render_header(columns: &[ColumnInfo]) -> String {
    let mut line = String::from("|-");
    for column in columns {
        line.push_str(&pad(&column.label, column_width(column), '-'));
        line.push('|');
    }
    line
}

/// `| 1   |alice     |`. Values wider than the column are cut with `...`.
pub fn render_row(columns: &[ColumnInfo], row: &DisplayRow) -> String {
    let mut line = String::from("| ");
    for (i, column) in columns.iter().enumerate() {
        let width = column_width(column);
        let value = row.cells.get(i).cloned().flatten();
        let text = truncate_str(value.as_deref().unwrap_or(NULL_TEXT), width);
        line.push_str(&pad(&text, width, ' '));
        line.push('|');
    }
    line
}

/// Number of cells in `row` that `render_row` has to cut.
pub fn cut_cells(columns: &[ColumnInfo], row: &DisplayRow) -> usize {
    columns
        .iter()
        .enumerate()
        .filter(|(i, column)| {
            let value = row.cells.get(*i).and_then(|v| v.as_deref()).unwrap_or(NULL_TEXT);
            value.chars().count() > column_width(column)
        })
        .count()
}

/// Shown under a table batch that had to cut values.
pub fn truncation_notice(cut: usize) -> String {
    format!(
        "{} value(s) were cut to the column width. Use \\format csv or \\format json to see them in full.",
        cut
    )
}

#[derive(Serialize)]
struct JsonBatch<'a> {
    columns: Vec<&'a str>,
    rows: Vec<Map<String, JsonValue>>,
    count: usize,
}

/// Writes one fetched batch in the selected format. The fixed-width table is
/// written as rows arrive; the other formats are emitted when the batch ends.
pub struct BatchPrinter<'c> {
    format: OutputFormat,
    columns: &'c [ColumnInfo],
    pending: Vec<DisplayRow>,
    printed: usize,
    cut: usize,
}

impl<'c> BatchPrinter<'c> {
    pub fn new(format: OutputFormat, columns: &'c [ColumnInfo]) -> Self {
        Self {
            format,
            columns,
            pending: Vec::new(),
            printed: 0,
            cut: 0,
        }
    }

    pub fn begin<W: Write>(&mut self, out: &mut W) -> VqResult<()> {
        if self.format == OutputFormat::Table {
            writeln!(out)?;
            writeln!(out, "{}", render_header(self.columns))?;
        }
        Ok(())
    }

    pub fn row<W: Write>(&mut self, out: &mut W, row: DisplayRow) -> VqResult<()> {
        self.printed += 1;
        match self.format {
            OutputFormat::Table => {
                self.cut += cut_cells(self.columns, &row);
                writeln!(out, "{}", render_row(self.columns, &row))?;
            }
            _ => self.pending.push(row),
        }
        Ok(())
    }

    /// Number of rows handed to the printer so far.
    pub fn printed(&self) -> usize {
        self.printed
    }

    pub fn finish<W: Write>(self, out: &mut W) -> VqResult<()> {
        let text = match self.format {
            OutputFormat::Table if self.cut > 0 => {
                format!("{}\n", truncation_notice(self.cut))
            }
            OutputFormat::Table => String::new(),
            OutputFormat::Box => format_as_box(self.columns, &self.pending),
            OutputFormat::Json => format_as_json(self.columns, &self.pending)?,
            OutputFormat::Csv => format_as_csv(self.columns, &self.pending)?,
        };
        write!(out, "{}", text)?;
        writeln!(out)?;
        Ok(())
    }
}

fn format_as_box(columns: &[ColumnInfo], rows: &[DisplayRow]) -> String {
    let num_cols = columns.len();
    if num_cols == 0 {
        return "No columns in result\n".to_string();
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);

    // Account for table borders and padding: 3 chars per column (| x |) + 1 for final |
    let terminal_width = get_terminal_width();
    let border_overhead = (num_cols * 3) + 1;
    let available_width = terminal_width.saturating_sub(border_overhead).max(num_cols);
    let col_width = (available_width / num_cols).clamp(3, 50);

    let mut col_max_widths: Vec<usize> = columns
        .iter()
        .map(|c| c.label.chars().count().min(col_width))
        .collect();
    for row in rows {
        for (i, cell) in row.cells.iter().enumerate().take(num_cols) {
            let len = cell.as_deref().unwrap_or(NULL_TEXT).chars().count();
            col_max_widths[i] = col_max_widths[i].max(len.min(col_width));
        }
    }

    // Proportionally reduce all columns when they do not fit
    let total_width: usize = col_max_widths.iter().sum();
    if total_width > available_width {
        let scale = available_width as f64 / total_width as f64;
        for width in &mut col_max_widths {
            *width = ((*width as f64 * scale) as usize).max(3);
        }
    }

    let header_cells: Vec<Cell> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| Cell::new(&truncate_str(&c.label, col_max_widths[i])))
        .collect();
    table.add_row(Row::new(header_cells));

    for row in rows {
        let cells: Vec<Cell> = (0..num_cols)
            .map(|i| {
                let value = row.cells.get(i).cloned().flatten();
                Cell::new(&truncate_str(
                    value.as_deref().unwrap_or(NULL_TEXT),
                    col_max_widths[i],
                ))
            })
            .collect();
        table.add_row(Row::new(cells));
    }

    let mut output = table.to_string();
    output.push_str(&format!("{} row(s) returned\n", rows.len()));
    output
}

fn format_as_json(columns: &[ColumnInfo], rows: &[DisplayRow]) -> VqResult<String> {
    let json_rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let value = match row.cells.get(i).cloned().flatten() {
                        Some(text) => JsonValue::String(text),
                        None => JsonValue::Null,
                    };
                    (c.label.clone(), value)
                })
                .collect::<Map<_, _>>()
        })
        .collect();

    let batch = JsonBatch {
        columns: columns.iter().map(|c| c.label.as_str()).collect(),
        rows: json_rows,
        count: rows.len(),
    };
    let mut text = serde_json::to_string_pretty(&batch)?;
    text.push('\n');
    Ok(text)
}

fn format_as_csv(columns: &[ColumnInfo], rows: &[DisplayRow]) -> VqResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter().map(|c| c.label.as_str()))?;
    for row in rows {
        writer.write_record(
            (0..columns.len()).map(|i| row.cells.get(i).cloned().flatten().unwrap_or_default()),
        )?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| VqError::IoError(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| VqError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn columns() -> Vec<ColumnInfo> {
        vec![ColumnInfo::new("id", 4), ColumnInfo::new("name", 8)]
    }

    fn row(id: Option<&str>, name: Option<&str>) -> DisplayRow {
        DisplayRow::new(vec![id.map(String::from), name.map(String::from)])
    }

    #[rstest]
    fn test_header_pads_labels_with_dashes() {
        assert_eq!(render_header(&columns()), "|-id--|name----|");
    }

    #[rstest]
    fn test_row_pads_values_with_spaces() {
        assert_eq!(
            render_row(&columns(), &row(Some("7"), Some("alice"))),
            "| 7   |alice   |"
        );
    }

    #[rstest]
    fn test_null_renders_as_four_wide_placeholder() {
        let line = render_row(&columns(), &row(None, None));
        assert_eq!(line, "| NULL|NULL    |");
        assert_eq!(line.len(), render_header(&columns()).len());
    }

    #[rstest]
    #[case("id", 4, 4)]
    #[case("name", 4, 4)]
    #[case("customer_name", 4, 13)]
    fn test_column_width(#[case] label: &str, #[case] width: usize, #[case] expected: usize) {
        assert_eq!(column_width(&ColumnInfo::new(label, width)), expected);
    }

    #[rstest]
    fn test_long_label_keeps_alignment() {
        let cols = vec![ColumnInfo::new("customer_name", 4), ColumnInfo::new("x", 2)];
        let header = render_header(&cols);
        let line = render_row(&cols, &row(Some("bob"), Some("1")));
        assert_eq!(header, "|-customer_name|x-|");
        assert_eq!(line, "| bob          |1 |");
        assert_eq!(header.find("|x"), line.find("|1"));
    }

    #[rstest]
    fn test_long_value_is_truncated() {
        let line = render_row(&columns(), &row(Some("123456"), Some("bartholomew")));
        assert_eq!(line, "| 1...|barth...|");
    }

    #[rstest]
    fn test_cut_cells_counts_only_overflowing_values() {
        assert_eq!(cut_cells(&columns(), &row(Some("123456"), Some("bartholomew"))), 2);
        assert_eq!(cut_cells(&columns(), &row(Some("1234"), None)), 0);
    }

    #[rstest]
    fn test_table_batch_reports_cut_values() {
        let cols = columns();
        let mut out = Vec::new();
        let mut printer = BatchPrinter::new(OutputFormat::Table, &cols);
        printer.begin(&mut out).unwrap();
        printer.row(&mut out, row(Some("1"), Some("bartholomew"))).unwrap();
        printer.row(&mut out, row(Some("2"), Some("bo"))).unwrap();
        printer.finish(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("| 1   |barth...|\n"));
        assert!(text.ends_with(&format!("{}\n\n", truncation_notice(1))));
        assert!(text.contains("\\format csv"));
    }

    #[rstest]
    fn test_table_batch_streams_rows() {
        let cols = columns();
        let mut out = Vec::new();
        let mut printer = BatchPrinter::new(OutputFormat::Table, &cols);
        printer.begin(&mut out).unwrap();
        printer.row(&mut out, row(Some("1"), Some("a"))).unwrap();
        printer.row(&mut out, row(Some("2"), None)).unwrap();
        assert_eq!(printer.printed(), 2);
        printer.finish(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\n|-id--|name----|\n| 1   |a       |\n| 2   |NULL    |\n\n"
        );
    }

    #[rstest]
    fn test_json_batch() {
        let cols = columns();
        let text = format_as_json(&cols, &[row(Some("1"), None)]).unwrap();
        let parsed: JsonValue = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["rows"][0]["id"], "1");
        assert_eq!(parsed["rows"][0]["name"], JsonValue::Null);
    }

    #[rstest]
    fn test_csv_batch_quotes_values() {
        let cols = columns();
        let text = format_as_csv(&cols, &[row(Some("1"), Some("a,b")), row(Some("2"), None)]).unwrap();
        assert_eq!(text, "id,name\n1,\"a,b\"\n2,\n");
    }

    #[rstest]
    fn test_box_batch_reports_row_count() {
        let cols = columns();
        let text = format_as_box(&cols, &[row(Some("1"), Some("alice"))]);
        assert!(text.contains("alice"));
        assert!(text.ends_with("1 row(s) returned\n"));
    }

    #[rstest]
    #[case("TABLE", OutputFormat::Table)]
    #[case("box", OutputFormat::Box)]
    #[case(" json ", OutputFormat::Json)]
    #[case("csv", OutputFormat::Csv)]
    fn test_parse_format(#[case] input: &str, #[case] expected: OutputFormat) {
        assert_eq!(input.parse::<OutputFormat>().unwrap(), expected);
    }

    #[rstest]
    fn test_parse_unknown_format() {
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
