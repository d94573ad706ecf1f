//! Driver adapter interface.
//!
//! The REPL only ever talks to a [`Driver`] and the [`ResultCursor`]s it hands
//! out, so the wire driver is chosen at compile time instead of being looked up
//! by name at runtime.

use crate::connection::ConnectionConfig;
use crate::error::VqResult;

/// Column metadata as reported by the result description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub label: String,
    /// Rendering width hint for the column.
    pub display_width: usize,
}

impl ColumnInfo {
    pub fn new(label: impl Into<String>, display_width: usize) -> Self {
        Self {
            label: label.into(),
            display_width,
        }
    }
}

/// One fetched row, each cell already rendered to text. `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayRow {
    pub cells: Vec<Option<String>>,
}

impl DisplayRow {
    pub fn new(cells: Vec<Option<String>>) -> Self {
        Self { cells }
    }
}

/// How the driver exposes result rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CursorMode {
    /// Portal based, rows stream forward only.
    #[default]
    Forward,
    /// Server-side scrollable cursor, supports relative moves.
    Scroll,
}

/// A live result set positioned somewhere between "before first" and "after last".
pub trait ResultCursor {
    fn columns(&self) -> &[ColumnInfo];

    /// Whether [`ResultCursor::relative`] may be called.
    fn supports_relative(&self) -> bool;

    /// Move the cursor by `offset` rows. Returns `true` when the cursor ends up
    /// on a row, `false` when it lands before the first or after the last row.
    fn relative(&mut self, offset: i64) -> VqResult<bool>;

    /// Advance to the next row and return it, or `None` once past the last row.
    fn next_row(&mut self) -> VqResult<Option<DisplayRow>>;

    /// `true` when no row follows the current position. Does not move the cursor.
    fn at_end(&mut self) -> VqResult<bool>;

    /// Release the cursor and whatever server resources it holds.
    fn close(self: Box<Self>) -> VqResult<()>;
}

/// What running a statement produced.
pub enum QueryOutcome<'a> {
    Rows(Box<dyn ResultCursor + 'a>),
    /// Statement returned no columns (DDL, DML); carries the affected row count.
    Affected(u64),
}

pub trait Driver {
    fn name(&self) -> &'static str;

    fn connect(&mut self, config: &ConnectionConfig) -> VqResult<()>;

    fn is_connected(&self) -> bool;

    fn execute<'a>(&'a mut self, statement: &str) -> VqResult<QueryOutcome<'a>>;

    /// Close the handle. Closing an already closed driver is a no-op.
    fn close(&mut self) -> VqResult<()>;
}

#[cfg(test)]
pub mod memory {
    //! In-memory driver used by the paginator and REPL tests.

    use super::*;
    use crate::error::VqError;
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Debug, Clone, Default)]
    pub struct Tally {
        pub closed: Rc<Cell<usize>>,
        pub fetched: Rc<Cell<usize>>,
        pub moves: Rc<Cell<usize>>,
    }

    pub struct MemoryCursor {
        columns: Vec<ColumnInfo>,
        rows: Vec<DisplayRow>,
        scrollable: bool,
        // -1 is before the first row, rows.len() is after the last
        position: i64,
        tally: Tally,
    }

    impl MemoryCursor {
        pub fn new(
            columns: Vec<ColumnInfo>,
            rows: Vec<DisplayRow>,
            scrollable: bool,
            tally: Tally,
        ) -> Self {
            Self {
                columns,
                rows,
                scrollable,
                position: -1,
                tally,
            }
        }

        fn len(&self) -> i64 {
            self.rows.len() as i64
        }
    }

    impl ResultCursor for MemoryCursor {
        fn columns(&self) -> &[ColumnInfo] {
            &self.columns
        }

        fn supports_relative(&self) -> bool {
            self.scrollable
        }

        fn relative(&mut self, offset: i64) -> VqResult<bool> {
            if !self.scrollable {
                return Err(VqError::CursorError("cursor is forward only".into()));
            }
            self.tally.moves.set(self.tally.moves.get() + 1);
            self.position = (self.position + offset).clamp(-1, self.len());
            Ok(self.position >= 0 && self.position < self.len())
        }

        fn next_row(&mut self) -> VqResult<Option<DisplayRow>> {
            if self.position + 1 < self.len() {
                self.position += 1;
                self.tally.fetched.set(self.tally.fetched.get() + 1);
                Ok(Some(self.rows[self.position as usize].clone()))
            } else {
                self.position = self.len();
                Ok(None)
            }
        }

        fn at_end(&mut self) -> VqResult<bool> {
            Ok(self.position + 1 >= self.len())
        }

        fn close(self: Box<Self>) -> VqResult<()> {
            self.tally.closed.set(self.tally.closed.get() + 1);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MemoryDriver {
        pub mode: CursorMode,
        pub connected: bool,
        pub executed: Vec<String>,
        pub tally: Tally,
        results: HashMap<String, (Vec<ColumnInfo>, Vec<DisplayRow>)>,
    }

    impl MemoryDriver {
        pub fn new(mode: CursorMode) -> Self {
            Self {
                mode,
                ..Default::default()
            }
        }

        pub fn with_result(
            mut self,
            statement: &str,
            columns: Vec<ColumnInfo>,
            rows: Vec<DisplayRow>,
        ) -> Self {
            self.results.insert(statement.to_string(), (columns, rows));
            self
        }

        /// Single `id` column holding `1..=count`.
        pub fn with_numbers(self, statement: &str, count: usize) -> Self {
            let rows = (1..=count)
                .map(|i| DisplayRow::new(vec![Some(i.to_string())]))
                .collect();
            self.with_result(statement, vec![ColumnInfo::new("id", 4)], rows)
        }
    }

    impl Driver for MemoryDriver {
        fn name(&self) -> &'static str {
            "memory"
        }

        fn connect(&mut self, config: &ConnectionConfig) -> VqResult<()> {
            if config.url.contains("unreachable") {
                return Err(VqError::IoError(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }
            self.connected = true;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn execute<'a>(&'a mut self, statement: &str) -> VqResult<QueryOutcome<'a>> {
            self.executed.push(statement.to_string());
            if let Some((columns, rows)) = self.results.get(statement) {
                let cursor = MemoryCursor::new(
                    columns.clone(),
                    rows.clone(),
                    self.mode == CursorMode::Scroll,
                    self.tally.clone(),
                );
                return Ok(QueryOutcome::Rows(Box::new(cursor)));
            }
            let upper = statement.to_uppercase();
            if upper.starts_with("INSERT") || upper.starts_with("CREATE") {
                return Ok(QueryOutcome::Affected(1));
            }
            Err(VqError::QueryError(format!(
                "syntax error at or near \"{}\"",
                statement.split_whitespace().next().unwrap_or_default()
            )))
        }

        fn close(&mut self) -> VqResult<()> {
            self.connected = false;
            Ok(())
        }
    }

    mod tests {
        use super::*;
        use rstest::rstest;

        fn numbers(count: usize, scrollable: bool) -> MemoryCursor {
            let rows = (1..=count)
                .map(|i| DisplayRow::new(vec![Some(i.to_string())]))
                .collect();
            MemoryCursor::new(
                vec![ColumnInfo::new("n", 4)],
                rows,
                scrollable,
                Tally::default(),
            )
        }

        #[rstest]
        fn test_at_end_on_empty_cursor() {
            let mut cursor = numbers(0, false);
            assert!(cursor.at_end().unwrap());
            assert_eq!(cursor.next_row().unwrap(), None);
        }

        #[rstest]
        fn test_relative_reports_landing_on_row() {
            let mut cursor = numbers(5, true);
            assert!(cursor.relative(2).unwrap());
            assert_eq!(
                cursor.next_row().unwrap(),
                Some(DisplayRow::new(vec![Some("3".into())]))
            );
            assert!(!cursor.relative(10).unwrap());
            assert!(cursor.at_end().unwrap());
        }
    }
}
