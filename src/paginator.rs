//! User-driven traversal of a result cursor.
//!
//! Each cycle offers a relative skip, asks how many rows to fetch, then
//! prints that many rows. The cycle ends when the user stops or the cursor
//! runs out of rows; the cursor is closed either way.

use crate::driver::{ColumnInfo, ResultCursor};
use crate::error::{VqError, VqResult};
use crate::formatter::{BatchPrinter, OutputFormat};
use crate::input::{Input, LineSource};
use colored::*;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, warn};

pub const ROW_COUNT_REQUEST: &str = "Enter number of rows to fetch (type '-1' to finish):";
pub const ROW_SKIP_REQUEST: &str = "Enter number of rows to skip:";
pub const FORWARD_ONLY_NOTICE: &str = "Result set supports forward only cursor";
pub const END_OF_RESULTS_NOTICE: &str = "No more rows..";
const ANSWER_PROMPT: &str = "> ";

/// Answer to the row count prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationCommand {
    Continue { rows: usize },
    Stop,
}

impl std::str::FromStr for PaginationCommand {
    type Err = VqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-1" => Ok(PaginationCommand::Stop),
            other => other
                .parse::<usize>()
                .map(|rows| PaginationCommand::Continue { rows })
                .map_err(|_| {
                    VqError::InvalidInput(format!(
                        "'{}' is not a row count; enter a number or -1 to finish",
                        other
                    ))
                }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingSkipInput,
    AwaitingFetchCount,
    Fetching { rows: usize },
    EndOfResults,
    Stopped,
}

/// What happened while paging through one result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSummary {
    pub rows_fetched: usize,
    pub batches: usize,
    pub reached_end: bool,
}

pub struct Paginator<'p, L: LineSource, W: Write> {
    input: &'p mut L,
    out: &'p mut W,
    format: OutputFormat,
}

impl<'p, L: LineSource, W: Write> Paginator<'p, L, W> {
    pub fn new(input: &'p mut L, out: &'p mut W, format: OutputFormat) -> Self {
        Self { input, out, format }
    }

    /// Page through `cursor` until the user stops or the rows run out.
    pub fn run(&mut self, mut cursor: Box<dyn ResultCursor + '_>) -> VqResult<PageSummary> {
        debug!("Retrieved result set.");
        let paged = self.drive(cursor.as_mut());
        let closed = cursor.close();
        writeln!(self.out)?;

        let summary = paged?;
        closed?;
        debug!(
            "Paging finished: {} rows in {} batches",
            summary.rows_fetched, summary.batches
        );
        Ok(summary)
    }

    fn drive(&mut self, cursor: &mut dyn ResultCursor) -> VqResult<PageSummary> {
        writeln!(self.out, "Result set retrieved, extracting meta information...")?;
        let columns = cursor.columns().to_vec();
        let mut summary = PageSummary::default();
        let mut state = State::AwaitingSkipInput;

        loop {
            state = match state {
                State::AwaitingSkipInput => {
                    self.skip(cursor)?;
                    State::AwaitingFetchCount
                }
                State::AwaitingFetchCount => match self.read_command()? {
                    PaginationCommand::Stop => State::Stopped,
                    PaginationCommand::Continue { rows } => State::Fetching { rows },
                },
                State::Fetching { rows } => {
                    if self.fetch(cursor, &columns, rows, &mut summary)? {
                        State::EndOfResults
                    } else {
                        State::AwaitingSkipInput
                    }
                }
                State::EndOfResults => {
                    summary.reached_end = true;
                    break;
                }
                State::Stopped => break,
            };
        }

        Ok(summary)
    }

    fn ask(&mut self, request: &str) -> VqResult<Input> {
        writeln!(self.out)?;
        writeln!(self.out, "{}", request)?;
        self.out.flush()?;
        self.input.read_line(ANSWER_PROMPT)
    }

    /// Offer a relative move. Navigation problems are reported, never raised.
    fn skip(&mut self, cursor: &mut dyn ResultCursor) -> VqResult<()> {
        if !cursor.supports_relative() {
            writeln!(self.out, "{}", FORWARD_ONLY_NOTICE)?;
            writeln!(self.out)?;
            return Ok(());
        }

        let offset = loop {
            match self.ask(ROW_SKIP_REQUEST)? {
                Input::Line(line) if line.trim().is_empty() => break 0,
                Input::Line(line) => match line.trim().parse::<i64>() {
                    Ok(offset) => break offset,
                    Err(_) => {
                        writeln!(self.out, "'{}' is not a row offset", line.trim())?;
                    }
                },
                Input::Interrupted | Input::Eof => break 0,
            }
        };

        if offset != 0 {
            match cursor.relative(offset) {
                Ok(true) => writeln!(self.out, "Cursor moved {} rows", offset)?,
                Ok(false) => writeln!(self.out, "Cursor not moved")?,
                Err(e) => {
                    warn!("Relative move by {} failed: {}", offset, e);
                    writeln!(self.out, "Cursor not moved: {}", e)?;
                }
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn read_command(&mut self) -> VqResult<PaginationCommand> {
        loop {
            match self.ask(ROW_COUNT_REQUEST)? {
                Input::Line(line) => match line.parse::<PaginationCommand>() {
                    Ok(command) => return Ok(command),
                    Err(e) => writeln!(self.out, "{}", e.to_string().yellow())?,
                },
                Input::Interrupted | Input::Eof => return Ok(PaginationCommand::Stop),
            }
        }
    }

    /// Print up to `rows` rows. Returns `true` once the cursor has no rows left.
    fn fetch(
        &mut self,
        cursor: &mut dyn ResultCursor,
        columns: &[ColumnInfo],
        rows: usize,
        summary: &mut PageSummary,
    ) -> VqResult<bool> {
        let start = Instant::now();
        let mut printer = BatchPrinter::new(self.format, columns);
        printer.begin(self.out)?;

        let mut exhausted = false;
        for _ in 0..rows {
            match cursor.next_row()? {
                Some(row) => {
                    printer.row(self.out, row)?;
                    if cursor.at_end()? {
                        exhausted = true;
                        break;
                    }
                }
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        summary.rows_fetched += printer.printed();
        summary.batches += 1;
        printer.finish(self.out)?;

        let ended = exhausted || cursor.at_end()?;
        if ended {
            writeln!(self.out, "{}", END_OF_RESULTS_NOTICE.yellow())?;
        }
        debug!("Total return time (ms): {}", start.elapsed().as_millis());
        Ok(ended)
    }
}
