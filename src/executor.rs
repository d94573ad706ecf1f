use crate::connection::ConnectionManager;
use crate::driver::{Driver, QueryOutcome};
use crate::error::{VqError, VqResult};
use crate::formatter::OutputFormat;
use crate::input::LineSource;
use crate::paginator::{PageSummary, Paginator};
use colored::*;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, error};

pub struct QueryExecutor<D: Driver> {
    connection: ConnectionManager<D>,
}

/// Trim surrounding whitespace and trailing statement terminators.
pub fn normalize_statement(query: &str) -> &str {
    query.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

impl<D: Driver> QueryExecutor<D> {
    pub fn new(connection: ConnectionManager<D>) -> Self {
        Self { connection }
    }

    /// Run `query`. Returns `None` without contacting the server when there is
    /// no open connection.
    pub fn execute(&mut self, query: &str) -> VqResult<Option<QueryOutcome<'_>>> {
        if !self.connection.is_connected() {
            debug!("Cannot execute statement as the connection has been closed");
            return Ok(None);
        }

        let statement = normalize_statement(query);
        debug!("Executing statement: '{}'", statement);
        let start = Instant::now();

        let outcome = self
            .connection
            .driver_mut()
            .execute(statement)
            .map_err(|e| {
                error!("Query execution failed: {}", e);
                match e {
                    VqError::QueryError(_) => e,
                    other => VqError::QueryError(other.to_string()),
                }
            })?;

        debug!("Total execution time (ms): {}", start.elapsed().as_millis());
        Ok(Some(outcome))
    }

    /// Execute `query` and hand any result rows to the paginator.
    pub fn execute_and_page<L: LineSource, W: Write>(
        &mut self,
        query: &str,
        input: &mut L,
        out: &mut W,
        format: OutputFormat,
    ) -> VqResult<Option<PageSummary>> {
        match self.execute(query)? {
            None => {
                writeln!(out, "{}", "Not connected; statement not executed".yellow())?;
                Ok(None)
            }
            Some(QueryOutcome::Affected(count)) => {
                writeln!(out, "{} ({} row(s) affected)", "Statement executed".green(), count)?;
                Ok(None)
            }
            Some(QueryOutcome::Rows(cursor)) => {
                let summary = Paginator::new(input, out, format).run(cursor)?;
                Ok(Some(summary))
            }
        }
    }

    pub fn connection(&self) -> &ConnectionManager<D> {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut ConnectionManager<D> {
        &mut self.connection
    }
}
