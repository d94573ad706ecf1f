//! PostgreSQL wire protocol adapter.
//!
//! Vertica and most columnar engines derived from PostgreSQL speak this
//! protocol. Forward mode streams rows through a bound portal; scroll mode
//! declares a `SCROLL CURSOR` so relative moves are possible.

use crate::connection::ConnectionConfig;
use crate::driver::{ColumnInfo, CursorMode, DisplayRow, Driver, QueryOutcome, ResultCursor};
use crate::error::{VqError, VqResult};
use crate::value::{cell_text, display_width};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres::{Client, NoTls, Portal, SimpleQueryMessage, Transaction};
use postgres_openssl::MakeTlsConnector;
use std::collections::VecDeque;
use tracing::{debug, info};

const CURSOR_NAME: &str = "vqrs_cursor";

fn query_error(e: postgres::Error) -> VqError {
    match e.as_db_error() {
        Some(db) => VqError::QueryError(db.to_string()),
        None => VqError::QueryError(e.to_string()),
    }
}

/// A short chunk means the portal has no more rows.
fn chunk_exhausted(received: usize, requested: usize) -> bool {
    received < requested
}

/// Whether a scroll cursor sits after the last row once `MOVE RELATIVE
/// offset` has run. A move that lands on no row ends up past the end going
/// forwards and before the start going backwards.
fn past_end_after_move(was_past_end: bool, offset: i64, on_row: bool) -> bool {
    match (on_row, offset.signum()) {
        (true, _) => false,
        (false, 1) => true,
        (false, -1) => false,
        (false, _) => was_past_end,
    }
}

/// Whether the look-ahead `FETCH FORWARD 1` found nothing to show next.
fn look_ahead_at_end(past_end: bool, fetched: Option<usize>) -> bool {
    past_end || fetched == Some(0)
}

pub struct PgDriver {
    client: Option<Client>,
    cursor_mode: CursorMode,
    fetch_size: usize,
    text_width: usize,
}

impl PgDriver {
    pub fn new() -> Self {
        Self {
            client: None,
            cursor_mode: CursorMode::Forward,
            fetch_size: 256,
            text_width: 32,
        }
    }

    /// Create a TLS connector with configurable certificate verification
    fn tls_connector(config: &ConnectionConfig) -> VqResult<MakeTlsConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;

        if config.ssl_verify {
            info!("SSL certificate verification enabled (SslVerifyMode::PEER)");
            builder.set_verify(SslVerifyMode::PEER);
        } else {
            info!("SSL certificate verification disabled (SslVerifyMode::NONE)");
            builder.set_verify(SslVerifyMode::NONE);
        }

        if let Some(ref ca_cert) = config.ssl_ca_cert {
            info!("Loading CA certificate from {}", ca_cert);
            builder.set_ca_file(ca_cert)?;
        }

        Ok(MakeTlsConnector::new(builder.build()))
    }

    fn declare_scroll_cursor<'a>(
        mut tx: Transaction<'a>,
        statement: &str,
        columns: Vec<ColumnInfo>,
    ) -> VqResult<ScrollCursor<'a>> {
        tx.batch_execute(&format!(
            "DECLARE {} SCROLL CURSOR FOR {}",
            CURSOR_NAME, statement
        ))
        .map_err(query_error)?;
        Ok(ScrollCursor {
            tx,
            columns,
            past_end: false,
        })
    }
}

impl Default for PgDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver for PgDriver {
    fn name(&self) -> &'static str {
        "postgres-wire"
    }

    fn connect(&mut self, config: &ConnectionConfig) -> VqResult<()> {
        let pg_config = config.pg_config()?;
        self.cursor_mode = config.cursor_mode;
        self.fetch_size = config.fetch_size.max(1);
        self.text_width = config.text_width;

        let client = if config.ssl_enabled {
            info!("SSL/TLS enabled with verification: {}", config.ssl_verify);
            pg_config.connect(Self::tls_connector(config)?)?
        } else {
            pg_config.connect(NoTls)?
        };

        // Rows are pulled in small chunks so the first page shows up
        // without waiting for the server to buffer the whole result.
        debug!("Portal fetch size set to {} rows", self.fetch_size);

        self.client = Some(client);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn execute<'a>(&'a mut self, statement: &str) -> VqResult<QueryOutcome<'a>> {
        let (mode, fetch_size, text_width) = (self.cursor_mode, self.fetch_size, self.text_width);
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| VqError::ConnectionError("Not connected".into()))?;

        let mut tx = client.transaction().map_err(query_error)?;
        let stmt = tx.prepare(statement).map_err(query_error)?;

        if stmt.columns().is_empty() {
            let affected = tx.execute(&stmt, &[]).map_err(query_error)?;
            tx.commit().map_err(query_error)?;
            return Ok(QueryOutcome::Affected(affected));
        }

        let columns: Vec<ColumnInfo> = stmt
            .columns()
            .iter()
            .map(|c| ColumnInfo::new(c.name(), display_width(c.type_(), text_width)))
            .collect();

        match mode {
            CursorMode::Forward => {
                let portal = tx.bind(&stmt, &[]).map_err(query_error)?;
                Ok(QueryOutcome::Rows(Box::new(PortalCursor {
                    tx,
                    portal,
                    columns,
                    buffer: VecDeque::new(),
                    exhausted: false,
                    fetch_size,
                })))
            }
            CursorMode::Scroll => {
                let cursor = Self::declare_scroll_cursor(tx, statement, columns)?;
                Ok(QueryOutcome::Rows(Box::new(cursor)))
            }
        }
    }

    fn close(&mut self) -> VqResult<()> {
        if let Some(client) = self.client.take() {
            client.close()?;
        }
        Ok(())
    }
}

/// Forward-only cursor over a bound portal.
struct PortalCursor<'a> {
    tx: Transaction<'a>,
    portal: Portal,
    columns: Vec<ColumnInfo>,
    buffer: VecDeque<DisplayRow>,
    exhausted: bool,
    fetch_size: usize,
}

impl PortalCursor<'_> {
    fn fill(&mut self) -> VqResult<()> {
        if !self.buffer.is_empty() || self.exhausted {
            return Ok(());
        }
        let max_rows = i32::try_from(self.fetch_size).unwrap_or(i32::MAX);
        let rows = self
            .tx
            .query_portal(&self.portal, max_rows)
            .map_err(query_error)?;
        debug!("Fetched {} rows from portal", rows.len());

        self.exhausted = chunk_exhausted(rows.len(), self.fetch_size);
        for row in &rows {
            let cells = (0..row.len())
                .map(|idx| cell_text(row, idx))
                .collect::<VqResult<Vec<_>>>()?;
            self.buffer.push_back(DisplayRow::new(cells));
        }
        Ok(())
    }
}

impl ResultCursor for PortalCursor<'_> {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn supports_relative(&self) -> bool {
        false
    }

    fn relative(&mut self, _offset: i64) -> VqResult<bool> {
        Err(VqError::CursorError("Result set supports forward only cursor".into()))
    }

    fn next_row(&mut self) -> VqResult<Option<DisplayRow>> {
        self.fill()?;
        Ok(self.buffer.pop_front())
    }

    fn at_end(&mut self) -> VqResult<bool> {
        self.fill()?;
        Ok(self.buffer.is_empty())
    }

    fn close(self: Box<Self>) -> VqResult<()> {
        let PortalCursor { tx, portal, .. } = *self;
        drop(portal);
        tx.commit().map_err(query_error)
    }
}

/// Scrollable server-side cursor. Values arrive in the server's text format.
struct ScrollCursor<'a> {
    tx: Transaction<'a>,
    columns: Vec<ColumnInfo>,
    // Positioned after the last row; a look-ahead from here must not step back.
    past_end: bool,
}

impl ScrollCursor<'_> {
    fn run(&mut self, command: &str) -> VqResult<(Vec<DisplayRow>, Vec<u64>)> {
        let messages = self.tx.simple_query(command).map_err(query_error)?;
        let mut rows = Vec::new();
        let mut counts = Vec::new();
        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    let cells = (0..row.len()).map(|i| row.get(i).map(str::to_string)).collect();
                    rows.push(DisplayRow::new(cells));
                }
                SimpleQueryMessage::CommandComplete(count) => counts.push(count),
                _ => {}
            }
        }
        Ok((rows, counts))
    }
}

impl ResultCursor for ScrollCursor<'_> {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn supports_relative(&self) -> bool {
        true
    }

    fn relative(&mut self, offset: i64) -> VqResult<bool> {
        let (_, counts) = self.run(&format!("MOVE RELATIVE {} IN {}", offset, CURSOR_NAME))?;
        let on_row = counts.first().copied() == Some(1);
        self.past_end = past_end_after_move(self.past_end, offset, on_row);
        Ok(on_row)
    }

    fn next_row(&mut self) -> VqResult<Option<DisplayRow>> {
        let (mut rows, _) = self.run(&format!("FETCH NEXT FROM {}", CURSOR_NAME))?;
        let row = rows.pop();
        self.past_end = row.is_none();
        Ok(row)
    }

    fn at_end(&mut self) -> VqResult<bool> {
        if look_ahead_at_end(self.past_end, None) {
            return Ok(true);
        }
        // Step back only after a row was read; from the last row a failed
        // fetch leaves the cursor past the end.
        let (rows, _) = self.run(&format!("FETCH FORWARD 1 FROM {}", CURSOR_NAME))?;
        if rows.is_empty() {
            self.past_end = true;
        } else {
            self.run(&format!("MOVE BACKWARD 1 IN {}", CURSOR_NAME))?;
        }
        Ok(look_ahead_at_end(self.past_end, Some(rows.len())))
    }

    fn close(self: Box<Self>) -> VqResult<()> {
        let mut tx = self.tx;
        tx.batch_execute(&format!("CLOSE {}", CURSOR_NAME))
            .map_err(query_error)?;
        tx.commit().map_err(query_error)
    }
}
