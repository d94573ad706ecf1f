use crate::driver::Driver;
use crate::error::VqResult;
use crate::executor::QueryExecutor;
use crate::formatter::OutputFormat;
use crate::input::{Input, LineSource};
use colored::*;
use std::io::Write;
use tracing::debug;

pub const INPUT_REQUEST: &str = "Enter query (type 'exit' to finish program):";
pub const EXIT_COMMAND: &str = "exit";
const PROMPT: &str = "vqrs> ";

/// The interactive session: the connection, where answers come from and
/// where results go.
pub struct Repl<D: Driver, L: LineSource, W: Write> {
    executor: QueryExecutor<D>,
    input: L,
    out: W,
    output_format: OutputFormat,
}

impl<D: Driver, L: LineSource, W: Write> Repl<D, L, W> {
    pub fn new(executor: QueryExecutor<D>, input: L, out: W, output_format: OutputFormat) -> Self {
        Self {
            executor,
            input,
            out,
            output_format,
        }
    }

    pub fn executor_mut(&mut self) -> &mut QueryExecutor<D> {
        &mut self.executor
    }

    /// Read the next non-blank line, untrimmed apart from the line
    /// terminator. `None` at end of input.
    fn next_command(&mut self) -> VqResult<Option<String>> {
        loop {
            match self.input.read_line(PROMPT)? {
                Input::Line(line) => {
                    if !line.trim().is_empty() {
                        return Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()));
                    }
                }
                Input::Interrupted => writeln!(self.out, "{}", "^C".yellow())?,
                Input::Eof => return Ok(None),
            }
        }
    }

    pub fn run(&mut self) -> VqResult<()> {
        writeln!(self.out, "{}", "=== vqrs ===".bright_cyan().bold())?;
        writeln!(
            self.out,
            "{}",
            "Type '\\help' for available commands, 'exit' to quit.".bright_black()
        )?;

        loop {
            writeln!(self.out)?;
            writeln!(self.out, "{}", INPUT_REQUEST)?;
            self.out.flush()?;

            let Some(line) = self.next_command()? else {
                break;
            };
            // Only the exact word ends the session; padded variants go to the server.
            if line == EXIT_COMMAND {
                break;
            }
            let line = line.trim();
            self.input.remember(line);

            if let Some(command) = line.strip_prefix('\\') {
                self.handle_meta_command(command)?;
                continue;
            }

            match self.executor.execute_and_page(
                line,
                &mut self.input,
                &mut self.out,
                self.output_format,
            ) {
                Ok(Some(summary)) => debug!(
                    "Fetched {} rows in {} batches (end of results: {})",
                    summary.rows_fetched, summary.batches, summary.reached_end
                ),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
            }
        }

        writeln!(self.out, "{}", "Goodbye!".bright_cyan())?;
        self.input.finish();
        Ok(())
    }

    fn handle_meta_command(&mut self, command: &str) -> VqResult<()> {
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match name {
            "help" | "?" => self.print_help()?,
            "format" => match arg.parse::<OutputFormat>() {
                Ok(format) => {
                    self.output_format = format;
                    writeln!(self.out, "Output format set to: {}", arg.cyan())?;
                }
                Err(e) => writeln!(self.out, "{} {}", "Error:".red().bold(), e)?,
            },
            "status" => {
                let connection = self.executor.connection();
                let state = if connection.is_connected() {
                    "connected".green()
                } else {
                    "disconnected".red()
                };
                writeln!(self.out, "{} ({})", connection.config().display_url(), state)?;
                writeln!(
                    self.out,
                    "Cursor mode: {:?}, output format: {:?}",
                    connection.config().cursor_mode,
                    self.output_format
                )?;
            }
            other => writeln!(
                self.out,
                "Unknown command '\\{}'. Type '\\help' for available commands.",
                other
            )?,
        }
        Ok(())
    }

    fn print_help(&mut self) -> VqResult<()> {
        let out = &mut self.out;
        writeln!(out, "{}", "=== Available Commands ===".bright_cyan().bold())?;
        writeln!(out, "  {}           - Exit the program", "exit".green())?;
        writeln!(out, "  {}          - Show this help message", "\\help".green())?;
        writeln!(out, "  {} - Change output format (table, box, json, csv)", "\\format <fmt>".green())?;
        writeln!(out, "  {}        - Show connection status", "\\status".green())?;
        writeln!(out)?;
        writeln!(out, "{}", "=== Queries ===".bright_cyan().bold())?;
        writeln!(out, "  Any other line is sent to the database as one statement.")?;
        writeln!(out, "  Results are paged: choose rows to skip (scroll cursors only),")?;
        writeln!(out, "  then how many rows to fetch, or {} to finish.", "-1".yellow())?;
        writeln!(out, "  Table output cuts long values to the column width; use")?;
        writeln!(out, "  {} or {} to see them in full.", "\\format csv".green(), "\\format json".green())?;
        writeln!(out)?;
        Ok(())
    }
}
