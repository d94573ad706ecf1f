use crate::error::VqResult;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Context, Editor, Result as RustylineResult};
use rustyline_derive::{Helper, Highlighter, Hinter, Validator};
use std::path::PathBuf;
use tracing::debug;

const SQL_KEYWORDS: &[&str] = &[
    // DML
    "SELECT", "INSERT", "UPDATE", "DELETE", "MERGE", "COPY",
    "FROM", "WHERE", "SET", "VALUES", "INTO", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "ON",
    "ORDER BY", "GROUP BY", "HAVING", "LIMIT", "OFFSET", "UNION", "DISTINCT",
    // DDL
    "CREATE", "ALTER", "DROP", "TRUNCATE", "TABLE", "VIEW", "SCHEMA", "PROJECTION",
    "PARTITION BY", "SEGMENTED BY", "PRIMARY KEY",
    // Analytics
    "OVER", "WINDOW", "ROWS BETWEEN", "ANALYZE_STATISTICS", "EXPLAIN", "PROFILE",
    "COUNT", "SUM", "AVG", "MIN", "MAX", "APPROXIMATE_COUNT_DISTINCT",
    // Types
    "INTEGER", "BIGINT", "FLOAT", "NUMERIC", "BOOLEAN", "VARCHAR", "CHAR",
    "DATE", "TIME", "TIMESTAMP", "TIMESTAMPTZ", "INTERVAL", "UUID",
    // Other
    "AND", "OR", "NOT", "NULL", "IS", "IN", "LIKE", "BETWEEN", "CASE", "WHEN", "THEN",
    "ELSE", "END", "AS", "WITH", "BEGIN", "COMMIT", "ROLLBACK",
];

/// One read from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C
    Interrupted,
    /// Ctrl-D or end of the input stream
    Eof,
}

/// Where the REPL and the paginator read their answers from.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> VqResult<Input>;

    /// Record a line in the history. Only queries are worth remembering.
    fn remember(&mut self, _line: &str) {}

    /// Called once when the session ends.
    fn finish(&mut self) {}
}

/// SQL keyword completion
#[derive(Helper, Hinter, Highlighter, Validator)]
pub struct SqlHelper;

impl SqlHelper {
    fn completions(&self, line: &str, pos: usize) -> Vec<Pair> {
        let last_word = line[..pos].split_whitespace().last().unwrap_or("");
        if last_word.is_empty() || line[..pos].ends_with(char::is_whitespace) {
            return vec![];
        }

        let last_word_upper = last_word.to_uppercase();
        SQL_KEYWORDS
            .iter()
            .filter(|keyword| keyword.starts_with(&last_word_upper))
            .map(|keyword| Pair {
                display: keyword.to_string(),
                replacement: keyword.to_string(),
            })
            .collect()
    }
}

impl Completer for SqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> RustylineResult<(usize, Vec<Pair>)> {
        let start = line[..pos]
            .rfind(char::is_whitespace)
            .map(|i| i + 1)
            .unwrap_or(0);
        Ok((start, self.completions(line, pos)))
    }
}

/// Interactive terminal input with history and tab completion.
pub struct EditorInput {
    editor: Editor<SqlHelper, DefaultHistory>,
    history_file: Option<PathBuf>,
}

impl EditorInput {
    pub fn new() -> VqResult<Self> {
        let mut editor = Editor::<SqlHelper, DefaultHistory>::new()?;
        editor.set_helper(Some(SqlHelper));

        let history_file = dirs::home_dir().map(|mut p: PathBuf| {
            p.push(".vqrs_history");
            p
        });
        if let Some(ref path) = history_file {
            if editor.load_history(path).is_err() {
                debug!("No history loaded from {}", path.display());
            }
        }

        Ok(Self {
            editor,
            history_file,
        })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> VqResult<Input> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(e) => Err(e.into()),
        }
    }

    fn remember(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }

    fn finish(&mut self) {
        if let Some(ref path) = self.history_file {
            if let Err(e) = self.editor.save_history(path) {
                debug!("Failed to save history to {}: {}", path.display(), e);
            }
        }
    }
}
