use anyhow::Result;
use clap::Parser;
use crate::connection::{ConnectionConfig, ConnectionManager};
use crate::driver::CursorMode;
use crate::error::{VqError, VqResult};
use crate::executor::QueryExecutor;
use crate::formatter::OutputFormat;
use crate::input::EditorInput;
use crate::pg::PgDriver;
use crate::repl::Repl;
use std::io::Write;
use tracing::{debug, error};

#[derive(Parser, Debug)]
#[command(name = "vqrs")]
#[command(author = "Florian")]
#[command(version = "0.1.0")]
#[command(about = "An interactive paginating SQL client for columnar analytics databases", long_about = None)]
pub struct Cli {
    /// Connection URL: postgresql://, vertica://, jdbc:vertica:// or key=value pairs
    pub connection_url: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,

    #[arg(short = 'P', long)]
    pub password_prompt: bool,

    #[arg(short = 'm', long, value_enum, default_value = "forward")]
    pub cursor_mode: CursorMode,

    /// Rows requested from the server per round trip
    #[arg(long, default_value = "256")]
    pub fetch_size: usize,

    /// Display width for text columns
    #[arg(long, default_value = "32")]
    pub text_width: usize,

    /// table and box cut long values to fit; json and csv keep them whole
    #[arg(short, long, value_enum, default_value = "table")]
    pub output_format: OutputFormat,

    #[arg(short, long)]
    pub verbose: bool,

    #[arg(long)]
    pub ssl: bool,

    #[arg(long)]
    pub ssl_ca_cert: Option<String>,

    #[arg(long, default_value = "false")]
    pub ssl_verify: bool,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    pub fn connection_config(&self) -> VqResult<ConnectionConfig> {
        let url = self.connection_url.as_deref().ok_or_else(|| {
            VqError::ConfigError("You must include the connection URL".into())
        })?;
        if self.fetch_size == 0 {
            return Err(VqError::ConfigError("--fetch-size must be at least 1".into()));
        }

        let password = if self.password_prompt {
            if self.username.is_none() {
                eprintln!("Warning: Password prompt specified but no username provided");
                None
            } else {
                print!("Password: ");
                std::io::stdout().flush()?;
                Some(rpassword::read_password()?)
            }
        } else {
            self.password.clone()
        };

        Ok(ConnectionConfig {
            username: self.username.clone(),
            password,
            cursor_mode: self.cursor_mode,
            fetch_size: self.fetch_size,
            text_width: self.text_width,
            ssl_enabled: self.ssl,
            ssl_ca_cert: self.ssl_ca_cert.clone(),
            ssl_verify: self.ssl_verify,
            ..ConnectionConfig::new(url)
        })
    }

    pub fn execute(&self) -> Result<()> {
        let config = self.connection_config().inspect_err(|e| {
            error!("Cannot run program: {}", e);
        })?;

        let mut connection = ConnectionManager::new(PgDriver::new(), config);
        connection.connect().inspect_err(|e| error!("{}", e))?;

        let mut repl = Repl::new(
            QueryExecutor::new(connection),
            EditorInput::new()?,
            std::io::stdout(),
            self.output_format,
        );
        let session = repl.run();

        repl.executor_mut().connection_mut().disconnect()?;
        debug!("Disconnected.");

        session?;
        Ok(())
    }
}
