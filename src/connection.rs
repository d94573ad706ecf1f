use crate::driver::{CursorMode, Driver};
use crate::error::{VqError, VqResult};
use tracing::{debug, info};

/// Default port of the Vertica client protocol.
pub const VERTICA_DEFAULT_PORT: u16 = 5433;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub cursor_mode: CursorMode,
    /// Rows requested per round trip. Small values get the first rows on
    /// screen sooner instead of buffering the whole result.
    pub fetch_size: usize,
    /// Display width used for text columns without a natural width.
    pub text_width: usize,
    pub ssl_enabled: bool,
    pub ssl_ca_cert: Option<String>,
    pub ssl_verify: bool,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            cursor_mode: CursorMode::Forward,
            fetch_size: 256,
            text_width: 32,
            ssl_enabled: false,
            ssl_ca_cert: None,
            ssl_verify: false,
        }
    }

    /// The URL as it may be shown to the user: passwords are masked.
    pub fn display_url(&self) -> String {
        redact_url(&self.url)
    }

    /// Build the wire-level connection settings from the URL and the
    /// credentials given on the command line.
    pub fn pg_config(&self) -> VqResult<postgres::Config> {
        let (url, vertica) = normalize_url(&self.url);
        let mut config: postgres::Config = url
            .parse()
            .map_err(|e| {
                VqError::ConfigError(format!(
                    "Invalid connection URL '{}': {}",
                    self.display_url(),
                    e
                ))
            })?;

        if vertica && config.get_ports().is_empty() {
            config.port(VERTICA_DEFAULT_PORT);
        }
        if let Some(username) = &self.username {
            config.user(username);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        if config.get_application_name().is_none() {
            config.application_name("vqrs");
        }

        Ok(config)
    }
}

const REDACTED: &str = "****";

/// The URL with any password masked, for logs and status output.
pub fn redact_url(url: &str) -> String {
    let url = url.trim();
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, tail) = rest.split_at(rest.find(['/', '?']).unwrap_or(rest.len()));
            let authority = match authority.rsplit_once('@') {
                Some((userinfo, host)) => match userinfo.split_once(':') {
                    Some((user, _)) => format!("{}:{}@{}", user, REDACTED, host),
                    None => authority.to_string(),
                },
                None => authority.to_string(),
            };
            let tail = match tail.split_once('?') {
                Some((path, query)) => {
                    let params: Vec<String> = query
                        .split('&')
                        .map(|param| match param.split_once('=') {
                            Some(("password", _)) => format!("password={}", REDACTED),
                            _ => param.to_string(),
                        })
                        .collect();
                    format!("{}?{}", path, params.join("&"))
                }
                None => tail.to_string(),
            };
            format!("{}://{}{}", scheme, authority, tail)
        }
        None => redact_key_value(url),
    }
}

/// Mask the value of `password=` in a `key=value` connection string. Quoted
/// values may contain spaces and `\'` escapes.
fn redact_key_value(conninfo: &str) -> String {
    let mut out = String::with_capacity(conninfo.len());
    let mut rest = conninfo;
    while let Some(pos) = rest.find("password") {
        let at_word_start = rest[..pos]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        let after = &rest[pos + "password".len()..];
        let value = after.trim_start();
        let Some(value) = value.strip_prefix('=').filter(|_| at_word_start) else {
            out.push_str(&rest[..pos + "password".len()]);
            rest = after;
            continue;
        };
        let value = value.trim_start();
        out.push_str(&rest[..pos]);
        out.push_str("password=");
        out.push_str(REDACTED);

        let end = if let Some(quoted) = value.strip_prefix('\'') {
            let mut escaped = false;
            let close = quoted.char_indices().find(|&(_, c)| {
                let hit = c == '\'' && !escaped;
                escaped = c == '\\' && !escaped;
                hit
            });
            close.map_or(value.len(), |(i, _)| i + 2)
        } else {
            value.find(char::is_whitespace).unwrap_or(value.len())
        };
        rest = &value[end..];
    }
    out.push_str(rest);
    out
}

/// Strip a `jdbc:` prefix and map the `vertica://` scheme onto the PostgreSQL
/// wire scheme. The flag tells whether the URL named Vertica.
pub fn normalize_url(url: &str) -> (String, bool) {
    let url = url.trim();
    let url = url.strip_prefix("jdbc:").unwrap_or(url);
    match url.strip_prefix("vertica://") {
        Some(rest) => (format!("postgresql://{}", rest), true),
        None => (url.to_string(), false),
    }
}

/// Owns the database handle for the lifetime of the session.
pub struct ConnectionManager<D: Driver> {
    driver: D,
    config: ConnectionConfig,
}

impl<D: Driver> ConnectionManager<D> {
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        Self { driver, config }
    }

    pub fn connect(&mut self) -> VqResult<()> {
        info!(
            "Connecting to {} with the {} driver",
            self.config.display_url(),
            self.driver.name()
        );
        debug!(
            "Cursor mode {:?}, fetch size {} rows",
            self.config.cursor_mode, self.config.fetch_size
        );

        self.driver.connect(&self.config).map_err(|e| match e {
            VqError::ConnectionError(_) | VqError::ConfigError(_) => e,
            other => VqError::ConnectionError(format!(
                "Failed to connect to {}\n\nPossible causes:\n\
                1. The database is not running\n\
                2. Wrong host/port in the connection URL\n\
                3. SSL/TLS mismatch (SSL enabled: {})\n\
                4. Authentication rejected\n\n\
                Original error: {}",
                self.config.display_url(), self.config.ssl_enabled, other
            )),
        })?;

        info!("Successfully connected");
        Ok(())
    }

    pub fn disconnect(&mut self) -> VqResult<()> {
        if self.driver.is_connected() {
            debug!("Disconnecting from datasource...");
            self.driver.close()?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.driver.is_connected()
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}
