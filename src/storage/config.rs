use std::collections::BTreeMap;

use crate::core::{DbError, Result};

/// Default page size for batched deletes and index backfills.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Backend connection configuration
///
/// Only the logical pieces every backend understands; transport details
/// belong to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Logical database or file name
    pub database: String,

    /// Host, optionally `host:port`
    pub host: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Backend-specific hints
    pub options: BTreeMap<String, String>,

    /// Keep a log of every statement the engine runs
    pub diagnostics: bool,
}

impl ConnectionConfig {
    /// Create a new connection configuration
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            host: "localhost".to_string(),
            username: String::new(),
            password: String::new(),
            options: BTreeMap::new(),
            diagnostics: false,
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    /// Set the host
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the username
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    /// Set the password
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Add a backend option
    pub fn option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Enable or disable the query log
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Split `host` into its name and optional port
    pub fn host_and_port(&self) -> Result<(String, Option<u16>)> {
        match self.host.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().map_err(|_| {
                    DbError::InvalidArgument(format!("Invalid port in host '{}'", self.host))
                })?;
                Ok((host.to_string(), Some(port)))
            }
            None => Ok((self.host.clone(), None)),
        }
    }

    /// Page size for batched deletes and backfills
    pub fn batch_size(&self) -> Result<usize> {
        match self.options.get("batch_size") {
            None => Ok(DEFAULT_BATCH_SIZE),
            Some(raw) => match raw.parse::<usize>() {
                Ok(size) if size > 0 => Ok(size),
                _ => Err(DbError::InvalidArgument(format!("Invalid batch_size '{}'", raw))),
            },
        }
    }

    /// Connection description safe for logs
    pub fn to_url(&self) -> String {
        let credentials = if self.username.is_empty() {
            String::new()
        } else {
            format!("{}:***@", self.username)
        };
        format!("docrel://{}{}/{}", credentials, self.host, self.database)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(DbError::InvalidArgument("Database name cannot be empty".into()));
        }
        self.host_and_port()?;
        self.batch_size()?;
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
