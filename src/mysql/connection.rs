// ABOUTME: MySQL connection management with retry
// ABOUTME: Implements the Connector seam by opening one fresh connection per request

use anyhow::{Context, Result};
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts};
use std::time::Duration;

use super::destination::MySqlDestination;
use super::sql;
use super::source::MySqlSource;
use crate::sync::connection::Connector;
use crate::utils::{retry_with_backoff, strip_password_from_url};

/// Open a single connection with a utf8mb4, UTC session.
pub async fn connect(url: &str) -> Result<Conn> {
    let opts = Opts::from_url(url).with_context(|| {
        format!(
            "Invalid MySQL connection URL: {}",
            strip_password_from_url(url).unwrap_or_else(|_| "<unparseable>".to_string())
        )
    })?;

    let mut conn = Conn::new(opts).await.with_context(|| {
        format!(
            "Failed to connect to {}",
            strip_password_from_url(url).unwrap_or_else(|_| "<unparseable>".to_string())
        )
    })?;

    for statement in sql::SESSION_SETUP {
        conn.query_drop(*statement)
            .await
            .with_context(|| format!("Failed to run session setup: {}", statement))?;
    }

    Ok(conn)
}

/// Connect with exponential backoff (1s, 2s, 4s, ...).
pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<Conn> {
    retry_with_backoff(|| connect(url), max_retries, Duration::from_secs(1)).await
}

/// Opens MySQL source and destination connections on demand.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    source_url: String,
    destination_url: String,
    connect_retries: u32,
}

impl MySqlConnector {
    pub fn new(source_url: String, destination_url: String, connect_retries: u32) -> Self {
        Self {
            source_url,
            destination_url,
            connect_retries,
        }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Source = MySqlSource;
    type Destination = MySqlDestination;

    async fn connect_source(&self) -> Result<MySqlSource> {
        let conn = connect_with_retry(&self.source_url, self.connect_retries)
            .await
            .context("Failed to connect to source database")?;
        Ok(MySqlSource::new(conn))
    }

    async fn connect_destination(&self) -> Result<MySqlDestination> {
        let conn = connect_with_retry(&self.destination_url, self.connect_retries)
            .await
            .context("Failed to connect to destination database")?;
        Ok(MySqlDestination::new(conn))
    }
}
