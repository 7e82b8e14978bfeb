//! MySQL connection pool setup.

use super::MySqlConnector;
use crate::Result;
use crate::connectors::{ConnectionDescriptor, ConnectionLimits};
use crate::error::SchemaportError;
use crate::models::SourceKind;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use zeroize::Zeroizing;

impl MySqlConnector {
    /// Opens a read-only pool and checks that the server answers.
    ///
    /// # Errors
    /// Returns a connection error if the server is unreachable or rejects
    /// the credentials
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        limits: &ConnectionLimits,
    ) -> Result<Self> {
        let pool = create_pool(descriptor, limits)?;

        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                SchemaportError::connection_failed(
                    format!("Failed to connect to {}", descriptor.redacted_url()),
                    e,
                )
            })?;

        Ok(Self {
            pool,
            kind: descriptor.kind,
        })
    }
}

/// The driver only understands `mysql://`; MariaDB URLs are rewritten.
fn driver_url(descriptor: &ConnectionDescriptor) -> Result<Zeroizing<String>> {
    if descriptor.kind != SourceKind::Mariadb || !descriptor.url().starts_with("mariadb:") {
        return Ok(Zeroizing::new(descriptor.url().to_string()));
    }

    let mut url = url::Url::parse(descriptor.url()).map_err(|e| {
        SchemaportError::configuration(format!("Invalid connection URL format: {}", e))
    })?;
    url.set_scheme("mysql").map_err(|()| {
        SchemaportError::configuration("Cannot rewrite MariaDB URL scheme")
    })?;
    Ok(Zeroizing::new(url.to_string()))
}

fn create_pool(descriptor: &ConnectionDescriptor, limits: &ConnectionLimits) -> Result<MySqlPool> {
    use sqlx::Executor;

    let query_timeout_ms = limits.query_timeout.as_millis() as u64;
    let url = driver_url(descriptor)?;

    MySqlPoolOptions::new()
        .max_connections(limits.max_connections.min(100))
        .min_connections(0)
        .acquire_timeout(limits.connect_timeout)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // MariaDB ignores max_execution_time; the per-entity sample
                // timeout still applies.
                if let Err(e) = conn
                    .execute(format!("SET SESSION max_execution_time = {}", query_timeout_ms).as_str())
                    .await
                {
                    tracing::debug!("max_execution_time not supported: {}", e);
                }
                conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                conn.execute("SET time_zone = '+00:00'").await?;
                Ok(())
            })
        })
        .connect_lazy(&url)
        .map_err(|e| {
            SchemaportError::connection_failed(
                format!(
                    "Failed to create MySQL connection pool to {}",
                    descriptor.redacted_url()
                ),
                e,
            )
        })
}
