//! PostgreSQL connection pool setup.
//!
//! # Security Features
//! - Every pooled connection is switched to read-only transactions
//! - `statement_timeout` bounds every catalog and sampling query
//! - Connection strings are sanitized in all error messages

use super::PostgresConnector;
use crate::Result;
use crate::connectors::{ConnectionDescriptor, ConnectionLimits};
use crate::error::SchemaportError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

impl PostgresConnector {
    /// Opens a pool against the descriptor and checks that it answers.
    ///
    /// # Errors
    /// Returns a connection error if the server is unreachable or rejects
    /// the credentials
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        limits: &ConnectionLimits,
    ) -> Result<Self> {
        let pool = create_pool(descriptor, limits)?;

        let alive: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| {
                SchemaportError::connection_failed(
                    format!("Failed to connect to {}", descriptor.redacted_url()),
                    e,
                )
            })?;
        if alive != 1 {
            pool.close().await;
            return Err(SchemaportError::connection(
                "Connectivity check returned an unexpected result",
            ));
        }

        tracing::debug!(
            max_connections = limits.max_connections,
            "PostgreSQL pool ready"
        );
        Ok(Self { pool })
    }
}

fn create_pool(descriptor: &ConnectionDescriptor, limits: &ConnectionLimits) -> Result<PgPool> {
    use sqlx::Executor;

    let query_timeout_secs = limits.query_timeout.as_secs();

    PgPoolOptions::new()
        .max_connections(limits.max_connections.min(100))
        .min_connections(0)
        .acquire_timeout(limits.connect_timeout)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(
                    format!("SET statement_timeout = '{}s'", query_timeout_secs).as_str(),
                )
                .await?;
                conn.execute("SET lock_timeout = '30s'").await?;
                conn.execute("SET idle_in_transaction_session_timeout = '60s'")
                    .await?;
                let app_name = format!("schemaport-{}", env!("CARGO_PKG_VERSION"));
                conn.execute(format!("SET application_name = '{}'", app_name).as_str())
                    .await?;
                conn.execute("SET default_transaction_read_only = on").await?;
                conn.execute("SET timezone = 'UTC'").await?;
                Ok(())
            })
        })
        .connect_lazy(descriptor.url())
        .map_err(|e| {
            SchemaportError::connection_failed(
                format!(
                    "Failed to create PostgreSQL connection pool to {}",
                    descriptor.redacted_url()
                ),
                e,
            )
        })
}
