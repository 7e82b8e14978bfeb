//! PostgreSQL connector.
//!
//! # Module Structure
//! - `connection`: Read-only pool setup
//! - `catalog`: Table enumeration and foreign keys from the system catalogs
//!
//! Tables are sampled through `row_to_json`, so column values arrive already
//! rendered as JSON (timestamps as ISO 8601 strings, numerics as numbers).

mod catalog;
mod connection;

use super::{Connector, quote_identifier};
use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, RawRecord, RelationCandidate, Scope, SourceKind};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

/// Schema assumed for unqualified table references.
pub const DEFAULT_SCHEMA: &str = "public";

/// PostgreSQL connector backed by a sqlx pool.
pub struct PostgresConnector {
    pool: PgPool,
}

impl std::fmt::Debug for PostgresConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConnector")
            .field("pool_size", &self.pool.size())
            .field("pool_idle", &self.pool.num_idle())
            .finish()
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::Postgres
    }

    async fn list_entities(&self, scope: &Scope) -> Result<Vec<EntityRef>> {
        catalog::list_tables(&self.pool, scope.schema.as_deref()).await
    }

    async fn sample_entity(&self, entity: &EntityRef, size: u32) -> Result<Vec<RawRecord>> {
        let schema = entity.scope.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let primary_key = catalog::primary_key_columns(&self.pool, schema, &entity.name).await?;

        let order_clause = if primary_key.is_empty() {
            String::new()
        } else {
            let columns: Vec<String> = primary_key
                .iter()
                .map(|c| format!("t.{}", quote_identifier(c, '"')))
                .collect();
            format!("ORDER BY {}", columns.join(", "))
        };

        let sample_query = format!(
            "SELECT row_to_json(t.*) AS row_data FROM {}.{} t {} LIMIT $1",
            quote_identifier(schema, '"'),
            quote_identifier(&entity.name, '"'),
            order_clause
        );
        tracing::debug!(entity = %entity, limit = size, "Sampling with query: {}", sample_query);

        let rows: Vec<Value> = sqlx::query_scalar(&sample_query)
            .bind(i64::from(size))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SchemaportError::sampling_failed(entity.qualified_name(), "sample query failed", e)
            })?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    async fn list_declared_relations(&self, scope: &Scope) -> Result<Vec<RelationCandidate>> {
        catalog::foreign_keys(&self.pool, scope.schema.as_deref()).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
