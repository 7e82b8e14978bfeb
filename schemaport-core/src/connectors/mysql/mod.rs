//! MySQL and MariaDB connector.
//!
//! # Module Structure
//! - `connection`: Read-only pool setup
//! - `catalog`: Database, table and foreign key enumeration
//! - `values`: Column value to JSON conversion
//!
//! Entities are scoped by database name (`shop.orders`). Without a database
//! in the scope, every non-system database the account can see is listed.

mod catalog;
mod connection;
mod values;

use super::{Connector, quote_identifier};
use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, RawRecord, RelationCandidate, Scope, SourceKind};
use async_trait::async_trait;
use sqlx::MySqlPool;

pub use catalog::SYSTEM_DATABASES;

/// MySQL/MariaDB connector backed by a sqlx pool.
pub struct MySqlConnector {
    pool: MySqlPool,
    kind: SourceKind,
}

impl std::fmt::Debug for MySqlConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlConnector")
            .field("kind", &self.kind)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn list_entities(&self, scope: &Scope) -> Result<Vec<EntityRef>> {
        let databases = match &scope.database {
            Some(database) => vec![database.clone()],
            None => catalog::list_databases(&self.pool).await?,
        };

        let mut entities = Vec::new();
        for database in &databases {
            entities.extend(catalog::list_tables(&self.pool, database).await?);
        }
        Ok(entities)
    }

    async fn sample_entity(&self, entity: &EntityRef, size: u32) -> Result<Vec<RawRecord>> {
        let Some(database) = entity.scope.as_deref() else {
            return Err(SchemaportError::sampling(
                entity.qualified_name(),
                "MySQL entities must be qualified with a database",
            ));
        };

        let primary_key = catalog::primary_key_columns(&self.pool, database, &entity.name).await?;
        let order_by = if primary_key.is_empty() {
            String::new()
        } else {
            let columns: Vec<String> = primary_key
                .iter()
                .map(|c| quote_identifier(c, '`'))
                .collect();
            format!("ORDER BY {}", columns.join(", "))
        };

        let query = format!(
            "SELECT * FROM {}.{} {} LIMIT ?",
            quote_identifier(database, '`'),
            quote_identifier(&entity.name, '`'),
            order_by
        );
        tracing::debug!(entity = %entity, limit = size, "Sampling with query: {}", query);

        let rows = sqlx::query(&query)
            .bind(i64::from(size))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SchemaportError::sampling_failed(entity.qualified_name(), "sample query failed", e)
            })?;

        Ok(rows.iter().map(values::row_to_record).collect())
    }

    async fn list_declared_relations(&self, scope: &Scope) -> Result<Vec<RelationCandidate>> {
        catalog::foreign_keys(&self.pool, scope.database.as_deref()).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
