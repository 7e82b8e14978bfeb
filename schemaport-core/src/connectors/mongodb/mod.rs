//! MongoDB connector.
//!
//! # Module Structure
//! - `bson_json`: BSON to JSON conversion for sampled documents
//!
//! Collections are schemaless, so this connector only enumerates and pulls
//! documents; field shapes come entirely from the sampler. MongoDB has no
//! declared relations, so the trait default (`UnsupportedCapability`) applies.
//!
//! # Security Guarantees
//! - Only `listDatabases`, `listCollections`, `ping` and bounded `find` run
//! - Connection strings are sanitized in error messages

mod bson_json;

use super::{ConnectionDescriptor, ConnectionLimits, Connector};
use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, RawRecord, Scope, SourceKind};
use async_trait::async_trait;
use mongodb::Client;
use mongodb::bson::{Document, doc};
use mongodb::options::{ClientOptions, FindOptions};

pub use bson_json::document_to_record;

/// Databases skipped unless explicitly scoped.
pub const SYSTEM_DATABASES: &[&str] = &["admin", "config", "local"];

/// MongoDB connector.
pub struct MongoConnector {
    client: Client,
}

impl std::fmt::Debug for MongoConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoConnector").finish_non_exhaustive()
    }
}

impl MongoConnector {
    /// Creates the client and pings the deployment.
    ///
    /// # Errors
    /// Returns a connection error if the deployment is unreachable or
    /// rejects the credentials
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        limits: &ConnectionLimits,
    ) -> Result<Self> {
        let mut options = ClientOptions::parse(descriptor.url()).await.map_err(|e| {
            SchemaportError::configuration(format!(
                "Failed to parse MongoDB connection options: {}",
                e
            ))
        })?;

        options.connect_timeout = Some(limits.connect_timeout);
        options.server_selection_timeout = Some(limits.connect_timeout);
        options.max_pool_size = Some(limits.max_connections);
        options.min_pool_size = Some(0);
        options.app_name = Some(format!("schemaport-{}", env!("CARGO_PKG_VERSION")));

        let client = Client::with_options(options).map_err(|e| {
            SchemaportError::connection_failed(
                format!(
                    "Failed to create MongoDB client for {}",
                    descriptor.redacted_url()
                ),
                e,
            )
        })?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| {
                SchemaportError::connection_failed(
                    format!("Failed to connect to {}", descriptor.redacted_url()),
                    e,
                )
            })?;

        Ok(Self { client })
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let mut names = self
            .client
            .list_database_names()
            .await
            .map_err(|e| SchemaportError::listing_failed("Failed to list databases", e))?;
        names.retain(|name| !SYSTEM_DATABASES.contains(&name.as_str()));
        names.sort();
        Ok(names)
    }

    async fn list_collections(&self, database: &str) -> Result<Vec<String>> {
        let mut names = self
            .client
            .database(database)
            .list_collection_names()
            .filter(doc! { "type": "collection" })
            .await
            .map_err(|e| {
                tracing::error!("Failed to list collections in {}: {}", database, e);
                SchemaportError::listing_failed(
                    format!("Failed to list collections in database '{}'", database),
                    e,
                )
            })?;
        names.retain(|name| {
            let system = name.starts_with("system.");
            if system {
                tracing::trace!("Skipping system collection: {}", name);
            }
            !system
        });
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::Mongodb
    }

    async fn list_entities(&self, scope: &Scope) -> Result<Vec<EntityRef>> {
        let databases = match &scope.database {
            Some(database) => vec![database.clone()],
            None => self.list_databases().await?,
        };

        let mut entities = Vec::new();
        for database in databases {
            for collection in self.list_collections(&database).await? {
                entities.push(EntityRef::new(Some(database.clone()), collection));
            }
        }
        Ok(entities)
    }

    async fn sample_entity(&self, entity: &EntityRef, size: u32) -> Result<Vec<RawRecord>> {
        let Some(database) = entity.scope.as_deref() else {
            return Err(SchemaportError::sampling(
                entity.qualified_name(),
                "MongoDB collections must be qualified with a database",
            ));
        };

        let options = FindOptions::builder()
            .sort(doc! { "_id": 1 })
            .limit(i64::from(size))
            .build();

        let mut cursor = self
            .client
            .database(database)
            .collection::<Document>(&entity.name)
            .find(doc! {})
            .with_options(options)
            .await
            .map_err(|e| {
                SchemaportError::sampling_failed(entity.qualified_name(), "find failed", e)
            })?;

        let mut records = Vec::new();
        while cursor.advance().await.map_err(|e| {
            SchemaportError::sampling_failed(entity.qualified_name(), "cursor iteration failed", e)
        })? {
            let document = cursor.deserialize_current().map_err(|e| {
                SchemaportError::sampling_failed(
                    entity.qualified_name(),
                    "failed to deserialize document",
                    e,
                )
            })?;
            records.push(document_to_record(&document));
        }
        Ok(records)
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}
