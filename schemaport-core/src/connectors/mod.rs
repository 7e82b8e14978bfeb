//! Connector traits and registry for kind-agnostic database access.
//!
//! This module defines the capability contract every source kind implements
//! so the sampler, relation inferrer and export pipeline never need to know
//! which database they are talking to.
//!
//! # Module Structure
//! - `config`: Connection descriptor, limits, sampling and export options
//! - Kind-specific modules (postgres, mysql, mongodb, couchbase), each behind
//!   its cargo feature
//!
//! # Security Guarantees
//! - All operations are read-only (catalog queries and bounded SELECT/find)
//! - Connection URLs are never stored outside `ConnectionDescriptor`
//! - Connection strings are sanitized in every error message

use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, RawRecord, RelationCandidate, Scope, SourceKind};
use async_trait::async_trait;

pub mod config;

pub use config::{
    ConnectionDescriptor, ConnectionLimits, DEFAULT_SAMPLE_SIZE, ExportOptions, FailurePolicy,
    MAX_SAMPLE_SIZE, OutputFormat, RelationInferenceConfig, SamplingOptions, detect_source_kind,
    parse_connection_url,
};

/// Capability contract for one connected source.
///
/// # Object Safety
/// This trait is object-safe; the registry hands out `Box<dyn Connector>`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Source kind this connector talks to.
    fn kind(&self) -> SourceKind;

    /// Enumerates entities within the scope, in a deterministic order.
    ///
    /// # Errors
    /// Returns a listing error if the catalog cannot be read
    async fn list_entities(&self, scope: &Scope) -> Result<Vec<EntityRef>>;

    /// Pulls up to `size` raw records from one entity.
    ///
    /// # Errors
    /// Returns a sampling error if the entity cannot be read
    async fn sample_entity(&self, entity: &EntityRef, size: u32) -> Result<Vec<RawRecord>>;

    /// Lists relations declared by the source (foreign keys).
    ///
    /// # Default Implementation
    /// Returns `UnsupportedCapability`; callers treat that as an empty list.
    async fn list_declared_relations(&self, _scope: &Scope) -> Result<Vec<RelationCandidate>> {
        Err(SchemaportError::unsupported_capability(
            "declared relations",
            self.kind().to_string(),
        ))
    }

    /// Releases pooled connections. Must be safe to call more than once.
    async fn close(&self);
}

/// Resolves a connection descriptor to a live connector.
///
/// The export pipeline and gateway only see this trait, so tests can supply
/// an in-memory factory.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Kinds this factory can connect to.
    fn available_kinds(&self) -> Vec<SourceKind>;

    /// Opens a connector for the descriptor.
    ///
    /// # Errors
    /// Returns a connection error if the source is unreachable or rejects
    /// the credentials, or a configuration error if the kind is not compiled
    /// in.
    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connector>>;
}

/// Static mapping from source kind to the compiled-in connectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectorRegistry {
    limits: ConnectionLimits,
}

impl ConnectorRegistry {
    /// Creates a registry with default connection limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry applying the given limits to every connection.
    pub fn with_limits(limits: ConnectionLimits) -> Self {
        Self { limits }
    }

    /// Whether a connector for the kind is compiled in.
    pub fn is_available(kind: SourceKind) -> bool {
        match kind {
            SourceKind::Postgres => cfg!(feature = "postgresql"),
            SourceKind::Mysql | SourceKind::Mariadb => cfg!(feature = "mysql"),
            SourceKind::Mongodb => cfg!(feature = "mongodb"),
            SourceKind::Couchbase => cfg!(feature = "couchbase"),
        }
    }
}

#[async_trait]
impl ConnectorFactory for ConnectorRegistry {
    fn available_kinds(&self) -> Vec<SourceKind> {
        SourceKind::ALL
            .into_iter()
            .filter(|kind| Self::is_available(*kind))
            .collect()
    }

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connector>> {
        self.limits.validate()?;

        match descriptor.kind {
            #[cfg(feature = "postgresql")]
            SourceKind::Postgres => {
                let connector = postgres::PostgresConnector::connect(descriptor, &self.limits).await?;
                Ok(Box::new(connector))
            }
            #[cfg(not(feature = "postgresql"))]
            SourceKind::Postgres => Err(SchemaportError::configuration(
                "PostgreSQL connector not compiled in. Use --features postgresql",
            )),
            #[cfg(feature = "mysql")]
            SourceKind::Mysql | SourceKind::Mariadb => {
                let connector = mysql::MySqlConnector::connect(descriptor, &self.limits).await?;
                Ok(Box::new(connector))
            }
            #[cfg(not(feature = "mysql"))]
            SourceKind::Mysql | SourceKind::Mariadb => Err(SchemaportError::configuration(
                "MySQL/MariaDB connector not compiled in. Use --features mysql",
            )),
            #[cfg(feature = "mongodb")]
            SourceKind::Mongodb => {
                let connector = mongodb::MongoConnector::connect(descriptor, &self.limits).await?;
                Ok(Box::new(connector))
            }
            #[cfg(not(feature = "mongodb"))]
            SourceKind::Mongodb => Err(SchemaportError::configuration(
                "MongoDB connector not compiled in. Use --features mongodb",
            )),
            #[cfg(feature = "couchbase")]
            SourceKind::Couchbase => {
                let connector =
                    couchbase::CouchbaseConnector::connect(descriptor, &self.limits).await?;
                Ok(Box::new(connector))
            }
            #[cfg(not(feature = "couchbase"))]
            SourceKind::Couchbase => Err(SchemaportError::configuration(
                "Couchbase connector not compiled in. Use --features couchbase",
            )),
        }
    }
}

/// Quotes an identifier with the given quote character, doubling embedded quotes.
#[cfg(any(feature = "postgresql", feature = "mysql", feature = "couchbase"))]
pub(crate) fn quote_identifier(name: &str, quote: char) -> String {
    let escaped = name.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mongodb")]
pub mod mongodb;

#[cfg(feature = "couchbase")]
pub mod couchbase;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_kinds_follow_features() {
        let kinds = ConnectorRegistry::new().available_kinds();
        assert_eq!(kinds.contains(&SourceKind::Postgres), cfg!(feature = "postgresql"));
        assert_eq!(kinds.contains(&SourceKind::Mariadb), cfg!(feature = "mysql"));
        assert_eq!(kinds.contains(&SourceKind::Couchbase), cfg!(feature = "couchbase"));
        let mut sorted = kinds.clone();
        sorted.sort_by_key(|k| k.as_str());
        assert_eq!(kinds, sorted);
    }

    #[cfg(any(feature = "postgresql", feature = "mysql", feature = "couchbase"))]
    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("users", '"'), "\"users\"");
        assert_eq!(quote_identifier("we\"ird", '"'), "\"we\"\"ird\"");
        assert_eq!(quote_identifier("order`s", '`'), "`order``s`");
    }

    #[cfg(not(feature = "couchbase"))]
    #[tokio::test]
    async fn test_connect_to_missing_feature_is_configuration_error() {
        let descriptor = parse_connection_url("couchbase://localhost/travel", None).unwrap();
        let err = ConnectorRegistry::new().connect(&descriptor).await.err().unwrap();
        assert!(matches!(err, SchemaportError::Configuration { .. }));
        assert!(err.to_string().contains("--features couchbase"));
    }
}
