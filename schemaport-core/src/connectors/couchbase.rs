//! Couchbase connector over the N1QL query service REST API.
//!
//! Keyspaces are enumerated from `system:keyspaces` and sampled with
//! `SELECT RAW`. Entities are scoped as `bucket.scope`, named after the
//! collection. Couchbase has no declared relations.
//!
//! `couchbase://host` talks plain HTTP to port 8093, `couchbases://host`
//! HTTPS to port 18093. An explicit port in the URL overrides either unless
//! it belongs to the data or cluster manager service, which SDK connection
//! strings commonly carry.

use super::{ConnectionDescriptor, ConnectionLimits, Connector, quote_identifier};
use crate::Result;
use crate::error::SchemaportError;
use crate::models::{EntityRef, RawRecord, Scope, SourceKind};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

const QUERY_PORT: u16 = 8093;
const QUERY_PORT_TLS: u16 = 18093;

/// Data (KV) and cluster manager ports, plain and TLS.
const OTHER_SERVICE_PORTS: [u16; 4] = [11210, 11207, 8091, 18091];

/// Failure of one N1QL request.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query returned status '{status}': {message}")]
    Service { status: String, message: String },
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    errors: Vec<QueryErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct QueryErrorEntry {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Couchbase connector.
pub struct CouchbaseConnector {
    http: reqwest::Client,
    endpoint: Url,
    username: Zeroizing<String>,
    password: Zeroizing<String>,
    query_timeout_secs: u64,
}

impl std::fmt::Debug for CouchbaseConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouchbaseConnector")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl CouchbaseConnector {
    /// Builds the HTTP client and runs a trivial query.
    ///
    /// # Errors
    /// Returns a connection error if the query service is unreachable or
    /// rejects the credentials
    pub async fn connect(
        descriptor: &ConnectionDescriptor,
        limits: &ConnectionLimits,
    ) -> Result<Self> {
        let url = Url::parse(descriptor.url()).map_err(|e| {
            SchemaportError::configuration(format!("Invalid connection URL format: {}", e))
        })?;
        let endpoint = query_endpoint(&url)?;

        let http = reqwest::Client::builder()
            .connect_timeout(limits.connect_timeout)
            .timeout(limits.query_timeout)
            .pool_max_idle_per_host(limits.max_connections as usize)
            .user_agent(format!("schemaport/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SchemaportError::connection_failed("Failed to build HTTP client", e))?;

        let connector = Self {
            http,
            endpoint,
            username: Zeroizing::new(url.username().to_string()),
            password: Zeroizing::new(url.password().unwrap_or_default().to_string()),
            query_timeout_secs: limits.query_timeout.as_secs(),
        };

        connector
            .query("SELECT RAW 1", Map::new())
            .await
            .map_err(|e| {
                SchemaportError::connection_failed(
                    format!("Failed to connect to {}", descriptor.redacted_url()),
                    e,
                )
            })?;

        Ok(connector)
    }

    async fn query(
        &self,
        statement: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<Vec<Value>, QueryError> {
        let mut body = args;
        body.insert("statement".to_string(), json!(statement));
        body.insert("readonly".to_string(), json!(true));
        body.insert(
            "timeout".to_string(),
            json!(format!("{}s", self.query_timeout_secs)),
        );

        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        if !self.username.is_empty() {
            request = request.basic_auth(self.username.as_str(), Some(self.password.as_str()));
        }

        let response: QueryResponse = request.send().await?.json().await?;
        if response.status != "success" {
            let message = response
                .errors
                .iter()
                .map(|e| format!("[{}] {}", e.code, e.msg))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(QueryError::Service {
                status: response.status,
                message,
            });
        }
        Ok(response.results)
    }
}

/// Query service URL for a `couchbase://` or `couchbases://` URL.
fn query_endpoint(url: &Url) -> Result<Url> {
    let (scheme, default_port) = match url.scheme() {
        "couchbases" => ("https", QUERY_PORT_TLS),
        _ => ("http", QUERY_PORT),
    };
    let host = url
        .host_str()
        .ok_or_else(|| SchemaportError::configuration("Connection URL must specify a host"))?;
    let port = match url.port() {
        Some(port) if OTHER_SERVICE_PORTS.contains(&port) => {
            tracing::debug!(port, "Port belongs to another service, using {}", default_port);
            default_port
        }
        Some(port) => port,
        None => default_port,
    };

    Url::parse(&format!("{}://{}:{}/query/service", scheme, host, port)).map_err(|e| {
        SchemaportError::configuration(format!("Invalid query service address: {}", e))
    })
}

/// Splits `bucket.scope` into its parts.
///
/// Bucket names may contain dots, scope names may not.
fn split_scope(entity: &EntityRef) -> Result<(&str, &str)> {
    entity
        .scope
        .as_deref()
        .and_then(|scope| scope.rsplit_once('.'))
        .ok_or_else(|| {
            SchemaportError::sampling(
                entity.qualified_name(),
                "Couchbase collections must be qualified with bucket.scope",
            )
        })
}

#[async_trait]
impl Connector for CouchbaseConnector {
    fn kind(&self) -> SourceKind {
        SourceKind::Couchbase
    }

    async fn list_entities(&self, scope: &Scope) -> Result<Vec<EntityRef>> {
        let mut statement = String::from(
            "SELECT k.`bucket` AS `bucket`, k.`scope` AS `scope`, k.name AS name \
             FROM system:keyspaces AS k \
             WHERE k.`bucket` IS NOT MISSING AND k.`scope` IS NOT MISSING",
        );
        let mut args = Map::new();
        if let Some(bucket) = &scope.bucket {
            statement.push_str(" AND k.`bucket` = $bucket");
            args.insert("$bucket".to_string(), json!(bucket));
        }
        statement.push_str(" ORDER BY k.`bucket`, k.`scope`, k.name");

        let rows = self
            .query(&statement, args)
            .await
            .map_err(|e| SchemaportError::listing_failed("Failed to enumerate keyspaces", e))?;

        let mut entities = Vec::with_capacity(rows.len());
        for row in rows {
            let field = |key: &str| row.get(key).and_then(Value::as_str).map(str::to_string);
            match (field("bucket"), field("scope"), field("name")) {
                (Some(bucket), Some(scope_name), Some(name)) => {
                    if scope_name.starts_with('_') && scope_name != "_default" {
                        tracing::trace!("Skipping system scope: {}.{}", bucket, scope_name);
                        continue;
                    }
                    entities.push(EntityRef::new(Some(format!("{}.{}", bucket, scope_name)), name));
                }
                _ => tracing::debug!("Skipping keyspace row without bucket/scope/name"),
            }
        }
        Ok(entities)
    }

    async fn sample_entity(&self, entity: &EntityRef, size: u32) -> Result<Vec<RawRecord>> {
        let (bucket, scope) = split_scope(entity)?;
        let statement = format!(
            "SELECT RAW t FROM {}.{}.{} AS t LIMIT $limit",
            quote_identifier(bucket, '`'),
            quote_identifier(scope, '`'),
            quote_identifier(&entity.name, '`')
        );
        let mut args = Map::new();
        args.insert("$limit".to_string(), json!(size));

        let rows = self.query(&statement, args).await.map_err(|e| {
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

    async fn close(&self) {}
}
