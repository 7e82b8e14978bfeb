//! Core library for schemaport.
//!
//! schemaport samples tables and collections from relational and document
//! databases, infers a unified field model plus candidate relations, and
//! emits a portable, versioned schema document. The same export pipeline is
//! driven by the `schemaport` CLI and by the local gateway service.
//!
//! # Security Guarantees
//! - No credentials stored or logged in any data structure or document
//! - All database operations are read-only
//! - Connection URLs live in zeroizing buffers for the duration of one call
//!
//! # Architecture
//! - Connector registry: factory pattern resolving a source kind to a
//!   feature-gated connector
//! - Schema sampler and relation inferrer: pure functions over sampled records
//! - Export pipeline: state machine owning connector lifetime and failure policy
//! - Gateway: per-session tasks over a newline-delimited JSON protocol

pub mod connectors;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod relations;
pub mod sampler;
pub mod serializer;
pub mod validation;

// Re-export commonly used types
pub use connectors::{
    ConnectionDescriptor, ConnectionLimits, Connector, ConnectorFactory, ConnectorRegistry,
    ExportOptions, FailurePolicy, OutputFormat, RelationInferenceConfig, SamplingOptions,
    parse_connection_url,
};
pub use error::{Result, SchemaportError};
pub use gateway::{Gateway, GatewayConfig, SessionState};
pub use models::{
    Entity, EntityRef, ExportError, FieldDescriptor, FieldRef, FieldStats, FieldType, RawRecord,
    RelationCandidate, RelationMethod, SchemaDocument, Scope, SourceKind, SourceMetadata,
};
pub use pipeline::{ExportOutcome, ExportPipeline, PipelineState};
pub use relations::RelationInferrer;
pub use sampler::{EntitySample, SchemaSampler};
pub use serializer::{SchemaSerializer, from_json_str, to_json_string};
pub use validation::{ValidationError, validate_and_parse_document, validate_document_output};
