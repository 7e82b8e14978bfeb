//! Configuration types for connectors and export runs.
//!
//! - `ConnectionDescriptor`: source kind, credential-bearing URL and scope
//! - `ConnectionLimits`: pool and timeout bounds applied by every connector
//! - `SamplingOptions`: per-entity sampling settings
//! - `ExportOptions`: failure policy, relation inference and run bounds
//!
//! # Security
//! Only `ConnectionDescriptor` holds a connection URL, in a zeroizing buffer.
//! None of these types print or serialize credentials.

mod connection;
mod export;
mod sampling;

pub use connection::{ConnectionDescriptor, ConnectionLimits, detect_source_kind, parse_connection_url};
pub use export::{ExportOptions, FailurePolicy, OutputFormat, RelationInferenceConfig};
pub use sampling::{DEFAULT_SAMPLE_SIZE, MAX_SAMPLE_SIZE, SamplingOptions};
