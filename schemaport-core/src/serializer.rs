//! Normalization of export results into the portable schema document.

use crate::Result;
use crate::connectors::OutputFormat;
use crate::error::SchemaportError;
use crate::models::{
    Entity, ExportError, RelationCandidate, SCHEMA_DOCUMENT_VERSION, SchemaDocument,
    SourceMetadata,
};
use chrono::Utc;
use std::collections::HashSet;

/// Builds and encodes schema documents for one source.
#[derive(Debug, Clone)]
pub struct SchemaSerializer {
    source: SourceMetadata,
}

impl SchemaSerializer {
    pub fn new(source: SourceMetadata) -> Self {
        Self { source }
    }

    /// Source metadata stamped on every document.
    pub fn source(&self) -> &SourceMetadata {
        &self.source
    }

    /// Assembles the document, checking the invariants the format relies on.
    ///
    /// # Errors
    /// Returns `SchemaportError::Serialization` if two entities share a name
    /// within the same scope, or a relation points at a field that is not in
    /// the document.
    pub fn build(
        &self,
        entities: Vec<Entity>,
        relations: Vec<RelationCandidate>,
        errors: Vec<ExportError>,
    ) -> Result<SchemaDocument> {
        let mut names = HashSet::new();
        for entity in &entities {
            if !names.insert((entity.scope.as_deref(), entity.name.as_str())) {
                return Err(SchemaportError::serialization(format!(
                    "duplicate entity '{}'",
                    entity.qualified_name()
                )));
            }
        }

        let document = SchemaDocument {
            version: SCHEMA_DOCUMENT_VERSION,
            source: self.source.clone(),
            generated_at: Utc::now(),
            entities,
            relations,
            errors,
        };

        if let Some(dangling) = document
            .relations
            .iter()
            .find(|r| !document.resolves(&r.from) || !document.resolves(&r.to))
        {
            return Err(SchemaportError::serialization(format!(
                "relation {} -> {} references a field outside the document",
                dangling.from, dangling.to
            )));
        }

        Ok(document)
    }

    /// Document carrying only errors, used when nothing could be exported.
    pub fn failed(&self, errors: Vec<ExportError>) -> SchemaDocument {
        SchemaDocument {
            version: SCHEMA_DOCUMENT_VERSION,
            source: self.source.clone(),
            generated_at: Utc::now(),
            entities: Vec::new(),
            relations: Vec::new(),
            errors,
        }
    }
}

/// Encodes a document in the requested format.
///
/// # Errors
/// Returns a JSON error if encoding fails
pub fn to_json_string(document: &SchemaDocument, format: OutputFormat) -> Result<String> {
    let encoded = match format {
        OutputFormat::Json => serde_json::to_string_pretty(document),
        OutputFormat::JsonCompact => serde_json::to_string(document),
    };
    encoded.map_err(|e| SchemaportError::json("Failed to encode schema document", e))
}

/// Decodes a document previously produced by [`to_json_string`].
///
/// # Errors
/// Returns a JSON error if the input is not a schema document
pub fn from_json_str(input: &str) -> Result<SchemaDocument> {
    serde_json::from_str(input).map_err(|e| SchemaportError::json("Failed to decode schema document", e))
}
