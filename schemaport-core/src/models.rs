//! Core data models for the portable schema document.
//!
//! This module defines the entity, field and relation structures produced by
//! an export run. All models are serializable; none of them ever carries a
//! credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Version of the portable schema document format.
pub const SCHEMA_DOCUMENT_VERSION: u32 = 1;

/// A raw sampled record: one row or document rendered as a JSON object.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Supported source kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Postgres,
    Mysql,
    Mariadb,
    Mongodb,
    Couchbase,
}

impl SourceKind {
    /// All kinds known to the registry, compiled in or not.
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Couchbase,
        SourceKind::Mariadb,
        SourceKind::Mongodb,
        SourceKind::Mysql,
        SourceKind::Postgres,
    ];

    /// Canonical lower-case name used on the CLI and in documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Postgres => "postgres",
            SourceKind::Mysql => "mysql",
            SourceKind::Mariadb => "mariadb",
            SourceKind::Mongodb => "mongodb",
            SourceKind::Couchbase => "couchbase",
        }
    }

    /// Whether entities of this kind are schemaless collections.
    pub fn is_document_store(&self) -> bool {
        matches!(self, SourceKind::Mongodb | SourceKind::Couchbase)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = crate::error::SchemaportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SourceKind::Postgres),
            "mysql" => Ok(SourceKind::Mysql),
            "mariadb" => Ok(SourceKind::Mariadb),
            "mongodb" | "mongo" => Ok(SourceKind::Mongodb),
            "couchbase" => Ok(SourceKind::Couchbase),
            other => Err(crate::error::SchemaportError::configuration(format!(
                "Unknown source kind '{}'",
                other
            ))),
        }
    }
}

/// Caller-supplied restriction narrowing enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl Scope {
    /// Whether no restriction is set.
    pub fn is_empty(&self) -> bool {
        self.database.is_none() && self.schema.is_none() && self.bucket.is_none()
    }
}

/// Reference to one table or collection as enumerated by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Namespace the entity lives in (schema, database, or bucket.scope)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub name: String,
}

impl EntityRef {
    pub fn new(scope: Option<String>, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    /// `scope.name`, or just `name` when unscoped.
    pub fn qualified_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}.{}", scope, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Inferred type of a field, ordered as a join-semilattice.
///
/// `Unknown` is the bottom element (nothing observed), `Mixed` the top.
/// `Null` means only null values were observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Unknown,
    Null,
    Bool,
    Int,
    Float,
    String,
    Date,
    Array(Box<FieldType>),
    Object,
    Mixed,
}

impl FieldType {
    /// Least upper bound of two observed types.
    pub fn merge(&self, other: &FieldType) -> FieldType {
        use FieldType::*;
        match (self, other) {
            (a, b) if a == b => a.clone(),
            (Unknown, b) => b.clone(),
            (a, Unknown) => a.clone(),
            (Null, b) => b.clone(),
            (a, Null) => a.clone(),
            (Int, Float) | (Float, Int) => Float,
            (Date, String) | (String, Date) => String,
            (Array(a), Array(b)) => Array(Box::new(a.merge(b))),
            _ => Mixed,
        }
    }

    /// Whether the type is an array of anything.
    pub fn is_array(&self) -> bool {
        matches!(self, FieldType::Array(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Unknown => f.write_str("unknown"),
            FieldType::Null => f.write_str("null"),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::String => f.write_str("string"),
            FieldType::Date => f.write_str("date"),
            FieldType::Array(inner) => write!(f, "array<{}>", inner),
            FieldType::Object => f.write_str("object"),
            FieldType::Mixed => f.write_str("mixed"),
        }
    }
}

impl FromStr for FieldType {
    type Err = crate::error::SchemaportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_prefix("array<").and_then(|r| r.strip_suffix('>')) {
            return Ok(FieldType::Array(Box::new(inner.parse()?)));
        }
        match s {
            "unknown" => Ok(FieldType::Unknown),
            "null" => Ok(FieldType::Null),
            "bool" => Ok(FieldType::Bool),
            "int" => Ok(FieldType::Int),
            "float" => Ok(FieldType::Float),
            "string" => Ok(FieldType::String),
            "date" => Ok(FieldType::Date),
            "object" => Ok(FieldType::Object),
            "mixed" => Ok(FieldType::Mixed),
            other => Err(crate::error::SchemaportError::configuration(format!(
                "Unknown field type '{}'",
                other
            ))),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Sample statistics for one field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Non-null observations
    pub count: u32,
    /// Records where the path was absent or null
    pub nulls: u32,
    /// Distinct non-null sampled values
    pub distinct: u32,
}

/// Inferred, merged shape of one entity attribute across sampled records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Dotted path for nested structures
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub nullable: bool,
    pub stats: FieldStats,
    /// Discriminator value of the group this field was inferred from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
}

impl FieldDescriptor {
    /// Last segment of the dotted path.
    pub fn leaf_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// One table or collection with its inferred fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub name: String,
    /// Discriminator field used to split records into groups, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator_field: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl Entity {
    /// Reference to this entity.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.scope.clone(), self.name.clone())
    }

    /// `scope.name`, or just `name` when unscoped.
    pub fn qualified_name(&self) -> String {
        self.entity_ref().qualified_name()
    }

    /// Whether any field group contains the given path.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
    }
}

/// Reference to a field of an entity in the document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
    /// Qualified entity name
    pub entity: String,
    /// Dotted field path
    pub field: String,
}

impl FieldRef {
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}

/// How a relation candidate was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationMethod {
    /// Declared by the source (foreign key)
    Declared,
    /// Proposed from field naming conventions
    NameMatch,
}

/// A declared or heuristically proposed link between two entities' fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationCandidate {
    pub from: FieldRef,
    pub to: FieldRef,
    pub confidence: f64,
    pub method: RelationMethod,
}

impl RelationCandidate {
    /// Declared relation, always at full confidence.
    pub fn declared(from: FieldRef, to: FieldRef) -> Self {
        Self {
            from,
            to,
            confidence: 1.0,
            method: RelationMethod::Declared,
        }
    }
}

/// An entity-level or run-level failure recorded in the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportError {
    /// Qualified entity name; absent for run-level failures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub message: String,
    pub fatal: bool,
}

impl ExportError {
    pub fn for_entity(entity: &EntityRef, message: impl Into<String>, fatal: bool) -> Self {
        Self {
            entity: Some(entity.qualified_name()),
            message: message.into(),
            fatal,
        }
    }

    pub fn for_run(message: impl Into<String>, fatal: bool) -> Self {
        Self {
            entity: None,
            message: message.into(),
            fatal,
        }
    }
}

/// Where the document was extracted from (credentials redacted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub kind: SourceKind,
    /// Connection URL with the password masked
    pub url: String,
    #[serde(default, skip_serializing_if = "Scope::is_empty")]
    pub scope: Scope,
}

/// The portable, versioned artifact produced by one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDocument {
    pub version: u32,
    pub source: SourceMetadata,
    pub generated_at: DateTime<Utc>,
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<RelationCandidate>,
    #[serde(default)]
    pub errors: Vec<ExportError>,
}

impl SchemaDocument {
    /// Whether the run that produced this document failed.
    pub fn has_fatal_error(&self) -> bool {
        self.errors.iter().any(|e| e.fatal)
    }

    /// Looks up an entity by qualified name.
    pub fn entity(&self, qualified_name: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.qualified_name() == qualified_name)
    }

    /// Whether a field reference resolves to a field in this document.
    pub fn resolves(&self, field_ref: &FieldRef) -> bool {
        self.entity(&field_ref.entity)
            .is_some_and(|e| e.has_field(&field_ref.field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_merge_lattice() {
        use FieldType::*;
        assert_eq!(Int.merge(&Float), Float);
        assert_eq!(Date.merge(&String), String);
        assert_eq!(Null.merge(&Int), Int);
        assert_eq!(Unknown.merge(&Null), Null);
        assert_eq!(Int.merge(&String), Mixed);
        assert_eq!(Object.merge(&Array(Box::new(Int))), Mixed);
        assert_eq!(
            Array(Box::new(Int)).merge(&Array(Box::new(Float))),
            Array(Box::new(Float))
        );
        assert_eq!(Array(Box::new(Unknown)).merge(&Array(Box::new(Bool))), Array(Box::new(Bool)));
        assert_eq!(Mixed.merge(&Int), Mixed);
    }

    #[test]
    fn test_field_type_display_and_parse() {
        let nested = FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Int))));
        assert_eq!(nested.to_string(), "array<array<int>>");
        assert_eq!("array<array<int>>".parse::<FieldType>().ok(), Some(nested));
        assert!("varchar".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("postgresql".parse::<SourceKind>().ok(), Some(SourceKind::Postgres));
        assert_eq!("MongoDB".parse::<SourceKind>().ok(), Some(SourceKind::Mongodb));
        assert!("oracle".parse::<SourceKind>().is_err());
        assert!(SourceKind::Couchbase.is_document_store());
        assert!(!SourceKind::Mariadb.is_document_store());
    }

    #[test]
    fn test_entity_ref_qualified_name() {
        assert_eq!(EntityRef::new(Some("public".into()), "users").qualified_name(), "public.users");
        assert_eq!(EntityRef::new(None, "users").to_string(), "users");
    }

    #[test]
    fn test_relation_method_serialization() {
        let json = serde_json::to_string(&RelationMethod::NameMatch).unwrap();
        assert_eq!(json, "\"name-match\"");
    }

    #[test]
    fn test_field_descriptor_omits_absent_discriminator() {
        let field = FieldDescriptor {
            name: "profile.name".to_string(),
            field_type: FieldType::String,
            nullable: false,
            stats: FieldStats::default(),
            discriminator: None,
        };
        let json = serde_json::to_value(&field).unwrap();
        assert!(json.get("discriminator").is_none());
        assert_eq!(json["type"], "string");
        assert_eq!(field.leaf_name(), "name");
    }
}
