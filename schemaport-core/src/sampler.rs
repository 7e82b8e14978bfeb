//! Field inference from sampled records.
//!
//! Relational rows and schemaless documents are both handled as JSON objects,
//! so one sampler serves every source kind:
//! 1. Pull up to `sample_size` records from the entity
//! 2. Optionally split them into groups by a discriminator field
//! 3. Flatten nested objects into dotted paths and tag every observed value
//! 4. Merge tags per path with the `FieldType` lattice and track nullability
//!
//! Objects inside arrays only contribute to the array element type; they are
//! not flattened into separate paths.

use crate::Result;
use crate::connectors::{Connector, SamplingOptions};
use crate::models::{Entity, EntityRef, FieldDescriptor, FieldStats, FieldType, RawRecord};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Result of sampling one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySample {
    pub entity: Entity,
    /// Number of raw records the fields were inferred from
    pub records_sampled: usize,
}

impl EntitySample {
    /// Whether the entity returned no records at all.
    pub fn is_empty(&self) -> bool {
        self.records_sampled == 0
    }
}

/// Turns raw sampled records into merged field descriptors.
#[derive(Debug, Clone, Default)]
pub struct SchemaSampler {
    options: SamplingOptions,
}

impl SchemaSampler {
    /// Creates a sampler with the given options.
    pub fn new(options: SamplingOptions) -> Self {
        Self { options }
    }

    /// Sampling options in effect.
    pub fn options(&self) -> &SamplingOptions {
        &self.options
    }

    /// Samples one entity through the connector and infers its fields.
    ///
    /// # Errors
    /// Returns whatever the connector returned for the sample query
    pub async fn sample(&self, connector: &dyn Connector, entity: &EntityRef) -> Result<EntitySample> {
        let mut records = connector
            .sample_entity(entity, self.options.sample_size)
            .await?;
        records.truncate(self.options.sample_size as usize);

        tracing::debug!(
            entity = %entity,
            records = records.len(),
            "Sampled entity"
        );

        Ok(EntitySample {
            entity: self.infer(entity, &records),
            records_sampled: records.len(),
        })
    }

    /// Infers the entity's fields from already fetched records.
    pub fn infer(&self, entity: &EntityRef, records: &[RawRecord]) -> Entity {
        let max_array_elements = self.options.max_array_elements;
        let mut untagged = FieldInferrer::new(max_array_elements);
        let mut groups: Vec<(String, FieldInferrer)> = Vec::new();

        for record in records {
            let tag = self
                .options
                .mixed_field
                .as_deref()
                .and_then(|field| discriminator_value(record, field));

            match tag {
                Some(tag) => {
                    let position = match groups.iter().position(|(t, _)| *t == tag) {
                        Some(position) => position,
                        None => {
                            groups.push((tag, FieldInferrer::new(max_array_elements)));
                            groups.len() - 1
                        }
                    };
                    groups[position].1.observe_record(record);
                }
                None => untagged.observe_record(record),
            }
        }

        let discriminator_field = if groups.is_empty() {
            None
        } else {
            self.options.mixed_field.clone()
        };

        let mut fields = untagged.finish(None);
        for (tag, inferrer) in groups {
            fields.extend(inferrer.finish(Some(tag)));
        }

        Entity {
            scope: entity.scope.clone(),
            name: entity.name.clone(),
            discriminator_field,
            fields,
        }
    }
}

/// Discriminator value of a record, if the (possibly dotted) path is set.
fn discriminator_value(record: &RawRecord, field: &str) -> Option<String> {
    let mut segments = field.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Per-path accumulation for one field group.
#[derive(Debug)]
struct FieldAccumulator {
    field_type: FieldType,
    /// Records where the path held a non-null value
    count: u32,
    distinct: HashSet<String>,
    /// Array elements inspected so far across all records
    array_elements_seen: u32,
}

impl FieldAccumulator {
    fn new() -> Self {
        Self {
            field_type: FieldType::Unknown,
            count: 0,
            distinct: HashSet::new(),
            array_elements_seen: 0,
        }
    }
}

/// Merges observations from the records of one group.
#[derive(Debug)]
struct FieldInferrer {
    fields: Vec<(String, FieldAccumulator)>,
    index: HashMap<String, usize>,
    record_count: u32,
    max_array_elements: u32,
}

impl FieldInferrer {
    fn new(max_array_elements: u32) -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
            record_count: 0,
            max_array_elements,
        }
    }

    fn observe_record(&mut self, record: &RawRecord) {
        self.record_count = self.record_count.saturating_add(1);
        self.observe_object(record, "");
    }

    fn observe_object(&mut self, object: &RawRecord, prefix: &str) {
        for (key, value) in object {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };

            self.observe_value(&path, value);

            if let Value::Object(nested) = value {
                self.observe_object(nested, &path);
            }
        }
    }

    fn observe_value(&mut self, path: &str, value: &Value) {
        let position = match self.index.get(path) {
            Some(position) => *position,
            None => {
                self.fields.push((path.to_string(), FieldAccumulator::new()));
                self.index.insert(path.to_string(), self.fields.len() - 1);
                self.fields.len() - 1
            }
        };
        let max_array_elements = self.max_array_elements;
        let accumulator = &mut self.fields[position].1;

        let mut budget = max_array_elements.saturating_sub(accumulator.array_elements_seen);
        let budget_before = budget;
        let observed = observe_type(value, &mut budget);
        accumulator.array_elements_seen = accumulator
            .array_elements_seen
            .saturating_add(budget_before - budget);

        accumulator.field_type = accumulator.field_type.merge(&observed);
        if !value.is_null() {
            accumulator.count = accumulator.count.saturating_add(1);
            accumulator.distinct.insert(value.to_string());
        }
    }

    fn finish(self, discriminator: Option<String>) -> Vec<FieldDescriptor> {
        let record_count = self.record_count;
        self.fields
            .into_iter()
            .map(|(name, accumulator)| {
                let nulls = record_count.saturating_sub(accumulator.count);
                FieldDescriptor {
                    name,
                    field_type: accumulator.field_type,
                    nullable: nulls > 0,
                    stats: FieldStats {
                        count: accumulator.count,
                        nulls,
                        distinct: u32::try_from(accumulator.distinct.len()).unwrap_or(u32::MAX),
                    },
                    discriminator: discriminator.clone(),
                }
            })
            .collect()
    }
}

/// Tags one value, inspecting at most `budget` array elements.
fn observe_type(value: &Value, budget: &mut u32) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Bool(_) => FieldType::Bool,
        Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Int,
        Value::Number(_) => FieldType::Float,
        Value::String(s) if looks_like_date(s) => FieldType::Date,
        Value::String(_) => FieldType::String,
        Value::Object(_) => FieldType::Object,
        Value::Array(elements) => {
            let mut element_type = FieldType::Unknown;
            for element in elements {
                if *budget == 0 {
                    break;
                }
                *budget -= 1;
                element_type = element_type.merge(&observe_type(element, budget));
            }
            FieldType::Array(Box::new(element_type))
        }
    }
}

/// Whether a string is an RFC 3339 timestamp or a `YYYY-MM-DD` date.
pub fn looks_like_date(value: &str) -> bool {
    // Cheap shape check before handing over to chrono.
    let bytes = value.as_bytes();
    if bytes.len() < 10 || !bytes[..4].iter().all(u8::is_ascii_digit) || bytes[4] != b'-' {
        return false;
    }
    chrono::DateTime::parse_from_rfc3339(value).is_ok()
        || chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}
