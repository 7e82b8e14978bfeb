//! Relation discovery across sampled entities.
//!
//! Declared relations (foreign keys reported by the source) pass through at
//! confidence 1.0. When inference is enabled, fields named after another
//! entity (`user_id`, `userId`, `user.id`, `author_user_id`, `user_id_fk`) are
//! proposed as `name-match` candidates pointing at that entity's key field.

use crate::connectors::RelationInferenceConfig;
use crate::models::{Entity, FieldRef, RelationCandidate, RelationMethod};
use std::collections::{HashMap, HashSet};

/// Field names treated as an entity's key, in lookup order.
pub const KEY_FIELD_NAMES: [&str; 2] = ["id", "_id"];

/// Collects declared relations and proposes name-match candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationInferrer {
    config: RelationInferenceConfig,
}

impl RelationInferrer {
    pub fn new(config: RelationInferenceConfig) -> Self {
        Self { config }
    }

    /// Produces the relation set for a document.
    ///
    /// Declared relations come first in the order given, followed by
    /// heuristic candidates in entity then field order. Candidates whose
    /// endpoints are not fields of `entities` are dropped.
    pub fn infer(
        &self,
        entities: &[Entity],
        declared: Vec<RelationCandidate>,
    ) -> Vec<RelationCandidate> {
        let known: HashSet<(String, &str)> = entities
            .iter()
            .flat_map(|e| {
                let qualified = e.qualified_name();
                e.fields
                    .iter()
                    .map(move |f| (qualified.clone(), f.name.as_str()))
            })
            .collect();
        let resolves = |field: &FieldRef| known.contains(&(field.entity.clone(), field.field.as_str()));

        let mut relations: Vec<RelationCandidate> = Vec::new();
        let mut seen: HashMap<(FieldRef, FieldRef), usize> = HashMap::new();

        for relation in declared {
            if !resolves(&relation.from) || !resolves(&relation.to) {
                tracing::debug!(
                    from = %relation.from,
                    to = %relation.to,
                    "Dropping declared relation with an unsampled endpoint"
                );
                continue;
            }
            let relation = RelationCandidate::declared(relation.from, relation.to);
            let key = (relation.from.clone(), relation.to.clone());
            if !seen.contains_key(&key) {
                seen.insert(key, relations.len());
                relations.push(relation);
            }
        }

        if !self.config.enabled {
            return relations;
        }

        let targets: Vec<Target> = entities.iter().filter_map(Target::for_entity).collect();

        for source in entities {
            let source_name = source.qualified_name();
            let mut fields_seen = HashSet::new();

            for field in &source.fields {
                if !fields_seen.insert(field.name.as_str()) || is_key_field(&field.name) {
                    continue;
                }

                for target in &targets {
                    if target.entity == source_name {
                        continue;
                    }
                    let Some(confidence) = self.match_confidence(&field.name, target) else {
                        continue;
                    };

                    let from = FieldRef::new(source_name.clone(), field.name.clone());
                    let to = FieldRef::new(target.entity.clone(), target.key);
                    let key = (from.clone(), to.clone());

                    match seen.get(&key) {
                        Some(&index) => {
                            let existing = &mut relations[index];
                            if existing.method == RelationMethod::NameMatch
                                && existing.confidence < confidence
                            {
                                existing.confidence = confidence;
                            }
                        }
                        None => {
                            seen.insert(key, relations.len());
                            relations.push(RelationCandidate {
                                from,
                                to,
                                confidence,
                                method: RelationMethod::NameMatch,
                            });
                        }
                    }
                }
            }
        }

        relations
    }

    /// Confidence of a field name pointing at the target, if it matches at all.
    fn match_confidence(&self, field_name: &str, target: &Target) -> Option<f64> {
        let path = field_name.to_lowercase();
        let leaf = path.rsplit('.').next().unwrap_or(&path);
        let key = target.key.to_lowercase();

        let mut best: Option<f64> = None;
        for stem in &target.stems {
            let patterns = [
                format!("{}_id", stem),
                format!("{}id", stem),
                format!("{}_{}", stem, key),
            ];

            let exact = patterns.iter().any(|p| leaf == p.as_str()) || path == format!("{}.{}", stem, key);
            let confidence = if exact {
                Some(self.config.exact_suffix_confidence)
            } else if patterns
                .iter()
                .any(|p| leaf.len() > p.len() && leaf.contains(p.as_str()))
            {
                Some(self.config.substring_confidence)
            } else {
                None
            };

            best = match (best, confidence) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }
        best
    }
}

/// An entity that can be pointed at: it has a key-like field.
#[derive(Debug)]
struct Target {
    entity: String,
    key: &'static str,
    stems: Vec<String>,
}

impl Target {
    fn for_entity(entity: &Entity) -> Option<Self> {
        let key = KEY_FIELD_NAMES
            .into_iter()
            .find(|key| entity.has_field(key))?;

        let name = entity.name.to_lowercase();
        let singular = singularize(&name);
        let mut stems = vec![name];
        if !stems.contains(&singular) && !singular.is_empty() {
            stems.push(singular);
        }

        Some(Self {
            entity: entity.qualified_name(),
            key,
            stems,
        })
    }
}

fn is_key_field(name: &str) -> bool {
    KEY_FIELD_NAMES.contains(&name)
}

/// English singular form good enough for table names.
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("sses") {
        name[..name.len() - 2].to_string()
    } else if ["xes", "ches", "shes"].iter().any(|s| name.ends_with(s)) {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldDescriptor, FieldStats, FieldType};

    fn entity(name: &str, fields: &[&str]) -> Entity {
        Entity {
            scope: None,
            name: name.to_string(),
            discriminator_field: None,
            fields: fields
                .iter()
                .map(|f| FieldDescriptor {
                    name: (*f).to_string(),
                    field_type: FieldType::Int,
                    nullable: false,
                    stats: FieldStats::default(),
                    discriminator: None,
                })
                .collect(),
        }
    }

    fn enabled() -> RelationInferrer {
        RelationInferrer::new(RelationInferenceConfig::default().with_enabled(true))
    }

    #[test]
    fn test_users_orders_single_candidate() {
        let entities = vec![entity("users", &["id"]), entity("orders", &["id", "user_id"])];
        let relations = enabled().infer(&entities, Vec::new());

        assert_eq!(relations.len(), 1);
        let relation = &relations[0];
        assert_eq!(relation.from, FieldRef::new("orders", "user_id"));
        assert_eq!(relation.to, FieldRef::new("users", "id"));
        assert_eq!(relation.method, RelationMethod::NameMatch);
        assert_eq!(relation.confidence, 0.8);
    }

    #[test]
    fn test_disabled_inference_keeps_only_declared() {
        let entities = vec![entity("users", &["id"]), entity("orders", &["id", "user_id"])];
        let declared = vec![RelationCandidate::declared(
            FieldRef::new("orders", "user_id"),
            FieldRef::new("users", "id"),
        )];

        let relations = RelationInferrer::default().infer(&entities, declared);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].method, RelationMethod::Declared);

        let relations = RelationInferrer::default().infer(&entities, Vec::new());
        assert!(relations.is_empty());
    }

    #[test]
    fn test_declared_wins_over_heuristic_duplicate() {
        let entities = vec![entity("users", &["id"]), entity("orders", &["id", "user_id"])];
        let mut weak = RelationCandidate::declared(
            FieldRef::new("orders", "user_id"),
            FieldRef::new("users", "id"),
        );
        weak.confidence = 0.1;

        let relations = enabled().infer(&entities, vec![weak]);
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].method, RelationMethod::Declared);
        assert_eq!(relations[0].confidence, 1.0);
    }

    #[test]
    fn test_naming_variants_and_confidence_order() {
        let entities = vec![
            entity("categories", &["_id", "name"]),
            entity(
                "products",
                &["_id", "categoryId", "parent_category_id", "category._id", "category"],
            ),
        ];
        let relations = enabled().infer(&entities, Vec::new());

        let confidence = |field: &str| {
            relations
                .iter()
                .find(|r| r.from.field == field)
                .map(|r| r.confidence)
        };
        assert_eq!(confidence("categoryId"), Some(0.8));
        assert_eq!(confidence("category._id"), Some(0.8));
        assert_eq!(confidence("parent_category_id"), Some(0.5));
        assert_eq!(confidence("category"), None);
        assert!(relations.iter().all(|r| r.to == FieldRef::new("categories", "_id")));
    }

    #[test]
    fn test_infix_names_match_at_substring_confidence() {
        let entities = vec![
            entity("users", &["id"]),
            entity("orders", &["id", "user_id_legacy", "fk_user_id", "username"]),
        ];
        let relations = enabled().infer(&entities, Vec::new());

        let fields: Vec<(&str, f64)> = relations
            .iter()
            .map(|r| (r.from.field.as_str(), r.confidence))
            .collect();
        assert_eq!(fields, [("user_id_legacy", 0.5), ("fk_user_id", 0.5)]);
    }

    #[test]
    fn test_unresolved_declared_relations_dropped() {
        let entities = vec![entity("users", &["id"])];
        let declared = vec![RelationCandidate::declared(
            FieldRef::new("orders", "user_id"),
            FieldRef::new("users", "id"),
        )];
        assert!(enabled().infer(&entities, declared).is_empty());
    }

    #[test]
    fn test_entity_without_key_is_not_a_target() {
        let entities = vec![entity("audit", &["event"]), entity("logs", &["audit_id"])];
        assert!(enabled().infer(&entities, Vec::new()).is_empty());
    }

    #[test]
    fn test_self_reference_skipped() {
        let entities = vec![entity("employees", &["id", "employee_id"])];
        assert!(enabled().infer(&entities, Vec::new()).is_empty());
    }

    #[test]
    fn test_scoped_entities_use_qualified_names() {
        let mut users = entity("users", &["id"]);
        users.scope = Some("public".to_string());
        let mut orders = entity("orders", &["id", "user_id"]);
        orders.scope = Some("sales".to_string());

        let relations = enabled().infer(&[users, orders], Vec::new());
        assert_eq!(relations[0].from, FieldRef::new("sales.orders", "user_id"));
        assert_eq!(relations[0].to, FieldRef::new("public.users", "id"));
    }

    #[test]
    fn test_singularize() {
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("addresses"), "address");
        assert_eq!(singularize("boxes"), "box");
        assert_eq!(singularize("matches"), "match");
        assert_eq!(singularize("wishes"), "wish");
        assert_eq!(singularize("glass"), "glass");
        assert_eq!(singularize("person"), "person");
    }
}
