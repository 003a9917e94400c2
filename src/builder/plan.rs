//! Pure batch planning: dedup, partitioning and Cypher rendering.
//!
//! Nothing in this module touches the store, which keeps the batching
//! contract testable. Dispatch lives in [`super::GraphBuilder`].

use std::collections::{BTreeMap, HashMap};

use crate::errors::GraphResult;
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::validate_identifier;
use crate::models::{Entity, Relationship};

/// Node property keys managed by the core itself; caller-supplied
/// properties with these names are ignored on write.
pub(crate) const RESERVED_KEYS: [&str; 5] = ["id", "text", "embedding", "created_at", "updated_at"];

/// Within a single call, two entities with the same id are resolved by
/// taking the last occurrence, keeping first-occurrence ordering. This
/// happens before dispatch so a single transaction never races against
/// itself.
pub(crate) fn dedup_entities(entities: Vec<Entity>) -> Vec<Entity> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Entity> = Vec::with_capacity(entities.len());
    for entity in entities {
        match position.get(&entity.id) {
            Some(&idx) => out[idx] = entity,
            None => {
                position.insert(entity.id.clone(), out.len());
                out.push(entity);
            }
        }
    }
    out
}

/// Relationship dedup keys on `(source, target, type)`, last occurrence
/// wins.
pub(crate) fn dedup_relationships(relationships: Vec<Relationship>) -> Vec<Relationship> {
    let mut position: HashMap<(String, String, String), usize> = HashMap::new();
    let mut out: Vec<Relationship> = Vec::with_capacity(relationships.len());
    for rel in relationships {
        let key = rel.merge_key();
        match position.get(&key) {
            Some(&idx) => out[idx] = rel,
            None => {
                position.insert(key, out.len());
                out.push(rel);
            }
        }
    }
    out
}

pub(crate) fn partition<T>(items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::with_capacity(batch_size.min(items.len()));
    for item in items {
        current.push(item);
        if current.len() == batch_size {
            batches.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// One UNWIND statement covering every entity in a batch that shares a
/// label signature.
pub(crate) struct EntityGroup {
    pub cypher: String,
    pub entities: Vec<Entity>,
}

/// Plan for a single entity batch: one transaction, one statement per
/// label signature.
pub(crate) fn plan_entity_batch(batch: Vec<Entity>) -> GraphResult<Vec<EntityGroup>> {
    let mut by_signature: BTreeMap<Vec<String>, Vec<Entity>> = BTreeMap::new();
    for entity in batch {
        let mut signature = entity.labels.clone();
        signature.sort();
        signature.dedup();
        by_signature.entry(signature).or_default().push(entity);
    }

    let mut groups = Vec::with_capacity(by_signature.len());
    for (signature, entities) in by_signature {
        groups.push(EntityGroup {
            cypher: render_entity_merge(&signature)?,
            entities,
        });
    }
    Ok(groups)
}

fn render_entity_merge(labels: &[String]) -> GraphResult<String> {
    let mut label_clause = String::new();
    for label in labels {
        validate_identifier("label", label)?;
        if label != BASE_LABEL {
            label_clause.push_str(&format!(":`{}`", label));
        }
    }

    let set_labels = if label_clause.is_empty() {
        String::new()
    } else {
        format!("SET n{}\n", label_clause)
    };

    // ON MATCH runs before the later SET clauses, so the CASE sees the
    // pre-merge text and drops the cached embedding when it changed.
    Ok(format!(
        "UNWIND $rows AS row\n\
         MERGE (n:`{base}` {{id: row.id}})\n\
         ON CREATE SET n.created_at = $now\n\
         ON MATCH SET n.embedding = CASE WHEN n.text = row.text THEN n.embedding ELSE null END\n\
         {set_labels}\
         SET n.text = row.text,\n\
         \x20   n += row.props,\n\
         \x20   n.embedding = coalesce(row.embedding, n.embedding),\n\
         \x20   n.updated_at = $now",
        base = BASE_LABEL,
        set_labels = set_labels,
    ))
}

/// One UNWIND merge per relationship type plus a shared endpoint probe.
pub(crate) struct RelationshipBatchPlan {
    pub probe_cypher: String,
    pub groups: Vec<RelationshipGroup>,
}

pub(crate) struct RelationshipGroup {
    pub cypher: String,
    pub relationships: Vec<Relationship>,
}

pub(crate) fn plan_relationship_batch(batch: Vec<Relationship>) -> GraphResult<RelationshipBatchPlan> {
    let mut by_type: BTreeMap<String, Vec<Relationship>> = BTreeMap::new();
    for rel in batch {
        by_type.entry(rel.rel_type.clone()).or_default().push(rel);
    }

    let mut groups = Vec::with_capacity(by_type.len());
    for (rel_type, relationships) in by_type {
        groups.push(RelationshipGroup {
            cypher: render_relationship_merge(&rel_type)?,
            relationships,
        });
    }

    Ok(RelationshipBatchPlan {
        probe_cypher: render_endpoint_probe(),
        groups,
    })
}

fn render_relationship_merge(rel_type: &str) -> GraphResult<String> {
    validate_identifier("relationship type", rel_type)?;
    Ok(format!(
        "UNWIND $rows AS row\n\
         MATCH (a:`{base}` {{id: row.source_id}})\n\
         MATCH (b:`{base}` {{id: row.target_id}})\n\
         MERGE (a)-[r:`{rel_type}`]->(b)\n\
         ON CREATE SET r.created_at = $now\n\
         SET r += row.props,\n\
         \x20   r.weight = row.weight,\n\
         \x20   r.updated_at = $now",
        base = BASE_LABEL,
        rel_type = rel_type,
    ))
}

/// Entities-first staging check, run against committed state immediately
/// before the merge transaction. Returns the rows whose endpoints do not
/// resolve.
fn render_endpoint_probe() -> String {
    format!(
        "UNWIND $rows AS row\n\
         OPTIONAL MATCH (a:`{base}` {{id: row.source_id}})\n\
         OPTIONAL MATCH (b:`{base}` {{id: row.target_id}})\n\
         WITH row, a, b\n\
         WHERE a IS NULL OR b IS NULL\n\
         RETURN row.source_id AS source_id, row.target_id AS target_id, row.rel_type AS rel_type",
        base = BASE_LABEL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_entities_last_occurrence_wins() {
        let entities = vec![
            Entity::new("e1", "first", "Person"),
            Entity::new("e2", "other", "Person"),
            Entity::new("e1", "second", "Person"),
        ];
        let deduped = dedup_entities(entities);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].id, "e1");
        assert_eq!(deduped[0].text, "second");
        assert_eq!(deduped[1].id, "e2");
    }

    #[test]
    fn test_dedup_relationships_keys_on_triple() {
        let rels = vec![
            Relationship::new("a", "b", "KNOWS").with_weight(1.0),
            Relationship::new("a", "b", "WORKS_AT"),
            Relationship::new("a", "b", "KNOWS").with_weight(2.0),
        ];
        let deduped = dedup_relationships(rels);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].weight, 2.0);
    }

    #[test]
    fn test_partition_sizes() {
        let batches = partition((0..7).collect::<Vec<_>>(), 3);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0], vec![0, 1, 2]);
        assert_eq!(batches[2], vec![6]);

        assert!(partition(Vec::<i32>::new(), 3).is_empty());
    }

    #[test]
    fn test_entity_plan_groups_by_label_signature() {
        let batch = vec![
            Entity::new("p1", "Ada", "Person"),
            Entity::new("o1", "Acme", "Organization"),
            Entity::new("p2", "Grace", "Person"),
        ];
        let groups = plan_entity_batch(batch).unwrap();
        assert_eq!(groups.len(), 2);
        let person_group = groups
            .iter()
            .find(|g| g.cypher.contains(":`Person`"))
            .unwrap();
        assert_eq!(person_group.entities.len(), 2);
    }

    #[test]
    fn test_entity_merge_cypher_shape() {
        let cypher = render_entity_merge(&["Person".to_string()]).unwrap();
        assert!(cypher.starts_with("UNWIND $rows AS row"));
        assert!(cypher.contains("MERGE (n:`Entity` {id: row.id})"));
        assert!(cypher.contains("ON MATCH SET n.embedding = CASE"));
        assert!(cypher.contains("n += row.props"));
    }

    #[test]
    fn test_invalid_label_is_rejected_at_plan_time() {
        let batch = vec![Entity::new("x", "x", "Person) DETACH DELETE (m")];
        assert!(plan_entity_batch(batch).is_err());
    }

    #[test]
    fn test_relationship_plan_probe_and_groups() {
        let plan = plan_relationship_batch(vec![
            Relationship::new("a", "b", "KNOWS"),
            Relationship::new("b", "c", "WORKS_AT"),
        ])
        .unwrap();
        assert!(plan.probe_cypher.contains("WHERE a IS NULL OR b IS NULL"));
        assert_eq!(plan.groups.len(), 2);
        assert!(plan.groups[0].cypher.contains("MERGE (a)-[r:`KNOWS`]->(b)"));
    }

    #[test]
    fn test_invalid_relationship_type_is_rejected() {
        assert!(plan_relationship_batch(vec![Relationship::new("a", "b", "KNOWS]->()<-[")]).is_err());
    }
}
