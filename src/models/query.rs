use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::errors::GraphError;

use super::{Entity, Relationship};

/// Expansion direction for traversal and neighborhood queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalDirection {
    Outgoing,
    Incoming,
    Both,
}

/// Result of a structured query execution.
///
/// `records` preserves row order; each row maps a declared return alias to
/// its value. Node and relationship counts are derived structurally from
/// the result set: a value counts as a node when it is an object carrying
/// an `id` key, and as a relationship when it carries both `source_id` and
/// `target_id` keys. Scalar projections are counted as neither.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub records: Vec<HashMap<String, serde_json::Value>>,
    pub execution_time_ms: u64,
    pub node_count: usize,
    pub relationship_count: usize,
}

/// Outcome of a natural-language query. The generated query is always
/// surfaced so callers can audit what actually ran.
#[derive(Debug, Clone, Serialize)]
pub struct TranslatedQueryResult {
    pub generated_query: String,
    pub result: QueryResult,
}

/// Induced subgraph returned by traversal and extraction operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subgraph {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

impl Subgraph {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// A single shortest path, as an ordered node id sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub node_ids: Vec<String>,
}

impl PathResult {
    /// Hop count, not node count.
    pub fn length(&self) -> usize {
        self.node_ids.len().saturating_sub(1)
    }
}

/// Labels, relationship types and property keys currently observed in the
/// store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSchema {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub property_keys: Vec<String>,
}

impl GraphSchema {
    /// Compact rendering handed to the translation client as context.
    pub fn summary(&self) -> String {
        format!(
            "Node labels: {}\nRelationship types: {}\nProperty keys: {}",
            self.labels.join(", "),
            self.relationship_types.join(", "),
            self.property_keys.join(", ")
        )
    }
}

/// Committed-state statistics; in-flight batches are never reflected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStatistics {
    pub node_count: u64,
    pub relationship_count: u64,
    pub label_counts: BTreeMap<String, u64>,
    pub relationship_type_counts: BTreeMap<String, u64>,
}

/// One failed batch inside an otherwise partially-successful call.
#[derive(Debug)]
pub struct FailedBatch {
    /// Zero-based position of the batch within the call.
    pub index: usize,
    pub rows: usize,
    pub error: GraphError,
}

/// Aggregate outcome of a batched write. Failures are isolated per batch;
/// committed batches stay committed.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub batches: usize,
    pub success_count: usize,
    pub failed_batches: Vec<FailedBatch>,
}

impl BatchReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed_batches.is_empty()
    }
}

/// Outcome of a vector index build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexBuildReport {
    pub indexed: usize,
    pub embedded: usize,
    pub reused: usize,
    /// Entities whose embedding computation failed; they are absent from
    /// the index, not fatal to the build.
    pub skipped: usize,
}

/// A scored search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub entity: Entity,
    pub score: f32,
}

/// A search hit together with its k-hop neighborhood.
#[derive(Debug, Clone, Serialize)]
pub struct ContextualSearchResult {
    pub hit: SearchHit,
    pub context: Subgraph,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_length_is_hop_count() {
        let path = PathResult {
            node_ids: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(path.length(), 2);

        let single = PathResult {
            node_ids: vec!["a".into()],
        };
        assert_eq!(single.length(), 0);
    }

    #[test]
    fn test_schema_summary_lists_everything() {
        let schema = GraphSchema {
            labels: vec!["Person".into(), "Organization".into()],
            relationship_types: vec!["WORKS_AT".into()],
            property_keys: vec!["id".into(), "text".into()],
        };
        let summary = schema.summary();
        assert!(summary.contains("Person, Organization"));
        assert!(summary.contains("WORKS_AT"));
    }
}
