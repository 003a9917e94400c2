//! Read-only snapshot export for offline tooling. Not part of the live
//! query path.

use neo4rs::query;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

use crate::errors::GraphResult;
use crate::graph_db::records::{entity_projection, row_to_entity, row_to_relationship};
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::Neo4jClient;
use crate::models::{Entity, Relationship};

/// Node and edge tables of a full graph snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GraphTables {
    pub nodes: Vec<Entity>,
    pub edges: Vec<Relationship>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjacencyEntry {
    pub target: String,
    pub rel_type: String,
}

pub struct GraphExporter {
    client: Arc<Neo4jClient>,
}

impl GraphExporter {
    pub fn new(client: Arc<Neo4jClient>) -> Self {
        Self { client }
    }

    /// Snapshot every entity and relationship as flat tables, ordered by
    /// id for stable diffs.
    pub async fn export_tables(&self) -> GraphResult<GraphTables> {
        let node_q = format!(
            "MATCH (n:`{}`) RETURN {} ORDER BY n.id",
            BASE_LABEL,
            entity_projection()
        );
        let nodes = self
            .client
            .execute_collect(query(&node_q))
            .await?
            .iter()
            .map(row_to_entity)
            .collect::<GraphResult<Vec<_>>>()?;

        let edge_q = format!(
            "MATCH (a:`{base}`)-[r]->(b:`{base}`) \
             RETURN a.id AS source_id, b.id AS target_id, type(r) AS rel_type, \
                    properties(r) AS props, coalesce(r.weight, 1.0) AS weight \
             ORDER BY a.id, b.id",
            base = BASE_LABEL
        );
        let edges = self
            .client
            .execute_collect(query(&edge_q))
            .await?
            .iter()
            .map(row_to_relationship)
            .collect::<GraphResult<Vec<_>>>()?;

        tracing::info!(
            "Exported snapshot: {} nodes, {} edges",
            nodes.len(),
            edges.len()
        );
        Ok(GraphTables { nodes, edges })
    }

    /// Outgoing adjacency form of the same snapshot.
    pub async fn export_adjacency(&self) -> GraphResult<BTreeMap<String, Vec<AdjacencyEntry>>> {
        let tables = self.export_tables().await?;
        Ok(build_adjacency(&tables.edges))
    }

    /// Serialize any export artifact to a JSON file.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> GraphResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, value)?;
        Ok(())
    }
}

pub(crate) fn build_adjacency(edges: &[Relationship]) -> BTreeMap<String, Vec<AdjacencyEntry>> {
    let mut adjacency: BTreeMap<String, Vec<AdjacencyEntry>> = BTreeMap::new();
    for edge in edges {
        adjacency
            .entry(edge.source_id.clone())
            .or_default()
            .push(AdjacencyEntry {
                target: edge.target_id.clone(),
                rel_type: edge.rel_type.clone(),
            });
    }
    for entries in adjacency.values_mut() {
        entries.sort_by(|a, b| a.target.cmp(&b.target).then_with(|| a.rel_type.cmp(&b.rel_type)));
    }
    adjacency
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_adjacency_groups_and_sorts() {
        let edges = vec![
            Relationship::new("a", "c", "KNOWS"),
            Relationship::new("a", "b", "KNOWS"),
            Relationship::new("b", "c", "WORKS_AT"),
        ];
        let adjacency = build_adjacency(&edges);
        assert_eq!(adjacency.len(), 2);
        assert_eq!(adjacency["a"][0].target, "b");
        assert_eq!(adjacency["a"][1].target, "c");
        assert_eq!(adjacency["b"][0].rel_type, "WORKS_AT");
    }
}
