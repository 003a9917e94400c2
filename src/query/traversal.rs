//! Frontier expansion against the store, shared by the query engine's
//! traversal operations and contextual search.

use neo4rs::query;
use std::collections::{BTreeMap, HashSet};

use crate::errors::GraphResult;
use crate::graph_db::bolt::string_list;
use crate::graph_db::records::{fetch_entities_by_ids, row_to_relationship};
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::Neo4jClient;
use crate::models::{Relationship, Subgraph, TraversalDirection};

/// Relationships touching any node in `frontier`, in the given direction.
/// `limit` caps the number of edges fetched for one hop.
pub(crate) async fn fetch_adjacent(
    client: &Neo4jClient,
    frontier: &[String],
    direction: TraversalDirection,
    limit: Option<usize>,
) -> GraphResult<Vec<Relationship>> {
    if frontier.is_empty() {
        return Ok(Vec::new());
    }

    let pattern = match direction {
        TraversalDirection::Outgoing => format!("(a:`{base}`)-[r]->(b:`{base}`)", base = BASE_LABEL),
        TraversalDirection::Incoming => format!("(a:`{base}`)<-[r]-(b:`{base}`)", base = BASE_LABEL),
        TraversalDirection::Both => format!("(a:`{base}`)-[r]-(b:`{base}`)", base = BASE_LABEL),
    };
    let limit_clause = match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    };
    let cypher = format!(
        "MATCH {pattern} WHERE a.id IN $frontier \
         RETURN DISTINCT startNode(r).id AS source_id, endNode(r).id AS target_id, \
                type(r) AS rel_type, properties(r) AS props, \
                coalesce(r.weight, 1.0) AS weight{limit_clause}",
    );

    let rows = client
        .execute_collect(query(&cypher).param("frontier", string_list(frontier)))
        .await?;
    rows.iter().map(row_to_relationship).collect()
}

/// Breadth-first expansion from `seeds` up to `depth` hops, returning the
/// induced subgraph. Nodes and edges reached via multiple paths appear
/// once.
pub(crate) async fn expand_neighborhood(
    client: &Neo4jClient,
    seeds: &[String],
    depth: usize,
    direction: TraversalDirection,
    per_hop_limit: Option<usize>,
) -> GraphResult<Subgraph> {
    let mut visited: HashSet<String> = seeds.iter().cloned().collect();
    let mut edges: BTreeMap<(String, String, String), Relationship> = BTreeMap::new();
    let mut frontier: Vec<String> = {
        let mut f: Vec<String> = visited.iter().cloned().collect();
        f.sort();
        f
    };

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let rels = fetch_adjacent(client, &frontier, direction, per_hop_limit).await?;
        let mut next: HashSet<String> = HashSet::new();
        for rel in rels {
            for endpoint in [&rel.source_id, &rel.target_id] {
                if !visited.contains(endpoint) {
                    next.insert(endpoint.clone());
                }
            }
            edges.insert(rel.merge_key(), rel);
        }
        visited.extend(next.iter().cloned());
        frontier = {
            let mut f: Vec<String> = next.into_iter().collect();
            f.sort();
            f
        };
    }

    let mut ids: Vec<String> = visited.into_iter().collect();
    ids.sort();
    let entities = fetch_entities_by_ids(client, &ids).await?;

    Ok(Subgraph {
        entities,
        relationships: edges.into_values().collect(),
    })
}
