//! Row -> model hydration for the read paths.
//!
//! Read queries project scalars and property maps (`properties(n)`), never
//! raw driver node objects, so every consumer deserializes through one
//! place.

use neo4rs::{query, Row};
use std::collections::HashMap;

use crate::errors::{GraphError, GraphResult};
use crate::models::{Entity, PropertyValue, Relationship};

use super::bolt::string_list;
use super::client::Neo4jClient;
use super::schema::BASE_LABEL;

const NODE_RESERVED: [&str; 6] = [
    "id",
    "text",
    "embedding",
    "confidence",
    "created_at",
    "updated_at",
];
const REL_RESERVED: [&str; 4] = ["weight", "confidence", "created_at", "updated_at"];

pub(crate) fn entity_projection() -> String {
    format!(
        "n.id AS id, n.text AS text, \
         [l IN labels(n) WHERE l <> '{}'] AS labels, \
         properties(n) AS props",
        BASE_LABEL
    )
}

pub(crate) fn row_to_entity(row: &Row) -> GraphResult<Entity> {
    let id: String = get(row, "id")?;
    let text: Option<String> = get(row, "text")?;
    let labels: Vec<String> = get(row, "labels")?;
    let props: HashMap<String, serde_json::Value> = get(row, "props")?;

    let confidence = props
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|v| v as f32);

    let properties = props
        .iter()
        .filter(|(key, _)| !NODE_RESERVED.contains(&key.as_str()))
        .filter_map(|(key, value)| PropertyValue::from_json(value).map(|v| (key.clone(), v)))
        .collect();

    Ok(Entity {
        id,
        text: text.unwrap_or_default(),
        labels,
        properties,
        confidence,
        embedding: None,
    })
}

pub(crate) fn row_to_relationship(row: &Row) -> GraphResult<Relationship> {
    let source_id: String = get(row, "source_id")?;
    let target_id: String = get(row, "target_id")?;
    let rel_type: String = get(row, "rel_type")?;
    let weight: f64 = get(row, "weight")?;
    let props: HashMap<String, serde_json::Value> = get(row, "props")?;

    let confidence = props
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|v| v as f32);

    let properties = props
        .iter()
        .filter(|(key, _)| !REL_RESERVED.contains(&key.as_str()))
        .filter_map(|(key, value)| PropertyValue::from_json(value).map(|v| (key.clone(), v)))
        .collect();

    Ok(Relationship {
        source_id,
        target_id,
        rel_type,
        properties,
        confidence,
        weight: weight as f32,
    })
}

/// Fetch entities by id, preserving the order of `ids`; unknown ids are
/// silently absent.
pub(crate) async fn fetch_entities_by_ids(
    client: &Neo4jClient,
    ids: &[String],
) -> GraphResult<Vec<Entity>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let cypher = format!(
        "MATCH (n:`{}`) WHERE n.id IN $ids RETURN {}",
        BASE_LABEL,
        entity_projection()
    );
    let rows = client
        .execute_collect(query(&cypher).param("ids", string_list(ids)))
        .await?;

    let mut by_id: HashMap<String, Entity> = rows
        .iter()
        .map(row_to_entity)
        .collect::<GraphResult<Vec<_>>>()?
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect();

    Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
}

/// Relationships whose endpoints are both inside `ids` (the induced edge
/// set).
pub(crate) async fn fetch_induced_relationships(
    client: &Neo4jClient,
    ids: &[String],
) -> GraphResult<Vec<Relationship>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let cypher = format!(
        "MATCH (a:`{base}`)-[r]->(b:`{base}`) \
         WHERE a.id IN $ids AND b.id IN $ids \
         RETURN a.id AS source_id, b.id AS target_id, type(r) AS rel_type, \
                properties(r) AS props, coalesce(r.weight, 1.0) AS weight",
        base = BASE_LABEL
    );
    let rows = client
        .execute_collect(query(&cypher).param("ids", string_list(ids)))
        .await?;
    rows.iter().map(row_to_relationship).collect()
}

pub(crate) struct IndexCandidate {
    pub id: String,
    pub text: String,
    pub labels: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

/// Every entity eligible for the vector index, with any cached embedding.
pub(crate) async fn fetch_index_candidates(
    client: &Neo4jClient,
    label_filter: Option<&str>,
) -> GraphResult<Vec<IndexCandidate>> {
    let match_clause = match label_filter {
        Some(label) => {
            super::validate_identifier("label", label)?;
            format!("MATCH (n:`{}`:`{}`)", BASE_LABEL, label)
        }
        None => format!("MATCH (n:`{}`)", BASE_LABEL),
    };
    let cypher = format!(
        "{} RETURN n.id AS id, n.text AS text, \
         [l IN labels(n) WHERE l <> '{}'] AS labels, \
         n.embedding AS embedding",
        match_clause, BASE_LABEL
    );

    let rows = client.execute_collect(query(&cypher)).await?;
    rows.iter()
        .map(|row| {
            Ok(IndexCandidate {
                id: get(row, "id")?,
                text: get::<Option<String>>(row, "text")?.unwrap_or_default(),
                labels: get(row, "labels")?,
                embedding: get(row, "embedding")?,
            })
        })
        .collect()
}

fn get<'a, T: serde::Deserialize<'a>>(row: &'a Row, alias: &str) -> GraphResult<T> {
    row.get::<T>(alias)
        .map_err(|e| GraphError::QueryExecution(format!("missing or mistyped `{}`: {}", alias, e)))
}
