//! Structured query execution, NL translation plumbing, and traversal
//! primitives.

mod pathing;
pub mod translator;
pub(crate) mod traversal;

pub use translator::{OpenAiTranslationClient, TranslationClient, TranslationRequest};

use neo4rs::query;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::QueryConfig;
use crate::errors::{GraphError, GraphResult};
use crate::graph_db::bolt::property_to_bolt;
use crate::graph_db::client::rows_to_json;
use crate::graph_db::records::{fetch_entities_by_ids, fetch_induced_relationships};
use crate::graph_db::Neo4jClient;
use crate::models::{
    GraphSchema, PathResult, PropertyValue, QueryResult, Subgraph, TranslatedQueryResult,
    TraversalDirection,
};

use pathing::all_shortest_paths;
use translator::{sanitize_generated_query, validate_read_only};
use traversal::{expand_neighborhood, fetch_adjacent};

pub struct QueryEngine {
    client: Arc<Neo4jClient>,
    config: QueryConfig,
    translator: Option<Arc<dyn TranslationClient>>,
}

impl QueryEngine {
    pub fn new(
        client: Arc<Neo4jClient>,
        config: QueryConfig,
        translator: Option<Arc<dyn TranslationClient>>,
    ) -> Self {
        Self {
            client,
            config,
            translator,
        }
    }

    /// Execute a parameterized query under a hard deadline.
    ///
    /// Caller values are always bound as parameters, never interpolated
    /// into the query text.
    pub async fn execute_structured_query(
        &self,
        cypher: &str,
        parameters: HashMap<String, PropertyValue>,
        timeout: Option<Duration>,
    ) -> GraphResult<QueryResult> {
        let deadline = timeout.unwrap_or(Duration::from_millis(self.config.default_timeout_ms));
        let mut q = query(cypher);
        for (key, value) in &parameters {
            q = q.param(key.as_str(), property_to_bolt(value));
        }

        let started = Instant::now();
        let rows = self.client.execute_collect_timeout(q, deadline).await?;
        let records = rows_to_json(&rows)?;
        let (node_count, relationship_count) = count_result_shapes(&records);

        Ok(QueryResult {
            records,
            execution_time_ms: started.elapsed().as_millis() as u64,
            node_count,
            relationship_count,
        })
    }

    /// Translate a natural-language request and execute the result.
    ///
    /// The generated query is always returned to the caller. Translator
    /// failures (including store-rejected syntax) surface as
    /// [`GraphError::Translation`]; failures of a well-formed query keep
    /// their own error kind so "could not understand" and "understood but
    /// failed" stay distinguishable.
    pub async fn execute_natural_language(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> GraphResult<TranslatedQueryResult> {
        let translator = self
            .translator
            .clone()
            .ok_or_else(|| GraphError::Translation("no translation client configured".into()))?;

        let schema = self.get_schema().await?;
        let summary = schema.summary();
        let cypher = translate_with_retries(
            translator.as_ref(),
            text,
            &summary,
            self.config.translation_max_retries,
            cancel,
        )
        .await?;

        tracing::info!("Translated request into query: {}", cypher);
        match self
            .execute_structured_query(&cypher, HashMap::new(), None)
            .await
        {
            Ok(result) => Ok(TranslatedQueryResult {
                generated_query: cypher,
                result,
            }),
            Err(GraphError::QuerySyntax(msg)) => Err(GraphError::Translation(format!(
                "generated query was rejected by the store: {}",
                msg
            ))),
            Err(other) => Err(other),
        }
    }

    /// Breadth-first expansion from an entity, deduplicating nodes and
    /// edges reached via multiple paths.
    pub async fn traverse_from_entity(
        &self,
        id: &str,
        depth: usize,
        direction: TraversalDirection,
    ) -> GraphResult<Subgraph> {
        let seeds = vec![id.to_string()];
        if fetch_entities_by_ids(&self.client, &seeds).await?.is_empty() {
            return Err(GraphError::NotFound(id.to_string()));
        }
        expand_neighborhood(&self.client, &seeds, depth, direction, None).await
    }

    /// All shortest paths (by hop count) between two entities, within
    /// `max_hops`. No path within the bound is an empty result.
    pub async fn find_shortest_path(
        &self,
        source_id: &str,
        target_id: &str,
        max_hops: usize,
    ) -> GraphResult<Vec<PathResult>> {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(source_id.to_string());
        let mut frontier = vec![source_id.to_string()];

        for _ in 0..max_hops {
            if frontier.is_empty() || visited.contains(target_id) {
                break;
            }
            let rels = fetch_adjacent(&self.client, &frontier, TraversalDirection::Both, None).await?;
            let mut next: HashSet<String> = HashSet::new();
            for rel in &rels {
                adjacency
                    .entry(rel.source_id.clone())
                    .or_default()
                    .push(rel.target_id.clone());
                adjacency
                    .entry(rel.target_id.clone())
                    .or_default()
                    .push(rel.source_id.clone());
                for endpoint in [&rel.source_id, &rel.target_id] {
                    if !visited.contains(endpoint) {
                        next.insert(endpoint.clone());
                    }
                }
            }
            visited.extend(next.iter().cloned());
            frontier = {
                let mut f: Vec<String> = next.into_iter().collect();
                f.sort();
                f
            };
        }

        Ok(all_shortest_paths(&adjacency, source_id, target_id, max_hops)
            .into_iter()
            .map(|node_ids| PathResult { node_ids })
            .collect())
    }

    /// Induced subgraph reachable within `depth` hops of the seed union.
    pub async fn extract_subgraph(
        &self,
        entity_ids: &[String],
        depth: usize,
    ) -> GraphResult<Subgraph> {
        let expanded =
            expand_neighborhood(&self.client, entity_ids, depth, TraversalDirection::Both, None)
                .await?;
        let ids: Vec<String> = expanded.entities.iter().map(|e| e.id.clone()).collect();
        let relationships = fetch_induced_relationships(&self.client, &ids).await?;
        Ok(Subgraph {
            entities: expanded.entities,
            relationships,
        })
    }

    /// Read-only introspection of labels, relationship types and property
    /// keys observed in the store.
    pub async fn get_schema(&self) -> GraphResult<GraphSchema> {
        let mut schema = GraphSchema::default();

        for row in self
            .client
            .execute_collect(query("CALL db.labels() YIELD label RETURN label"))
            .await?
        {
            let label: String = row
                .get("label")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            if label != crate::graph_db::schema::BASE_LABEL {
                schema.labels.push(label);
            }
        }

        for row in self
            .client
            .execute_collect(query(
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType AS rel_type",
            ))
            .await?
        {
            let rel_type: String = row
                .get("rel_type")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            schema.relationship_types.push(rel_type);
        }

        for row in self
            .client
            .execute_collect(query(
                "CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey AS property_key",
            ))
            .await?
        {
            let key: String = row
                .get("property_key")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            schema.property_keys.push(key);
        }

        schema.labels.sort();
        schema.relationship_types.sort();
        schema.property_keys.sort();
        Ok(schema)
    }
}

/// Drive the translator until it produces a query that passes the
/// read-only gate, up to `max_retries` additional attempts.
async fn translate_with_retries(
    translator: &dyn TranslationClient,
    text: &str,
    schema_summary: &str,
    max_retries: u32,
    cancel: &CancellationToken,
) -> GraphResult<String> {
    let mut last_err: Option<GraphError> = None;

    for attempt in 0..=max_retries {
        if cancel.is_cancelled() {
            return Err(GraphError::Cancelled);
        }
        match translator
            .translate(TranslationRequest {
                text,
                schema_summary,
            })
            .await
        {
            Ok(raw) => {
                let cypher = sanitize_generated_query(&raw);
                match validate_read_only(&cypher) {
                    Ok(()) => return Ok(cypher),
                    Err(err) => {
                        tracing::warn!("Translation attempt {} rejected: {}", attempt + 1, err);
                        last_err = Some(err);
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Translation attempt {} failed: {}", attempt + 1, err);
                last_err = Some(GraphError::Translation(err.to_string()));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| GraphError::Translation("translation failed".into())))
}

/// Structural node/relationship tally over result records; see
/// [`QueryResult`] for the counting convention.
fn count_result_shapes(records: &[HashMap<String, serde_json::Value>]) -> (usize, usize) {
    let mut node_ids: HashSet<String> = HashSet::new();
    let mut edges: HashSet<(String, String)> = HashSet::new();

    fn walk(
        value: &serde_json::Value,
        node_ids: &mut HashSet<String>,
        edges: &mut HashSet<(String, String)>,
    ) {
        match value {
            serde_json::Value::Object(map) => {
                match (map.get("source_id"), map.get("target_id")) {
                    (Some(serde_json::Value::String(s)), Some(serde_json::Value::String(t))) => {
                        edges.insert((s.clone(), t.clone()));
                    }
                    _ => {
                        if let Some(serde_json::Value::String(id)) = map.get("id") {
                            node_ids.insert(id.clone());
                        }
                    }
                }
                for nested in map.values() {
                    walk(nested, node_ids, edges);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    walk(item, node_ids, edges);
                }
            }
            _ => {}
        }
    }

    for record in records {
        for value in record.values() {
            walk(value, &mut node_ids, &mut edges);
        }
    }
    (node_ids.len(), edges.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_count_result_shapes() {
        let records = vec![
            HashMap::from([
                (
                    "n".to_string(),
                    serde_json::json!({"id": "p1", "text": "Ada"}),
                ),
                (
                    "r".to_string(),
                    serde_json::json!({"source_id": "p1", "target_id": "o1"}),
                ),
            ]),
            HashMap::from([
                (
                    "n".to_string(),
                    serde_json::json!({"id": "p1", "text": "Ada"}),
                ),
                ("scalar".to_string(), serde_json::json!(42)),
            ]),
        ];
        let (nodes, rels) = count_result_shapes(&records);
        assert_eq!(nodes, 1);
        assert_eq!(rels, 1);
    }

    struct ScriptedTranslator {
        calls: AtomicU32,
        outputs: Vec<Result<&'static str, &'static str>>,
    }

    #[async_trait::async_trait]
    impl TranslationClient for ScriptedTranslator {
        async fn translate(&self, _request: TranslationRequest<'_>) -> anyhow::Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.outputs.get(n.min(self.outputs.len() - 1)).unwrap() {
                Ok(s) => Ok(s.to_string()),
                Err(e) => Err(anyhow::anyhow!(*e)),
            }
        }
    }

    #[tokio::test]
    async fn test_translation_retries_until_valid() {
        let translator = ScriptedTranslator {
            calls: AtomicU32::new(0),
            outputs: vec![
                Err("rate limited"),
                Ok("I cannot answer that"),
                Ok("```cypher\nMATCH (n:Person) RETURN n.id\n```"),
            ],
        };
        let cancel = CancellationToken::new();
        let cypher = translate_with_retries(&translator, "who?", "schema", 2, &cancel)
            .await
            .unwrap();
        assert_eq!(cypher, "MATCH (n:Person) RETURN n.id");
        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_translation_gives_up_after_retry_budget() {
        let translator = ScriptedTranslator {
            calls: AtomicU32::new(0),
            outputs: vec![Ok("DROP DATABASE neo4j")],
        };
        let cancel = CancellationToken::new();
        let result = translate_with_retries(&translator, "who?", "schema", 1, &cancel).await;
        assert!(matches!(result, Err(GraphError::Translation(_))));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_translation_respects_cancellation() {
        let translator = ScriptedTranslator {
            calls: AtomicU32::new(0),
            outputs: vec![Ok("MATCH (n) RETURN n")],
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = translate_with_retries(&translator, "who?", "schema", 3, &cancel).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }
}
