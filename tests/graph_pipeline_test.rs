//! End-to-end pipeline test against a live graph store.
//!
//! Flow: schema declaration → batched ingestion → statistics → structured
//! and natural-language queries → index build → hybrid search → analytics.
//! Requires `NEO4J_TEST_URI` (plus optional `NEO4J_TEST_USER` /
//! `NEO4J_TEST_PASSWORD`) pointing at a disposable database.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use graph_core::{
    CommunityAlgorithm, Confirm, Entity, GraphCoreConfig, GraphError, HashEmbeddingClient,
    IndexBuild, KnowledgeGraphCore, PropertyValue, Relationship, TranslationClient,
    TraversalDirection,
};

struct CannedTranslator;

#[async_trait::async_trait]
impl TranslationClient for CannedTranslator {
    async fn translate(
        &self,
        _request: graph_core::query::TranslationRequest<'_>,
    ) -> anyhow::Result<String> {
        Ok("MATCH (p:Person)-[r:WORKS_AT]->(o:Organization) \
            RETURN p.id AS source_id, o.id AS target_id"
            .to_string())
    }
}

async fn connect() -> Option<KnowledgeGraphCore> {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
    let uri = std::env::var("NEO4J_TEST_URI").ok()?;
    let mut config = GraphCoreConfig::default();
    config.store.uri = uri;
    config.store.user = std::env::var("NEO4J_TEST_USER").unwrap_or_else(|_| "neo4j".into());
    config.store.password =
        std::env::var("NEO4J_TEST_PASSWORD").unwrap_or_else(|_| "password".into());
    config.embedding.dimension = 128;

    let embedder = Arc::new(HashEmbeddingClient::new(128));
    let translator: Arc<dyn TranslationClient> = Arc::new(CannedTranslator);
    Some(
        KnowledgeGraphCore::connect(config, embedder, Some(translator))
            .await
            .expect("failed to connect to test store"),
    )
}

#[tokio::test]
#[ignore] // Requires a running Neo4j instance; see module docs.
async fn test_end_to_end_graph_pipeline() {
    let Some(core) = connect().await else {
        eprintln!("NEO4J_TEST_URI not set; skipping");
        return;
    };
    let cancel = CancellationToken::new();

    // Step 0: clean slate, schema in place before any relationship merge.
    core.builder().clear_graph(Confirm).await.unwrap();
    core.schema()
        .declare_constraints(&["Person".into(), "Organization".into()], "id")
        .await
        .unwrap();
    core.schema().declare_index("Person", "text").await.unwrap();
    // Idempotent: declaring again is a no-op, not an error.
    core.schema()
        .declare_constraints(&["Person".into()], "id")
        .await
        .unwrap();

    // Index-not-built guard: vector search must fail explicitly before any
    // build, never return an empty list.
    let err = core.search().vector_search("ada", 3, None).await.unwrap_err();
    assert!(matches!(err, GraphError::IndexNotBuilt));

    // Step 1: ingest entities, then relationships.
    let entities = vec![
        Entity::new("p1", "Ada Lovelace", "Person").with_property("born", 1815i64),
        Entity::new("p2", "Grace Hopper", "Person"),
        Entity::new("o1", "Acme Analytical Engines", "Organization"),
    ];
    let report = core
        .builder()
        .create_entities_batch(entities, &cancel)
        .await
        .unwrap();
    assert!(report.is_complete_success());
    assert_eq!(report.success_count, 3);

    let rels = vec![
        Relationship::new("p1", "o1", "WORKS_AT"),
        Relationship::new("p2", "o1", "WORKS_AT"),
        Relationship::new("p1", "p2", "KNOWS"),
    ];
    let report = core
        .builder()
        .create_relationships_batch(rels, &cancel)
        .await
        .unwrap();
    assert!(report.is_complete_success());

    // A relationship to a missing endpoint fails its batch with the
    // offending ids, without touching committed edges.
    let bad = vec![Relationship::new("p1", "ghost", "KNOWS")];
    let report = core
        .builder()
        .create_relationships_batch(bad, &cancel)
        .await
        .unwrap();
    assert_eq!(report.failed_batches.len(), 1);
    assert!(matches!(
        report.failed_batches[0].error,
        GraphError::UnresolvedReference { .. }
    ));

    // Step 2: committed statistics.
    let stats = core.builder().get_statistics().await.unwrap();
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.relationship_count, 3);
    assert_eq!(stats.label_counts["Person"], 2);
    assert_eq!(stats.relationship_type_counts["WORKS_AT"], 2);

    // Step 3: idempotent upsert, same id, merged properties.
    core.builder()
        .merge_node(Entity::new("p1", "Ada Lovelace", "Person").with_property("field", "math"))
        .await
        .unwrap();
    let stats = core.builder().get_statistics().await.unwrap();
    assert_eq!(stats.node_count, 3, "upsert must not duplicate");

    let result = core
        .query()
        .execute_structured_query(
            "MATCH (n:Person {id: $id}) RETURN properties(n) AS props",
            HashMap::from([("id".to_string(), PropertyValue::from("p1"))]),
            None,
        )
        .await
        .unwrap();
    let props = &result.records[0]["props"];
    assert_eq!(props["born"], serde_json::json!(1815));
    assert_eq!(props["field"], serde_json::json!("math"));

    // Step 4: structured query for the WORKS_AT edges, parameterized.
    let result = core
        .query()
        .execute_structured_query(
            "MATCH (p:Person)-[r:WORKS_AT]->(o:Organization) \
             RETURN p.id AS person, o.id AS org ORDER BY p.id",
            HashMap::new(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.records[0]["person"], serde_json::json!("p1"));

    // Step 5: natural-language path, generated query surfaced.
    let translated = core
        .query()
        .execute_natural_language("who works at acme?", &cancel)
        .await
        .unwrap();
    assert!(translated.generated_query.contains("WORKS_AT"));
    assert_eq!(translated.result.records.len(), 2);

    // Step 6: index build and searches.
    let build = core
        .index_service()
        .build_index(None, IndexBuild::Incremental, &cancel)
        .await
        .unwrap();
    assert_eq!(build.indexed, 3);

    let hits = core.search().vector_search("ada lovelace", 2, None).await.unwrap();
    assert_eq!(hits[0].entity.id, "p1");

    let hits = core.search().keyword_search("grace", 2).await.unwrap();
    assert_eq!(hits[0].entity.id, "p2");

    let hits = core.search().hybrid_search("ada", 2, 0.7, 0.3).await.unwrap();
    assert!(!hits.is_empty());
    let again = core.search().hybrid_search("ada", 2, 0.7, 0.3).await.unwrap();
    let ids: Vec<_> = hits.iter().map(|h| h.entity.id.clone()).collect();
    let ids_again: Vec<_> = again.iter().map(|h| h.entity.id.clone()).collect();
    assert_eq!(ids, ids_again, "hybrid ranking must be deterministic");

    let contextual = core.search().search_with_context("ada", 1, 1).await.unwrap();
    assert!(!contextual[0].context.relationships.is_empty());

    // Step 7: traversal and path-finding.
    let subgraph = core
        .query()
        .traverse_from_entity("p1", 1, TraversalDirection::Outgoing)
        .await
        .unwrap();
    assert_eq!(subgraph.entities.len(), 3); // p1, p2, o1

    let paths = core.query().find_shortest_path("p2", "o1", 3).await.unwrap();
    assert_eq!(paths[0].length(), 1);
    // Unreachable target within the bound: empty result, not an error.
    let none = core.query().find_shortest_path("p2", "ghost", 2).await.unwrap();
    assert!(none.is_empty());

    // Step 8: schema introspection.
    let schema = core.query().get_schema().await.unwrap();
    assert!(schema.labels.contains(&"Person".to_string()));
    assert!(schema.relationship_types.contains(&"WORKS_AT".to_string()));

    // Step 9: analytics.
    let ranks = core.analyzer().calculate_pagerank(10, &cancel).await.unwrap();
    let total: f64 = ranks.iter().map(|(_, s)| s).sum();
    assert!((total - 1.0).abs() < 1e-6);
    assert_eq!(ranks[0].0, "o1", "both people point at the organization");

    let communities = core
        .analyzer()
        .detect_communities(CommunityAlgorithm::LabelPropagation, &cancel)
        .await
        .unwrap();
    let member_total: usize = communities.communities.values().map(|m| m.len()).sum();
    assert_eq!(member_total, 3, "every node in exactly one community");

    let metrics = core.analyzer().calculate_graph_metrics(&cancel).await.unwrap();
    assert_eq!(metrics.node_count, 3);
    assert!(metrics.is_connected);
    assert_eq!(metrics.diameter, Some(1), "p1, p2 and o1 form a triangle");

    let importance = core
        .analyzer()
        .get_node_importance("o1", &cancel)
        .await
        .unwrap();
    assert_eq!(importance.degree, 2);

    // Step 10: destructive paths require explicit confirmation tokens.
    core.builder().delete_node("p2", Confirm).await.unwrap();
    let stats = core.builder().get_statistics().await.unwrap();
    assert_eq!(stats.node_count, 2);

    let removed = core.builder().clear_graph(Confirm).await.unwrap();
    assert_eq!(removed, 2);
}
