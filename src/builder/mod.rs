//! Batched, deduplicating graph construction with merge semantics.
//!
//! The builder is the only writer in the core. Each batch is one store
//! transaction: a failed batch rolls back alone while previously committed
//! batches stay committed, and the outcome is reported per batch in a
//! [`BatchReport`].

mod plan;

use chrono::Utc;
use neo4rs::{query, BoltMap, BoltString, BoltType, Query};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::BuilderConfig;
use crate::errors::{GraphError, GraphResult};
use crate::graph_db::bolt::{bolt_float, bolt_string, float_list, map_list, property_to_bolt};
use crate::graph_db::schema::BASE_LABEL;
use crate::graph_db::{validate_identifier, with_retry, Neo4jClient};
use crate::models::{BatchReport, Entity, FailedBatch, GraphStatistics, PropertyValue, Relationship};

use plan::{
    dedup_entities, dedup_relationships, partition, plan_entity_batch, plan_relationship_batch,
    EntityGroup, RelationshipBatchPlan, RESERVED_KEYS,
};

/// Monotonic counter bumped after every committed write; the analytics
/// projection records the generation it was built from and goes stale when
/// it no longer matches.
#[derive(Debug, Default)]
pub struct StoreGeneration(AtomicU64);

impl StoreGeneration {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// Explicit acknowledgement demanded by destructive operations. Passing it
/// at the call site is the confirmation; nothing destructive has a default
/// path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirm;

pub struct GraphBuilder {
    client: Arc<Neo4jClient>,
    config: BuilderConfig,
    generation: Arc<StoreGeneration>,
}

impl GraphBuilder {
    pub fn new(
        client: Arc<Neo4jClient>,
        config: BuilderConfig,
        generation: Arc<StoreGeneration>,
    ) -> Self {
        Self {
            client,
            config,
            generation,
        }
    }

    /// Upsert entities in batches. Within the call, duplicate ids resolve
    /// to the last occurrence before dispatch; each batch commits or rolls
    /// back atomically and failures are isolated per batch.
    ///
    /// Cancellation is checked between batches; batches committed before
    /// the signal stay committed.
    pub async fn create_entities_batch(
        &self,
        entities: Vec<Entity>,
        cancel: &CancellationToken,
    ) -> GraphResult<BatchReport> {
        let deduped = dedup_entities(entities);
        let batches = partition(deduped, self.config.batch_size);
        let now = Utc::now().to_rfc3339();

        let mut report = BatchReport {
            batches: batches.len(),
            ..Default::default()
        };

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Entity ingestion cancelled after {} committed rows",
                    report.success_count
                );
                return Err(GraphError::Cancelled);
            }

            let rows = batch.len();
            match plan_entity_batch(batch) {
                Ok(groups) => {
                    let outcome = with_retry(
                        self.config.max_retries,
                        self.config.retry_base_delay_ms,
                        || {
                            let queries = entity_group_queries(&groups, &now);
                            self.client.run_in_transaction(queries)
                        },
                    )
                    .await;

                    match outcome {
                        Ok(()) => report.success_count += rows,
                        Err(error) => {
                            tracing::warn!("Entity batch {} failed: {}", index, error);
                            report.failed_batches.push(FailedBatch { index, rows, error });
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!("Entity batch {} rejected at planning: {}", index, error);
                    report.failed_batches.push(FailedBatch { index, rows, error });
                }
            }
        }

        if report.success_count > 0 {
            self.generation.bump();
        }
        Ok(report)
    }

    /// Upsert relationships in batches with the same isolation discipline.
    ///
    /// Endpoints must already exist: each batch runs a resolution probe
    /// against committed state and fails with
    /// [`GraphError::UnresolvedReference`] before any edge in that batch
    /// is written.
    pub async fn create_relationships_batch(
        &self,
        relationships: Vec<Relationship>,
        cancel: &CancellationToken,
    ) -> GraphResult<BatchReport> {
        let deduped = dedup_relationships(relationships);
        let batches = partition(deduped, self.config.batch_size);
        let now = Utc::now().to_rfc3339();

        let mut report = BatchReport {
            batches: batches.len(),
            ..Default::default()
        };

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    "Relationship ingestion cancelled after {} committed rows",
                    report.success_count
                );
                return Err(GraphError::Cancelled);
            }

            let rows = batch.len();
            match plan_relationship_batch(batch) {
                Ok(plan) => match self.apply_relationship_batch(&plan, &now).await {
                    Ok(()) => report.success_count += rows,
                    Err(error) => {
                        tracing::warn!("Relationship batch {} failed: {}", index, error);
                        report.failed_batches.push(FailedBatch { index, rows, error });
                    }
                },
                Err(error) => {
                    tracing::warn!("Relationship batch {} rejected at planning: {}", index, error);
                    report.failed_batches.push(FailedBatch { index, rows, error });
                }
            }
        }

        if report.success_count > 0 {
            self.generation.bump();
        }
        Ok(report)
    }

    async fn apply_relationship_batch(
        &self,
        plan: &RelationshipBatchPlan,
        now: &str,
    ) -> GraphResult<()> {
        let offenders = with_retry(
            self.config.max_retries,
            self.config.retry_base_delay_ms,
            || {
                let rows = plan
                    .groups
                    .iter()
                    .flat_map(|g| g.relationships.iter())
                    .map(relationship_row)
                    .collect();
                let q = query(&plan.probe_cypher).param("rows", map_list(rows));
                self.client.execute_collect(q)
            },
        )
        .await?;

        if let Some(row) = offenders.first() {
            let source_id = row.get::<String>("source_id").unwrap_or_default();
            let target_id = row.get::<String>("target_id").unwrap_or_default();
            let rel_type = row.get::<String>("rel_type").unwrap_or_default();
            tracing::warn!(
                "{} relationship(s) in batch reference missing endpoints",
                offenders.len()
            );
            return Err(GraphError::UnresolvedReference {
                source_id,
                target_id,
                rel_type,
            });
        }

        with_retry(
            self.config.max_retries,
            self.config.retry_base_delay_ms,
            || {
                let queries = relationship_group_queries(plan, now);
                self.client.run_in_transaction(queries)
            },
        )
        .await
    }

    /// Upsert a single entity. Declared properties overwrite, undeclared
    /// existing properties are preserved.
    pub async fn merge_node(&self, entity: Entity) -> GraphResult<()> {
        let groups = plan_entity_batch(vec![entity])?;
        let now = Utc::now().to_rfc3339();
        self.client
            .run_in_transaction(entity_group_queries(&groups, &now))
            .await?;
        self.generation.bump();
        Ok(())
    }

    /// Upsert a single relationship keyed on `(source, target, type)`.
    pub async fn merge_relationship(&self, relationship: Relationship) -> GraphResult<()> {
        let plan = plan_relationship_batch(vec![relationship])?;
        let now = Utc::now().to_rfc3339();
        self.apply_relationship_batch(&plan, &now).await?;
        self.generation.bump();
        Ok(())
    }

    /// Merge the given keys into an existing node's properties. Keys not
    /// named are left untouched.
    pub async fn update_node_properties(
        &self,
        id: &str,
        properties: HashMap<String, PropertyValue>,
    ) -> GraphResult<()> {
        let cypher = format!(
            "MATCH (n:`{}` {{id: $id}}) SET n += $props, n.updated_at = $now RETURN n.id AS id",
            BASE_LABEL
        );
        let mut props = BoltMap::new();
        for (key, value) in &properties {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            props.put(BoltString::from(key.as_str()), property_to_bolt(value));
        }
        let q = query(&cypher)
            .param("id", bolt_string(id))
            .param("props", BoltType::Map(props))
            .param("now", bolt_string(&Utc::now().to_rfc3339()));

        let rows = self.client.execute_collect(q).await?;
        if rows.is_empty() {
            return Err(GraphError::NotFound(id.to_string()));
        }
        self.generation.bump();
        Ok(())
    }

    /// Delete one node and its relationships.
    pub async fn delete_node(&self, id: &str, _confirm: Confirm) -> GraphResult<()> {
        let cypher = format!(
            "MATCH (n:`{}` {{id: $id}}) DETACH DELETE n RETURN count(n) AS value",
            BASE_LABEL
        );
        let deleted = self
            .client
            .fetch_scalar_i64(query(&cypher).param("id", bolt_string(id)), "value")
            .await?;
        if deleted == 0 {
            return Err(GraphError::NotFound(id.to_string()));
        }
        self.generation.bump();
        Ok(())
    }

    /// Delete every node carrying the given label. Returns the number of
    /// nodes removed.
    pub async fn delete_nodes_by_label(&self, label: &str, _confirm: Confirm) -> GraphResult<u64> {
        validate_identifier("label", label)?;
        let cypher = format!(
            "MATCH (n:`{}`:`{}`) DETACH DELETE n RETURN count(n) AS value",
            BASE_LABEL, label
        );
        let deleted = self.client.fetch_scalar_i64(query(&cypher), "value").await?;
        if deleted > 0 {
            self.generation.bump();
        }
        tracing::info!("Deleted {} node(s) with label {}", deleted, label);
        Ok(deleted as u64)
    }

    /// Remove every entity and relationship. Declared constraints and
    /// indexes persist.
    pub async fn clear_graph(&self, _confirm: Confirm) -> GraphResult<u64> {
        let cypher = format!(
            "MATCH (n:`{}`) DETACH DELETE n RETURN count(n) AS value",
            BASE_LABEL
        );
        let deleted = self.client.fetch_scalar_i64(query(&cypher), "value").await?;
        self.generation.bump();
        tracing::info!("Cleared graph: {} node(s) removed", deleted);
        Ok(deleted as u64)
    }

    /// Counts over committed state only; in-flight batches are invisible.
    pub async fn get_statistics(&self) -> GraphResult<GraphStatistics> {
        let mut stats = GraphStatistics::default();

        let node_q = format!("MATCH (n:`{}`) RETURN count(n) AS value", BASE_LABEL);
        stats.node_count = self.client.fetch_scalar_i64(query(&node_q), "value").await? as u64;

        let rel_q = format!("MATCH (:`{}`)-[r]->() RETURN count(r) AS value", BASE_LABEL);
        stats.relationship_count =
            self.client.fetch_scalar_i64(query(&rel_q), "value").await? as u64;

        let label_q = format!(
            "MATCH (n:`{base}`) UNWIND labels(n) AS label WITH label \
             WHERE label <> '{base}' RETURN label, count(*) AS count",
            base = BASE_LABEL
        );
        for row in self.client.execute_collect(query(&label_q)).await? {
            let label = row
                .get::<String>("label")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            let count = row
                .get::<i64>("count")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            stats.label_counts.insert(label, count as u64);
        }

        let type_q = "MATCH ()-[r]->() RETURN type(r) AS rel_type, count(r) AS count";
        for row in self.client.execute_collect(query(type_q)).await? {
            let rel_type = row
                .get::<String>("rel_type")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            let count = row
                .get::<i64>("count")
                .map_err(|e| GraphError::QueryExecution(e.to_string()))?;
            stats.relationship_type_counts.insert(rel_type, count as u64);
        }

        Ok(stats)
    }
}

fn entity_group_queries(groups: &[EntityGroup], now: &str) -> Vec<Query> {
    groups
        .iter()
        .map(|group| {
            let rows = group.entities.iter().map(entity_row).collect();
            query(&group.cypher)
                .param("rows", map_list(rows))
                .param("now", bolt_string(now))
        })
        .collect()
}

fn relationship_group_queries(plan: &RelationshipBatchPlan, now: &str) -> Vec<Query> {
    plan.groups
        .iter()
        .map(|group| {
            let rows = group.relationships.iter().map(relationship_row).collect();
            query(&group.cypher)
                .param("rows", map_list(rows))
                .param("now", bolt_string(now))
        })
        .collect()
}

fn entity_row(entity: &Entity) -> BoltMap {
    let mut row = BoltMap::new();
    row.put(BoltString::from("id"), bolt_string(&entity.id));
    row.put(BoltString::from("text"), bolt_string(&entity.text));
    if let Some(embedding) = &entity.embedding {
        row.put(BoltString::from("embedding"), float_list(embedding));
    }
    row.put(
        BoltString::from("props"),
        BoltType::Map(user_props(&entity.properties, entity.confidence)),
    );
    row
}

fn relationship_row(rel: &Relationship) -> BoltMap {
    let mut row = BoltMap::new();
    row.put(BoltString::from("source_id"), bolt_string(&rel.source_id));
    row.put(BoltString::from("target_id"), bolt_string(&rel.target_id));
    row.put(BoltString::from("rel_type"), bolt_string(&rel.rel_type));
    row.put(BoltString::from("weight"), bolt_float(rel.weight as f64));
    row.put(
        BoltString::from("props"),
        BoltType::Map(user_props(&rel.properties, rel.confidence)),
    );
    row
}

fn user_props(properties: &HashMap<String, PropertyValue>, confidence: Option<f32>) -> BoltMap {
    let mut map = BoltMap::new();
    for (key, value) in properties {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        map.put(BoltString::from(key.as_str()), property_to_bolt(value));
    }
    if let Some(confidence) = confidence {
        map.put(
            BoltString::from("confidence"),
            bolt_float(confidence as f64),
        );
    }
    map
}
