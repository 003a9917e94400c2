use neo4rs::{query, ConfigBuilder, Graph, Query, Row};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreConfig;
use crate::errors::{classify_store_error, GraphError, GraphResult};

/// Thin wrapper over the Bolt driver, compatible with both local Neo4j and
/// Neo4j AuraDB.
///
/// Everything above this type speaks [`GraphResult`]; driver errors are
/// classified into the caller-facing taxonomy at this boundary.
pub struct Neo4jClient {
    graph: Arc<Graph>,
    uri: String,
}

impl Neo4jClient {
    /// Connect and verify the connection with a round-trip.
    ///
    /// Supported URIs:
    ///   - Local: `bolt://localhost:7687`
    ///   - AuraDB: `neo4j+s://xxxxx.databases.neo4j.io` or `neo4j+ssc://...`
    pub async fn connect(config: &StoreConfig) -> GraphResult<Self> {
        tracing::info!("Connecting to graph store at {}", config.uri);

        let driver_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .fetch_size(config.fetch_size)
            .max_connections(config.max_connections)
            .build()
            .map_err(|e| GraphError::Connection(format!("invalid store config: {}", e)))?;

        let graph = Graph::connect(driver_config)
            .await
            .map_err(|e| GraphError::Connection(format!("failed to connect: {}", e)))?;

        let mut result = graph
            .execute(query("RETURN 1 AS ping"))
            .await
            .map_err(|e| GraphError::Connection(format!("connection test failed: {}", e)))?;
        if result
            .next()
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?
            .is_some()
        {
            tracing::info!("Graph store connection established");
        }

        Ok(Self {
            graph: Arc::new(graph),
            uri: config.uri.clone(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn is_aura(&self) -> bool {
        self.uri.contains("neo4j.io")
            || self.uri.starts_with("neo4j+s://")
            || self.uri.starts_with("neo4j+ssc://")
    }

    /// Execute a write with no interesting result rows.
    pub(crate) async fn run(&self, q: Query) -> GraphResult<()> {
        self.graph.run(q).await.map_err(classify_store_error)
    }

    /// Execute a query and drain all rows.
    pub(crate) async fn execute_collect(&self, q: Query) -> GraphResult<Vec<Row>> {
        let mut stream = self.graph.execute(q).await.map_err(classify_store_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(classify_store_error)? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Like [`Self::execute_collect`] but under a hard client-side
    /// deadline. The store may keep working past the deadline; the caller
    /// does not.
    pub(crate) async fn execute_collect_timeout(
        &self,
        q: Query,
        timeout: Duration,
    ) -> GraphResult<Vec<Row>> {
        tokio::time::timeout(timeout, self.execute_collect(q))
            .await
            .map_err(|_| GraphError::QueryTimeout {
                ms: timeout.as_millis() as u64,
            })?
    }

    /// Run a set of queries as one atomic transaction. Rolls back and
    /// reports the failure if any query fails.
    pub(crate) async fn run_in_transaction(&self, queries: Vec<Query>) -> GraphResult<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(classify_store_error)?;
        if let Err(err) = txn.run_queries(queries).await {
            let _ = txn.rollback().await;
            return Err(classify_store_error(err));
        }
        txn.commit().await.map_err(classify_store_error)
    }

    /// Single scalar convenience, e.g. `RETURN count(n) AS value`.
    pub(crate) async fn fetch_scalar_i64(&self, q: Query, alias: &str) -> GraphResult<i64> {
        let rows = self.execute_collect(q).await?;
        match rows.first() {
            Some(row) => row
                .get::<i64>(alias)
                .map_err(|e| GraphError::QueryExecution(e.to_string())),
            None => Ok(0),
        }
    }
}

pub(crate) fn rows_to_json(rows: &[Row]) -> GraphResult<Vec<HashMap<String, serde_json::Value>>> {
    rows.iter()
        .map(|row| {
            row.to::<HashMap<String, serde_json::Value>>().map_err(|e| {
                GraphError::QueryExecution(format!(
                    "result row is not representable as alias -> value map \
                     (project scalars, lists or property maps): {}",
                    e
                ))
            })
        })
        .collect()
}
