use neo4rs::query;
use std::sync::Arc;

use crate::errors::GraphResult;

use super::client::Neo4jClient;
use super::validate_identifier;

/// Base label carried by every node so the id uniqueness constraint and
/// unlabeled lookups stay index-backed.
pub const BASE_LABEL: &str = "Entity";

/// Declares uniqueness constraints and property indexes ahead of bulk
/// load.
///
/// Constraints must exist before relationship batch merges run, otherwise
/// concurrent writers can race MERGE into duplicate nodes. Declarations
/// use `IF NOT EXISTS` and are idempotent; re-declaring is a no-op.
pub struct SchemaManager {
    client: Arc<Neo4jClient>,
}

impl SchemaManager {
    pub fn new(client: Arc<Neo4jClient>) -> Self {
        Self { client }
    }

    /// Uniqueness constraint on the base label's id. Always declared
    /// first; every other write path depends on it.
    pub async fn ensure_base_constraint(&self) -> GraphResult<()> {
        let cypher = render_unique_constraint(BASE_LABEL, "id")?;
        tracing::debug!("Declaring base constraint: {}", cypher);
        self.client.run(query(&cypher)).await
    }

    /// Declare a per-label uniqueness constraint on `unique_property` for
    /// each label, creating it only if absent.
    pub async fn declare_constraints(
        &self,
        labels: &[String],
        unique_property: &str,
    ) -> GraphResult<()> {
        for label in labels {
            let cypher = render_unique_constraint(label, unique_property)?;
            tracing::debug!("Declaring constraint: {}", cypher);
            self.client.run(query(&cypher)).await?;
        }
        Ok(())
    }

    /// Declare a property index for a label, creating it only if absent.
    pub async fn declare_index(&self, label: &str, property: &str) -> GraphResult<()> {
        let cypher = render_index(label, property)?;
        tracing::debug!("Declaring index: {}", cypher);
        self.client.run(query(&cypher)).await
    }
}

fn render_unique_constraint(label: &str, property: &str) -> GraphResult<String> {
    validate_identifier("label", label)?;
    validate_identifier("property", property)?;
    Ok(format!(
        "CREATE CONSTRAINT uniq_{}_{} IF NOT EXISTS FOR (n:`{}`) REQUIRE n.`{}` IS UNIQUE",
        label.to_lowercase(),
        property.to_lowercase(),
        label,
        property
    ))
}

fn render_index(label: &str, property: &str) -> GraphResult<String> {
    validate_identifier("label", label)?;
    validate_identifier("property", property)?;
    Ok(format!(
        "CREATE INDEX idx_{}_{} IF NOT EXISTS FOR (n:`{}`) ON (n.`{}`)",
        label.to_lowercase(),
        property.to_lowercase(),
        label,
        property
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_rendering_is_guarded_and_idempotent() {
        let cypher = render_unique_constraint("Person", "id").unwrap();
        assert!(cypher.contains("IF NOT EXISTS"));
        assert!(cypher.contains("(n:`Person`)"));
        assert!(cypher.contains("REQUIRE n.`id` IS UNIQUE"));

        assert!(render_unique_constraint("Person) DETACH DELETE", "id").is_err());
        assert!(render_unique_constraint("Person", "id`; DROP").is_err());
    }

    #[test]
    fn test_index_rendering() {
        let cypher = render_index("Document", "title").unwrap();
        assert!(cypher.starts_with("CREATE INDEX idx_document_title IF NOT EXISTS"));
    }
}
