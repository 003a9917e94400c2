use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph store unreachable: {0}")]
    Connection(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unresolved relationship endpoint: {source_id} -[{rel_type}]-> {target_id}")]
    UnresolvedReference {
        source_id: String,
        target_id: String,
        rel_type: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Query timed out after {ms}ms")]
    QueryTimeout { ms: u64 },

    #[error("Natural language translation failed: {0}")]
    Translation(String),

    #[error("Vector index has not been built")]
    IndexNotBuilt,

    #[error("Vector index is corrupt: expected dimension {expected}, got {actual}")]
    IndexCorrupt { expected: usize, actual: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Transient store connectivity failures are the only class recommended
    /// for automatic retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GraphError::Connection(_))
    }
}

/// Classify a driver error into the caller-facing taxonomy using the
/// Neo4j status code embedded in the message.
pub(crate) fn classify_store_error(err: neo4rs::Error) -> GraphError {
    let msg = err.to_string();
    if msg.contains("SyntaxError") {
        GraphError::QuerySyntax(msg)
    } else if msg.contains("ConstraintValidation") || msg.contains("ConstraintViolation") {
        GraphError::ConstraintViolation(msg)
    } else if msg.contains("ServiceUnavailable")
        || msg.contains("Connection")
        || msg.contains("connection")
        || msg.contains("IO error")
        || msg.contains("timed out")
    {
        GraphError::Connection(msg)
    } else {
        GraphError::QueryExecution(msg)
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_retryable() {
        assert!(GraphError::Connection("refused".into()).is_retryable());
        assert!(!GraphError::QuerySyntax("bad".into()).is_retryable());
        assert!(!GraphError::Cancelled.is_retryable());
    }

    #[test]
    fn test_unresolved_reference_names_both_endpoints() {
        let err = GraphError::UnresolvedReference {
            source_id: "p1".into(),
            target_id: "o9".into(),
            rel_type: "WORKS_AT".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("p1"));
        assert!(msg.contains("o9"));
        assert!(msg.contains("WORKS_AT"));
    }
}
