pub mod bolt;
pub mod client;
pub mod records;
pub mod schema;

pub use client::Neo4jClient;
pub use schema::SchemaManager;

use lazy_static::lazy_static;
use regex::Regex;
use std::future::Future;
use std::time::Duration;

use crate::errors::{GraphError, GraphResult};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// Labels, relationship types and property names cannot be Cypher
/// parameters, so anything interpolated into a query must pass this gate.
pub(crate) fn validate_identifier(kind: &str, value: &str) -> GraphResult<()> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(GraphError::QuerySyntax(format!(
            "invalid {} identifier: {:?}",
            kind, value
        )))
    }
}

/// Bounded exponential backoff for transient connection failures. Every
/// other error kind is terminal for the call.
pub(crate) async fn with_retry<T, F, Fut>(
    max_retries: u32,
    base_delay_ms: u64,
    mut op: F,
) -> GraphResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GraphResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_retries => {
                let delay = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
                tracing::warn!(
                    "Transient store error (attempt {}/{}): {}; retrying in {}ms",
                    attempt + 1,
                    max_retries,
                    err,
                    delay
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_identifier_gate() {
        assert!(validate_identifier("label", "Person").is_ok());
        assert!(validate_identifier("label", "code_entity").is_ok());
        assert!(validate_identifier("label", "Person; DROP").is_err());
        assert!(validate_identifier("label", "").is_err());
        assert!(validate_identifier("label", "9lives").is_err());
    }

    #[tokio::test]
    async fn test_retry_stops_on_terminal_error() {
        let calls = AtomicU32::new(0);
        let result: GraphResult<()> = with_retry(5, 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GraphError::QuerySyntax("bad".into())) }
        })
        .await;
        assert!(matches!(result, Err(GraphError::QuerySyntax(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, 1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GraphError::Connection("refused".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
