//! Natural-language to Cypher translation seam.
//!
//! The core depends only on the [`TranslationClient`] capability; the
//! translator's semantic quality is its own problem. What the core does
//! enforce is syntactic hygiene: fenced output is unwrapped and the
//! generated query must be a read-only statement before it is executed.

use anyhow::{anyhow, bail, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{GraphError, GraphResult};

pub struct TranslationRequest<'req> {
    pub text: &'req str,
    pub schema_summary: &'req str,
}

/// Capability interface for NL -> structured-query backends.
#[async_trait]
pub trait TranslationClient: Send + Sync {
    /// Translate a natural-language request into a single Cypher query.
    async fn translate(&self, request: TranslationRequest<'_>) -> Result<String>;
}

const SYSTEM_PROMPT: &str = "You translate natural-language questions about a knowledge \
graph into a single read-only Cypher query. Every node carries the label `Entity` with \
`id` and `text` properties, plus domain labels. Output only the Cypher query, no prose, \
no code fences.";

/// OpenAI chat-completion translation backend.
pub struct OpenAiTranslationClient {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
}

impl OpenAiTranslationClient {
    /// Uses `OPENAI_API_KEY` from the environment.
    pub fn new(model: impl Into<String>) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable must be set");
        }
        Ok(Self {
            client: OpenAIClient::with_config(OpenAIConfig::new()),
            model: model.into(),
        })
    }
}

#[async_trait]
impl TranslationClient for OpenAiTranslationClient {
    async fn translate(&self, request: TranslationRequest<'_>) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(format!("{}\n\n{}", SYSTEM_PROMPT, request.schema_summary))
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.text.to_string())
                .build()?
                .into(),
        ];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .temperature(0.0)
            .messages(messages)
            .build()?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| anyhow!("translation request failed: {}", e))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("translator returned no content"))
    }
}

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```(?:cypher|sql)?\s*(.*?)```").unwrap();
    static ref READ_PREFIX: Regex =
        Regex::new(r"(?i)^\s*(MATCH|OPTIONAL\s+MATCH|WITH|UNWIND|RETURN|SHOW)\b").unwrap();
    static ref WRITE_CLAUSE: Regex =
        Regex::new(r"(?i)\b(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|CALL)\b").unwrap();
}

/// Unwrap markdown fences and trailing semicolons from translator output.
pub(crate) fn sanitize_generated_query(raw: &str) -> String {
    let unfenced = match CODE_FENCE.captures(raw) {
        Some(caps) => caps[1].to_string(),
        None => raw.to_string(),
    };
    unfenced.trim().trim_end_matches(';').trim().to_string()
}

/// Generated queries are executed verbatim, so they must be read-only and
/// start with a reading clause.
pub(crate) fn validate_read_only(cypher: &str) -> GraphResult<()> {
    if cypher.is_empty() {
        return Err(GraphError::Translation("translator returned an empty query".into()));
    }
    if !READ_PREFIX.is_match(cypher) {
        return Err(GraphError::Translation(format!(
            "generated query does not start with a reading clause: {:?}",
            cypher
        )));
    }
    if let Some(m) = WRITE_CLAUSE.find(cypher) {
        return Err(GraphError::Translation(format!(
            "generated query contains forbidden clause {:?}: {:?}",
            m.as_str(),
            cypher
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_fences_and_semicolon() {
        let raw = "```cypher\nMATCH (n:Person) RETURN n.id;\n```";
        assert_eq!(
            sanitize_generated_query(raw),
            "MATCH (n:Person) RETURN n.id"
        );
        assert_eq!(sanitize_generated_query("  RETURN 1; "), "RETURN 1");
    }

    #[test]
    fn test_read_only_gate_accepts_reading_clauses() {
        assert!(validate_read_only("MATCH (n) RETURN n.id").is_ok());
        assert!(validate_read_only("optional match (n) return count(n)").is_ok());
        assert!(validate_read_only("UNWIND [1,2] AS x RETURN x").is_ok());
    }

    #[test]
    fn test_read_only_gate_rejects_writes() {
        assert!(validate_read_only("CREATE (n:Person) RETURN n").is_err());
        assert!(validate_read_only("MATCH (n) DETACH DELETE n").is_err());
        assert!(validate_read_only("MATCH (n) SET n.x = 1 RETURN n").is_err());
        assert!(validate_read_only("CALL apoc.periodic.iterate('x','y',{})").is_err());
        assert!(validate_read_only("").is_err());
        assert!(validate_read_only("DROP CONSTRAINT uniq_entity_id").is_err());
    }
}
