use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::entity::PropertyValue;

/// Directed, typed edge between two entities.
///
/// Upsert identity is `(source_id, target_id, rel_type)`; repeated
/// extraction runs merge onto the same edge instead of duplicating it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type: rel_type.into(),
            properties: HashMap::new(),
            confidence: None,
            weight: 1.0,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Merge identity of this edge.
    pub fn merge_key(&self) -> (String, String, String) {
        (
            self.source_id.clone(),
            self.target_id.clone(),
            self.rel_type.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_defaults() {
        let rel = Relationship::new("p1", "o1", "WORKS_AT");
        assert_eq!(rel.weight, 1.0);
        assert!(rel.confidence.is_none());
        assert_eq!(
            rel.merge_key(),
            ("p1".to_string(), "o1".to_string(), "WORKS_AT".to_string())
        );
    }
}
