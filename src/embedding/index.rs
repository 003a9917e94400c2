use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::errors::{GraphError, GraphResult};

/// One indexed entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub labels: Vec<String>,
}

/// Immutable nearest-neighbor index over entity embeddings.
///
/// A derived, disposable cache: rebuildable from the entity set at any
/// time and never the system of record. Rows are L2-normalized at build
/// time so scoring is a single matrix-vector product of cosines.
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
    matrix: Array2<f32>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub fn build(dimension: usize, items: Vec<(IndexEntry, Vec<f32>)>) -> GraphResult<Self> {
        let mut entries = Vec::with_capacity(items.len());
        let mut flat = Vec::with_capacity(items.len() * dimension);
        for (entry, vector) in items {
            if vector.len() != dimension {
                return Err(GraphError::IndexCorrupt {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            flat.extend(normalize(vector));
            entries.push(entry);
        }

        let matrix = Array2::from_shape_vec((entries.len(), dimension), flat)
            .map_err(|e| GraphError::Internal(format!("index shape error: {}", e)))?;

        Ok(Self {
            dimension,
            entries,
            matrix,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Cosine top-k, descending score, ties broken by ascending entity id
    /// so repeated calls return identical orderings.
    pub fn top_k(
        &self,
        query: &[f32],
        k: usize,
        label_filter: Option<&str>,
    ) -> GraphResult<Vec<(String, f32)>> {
        if query.len() != self.dimension {
            return Err(GraphError::IndexCorrupt {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query = Array1::from_vec(normalize(query.to_vec()));
        let scores = self.matrix.dot(&query);

        let mut scored: Vec<(usize, f32)> = scores
            .iter()
            .copied()
            .enumerate()
            .filter(|(i, _)| match label_filter {
                Some(label) => self.entries[*i].labels.iter().any(|l| l == label),
                None => true,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.entries[a.0].id.cmp(&self.entries[b.0].id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.entries[i].id.clone(), score))
            .collect())
    }

    pub fn save(&self, path: &Path) -> GraphResult<()> {
        let persisted = PersistedIndex {
            dimension: self.dimension,
            entries: self.entries.clone(),
            vectors: self
                .matrix
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect(),
        };
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, &persisted)
            .map_err(|e| GraphError::Internal(format!("failed to persist index: {}", e)))?;
        tracing::info!("Saved vector index ({} entries) to {:?}", self.len(), path);
        Ok(())
    }

    /// Fails fast with [`GraphError::IndexCorrupt`] when the persisted
    /// dimensionality does not match the configured one.
    pub fn load(path: &Path, expected_dimension: usize) -> GraphResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let persisted: PersistedIndex = bincode::deserialize_from(reader)
            .map_err(|e| GraphError::Internal(format!("failed to read index: {}", e)))?;

        if persisted.dimension != expected_dimension {
            return Err(GraphError::IndexCorrupt {
                expected: expected_dimension,
                actual: persisted.dimension,
            });
        }

        let items = persisted
            .entries
            .into_iter()
            .zip(persisted.vectors)
            .collect::<Vec<_>>();
        Self::build(persisted.dimension, items)
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, label: &str) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            labels: vec![label.to_string()],
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::build(
            3,
            vec![
                (entry("a", "Person"), vec![1.0, 0.0, 0.0]),
                (entry("b", "Person"), vec![0.9, 0.1, 0.0]),
                (entry("c", "Organization"), vec![0.0, 1.0, 0.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_top_k_orders_by_similarity() {
        let index = sample_index();
        let hits = index.top_k(&[1.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "b");
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_ties_break_by_ascending_id() {
        let index = VectorIndex::build(
            2,
            vec![
                (entry("z", "T"), vec![1.0, 0.0]),
                (entry("a", "T"), vec![1.0, 0.0]),
                (entry("m", "T"), vec![1.0, 0.0]),
            ],
        )
        .unwrap();
        let hits = index.top_k(&[1.0, 0.0], 3, None).unwrap();
        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }

    #[test]
    fn test_label_filter() {
        let index = sample_index();
        let hits = index.top_k(&[1.0, 1.0, 0.0], 5, Some("Organization")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "c");
    }

    #[test]
    fn test_dimension_mismatch_on_build_and_query() {
        assert!(matches!(
            VectorIndex::build(3, vec![(entry("a", "T"), vec![1.0, 0.0])]),
            Err(GraphError::IndexCorrupt { expected: 3, actual: 2 })
        ));

        let index = sample_index();
        assert!(matches!(
            index.top_k(&[1.0, 0.0], 1, None),
            Err(GraphError::IndexCorrupt { .. })
        ));
    }

    #[test]
    fn test_save_load_roundtrip_and_corruption_guard() {
        let index = sample_index();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.index");

        index.save(&path).unwrap();

        let loaded = VectorIndex::load(&path, 3).unwrap();
        assert_eq!(loaded.len(), 3);
        let hits = loaded.top_k(&[0.0, 1.0, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].0, "c");

        assert!(matches!(
            VectorIndex::load(&path, 1536),
            Err(GraphError::IndexCorrupt { expected: 1536, actual: 3 })
        ));
    }
}
