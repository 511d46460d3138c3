//! Flat inner-product index over L2-normalized embeddings

use crate::error::{Result, RetrievalError};

/// Only the best `MAX_NEIGHBOURS` documents receive their similarity; the
/// rest score 0.
pub const MAX_NEIGHBOURS: usize = 500;

/// Normalize in place to unit length; zero vectors are left untouched
#[inline]
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

#[inline]
#[must_use]
fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Dense vector index for one corpus snapshot
#[derive(Debug, Clone)]
pub struct DenseIndex {
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
}

impl DenseIndex {
    /// Build from raw embeddings, normalizing each one
    pub fn build(mut vectors: Vec<Vec<f32>>) -> Result<Self> {
        let dimensions = vectors.first().map_or(0, Vec::len);
        for vector in &mut vectors {
            if vector.len() != dimensions {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            l2_normalize(vector);
        }
        Ok(Self {
            vectors,
            dimensions,
        })
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Vector dimension
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Cosine similarity of `query` against every document, in corpus order
    pub fn score(&self, query: &[f32]) -> Result<Vec<f64>> {
        if query.len() != self.dimensions {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let similarities: Vec<f64> = self
            .vectors
            .iter()
            .map(|v| f64::from(dot(v, &query)))
            .collect();

        if similarities.len() <= MAX_NEIGHBOURS {
            return Ok(similarities);
        }

        let mut ranked: Vec<usize> = (0..similarities.len()).collect();
        ranked.sort_by(|&a, &b| similarities[b].total_cmp(&similarities[a]));
        let mut scores = vec![0.0; similarities.len()];
        for &i in ranked.iter().take(MAX_NEIGHBOURS) {
            scores[i] = similarities[i];
        }
        Ok(scores)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_scores() {
        let index = DenseIndex::build(vec![vec![2.0, 0.0], vec![0.0, 3.0], vec![1.0, 1.0]])
            .unwrap();
        let scores = index.score(&[5.0, 0.0]).unwrap_or_default();

        assert!((scores[0] - 1.0).abs() < 1e-6);
        assert!(scores[1].abs() < 1e-6);
        assert!((scores[2] - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(matches!(
            DenseIndex::build(vec![vec![1.0, 0.0], vec![1.0]]),
            Err(RetrievalError::DimensionMismatch { expected: 2, actual: 1 })
        ));

        let index = DenseIndex::build(vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.score(&[1.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let index = DenseIndex::build(vec![vec![0.0, 0.0], vec![1.0, 0.0]])
            .unwrap();
        let scores = index.score(&[1.0, 0.0]).unwrap_or_default();
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn test_only_top_neighbours_keep_scores() {
        let vectors = (0..MAX_NEIGHBOURS + 10)
            .map(|i| vec![1.0, i as f32])
            .collect();
        let index = DenseIndex::build(vectors).unwrap();
        let scores = index.score(&[1.0, 0.0]).unwrap_or_default();

        let kept = scores.iter().filter(|s| **s > 0.0).count();
        assert_eq!(kept, MAX_NEIGHBOURS);
        // Closest to the x axis are the smallest i
        assert!(scores[0] > 0.0);
        assert_eq!(scores[MAX_NEIGHBOURS + 9], 0.0);
    }
}
