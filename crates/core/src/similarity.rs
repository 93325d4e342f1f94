//! Cosine similarity over a flat arena of embeddings.
//!
//! Rows are addressed by their insertion index, which doubles as the tie-breaker
//! everywhere a ranking is produced: equal scores keep insertion order.

use crate::error::EmbeddingError;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Contiguous row-major storage for `len()` vectors of `dimensions()` floats.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingArena {
    dimensions: usize,
    values: Vec<f32>,
    norms: Vec<f32>,
}

impl EmbeddingArena {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            values: Vec::new(),
            norms: Vec::new(),
        }
    }

    pub fn with_capacity(dimensions: usize, rows: usize) -> Self {
        Self {
            dimensions,
            values: Vec::with_capacity(dimensions * rows),
            norms: Vec::with_capacity(rows),
        }
    }

    pub fn push(&mut self, vector: &[f32]) -> Result<usize, EmbeddingError> {
        if vector.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        self.values.extend_from_slice(vector);
        self.norms.push(l2_norm(vector));
        Ok(self.norms.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimensions;
        &self.values[start..start + self.dimensions]
    }

    fn similarity_between(&self, left: usize, right: usize) -> f32 {
        cosine_with_norms(
            self.row(left),
            self.norms[left],
            self.row(right),
            self.norms[right],
        )
    }

    /// Similarity of `query` against every row, in row order.
    pub fn scores_against(&self, query: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
        if query.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        let query_norm = l2_norm(query);
        Ok((0..self.len())
            .into_par_iter()
            .map(|index| cosine_with_norms(query, query_norm, self.row(index), self.norms[index]))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub similarity: f32,
}

pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// `dot(a, b) / (|a| * |b|)`; zero when either side has zero length.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    cosine_with_norms(left, l2_norm(left), right, l2_norm(right))
}

fn cosine_with_norms(left: &[f32], left_norm: f32, right: &[f32], right_norm: f32) -> f32 {
    let denominator = left_norm * right_norm;
    if denominator == 0.0 {
        return 0.0;
    }
    dot(left, right) / denominator
}

/// Descending by score, ascending by index on ties.
pub fn rank_order(left: &Neighbor, right: &Neighbor) -> Ordering {
    right
        .similarity
        .total_cmp(&left.similarity)
        .then_with(|| left.index.cmp(&right.index))
}

/// Row indices sorted by descending score; equal scores keep row order.
pub fn rank_scores(scores: &[f32]) -> Vec<Neighbor> {
    let mut ranked: Vec<Neighbor> = scores
        .iter()
        .enumerate()
        .map(|(index, similarity)| Neighbor {
            index,
            similarity: *similarity,
        })
        .collect();
    ranked.sort_by(rank_order);
    ranked
}

/// For every row, the `k` most similar other rows, best first.
///
/// Rows are computed independently in parallel; each only reads the shared arena.
pub fn top_k_neighbors(arena: &EmbeddingArena, k: usize) -> Vec<Vec<Neighbor>> {
    if k == 0 {
        return vec![Vec::new(); arena.len()];
    }

    (0..arena.len())
        .into_par_iter()
        .map(|row| {
            let mut candidates: Vec<Neighbor> = (0..arena.len())
                .filter(|other| *other != row)
                .map(|other| Neighbor {
                    index: other,
                    similarity: arena.similarity_between(row, other),
                })
                .collect();

            if candidates.len() > k {
                candidates.select_nth_unstable_by(k - 1, rank_order);
                candidates.truncate(k);
            }
            candidates.sort_by(rank_order);
            candidates
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena_of(rows: &[&[f32]]) -> EmbeddingArena {
        let mut arena = EmbeddingArena::new(rows[0].len());
        for row in rows {
            arena.push(row).expect("row dimension matches");
        }
        arena
    }

    #[test]
    fn self_similarity_is_one() {
        let vector = [0.3f32, -1.2, 4.0, 0.5];
        assert!((cosine_similarity(&vector, &vector) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_has_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn arena_rejects_wrong_dimension() {
        let mut arena = EmbeddingArena::new(3);
        assert!(arena.push(&[1.0, 0.0]).is_err());
        assert!(arena.is_empty());
    }

    #[test]
    fn neighbors_exclude_self_and_respect_k() {
        let arena = arena_of(&[
            &[1.0, 0.0],
            &[0.9, 0.1],
            &[0.0, 1.0],
            &[-1.0, 0.0],
        ]);

        let neighbors = top_k_neighbors(&arena, 2);

        assert_eq!(neighbors.len(), 4);
        for (row, list) in neighbors.iter().enumerate() {
            assert_eq!(list.len(), 2);
            assert!(list.iter().all(|neighbor| neighbor.index != row));
            assert!(list[0].similarity >= list[1].similarity);
        }
        assert_eq!(neighbors[0][0].index, 1);
    }

    #[test]
    fn ties_break_by_row_order() {
        let arena = arena_of(&[&[1.0, 0.0], &[0.0, 1.0], &[0.0, 1.0], &[0.0, 1.0]]);

        let neighbors = top_k_neighbors(&arena, 2);

        let picked: Vec<_> = neighbors[0].iter().map(|neighbor| neighbor.index).collect();
        assert_eq!(picked, vec![1, 2]);
    }

    #[test]
    fn small_corpus_caps_neighbor_count() {
        let arena = arena_of(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let neighbors = top_k_neighbors(&arena, 5);
        assert_eq!(neighbors[0].len(), 1);
        assert_eq!(neighbors[1].len(), 1);
    }

    #[test]
    fn zero_k_produces_no_neighbors() {
        let arena = arena_of(&[&[1.0, 0.0], &[0.0, 1.0]]);
        assert!(top_k_neighbors(&arena, 0).iter().all(Vec::is_empty));
    }

    #[test]
    fn ranking_is_stable_for_equal_scores() {
        let ranked = rank_scores(&[0.5, 0.9, 0.5, 0.9]);
        let order: Vec<_> = ranked.iter().map(|neighbor| neighbor.index).collect();
        assert_eq!(order, vec![1, 3, 0, 2]);
    }

    #[test]
    fn scores_against_checks_query_dimension() {
        let arena = arena_of(&[&[1.0, 0.0]]);
        assert!(arena.scores_against(&[1.0]).is_err());
        let scores = arena.scores_against(&[2.0, 0.0]).expect("dimensions agree");
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }
}
