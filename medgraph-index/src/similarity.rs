// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Pairwise similarity matrix
//!
//! Dense N×N cosine similarities over unit-length TF-IDF vectors. Values are
//! clamped to [0, 1] and the diagonal is fixed at 1. Entities whose vector is
//! zero get `type_fallback_similarity` towards entities of the same type and
//! 0 towards everything else, so empty-context entities still group by type.

use crate::error::{IndexError, IndexResult};
use crate::vectorizer::SparseVector;
use medgraph_core::{EntityGraph, EntityType, SimilarityConfig};
use rayon::prelude::*;

/// Symmetric similarity matrix in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    n: usize,
    values: Vec<f64>,
}

impl SimilarityMatrix {
    /// Compute all pairwise similarities.
    ///
    /// `vectors` and `types` are parallel arrays in entity input order. Rows
    /// are computed in parallel; each unordered pair is evaluated once.
    pub fn compute(vectors: &[SparseVector], types: &[EntityType], config: &SimilarityConfig) -> Self {
        debug_assert_eq!(vectors.len(), types.len());
        let n = vectors.len();
        let fallback = config.type_fallback_similarity.clamp(0.0, 1.0);

        let upper: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| {
                        if vectors[i].is_zero() || vectors[j].is_zero() {
                            if types[i] == types[j] {
                                fallback
                            } else {
                                0.0
                            }
                        } else {
                            // Vectors are unit length, so the dot product is the cosine
                            vectors[i].dot(&vectors[j]).clamp(0.0, 1.0)
                        }
                    })
                    .collect()
            })
            .collect();

        let mut values = vec![0.0; n * n];
        for (i, row) in upper.into_iter().enumerate() {
            values[i * n + i] = 1.0;
            for (offset, sim) in row.into_iter().enumerate() {
                let j = i + 1 + offset;
                values[i * n + j] = sim;
                values[j * n + i] = sim;
            }
        }

        Self { n, values }
    }

    /// Build from explicit rows, e.g. similarities computed elsewhere.
    ///
    /// Rows must form a square, symmetric matrix with values in [0, 1]; the
    /// diagonal is forced to 1.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> IndexResult<Self> {
        let n = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n) {
            return Err(IndexError::InvalidConfiguration(format!(
                "similarity row {} has {} values, expected {}",
                i,
                row.len(),
                n
            )));
        }

        let mut values = Vec::with_capacity(n * n);
        for (i, row) in rows.iter().enumerate() {
            for (j, &sim) in row.iter().enumerate() {
                if !(0.0..=1.0).contains(&sim) {
                    return Err(IndexError::InvalidConfiguration(format!(
                        "similarity ({}, {}) = {} is outside [0, 1]",
                        i, j, sim
                    )));
                }
                if rows[j][i] != sim {
                    return Err(IndexError::InvalidConfiguration(format!(
                        "similarity matrix is not symmetric at ({}, {})",
                        i, j
                    )));
                }
                values.push(if i == j { 1.0 } else { sim });
            }
        }
        Ok(Self { n, values })
    }

    /// Add `boost` to every directly related pair, capped at 1.
    ///
    /// Entity positions follow `graph` input order, which must match the
    /// order the matrix was computed in.
    pub fn apply_edge_boost(&mut self, graph: &EntityGraph, boost: f64) {
        if boost <= 0.0 {
            return;
        }
        let mut boosted = 0usize;
        for rel in graph.relationships() {
            let (Some(i), Some(j)) = (graph.position(&rel.source), graph.position(&rel.target))
            else {
                continue;
            };
            if i == j || i >= self.n || j >= self.n {
                continue;
            }
            let sim = (self.get(i, j) + boost).min(1.0);
            self.values[i * self.n + j] = sim;
            self.values[j * self.n + i] = sim;
            boosted += 1;
        }
        tracing::debug!(boosted, boost, "Applied co-occurrence boost");
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    /// Distance used by clustering: 1 - similarity
    pub fn distance(&self, i: usize, j: usize) -> f64 {
        1.0 - self.get(i, j)
    }

    /// Full distance matrix in row-major order
    pub fn to_distances(&self) -> Vec<f64> {
        self.values.iter().map(|s| 1.0 - s).collect()
    }
}
