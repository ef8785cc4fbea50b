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

//! Partition quality
//!
//! s(i) = (b(i) - a(i)) / max(a(i), b(i))
//!
//! Where:
//! - a(i) = mean distance from i to the rest of its community
//! - b(i) = lowest mean distance from i to any other community
//!
//! Members of singleton communities score 0. The overall score is the mean
//! of s(i) and is undefined when there is one community or only singletons.

use crate::clustering::{CutCriterion, Dendrogram, Partition};
use crate::similarity::SimilarityMatrix;
use medgraph_core::AutoSelectConfig;
use rayon::prelude::*;

/// Mean silhouette coefficient of a partition
pub fn silhouette_score(partition: &Partition, similarity: &SimilarityMatrix) -> Option<f64> {
    let n = partition.len();
    let k = partition.community_count();
    if k < 2 || k >= n {
        return None;
    }

    let labels = partition.labels();
    let sizes = partition.sizes();

    let scores: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let own = labels[i] as usize;
            if sizes[own] == 1 {
                return 0.0;
            }

            let mut sums = vec![0.0; k];
            for (j, &label) in labels.iter().enumerate() {
                if j != i {
                    sums[label as usize] += similarity.distance(i, j);
                }
            }

            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();

    // Summed in index order so repeated runs agree to the last bit
    let total: f64 = scores.iter().sum();
    Some(total / n as f64)
}

/// Outcome of a search over candidate community counts
#[derive(Debug, Clone)]
pub struct Selection {
    /// Candidate count that produced the partition
    pub target_count: usize,
    pub partition: Partition,
    pub silhouette: f64,
}

/// Cut the dendrogram once per candidate count and keep the best silhouette
/// among cuts whose average community size exceeds `min_average_size`.
///
/// Earlier candidates win ties. Returns `None` when no candidate qualifies.
pub fn auto_select(
    dendrogram: &Dendrogram,
    similarity: &SimilarityMatrix,
    config: &AutoSelectConfig,
) -> Option<Selection> {
    let mut best: Option<Selection> = None;

    for &count in &config.candidate_counts {
        if count == 0 {
            continue;
        }
        let partition = dendrogram.cut(&CutCriterion::count(count));
        let average_size = partition.average_size();
        let score = silhouette_score(&partition, similarity);
        tracing::debug!(
            candidate = count,
            communities = partition.community_count(),
            average_size,
            silhouette = ?score,
            "Evaluated candidate cut"
        );

        let Some(score) = score else {
            continue;
        };
        if average_size <= config.min_average_size {
            continue;
        }
        if best.as_ref().map_or(true, |b| score > b.silhouette) {
            best = Some(Selection {
                target_count: count,
                partition,
                silhouette: score,
            });
        }
    }

    best
}
