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

//! Agglomerative Community Detection
//!
//! Bottom-up hierarchical clustering over `distance = 1 - similarity`.
//!
//! ## Algorithm Overview
//!
//! 1. **Start**: every entity is a singleton cluster whose id is its input position
//! 2. **Merge**: join the closest pair under the linkage rule; the merged
//!    cluster keeps the smaller id
//! 3. **Update**: recompute distances to the merged cluster (Lance–Williams)
//! 4. **Repeat**: until one cluster remains, recording every merge
//!
//! ## Lance–Williams updates
//!
//! - average: d(a∪b, x) = (|a|·d(a, x) + |b|·d(b, x)) / (|a| + |b|)
//! - complete: d(a∪b, x) = max(d(a, x), d(b, x))
//! - single: d(a∪b, x) = min(d(a, x), d(b, x))
//!
//! Ties on distance go to the pair with the smallest (min id, max id) key,
//! so the dendrogram is fully determined by the matrix. Distances within
//! [`TIE_EPS`] of each other count as tied, so rounding in the averaged
//! updates cannot reorder merges that are equal in exact arithmetic. A flat partition is
//! a cut of the dendrogram by community count and/or distance threshold.

use crate::error::{IndexError, IndexResult};
use crate::similarity::SimilarityMatrix;
use medgraph_core::{ClusteringConfig, Linkage};
use serde::{Deserialize, Serialize};

/// Distances closer than this are treated as equal when picking merges
pub const TIE_EPS: f64 = 1e-9;

/// Where to cut the dendrogram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutCriterion {
    /// Stop once this many communities remain
    pub target_count: Option<usize>,
    /// Never apply a merge above this distance
    pub distance_threshold: Option<f64>,
}

impl CutCriterion {
    pub fn count(target_count: usize) -> Self {
        Self {
            target_count: Some(target_count),
            distance_threshold: None,
        }
    }

    pub fn threshold(distance_threshold: f64) -> Self {
        Self {
            target_count: None,
            distance_threshold: Some(distance_threshold),
        }
    }

    /// Reject out-of-range or missing stopping rules
    pub fn validate(&self) -> IndexResult<()> {
        if self.target_count.is_none() && self.distance_threshold.is_none() {
            return Err(IndexError::InvalidConfiguration(
                "either target_count or distance_threshold must be set".to_string(),
            ));
        }
        if let Some(count) = self.target_count {
            if count < 1 {
                return Err(IndexError::InvalidConfiguration(format!(
                    "target_count must be >= 1, got {}",
                    count
                )));
            }
        }
        if let Some(threshold) = self.distance_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(IndexError::InvalidConfiguration(format!(
                    "distance_threshold must be in (0, 1], got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }
}

/// One step of the merge history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    /// Surviving cluster id (the smaller of the two)
    pub kept: usize,
    /// Cluster id that disappears
    pub absorbed: usize,
    /// Linkage distance at which the merge happened
    pub distance: f64,
    /// Size of the merged cluster
    pub size: usize,
}

/// Complete merge history over `leaves` entities
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    leaves: usize,
    linkage: Linkage,
    merges: Vec<Merge>,
}

impl Dendrogram {
    pub fn leaves(&self) -> usize {
        self.leaves
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    /// Merges in the order they were applied
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Number of leading merges a cut applies.
    ///
    /// With both rules set the cut stops at whichever is reached first.
    pub fn merges_for(&self, cut: &CutCriterion) -> usize {
        let mut applied = self.merges.len();
        if let Some(count) = cut.target_count {
            applied = applied.min(self.leaves.saturating_sub(count.max(1)));
        }
        if let Some(threshold) = cut.distance_threshold {
            let below = self
                .merges
                .iter()
                .take_while(|m| m.distance <= threshold)
                .count();
            applied = applied.min(below);
        }
        applied
    }

    /// Flat partition for a cut
    pub fn cut(&self, cut: &CutCriterion) -> Partition {
        self.partition_after(self.merges_for(cut))
    }

    /// Flat partition after applying the first `applied` merges
    pub fn partition_after(&self, applied: usize) -> Partition {
        let applied = applied.min(self.merges.len());
        let mut parent: Vec<usize> = (0..self.leaves).collect();
        for merge in &self.merges[..applied] {
            parent[merge.absorbed] = merge.kept;
        }

        // A cluster id is the smallest input position among its members, so
        // numbering roots by first appearance is numbering them ascending.
        let mut labels = vec![0u32; self.leaves];
        let mut numbering: Vec<Option<u32>> = vec![None; self.leaves];
        let mut next = 0u32;
        for i in 0..self.leaves {
            let root = find_root(&mut parent, i);
            let label = *numbering[root].get_or_insert_with(|| {
                next += 1;
                next - 1
            });
            labels[i] = label;
        }

        Partition {
            labels,
            community_count: next as usize,
            merges_applied: applied,
        }
    }
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    while parent[i] != root {
        let next = parent[i];
        parent[i] = root;
        i = next;
    }
    root
}

/// Flat assignment of every entity (by input position) to a community
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    labels: Vec<u32>,
    community_count: usize,
    merges_applied: usize,
}

impl Partition {
    /// Every entity in its own community
    pub fn singletons(n: usize) -> Self {
        Self {
            labels: (0..n as u32).collect(),
            community_count: n,
            merges_applied: 0,
        }
    }

    /// Community label per entity position; labels are 0..k numbered by
    /// first appearance
    pub fn labels(&self) -> &[u32] {
        &self.labels
    }

    pub fn label(&self, position: usize) -> Option<u32> {
        self.labels.get(position).copied()
    }

    pub fn community_count(&self) -> usize {
        self.community_count
    }

    pub fn merges_applied(&self) -> usize {
        self.merges_applied
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Member positions per community, each list in input order
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.community_count];
        for (position, &label) in self.labels.iter().enumerate() {
            members[label as usize].push(position);
        }
        members
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.community_count];
        for &label in &self.labels {
            sizes[label as usize] += 1;
        }
        sizes
    }

    pub fn average_size(&self) -> f64 {
        if self.community_count == 0 {
            0.0
        } else {
            self.labels.len() as f64 / self.community_count as f64
        }
    }
}

/// Agglomerative clustering driver
#[derive(Debug, Clone)]
pub struct CommunityBuilder {
    linkage: Linkage,
    criterion: CutCriterion,
}

impl CommunityBuilder {
    /// Create a builder, validating the stopping rule
    pub fn new(linkage: Linkage, criterion: CutCriterion) -> IndexResult<Self> {
        criterion.validate()?;
        Ok(Self { linkage, criterion })
    }

    pub fn from_config(config: &ClusteringConfig) -> IndexResult<Self> {
        Self::new(
            config.linkage,
            CutCriterion {
                target_count: config.target_count,
                distance_threshold: config.distance_threshold,
            },
        )
    }

    pub fn linkage(&self) -> Linkage {
        self.linkage
    }

    pub fn criterion(&self) -> &CutCriterion {
        &self.criterion
    }

    /// Cluster and cut with the configured criterion
    pub fn build(&self, similarity: &SimilarityMatrix) -> (Dendrogram, Partition) {
        let dendrogram = self.dendrogram(similarity);
        let partition = dendrogram.cut(&self.criterion);
        (dendrogram, partition)
    }

    /// Run clustering to a single root and record every merge
    pub fn dendrogram(&self, similarity: &SimilarityMatrix) -> Dendrogram {
        let n = similarity.len();
        let merges = if n < 2 {
            Vec::new()
        } else {
            Agglomeration::new(similarity, self.linkage).run()
        };
        Dendrogram {
            leaves: n,
            linkage: self.linkage,
            merges,
        }
    }
}

/// Mutable state of one clustering run.
///
/// `nearest[k]` caches the closest active partner `j > k` of cluster `k`
/// (ties within [`TIE_EPS`] to the smaller `j`), so the global minimum is
/// a scan over rows.
struct Agglomeration {
    n: usize,
    linkage: Linkage,
    dist: Vec<f64>,
    size: Vec<usize>,
    active: Vec<bool>,
    nearest: Vec<Option<(f64, usize)>>,
}

impl Agglomeration {
    fn new(similarity: &SimilarityMatrix, linkage: Linkage) -> Self {
        let n = similarity.len();
        let mut state = Self {
            n,
            linkage,
            dist: similarity.to_distances(),
            size: vec![1; n],
            active: vec![true; n],
            nearest: vec![None; n],
        };
        for k in 0..n {
            state.nearest[k] = state.scan(k);
        }
        state
    }

    fn scan(&self, k: usize) -> Option<(f64, usize)> {
        let mut best: Option<(f64, usize)> = None;
        for j in (k + 1)..self.n {
            if !self.active[j] {
                continue;
            }
            let d = self.dist[k * self.n + j];
            if best.map_or(true, |(bd, _)| d < bd - TIE_EPS) {
                best = Some((d, j));
            }
        }
        best
    }

    fn closest_pair(&self) -> Option<(f64, usize, usize)> {
        let mut pick: Option<(f64, usize, usize)> = None;
        for k in 0..self.n {
            if !self.active[k] {
                continue;
            }
            if let Some((d, j)) = self.nearest[k] {
                if pick.map_or(true, |(pd, _, _)| d < pd - TIE_EPS) {
                    pick = Some((d, k, j));
                }
            }
        }
        pick
    }

    fn run(mut self) -> Vec<Merge> {
        let mut merges = Vec::with_capacity(self.n - 1);
        while let Some((distance, a, b)) = self.closest_pair() {
            self.merge(a, b);
            merges.push(Merge {
                kept: a,
                absorbed: b,
                distance,
                size: self.size[a],
            });
        }
        merges
    }

    /// Fold cluster `b` into `a` (`a < b`) and refresh the nearest cache
    fn merge(&mut self, a: usize, b: usize) {
        let n = self.n;
        let (na, nb) = (self.size[a] as f64, self.size[b] as f64);
        for x in 0..n {
            if !self.active[x] || x == a || x == b {
                continue;
            }
            let dax = self.dist[a * n + x];
            let dbx = self.dist[b * n + x];
            let updated = match self.linkage {
                Linkage::Average => (na * dax + nb * dbx) / (na + nb),
                Linkage::Complete => dax.max(dbx),
                Linkage::Single => dax.min(dbx),
            };
            self.dist[a * n + x] = updated;
            self.dist[x * n + a] = updated;
        }
        self.active[b] = false;
        self.size[a] += self.size[b];
        self.nearest[b] = None;

        for k in 0..n {
            if !self.active[k] {
                continue;
            }
            if k == a {
                self.nearest[k] = self.scan(k);
            } else if k < a {
                match self.nearest[k] {
                    Some((_, p)) if p == a || p == b => self.nearest[k] = self.scan(k),
                    Some((bd, bp)) => {
                        let dka = self.dist[k * n + a];
                        if dka < bd - TIE_EPS || ((dka - bd).abs() <= TIE_EPS && a < bp) {
                            self.nearest[k] = Some((dka, a));
                        }
                    }
                    None => self.nearest[k] = self.scan(k),
                }
            } else if k < b {
                if let Some((_, p)) = self.nearest[k] {
                    if p == b {
                        self.nearest[k] = self.scan(k);
                    }
                }
            }
        }
    }
}
