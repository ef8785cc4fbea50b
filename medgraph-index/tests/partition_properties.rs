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

//! Property tests for vectorizing, similarity and partitioning

use medgraph_core::{EntityType, Linkage, SimilarityConfig, VectorizerConfig};
use medgraph_index::clustering::TIE_EPS;
use medgraph_index::{CommunityBuilder, CutCriterion, SimilarityMatrix, TextVectorizer};
use proptest::prelude::*;

const WORDS: [&str; 10] = [
    "liver", "hepatic", "knee", "fracture", "heart", "valve", "kidney", "renal", "insulin", "lung",
];

fn linkage() -> impl Strategy<Value = Linkage> {
    prop_oneof![
        Just(Linkage::Average),
        Just(Linkage::Complete),
        Just(Linkage::Single),
    ]
}

/// Random symmetric similarity matrix built from its upper triangle
fn matrix() -> impl Strategy<Value = SimilarityMatrix> {
    (2usize..14).prop_flat_map(|n| {
        proptest::collection::vec(0.0f64..=1.0, n * (n - 1) / 2).prop_map(move |upper| {
            let mut rows = vec![vec![1.0; n]; n];
            let mut it = upper.into_iter();
            for i in 0..n {
                for j in (i + 1)..n {
                    let v = it.next().unwrap();
                    rows[i][j] = v;
                    rows[j][i] = v;
                }
            }
            SimilarityMatrix::from_rows(rows).unwrap()
        })
    })
}

/// Similarities on a quarter grid, so many cluster distances tie exactly
fn tied_matrix() -> impl Strategy<Value = SimilarityMatrix> {
    (2usize..9).prop_flat_map(|n| {
        proptest::collection::vec(0u8..4, n * (n - 1) / 2).prop_map(move |upper| {
            let mut rows = vec![vec![1.0; n]; n];
            let mut it = upper.into_iter();
            for i in 0..n {
                for j in (i + 1)..n {
                    let v = f64::from(it.next().unwrap()) * 0.25;
                    rows[i][j] = v;
                    rows[j][i] = v;
                }
            }
            SimilarityMatrix::from_rows(rows).unwrap()
        })
    })
}

/// Linkage distance recomputed from every member pair of the input matrix
fn linkage_distance(m: &SimilarityMatrix, linkage: Linkage, a: &[usize], b: &[usize]) -> f64 {
    let pairs = a.iter().flat_map(|&i| b.iter().map(move |&j| m.distance(i, j)));
    match linkage {
        Linkage::Average => pairs.sum::<f64>() / (a.len() * b.len()) as f64,
        Linkage::Complete => pairs.fold(f64::MIN, f64::max),
        Linkage::Single => pairs.fold(f64::MAX, f64::min),
    }
}

/// Quadratic-per-step agglomeration; clusters are named by their smallest member
fn reference_merges(m: &SimilarityMatrix, linkage: Linkage) -> Vec<(usize, usize, f64)> {
    let n = m.len();
    let mut clusters: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();
    let mut merges = Vec::new();
    while merges.len() + 1 < n {
        let mut pick: Option<(f64, usize, usize)> = None;
        for a in 0..n {
            let Some(left) = &clusters[a] else { continue };
            for b in (a + 1)..n {
                let Some(right) = &clusters[b] else { continue };
                let d = linkage_distance(m, linkage, left, right);
                if pick.map_or(true, |(best, _, _)| d < best - TIE_EPS) {
                    pick = Some((d, a, b));
                }
            }
        }
        let (d, a, b) = pick.unwrap();
        let absorbed = clusters[b].take().unwrap();
        clusters[a].as_mut().unwrap().extend(absorbed);
        merges.push((a, b, d));
    }
    merges
}

/// Small documents drawn from a fixed word list; some may be empty
fn corpus() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::vec(
        proptest::collection::vec(0usize..WORDS.len(), 0..6)
            .prop_map(|ids| ids.iter().map(|&i| WORDS[i]).collect::<Vec<_>>().join(" ")),
        2..16,
    )
}

proptest! {
    #[test]
    fn prop_partition_covers_every_entity_once(m in matrix(), linkage in linkage(), k in 1usize..14) {
        let builder = CommunityBuilder::new(linkage, CutCriterion::count(k)).unwrap();
        let (_, partition) = builder.build(&m);

        prop_assert_eq!(partition.len(), m.len());
        prop_assert_eq!(partition.community_count(), k.min(m.len()));

        let members = partition.members();
        let mut seen = vec![false; m.len()];
        for (label, group) in members.iter().enumerate() {
            prop_assert!(!group.is_empty());
            for &p in group {
                prop_assert!(!seen[p]);
                seen[p] = true;
                prop_assert_eq!(partition.label(p), Some(label as u32));
            }
        }
        prop_assert!(seen.iter().all(|&s| s));
        prop_assert_eq!(partition.sizes().iter().sum::<usize>(), m.len());
    }

    #[test]
    fn prop_dendrogram_matches_member_pair_linkage(m in tied_matrix(), linkage in linkage()) {
        let builder = CommunityBuilder::new(linkage, CutCriterion::count(1)).unwrap();
        let dendrogram = builder.dendrogram(&m);
        let expected = reference_merges(&m, linkage);

        prop_assert_eq!(dendrogram.merges().len(), expected.len());
        for (merge, &(kept, absorbed, distance)) in dendrogram.merges().iter().zip(&expected) {
            prop_assert_eq!((merge.kept, merge.absorbed), (kept, absorbed));
            prop_assert!((merge.distance - distance).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_labels_number_by_first_appearance(m in matrix(), k in 1usize..14) {
        let builder = CommunityBuilder::new(Linkage::Average, CutCriterion::count(k)).unwrap();
        let (_, partition) = builder.build(&m);

        let mut next = 0u32;
        for &label in partition.labels() {
            prop_assert!(label <= next);
            if label == next {
                next += 1;
            }
        }
    }

    #[test]
    fn prop_threshold_cut_never_merges_above_threshold(
        m in matrix(),
        linkage in linkage(),
        threshold in 0.01f64..=1.0,
    ) {
        let builder = CommunityBuilder::new(linkage, CutCriterion::threshold(threshold)).unwrap();
        let (dendrogram, partition) = builder.build(&m);

        let applied = partition.merges_applied();
        for merge in &dendrogram.merges()[..applied] {
            prop_assert!(merge.distance <= threshold);
        }
        prop_assert_eq!(partition.community_count(), m.len() - applied);
    }

    #[test]
    fn prop_community_count_monotonic_in_threshold(
        m in matrix(),
        linkage in linkage(),
        low in 0.01f64..=1.0,
        high in 0.01f64..=1.0,
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let builder = CommunityBuilder::new(linkage, CutCriterion::count(1)).unwrap();
        let dendrogram = builder.dendrogram(&m);

        let loose = dendrogram.cut(&CutCriterion::threshold(high)).community_count();
        let tight = dendrogram.cut(&CutCriterion::threshold(low)).community_count();
        prop_assert!(loose <= tight);
    }

    #[test]
    fn prop_similarity_bounded_and_symmetric(docs in corpus()) {
        let mut vectorizer = TextVectorizer::new(VectorizerConfig::default());
        let Ok(vectors) = vectorizer.fit_transform(&docs) else {
            // Fewer than two non-empty documents
            return Ok(());
        };
        let types = vec![EntityType::Condition; vectors.len()];
        let m = SimilarityMatrix::compute(&vectors, &types, &SimilarityConfig::default());

        for i in 0..m.len() {
            prop_assert_eq!(m.get(i, i), 1.0);
            for j in 0..m.len() {
                let s = m.get(i, j);
                prop_assert!((0.0..=1.0).contains(&s));
                prop_assert_eq!(s, m.get(j, i));
            }
        }
    }

    #[test]
    fn prop_vectorizer_is_deterministic(docs in corpus()) {
        let mut first = TextVectorizer::new(VectorizerConfig::default());
        let mut second = TextVectorizer::new(VectorizerConfig::default());
        let a = first.fit_transform(&docs);
        let b = second.fit_transform(&docs);
        match (a, b) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a, b);
                prop_assert_eq!(first.vocabulary(), second.vocabulary());
            }
            (Err(_), Err(_)) => {}
            _ => prop_assert!(false, "fits disagree"),
        }
    }
}
