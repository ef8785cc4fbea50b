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

//! Similarity and clustering stages
//!
//! Run with: cargo bench -p medgraph-index --bench clustering_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use medgraph_core::{EntityType, Linkage, SimilarityConfig, VectorizerConfig};
use medgraph_index::{CommunityBuilder, CutCriterion, SimilarityMatrix, TextVectorizer};

const WORDS: [&str; 24] = [
    "liver", "cirrhosis", "hepatic", "ascites", "knee", "fracture", "bone", "joint",
    "heart", "cardiac", "valve", "coronary", "kidney", "renal", "dialysis", "creatinine",
    "lung", "pulmonary", "oxygen", "insulin", "glucose", "diabetes", "seizure", "stroke",
];

/// Synthetic contexts drawn from a few overlapping word groups
fn corpus(size: usize) -> Vec<String> {
    (0..size)
        .map(|i| {
            let group = (i % 6) * 4;
            (0..5)
                .map(|k| WORDS[(group + (i * 7 + k * 3) % 6) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity_matrix");

    for size in [100usize, 400, 1000].iter() {
        let mut vectorizer = TextVectorizer::new(VectorizerConfig::default());
        let vectors = vectorizer.fit_transform(&corpus(*size)).unwrap();
        let types = vec![EntityType::Condition; *size];

        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                SimilarityMatrix::compute(
                    black_box(&vectors),
                    black_box(&types),
                    &SimilarityConfig::default(),
                )
            });
        });
    }

    group.finish();
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("agglomerative");
    group.sample_size(10);

    for size in [100usize, 400].iter() {
        let mut vectorizer = TextVectorizer::new(VectorizerConfig::default());
        let vectors = vectorizer.fit_transform(&corpus(*size)).unwrap();
        let types = vec![EntityType::Condition; *size];
        let similarity = SimilarityMatrix::compute(&vectors, &types, &SimilarityConfig::default());

        for linkage in [Linkage::Average, Linkage::Complete, Linkage::Single] {
            let builder = CommunityBuilder::new(linkage, CutCriterion::count(15)).unwrap();
            group.bench_with_input(
                BenchmarkId::new(linkage.as_str(), size),
                &similarity,
                |b, m| {
                    b.iter(|| builder.build(black_box(m)));
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, bench_similarity, bench_clustering);

criterion_main!(benches);
