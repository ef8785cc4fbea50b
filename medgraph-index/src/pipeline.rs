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

//! Community build pipeline
//!
//! ```text
//! EntityGraph ──▶ TF-IDF ──▶ similarity ──▶ dendrogram ──▶ cut / auto-select
//!                                                              │
//!                       CommunityStore ◀── classify + analyse ◀┘
//! ```
//!
//! A build either produces a complete, validated snapshot or an error.

use crate::clustering::{CommunityBuilder, CutCriterion, Dendrogram, Partition};
use crate::error::{IndexError, IndexResult};
use crate::quality::{auto_select, silhouette_score};
use crate::similarity::SimilarityMatrix;
use crate::specialty::SpecialtyClassifier;
use crate::store::{Community, CommunityStore, CutSummary, IndexedEntity};
use crate::vectorizer::{document_text, TextVectorizer};
use medgraph_core::{Entity, EntityGraph, EntityType, MedgraphConfig, SpecialtyTaxonomy};
use std::collections::BTreeMap;
use std::time::Instant;

/// Builds community snapshots from an entity graph
#[derive(Debug, Clone)]
pub struct CommunityPipeline {
    config: MedgraphConfig,
    classifier: SpecialtyClassifier,
}

impl CommunityPipeline {
    /// Create a pipeline with an explicit taxonomy
    pub fn new(config: MedgraphConfig, taxonomy: SpecialtyTaxonomy) -> Self {
        let classifier = SpecialtyClassifier::new(taxonomy, &config.specialty);
        Self { config, classifier }
    }

    /// Create a pipeline, loading the taxonomy from `specialty.taxonomy_path`
    /// when set and using the built-in table otherwise.
    pub fn from_config(config: MedgraphConfig) -> IndexResult<Self> {
        let taxonomy = match &config.specialty.taxonomy_path {
            Some(path) => {
                let taxonomy = SpecialtyTaxonomy::from_json_file(path)?;
                tracing::info!(path = ?path, specialties = taxonomy.len(), "Loaded specialty taxonomy");
                taxonomy
            }
            None => SpecialtyTaxonomy::default(),
        };
        Ok(Self::new(config, taxonomy))
    }

    pub fn config(&self) -> &MedgraphConfig {
        &self.config
    }

    pub fn classifier(&self) -> &SpecialtyClassifier {
        &self.classifier
    }

    /// Run every stage and return a validated snapshot
    pub fn build(&self, graph: &EntityGraph) -> IndexResult<CommunityStore> {
        let started = Instant::now();
        let builder = CommunityBuilder::from_config(&self.config.clustering)?;
        let entities = graph.entities();

        // Vectorize
        let stage = Instant::now();
        let documents: Vec<String> = entities
            .iter()
            .map(|e| document_text(e, &self.config.vectorizer))
            .collect();
        let mut vectorizer = TextVectorizer::new(self.config.vectorizer.clone());
        let vectors = vectorizer.fit_transform(&documents)?;
        let vocabulary = vectorizer.vocabulary().cloned().ok_or_else(|| {
            IndexError::InvariantViolation("vectorizer has no vocabulary after fitting".to_string())
        })?;
        tracing::info!(
            entities = entities.len(),
            terms = vocabulary.len(),
            empty = vectors.iter().filter(|v| v.is_zero()).count(),
            elapsed_ms = stage.elapsed().as_millis() as u64,
            "Vectorized entity contexts"
        );

        // Similarity
        let stage = Instant::now();
        let types: Vec<EntityType> = entities.iter().map(|e| e.entity_type).collect();
        let mut similarity = SimilarityMatrix::compute(&vectors, &types, &self.config.similarity);
        similarity.apply_edge_boost(graph, self.config.similarity.edge_boost);
        tracing::info!(
            pairs = entities.len() * entities.len().saturating_sub(1) / 2,
            elapsed_ms = stage.elapsed().as_millis() as u64,
            "Computed similarity matrix"
        );

        // Cluster
        let stage = Instant::now();
        let dendrogram = builder.dendrogram(&similarity);
        let (partition, criterion, auto_selected_count) = self.choose_cut(&builder, &dendrogram, &similarity);
        let silhouette = silhouette_score(&partition, &similarity);
        tracing::info!(
            linkage = %builder.linkage(),
            communities = partition.community_count(),
            merges = partition.merges_applied(),
            silhouette = ?silhouette,
            elapsed_ms = stage.elapsed().as_millis() as u64,
            "Clustered entities"
        );

        // Classify + analyse
        let stage = Instant::now();
        let communities = self.describe(graph, &partition);
        let general = communities
            .iter()
            .filter(|c| c.specialty == self.classifier.fallback_label())
            .count();
        tracing::info!(
            communities = communities.len(),
            unlabelled = general,
            elapsed_ms = stage.elapsed().as_millis() as u64,
            "Labelled communities"
        );

        let indexed: Vec<IndexedEntity> = entities
            .iter()
            .zip(vectors)
            .zip(partition.labels())
            .map(|((entity, vector), &community)| IndexedEntity {
                id: entity.id.clone(),
                community,
                vector,
            })
            .collect();

        let store = CommunityStore::new(
            self.config.vectorizer.clone(),
            vocabulary,
            indexed,
            communities,
            silhouette,
            CutSummary {
                linkage: builder.linkage(),
                criterion,
                merges_applied: partition.merges_applied(),
                auto_selected_count,
            },
        )?;

        tracing::info!(
            entities = store.entity_count(),
            communities = store.community_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Community build complete"
        );
        Ok(store)
    }

    fn choose_cut(
        &self,
        builder: &CommunityBuilder,
        dendrogram: &Dendrogram,
        similarity: &SimilarityMatrix,
    ) -> (Partition, CutCriterion, Option<usize>) {
        if let Some(auto) = &self.config.clustering.auto_select {
            match auto_select(dendrogram, similarity, auto) {
                Some(selection) => {
                    tracing::info!(
                        target_count = selection.target_count,
                        silhouette = selection.silhouette,
                        "Auto-selected community count"
                    );
                    return (
                        selection.partition,
                        CutCriterion::count(selection.target_count),
                        Some(selection.target_count),
                    );
                }
                None => tracing::warn!(
                    candidates = ?auto.candidate_counts,
                    "No candidate count qualified, using the configured cut"
                ),
            }
        }
        let criterion = *builder.criterion();
        (dendrogram.cut(&criterion), criterion, None)
    }

    fn describe(&self, graph: &EntityGraph, partition: &Partition) -> Vec<Community> {
        let entities = graph.entities();
        let labels = partition.labels();
        let k = partition.community_count();

        let mut internal: Vec<BTreeMap<String, usize>> = vec![BTreeMap::new(); k];
        let mut external: Vec<BTreeMap<String, usize>> = vec![BTreeMap::new(); k];
        for rel in graph.relationships() {
            let (Some(s), Some(t)) = (graph.position(&rel.source), graph.position(&rel.target)) else {
                continue;
            };
            let (ls, lt) = (labels[s] as usize, labels[t] as usize);
            let key = rel.relation.as_str().to_string();
            if ls == lt {
                *internal[ls].entry(key).or_insert(0) += 1;
            } else {
                *external[ls].entry(key.clone()).or_insert(0) += 1;
                *external[lt].entry(key).or_insert(0) += 1;
            }
        }

        partition
            .members()
            .into_iter()
            .zip(internal.into_iter().zip(external))
            .enumerate()
            .map(|(id, (positions, (internal, external)))| {
                let members: Vec<&Entity> = positions.iter().map(|&p| &entities[p]).collect();
                let assignment = self.classifier.classify(&members);

                let mut type_distribution: BTreeMap<EntityType, usize> = BTreeMap::new();
                for member in &members {
                    *type_distribution.entry(member.entity_type).or_insert(0) += 1;
                }

                let size = members.len();
                let internal_total: usize = internal.values().sum();
                let pairs = (size * size.saturating_sub(1) / 2).max(1);

                Community {
                    id: id as u32,
                    members: members.iter().map(|e| e.id.clone()).collect(),
                    size,
                    specialty: assignment.specialty,
                    theme: self.classifier.theme(&members),
                    dominant_type: dominant_type(&type_distribution),
                    type_distribution,
                    internal_relationships: internal,
                    external_relationships: external,
                    density: internal_total as f64 / pairs as f64,
                    title: None,
                    summary: None,
                }
            })
            .collect()
    }
}

/// Most frequent type; ties go to the type that sorts first
fn dominant_type(distribution: &BTreeMap<EntityType, usize>) -> EntityType {
    let mut best: Option<(EntityType, usize)> = None;
    for (&ty, &count) in distribution {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((ty, count));
        }
    }
    best.map(|(ty, _)| ty).unwrap_or(EntityType::Unknown)
}
