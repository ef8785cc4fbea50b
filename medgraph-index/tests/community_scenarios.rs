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

//! End-to-end community builds

use medgraph_core::{
    AutoSelectConfig, ClusteringConfig, Entity, EntityGraph, EntityType, MedgraphConfig,
    RelationType, Relationship, SpecialtyTaxonomy,
};
use medgraph_index::{load_summaries, CommunityPipeline, CommunityStore, IndexError};
use std::io::Write;
use tempfile::TempDir;

fn config_with(clustering: ClusteringConfig) -> MedgraphConfig {
    MedgraphConfig {
        clustering,
        ..Default::default()
    }
}

fn target(count: usize) -> MedgraphConfig {
    config_with(ClusteringConfig {
        target_count: Some(count),
        ..Default::default()
    })
}

fn build(config: MedgraphConfig, graph: &EntityGraph) -> CommunityStore {
    CommunityPipeline::new(config, SpecialtyTaxonomy::default())
        .build(graph)
        .unwrap()
}

/// Two liver conditions, two beta blockers, one condition without context
fn mixed_graph() -> EntityGraph {
    EntityGraph::new(
        vec![
            Entity::new("a", "cirrhosis", EntityType::Condition)
                .with_context("liver cirrhosis hepatic"),
            Entity::new("b", "liver failure", EntityType::Condition)
                .with_context("hepatic liver failure"),
            Entity::new("c", "metoprolol", EntityType::Medication)
                .with_context("metoprolol beta blocker"),
            Entity::new("d", "beta blocker", EntityType::Medication)
                .with_context("beta blocker metoprolol dose"),
            Entity::new("e", "jaundice", EntityType::Condition),
        ],
        vec![
            Relationship::new("c", RelationType::Prescribed, "d"),
            Relationship::new("b", RelationType::Relates, "a"),
        ],
    )
    .unwrap()
}

#[test]
fn test_shared_vocabulary_groups_together() {
    let graph = EntityGraph::new(
        vec![
            Entity::new("A", "A", EntityType::Condition).with_context("liver cirrhosis"),
            Entity::new("B", "B", EntityType::Condition).with_context("hepatic failure"),
            Entity::new("C", "C", EntityType::Procedure).with_context("knee replacement"),
        ],
        vec![],
    )
    .unwrap();

    // Contexts alone share no terms; every distance ties and the lowest ids pair up
    let store = build(target(2), &graph);
    let assignments = store.assignments();
    assert_eq!(assignments["A"], assignments["B"]);
    assert_ne!(assignments["A"], assignments["C"]);
    assert_eq!(store.community_of("C").unwrap().size, 1);

    // With type labels A and B share "condition" and pair on similarity
    let mut config = target(2);
    config.vectorizer.include_type = true;
    let store = build(config, &graph);
    let assignments = store.assignments();
    assert_eq!(assignments["A"], assignments["B"]);
    assert_ne!(assignments["A"], assignments["C"]);
    assert!(store.entity_vector("A").unwrap().dot(store.entity_vector("B").unwrap()) > 0.0);
}

#[test]
fn test_empty_context_joins_same_type_peers() {
    let store = build(target(2), &mixed_graph());
    let assignments = store.assignments();

    assert_eq!(store.community_count(), 2);
    assert_eq!(assignments["e"], assignments["a"]);
    assert_eq!(assignments["a"], assignments["b"]);
    assert_eq!(assignments["c"], assignments["d"]);
    assert_ne!(assignments["a"], assignments["c"]);
    assert!(store.entity_vector("e").unwrap().is_zero());

    let liver = store.community_of("a").unwrap();
    assert_eq!(liver.members, vec!["a", "b", "e"]);
    assert_eq!(liver.dominant_type, EntityType::Condition);
    assert_eq!(liver.specialty, "Gastroenterology");
    assert_eq!(liver.internal_relationships["RELATES"], 1);
}

#[test]
fn test_distance_threshold_leaves_far_entities_apart() {
    let config = config_with(ClusteringConfig {
        target_count: None,
        distance_threshold: Some(0.5),
        ..Default::default()
    });
    let store = build(config, &mixed_graph());

    // Only the two tight pairs merge; the context-free entity stays alone
    assert_eq!(store.community_count(), 3);
    assert_eq!(store.community_of("e").unwrap().size, 1);
    assert_eq!(store.cut().merges_applied, 2);
}

#[test]
fn test_build_is_deterministic() {
    let first = build(target(2), &mixed_graph());
    let second = build(target(2), &mixed_graph());

    assert_eq!(first.assignments(), second.assignments());
    assert_eq!(first.communities(), second.communities());
    assert_eq!(first.vocabulary(), second.vocabulary());
    for entity in first.entities() {
        assert_eq!(Some(&entity.vector), second.entity_vector(&entity.id));
    }
}

#[test]
fn test_auto_select_records_chosen_count() {
    let config = config_with(ClusteringConfig {
        target_count: Some(4),
        auto_select: Some(AutoSelectConfig {
            candidate_counts: vec![2, 3],
            min_average_size: 1.0,
        }),
        ..Default::default()
    });
    let store = build(config, &mixed_graph());

    let chosen = store.cut().auto_selected_count.unwrap();
    assert!(chosen == 2 || chosen == 3);
    assert_eq!(store.community_count(), chosen);
    assert!(store.silhouette().is_some());
}

#[test]
fn test_auto_select_falls_back_to_configured_cut() {
    let config = config_with(ClusteringConfig {
        target_count: Some(4),
        auto_select: Some(AutoSelectConfig {
            candidate_counts: vec![2],
            min_average_size: 10.0,
        }),
        ..Default::default()
    });
    let store = build(config, &mixed_graph());

    assert!(store.cut().auto_selected_count.is_none());
    assert_eq!(store.community_count(), 4);
}

#[test]
fn test_single_context_is_insufficient() {
    let graph = EntityGraph::new(
        vec![
            Entity::new("a", "a", EntityType::Condition).with_context("liver"),
            Entity::new("b", "b", EntityType::Condition),
        ],
        vec![],
    )
    .unwrap();
    let result = CommunityPipeline::new(target(1), SpecialtyTaxonomy::default()).build(&graph);
    assert!(matches!(result, Err(IndexError::InsufficientData { found: 1 })));
}

#[test]
fn test_snapshot_files_and_summaries() {
    let dir = TempDir::new().unwrap();
    let store = build(target(2), &mixed_graph());

    let store_path = dir.path().join("community_store.json");
    store.save_json(&store_path).unwrap();
    let loaded = CommunityStore::load_json(&store_path).unwrap();
    assert_eq!(loaded.assignments(), store.assignments());
    let (before, after) = (store.silhouette().unwrap(), loaded.silhouette().unwrap());
    assert!((before - after).abs() < 1e-12);

    let summaries_path = dir.path().join("summaries.json");
    let mut file = std::fs::File::create(&summaries_path).unwrap();
    write!(
        file,
        r#"{{"0": {{"title": "Liver disease", "summary": "Cirrhosis and hepatic failure"}}, "7": {{"title": "ghost"}}}}"#
    )
    .unwrap();

    let summaries = load_summaries(&summaries_path).unwrap();
    let annotated = loaded.with_summaries(summaries);
    assert_eq!(
        annotated.community(0).unwrap().title.as_deref(),
        Some("Liver disease")
    );
    assert!(annotated.community(1).unwrap().title.is_none());
    assert!(loaded.community(0).unwrap().title.is_none());

    let records = annotated.summaries_document();
    assert_eq!(records[&0].sample_entities, vec!["a", "b", "e"]);
    assert_eq!(records[&0].title.as_deref(), Some("Liver disease"));
}

#[test]
fn test_taxonomy_file_drives_labels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("taxonomy.json");
    std::fs::write(&path, r#"{"Hepatology": ["liver", "hepatic"]}"#).unwrap();

    let mut config = target(2);
    config.specialty.taxonomy_path = Some(path);
    let store = CommunityPipeline::from_config(config)
        .unwrap()
        .build(&mixed_graph())
        .unwrap();

    assert_eq!(store.community_of("a").unwrap().specialty, "Hepatology");
    assert_eq!(store.community_of("c").unwrap().specialty, "General");
}

#[test]
fn test_threshold_only_config_file_merges_everything_close() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("medgraph.toml");
    std::fs::write(&path, "[clustering]\ndistance_threshold = 1.0\n").unwrap();
    let config = MedgraphConfig::from_file(&path).unwrap();
    assert!(config.clustering.target_count.is_none());

    let entities: Vec<Entity> = (0..20)
        .map(|i| {
            Entity::new(format!("e{i}"), format!("finding {i}"), EntityType::Condition)
                .with_context("liver hepatic")
        })
        .collect();
    let graph = EntityGraph::new(entities, vec![]).unwrap();
    let store = build(config, &graph);

    assert_eq!(store.community_count(), 1);
    assert_eq!(store.cut().merges_applied, 19);
}
