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

//! Community snapshot
//!
//! `CommunityStore` is the immutable result of one build: the fitted
//! vocabulary, every entity vector, the entity -> community assignment, the
//! community records and their aggregate vectors. Attaching summaries
//! produces a new snapshot; nothing mutates a store after construction.
//!
//! Loading validates the partition invariants before handing out a store.

use crate::clustering::CutCriterion;
use crate::error::{IndexError, IndexResult};
use crate::vectorizer::{SparseVector, TextVectorizer, Vocabulary};
use chrono::{DateTime, Utc};
use medgraph_core::{EntityId, EntityType, Linkage, VectorizerConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Number of member ids listed per community in the summaries export
const SAMPLE_ENTITIES: usize = 5;

/// A detected community
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    /// Community ID (0..k, numbered by first member appearance)
    pub id: u32,
    /// Member entity IDs in input order
    pub members: Vec<EntityId>,
    /// Member count
    pub size: usize,
    /// Specialty label, or the fallback label
    pub specialty: String,
    /// Top keywords across member contexts
    pub theme: Vec<String>,
    /// Most common member type
    pub dominant_type: EntityType,
    pub type_distribution: BTreeMap<EntityType, usize>,
    /// Relationship counts (by type) with both ends inside the community
    pub internal_relationships: BTreeMap<String, usize>,
    /// Relationship counts (by type) with exactly one end inside
    pub external_relationships: BTreeMap<String, usize>,
    /// Internal relationships per member pair
    pub density: f64,
    /// Title attached by the summarisation step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Summary attached by the summarisation step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Title and summary produced outside this crate for one community
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunitySummary {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// How the partition was cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CutSummary {
    pub linkage: Linkage,
    pub criterion: CutCriterion,
    pub merges_applied: usize,
    /// Set when candidate selection picked the count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_selected_count: Option<usize>,
}

/// Entity as recorded in the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedEntity {
    pub id: EntityId,
    pub community: u32,
    pub vector: SparseVector,
}

/// `community_stats.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsDocument {
    pub silhouette_score: Option<f64>,
    pub total_communities: usize,
    pub total_entities: usize,
    pub built_at: DateTime<Utc>,
    pub communities: BTreeMap<u32, Community>,
}

/// One entry of `community_summaries.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub specialty: String,
    pub theme: Vec<String>,
    pub size: usize,
    pub dominant_type: EntityType,
    pub type_distribution: BTreeMap<EntityType, usize>,
    pub sample_entities: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Deserialize)]
struct StoredSnapshot {
    built_at: DateTime<Utc>,
    vectorizer: VectorizerConfig,
    vocabulary: Vocabulary,
    entities: Vec<IndexedEntity>,
    communities: Vec<Community>,
    aggregates: Vec<SparseVector>,
    silhouette: Option<f64>,
    cut: CutSummary,
}

/// Immutable community snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredSnapshot")]
pub struct CommunityStore {
    built_at: DateTime<Utc>,
    vectorizer: VectorizerConfig,
    vocabulary: Vocabulary,
    entities: Vec<IndexedEntity>,
    communities: Vec<Community>,
    aggregates: Vec<SparseVector>,
    silhouette: Option<f64>,
    cut: CutSummary,
    #[serde(skip)]
    positions: HashMap<EntityId, usize>,
    #[serde(skip)]
    query_vectorizer: TextVectorizer,
}

impl TryFrom<StoredSnapshot> for CommunityStore {
    type Error = IndexError;

    fn try_from(s: StoredSnapshot) -> Result<Self, Self::Error> {
        let store = Self::assemble(
            s.built_at,
            s.vectorizer,
            s.vocabulary,
            s.entities,
            s.communities,
            s.aggregates,
            s.silhouette,
            s.cut,
        );
        store.validate()?;
        Ok(store)
    }
}

impl CommunityStore {
    /// Assemble a snapshot from build outputs.
    ///
    /// Aggregate vectors are derived from the member vectors. Fails if the
    /// parts break the partition or size invariants.
    pub fn new(
        vectorizer: VectorizerConfig,
        vocabulary: Vocabulary,
        entities: Vec<IndexedEntity>,
        communities: Vec<Community>,
        silhouette: Option<f64>,
        cut: CutSummary,
    ) -> IndexResult<Self> {
        let mut aggregates = vec![SparseVector::zero(); communities.len()];
        for entity in &entities {
            let slot = aggregates.get_mut(entity.community as usize).ok_or_else(|| {
                IndexError::InvariantViolation(format!(
                    "entity {} assigned to unknown community {}",
                    entity.id, entity.community
                ))
            })?;
            slot.add(&entity.vector);
        }
        for aggregate in &mut aggregates {
            aggregate.normalize();
        }

        let store = Self::assemble(
            Utc::now(),
            vectorizer,
            vocabulary,
            entities,
            communities,
            aggregates,
            silhouette,
            cut,
        );
        store.validate()?;
        Ok(store)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        built_at: DateTime<Utc>,
        vectorizer: VectorizerConfig,
        vocabulary: Vocabulary,
        entities: Vec<IndexedEntity>,
        communities: Vec<Community>,
        aggregates: Vec<SparseVector>,
        silhouette: Option<f64>,
        cut: CutSummary,
    ) -> Self {
        let positions = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
        let query_vectorizer = TextVectorizer::with_vocabulary(vectorizer.clone(), vocabulary.clone());
        Self {
            built_at,
            vectorizer,
            vocabulary,
            entities,
            communities,
            aggregates,
            silhouette,
            cut,
            positions,
            query_vectorizer,
        }
    }

    /// Check partition and size invariants
    pub fn validate(&self) -> IndexResult<()> {
        if self.positions.len() != self.entities.len() {
            return Err(IndexError::InvariantViolation(
                "duplicate entity ids in snapshot".to_string(),
            ));
        }
        if self.aggregates.len() != self.communities.len() {
            return Err(IndexError::InvariantViolation(format!(
                "{} aggregate vectors for {} communities",
                self.aggregates.len(),
                self.communities.len()
            )));
        }

        let mut expected: Vec<Vec<&str>> = vec![Vec::new(); self.communities.len()];
        for entity in &self.entities {
            let slot = expected.get_mut(entity.community as usize).ok_or_else(|| {
                IndexError::InvariantViolation(format!(
                    "entity {} assigned to unknown community {}",
                    entity.id, entity.community
                ))
            })?;
            slot.push(entity.id.as_str());
        }

        for (i, community) in self.communities.iter().enumerate() {
            if community.id as usize != i {
                return Err(IndexError::InvariantViolation(format!(
                    "community at position {} has id {}",
                    i, community.id
                )));
            }
            if community.members.is_empty() {
                return Err(IndexError::InvariantViolation(format!(
                    "community {} is empty",
                    community.id
                )));
            }
            if community.size != community.members.len() {
                return Err(IndexError::InvariantViolation(format!(
                    "community {} has size {} but {} members",
                    community.id,
                    community.size,
                    community.members.len()
                )));
            }
            let members: Vec<&str> = community.members.iter().map(String::as_str).collect();
            if members != expected[i] {
                return Err(IndexError::InvariantViolation(format!(
                    "community {} members disagree with the assignment map",
                    community.id
                )));
            }
        }

        Ok(())
    }

    /// Copy of this snapshot with titles and summaries attached.
    ///
    /// Unknown community ids are skipped with a warning.
    pub fn with_summaries<I>(&self, summaries: I) -> Self
    where
        I: IntoIterator<Item = (u32, CommunitySummary)>,
    {
        let mut next = self.clone();
        let mut attached = 0usize;
        for (id, summary) in summaries {
            match next.communities.get_mut(id as usize) {
                Some(community) => {
                    if summary.title.is_some() {
                        community.title = summary.title;
                    }
                    if summary.summary.is_some() {
                        community.summary = summary.summary;
                    }
                    attached += 1;
                }
                None => tracing::warn!(community = id, "Skipping summary for unknown community"),
            }
        }
        tracing::info!(attached, "Attached community summaries");
        next
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn vectorizer_config(&self) -> &VectorizerConfig {
        &self.vectorizer
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Map free text onto this snapshot's term axis
    pub fn vectorize(&self, text: &str) -> SparseVector {
        self.query_vectorizer.transform(text)
    }

    /// Entities in input order
    pub fn entities(&self) -> &[IndexedEntity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&IndexedEntity> {
        self.positions.get(id).map(|&i| &self.entities[i])
    }

    pub fn entity_vector(&self, id: &str) -> Option<&SparseVector> {
        self.entity(id).map(|e| &e.vector)
    }

    pub fn communities(&self) -> &[Community] {
        &self.communities
    }

    pub fn community(&self, id: u32) -> Option<&Community> {
        self.communities.get(id as usize)
    }

    /// Community an entity belongs to
    pub fn community_of(&self, entity_id: &str) -> Option<&Community> {
        self.entity(entity_id)
            .and_then(|e| self.communities.get(e.community as usize))
    }

    /// Unit-length sum of member vectors
    pub fn aggregate(&self, id: u32) -> Option<&SparseVector> {
        self.aggregates.get(id as usize)
    }

    pub fn silhouette(&self) -> Option<f64> {
        self.silhouette
    }

    pub fn cut(&self) -> &CutSummary {
        &self.cut
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn community_count(&self) -> usize {
        self.communities.len()
    }

    /// `community_assignments.json`: entity id -> community id
    pub fn assignments(&self) -> BTreeMap<EntityId, u32> {
        self.entities
            .iter()
            .map(|e| (e.id.clone(), e.community))
            .collect()
    }

    /// `community_stats.json`
    pub fn stats_document(&self) -> StatsDocument {
        StatsDocument {
            silhouette_score: self.silhouette,
            total_communities: self.communities.len(),
            total_entities: self.entities.len(),
            built_at: self.built_at,
            communities: self
                .communities
                .iter()
                .map(|c| (c.id, c.clone()))
                .collect(),
        }
    }

    /// `community_summaries.json`
    pub fn summaries_document(&self) -> BTreeMap<u32, SummaryRecord> {
        self.communities
            .iter()
            .map(|c| {
                (
                    c.id,
                    SummaryRecord {
                        specialty: c.specialty.clone(),
                        theme: c.theme.clone(),
                        size: c.size,
                        dominant_type: c.dominant_type,
                        type_distribution: c.type_distribution.clone(),
                        sample_entities: c.members.iter().take(SAMPLE_ENTITIES).cloned().collect(),
                        title: c.title.clone(),
                        summary: c.summary.clone(),
                    },
                )
            })
            .collect()
    }

    /// Save the snapshot as JSON (written to a temporary file, then renamed)
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> IndexResult<()> {
        write_json_atomic(path.as_ref(), self)
    }

    /// Load and validate a snapshot
    pub fn load_json<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let file = File::open(path.as_ref())?;
        let store: Self = serde_json::from_reader(BufReader::new(file))?;
        tracing::debug!(
            path = ?path.as_ref(),
            entities = store.entity_count(),
            communities = store.community_count(),
            "Loaded community snapshot"
        );
        Ok(store)
    }
}

/// Serialize `value` next to `path` and rename it into place
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> IndexResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load `{ "<community id>": { "title": ..., "summary": ... } }`
pub fn load_summaries<P: AsRef<Path>>(path: P) -> IndexResult<BTreeMap<u32, CommunitySummary>> {
    let file = File::open(path.as_ref())?;
    let summaries = serde_json::from_reader(BufReader::new(file))?;
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn community(id: u32, members: &[&str]) -> Community {
        Community {
            id,
            members: members.iter().map(|m| m.to_string()).collect(),
            size: members.len(),
            specialty: "General".to_string(),
            theme: vec![],
            dominant_type: EntityType::Condition,
            type_distribution: BTreeMap::new(),
            internal_relationships: BTreeMap::new(),
            external_relationships: BTreeMap::new(),
            density: 0.0,
            title: None,
            summary: None,
        }
    }

    fn indexed(id: &str, community: u32, pairs: Vec<(u32, f64)>) -> IndexedEntity {
        let mut vector = SparseVector::from_pairs(pairs);
        vector.normalize();
        IndexedEntity {
            id: id.to_string(),
            community,
            vector,
        }
    }

    fn vocabulary() -> Vocabulary {
        let mut vectorizer = TextVectorizer::new(VectorizerConfig::default());
        vectorizer
            .fit_transform(&["liver cirrhosis".to_string(), "knee".to_string()])
            .unwrap();
        vectorizer.vocabulary().unwrap().clone()
    }

    fn cut() -> CutSummary {
        CutSummary {
            linkage: Linkage::Average,
            criterion: CutCriterion::count(2),
            merges_applied: 1,
            auto_selected_count: None,
        }
    }

    fn sample() -> CommunityStore {
        CommunityStore::new(
            VectorizerConfig::default(),
            vocabulary(),
            vec![
                indexed("a", 0, vec![(0, 1.0)]),
                indexed("b", 0, vec![(1, 1.0)]),
                indexed("c", 1, vec![(2, 1.0)]),
            ],
            vec![community(0, &["a", "b"]), community(1, &["c"])],
            Some(0.5),
            cut(),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_and_aggregates() {
        let store = sample();
        assert_eq!(store.community_of("b").unwrap().id, 0);
        assert!(store.community_of("zzz").is_none());
        let agg = store.aggregate(0).unwrap();
        assert!((agg.norm() - 1.0).abs() < 1e-12);
        assert!((agg.get(0) - agg.get(1)).abs() < 1e-12);
        assert_eq!(store.assignments()["c"], 1);
        let members: HashSet<&str> = store
            .communities()
            .iter()
            .flat_map(|c| c.members.iter().map(String::as_str))
            .collect();
        assert_eq!(members.len(), 3);
        assert!(!store.vectorize("Liver biopsy").is_zero());
        assert!(store.vectorize("heart valve").is_zero());
    }

    #[test]
    fn test_invariants_enforced() {
        // Size disagrees with members
        let mut bad = community(0, &["a", "b"]);
        bad.size = 3;
        let result = CommunityStore::new(
            VectorizerConfig::default(),
            vocabulary(),
            vec![indexed("a", 0, vec![(0, 1.0)]), indexed("b", 0, vec![(1, 1.0)])],
            vec![bad],
            None,
            cut(),
        );
        assert!(matches!(result, Err(IndexError::InvariantViolation(_))));

        // Entity missing from its community's member list
        let result = CommunityStore::new(
            VectorizerConfig::default(),
            vocabulary(),
            vec![indexed("a", 0, vec![(0, 1.0)]), indexed("b", 0, vec![(1, 1.0)])],
            vec![community(0, &["a"])],
            None,
            cut(),
        );
        assert!(result.is_err());

        // Assignment to a community that does not exist
        let result = CommunityStore::new(
            VectorizerConfig::default(),
            vocabulary(),
            vec![indexed("a", 3, vec![(0, 1.0)])],
            vec![community(0, &["a"])],
            None,
            cut(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_with_summaries_returns_new_snapshot() {
        let store = sample();
        let next = store.with_summaries([
            (
                1,
                CommunitySummary {
                    title: Some("Knee".to_string()),
                    summary: Some("Orthopedic entities".to_string()),
                },
            ),
            (9, CommunitySummary::default()),
        ]);
        assert_eq!(next.community(1).unwrap().title.as_deref(), Some("Knee"));
        assert!(store.community(1).unwrap().title.is_none());
        assert_eq!(next.assignments(), store.assignments());
    }

    #[test]
    fn test_export_documents() {
        let store = sample();
        let stats = store.stats_document();
        assert_eq!(stats.total_communities, 2);
        assert_eq!(stats.silhouette_score, Some(0.5));

        let summaries = store.summaries_document();
        assert_eq!(summaries[&0].sample_entities, vec!["a", "b"]);
        let json = serde_json::to_value(&summaries).unwrap();
        assert_eq!(json["1"]["size"], 1);
        assert!(json["1"].get("title").is_none());
    }

    #[test]
    fn test_json_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("community_store.json");
        let store = sample();
        store.save_json(&path).unwrap();
        assert!(!path.with_file_name("community_store.json.tmp").exists());

        let loaded = CommunityStore::load_json(&path).unwrap();
        assert_eq!(loaded.assignments(), store.assignments());
        assert_eq!(loaded.communities(), store.communities());
        assert_eq!(loaded.entity_vector("a"), store.entity_vector("a"));
        assert_eq!(loaded.built_at(), store.built_at());
    }

    #[test]
    fn test_load_rejects_tampered_snapshot() {
        let store = sample();
        let mut json = serde_json::to_value(&store).unwrap();
        json["communities"][0]["size"] = serde_json::json!(7);
        let result: Result<CommunityStore, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
