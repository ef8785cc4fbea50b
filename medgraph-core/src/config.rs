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

//! Medgraph Configuration
//!
//! Every field carries a serde default, so a partial TOML file is valid.
//! Load order: file (if present) -> `MEDGRAPH_*` environment -> CLI flags.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MedgraphConfig {
    #[serde(default)]
    pub vectorizer: VectorizerConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub specialty: SpecialtyConfig,
    #[serde(default)]
    pub router: RouterConfig,
}

/// TF-IDF vectorizer settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VectorizerConfig {
    /// Minimum number of documents a term must appear in
    #[serde(default = "default_min_df")]
    pub min_df: usize,

    /// Maximum share of documents a term may appear in (0.0 - 1.0]
    #[serde(default = "default_max_df_ratio")]
    pub max_df_ratio: f64,

    /// Keep only the most frequent terms
    #[serde(default)]
    pub max_features: Option<usize>,

    /// Largest n-gram length (1 = unigrams only, 2 adds bigrams)
    #[serde(default = "default_ngram_max")]
    pub ngram_max: usize,

    /// Prefix each document with the entity name
    #[serde(default)]
    pub include_name: bool,

    /// Prefix each document with the entity type label
    #[serde(default)]
    pub include_type: bool,
}

/// Pairwise similarity settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimilarityConfig {
    /// Similarity given to zero-vector entities sharing a type
    #[serde(default = "default_type_fallback")]
    pub type_fallback_similarity: f64,

    /// Added to the similarity of directly related entities (0 = off)
    #[serde(default)]
    pub edge_boost: f64,
}

/// Linkage rule for agglomerative clustering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    /// Mean pairwise distance
    #[default]
    Average,
    /// Maximum pairwise distance
    Complete,
    /// Minimum pairwise distance
    Single,
}

impl Linkage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Linkage::Average => "average",
            Linkage::Complete => "complete",
            Linkage::Single => "single",
        }
    }
}

impl FromStr for Linkage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "average" | "avg" => Ok(Linkage::Average),
            "complete" | "max" => Ok(Linkage::Complete),
            "single" | "min" => Ok(Linkage::Single),
            other => Err(CoreError::Config(format!("unknown linkage: {}", other))),
        }
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search over several community counts, keeping the best silhouette
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AutoSelectConfig {
    #[serde(default = "default_candidate_counts")]
    pub candidate_counts: Vec<usize>,

    /// Cuts whose average community size does not exceed this are skipped
    #[serde(default = "default_min_average_size")]
    pub min_average_size: f64,
}

impl Default for AutoSelectConfig {
    fn default() -> Self {
        Self {
            candidate_counts: default_candidate_counts(),
            min_average_size: default_min_average_size(),
        }
    }
}

/// Agglomerative clustering settings
///
/// A section that names neither stopping rule falls back to a count of 15.
/// Naming only `distance_threshold` gives a threshold-only cut.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(from = "ClusteringSection")]
pub struct ClusteringConfig {
    /// Stop when this many communities remain
    pub target_count: Option<usize>,

    /// Stop before merging clusters further apart than this (0.0 - 1.0]
    pub distance_threshold: Option<f64>,

    pub linkage: Linkage,

    pub auto_select: Option<AutoSelectConfig>,
}

/// `[clustering]` as written in the file
#[derive(Deserialize)]
struct ClusteringSection {
    #[serde(default)]
    target_count: Option<usize>,
    #[serde(default)]
    distance_threshold: Option<f64>,
    #[serde(default)]
    linkage: Linkage,
    #[serde(default)]
    auto_select: Option<AutoSelectConfig>,
}

impl From<ClusteringSection> for ClusteringConfig {
    fn from(section: ClusteringSection) -> Self {
        let target_count = match (section.target_count, section.distance_threshold) {
            (None, None) => default_target_count(),
            (count, _) => count,
        };
        Self {
            target_count,
            distance_threshold: section.distance_threshold,
            linkage: section.linkage,
            auto_select: section.auto_select,
        }
    }
}

/// Specialty labelling settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpecialtyConfig {
    /// Minimum keyword hits before a specialty is assigned
    #[serde(default = "default_min_hits")]
    pub min_hits: usize,

    /// Label used when no specialty reaches `min_hits`
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,

    /// Number of theme keywords per community
    #[serde(default = "default_theme_size")]
    pub theme_size: usize,

    /// JSON taxonomy file; the built-in table is used when unset
    #[serde(default)]
    pub taxonomy_path: Option<PathBuf>,
}

/// Query routing settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Maximum entities or communities returned
    #[serde(default = "default_max_context_items")]
    pub max_context_items: usize,

    /// Shortest entity name eligible for substring matching
    #[serde(default = "default_min_name_length")]
    pub min_name_length: usize,

    /// Share of a name's tokens that must occur in the query
    #[serde(default = "default_fuzzy_match_threshold")]
    pub fuzzy_match_threshold: f64,

    /// 1-hop relationships attached per local result
    #[serde(default = "default_max_relationships")]
    pub max_relationships_per_entity: usize,

    /// Best-scoring members attached per global result
    #[serde(default = "default_max_highlights")]
    pub max_highlights: usize,

    /// Query vector cache capacity (0 disables caching)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

// Default values
fn default_min_df() -> usize {
    1
}

fn default_max_df_ratio() -> f64 {
    1.0
}

fn default_ngram_max() -> usize {
    1
}

fn default_type_fallback() -> f64 {
    0.1
}

fn default_candidate_counts() -> Vec<usize> {
    vec![10, 15, 20, 25]
}

fn default_min_average_size() -> f64 {
    5.0
}

fn default_target_count() -> Option<usize> {
    Some(15)
}

fn default_min_hits() -> usize {
    1
}

fn default_fallback_label() -> String {
    "General".to_string()
}

fn default_theme_size() -> usize {
    5
}

fn default_max_context_items() -> usize {
    5
}

fn default_min_name_length() -> usize {
    3
}

fn default_fuzzy_match_threshold() -> f64 {
    0.5
}

fn default_max_relationships() -> usize {
    10
}

fn default_max_highlights() -> usize {
    5
}

fn default_cache_capacity() -> u64 {
    1024
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            min_df: default_min_df(),
            max_df_ratio: default_max_df_ratio(),
            max_features: None,
            ngram_max: default_ngram_max(),
            include_name: false,
            include_type: false,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            type_fallback_similarity: default_type_fallback(),
            edge_boost: 0.0,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            distance_threshold: None,
            linkage: Linkage::default(),
            auto_select: None,
        }
    }
}

impl Default for SpecialtyConfig {
    fn default() -> Self {
        Self {
            min_hits: default_min_hits(),
            fallback_label: default_fallback_label(),
            theme_size: default_theme_size(),
            taxonomy_path: None,
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_context_items: default_max_context_items(),
            min_name_length: default_min_name_length(),
            fuzzy_match_threshold: default_fuzzy_match_threshold(),
            max_relationships_per_entity: default_max_relationships(),
            max_highlights: default_max_highlights(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

const ENV_TARGET_COUNT: &str = "MEDGRAPH_TARGET_COUNT";
const ENV_DISTANCE_THRESHOLD: &str = "MEDGRAPH_DISTANCE_THRESHOLD";
const ENV_LINKAGE: &str = "MEDGRAPH_LINKAGE";
const ENV_MIN_DF: &str = "MEDGRAPH_MIN_DF";
const ENV_MAX_CONTEXT_ITEMS: &str = "MEDGRAPH_MAX_CONTEXT_ITEMS";

impl MedgraphConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - MEDGRAPH_TARGET_COUNT: Number of communities (default: 15)
    /// - MEDGRAPH_DISTANCE_THRESHOLD: Merge distance cut-off (default: unset)
    ///
    /// Setting either stopping rule replaces both, so a threshold alone
    /// gives a threshold-only cut.
    /// - MEDGRAPH_LINKAGE: average | complete | single (default: average)
    /// - MEDGRAPH_MIN_DF: Minimum document frequency (default: 1)
    /// - MEDGRAPH_MAX_CONTEXT_ITEMS: Results per query (default: 5)
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> CoreResult<Self> {
        let config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        let config = config.merge_with_env();
        config.validate()?;
        Ok(config)
    }

    /// Override fields whose environment variable is set and parses
    fn merge_with_env(mut self) -> Self {
        // Either stopping rule in the environment replaces both
        let mut target_count = None;
        if let Ok(value) = std::env::var(ENV_TARGET_COUNT) {
            match value.parse() {
                Ok(count) => target_count = Some(count),
                Err(_) => tracing::warn!("Ignoring invalid {}: {}", ENV_TARGET_COUNT, value),
            }
        }

        let mut distance_threshold = None;
        if let Ok(value) = std::env::var(ENV_DISTANCE_THRESHOLD) {
            match value.parse() {
                Ok(threshold) => distance_threshold = Some(threshold),
                Err(_) => tracing::warn!("Ignoring invalid {}: {}", ENV_DISTANCE_THRESHOLD, value),
            }
        }

        if target_count.is_some() || distance_threshold.is_some() {
            self.clustering.target_count = target_count;
            self.clustering.distance_threshold = distance_threshold;
        }

        if let Ok(value) = std::env::var(ENV_LINKAGE) {
            match value.parse() {
                Ok(linkage) => self.clustering.linkage = linkage,
                Err(_) => tracing::warn!("Ignoring invalid {}: {}", ENV_LINKAGE, value),
            }
        }

        if let Ok(value) = std::env::var(ENV_MIN_DF) {
            if let Ok(min_df) = value.parse() {
                self.vectorizer.min_df = min_df;
            }
        }

        if let Ok(value) = std::env::var(ENV_MAX_CONTEXT_ITEMS) {
            if let Ok(items) = value.parse() {
                self.router.max_context_items = items;
            }
        }

        self
    }

    /// Validate ranges that serde cannot express
    pub fn validate(&self) -> CoreResult<()> {
        let v = &self.vectorizer;
        if v.min_df == 0 {
            return Err(CoreError::Config("vectorizer.min_df must be >= 1".into()));
        }
        if !(v.max_df_ratio > 0.0 && v.max_df_ratio <= 1.0) {
            return Err(CoreError::Config(
                "vectorizer.max_df_ratio must be in (0, 1]".into(),
            ));
        }
        if v.ngram_max == 0 {
            return Err(CoreError::Config("vectorizer.ngram_max must be >= 1".into()));
        }

        let s = &self.similarity;
        if !(0.0..=1.0).contains(&s.type_fallback_similarity) || !(0.0..=1.0).contains(&s.edge_boost)
        {
            return Err(CoreError::Config(
                "similarity values must be in [0, 1]".into(),
            ));
        }

        if self.router.fuzzy_match_threshold <= 0.0 || self.router.fuzzy_match_threshold > 1.0 {
            return Err(CoreError::Config(
                "router.fuzzy_match_threshold must be in (0, 1]".into(),
            ));
        }

        // Clustering bounds are checked by the community builder
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MedgraphConfig::default();
        assert_eq!(config.clustering.target_count, Some(15));
        assert_eq!(config.clustering.linkage, Linkage::Average);
        assert_eq!(config.specialty.fallback_label, "General");
        assert_eq!(config.router.max_context_items, 5);
        assert!(!config.vectorizer.include_name);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config: MedgraphConfig = toml::from_str(
            r#"
            [clustering]
            target_count = 4
            linkage = "complete"

            [clustering.auto_select]
            candidate_counts = [2, 3]
            "#,
        )
        .unwrap();
        assert_eq!(config.clustering.target_count, Some(4));
        assert_eq!(config.clustering.linkage, Linkage::Complete);
        let auto = config.clustering.auto_select.unwrap();
        assert_eq!(auto.candidate_counts, vec![2, 3]);
        assert_eq!(auto.min_average_size, 5.0);
        assert_eq!(config.vectorizer.min_df, 1);
    }

    #[test]
    fn test_threshold_only_section_drops_default_count() {
        let config: MedgraphConfig =
            toml::from_str("[clustering]\ndistance_threshold = 1.0").unwrap();
        assert_eq!(config.clustering.target_count, None);
        assert_eq!(config.clustering.distance_threshold, Some(1.0));

        let config: MedgraphConfig = toml::from_str("[clustering]\nlinkage = \"single\"").unwrap();
        assert_eq!(config.clustering.target_count, Some(15));

        let config: MedgraphConfig = toml::from_str("").unwrap();
        assert_eq!(config.clustering, ClusteringConfig::default());
    }

    #[test]
    fn test_linkage_parse() {
        assert_eq!("Single".parse::<Linkage>().unwrap(), Linkage::Single);
        assert!("ward".parse::<Linkage>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = MedgraphConfig::default();
        config.vectorizer.max_df_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = MedgraphConfig::default();
        config.similarity.edge_boost = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENV_LINKAGE, "single");
        std::env::set_var(ENV_MAX_CONTEXT_ITEMS, "9");

        let config = MedgraphConfig::from_env();
        assert_eq!(config.clustering.linkage, Linkage::Single);
        assert_eq!(config.router.max_context_items, 9);

        std::env::remove_var(ENV_LINKAGE);
        std::env::remove_var(ENV_MAX_CONTEXT_ITEMS);

        // Kept in one test so the stopping-rule variables never race
        std::env::set_var(ENV_DISTANCE_THRESHOLD, "0.4");
        let config = MedgraphConfig::from_env();
        assert_eq!(config.clustering.target_count, None);
        assert_eq!(config.clustering.distance_threshold, Some(0.4));

        std::env::set_var(ENV_TARGET_COUNT, "3");
        let config = MedgraphConfig::from_env();
        assert_eq!(config.clustering.target_count, Some(3));
        assert_eq!(config.clustering.distance_threshold, Some(0.4));
        std::env::remove_var(ENV_DISTANCE_THRESHOLD);

        let mut base = MedgraphConfig::default();
        base.clustering.distance_threshold = Some(0.9);
        let config = base.merge_with_env();
        assert_eq!(config.clustering.target_count, Some(3));
        assert_eq!(config.clustering.distance_threshold, None);
        std::env::remove_var(ENV_TARGET_COUNT);
    }
}
