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

//! Context packages handed to answer generation

use medgraph_core::{EntityId, EntityType, RelationType};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};
use std::str::FromStr;

/// Retrieval strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Rank individual entities
    Local,
    /// Rank whole communities
    Global,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryMode::Local => "local",
            QueryMode::Global => "global",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(QueryMode::Local),
            "global" => Ok(QueryMode::Global),
            other => Err(format!("unknown query mode '{}', expected local or global", other)),
        }
    }
}

/// How an entity name matched the query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    /// The whole name occurs in the query
    Substring,
    /// Share of the name's tokens found in the query
    TokenOverlap { overlap: f64 },
}

/// Entity named in the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity_id: EntityId,
    pub name: String,
    #[serde(flatten)]
    pub kind: MatchKind,
}

/// 1-hop relationship of a ranked entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_id: EntityId,
    pub name: String,
    pub relation: RelationType,
    /// True when the ranked entity is the relationship's source
    pub outgoing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Local-mode result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub entity_id: EntityId,
    pub name: String,
    pub entity_type: EntityType,
    pub score: f64,
    pub community: u32,
    pub specialty: String,
    pub context: String,
    pub relationships: Vec<RelatedEntity>,
}

/// Best-scoring member of a global-mode result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberHighlight {
    pub entity_id: EntityId,
    pub name: String,
    pub score: f64,
}

/// Global-mode result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCommunity {
    pub community: u32,
    pub score: f64,
    pub specialty: String,
    pub theme: Vec<String>,
    pub size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub highlights: Vec<MemberHighlight>,
}

/// Material selected for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPackage {
    pub query: String,
    pub mode: QueryMode,
    /// Set when the caller chose the mode
    pub forced: bool,
    pub matches: Vec<EntityMatch>,
    /// Ranked entities (local mode)
    pub entities: Vec<RankedEntity>,
    /// Ranked communities (global mode)
    pub communities: Vec<RankedCommunity>,
}

impl ContextPackage {
    /// Number of ranked items in the active mode
    pub fn len(&self) -> usize {
        match self.mode {
            QueryMode::Local => self.entities.len(),
            QueryMode::Global => self.communities.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of an entity in the local ranking
    pub fn entity_rank(&self, entity_id: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.entity_id == entity_id)
    }

    /// Plain-text rendering suitable as a prompt section
    pub fn render(&self) -> String {
        let mut out = String::new();
        match self.mode {
            QueryMode::Local => {
                let _ = writeln!(out, "Medical entity information:");
                for (i, entity) in self.entities.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "\n{}. {} ({}) score={:.3}",
                        i + 1,
                        entity.name,
                        entity.entity_type,
                        entity.score
                    );
                    if !entity.context.is_empty() {
                        let _ = writeln!(out, "   Context: {}", entity.context);
                    }
                    let _ = writeln!(
                        out,
                        "   Specialty: {} (community {})",
                        entity.specialty, entity.community
                    );
                    for rel in &entity.relationships {
                        let (from, to) = if rel.outgoing {
                            (entity.name.as_str(), rel.name.as_str())
                        } else {
                            (rel.name.as_str(), entity.name.as_str())
                        };
                        let _ = writeln!(out, "   - {} --[{}]--> {}", from, rel.relation, to);
                    }
                }
            }
            QueryMode::Global => {
                let _ = writeln!(out, "Medical community information:");
                for community in &self.communities {
                    let heading = community.title.as_deref().unwrap_or(&community.specialty);
                    let _ = writeln!(
                        out,
                        "\nCommunity {}: {} ({} entities) score={:.3}",
                        community.community, heading, community.size, community.score
                    );
                    if !community.theme.is_empty() {
                        let _ = writeln!(out, "   Theme: {}", community.theme.join(", "));
                    }
                    if let Some(summary) = &community.summary {
                        let _ = writeln!(out, "   Summary: {}", summary);
                    }
                    if !community.highlights.is_empty() {
                        let names: Vec<&str> =
                            community.highlights.iter().map(|h| h.name.as_str()).collect();
                        let _ = writeln!(out, "   Key entities: {}", names.join(", "));
                    }
                }
            }
        }
        out
    }
}
