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

//! Entity Graph
//!
//! Flat, validated collection of entities and relationships. Entities keep
//! their input order, which every downstream stage relies on for
//! deterministic output. Traversal is index based:
//! - `id -> position` map for entity lookup
//! - `id -> relationship positions` (both directions) for 1-hop expansion

use crate::entities::{Entity, EntityType, Relationship};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// On-disk / wire shape of a graph export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(alias = "entities")]
    pub nodes: Vec<Entity>,
    #[serde(default, alias = "relationships")]
    pub edges: Vec<Relationship>,
}

/// Statistics about the entity graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total number of entities
    pub entity_count: usize,
    /// Total number of relationships (edges)
    pub relationship_count: usize,
    /// Entities with a non-blank context
    pub entities_with_context: usize,
    /// Average relationships per entity
    pub avg_degree: f64,
    /// Graph density (actual edges / possible edges)
    pub density: f64,
    /// Distribution of entity types
    pub entity_type_distribution: BTreeMap<EntityType, usize>,
    /// Distribution of relationship types
    pub relationship_type_distribution: BTreeMap<String, usize>,
}

/// Validated entity/relationship set
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    /// Entity id -> position in `entities`
    positions: HashMap<String, usize>,
    /// Entity id -> positions in `relationships` touching it
    incident: HashMap<String, Vec<usize>>,
}

impl EntityGraph {
    /// Build a graph, rejecting duplicate entity ids.
    ///
    /// Relationships referring to unknown entities are dropped with a warning.
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>) -> CoreResult<Self> {
        let mut positions = HashMap::with_capacity(entities.len());
        for (i, entity) in entities.iter().enumerate() {
            if positions.insert(entity.id.clone(), i).is_some() {
                return Err(CoreError::DuplicateEntity(entity.id.clone()));
            }
        }

        let total = relationships.len();
        let relationships: Vec<Relationship> = relationships
            .into_iter()
            .filter(|r| positions.contains_key(&r.source) && positions.contains_key(&r.target))
            .collect();
        if relationships.len() < total {
            tracing::warn!(
                dropped = total - relationships.len(),
                "Dropped relationships with unknown endpoints"
            );
        }

        let mut incident: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, rel) in relationships.iter().enumerate() {
            incident.entry(rel.source.clone()).or_default().push(i);
            if rel.target != rel.source {
                incident.entry(rel.target.clone()).or_default().push(i);
            }
        }

        Ok(Self {
            entities,
            relationships,
            positions,
            incident,
        })
    }

    /// Build from a parsed graph document
    pub fn from_document(doc: GraphDocument) -> CoreResult<Self> {
        Self::new(doc.nodes, doc.edges)
    }

    /// Load a graph document from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let file = File::open(path.as_ref())?;
        let doc: GraphDocument = serde_json::from_reader(BufReader::new(file))?;
        tracing::debug!(
            path = ?path.as_ref(),
            nodes = doc.nodes.len(),
            edges = doc.edges.len(),
            "Loaded graph document"
        );
        Self::from_document(doc)
    }

    /// Save the graph as a JSON document
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &self.to_document())?;
        writer.flush()?;
        Ok(())
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            nodes: self.entities.clone(),
            edges: self.relationships.clone(),
        }
    }

    /// Entities in input order
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get entity by ID
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.positions.get(id).map(|&i| &self.entities[i])
    }

    /// Input position of an entity
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Relationships touching an entity, in input order (1-hop expansion)
    pub fn relationships_of(&self, id: &str) -> Vec<&Relationship> {
        self.incident
            .get(id)
            .map(|idxs| idxs.iter().map(|&i| &self.relationships[i]).collect())
            .unwrap_or_default()
    }

    /// Get graph statistics
    pub fn stats(&self) -> GraphStats {
        let entity_count = self.entities.len();
        let relationship_count = self.relationships.len();

        let avg_degree = if entity_count > 0 {
            relationship_count as f64 / entity_count as f64
        } else {
            0.0
        };

        let density = if entity_count > 1 {
            relationship_count as f64 / (entity_count * (entity_count - 1)) as f64
        } else {
            0.0
        };

        let mut entity_type_distribution = BTreeMap::new();
        for entity in &self.entities {
            *entity_type_distribution.entry(entity.entity_type).or_default() += 1;
        }

        let mut relationship_type_distribution = BTreeMap::new();
        for rel in &self.relationships {
            *relationship_type_distribution
                .entry(rel.relation.to_string())
                .or_default() += 1;
        }

        GraphStats {
            entity_count,
            relationship_count,
            entities_with_context: self.entities.iter().filter(|e| e.has_context()).count(),
            avg_degree,
            density,
            entity_type_distribution,
            relationship_type_distribution,
        }
    }
}
