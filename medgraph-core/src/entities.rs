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

//! Entity and Relationship Types
//!
//! Records produced by the upstream extraction step. Both enums parse
//! leniently: labels outside the closed set fall back to `UNKNOWN` and
//! `RELATES` instead of rejecting the whole record.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A unique identifier for entities
pub type EntityId = String;

/// Entity types produced by medical extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    /// A diagnosis or finding (e.g. "cirrhosis")
    Condition,
    /// A drug (e.g. "lactulose")
    Medication,
    /// A lab measurement (e.g. "anion gap")
    LabValue,
    /// A procedure (e.g. "knee replacement")
    Procedure,
    /// A body part
    Anatomy,
    /// Unknown type
    Unknown,
}

impl EntityType {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().replace(|c: char| c == ' ' || c == '-', "_").as_str() {
            "CONDITION" | "DISEASE" | "DIAGNOSIS" | "SYMPTOM" => EntityType::Condition,
            "MEDICATION" | "DRUG" | "MEDICINE" => EntityType::Medication,
            "LAB_VALUE" | "LAB" | "LAB_RESULT" | "TEST" => EntityType::LabValue,
            "PROCEDURE" | "SURGERY" => EntityType::Procedure,
            "ANATOMY" | "BODY_PART" | "ORGAN" => EntityType::Anatomy,
            _ => EntityType::Unknown,
        }
    }

    /// Canonical upper-case label
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Condition => "CONDITION",
            EntityType::Medication => "MEDICATION",
            EntityType::LabValue => "LAB_VALUE",
            EntityType::Procedure => "PROCEDURE",
            EntityType::Anatomy => "ANATOMY",
            EntityType::Unknown => "UNKNOWN",
        }
    }

    /// Conditions and medications weigh more when breaking specialty ties
    pub fn is_primary(&self) -> bool {
        matches!(self, EntityType::Condition | EntityType::Medication)
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        EntityType::from_str(&s)
    }
}

impl From<EntityType> for String {
    fn from(t: EntityType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types between entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationType {
    /// A patient/anatomy has a condition
    HasCondition,
    /// A medication or procedure treats a condition
    Treats,
    /// A test shows a value or finding
    Shows,
    /// A medication is prescribed for something
    Prescribed,
    /// A finding is located in an anatomical structure
    LocatedIn,
    /// Generic relation
    Relates,
}

impl RelationType {
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_uppercase().replace(|c: char| c == ' ' || c == '-', "_").as_str() {
            "HAS_CONDITION" | "HAS" | "DIAGNOSED_WITH" => RelationType::HasCondition,
            "TREATS" | "TREATED_BY" | "MANAGES" => RelationType::Treats,
            "SHOWS" | "INDICATES" | "REVEALS" => RelationType::Shows,
            "PRESCRIBED" | "PRESCRIBED_FOR" => RelationType::Prescribed,
            "LOCATED_IN" | "IN" | "PART_OF" => RelationType::LocatedIn,
            _ => RelationType::Relates,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::HasCondition => "HAS_CONDITION",
            RelationType::Treats => "TREATS",
            RelationType::Shows => "SHOWS",
            RelationType::Prescribed => "PRESCRIBED",
            RelationType::LocatedIn => "LOCATED_IN",
            RelationType::Relates => "RELATES",
        }
    }
}

impl From<String> for RelationType {
    fn from(s: String) -> Self {
        RelationType::from_str(&s)
    }
}

impl From<RelationType> for String {
    fn from(t: RelationType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Entity type
    #[serde(rename = "type", alias = "entity_type")]
    pub entity_type: EntityType,
    /// Concatenated source sentences mentioning the entity
    #[serde(default, alias = "description", deserialize_with = "null_as_empty")]
    pub context: String,
}

impl Entity {
    /// Create an entity with no context
    pub fn new(id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            entity_type,
            context: String::new(),
        }
    }

    /// Set the textual context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn has_context(&self) -> bool {
        !self.context.trim().is_empty()
    }
}

/// A directed, typed relationship between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity ID
    pub source: EntityId,
    /// Target entity ID
    pub target: EntityId,
    /// Relationship type
    #[serde(rename = "type", alias = "relationship", alias = "relation")]
    pub relation: RelationType,
    /// Extraction confidence (0.0 - 1.0)
    #[serde(default, alias = "strength", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Sentence the relationship was extracted from
    #[serde(default, alias = "description", skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Relationship {
    /// Create a new relationship
    pub fn new(
        source: impl Into<String>,
        relation: RelationType,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
            confidence: None,
            context: None,
        }
    }

    /// Set the confidence score
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Set the context sentence
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// The endpoint on the other side of `id`, if `id` is an endpoint
    pub fn other_end(&self, id: &str) -> Option<&str> {
        if self.source == id {
            Some(&self.target)
        } else if self.target == id {
            Some(&self.source)
        } else {
            None
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!(EntityType::from_str("CONDITION"), EntityType::Condition);
        assert_eq!(EntityType::from_str("lab value"), EntityType::LabValue);
        assert_eq!(EntityType::from_str("Lab-Value"), EntityType::LabValue);
        assert_eq!(EntityType::from_str("spaceship"), EntityType::Unknown);
        assert!(EntityType::Medication.is_primary());
        assert!(!EntityType::Anatomy.is_primary());
    }

    #[test]
    fn test_relation_type_parsing() {
        assert_eq!(RelationType::from_str("TREATS"), RelationType::Treats);
        assert_eq!(RelationType::from_str("located in"), RelationType::LocatedIn);
        assert_eq!(RelationType::from_str("CAUSES"), RelationType::Relates);
    }

    #[test]
    fn test_entity_deserialize_aliases() {
        let json = r#"{"id": "e1", "name": "Lactulose", "type": "MEDICATION", "description": null}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.entity_type, EntityType::Medication);
        assert_eq!(entity.context, "");
        assert!(!entity.has_context());

        let json = r#"{"id": "e2", "name": "x", "type": "weird", "description": "liver"}"#;
        let entity: Entity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.entity_type, EntityType::Unknown);
        assert_eq!(entity.context, "liver");
    }

    #[test]
    fn test_relationship_deserialize_aliases() {
        let json = r#"{"source": "a", "target": "b", "relationship": "TREATS", "strength": 0.8}"#;
        let rel: Relationship = serde_json::from_str(json).unwrap();
        assert_eq!(rel.relation, RelationType::Treats);
        assert_eq!(rel.confidence, Some(0.8));

        let out = serde_json::to_value(&rel).unwrap();
        assert_eq!(out["type"], "TREATS");
        assert!(out.get("context").is_none());
    }

    #[test]
    fn test_relationship_other_end() {
        let rel = Relationship::new("a", RelationType::Treats, "b").with_confidence(1.7);
        assert_eq!(rel.confidence, Some(1.0));
        assert_eq!(rel.other_end("a"), Some("b"));
        assert_eq!(rel.other_end("b"), Some("a"));
        assert_eq!(rel.other_end("c"), None);
    }
}
