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

//! Medgraph Core
//!
//! Shared data model for the community engine:
//! - **Entities & Relationships**: records produced by medical extraction
//! - **Entity Graph**: validated flat graph with index-based 1-hop lookups
//! - **Specialty Taxonomy**: specialty name -> keyword table
//! - **Configuration**: layered TOML / environment settings
//!
//! ```text
//!  graph.json ──▶ EntityGraph ──▶ medgraph-index (CommunityStore)
//!                     │                    │
//!                     └──────▶ medgraph-query (QueryRouter) ◀──┘
//! ```

pub mod config;
pub mod entities;
pub mod error;
pub mod graph;
pub mod taxonomy;

pub use config::{
    AutoSelectConfig, ClusteringConfig, Linkage, MedgraphConfig, RouterConfig, SimilarityConfig,
    SpecialtyConfig, VectorizerConfig,
};
pub use entities::{Entity, EntityId, EntityType, RelationType, Relationship};
pub use error::{CoreError, CoreResult};
pub use graph::{EntityGraph, GraphDocument, GraphStats};
pub use taxonomy::SpecialtyTaxonomy;
