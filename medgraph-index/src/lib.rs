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

//! Medgraph Index Layer
//!
//! Groups the entities of a medical knowledge graph into communities and
//! stores the result as an immutable snapshot.
//!
//! ## Stages
//!
//! - **Vectorizer** (`vectorizer`, `tokenizer`): TF-IDF over entity contexts
//!   with a smoothed idf and L2-normalised sparse vectors
//! - **Similarity** (`similarity`): dense cosine matrix, computed in parallel
//! - **Clustering** (`clustering`): agglomerative clustering with average,
//!   complete or single linkage; the full dendrogram is kept so it can be cut
//!   at several community counts
//! - **Quality** (`quality`): silhouette score and candidate-count selection
//! - **Specialty** (`specialty`): keyword taxonomy labels and themes
//! - **Store** (`store`): the serializable `CommunityStore` snapshot
//!
//! `CommunityPipeline` runs all stages in order.
//!
//! ## Determinism
//!
//! Identical input and configuration yield identical assignments. Every tie
//! (merge order, specialty choice, theme terms) is broken by a fixed rule.

pub mod clustering;
pub mod error;
pub mod pipeline;
pub mod quality;
pub mod similarity;
pub mod specialty;
pub mod store;
pub mod tokenizer;
pub mod vectorizer;

pub use clustering::{CommunityBuilder, CutCriterion, Dendrogram, Merge, Partition};
pub use error::{IndexError, IndexResult};
pub use pipeline::CommunityPipeline;
pub use quality::{auto_select, silhouette_score, Selection};
pub use similarity::SimilarityMatrix;
pub use specialty::{SpecialtyAssignment, SpecialtyClassifier, SpecialtyScore};
pub use store::{
    load_summaries, write_json_atomic, Community, CommunityStore, CommunitySummary, CutSummary,
    IndexedEntity, StatsDocument, SummaryRecord,
};
pub use tokenizer::Tokenizer;
pub use vectorizer::{document_text, SparseVector, TextVectorizer, Vocabulary};
