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

//! Query routing
//!
//! A query that names an entity of the graph is answered locally, from the
//! best-matching entities and their 1-hop relationships. Any other query is
//! answered globally, from the best-matching communities.
//!
//! ## Example
//!
//! ```rust,ignore
//! let router = QueryRouter::new(RouterConfig::default());
//! let package = router.route("what treats liver disease", &store, &graph)?;
//! println!("{}", package.render());
//! ```

use crate::context::{
    ContextPackage, EntityMatch, MatchKind, MemberHighlight, QueryMode, RankedCommunity,
    RankedEntity, RelatedEntity,
};
use crate::error::{QueryError, QueryResult};
use medgraph_core::{EntityGraph, EntityType, RouterConfig};
use medgraph_index::{CommunityStore, SparseVector, Tokenizer};
use moka::sync::Cache;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Routes queries to local or global retrieval
pub struct QueryRouter {
    config: RouterConfig,
    tokenizer: Tokenizer,
    /// Query vectors keyed by (snapshot build time, normalised query)
    vector_cache: Option<Cache<(i64, String), SparseVector>>,
}

impl QueryRouter {
    pub fn new(config: RouterConfig) -> Self {
        let vector_cache = (config.cache_capacity > 0)
            .then(|| Cache::builder().max_capacity(config.cache_capacity).build());
        Self {
            config,
            tokenizer: Tokenizer::default(),
            vector_cache,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Entities whose names occur in the query, in graph order.
    ///
    /// A name matches as a case-insensitive substring when it has at least
    /// `min_name_length` characters, or when the share of its tokens found
    /// in the query reaches `fuzzy_match_threshold`.
    pub fn find_matches(&self, query: &str, graph: &EntityGraph) -> Vec<EntityMatch> {
        let query_lower = query.to_lowercase();
        let query_tokens: HashSet<String> = self.tokenizer.raw_tokens(&query_lower).into_iter().collect();

        let mut matches = Vec::new();
        for entity in graph.entities() {
            let name = entity.name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }

            if name.chars().count() >= self.config.min_name_length && query_lower.contains(&name) {
                matches.push(EntityMatch {
                    entity_id: entity.id.clone(),
                    name: entity.name.clone(),
                    kind: MatchKind::Substring,
                });
                continue;
            }

            let name_tokens = self.tokenizer.tokens(&name);
            if name_tokens.is_empty() {
                continue;
            }
            let present = name_tokens.iter().filter(|t| query_tokens.contains(*t)).count();
            let overlap = present as f64 / name_tokens.len() as f64;
            if present > 0 && overlap >= self.config.fuzzy_match_threshold {
                matches.push(EntityMatch {
                    entity_id: entity.id.clone(),
                    name: entity.name.clone(),
                    kind: MatchKind::TokenOverlap { overlap },
                });
            }
        }
        matches
    }

    /// Pick the retrieval mode: local when any entity name matches
    pub fn classify(&self, query: &str, graph: &EntityGraph) -> (QueryMode, Vec<EntityMatch>) {
        let matches = self.find_matches(query, graph);
        let mode = if matches.is_empty() {
            QueryMode::Global
        } else {
            QueryMode::Local
        };
        (mode, matches)
    }

    /// Route a query, choosing the mode from entity-name matches
    pub fn route(
        &self,
        query: &str,
        store: &CommunityStore,
        graph: &EntityGraph,
    ) -> QueryResult<ContextPackage> {
        self.route_inner(query, store, graph, None)
    }

    /// Route a query in a caller-chosen mode
    pub fn route_with_mode(
        &self,
        query: &str,
        mode: QueryMode,
        store: &CommunityStore,
        graph: &EntityGraph,
    ) -> QueryResult<ContextPackage> {
        self.route_inner(query, store, graph, Some(mode))
    }

    fn route_inner(
        &self,
        query: &str,
        store: &CommunityStore,
        graph: &EntityGraph,
        forced: Option<QueryMode>,
    ) -> QueryResult<ContextPackage> {
        if query.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let (detected, mut matches) = self.classify(query, graph);
        matches.truncate(self.config.max_context_items);
        let mode = forced.unwrap_or(detected);

        let vector = self.query_vector(query, store);
        if vector.is_zero() {
            return Err(QueryError::NoRelevantContext {
                query: query.to_string(),
            });
        }

        let (entities, communities) = match mode {
            QueryMode::Local => (self.rank_entities(&vector, store, graph), Vec::new()),
            QueryMode::Global => (Vec::new(), self.rank_communities(&vector, store, graph)),
        };

        tracing::debug!(
            mode = %mode,
            forced = forced.is_some(),
            matches = matches.len(),
            results = entities.len() + communities.len(),
            "Routed query"
        );

        Ok(ContextPackage {
            query: query.to_string(),
            mode,
            forced: forced.is_some(),
            matches,
            entities,
            communities,
        })
    }

    /// Vectorize the query against the snapshot vocabulary
    fn query_vector(&self, query: &str, store: &CommunityStore) -> SparseVector {
        let Some(cache) = &self.vector_cache else {
            return store.vectorize(query);
        };

        // Normalize query for cache key
        let key = (
            store.built_at().timestamp_micros(),
            query.trim().to_lowercase(),
        );
        if let Some(vector) = cache.get(&key) {
            return vector;
        }
        let vector = store.vectorize(query);
        cache.insert(key, vector.clone());
        vector
    }

    fn rank_entities(
        &self,
        query: &SparseVector,
        store: &CommunityStore,
        graph: &EntityGraph,
    ) -> Vec<RankedEntity> {
        let mut scored: Vec<(f64, &str)> = store
            .entities()
            .iter()
            .filter_map(|e| {
                let score = query.cosine(&e.vector);
                (score > 0.0).then_some((score, e.id.as_str()))
            })
            .collect();
        sort_ranked(&mut scored);
        scored.truncate(self.config.max_context_items);

        scored
            .into_iter()
            .filter_map(|(score, id)| {
                let indexed = store.entity(id)?;
                let community = store.community(indexed.community)?;
                let (name, entity_type, context) = match graph.get(id) {
                    Some(e) => (e.name.clone(), e.entity_type, e.context.clone()),
                    None => (id.to_string(), EntityType::Unknown, String::new()),
                };

                let relationships = graph
                    .relationships_of(id)
                    .into_iter()
                    .take(self.config.max_relationships_per_entity)
                    .filter_map(|rel| {
                        let other = rel.other_end(id)?;
                        Some(RelatedEntity {
                            entity_id: other.to_string(),
                            name: graph
                                .get(other)
                                .map(|e| e.name.clone())
                                .unwrap_or_else(|| other.to_string()),
                            relation: rel.relation,
                            outgoing: rel.source == id,
                            context: rel.context.clone(),
                        })
                    })
                    .collect();

                Some(RankedEntity {
                    entity_id: id.to_string(),
                    name,
                    entity_type,
                    score,
                    community: community.id,
                    specialty: community.specialty.clone(),
                    context,
                    relationships,
                })
            })
            .collect()
    }

    fn rank_communities(
        &self,
        query: &SparseVector,
        store: &CommunityStore,
        graph: &EntityGraph,
    ) -> Vec<RankedCommunity> {
        let mut scored: Vec<(f64, u32)> = store
            .communities()
            .iter()
            .filter_map(|c| {
                let score = store.aggregate(c.id).map_or(0.0, |agg| query.cosine(agg));
                (score > 0.0).then_some((score, c.id))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(self.config.max_context_items);

        scored
            .into_iter()
            .filter_map(|(score, id)| {
                let community = store.community(id)?;

                let mut members: Vec<(f64, &str)> = community
                    .members
                    .iter()
                    .filter_map(|m| {
                        let s = store.entity_vector(m).map_or(0.0, |v| query.cosine(v));
                        (s > 0.0).then_some((s, m.as_str()))
                    })
                    .collect();
                sort_ranked(&mut members);
                members.truncate(self.config.max_highlights);

                Some(RankedCommunity {
                    community: id,
                    score,
                    specialty: community.specialty.clone(),
                    theme: community.theme.clone(),
                    size: community.size,
                    title: community.title.clone(),
                    summary: community.summary.clone(),
                    highlights: members
                        .into_iter()
                        .map(|(s, m)| MemberHighlight {
                            entity_id: m.to_string(),
                            name: graph
                                .get(m)
                                .map(|e| e.name.clone())
                                .unwrap_or_else(|| m.to_string()),
                            score: s,
                        })
                        .collect(),
                })
            })
            .collect()
    }
}

/// Descending score, ties by ascending id
fn sort_ranked(scored: &mut [(f64, &str)]) {
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(b.1))
    });
}
