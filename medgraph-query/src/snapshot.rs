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

//! Shared, swappable community snapshot
//!
//! Readers clone an `Arc<Snapshot>` and keep it for the whole query, so a
//! rebuild swapped in mid-query never changes what that query sees.

use crate::context::{ContextPackage, QueryMode};
use crate::error::QueryResult;
use crate::router::QueryRouter;
use medgraph_core::EntityGraph;
use medgraph_index::CommunityStore;
use parking_lot::RwLock;
use std::sync::Arc;

/// A community store paired with the graph it was built from
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    store: Arc<CommunityStore>,
    graph: Arc<EntityGraph>,
}

impl Snapshot {
    /// Swap counter value when this snapshot was installed (0 for the first)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn store(&self) -> &CommunityStore {
        &self.store
    }

    pub fn graph(&self) -> &EntityGraph {
        &self.graph
    }
}

/// Holder of the current snapshot
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotHandle {
    pub fn new(store: Arc<CommunityStore>, graph: Arc<EntityGraph>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                generation: 0,
                store,
                graph,
            })),
        }
    }

    /// The snapshot queries should use right now
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Install a rebuilt snapshot and return its generation.
    ///
    /// Snapshots already handed out stay valid and unchanged.
    pub fn swap(&self, store: Arc<CommunityStore>, graph: Arc<EntityGraph>) -> u64 {
        let mut current = self.current.write();
        let generation = current.generation + 1;
        *current = Arc::new(Snapshot {
            generation,
            store,
            graph,
        });
        tracing::info!(
            generation,
            communities = current.store.community_count(),
            "Swapped community snapshot"
        );
        generation
    }

    /// Route against the current snapshot
    pub fn route(&self, router: &QueryRouter, query: &str) -> QueryResult<ContextPackage> {
        let snapshot = self.current();
        router.route(query, snapshot.store(), snapshot.graph())
    }

    /// Route in a fixed mode against the current snapshot
    pub fn route_with_mode(
        &self,
        router: &QueryRouter,
        query: &str,
        mode: QueryMode,
    ) -> QueryResult<ContextPackage> {
        let snapshot = self.current();
        router.route_with_mode(query, mode, snapshot.store(), snapshot.graph())
    }
}
