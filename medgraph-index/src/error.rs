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

//! Community build error types

use medgraph_core::CoreError;
use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that can occur while building or loading a community snapshot
#[derive(Debug, Error)]
pub enum IndexError {
    /// Fewer than two entities carry any usable text
    #[error("Insufficient data: {found} entities with usable context, need at least 2")]
    InsufficientData { found: usize },

    /// Clustering or vectorizer settings are out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A built or loaded snapshot breaks the partition invariants
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the core data model
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Serialization(e.to_string())
    }
}
