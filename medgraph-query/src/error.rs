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

//! Query routing errors

use thiserror::Error;

/// Errors from routing a query against a community snapshot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Query text is empty or whitespace
    #[error("Query is empty")]
    EmptyQuery,

    /// No indexed term of the query occurs in the snapshot
    #[error("No relevant context for query: {query}")]
    NoRelevantContext { query: String },
}

/// Result type for query routing
pub type QueryResult<T> = Result<T, QueryError>;
