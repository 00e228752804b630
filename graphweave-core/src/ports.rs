// Copyright 2025 Graphweave Contributors
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

//! External collaborator ports
//!
//! The engine never talks to the triple store, the entity index, or the
//! language model directly; it goes through these traits. Tests substitute
//! scripted stubs, production wires real adapters. All calls are blocking
//! round-trips with their own timeouts; retry policy belongs to the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Results of executing query text against the data source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub count: usize,
    pub rows: Vec<HashMap<String, String>>,
}

/// Typed failures from the execution port.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("query timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("query rejected by the remote endpoint: {0}")]
    Rejected(String),
}

/// Executes query text against the live data source.
///
/// Implementations must append a result cap to the query when it lacks one
/// and must honor the per-call timeout when given.
#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn execute(
        &self,
        query: &str,
        result_cap: usize,
        timeout: Option<Duration>,
    ) -> std::result::Result<QueryOutcome, ExecutionError>;
}

/// Entity kinds understood by the resolution port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Vocabulary,
    Place,
    Other,
}

/// A candidate URI for a resolved name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub uri: String,
    pub label: String,
    #[serde(default)]
    pub node_type: String,
}

#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("resolution transport error: {0}")]
    Transport(String),
}

/// Maps an entity name to candidate URIs in the knowledge base.
#[async_trait]
pub trait ResolutionPort: Send + Sync {
    async fn resolve(
        &self,
        name: &str,
        kind: EntityKind,
    ) -> std::result::Result<Vec<Candidate>, ResolutionError>;
}

#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("oracle transport error: {0}")]
    Transport(String),
}

/// An opaque chooser among enumerated alternatives, normally an LLM call.
///
/// The engine extracts the first integer token from the reply and treats
/// absence or a non-integer as the designated fallback index, so a decision
/// is always produced.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<String, OracleError>;

    /// Identity recorded in the decision log.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// First integer token anywhere in an oracle reply, if any.
pub fn parse_choice(reply: &str) -> Option<usize> {
    let mut digits = String::new();
    for ch in reply.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_choice_finds_first_integer() {
        assert_eq!(parse_choice("2"), Some(2));
        assert_eq!(parse_choice("Option 1 looks right"), Some(1));
        assert_eq!(parse_choice("the 3rd, not the 4th"), Some(3));
        assert_eq!(parse_choice("none of these"), None);
        assert_eq!(parse_choice(""), None);
    }
}
