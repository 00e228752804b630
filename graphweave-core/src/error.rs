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

//! Engine error taxonomy

use thiserror::Error;

/// Result type for query-construction operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Why a dry run rejected a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DryRunCause {
    /// The rendered query has an empty WHERE body.
    EmptyWhere,
    /// Transport failure or remote rejection, with the underlying message.
    Remote(String),
    /// The query executed but matched nothing.
    ZeroResults,
}

impl std::fmt::Display for DryRunCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DryRunCause::EmptyWhere => f.write_str("WHERE clause is empty"),
            DryRunCause::Remote(msg) => write!(f, "remote execution error: {msg}"),
            DryRunCause::ZeroResults => f.write_str("query returned 0 results"),
        }
    }
}

/// Errors surfaced by the query container, builder layer, and orchestrator.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A referenced entity URI failed the knowledge-base sanity check.
    /// Fatal; the container state is untouched.
    #[error("hallucinated URI '{uri}' in module '{module_id}'")]
    HallucinatedUri { uri: String, module_id: String },

    /// The validation execution rejected the module; it has been rolled back.
    #[error("dry run failed for module '{module_id}': {cause}")]
    DryRunFailed {
        module_id: String,
        cause: DryRunCause,
    },

    /// The orchestrator could not synthesize a connecting chain.
    #[error("path synthesis failed: {detail}")]
    PathSynthesisFailed { detail: String },

    /// A selected or required variable is not in the registry.
    #[error("variable '{0}' not found in variable registry")]
    UnknownVariable(String),

    /// A module carried neither patterns nor filters, or a malformed triple.
    #[error("invalid module '{module_id}': {detail}")]
    InvalidModule { module_id: String, detail: String },

    /// Optional-scope modules are not supported by this engine.
    #[error("unsupported scope for module '{0}': optional modules are not implemented")]
    UnsupportedScope(String),

    /// Entity resolution produced nothing usable and no fallback applies.
    #[error("could not resolve '{name}' to a URI: {detail}")]
    ResolutionFailed { name: String, detail: String },
}
