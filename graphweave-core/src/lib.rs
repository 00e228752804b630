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

//! Graphweave Core
//!
//! Data model and external-port contracts for the incremental
//! knowledge-graph query engine: terms, triple patterns, filter
//! expressions, modules, the error taxonomy, and the configuration
//! shared by every crate in the workspace.

pub mod config;
pub mod decision;
pub mod error;
pub mod filter;
pub mod module;
pub mod pattern;
pub mod ports;
pub mod select;
pub mod term;

pub use config::{EngineConfig, PrefixTable};
pub use decision::DecisionRecord;
pub use error::{BuildError, DryRunCause, Result};
pub use filter::FilterExpr;
pub use module::{Module, ModuleKind, ModuleScope};
pub use pattern::{Triple, TriplePattern, VarRef};
pub use ports::{
    parse_choice, Candidate, DecisionOracle, EntityKind, ExecutionError, ExecutionPort,
    OracleError, QueryOutcome, ResolutionError, ResolutionPort,
};
pub use select::{Aggregator, Comparison, HavingCondition, SelectItem};
pub use term::{Literal, Term};
