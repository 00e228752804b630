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

//! Graphweave Graph
//!
//! The schema-level relation graph (node types connected by predicates)
//! and the k-shortest simple path search used to synthesize triple chains
//! between otherwise unrelated query variables.

pub mod graph;
pub mod paths;

pub use graph::{GraphError, RelationGraph};
pub use paths::{k_shortest_paths, SchemaEdge};
