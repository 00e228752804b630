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

//! Graphweave Query
//!
//! The incremental query-construction engine: a stateful container grown
//! module by module with transactional validation, a template/builder
//! layer that turns declarative template files into populated containers,
//! and an orchestrator that synthesizes triple chains linking a query
//! variable to a resolved component entity.

pub mod builder;
pub mod container;
pub mod endpoint;
pub mod orchestrator;
pub mod registry;
pub mod store;
pub mod template;

pub use builder::{FilterRequest, QueryBuilder};
pub use container::{ModuleContext, QueryContainer};
pub use endpoint::HttpExecutionPort;
pub use orchestrator::Orchestrator;
pub use registry::VariableRegistry;
pub use store::ContainerStore;
pub use template::{FilterKind, Template, TemplateCatalog, TemplateError, TemplateFilter};
