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

//! Query modules
//!
//! A module is the atomic unit of query growth: a named bundle of triple
//! patterns and filters added to the container in one step. Modules record
//! which variables they expect to find already bound (`required_vars`) and
//! which they introduce (`defined_vars`).

use crate::filter::FilterExpr;
use crate::pattern::{TriplePattern, VarRef};
use serde::{Deserialize, Serialize};

/// Where a module came from; collision handling differs per origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Produced by a template; variable collisions reuse the canonical
    /// name for the semantic label without consulting the oracle.
    Builder,
    /// Synthesized by the component-constraint orchestrator (or assembled
    /// ad hoc); collisions go through the decision oracle.
    ComponentConstraint,
}

/// Pattern scope. Only `Main` is supported by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleScope {
    Main,
    Optional,
}

/// An atomic bundle of graph patterns and filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: String,
    pub kind: ModuleKind,
    pub scope: ModuleScope,
    pub patterns: Vec<TriplePattern>,
    pub filters: Vec<FilterExpr>,
    /// Variables that must already exist in the container registry.
    #[serde(default)]
    pub required_vars: Vec<VarRef>,
    /// Variables this module introduces.
    #[serde(default)]
    pub defined_vars: Vec<VarRef>,
}

impl Module {
    pub fn new(id: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            id: id.into(),
            kind,
            scope: ModuleScope::Main,
            patterns: Vec::new(),
            filters: Vec::new(),
            required_vars: Vec::new(),
            defined_vars: Vec::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: Vec<TriplePattern>) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_filters(mut self, filters: Vec<FilterExpr>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_required(mut self, vars: Vec<VarRef>) -> Self {
        self.required_vars = vars;
        self
    }

    pub fn with_defined(mut self, vars: Vec<VarRef>) -> Self {
        self.defined_vars = vars;
        self
    }

    /// A module has to contribute something: patterns or filters.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty() && self.filters.is_empty()
    }

    /// Whether the caller left variable categorization to the container.
    pub fn needs_categorization(&self) -> bool {
        self.required_vars.is_empty() && self.defined_vars.is_empty()
    }

    /// Rename a variable everywhere: patterns, filters, and the
    /// required/defined listings.
    pub fn rename_variable(&mut self, old: &str, new: &str) {
        for p in &mut self.patterns {
            p.rename_variable(old, new);
        }
        for f in &mut self.filters {
            f.rename_variable(old, new);
        }
        for v in self.required_vars.iter_mut().chain(self.defined_vars.iter_mut()) {
            if v.name == old {
                v.name = new.to_string();
            }
        }
    }

    /// Every distinct variable mentioned by patterns or filters, keeping
    /// the first non-empty semantic label seen for each name.
    pub fn mentioned_variables(&self) -> Vec<VarRef> {
        let mut out: Vec<VarRef> = Vec::new();
        let mut push = |name: String, label: String| {
            if let Some(existing) = out.iter_mut().find(|v| v.name == name) {
                if existing.label.is_empty() && !label.is_empty() {
                    existing.label = label;
                }
            } else {
                out.push(VarRef { name, label });
            }
        };
        for p in &self.patterns {
            for v in p.variables() {
                push(v.name, v.label);
            }
        }
        for f in &self.filters {
            for name in f.variables() {
                push(name, String::new());
            }
        }
        out
    }
}
