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

//! Component-constraint orchestrator
//!
//! Links an already-bound query variable to a named component entity the
//! query does not mention yet: resolve the component to a URI, find the
//! relation pointing into it by probing the live source for reverse arcs,
//! bridge the missing hops with the relation-graph path finder, and hand
//! the assembled chain to the container as one module.

use crate::container::{ModuleContext, QueryContainer};
use graphweave_core::{
    BuildError, DecisionOracle, EngineConfig, EntityKind, ExecutionPort, Module, ModuleKind,
    ResolutionPort, Result, Term, TriplePattern,
};
use graphweave_graph::{k_shortest_paths, RelationGraph};
use tracing::{debug, info};

/// Synthesizes component-constraint modules over a shared relation graph.
pub struct Orchestrator<'a> {
    pub graph: &'a RelationGraph,
    pub execution: &'a dyn ExecutionPort,
    pub resolution: &'a dyn ResolutionPort,
    pub oracle: &'a dyn DecisionOracle,
    pub config: &'a EngineConfig,
}

impl Orchestrator<'_> {
    /// Attaches `component_name` to `subject_var` through a chain of
    /// schema-level hops, optionally constraining the component quantity.
    /// No reverse arc or no bridging path is a hard error; nothing partial
    /// is ever committed.
    pub async fn attach_component(
        &self,
        container: &mut QueryContainer,
        subject_var: &str,
        component_name: &str,
        quantity: Option<i64>,
    ) -> Result<()> {
        let subject_type = container
            .registry()
            .label_of(subject_var)
            .filter(|label| !label.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| BuildError::PathSynthesisFailed {
                detail: format!("variable '?{subject_var}' has no known type"),
            })?;

        let component_uri = self.resolve_component(component_name).await?;
        let (attach_relation, host_example) = self.find_reverse_arc(&component_uri).await?;
        let host_type = self.type_of_instance(&host_example).await?;

        debug!(
            subject_type,
            host_type, attach_relation, "bridging component attachment"
        );
        let paths = k_shortest_paths(self.graph, &subject_type, &host_type, 1);
        let Some(path) = paths.into_iter().next() else {
            return Err(BuildError::PathSynthesisFailed {
                detail: format!("no path between '{subject_type}' and '{host_type}'"),
            });
        };

        // Chain the hops: subject -> intermediates -> host -> component.
        let mut patterns: Vec<TriplePattern> = Vec::new();
        let mut current = subject_var.to_owned();
        for hop in &path {
            let next = variable_name_for_class(&hop.target);
            patterns.push(TriplePattern::basic(
                Term::var_labeled(&current, hop.source.clone()),
                Term::uri(hop.relation.clone()),
                Term::var_labeled(&next, hop.target.clone()),
            ));
            current = next;
        }

        let component_var = variable_name_for_class(
            component_uri.rsplit(['/', '#']).next().unwrap_or("component"),
        );
        patterns.push(TriplePattern::basic(
            Term::var_labeled(&current, host_type.clone()),
            Term::uri(self.config.prefix_table.contract(&attach_relation)),
            Term::var(&component_var),
        ));
        patterns.push(TriplePattern::values(
            component_var.clone(),
            vec![component_uri.clone()],
        ));

        if let Some(n) = quantity {
            let relation = self.config.quantity_relation.as_ref().ok_or_else(|| {
                BuildError::PathSynthesisFailed {
                    detail: "a quantity was requested but no quantity relation is configured"
                        .to_owned(),
                }
            })?;
            patterns.push(TriplePattern::basic(
                Term::var_labeled(&current, host_type.clone()),
                Term::uri(relation.clone()),
                Term::literal_int(n),
            ));
        }

        let module = Module::new(
            format!("component-{}", slug(component_name)),
            ModuleKind::ComponentConstraint,
        )
        .with_patterns(patterns);

        let ctx = ModuleContext::new(self.execution, self.oracle, self.config);
        container.add_module(module, &ctx).await?;
        info!(component = component_name, uri = %component_uri, "component constraint attached");
        Ok(())
    }

    /// Resolves the component name; on several candidates the first one is
    /// taken (ambiguity here is arbitrated later by the dry run, which
    /// rejects a chain that matches nothing).
    async fn resolve_component(&self, name: &str) -> Result<String> {
        if name.starts_with("http://") || name.starts_with("https://") {
            return Ok(name.to_owned());
        }
        let candidates = self
            .resolution
            .resolve(name, EntityKind::Vocabulary)
            .await
            .map_err(|e| BuildError::ResolutionFailed {
                name: name.to_owned(),
                detail: e.to_string(),
            })?;
        match candidates.first() {
            Some(first) => {
                if candidates.len() > 1 {
                    debug!(
                        name,
                        candidates = candidates.len(),
                        chosen = %first.uri,
                        "ambiguous component resolution, using first candidate"
                    );
                }
                Ok(first.uri.clone())
            }
            None => Err(BuildError::ResolutionFailed {
                name: name.to_owned(),
                detail: "no candidate entities found".to_owned(),
            }),
        }
    }

    /// One predicate pointing into the component plus an example host.
    async fn find_reverse_arc(&self, component_uri: &str) -> Result<(String, String)> {
        let query = format!(
            "SELECT DISTINCT ?rel ?host WHERE {{ ?host ?rel <{component_uri}> }}"
        );
        let outcome = self
            .execution
            .execute(&query, 5, None)
            .await
            .map_err(|e| BuildError::PathSynthesisFailed {
                detail: format!("reverse-arc probe failed: {e}"),
            })?;
        outcome
            .rows
            .iter()
            .find_map(|row| {
                let rel = row.get("rel")?;
                let host = row.get("host")?;
                Some((rel.clone(), host.clone()))
            })
            .ok_or_else(|| BuildError::PathSynthesisFailed {
                detail: format!("no relation points into <{component_uri}>"),
            })
    }

    async fn type_of_instance(&self, instance_uri: &str) -> Result<String> {
        let query = format!("SELECT ?type WHERE {{ <{instance_uri}> a ?type }}");
        let outcome = self
            .execution
            .execute(&query, 1, None)
            .await
            .map_err(|e| BuildError::PathSynthesisFailed {
                detail: format!("type probe failed: {e}"),
            })?;
        outcome
            .rows
            .first()
            .and_then(|row| row.get("type"))
            .map(|t| self.config.prefix_table.contract(t))
            .ok_or_else(|| BuildError::PathSynthesisFailed {
                detail: format!("<{instance_uri}> has no type"),
            })
    }
}

/// Derives a variable name from a class URI: take the local name, strip a
/// leading ontology code such as `M7_` or `U30_`, and lowerCamel it.
/// `mus:M7_Casting_Detail` -> `castingDetail`.
pub fn variable_name_for_class(class: &str) -> String {
    let local = class
        .rsplit([':', '/', '#'])
        .next()
        .unwrap_or(class);
    let local = strip_code_prefix(local);
    let mut out = String::new();
    for (i, part) in local.split(['_', '-']).filter(|p| !p.is_empty()).enumerate() {
        let mut chars = part.chars();
        let Some(first) = chars.next() else { continue };
        if i == 0 {
            out.extend(first.to_lowercase());
        } else {
            out.extend(first.to_uppercase());
        }
        out.push_str(chars.as_str());
    }
    if out.is_empty() {
        "node".to_owned()
    } else {
        out
    }
}

fn strip_code_prefix(local: &str) -> &str {
    let Some((head, rest)) = local.split_once('_') else {
        return local;
    };
    let mut chars = head.chars();
    let leading_upper = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    let digits = chars.as_str();
    if leading_upper && !digits.is_empty() && digits.chars().all(|d| d.is_ascii_digit()) {
        rest
    } else {
        local
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}
