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

//! Template instantiation
//!
//! Turns a template plus a set of requested filters into a populated
//! container. Each filter value goes through the resolution protocol:
//! URI-shaped values bind directly, a single candidate binds exactly,
//! no candidate falls back to a case-insensitive regex on the filter's
//! label variable, and several candidates are arbitrated by the decision
//! oracle with a "use regex instead" escape option.

use crate::container::{ModuleContext, QueryContainer};
use crate::template::{patterns_from_triples, Template, TemplateCatalog, TemplateFilter};
use graphweave_core::{
    parse_choice, BuildError, Candidate, DecisionOracle, DecisionRecord, EngineConfig,
    ExecutionPort, FilterExpr, Module, ModuleKind, ResolutionPort, Result, TriplePattern,
};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// One requested filter: the filter's template name and the user value.
#[derive(Debug, Clone)]
pub struct FilterRequest {
    pub name: String,
    pub value: String,
}

impl FilterRequest {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Builds containers from templates.
pub struct QueryBuilder<'a> {
    pub catalog: &'a TemplateCatalog,
    pub execution: &'a dyn ExecutionPort,
    pub resolution: &'a dyn ResolutionPort,
    pub oracle: &'a dyn DecisionOracle,
    pub config: &'a EngineConfig,
}

impl QueryBuilder<'_> {
    /// Instantiates a template into a fresh container: the core module
    /// first, then every requested filter, then the template's default
    /// SELECT variables.
    pub async fn build(
        &self,
        template_name: &str,
        question: &str,
        base_variable: Option<&str>,
        filters: &[FilterRequest],
    ) -> Result<QueryContainer> {
        let template = self.catalog.get(template_name).map_err(|e| {
            BuildError::InvalidModule {
                module_id: template_name.to_owned(),
                detail: e.to_string(),
            }
        })?;
        let base = base_variable.unwrap_or(&template.base_variable);

        let mut container = QueryContainer::new(Uuid::new_v4().to_string(), question);
        let ctx = ModuleContext::new(self.execution, self.oracle, self.config);

        let core_patterns = patterns_from_triples(
            &template.core_triples,
            &template.base_variable,
            base,
            &template.var_classes,
        )
        .map_err(|e| BuildError::InvalidModule {
            module_id: format!("{}-core", template.name),
            detail: e.to_string(),
        })?;
        let core = Module::new(format!("{}-core", template.name), ModuleKind::Builder)
            .with_patterns(core_patterns);
        container.add_module(core, &ctx).await?;

        for request in filters {
            self.apply_filter(&mut container, template, base, request, &ctx)
                .await?;
        }

        for select in &template.select_vars {
            let name = if select.name == template.base_variable {
                base.to_owned()
            } else if base != template.base_variable {
                format!("{}_{base}", select.name)
            } else {
                select.name.clone()
            };
            // Template SELECT entries may name variables eliminated or
            // renamed along the way; skip the unknown ones.
            let label = template
                .var_classes
                .get(&select.name)
                .cloned()
                .unwrap_or_default();
            if let Err(BuildError::UnknownVariable(v)) =
                container.add_select(&name, &label, select.aggregator)
            {
                warn!(variable = %v, "default select variable not registered, skipping");
            }
        }
        Ok(container)
    }

    /// Applies one filter: expands its triples into a module and binds the
    /// user value via resolution, regex fallback, or oracle arbitration.
    pub async fn apply_filter(
        &self,
        container: &mut QueryContainer,
        template: &Template,
        base: &str,
        request: &FilterRequest,
        ctx: &ModuleContext<'_>,
    ) -> Result<()> {
        let filter =
            template
                .filters
                .get(&request.name)
                .ok_or_else(|| BuildError::InvalidModule {
                    module_id: request.name.clone(),
                    detail: format!(
                        "template '{}' has no filter named '{}'",
                        template.name, request.name
                    ),
                })?;

        let suffix = if base != template.base_variable {
            format!("_{base}")
        } else {
            String::new()
        };
        let mut patterns = patterns_from_triples(
            &filter.triples,
            &template.base_variable,
            base,
            &template.var_classes,
        )
        .map_err(|e| BuildError::InvalidModule {
            module_id: request.name.clone(),
            detail: e.to_string(),
        })?;
        let mut filters: Vec<FilterExpr> = Vec::new();

        let values_var = filter.values_var.as_ref().map(|v| format!("{v}{suffix}"));
        let regex_var = filter.regex_var.as_ref().map(|v| format!("{v}{suffix}"));

        match self.bind_value(container, filter, &request.value).await? {
            Binding::Exact(uri) => {
                let variable = values_var.ok_or_else(|| BuildError::InvalidModule {
                    module_id: request.name.clone(),
                    detail: "filter has no values variable to bind a URI to".to_owned(),
                })?;
                patterns.push(TriplePattern::values(variable, vec![uri]));
            }
            Binding::Regex(pattern) => {
                let variable = regex_var.ok_or_else(|| BuildError::ResolutionFailed {
                    name: request.value.clone(),
                    detail: "no candidates and the filter has no regex variable".to_owned(),
                })?;
                filters.push(FilterExpr::regex_match(&variable, &pattern));
            }
        }

        let module = Module::new(
            format!("{}-{}", template.name, request.name),
            ModuleKind::Builder,
        )
        .with_patterns(patterns)
        .with_filters(filters);
        container.add_module(module, ctx).await
    }

    /// Resolution protocol for one filter value.
    async fn bind_value(
        &self,
        container: &mut QueryContainer,
        filter: &TemplateFilter,
        value: &str,
    ) -> Result<Binding> {
        // URI-shaped values skip resolution entirely.
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(Binding::Exact(value.to_owned()));
        }

        let candidates = match self
            .resolution
            .resolve(value, filter.kind.entity_kind())
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(value, error = %e, "resolution unavailable, falling back to regex");
                return Ok(Binding::Regex(value.to_owned()));
            }
        };

        match candidates.len() {
            0 => {
                info!(value, "no candidates found, using regex match");
                Ok(Binding::Regex(value.to_owned()))
            }
            1 => Ok(Binding::Exact(candidates[0].uri.clone())),
            _ => Ok(self.arbitrate(container, filter, value, &candidates).await),
        }
    }

    /// Several candidates: the oracle picks one, or the regex escape. An
    /// unusable reply takes the escape; a missing regex variable degrades
    /// to the first candidate.
    async fn arbitrate(
        &self,
        container: &mut QueryContainer,
        filter: &TemplateFilter,
        value: &str,
        candidates: &[Candidate],
    ) -> Binding {
        let mut option_lines: Vec<String> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("- Option {i}: {} ({}) <{}>", c.label, c.node_type, c.uri))
            .collect();
        option_lines.push(format!(
            "- Option {}: none of these; match by text instead",
            candidates.len()
        ));

        let system_prompt = "You are an expert in entity linking for a knowledge base. \
                             You are given a user-supplied name and a list of candidate \
                             entities. Return the index of the candidate that matches the \
                             name, or the last option if none does.";
        let user_prompt = format!(
            "The user asked about: '{question}'\n\
             The value to link for filter '{filter_name}' is: '{value}'\n\n\
             Candidates:\n{options}\n\nAnswer with the index of the chosen option.",
            question = container.question,
            filter_name = filter.name,
            options = option_lines.join("\n"),
        );

        let started = Instant::now();
        let (reply, parsed) = match self.oracle.decide(system_prompt, &user_prompt).await {
            Ok(reply) => {
                let parsed = parse_choice(&reply);
                (reply, parsed)
            }
            Err(e) => {
                warn!(error = %e, "oracle unavailable, using first candidate");
                (format!("(oracle error: {e})"), Some(0))
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let chosen_index = match parsed {
            Some(i) if i < candidates.len() => i,
            _ => candidates.len(),
        };
        container.record_decision(DecisionRecord::new(
            system_prompt,
            user_prompt,
            reply,
            chosen_index,
            latency_ms,
            self.oracle.model_name(),
        ));

        if chosen_index < candidates.len() {
            Binding::Exact(candidates[chosen_index].uri.clone())
        } else if filter.regex_var.is_some() {
            Binding::Regex(value.to_owned())
        } else {
            info!(value, "regex escape chosen but filter has no regex variable; using first candidate");
            Binding::Exact(candidates[0].uri.clone())
        }
    }
}

enum Binding {
    /// Bind via an exact-match clause on the filter's values variable.
    Exact(String),
    /// Case-insensitive regex on the filter's label variable.
    Regex(String),
}
