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

//! Query container
//!
//! The stateful heart of the engine: an incrementally-grown query made of
//! modules. Adding a module runs a fixed protocol of structural checks,
//! URI sanity probes, variable collision resolution, and a transactional
//! dry run against the live source; a failed dry run restores the state
//! taken before the module touched anything.

use crate::registry::VariableRegistry;
use graphweave_core::{
    parse_choice, Aggregator, BuildError, DecisionOracle, DecisionRecord, DryRunCause,
    EngineConfig, ExecutionError, ExecutionPort, FilterExpr, HavingCondition, Module, ModuleKind,
    ModuleScope, Result, SelectItem, Term, TriplePattern, VarRef,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// External collaborators and options for one `add_module` call.
pub struct ModuleContext<'a> {
    pub execution: &'a dyn ExecutionPort,
    pub oracle: &'a dyn DecisionOracle,
    pub config: &'a EngineConfig,
    /// When false, the dry-run validation is skipped.
    pub validate: bool,
}

impl<'a> ModuleContext<'a> {
    pub fn new(
        execution: &'a dyn ExecutionPort,
        oracle: &'a dyn DecisionOracle,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            execution,
            oracle,
            config,
            validate: true,
        }
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    fn dry_run_timeout(&self) -> Duration {
        Duration::from_secs(self.config.dry_run_timeout_secs)
    }
}

/// Pre-binding snapshot for rollback on a failed dry run.
#[derive(Debug, Clone)]
struct Snapshot {
    where_modules: Vec<Module>,
    filters: Vec<FilterExpr>,
    registry: VariableRegistry,
    select: Vec<SelectItem>,
}

/// Incrementally built query state for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryContainer {
    pub id: String,
    pub question: String,
    select: Vec<SelectItem>,
    where_modules: Vec<Module>,
    filters: Vec<FilterExpr>,
    group_by: Vec<VarRef>,
    having: Vec<HavingCondition>,
    order_by: Vec<VarRef>,
    registry: VariableRegistry,
    decision_log: Vec<DecisionRecord>,
}

impl QueryContainer {
    pub fn new(id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            select: Vec::new(),
            where_modules: Vec::new(),
            filters: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            registry: VariableRegistry::new(),
            decision_log: Vec::new(),
        }
    }

    pub fn registry(&self) -> &VariableRegistry {
        &self.registry
    }

    pub fn decision_log(&self) -> &[DecisionRecord] {
        &self.decision_log
    }

    /// Appends an oracle interaction to the audit log.
    pub fn record_decision(&mut self, record: DecisionRecord) {
        self.decision_log.push(record);
    }

    pub fn modules(&self) -> &[Module] {
        &self.where_modules
    }

    pub fn select_items(&self) -> &[SelectItem] {
        &self.select
    }

    pub fn set_group_by(&mut self, variables: Vec<VarRef>) {
        self.group_by = variables;
    }

    pub fn set_order_by(&mut self, variables: Vec<VarRef>) {
        self.order_by = variables;
    }

    pub fn add_having(&mut self, condition: HavingCondition) {
        self.having.push(condition);
    }

    /// Adds a variable to the SELECT list, or updates its aggregator in
    /// place when already listed. The variable must be registered.
    pub fn add_select(
        &mut self,
        name: &str,
        label: &str,
        aggregator: Option<Aggregator>,
    ) -> Result<()> {
        if !self.registry.contains(name) {
            return Err(BuildError::UnknownVariable(name.to_owned()));
        }
        if let Some(existing) = self.select.iter_mut().find(|item| item.name == name) {
            existing.aggregator = aggregator;
        } else {
            let mut item = SelectItem::new(name, label);
            item.aggregator = aggregator;
            self.select.push(item);
        }
        Ok(())
    }

    /// Adds a module through the full protocol: structural validation, URI
    /// sanity probes, variable binding, equivalent-URI expansion, commit,
    /// and (unless disabled) a transactional dry run.
    pub async fn add_module(&mut self, module: Module, ctx: &ModuleContext<'_>) -> Result<()> {
        let mut module = module;
        self.validate_structure(&module)?;
        self.check_uris(&mut module, ctx).await?;

        if module.needs_categorization() {
            self.auto_categorize(&mut module);
        }

        let snapshot = self.snapshot();
        let module_id = module.id.clone();

        let bind_result = self.bind_variables(&mut module, ctx).await;
        if let Err(e) = bind_result {
            self.restore(snapshot);
            return Err(e);
        }

        self.expand_values_uris(&mut module, ctx).await;

        for filter in module.filters.drain(..) {
            self.filters.push(filter);
        }
        if !module.patterns.is_empty() {
            self.where_modules.push(module);
        }

        if ctx.validate {
            if let Err(e) = self.dry_run(ctx).await {
                self.restore(snapshot);
                info!(module_id, "module reverted after failed dry run");
                return Err(match e {
                    BuildError::DryRunFailed { cause, .. } => {
                        BuildError::DryRunFailed { module_id, cause }
                    }
                    other => other,
                });
            }
        }
        info!(module_id, "module added");
        Ok(())
    }

    fn validate_structure(&self, module: &Module) -> Result<()> {
        if module.scope == ModuleScope::Optional {
            return Err(BuildError::UnsupportedScope(module.id.clone()));
        }
        if module.is_empty() {
            return Err(BuildError::InvalidModule {
                module_id: module.id.clone(),
                detail: "module carries neither patterns nor filters".to_owned(),
            });
        }
        for pattern in &module.patterns {
            if let TriplePattern::Basic(t) = pattern {
                if !t.is_well_formed() {
                    return Err(BuildError::InvalidModule {
                        module_id: module.id.clone(),
                        detail: format!("literal in subject or predicate position: {}", pattern.render()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Probes every entity-shaped URI against the live source and attaches
    /// human-readable labels where one can be fetched.
    async fn check_uris(&self, module: &mut Module, ctx: &ModuleContext<'_>) -> Result<()> {
        for pattern in &mut module.patterns {
            match pattern {
                TriplePattern::Basic(t) => {
                    for term in [&mut t.subject, &mut t.predicate, &mut t.object] {
                        if let Term::Uri {
                            value,
                            display_label,
                        } = term
                        {
                            if !ctx.config.looks_like_entity_uri(value) {
                                continue;
                            }
                            self.probe_uri(value, &module.id, ctx).await?;
                            if display_label.is_none() {
                                *display_label = self.fetch_label(value, ctx).await;
                            }
                        }
                    }
                }
                TriplePattern::Values { uris, .. } => {
                    for uri in uris.iter() {
                        if ctx.config.looks_like_entity_uri(uri) {
                            self.probe_uri(uri, &module.id, ctx).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn probe_uri(&self, uri: &str, module_id: &str, ctx: &ModuleContext<'_>) -> Result<()> {
        let probe = format!("SELECT ?p WHERE {{ <{uri}> ?p ?o }}");
        match ctx
            .execution
            .execute(&probe, 1, Some(ctx.dry_run_timeout()))
            .await
        {
            Ok(outcome) if outcome.count > 0 => Ok(()),
            Ok(_) => Err(BuildError::HallucinatedUri {
                uri: uri.to_owned(),
                module_id: module_id.to_owned(),
            }),
            Err(e) => Err(BuildError::DryRunFailed {
                module_id: module_id.to_owned(),
                cause: DryRunCause::Remote(format!("URI sanity probe failed: {e}")),
            }),
        }
    }

    async fn fetch_label(&self, uri: &str, ctx: &ModuleContext<'_>) -> Option<String> {
        let query = format!("SELECT ?label WHERE {{ <{uri}> rdfs:label ?label }}");
        match ctx
            .execution
            .execute(&query, 1, Some(ctx.dry_run_timeout()))
            .await
        {
            Ok(outcome) => outcome
                .rows
                .first()
                .and_then(|row| row.get("label"))
                .cloned(),
            Err(e) => {
                warn!(uri, error = %e, "could not fetch entity label");
                None
            }
        }
    }

    /// Splits the variables mentioned by the module into required (already
    /// registered) and defined (new).
    fn auto_categorize(&self, module: &mut Module) {
        let mut required = Vec::new();
        let mut defined = Vec::new();
        for var in module.mentioned_variables() {
            if self.registry.contains(&var.name) {
                let label = self
                    .registry
                    .label_of(&var.name)
                    .unwrap_or_default()
                    .to_owned();
                required.push(VarRef::new(var.name, label));
            } else {
                if var.label.is_empty() {
                    warn!(
                        variable = %var.name,
                        "variable defined without a semantic label; linking may miss it"
                    );
                }
                defined.push(var);
            }
        }
        module.required_vars = required;
        module.defined_vars = defined;
    }

    /// Collision resolution for the module's variables.
    ///
    /// Required variables are rewritten to the registry's canonical name
    /// for their label. Defined variables register directly when the name
    /// is free; a taken name is silently rewritten for builder modules and
    /// arbitrated by the decision oracle for ad-hoc ones.
    async fn bind_variables(&mut self, module: &mut Module, ctx: &ModuleContext<'_>) -> Result<()> {
        for req in module.required_vars.clone() {
            if !self.registry.contains(&req.name) {
                if let Some(canonical) = self.registry.name_for_label(&req.label) {
                    let canonical = canonical.to_owned();
                    debug!(from = %req.name, to = %canonical, "rewriting required variable");
                    module.rename_variable(&req.name, &canonical);
                }
            }
        }

        for def in module.defined_vars.clone() {
            if !self.registry.contains(&def.name) {
                self.registry.register(&def.name, &def.label);
                continue;
            }
            match module.kind {
                ModuleKind::Builder => self.reuse_or_alias(module, &def),
                ModuleKind::ComponentConstraint => {
                    self.arbitrate_collision(module, &def, ctx).await?;
                }
            }
        }
        Ok(())
    }

    /// Template-origin modules reuse the canonical alias for the label
    /// without consulting the oracle.
    fn reuse_or_alias(&mut self, module: &mut Module, def: &VarRef) {
        match self.registry.name_for_label(&def.label) {
            Some(canonical) => {
                let canonical = canonical.to_owned();
                if canonical != def.name {
                    module.rename_variable(&def.name, &canonical);
                }
                self.registry.bump_label(&def.label);
            }
            None => {
                // Same name, different (or missing) label: mint an alias.
                let base = VariableRegistry::base_name(&def.name).to_owned();
                let fresh = self.registry.next_free_name(&base);
                module.rename_variable(&def.name, &fresh);
                self.registry.register(&fresh, &def.label);
            }
        }
    }

    /// Oracle-mediated collision resolution for ad-hoc modules: enumerate
    /// the existing aliases for the label plus one rename option, let the
    /// oracle pick, and fall back to renaming when the reply is unusable.
    async fn arbitrate_collision(
        &mut self,
        module: &mut Module,
        def: &VarRef,
        ctx: &ModuleContext<'_>,
    ) -> Result<()> {
        let aliases = self.registry.aliases_for_label(&def.label);
        let count = self.registry.count_of(&def.name).unwrap_or(1);
        let base = VariableRegistry::base_name(&def.name).to_owned();
        let mut minted = format!("{base}_{count}");
        if self.registry.contains(&minted) {
            minted = self.registry.next_free_name(&base);
        }

        let mut option_lines: Vec<String> = aliases
            .iter()
            .enumerate()
            .map(|(i, alias)| format!("- Option {i}: reuse existing variable '?{alias}'"))
            .collect();
        option_lines.push(format!(
            "- Option {}: rename the new variable to '?{minted}'",
            aliases.len()
        ));

        let working_query = self.describe_with_pending(module, def);
        let user_prompt = format!(
            "Solve the naming conflict for '{name}' by deciding whether to reuse an \
             existing variable or rename the new one.\n\n\
             This is the current query structure, where:\n\
             - Lines starting with \"+\" belong to the new module being added.\n\
             - **bolded** variables already exist in the query.\n\
             - <<variable>> marks the conflicting variable in the new module.\n\n\
             The current query is asking about: '{question}'\n--\n{working_query}\n--\n\n\
             The options to put in place of '<<{name}>>' are:\n{options}\n\n\
             Answer with the index of the chosen option.",
            name = def.name,
            question = self.question,
            options = option_lines.join("\n"),
        );
        let system_prompt = "You are an expert query builder assisting in variable naming. \
                             You are given a query and a list of options to replace a variable. \
                             Return the index of the chosen option. Select a reuse option ONLY \
                             if the new variable stands for the same entity already in the \
                             query; pick the rename option when it is a distinct entity of the \
                             same class, used for example for comparison.";

        let started = Instant::now();
        let (reply, parsed) = match ctx.oracle.decide(system_prompt, &user_prompt).await {
            Ok(reply) => {
                let parsed = parse_choice(&reply);
                (reply, parsed)
            }
            Err(e) => {
                warn!(error = %e, variable = %def.name, "oracle unavailable, defaulting to rename");
                (format!("(oracle error: {e})"), None)
            }
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let chosen_index = match parsed {
            Some(i) if i < aliases.len() => i,
            _ => aliases.len(),
        };
        self.decision_log.push(DecisionRecord::new(
            system_prompt,
            user_prompt,
            reply,
            chosen_index,
            latency_ms,
            ctx.oracle.model_name(),
        ));

        if chosen_index < aliases.len() {
            let alias = aliases[chosen_index].clone();
            info!(variable = %def.name, reused = %alias, "oracle chose to reuse an alias");
            module.rename_variable(&def.name, &alias);
            self.registry.bump_label(&def.label);
        } else {
            info!(variable = %def.name, minted = %minted, "renaming conflicting variable");
            module.rename_variable(&def.name, &minted);
            self.registry.register(&minted, &def.label);
        }
        Ok(())
    }

    /// Expands each single-URI exact-match binding into its equivalents in
    /// other vocabularies, pruned to the preferred namespaces and capped.
    /// Best-effort: expansion failures keep the original URI.
    async fn expand_values_uris(&self, module: &mut Module, ctx: &ModuleContext<'_>) {
        for pattern in &mut module.patterns {
            let TriplePattern::Values { uris, .. } = pattern else {
                continue;
            };
            if uris.len() != 1 {
                continue;
            }
            let original = uris[0].clone();
            let full = ctx.config.prefix_table.expand(&original);
            let query = format!(
                "SELECT DISTINCT ?eq WHERE {{ {{ <{full}> skos:exactMatch ?eq }} \
                 UNION {{ ?eq skos:exactMatch <{full}> }} }}"
            );
            let expanded = match ctx
                .execution
                .execute(&query, 20, Some(ctx.dry_run_timeout()))
                .await
            {
                Ok(outcome) => outcome
                    .rows
                    .iter()
                    .filter_map(|row| row.get("eq"))
                    .cloned()
                    .collect::<Vec<_>>(),
                Err(e) => {
                    warn!(uri = %original, error = %e, "equivalent-URI expansion failed");
                    continue;
                }
            };
            *uris = prune_equivalents(&original, &expanded, ctx.config);
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            where_modules: self.where_modules.clone(),
            filters: self.filters.clone(),
            registry: self.registry.clone(),
            select: self.select.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.where_modules = snapshot.where_modules;
        self.filters = snapshot.filters;
        self.registry = snapshot.registry;
        self.select = snapshot.select;
    }

    /// Executes the rendered query with a result cap of 1. Empty WHERE,
    /// remote failure, and zero results all fail the run.
    async fn dry_run(&self, ctx: &ModuleContext<'_>) -> Result<()> {
        if self.where_modules.is_empty() {
            return Err(BuildError::DryRunFailed {
                module_id: self.id.clone(),
                cause: DryRunCause::EmptyWhere,
            });
        }
        let query = self.render();
        match ctx
            .execution
            .execute(&query, 1, Some(ctx.dry_run_timeout()))
            .await
        {
            Ok(outcome) if outcome.count > 0 => Ok(()),
            Ok(_) => Err(BuildError::DryRunFailed {
                module_id: self.id.clone(),
                cause: DryRunCause::ZeroResults,
            }),
            Err(ExecutionError::Timeout) => Err(BuildError::DryRunFailed {
                module_id: self.id.clone(),
                cause: DryRunCause::Remote("query timed out".to_owned()),
            }),
            Err(e) => Err(BuildError::DryRunFailed {
                module_id: self.id.clone(),
                cause: DryRunCause::Remote(e.to_string()),
            }),
        }
    }

    /// Occurrences of each variable across select, modifiers, filters, and
    /// triples; drives dead-code elimination.
    fn count_variable_usage(&self) -> HashMap<String, usize> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut bump = |name: &str| *counts.entry(name.to_owned()).or_insert(0) += 1;

        for item in &self.select {
            bump(&item.name);
        }
        for var in &self.group_by {
            bump(&var.name);
        }
        for var in &self.order_by {
            bump(&var.name);
        }
        for condition in &self.having {
            bump(&condition.variable);
        }
        for filter in &self.filters {
            for name in filter.variables() {
                bump(&name);
            }
        }
        for module in &self.where_modules {
            for pattern in &module.patterns {
                for var in pattern.variables() {
                    bump(&var.name);
                }
            }
        }
        counts
    }

    /// Compiles the state into executable query text, with dead-code
    /// elimination of unconstrained joins.
    pub fn render(&self) -> String {
        self.render_inner(true)
    }

    /// Like [`render`](Self::render) but keeps every triple; used for
    /// human/oracle-facing display of the full structure.
    pub fn render_display(&self) -> String {
        self.render_inner(false)
    }

    fn render_inner(&self, eliminate_dead: bool) -> String {
        let mut parts: Vec<String> = Vec::new();

        let has_aggregator = self.select.iter().any(|item| item.aggregator.is_some());
        let mut select_terms: Vec<String> = Vec::new();
        for item in &self.select {
            if !self.group_by.is_empty() || has_aggregator {
                let grouped = self.group_by.iter().any(|g| g.name == item.name);
                if grouped {
                    select_terms.push(format!("?{}", item.name));
                } else if let Some(agg) = item.aggregator {
                    if agg == Aggregator::Count {
                        select_terms
                            .push(format!("(COUNT(DISTINCT ?{0}) AS ?{0})", item.name));
                    } else {
                        select_terms.push(format!("({agg}(?{0}) AS ?{0})", item.name));
                    }
                } else {
                    // Ungrouped bare variable under grouping would multiply
                    // rows; sample one value instead.
                    select_terms.push(format!("(SAMPLE(?{0}) AS ?{0})", item.name));
                }
            } else if let Some(agg) = item.aggregator {
                if agg == Aggregator::Count {
                    select_terms.push(format!("(COUNT(DISTINCT ?{0}) AS ?{0})", item.name));
                } else {
                    select_terms.push(format!("({agg}(?{0}) AS ?{0})", item.name));
                }
            } else {
                select_terms.push(format!("?{}", item.name));
            }
        }
        if select_terms.is_empty() {
            select_terms.push("*".to_owned());
        }
        parts.push(format!("SELECT DISTINCT {}", select_terms.join(" ")));

        parts.push("WHERE {".to_owned());
        let counts = self.count_variable_usage();
        for module in &self.where_modules {
            parts.push(format!("  # Module: {}", module.id));
            for pattern in &module.patterns {
                if eliminate_dead {
                    if let TriplePattern::Basic(t) = pattern {
                        if let Some(name) = t.object.variable_name() {
                            if counts.get(name).copied().unwrap_or(0) <= 1 {
                                debug!(variable = name, "dead-code elimination skipped a triple");
                                continue;
                            }
                        }
                    }
                }
                let mut line = format!("  {}", pattern.render());
                let labels = display_labels(pattern);
                if !labels.is_empty() {
                    line.push_str(&format!(" # {}", labels.join(", ")));
                }
                parts.push(line);
            }
        }
        if !self.filters.is_empty() {
            let rendered: Vec<String> = self.filters.iter().map(FilterExpr::render).collect();
            parts.push(format!("  FILTER ({})", rendered.join(" && ")));
        }
        parts.push("}".to_owned());

        if !self.group_by.is_empty() {
            let vars: Vec<String> = self.group_by.iter().map(|v| format!("?{}", v.name)).collect();
            parts.push(format!("GROUP BY {}", vars.join(" ")));
        }
        if !self.having.is_empty() {
            let conditions: Vec<String> =
                self.having.iter().map(HavingCondition::render).collect();
            parts.push(format!("HAVING ({})", conditions.join(" && ")));
        }
        if !self.order_by.is_empty() {
            let vars: Vec<String> = self.order_by.iter().map(|v| format!("?{}", v.name)).collect();
            parts.push(format!("ORDER BY {}", vars.join(" ")));
        }
        parts.join("\n")
    }

    /// Human-readable diff of the current query plus a pending module,
    /// highlighting the conflicting variable for the oracle.
    pub fn describe_with_pending(&self, pending: &Module, conflict: &VarRef) -> String {
        let mut parts: Vec<String> = Vec::new();

        let select_terms: Vec<String> = self
            .select
            .iter()
            .map(|item| {
                let name = if item.name == conflict.name {
                    format!("**?{}**", item.name)
                } else {
                    format!("?{}", item.name)
                };
                match item.aggregator {
                    Some(agg) => format!("{agg}({name}) AS {name}"),
                    None => name,
                }
            })
            .collect();
        parts.push(format!("  SELECT DISTINCT {}", select_terms.join(", ")));
        parts.push("  WHERE {".to_owned());

        for module in &self.where_modules {
            parts.push(format!("    # Module: {}", module.id));
            for pattern in &module.patterns {
                parts.push(format!(
                    "      {}",
                    highlight_label(pattern, &conflict.label)
                ));
            }
        }

        parts.push("\n    + New Module:".to_owned());
        for pattern in &pending.patterns {
            parts.push(format!("    + {}", highlight_name(pattern, &conflict.name)));
        }
        if !pending.filters.is_empty() {
            parts.push("\n    + New Filters:".to_owned());
            for filter in &pending.filters {
                let mut marked = filter.clone();
                let target = format!("?{}", conflict.name);
                for arg in &mut marked.args {
                    if *arg == target {
                        *arg = format!("<<{target}>>");
                    }
                }
                parts.push(format!("    + FILTER {}", marked.render()));
            }
        }
        parts.push("  }".to_owned());
        parts.join("\n")
    }
}

/// Display labels attached to a pattern's URI terms, in position order.
fn display_labels(pattern: &TriplePattern) -> Vec<String> {
    let TriplePattern::Basic(t) = pattern else {
        return Vec::new();
    };
    [&t.subject, &t.predicate, &t.object]
        .into_iter()
        .filter_map(|term| match term {
            Term::Uri {
                display_label: Some(label),
                ..
            } => Some(label.clone()),
            _ => None,
        })
        .collect()
}

fn highlight_label(pattern: &TriplePattern, label: &str) -> String {
    let TriplePattern::Basic(t) = pattern else {
        return pattern.render();
    };
    let mark = |term: &Term| {
        let rendered = term.render();
        match term {
            Term::Variable { label: l, .. } if !label.is_empty() && l == label => {
                format!("**{rendered}**")
            }
            _ => rendered,
        }
    };
    format!("{} {} {} .", mark(&t.subject), mark(&t.predicate), mark(&t.object))
}

fn highlight_name(pattern: &TriplePattern, name: &str) -> String {
    match pattern {
        TriplePattern::Basic(t) => {
            let mark = |term: &Term| {
                let rendered = term.render();
                if term.variable_name() == Some(name) {
                    format!("<<{rendered}>>")
                } else {
                    rendered
                }
            };
            format!("{} {} {} .", mark(&t.subject), mark(&t.predicate), mark(&t.object))
        }
        TriplePattern::Values { variable, .. } if variable == name => {
            format!("<<{}>>", pattern.render())
        }
        other => other.render(),
    }
}

/// Dedups `[original, expanded...]`, keeps only preferred namespaces, and
/// caps the list; always at least the original survives.
fn prune_equivalents(original: &str, expanded: &[String], config: &EngineConfig) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut candidates: Vec<String> = Vec::new();
    for uri in std::iter::once(original).chain(expanded.iter().map(String::as_str)) {
        if seen.insert(uri.to_owned()) {
            candidates.push(uri.to_owned());
        }
    }
    let preferred: Vec<String> = candidates
        .iter()
        .filter(|uri| {
            config
                .preferred_expansion_prefixes
                .iter()
                .any(|prefix| uri.starts_with(prefix))
        })
        .cloned()
        .collect();
    let pruned = if preferred.is_empty() {
        vec![original.to_owned()]
    } else {
        preferred
            .into_iter()
            .take(config.max_values_expansion)
            .collect()
    };
    if pruned.len() != candidates.len() {
        info!(
            uri = original,
            from = candidates.len(),
            to = pruned.len(),
            "pruned equivalent-URI expansion"
        );
    }
    pruned
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphweave_core::Comparison;

    fn container_with_work() -> QueryContainer {
        let mut c = QueryContainer::new("q1", "works by a composer");
        c.registry
            .register("expression", "efrbroo:F22_Self-Contained_Expression");
        c.registry.register("title", "rdfs:label");
        c.where_modules.push(
            Module::new("base", ModuleKind::Builder).with_patterns(vec![
                TriplePattern::basic(
                    Term::var("expression"),
                    Term::uri("rdf:type"),
                    Term::uri("efrbroo:F22_Self-Contained_Expression"),
                ),
                TriplePattern::basic(
                    Term::var("expression"),
                    Term::uri("rdfs:label"),
                    Term::var("title"),
                ),
            ]),
        );
        c
    }

    #[test]
    fn add_select_requires_registered_variable() {
        let mut c = container_with_work();
        assert!(c.add_select("title", "rdfs:label", None).is_ok());
        assert!(matches!(
            c.add_select("ghost", "", None),
            Err(BuildError::UnknownVariable(_))
        ));
    }

    #[test]
    fn add_select_is_idempotent_and_updates_aggregator() {
        let mut c = container_with_work();
        c.add_select("title", "rdfs:label", None).unwrap();
        c.add_select("title", "rdfs:label", Some(Aggregator::Count))
            .unwrap();
        assert_eq!(c.select.len(), 1);
        assert_eq!(c.select[0].aggregator, Some(Aggregator::Count));
    }

    #[test]
    fn render_with_empty_select_emits_star() {
        let c = container_with_work();
        assert!(c.render().starts_with("SELECT DISTINCT *"));
    }

    #[test]
    fn dead_code_elimination_skips_single_use_object_variable() {
        let mut c = container_with_work();
        c.add_select("expression", "efrbroo:F22_Self-Contained_Expression", None)
            .unwrap();
        // ?title is only mentioned by its defining triple.
        let rendered = c.render();
        assert!(!rendered.contains("?title"));
        // Display rendering keeps it.
        assert!(c.render_display().contains("?title"));
    }

    #[test]
    fn selected_variable_survives_elimination() {
        let mut c = container_with_work();
        c.add_select("title", "rdfs:label", None).unwrap();
        assert!(c.render().contains("?expression rdfs:label ?title ."));
    }

    #[test]
    fn ungrouped_plain_variable_is_sampled_under_grouping() {
        let mut c = container_with_work();
        c.add_select("expression", "efrbroo:F22_Self-Contained_Expression", None)
            .unwrap();
        c.add_select("title", "rdfs:label", None).unwrap();
        c.set_group_by(vec![VarRef::unlabeled("expression")]);
        let rendered = c.render();
        assert!(rendered.contains("?expression (SAMPLE(?title) AS ?title)"));
        assert!(rendered.contains("GROUP BY ?expression"));
    }

    #[test]
    fn count_renders_distinct() {
        let mut c = container_with_work();
        c.add_select("expression", "", Some(Aggregator::Count)).unwrap();
        assert!(c
            .render()
            .contains("(COUNT(DISTINCT ?expression) AS ?expression)"));
    }

    #[test]
    fn having_and_order_by_render() {
        let mut c = container_with_work();
        c.add_select("title", "rdfs:label", None).unwrap();
        c.add_having(HavingCondition {
            aggregator: Aggregator::Count,
            variable: "title".to_owned(),
            operator: Comparison::Gte,
            value: 2,
            value_end: None,
        });
        c.set_order_by(vec![VarRef::unlabeled("title")]);
        let rendered = c.render();
        assert!(rendered.contains("HAVING (COUNT(?title) >= 2)"));
        assert!(rendered.ends_with("ORDER BY ?title"));
    }

    #[test]
    fn filters_are_and_joined() {
        let mut c = container_with_work();
        c.add_select("title", "rdfs:label", None).unwrap();
        c.filters.push(FilterExpr::regex_match("title", "sonata"));
        c.filters.push(FilterExpr::raw(vec![
            "?title".to_owned(),
            "!=".to_owned(),
            "\"\"".to_owned(),
        ]));
        let rendered = c.render();
        assert!(rendered
            .contains("FILTER (REGEX(?title, \"sonata\", \"i\") && ?title != \"\")"));
    }

    #[test]
    fn describe_with_pending_marks_conflict() {
        let c = container_with_work();
        let pending = Module::new("new", ModuleKind::ComponentConstraint).with_patterns(vec![
            TriplePattern::basic(
                Term::var("expression"),
                Term::uri("mus:U12_has_genre"),
                Term::var("expression"),
            ),
        ]);
        let described =
            c.describe_with_pending(&pending, &VarRef::new("expression", ""));
        assert!(described.contains("<<?expression>>"));
        assert!(described.contains("+ New Module:"));
    }
}
