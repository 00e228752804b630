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

//! Template files
//!
//! A template is a declarative `.rq` file: a `# Template:` header, a
//! SELECT clause whose first plain variable is the base variable, a core
//! triple block, and zero or more filter blocks introduced by
//! `# filter: "name":"values_var":"regex_var":"kind"` headers. Variables
//! without an explicit `a <Class>` triple are typed by asking the data
//! source for the declaring predicate's range or domain, falling back to
//! sampling an instance; unresolved variables are warnings, not errors.

use graphweave_core::{
    Aggregator, EngineConfig, EntityKind, ExecutionPort, Term, TriplePattern,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
    #[error("template validation error: {0}")]
    Validation(String),
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),
}

/// Entity kind named by a filter block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Artist,
    Vocabulary,
    Place,
    Others,
    Literal,
}

impl FilterKind {
    /// The resolution-port kind this filter resolves through.
    pub fn entity_kind(self) -> EntityKind {
        match self {
            FilterKind::Artist => EntityKind::Artist,
            FilterKind::Vocabulary => EntityKind::Vocabulary,
            FilterKind::Place => EntityKind::Place,
            FilterKind::Others | FilterKind::Literal => EntityKind::Other,
        }
    }
}

impl FromStr for FilterKind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artist" => Ok(FilterKind::Artist),
            "vocabulary" => Ok(FilterKind::Vocabulary),
            "place" => Ok(FilterKind::Place),
            "others" => Ok(FilterKind::Others),
            "literal" => Ok(FilterKind::Literal),
            other => Err(TemplateError::Validation(format!(
                "invalid entity kind '{other}' in filter header"
            ))),
        }
    }
}

/// One optional filter block of a template.
#[derive(Debug, Clone)]
pub struct TemplateFilter {
    pub name: String,
    /// Variable bound by an exact-match clause when resolution succeeds.
    pub values_var: Option<String>,
    /// Label variable used for the regex fallback.
    pub regex_var: Option<String>,
    pub kind: FilterKind,
    pub triples: Vec<String>,
}

/// A SELECT entry declared by the template.
#[derive(Debug, Clone)]
pub struct TemplateSelect {
    pub name: String,
    pub aggregator: Option<Aggregator>,
}

/// A parsed template definition.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub base_variable: String,
    pub base_class: String,
    pub core_triples: Vec<String>,
    pub filters: BTreeMap<String, TemplateFilter>,
    /// Variable name to class URI, filled by [`resolve_var_classes`](Self::resolve_var_classes).
    pub var_classes: BTreeMap<String, String>,
    pub select_vars: Vec<TemplateSelect>,
}

fn filter_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)":"([^"]*)":"([^"]*)":"([^"]*)""#).expect("static regex"))
}

fn select_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:(\w+)\(\s*\?(\w+)\s*\)\s+AS\s+\?(\w+))|(?:\?(\w+))")
            .expect("static regex")
    })
}

/// `# filter: "name":"values_var":"regex_var":"kind"` with empty fields
/// meaning absent; at least one of the two variables is required.
fn parse_filter_header(header: &str) -> Result<TemplateFilter, TemplateError> {
    let content = header.replace("# filter:", "");
    let caps = filter_header_regex()
        .captures(content.trim())
        .ok_or_else(|| TemplateError::Parse(format!("invalid filter header: {header}")))?;

    let name = caps[1].to_owned();
    let values_var = (!caps[2].is_empty()).then(|| caps[2].to_owned());
    let regex_var = (!caps[3].is_empty()).then(|| caps[3].to_owned());
    let kind: FilterKind = caps[4].parse()?;

    if values_var.is_none() && regex_var.is_none() {
        return Err(TemplateError::Validation(format!(
            "filter '{name}' must define at least one of values_var or regex_var"
        )));
    }
    Ok(TemplateFilter {
        name,
        values_var,
        regex_var,
        kind,
        triples: Vec::new(),
    })
}

/// Collects triple lines from a template section, joining continuations
/// until a terminating `.` and skipping comments and SELECT/WHERE scaffolding.
fn parse_triples(section: &str) -> Vec<String> {
    let mut triples = Vec::new();
    let mut current = String::new();
    for line in section.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let upper = line.to_ascii_uppercase();
        if upper.starts_with("SELECT ") || upper.starts_with("WHERE") || line == "}" {
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(line);
        if line.ends_with('.') {
            triples.push(std::mem::take(&mut current));
        }
    }
    triples
}

/// The class named by the first `?var a <Class>` core triple.
fn extract_base_class(triples: &[String]) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\?\w+\s+a\s+(\S+)").expect("static regex"));
    triples.iter().find_map(|t| {
        re.captures(t)
            .map(|caps| caps[1].trim_end_matches(['.', ' ']).to_owned())
    })
}

/// Splits a raw triple line into subject/predicate/object tokens, keeping
/// `<...>` URIs intact.
fn split_triple(line: &str) -> Result<(String, String, String), TemplateError> {
    let line = line.trim().trim_end_matches('.').trim();
    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_uri = false;
    for ch in line.chars() {
        match ch {
            '<' => in_uri = true,
            '>' => in_uri = false,
            _ => {}
        }
        if ch == ' ' && !in_uri {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    if parts.len() < 3 {
        return Err(TemplateError::Parse(format!("invalid triple: {line}")));
    }
    let object = parts[2..].join(" ");
    Ok((parts[0].clone(), parts[1].clone(), object))
}

fn parse_term(token: &str, labels: &BTreeMap<String, String>) -> Term {
    let token = token.trim();
    if let Some(name) = token.strip_prefix('?') {
        let label = labels.get(name).cloned().unwrap_or_default();
        return Term::var_labeled(name, label);
    }
    if token == "a" {
        return Term::uri("a");
    }
    if token.starts_with('<') && token.ends_with('>') {
        return Term::uri(&token[1..token.len() - 1]);
    }
    if let Some(stripped) = token.strip_prefix('"') {
        return Term::literal_str(stripped.trim_end_matches('"'));
    }
    if let Ok(n) = token.parse::<i64>() {
        return Term::literal_int(n);
    }
    Term::uri(token)
}

/// Converts raw triple lines into patterns, renaming the template's base
/// variable and suffixing every other variable so two instances of the
/// same template never collide.
pub fn patterns_from_triples(
    triples: &[String],
    base_variable: &str,
    new_base_variable: &str,
    var_classes: &BTreeMap<String, String>,
) -> Result<Vec<TriplePattern>, TemplateError> {
    let suffix = if new_base_variable != base_variable {
        format!("_{new_base_variable}")
    } else {
        String::new()
    };
    let mut patterns = Vec::new();
    for line in triples {
        if line.trim().is_empty() {
            continue;
        }
        let (s, p, o) = split_triple(line)?;
        let mut triple_terms = Vec::with_capacity(3);
        for token in [&s, &p, &o] {
            let mut term = parse_term(token, var_classes);
            if let Term::Variable { name, .. } = &mut term {
                if name == base_variable {
                    *name = new_base_variable.to_owned();
                } else if !suffix.is_empty() {
                    name.push_str(&suffix);
                }
            }
            triple_terms.push(term);
        }
        let o_term = triple_terms.pop().expect("three terms");
        let p_term = triple_terms.pop().expect("three terms");
        let s_term = triple_terms.pop().expect("three terms");
        patterns.push(TriplePattern::basic(s_term, p_term, o_term));
    }
    Ok(patterns)
}

impl Template {
    /// Parses the textual template format. `fallback_name` is used when no
    /// `# Template:` header is present (typically the file stem).
    pub fn parse(content: &str, fallback_name: &str) -> Result<Self, TemplateError> {
        static NAME_RE: OnceLock<Regex> = OnceLock::new();
        static SELECT_RE: OnceLock<Regex> = OnceLock::new();
        static SECTION_RE: OnceLock<Regex> = OnceLock::new();
        let name_re =
            NAME_RE.get_or_init(|| Regex::new(r"# Template: (.+)").expect("static regex"));
        let select_re = SELECT_RE.get_or_init(|| {
            Regex::new(r"(?is)SELECT DISTINCT(.*?)WHERE").expect("static regex")
        });
        let section_re =
            SECTION_RE.get_or_init(|| Regex::new(r#"(?m)^# filter: .*$"#).expect("static regex"));

        let name = name_re
            .captures(content)
            .map(|caps| caps[1].trim().to_owned())
            .unwrap_or_else(|| fallback_name.to_owned());

        let select_content = select_re
            .captures(content)
            .map(|caps| caps[1].replace('\n', " "))
            .ok_or_else(|| {
                TemplateError::Parse(format!("no SELECT DISTINCT clause in template '{name}'"))
            })?;

        let mut select_vars: Vec<TemplateSelect> = Vec::new();
        let mut base_variable: Option<String> = None;
        for caps in select_token_regex().captures_iter(&select_content) {
            if let Some(simple) = caps.get(4) {
                let simple = simple.as_str().to_owned();
                if base_variable.is_none() {
                    base_variable = Some(simple.clone());
                }
                select_vars.push(TemplateSelect {
                    name: simple,
                    aggregator: None,
                });
            } else if let (Some(agg), Some(_inner), Some(alias)) =
                (caps.get(1), caps.get(2), caps.get(3))
            {
                // The alias becomes the variable name; the aggregator is
                // re-applied at selection time.
                let aggregator = agg
                    .as_str()
                    .parse::<Aggregator>()
                    .map_err(TemplateError::Parse)?;
                let alias = alias.as_str().to_owned();
                if base_variable.is_none() {
                    base_variable = Some(alias.clone());
                }
                select_vars.push(TemplateSelect {
                    name: alias,
                    aggregator: Some(aggregator),
                });
            }
        }
        if select_vars.is_empty() {
            return Err(TemplateError::Parse(format!(
                "no variables in SELECT clause of template '{name}'"
            )));
        }
        let base_variable = base_variable.expect("at least one select variable");

        // Core triples come before the first filter header.
        let mut boundaries: Vec<(usize, usize)> = section_re
            .find_iter(content)
            .map(|m| (m.start(), m.end()))
            .collect();
        boundaries.push((content.len(), content.len()));

        let core_section = &content[..boundaries[0].0];
        let core_triples = parse_triples(core_section);
        let base_class = extract_base_class(&core_triples).ok_or_else(|| {
            TemplateError::Parse(format!("no base class in core triples of template '{name}'"))
        })?;

        let mut filters = BTreeMap::new();
        for window in boundaries.windows(2) {
            let (header_start, header_end) = window[0];
            if header_start == content.len() {
                break;
            }
            let header = &content[header_start..header_end];
            let body = &content[header_end..window[1].0];
            let mut filter = parse_filter_header(header)?;
            filter.triples = parse_triples(body);
            filters.insert(filter.name.clone(), filter);
        }

        let mut template = Template {
            name,
            base_variable,
            base_class: base_class.clone(),
            core_triples,
            filters,
            var_classes: BTreeMap::new(),
            select_vars,
        };
        template.seed_var_classes();
        Ok(template)
    }

    fn all_triples(&self) -> Vec<&String> {
        self.core_triples
            .iter()
            .chain(self.filters.values().flat_map(|f| f.triples.iter()))
            .collect()
    }

    /// Fills `var_classes` from explicit `a <Class>` triples.
    fn seed_var_classes(&mut self) {
        let lines: Vec<String> = self.all_triples().into_iter().cloned().collect();
        for line in &lines {
            let Ok((s, p, o)) = split_triple(line) else {
                continue;
            };
            if p == "a" || p == "rdf:type" {
                if let Some(name) = s.strip_prefix('?') {
                    let class = o.trim_start_matches('<').trim_end_matches('>').to_owned();
                    self.var_classes.insert(name.to_owned(), class);
                }
            }
        }
    }

    /// Types the remaining variables by querying the data source: the
    /// declaring predicate's `rdfs:range` (variable in object position) or
    /// `rdfs:domain` (subject position) first, then sampling one instance.
    /// Unresolved variables are logged and left untyped.
    pub async fn resolve_var_classes(
        &mut self,
        execution: &dyn ExecutionPort,
        config: &EngineConfig,
    ) {
        let mut range_predicates: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut domain_predicates: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut all_vars: BTreeSet<String> = BTreeSet::new();

        for line in self.all_triples() {
            let Ok((s, p, o)) = split_triple(line) else {
                continue;
            };
            if let Some(name) = s.strip_prefix('?') {
                all_vars.insert(name.to_owned());
                if p != "a" && p != "rdf:type" {
                    domain_predicates
                        .entry(name.to_owned())
                        .or_default()
                        .push(p.clone());
                }
            }
            if let Some(name) = o.strip_prefix('?') {
                all_vars.insert(name.to_owned());
                if p != "a" && p != "rdf:type" {
                    range_predicates
                        .entry(name.to_owned())
                        .or_default()
                        .push(p.clone());
                }
            }
        }

        for var in all_vars {
            if self.var_classes.contains_key(&var) {
                continue;
            }
            let mut resolved = None;
            for predicate in range_predicates.get(&var).into_iter().flatten() {
                if let Some(class) =
                    resolve_predicate_class(execution, config, predicate, Position::Object).await
                {
                    resolved = Some(class);
                    break;
                }
            }
            if resolved.is_none() {
                for predicate in domain_predicates.get(&var).into_iter().flatten() {
                    if let Some(class) =
                        resolve_predicate_class(execution, config, predicate, Position::Subject)
                            .await
                    {
                        resolved = Some(class);
                        break;
                    }
                }
            }
            match resolved {
                Some(class) => {
                    debug!(template = %self.name, variable = %var, class = %class, "resolved variable class");
                    self.var_classes.insert(var, class);
                }
                None => warn!(
                    template = %self.name,
                    variable = %var,
                    "could not resolve a class for template variable"
                ),
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Position {
    Subject,
    Object,
}

async fn resolve_predicate_class(
    execution: &dyn ExecutionPort,
    config: &EngineConfig,
    predicate: &str,
    position: Position,
) -> Option<String> {
    let schema_query = match position {
        Position::Object => {
            format!("SELECT DISTINCT ?class WHERE {{ {predicate} rdfs:range ?class . }}")
        }
        Position::Subject => {
            format!("SELECT DISTINCT ?class WHERE {{ {predicate} rdfs:domain ?class . }}")
        }
    };
    let sample_query = match position {
        Position::Object => format!(
            "SELECT DISTINCT ?class WHERE {{ ?instance a ?class . ?subject {predicate} ?instance . }} ORDER BY ?class"
        ),
        Position::Subject => format!(
            "SELECT DISTINCT ?class WHERE {{ ?instance {predicate} ?object . ?instance a ?class . }} ORDER BY ?class"
        ),
    };
    for query in [schema_query, sample_query] {
        if let Ok(outcome) = execution.execute(&query, 1, None).await {
            if let Some(class) = outcome.rows.first().and_then(|row| row.get("class")) {
                return Some(config.prefix_table.contract(class));
            }
        }
    }
    None
}

const BUILTIN_WORKS: &str = include_str!("../templates/works.rq");

/// All loaded templates, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Template>,
}

impl TemplateCatalog {
    /// Catalog holding only the built-in works template.
    pub fn builtin() -> Result<Self, TemplateError> {
        let mut catalog = Self::default();
        let template = Template::parse(BUILTIN_WORKS, "works")?;
        catalog.templates.insert(template.name.clone(), template);
        Ok(catalog)
    }

    /// Loads every `.rq` file in a directory; files that fail to parse are
    /// skipped with an error log.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let mut catalog = Self::default();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "rq") != Some(true) {
                continue;
            }
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = std::fs::read_to_string(&path)?;
            match Template::parse(&content, &stem) {
                Ok(template) => {
                    info!(
                        template = %template.name,
                        filters = template.filters.len(),
                        "loaded template"
                    );
                    catalog.templates.insert(template.name.clone(), template);
                }
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "failed to load template");
                }
            }
        }
        Ok(catalog)
    }

    /// Resolves variable classes for every template against the source.
    pub async fn resolve_all(&mut self, execution: &dyn ExecutionPort, config: &EngineConfig) {
        for template in self.templates.values_mut() {
            template.resolve_var_classes(execution, config).await;
        }
    }

    /// Case-insensitive lookup; a trailing `.rq` is tolerated.
    pub fn get(&self, name: &str) -> Result<&Template, TemplateError> {
        let name = name.strip_suffix(".rq").unwrap_or(name);
        if let Some(template) = self.templates.get(name) {
            return Ok(template);
        }
        self.templates
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| TemplateError::NotFound(name.to_owned()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }
}
