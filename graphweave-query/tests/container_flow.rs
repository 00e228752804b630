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

//! End-to-end flows over the container, builder, and orchestrator with
//! scripted stand-ins for the external ports.

use async_trait::async_trait;
use graphweave_core::{
    BuildError, Candidate, DecisionOracle, DryRunCause, EngineConfig, EntityKind, ExecutionError,
    ExecutionPort, Module, ModuleKind, OracleError, QueryOutcome, ResolutionError, ResolutionPort,
    Term, TriplePattern, VarRef,
};
use graphweave_graph::RelationGraph;
use graphweave_query::{
    FilterRequest, ModuleContext, Orchestrator, QueryBuilder, QueryContainer, TemplateCatalog,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Execution stub: responds per substring marker, empty-match queries get
/// a single generic row.
#[derive(Default)]
struct ScriptedExecution {
    /// `(marker, outcome)` pairs tried in order against the query text.
    scripts: Vec<(String, QueryOutcome)>,
    /// Queries containing one of these markers report zero results.
    zero_markers: Vec<String>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecution {
    fn passing() -> Self {
        Self::default()
    }

    fn with_script(mut self, marker: &str, rows: Vec<HashMap<String, String>>) -> Self {
        self.scripts.push((
            marker.to_owned(),
            QueryOutcome {
                count: rows.len(),
                rows,
            },
        ));
        self
    }

    fn failing_on(mut self, marker: &str) -> Self {
        self.zero_markers.push(marker.to_owned());
        self
    }
}

fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl ExecutionPort for ScriptedExecution {
    async fn execute(
        &self,
        query: &str,
        _result_cap: usize,
        _timeout: Option<Duration>,
    ) -> Result<QueryOutcome, ExecutionError> {
        self.executed.lock().push(query.to_owned());
        if self.zero_markers.iter().any(|m| query.contains(m)) {
            return Ok(QueryOutcome::default());
        }
        for (marker, outcome) in &self.scripts {
            if query.contains(marker) {
                return Ok(outcome.clone());
            }
        }
        Ok(QueryOutcome {
            count: 1,
            rows: vec![HashMap::new()],
        })
    }
}

struct ScriptedOracle {
    reply: String,
    calls: Mutex<usize>,
}

impl ScriptedOracle {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_owned(),
            calls: Mutex::new(0),
        }
    }

    fn call_count(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, OracleError> {
        *self.calls.lock() += 1;
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedResolution {
    candidates: Vec<Candidate>,
}

#[async_trait]
impl ResolutionPort for ScriptedResolution {
    async fn resolve(
        &self,
        _name: &str,
        _kind: EntityKind,
    ) -> Result<Vec<Candidate>, ResolutionError> {
        Ok(self.candidates.clone())
    }
}

fn candidate(uri: &str, label: &str) -> Candidate {
    Candidate {
        uri: uri.to_owned(),
        label: label.to_owned(),
        node_type: "skos:Concept".to_owned(),
    }
}

fn work_module(id: &str, kind: ModuleKind) -> Module {
    Module::new(id, kind).with_patterns(vec![
        TriplePattern::basic(
            Term::var_labeled("expression", "efrbroo:F22_Self-Contained_Expression"),
            Term::uri("a"),
            Term::uri("efrbroo:F22_Self-Contained_Expression"),
        ),
        TriplePattern::basic(
            Term::var_labeled("expression", "efrbroo:F22_Self-Contained_Expression"),
            Term::uri("rdfs:label"),
            Term::var_labeled("title", "rdfs:label"),
        ),
    ])
}

fn genre_module(id: &str, kind: ModuleKind) -> Module {
    Module::new(id, kind).with_patterns(vec![TriplePattern::basic(
        Term::var_labeled("expression", "efrbroo:F22_Self-Contained_Expression"),
        Term::uri("mus:U12_has_genre"),
        Term::var_labeled("genre", "mus:M5_Genre"),
    )])
}

/// Same triple shape, but declares `?genre` as newly defined so the
/// collision with the first genre module is explicit.
fn second_genre_module(id: &str, kind: ModuleKind) -> Module {
    genre_module(id, kind)
        .with_required(vec![VarRef::new(
            "expression",
            "efrbroo:F22_Self-Contained_Expression",
        )])
        .with_defined(vec![VarRef::new("genre", "mus:M5_Genre")])
}

#[tokio::test]
async fn module_addition_commits_on_successful_dry_run() {
    let execution = ScriptedExecution::passing();
    let oracle = ScriptedOracle::replying("0");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "all works");
    container
        .add_module(work_module("base", ModuleKind::Builder), &ctx)
        .await
        .unwrap();

    assert!(container.registry().contains("expression"));
    assert!(container.registry().contains("title"));
    assert!(container
        .render_display()
        .contains("?expression rdfs:label ?title ."));
    // The dry run executed the rendered query.
    assert!(!execution.executed.lock().is_empty());
}

#[tokio::test]
async fn failed_dry_run_rolls_back_bit_for_bit() {
    let execution = ScriptedExecution::passing().failing_on("?impossible");
    let oracle = ScriptedOracle::replying("0");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "all works");
    container
        .add_module(work_module("base", ModuleKind::Builder), &ctx)
        .await
        .unwrap();

    let before_render = container.render_display();
    let before_registry = container.registry().clone();

    let bad = Module::new("bad", ModuleKind::Builder).with_patterns(vec![
        TriplePattern::basic(
            Term::var_labeled("expression", "efrbroo:F22_Self-Contained_Expression"),
            Term::uri("mus:U94_has_melody_type"),
            Term::var_labeled("impossible", "mus:M999_Nothing"),
        ),
        TriplePattern::basic(
            Term::var_labeled("impossible", "mus:M999_Nothing"),
            Term::uri("rdfs:label"),
            Term::var_labeled("impossibleLabel", "rdfs:label"),
        ),
    ]);
    let err = container.add_module(bad, &ctx).await.unwrap_err();
    assert!(matches!(
        err,
        BuildError::DryRunFailed {
            cause: DryRunCause::ZeroResults,
            ..
        }
    ));

    assert_eq!(container.render_display(), before_render);
    assert_eq!(container.registry(), &before_registry);
}

#[tokio::test]
async fn builder_collision_reuses_canonical_alias_without_oracle() {
    let execution = ScriptedExecution::passing();
    let oracle = ScriptedOracle::replying("0");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "works by genre");
    container
        .add_module(genre_module("genre-a", ModuleKind::Builder), &ctx)
        .await
        .unwrap();
    assert_eq!(container.registry().count_of("genre"), Some(1));

    container
        .add_module(second_genre_module("genre-b", ModuleKind::Builder), &ctx)
        .await
        .unwrap();

    assert_eq!(oracle.call_count(), 0);
    assert_eq!(container.registry().count_of("genre"), Some(2));
    assert!(!container.registry().contains("genre_1"));
}

#[tokio::test]
async fn adhoc_collision_lets_the_oracle_mint_an_alias() {
    let execution = ScriptedExecution::passing();
    // One existing alias, so option 1 is the rename option.
    let oracle = ScriptedOracle::replying("option 1 fits best");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "compare two genres");
    container
        .add_module(genre_module("genre-a", ModuleKind::Builder), &ctx)
        .await
        .unwrap();

    container
        .add_module(second_genre_module("genre-b", ModuleKind::ComponentConstraint), &ctx)
        .await
        .unwrap();

    assert_eq!(oracle.call_count(), 1);
    assert!(container.registry().contains("genre_1"));
    assert!(container
        .render_display()
        .contains("?expression mus:U12_has_genre ?genre_1 ."));
    assert_eq!(container.decision_log().len(), 1);
    assert_eq!(container.decision_log()[0].chosen_index, 1);
}

#[tokio::test]
async fn adhoc_collision_can_reuse_the_existing_alias() {
    let execution = ScriptedExecution::passing();
    let oracle = ScriptedOracle::replying("0");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "works in a genre");
    container
        .add_module(genre_module("genre-a", ModuleKind::Builder), &ctx)
        .await
        .unwrap();
    container
        .add_module(second_genre_module("genre-b", ModuleKind::ComponentConstraint), &ctx)
        .await
        .unwrap();

    assert!(!container.registry().contains("genre_1"));
    assert_eq!(container.registry().count_of("genre"), Some(2));
}

#[tokio::test]
async fn hallucinated_uri_fails_before_any_state_change() {
    let fake = "http://data.doremus.org/expression/does-not-exist";
    let execution = ScriptedExecution::passing().failing_on(fake);
    let oracle = ScriptedOracle::replying("0");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "a specific work");
    let module = Module::new("pinned", ModuleKind::Builder).with_patterns(vec![
        TriplePattern::basic(
            Term::var("expression"),
            Term::uri("ecrm:P1_is_identified_by"),
            Term::uri(fake),
        ),
    ]);
    let err = container.add_module(module, &ctx).await.unwrap_err();
    assert!(matches!(err, BuildError::HallucinatedUri { .. }));
    assert!(container.modules().is_empty());
    assert!(container.registry().is_empty());
}

#[tokio::test]
async fn values_expansion_keeps_preferred_namespaces_only() {
    let original = "http://data.doremus.org/vocabulary/iaml/genre/sy";
    let execution = ScriptedExecution::passing().with_script(
        "skos:exactMatch",
        vec![
            row(&[("eq", "http://data.doremus.org/vocabulary/iaml/genre/sy2")]),
            row(&[("eq", "http://www.wikidata.org/entity/Q9734")]),
        ],
    );
    let oracle = ScriptedOracle::replying("0");
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "symphonies");
    let module = Module::new("genre", ModuleKind::Builder).with_patterns(vec![
        TriplePattern::basic(
            Term::var_labeled("expression", "efrbroo:F22_Self-Contained_Expression"),
            Term::uri("mus:U12_has_genre"),
            Term::var_labeled("genre", "mus:M5_Genre"),
        ),
        TriplePattern::values("genre", vec![original.to_owned()]),
    ]);
    container.add_module(module, &ctx).await.unwrap();

    let rendered = container.render_display();
    assert!(rendered.contains("genre/sy>"));
    assert!(rendered.contains("genre/sy2>"));
    assert!(!rendered.contains("wikidata"));
}

#[tokio::test]
async fn builder_instantiates_template_and_binds_resolved_filter() {
    let execution = ScriptedExecution::passing();
    let oracle = ScriptedOracle::replying("0");
    let resolution = ScriptedResolution {
        candidates: vec![candidate(
            "http://data.doremus.org/vocabulary/iaml/genre/sy",
            "symphony",
        )],
    };
    let config = EngineConfig::default();
    let catalog = TemplateCatalog::builtin().unwrap();
    let builder = QueryBuilder {
        catalog: &catalog,
        execution: &execution,
        resolution: &resolution,
        oracle: &oracle,
        config: &config,
    };

    let container = builder
        .build(
            "works",
            "symphonies please",
            None,
            &[FilterRequest::new("genre", "symphony")],
        )
        .await
        .unwrap();

    let rendered = container.render_display();
    assert!(rendered.contains("?expression a efrbroo:F22_Self-Contained_Expression ."));
    assert!(rendered.contains("VALUES ?genre { <http://data.doremus.org/vocabulary/iaml/genre/sy> }"));
    assert!(container.registry().contains("genre"));
    // The single candidate binds exactly, no oracle involvement.
    assert_eq!(oracle.call_count(), 0);
}

#[tokio::test]
async fn builder_falls_back_to_regex_when_nothing_resolves() {
    let execution = ScriptedExecution::passing();
    let oracle = ScriptedOracle::replying("0");
    let resolution = ScriptedResolution { candidates: vec![] };
    let config = EngineConfig::default();
    let catalog = TemplateCatalog::builtin().unwrap();
    let builder = QueryBuilder {
        catalog: &catalog,
        execution: &execution,
        resolution: &resolution,
        oracle: &oracle,
        config: &config,
    };

    let container = builder
        .build(
            "works",
            "works about rain",
            None,
            &[FilterRequest::new("genre", "rain")],
        )
        .await
        .unwrap();

    assert!(container
        .render_display()
        .contains("REGEX(?genreLabel, \"rain\", \"i\")"));
}

#[tokio::test]
async fn ambiguous_filter_resolution_is_arbitrated_by_the_oracle() {
    let execution = ScriptedExecution::passing();
    let oracle = ScriptedOracle::replying("1");
    let resolution = ScriptedResolution {
        candidates: vec![
            candidate("http://data.doremus.org/vocabulary/iaml/genre/sy", "symphony"),
            candidate(
                "http://data.doremus.org/vocabulary/iaml/genre/syc",
                "symphonie concertante",
            ),
        ],
    };
    let config = EngineConfig::default();
    let catalog = TemplateCatalog::builtin().unwrap();
    let builder = QueryBuilder {
        catalog: &catalog,
        execution: &execution,
        resolution: &resolution,
        oracle: &oracle,
        config: &config,
    };

    let container = builder
        .build(
            "works",
            "symphonie concertante works",
            None,
            &[FilterRequest::new("genre", "symphonie")],
        )
        .await
        .unwrap();

    assert_eq!(oracle.call_count(), 1);
    assert!(container
        .render_display()
        .contains("VALUES ?genre { <http://data.doremus.org/vocabulary/iaml/genre/syc> }"));
    assert_eq!(container.decision_log().len(), 1);
}

#[tokio::test]
async fn orchestrator_synthesizes_a_chained_component_module() {
    let instrument = "http://data.doremus.org/vocabulary/iaml/mop/svl";
    let execution = ScriptedExecution::passing()
        .with_script(
            "?host ?rel",
            vec![row(&[
                (
                    "rel",
                    "http://data.doremus.org/ontology#U2_foresees_use_of_medium_of_performance",
                ),
                ("host", "http://data.doremus.org/casting_detail/42"),
            ])],
        )
        .with_script(
            "casting_detail/42> a ?type",
            vec![row(&[("type", "http://data.doremus.org/ontology#M7_Casting_Detail")])],
        );
    let oracle = ScriptedOracle::replying("0");
    let resolution = ScriptedResolution {
        candidates: vec![candidate(instrument, "violin")],
    };
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let graph = RelationGraph::from_triples(vec![
        (
            "efrbroo:F22_Self-Contained_Expression",
            "mus:U13_has_casting",
            "mus:M6_Casting",
        ),
        (
            "mus:M6_Casting",
            "mus:U23_has_casting_detail",
            "mus:M7_Casting_Detail",
        ),
    ]);

    let mut container = QueryContainer::new("q1", "works for two violins");
    container
        .add_module(work_module("base", ModuleKind::Builder), &ctx)
        .await
        .unwrap();

    let orchestrator = Orchestrator {
        graph: &graph,
        execution: &execution,
        resolution: &resolution,
        oracle: &oracle,
        config: &config,
    };
    orchestrator
        .attach_component(&mut container, "expression", "violin", Some(2))
        .await
        .unwrap();

    let rendered = container.render_display();
    assert!(rendered.contains("?expression mus:U13_has_casting ?casting ."));
    assert!(rendered.contains("?casting mus:U23_has_casting_detail ?castingDetail ."));
    assert!(rendered
        .contains("?castingDetail mus:U2_foresees_use_of_medium_of_performance ?svl ."));
    assert!(rendered.contains(&format!("VALUES ?svl {{ <{instrument}> }}")));
    assert!(rendered.contains("?castingDetail mus:U30_foresees_quantity_of_mop 2 ."));
}

#[tokio::test]
async fn orchestrator_fails_hard_without_a_reverse_arc() {
    let execution = ScriptedExecution::passing().with_script("?host ?rel", vec![]);
    let oracle = ScriptedOracle::replying("0");
    let resolution = ScriptedResolution {
        candidates: vec![candidate(
            "http://data.doremus.org/vocabulary/iaml/mop/svl",
            "violin",
        )],
    };
    let config = EngineConfig::default();
    let ctx = ModuleContext::new(&execution, &oracle, &config);

    let mut container = QueryContainer::new("q1", "works for violin");
    container
        .add_module(work_module("base", ModuleKind::Builder), &ctx)
        .await
        .unwrap();
    let before = container.render_display();

    let graph = RelationGraph::new();
    let orchestrator = Orchestrator {
        graph: &graph,
        execution: &execution,
        resolution: &resolution,
        oracle: &oracle,
        config: &config,
    };
    let err = orchestrator
        .attach_component(&mut container, "expression", "violin", None)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::PathSynthesisFailed { .. }));
    assert_eq!(container.render_display(), before);
}
