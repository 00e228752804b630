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

//! Triple patterns
//!
//! The WHERE body of a query is a sequence of patterns: plain triples and
//! exact-match `VALUES` bindings. `VALUES` carries a list of equivalent
//! URIs so a single resolved entity can match across linked vocabularies.

use crate::term::{render_uri, Term};
use serde::{Deserialize, Serialize};

/// A subject-predicate-object graph pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Subjects and predicates must not be literals.
    pub fn is_well_formed(&self) -> bool {
        !self.subject.is_literal() && !self.predicate.is_literal()
    }
}

/// One entry of a module's WHERE contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriplePattern {
    Basic(Triple),
    /// An exact-match binding: `VALUES ?variable { <uri> ... }`.
    Values { variable: String, uris: Vec<String> },
}

impl TriplePattern {
    pub fn basic(subject: Term, predicate: Term, object: Term) -> Self {
        TriplePattern::Basic(Triple::new(subject, predicate, object))
    }

    pub fn values(variable: impl Into<String>, uris: Vec<String>) -> Self {
        TriplePattern::Values {
            variable: variable.into(),
            uris,
        }
    }

    /// Render as a single line of query text (no display-label comments).
    pub fn render(&self) -> String {
        match self {
            TriplePattern::Basic(t) => format!(
                "{} {} {} .",
                t.subject.render(),
                t.predicate.render(),
                t.object.render()
            ),
            TriplePattern::Values { variable, uris } => {
                let formatted: Vec<String> = uris.iter().map(|u| render_uri(u)).collect();
                format!("VALUES ?{} {{ {} }}", variable, formatted.join(" "))
            }
        }
    }

    /// Every variable occurring in the pattern, with its semantic label
    /// where one is present.
    pub fn variables(&self) -> Vec<VarRef> {
        let mut out = Vec::new();
        match self {
            TriplePattern::Basic(t) => {
                for term in [&t.subject, &t.predicate, &t.object] {
                    if let Term::Variable { name, label } = term {
                        out.push(VarRef {
                            name: name.clone(),
                            label: label.clone(),
                        });
                    }
                }
            }
            TriplePattern::Values { variable, .. } => {
                out.push(VarRef {
                    name: variable.clone(),
                    label: String::new(),
                });
            }
        }
        out
    }

    /// Rename every occurrence of a variable, in place.
    pub fn rename_variable(&mut self, old: &str, new: &str) {
        match self {
            TriplePattern::Basic(t) => {
                for term in [&mut t.subject, &mut t.predicate, &mut t.object] {
                    if let Term::Variable { name, .. } = term {
                        if name == old {
                            *name = new.to_string();
                        }
                    }
                }
            }
            TriplePattern::Values { variable, .. } => {
                if variable == old {
                    *variable = new.to_string();
                }
            }
        }
    }
}

/// A named reference to a query variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub name: String,
    /// Semantic label (class/property URI); empty when unknown.
    #[serde(default)]
    pub label: String,
}

impl VarRef {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }

    pub fn unlabeled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_basic_and_values() {
        let p = TriplePattern::basic(
            Term::var("work"),
            Term::uri("mus:U12_has_genre"),
            Term::var("genre"),
        );
        assert_eq!(p.render(), "?work mus:U12_has_genre ?genre .");

        let v = TriplePattern::values("genre", vec!["http://example.org/genre/sy".into()]);
        assert_eq!(v.render(), "VALUES ?genre { <http://example.org/genre/sy> }");
    }

    #[test]
    fn rename_touches_all_positions() {
        let mut p = TriplePattern::basic(
            Term::var("x"),
            Term::uri("rdfs:label"),
            Term::var("x"),
        );
        p.rename_variable("x", "y");
        assert_eq!(p.render(), "?y rdfs:label ?y .");
    }

    #[test]
    fn literal_subject_is_malformed() {
        let t = Triple::new(
            Term::literal_str("no"),
            Term::uri("rdfs:label"),
            Term::var("x"),
        );
        assert!(!t.is_well_formed());
    }
}
