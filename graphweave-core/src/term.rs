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

//! Query terms
//!
//! A term is one position of a graph pattern: a variable, a URI, or a
//! literal. Terms are a closed sum so that rendering is exhaustive and a
//! missing tag can never silently produce malformed query text.

use serde::{Deserialize, Serialize};

/// One position (subject, predicate, or object) of a triple pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Term {
    /// A query variable. `label` is the semantic label (the ontology class
    /// or property URI the variable stands for); it may be empty when the
    /// caller has no type information.
    Variable { name: String, label: String },
    /// A URI, either absolute (`http://...`) or prefixed (`mus:U13_...`).
    /// `display_label` is an optional human-readable name attached after a
    /// successful entity lookup; it renders as an end-of-line comment.
    Uri {
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_label: Option<String>,
    },
    /// A literal value.
    Literal(Literal),
}

/// Literal values carried by [`Term::Literal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Literal {
    Str(String),
    Int(i64),
    /// A typed literal such as `"1800"^^xsd:gYear`.
    Typed { lexical: String, datatype: String },
}

impl Term {
    /// Shorthand for an untyped variable.
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable {
            name: name.into(),
            label: String::new(),
        }
    }

    /// Shorthand for a variable carrying a semantic label.
    pub fn var_labeled(name: impl Into<String>, label: impl Into<String>) -> Self {
        Term::Variable {
            name: name.into(),
            label: label.into(),
        }
    }

    /// Shorthand for a URI term without a display label.
    pub fn uri(value: impl Into<String>) -> Self {
        Term::Uri {
            value: value.into(),
            display_label: None,
        }
    }

    pub fn literal_str(value: impl Into<String>) -> Self {
        Term::Literal(Literal::Str(value.into()))
    }

    pub fn literal_int(value: i64) -> Self {
        Term::Literal(Literal::Int(value))
    }

    /// The variable name, if this term is a variable.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Term::Variable { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable { .. })
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Term::Literal(_))
    }

    /// Render the term as query text.
    pub fn render(&self) -> String {
        match self {
            Term::Variable { name, .. } => format!("?{name}"),
            Term::Uri { value, .. } => render_uri(value),
            Term::Literal(Literal::Str(s)) => format!("\"{s}\""),
            Term::Literal(Literal::Int(n)) => n.to_string(),
            Term::Literal(Literal::Typed { lexical, datatype }) => {
                format!("\"{lexical}\"^^{datatype}")
            }
        }
    }
}

/// Absolute URIs are angle-bracketed; prefixed names pass through.
pub fn render_uri(value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        format!("<{value}>")
    } else {
        value.to_string()
    }
}

/// Whether a raw string already denotes a URI rather than a name to resolve.
pub fn is_uri_shaped(value: &str) -> bool {
    value.starts_with("http://")
        || value.starts_with("https://")
        || (value.starts_with('<') && value.ends_with('>'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_tag() {
        assert_eq!(Term::var("title").render(), "?title");
        assert_eq!(
            Term::uri("http://example.org/e/1").render(),
            "<http://example.org/e/1>"
        );
        assert_eq!(Term::uri("mus:U12_has_genre").render(), "mus:U12_has_genre");
        assert_eq!(Term::literal_str("sonata").render(), "\"sonata\"");
        assert_eq!(Term::literal_int(3).render(), "3");
        assert_eq!(
            Term::Literal(Literal::Typed {
                lexical: "1800".into(),
                datatype: "xsd:gYear".into()
            })
            .render(),
            "\"1800\"^^xsd:gYear"
        );
    }

    #[test]
    fn uri_shape_detection() {
        assert!(is_uri_shaped("http://example.org/x"));
        assert!(is_uri_shaped("<http://example.org/x>"));
        assert!(!is_uri_shaped("violin"));
    }
}
