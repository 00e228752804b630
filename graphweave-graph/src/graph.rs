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

//! In-memory relation graph
//!
//! Adjacency is keyed by node type; each outgoing arc carries the
//! predicate that connects the two types. The graph is built once,
//! shared immutably across sessions.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read relation graph: {0}")]
    Io(#[from] std::io::Error),
}

/// Directed multigraph over node types; arcs are `(predicate, target)`.
#[derive(Debug, Clone, Default)]
pub struct RelationGraph {
    adjacency: HashMap<String, Vec<(String, String)>>,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from `(subject_type, predicate, object_type)` triples.
    pub fn from_triples<I, S>(triples: I) -> Self
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: Into<String>,
    {
        let mut graph = Self::new();
        for (subject, predicate, object) in triples {
            graph.add_edge(subject.into(), predicate.into(), object.into());
        }
        graph
    }

    /// Loads a graph from a CSV of `subject,predicate,object` rows.
    /// Rows with fewer than three fields are skipped.
    pub fn from_csv_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let mut graph = Self::new();
        for line in reader.lines() {
            let line = line?;
            let mut fields = line.splitn(3, ',');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(s), Some(p), Some(o)) => {
                    graph.add_edge(s.trim().to_owned(), p.trim().to_owned(), o.trim().to_owned());
                }
                _ => continue,
            }
        }
        Ok(graph)
    }

    pub fn add_edge(&mut self, subject: String, predicate: String, object: String) {
        self.adjacency
            .entry(subject)
            .or_default()
            .push((predicate, object));
    }

    /// Outgoing `(predicate, target)` arcs of a node type, empty if unknown.
    pub fn neighbors(&self, node: &str) -> &[(String, String)] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, node: &str) -> bool {
        self.adjacency.contains_key(node)
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }
}
