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

//! K shortest simple paths
//!
//! Yen's algorithm over the relation graph with unit edge weights. The
//! inner search is a uniform-cost Dijkstra that never revisits a node
//! already on the path under construction, so every returned path is
//! simple. Returns fewer than `k` paths when fewer exist; an absent
//! route yields an empty result, never an error.

use crate::graph::RelationGraph;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use tracing::debug;

/// One hop through the relation graph at the schema level.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaEdge {
    pub source: String,
    pub relation: String,
    pub target: String,
}

impl SchemaEdge {
    pub fn new(
        source: impl Into<String>,
        relation: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            relation: relation.into(),
            target: target.into(),
        }
    }
}

/// Shortest simple path under edge and node bans, or `None` when the end
/// is unreachable. A zero-edge path is returned when `start == end`.
fn dijkstra_path(
    graph: &RelationGraph,
    start: &str,
    end: &str,
    banned_edges: &HashSet<SchemaEdge>,
    banned_nodes: &HashSet<String>,
) -> Option<Vec<SchemaEdge>> {
    // The counter breaks cost ties by insertion order before the heap
    // ever compares nodes or paths.
    let mut heap: BinaryHeap<Reverse<(usize, u64, String, Vec<SchemaEdge>)>> = BinaryHeap::new();
    let mut counter = 0u64;
    heap.push(Reverse((0, counter, start.to_owned(), Vec::new())));
    let mut visited: HashSet<String> = HashSet::new();

    while let Some(Reverse((cost, _, node, path))) = heap.pop() {
        if node == end {
            return Some(path);
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        for (relation, neighbor) in graph.neighbors(&node) {
            let edge = SchemaEdge::new(node.clone(), relation.clone(), neighbor.clone());
            if banned_edges.contains(&edge)
                || banned_nodes.contains(neighbor)
                || path.iter().any(|hop| &hop.target == neighbor)
            {
                continue;
            }
            let mut extended = path.clone();
            extended.push(edge);
            counter += 1;
            heap.push(Reverse((cost + 1, counter, neighbor.clone(), extended)));
        }
    }
    None
}

/// Up to `k` shortest simple paths between two node types, ascending by
/// hop count.
pub fn k_shortest_paths(
    graph: &RelationGraph,
    start: &str,
    end: &str,
    k: usize,
) -> Vec<Vec<SchemaEdge>> {
    if k == 0 {
        return Vec::new();
    }

    let mut accepted: Vec<Vec<SchemaEdge>> = Vec::new();
    let mut candidates: Vec<Vec<SchemaEdge>> = Vec::new();

    let Some(first) = dijkstra_path(graph, start, end, &HashSet::new(), &HashSet::new()) else {
        debug!(start, end, "no path between node types");
        return Vec::new();
    };
    accepted.push(first);

    for _ in 1..k {
        let last = accepted.last().expect("accepted set is non-empty").clone();
        for i in 0..last.len() {
            let spur_node = last[i].source.clone();
            let root: Vec<SchemaEdge> = last[..i].to_vec();

            let mut banned_edges: HashSet<SchemaEdge> = HashSet::new();
            for path in &accepted {
                if path.len() > i && path[..i] == root[..] {
                    banned_edges.insert(path[i].clone());
                }
            }
            let banned_nodes: HashSet<String> =
                root.iter().map(|hop| hop.source.clone()).collect();

            if let Some(spur) = dijkstra_path(graph, &spur_node, end, &banned_edges, &banned_nodes)
            {
                let mut total = root;
                total.extend(spur);
                if !candidates.contains(&total) && !accepted.contains(&total) {
                    candidates.push(total);
                }
            }
        }
        if candidates.is_empty() {
            break;
        }
        candidates.sort_by_key(Vec::len);
        accepted.push(candidates.remove(0));
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> RelationGraph {
        RelationGraph::from_triples(vec![("A", "p1", "B"), ("B", "p2", "C"), ("A", "p3", "C")])
    }

    #[test]
    fn single_shortest_path_matches_dijkstra() {
        let graph = triangle();
        let paths = k_shortest_paths(&graph, "A", "C", 1);
        assert_eq!(paths, vec![vec![SchemaEdge::new("A", "p3", "C")]]);
    }

    #[test]
    fn two_paths_ascending_by_hop_count() {
        let graph = triangle();
        let paths = k_shortest_paths(&graph, "A", "C", 2);
        assert_eq!(
            paths,
            vec![
                vec![SchemaEdge::new("A", "p3", "C")],
                vec![
                    SchemaEdge::new("A", "p1", "B"),
                    SchemaEdge::new("B", "p2", "C"),
                ],
            ]
        );
    }

    #[test]
    fn requesting_more_paths_than_exist_returns_what_there_is() {
        let graph = triangle();
        let paths = k_shortest_paths(&graph, "A", "C", 10);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn same_start_and_end_yields_zero_edge_path() {
        let graph = triangle();
        let paths = k_shortest_paths(&graph, "A", "A", 3);
        assert_eq!(paths[0], Vec::<SchemaEdge>::new());
    }

    #[test]
    fn disconnected_types_yield_empty_result() {
        let graph = triangle();
        assert!(k_shortest_paths(&graph, "C", "A", 2).is_empty());
    }

    #[test]
    fn paths_are_simple() {
        let graph = RelationGraph::from_triples(vec![
            ("A", "p", "B"),
            ("B", "p", "A"),
            ("B", "p", "C"),
        ]);
        for path in k_shortest_paths(&graph, "A", "C", 5) {
            let mut seen: HashSet<&str> = HashSet::new();
            if let Some(first) = path.first() {
                seen.insert(&first.source);
            }
            for hop in &path {
                assert!(seen.insert(&hop.target), "node revisited in {path:?}");
            }
        }
    }
}
