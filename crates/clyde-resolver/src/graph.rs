//! The resolved dependency graph.
//!
//! Packages live in an arena indexed by dense integer ids; edges are id to
//! id. An edge `A -> B` means "A directly depends on B". The graph is
//! acyclic by construction (the resolver rejects cycle-creating edges) and
//! exposes a single distinguished root.

use crate::package::{Package, PackageKey};
use clyde_core::Version;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Dense id of a package in the graph arena.
pub type PackageId = NodeIndex;

/// Directed acyclic graph of resolved packages.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<Package, ()>,
    index: HashMap<PackageKey, PackageId>,
    root: PackageId,
}

impl DependencyGraph {
    /// Create a graph containing only the root package.
    #[must_use]
    pub(crate) fn new(root: Package) -> Self {
        let mut graph = DiGraph::new();
        let key = root.key();
        let root_id = graph.add_node(root);
        let mut index = HashMap::new();
        index.insert(key, root_id);
        Self {
            graph,
            index,
            root: root_id,
        }
    }

    /// Add a package, returning its id. The resolver guarantees each
    /// `(name, version)` is added at most once.
    pub(crate) fn add_package(&mut self, package: Package) -> PackageId {
        let key = package.key();
        let id = self.graph.add_node(package);
        self.index.insert(key, id);
        id
    }

    /// Add a dependency edge `from -> to`.
    pub(crate) fn add_edge(&mut self, from: PackageId, to: PackageId) {
        if !self.graph.contains_edge(from, to) {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Would inserting `from -> to` close a cycle?
    #[must_use]
    pub(crate) fn would_cycle(&self, from: PackageId, to: PackageId) -> bool {
        from == to || petgraph::algo::has_path_connecting(&self.graph, to, from, None)
    }

    /// The distinguished root package.
    #[must_use]
    pub fn root(&self) -> &Package {
        &self.graph[self.root]
    }

    /// The root's id.
    #[must_use]
    pub fn root_id(&self) -> PackageId {
        self.root
    }

    /// Package by id.
    #[must_use]
    pub fn package(&self, id: PackageId) -> &Package {
        &self.graph[id]
    }

    /// Look up a package id by `(name, version)` identity.
    #[must_use]
    pub fn get(&self, name: &str, version: &Version) -> Option<PackageId> {
        self.index.get(&PackageKey {
            name: name.to_string(),
            version: version.clone(),
        }).copied()
    }

    /// All packages with their ids, in insertion order.
    pub fn packages(&self) -> impl Iterator<Item = (PackageId, &Package)> {
        self.graph
            .node_indices()
            .map(move |id| (id, &self.graph[id]))
    }

    /// Direct dependencies of a package, in the order its manifest
    /// introduced them.
    #[must_use]
    pub fn dependencies(&self, id: PackageId) -> Vec<PackageId> {
        // petgraph iterates neighbors most-recently-added first.
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(id, Direction::Outgoing)
            .collect();
        deps.reverse();
        deps
    }

    /// Packages that directly depend on `id`.
    #[must_use]
    pub fn dependents(&self, id: PackageId) -> Vec<PackageId> {
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(id, Direction::Incoming)
            .collect();
        deps.reverse();
        deps
    }

    /// Transitive dependencies of `id` in breadth-first order: direct
    /// dependencies before transitive ones, deduplicated by first occurrence.
    #[must_use]
    pub fn transitive_dependencies(&self, id: PackageId) -> Vec<PackageId> {
        let mut order = Vec::new();
        let mut seen = vec![false; self.graph.node_count()];
        let mut queue = std::collections::VecDeque::new();
        seen[id.index()] = true;
        queue.push_back(id);
        while let Some(current) = queue.pop_front() {
            for dep in self.dependencies(current) {
                if !seen[dep.index()] {
                    seen[dep.index()] = true;
                    order.push(dep);
                    queue.push_back(dep);
                }
            }
        }
        order
    }

    /// Dependencies-first topological order (Kahn's algorithm). For every
    /// edge `A -> B`, B appears before A. Deterministic: ties break on the
    /// dense package id.
    #[must_use]
    pub fn topo_order(&self) -> Vec<PackageId> {
        use std::cmp::Reverse;
        use std::collections::BinaryHeap;

        let mut remaining: HashMap<PackageId, usize> = self
            .graph
            .node_indices()
            .map(|id| {
                (
                    id,
                    self.graph
                        .neighbors_directed(id, Direction::Outgoing)
                        .count(),
                )
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<PackageId>> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(remaining.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            remaining.remove(&id);
            for dependent in self.graph.neighbors_directed(id, Direction::Incoming) {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }

        debug_assert_eq!(order.len(), self.graph.node_count(), "graph must be acyclic");
        order
    }

    /// Number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Is the graph empty? (Never true: the root is always present.)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of dependency edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}
