//! Name-keyed adjacency store for resolved dependencies.
//!
//! Nodes are identified by package name only; the version a package was
//! fetched at is not part of its identity. A package becomes a key once its
//! dependencies have been resolved (possibly to nothing). A package that has
//! only been seen as somebody's dependency is a node of the graph but not a
//! key of the adjacency map.

use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};

/// Package name -> names of its direct dependencies.
///
/// Both levels are ordered, which makes every walk over the map
/// deterministic without extra sorting.
pub type Adjacency = BTreeMap<String, BTreeSet<String>>;

/// A directed graph of package dependencies.
///
/// Edges point from the dependent package to its dependency.
///
/// # Example
///
/// ```rust
/// use depscope::graph::DependencyGraph;
///
/// let mut graph = DependencyGraph::new();
/// graph.add_edge("react-dom", "react");
/// graph.add_edge("react-dom", "scheduler");
/// graph.add_edge("react-dom", "react"); // idempotent
///
/// assert_eq!(graph.node_count(), 3);
/// assert_eq!(graph.edge_count(), 2);
/// assert!(graph.contains("react-dom"));
/// assert!(!graph.contains("react")); // referenced, never resolved
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    adjacency: Adjacency,
}

impl DependencyGraph {
    /// Creates a new empty dependency graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `name` as resolved, with no dependencies yet.
    ///
    /// Returns `true` if the package was not already a key.
    pub fn add_node(&mut self, name: &str) -> bool {
        if self.adjacency.contains_key(name) {
            return false;
        }
        self.adjacency.insert(name.to_string(), BTreeSet::new());
        true
    }

    /// Records that `from` depends on `to`.
    ///
    /// Idempotent. `from` becomes a key if it was not one. An empty `to`
    /// is ignored so malformed metadata cannot create a nameless node.
    ///
    /// # Example
    ///
    /// ```rust
    /// use depscope::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_edge("app", "");
    ///
    /// assert!(graph.contains("app"));
    /// assert_eq!(graph.edge_count(), 0);
    /// ```
    pub fn add_edge(&mut self, from: &str, to: &str) {
        let deps = self.adjacency.entry(from.to_string()).or_default();
        if !to.is_empty() {
            deps.insert(to.to_string());
        }
    }

    /// Borrows the adjacency map.
    pub fn dependencies(&self) -> &Adjacency {
        &self.adjacency
    }

    /// Returns an owned copy of the adjacency map.
    ///
    /// Two snapshots taken without an intervening traversal are equal.
    pub fn snapshot(&self) -> Adjacency {
        self.adjacency.clone()
    }

    /// Direct dependencies of a resolved package.
    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.adjacency.get(name)
    }

    /// Packages that directly depend on `name`, in sorted order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.adjacency
            .iter()
            .filter(|(_, deps)| deps.contains(name))
            .map(|(pkg, _)| pkg.as_str())
            .collect()
    }

    /// Returns true if `name` has been resolved (is a key).
    pub fn contains(&self, name: &str) -> bool {
        self.adjacency.contains_key(name)
    }

    /// Every package in the graph: resolved keys plus anything referenced.
    pub fn packages(&self) -> BTreeSet<&str> {
        self.adjacency
            .iter()
            .flat_map(|(pkg, deps)| {
                std::iter::once(pkg.as_str()).chain(deps.iter().map(String::as_str))
            })
            .collect()
    }

    /// Number of distinct packages, including unresolved references.
    pub fn node_count(&self) -> usize {
        self.packages().len()
    }

    /// Number of dependency edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Projects the graph into a petgraph `DiGraph` for the algorithms that
    /// need one. Node weights are package names.
    pub(crate) fn to_petgraph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let packages = self.packages();
        let mut graph = DiGraph::with_capacity(packages.len(), self.edge_count());
        let mut indices = HashMap::with_capacity(packages.len());

        for pkg in packages {
            let idx = graph.add_node(pkg.to_string());
            indices.insert(pkg.to_string(), idx);
        }

        for (pkg, deps) in &self.adjacency {
            let from = indices[pkg];
            for dep in deps {
                graph.add_edge(from, indices[dep], ());
            }
        }

        (graph, indices)
    }

    /// Writes one `pkg -> dep, dep` line per resolved package, sorted.
    ///
    /// ```rust
    /// use depscope::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_edge("app", "lib");
    /// graph.add_node("lib");
    ///
    /// let mut out = Vec::new();
    /// graph.write_summary(&mut out).unwrap();
    /// assert_eq!(
    ///     String::from_utf8(out).unwrap(),
    ///     "  app -> lib\n  lib -> (no dependencies)\n"
    /// );
    /// ```
    pub fn write_summary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if self.adjacency.is_empty() {
            return writeln!(writer, "  (graph is empty)");
        }
        for (pkg, deps) in &self.adjacency {
            if deps.is_empty() {
                writeln!(writer, "  {} -> (no dependencies)", pkg)?;
            } else {
                let list: Vec<&str> = deps.iter().map(String::as_str).collect();
                writeln!(writer, "  {} -> {}", pkg, list.join(", "))?;
            }
        }
        Ok(())
    }

    /// Renders the graph in Graphviz DOT form.
    ///
    /// Nodes are labelled with package names; edges carry no label.
    /// Unresolved references appear as ordinary nodes.
    pub fn to_dot(&self) -> String {
        let (graph, _) = self.to_petgraph();
        let graph = graph.map(|_, name| name.clone(), |_, _| "");
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}

impl From<Adjacency> for DependencyGraph {
    fn from(adjacency: Adjacency) -> Self {
        Self { adjacency }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.add_edge("app", "left");
        graph.add_edge("app", "right");
        graph.add_edge("left", "base");
        graph.add_edge("right", "base");
        graph
    }

    #[test]
    fn test_create_empty_graph() {
        let graph = DependencyGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_add_node() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_node("leaf"));
        assert!(!graph.add_node("leaf"));

        assert!(graph.contains("leaf"));
        assert_eq!(graph.dependencies_of("leaf").map(BTreeSet::len), Some(0));
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_edge("a", "b");

        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_add_edge_ignores_empty_target() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "");

        assert!(graph.contains("a"));
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_add_node_keeps_existing_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b");
        graph.add_node("a");

        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_referenced_package_is_node_not_key() {
        let graph = diamond();

        assert!(!graph.contains("base"));
        assert!(graph.packages().contains("base"));
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_dependents_of() {
        let graph = diamond();

        assert_eq!(graph.dependents_of("base"), vec!["left", "right"]);
        assert!(graph.dependents_of("app").is_empty());
    }

    #[test]
    fn test_snapshot_is_stable() {
        let graph = diamond();
        assert_eq!(graph.snapshot(), graph.snapshot());
        assert_eq!(&graph.snapshot(), graph.dependencies());
    }

    #[test]
    fn test_self_dependency_is_recorded() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "a");

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_to_petgraph_projection() {
        let graph = diamond();
        let (pg, indices) = graph.to_petgraph();

        assert_eq!(pg.node_count(), 4);
        assert_eq!(pg.edge_count(), 4);
        assert!(pg.contains_edge(indices["app"], indices["left"]));
        assert!(!pg.contains_edge(indices["left"], indices["app"]));
    }

    #[test]
    fn test_from_adjacency() {
        let mut adjacency = Adjacency::new();
        adjacency.insert("x".to_string(), BTreeSet::from(["y".to_string()]));

        let graph = DependencyGraph::from(adjacency.clone());
        assert_eq!(graph.snapshot(), adjacency);
    }

    #[test]
    fn test_to_dot() {
        let dot = diamond().to_dot();

        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("label = \"app\""));
        assert!(dot.contains("label = \"base\""));
        assert_eq!(dot.matches("->").count(), 4);
    }

    #[test]
    fn test_to_dot_empty_graph() {
        let dot = DependencyGraph::new().to_dot();
        assert!(!dot.contains("->"));
    }

    #[test]
    fn test_write_summary() {
        let mut out = Vec::new();
        diamond().write_summary(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "  app -> left, right\n  left -> base\n  right -> base\n"
        );
    }

    #[test]
    fn test_write_summary_empty() {
        let mut out = Vec::new();
        DependencyGraph::new().write_summary(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "  (graph is empty)\n");
    }
}
