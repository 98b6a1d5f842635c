//! Cycle detection and load-order computation.
//!
//! Everything here is read-only over an already built [`DependencyGraph`].
//! The checks look at recorded edges only, so a cycle closed by an edge the
//! traversal recorded but did not expand (depth limit) is still found.

use petgraph::algo::tarjan_scc;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::DependencyGraph;

/// Ordering was impossible because the graph contains a cycle.
///
/// Returned by [`DependencyGraph::load_order`] only; the graph itself and
/// [`DependencyGraph::has_cycles`] stay usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Circular dependency detected at '{node}'; load order is undefined")]
pub struct CycleError {
    /// The package that was reached again while still being expanded.
    pub node: String,
}

/// A group of packages that depend on each other in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleInfo {
    /// One cycle through the group, following recorded edges. Starts at the
    /// smallest member; the last entry depends on the first.
    pub nodes: Vec<String>,
    /// Every package in the group, sorted. A group can hold more packages
    /// than a single cycle through it visits.
    pub members: Vec<String>,
}

impl CycleInfo {
    /// Returns a formatted string representation of the cycle path.
    ///
    /// For example: "a -> b -> c -> a"
    pub fn cycle_path(&self) -> String {
        match self.nodes.first() {
            Some(first) => format!("{} -> {}", self.nodes.join(" -> "), first),
            None => String::new(),
        }
    }

    /// Returns the number of packages in the group.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the cycle is empty (should not happen in practice).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Checks whether any recorded edge closes a directed cycle.
    ///
    /// Starts a depth-first search from every resolved package. Each branch
    /// carries its own copy of the current path, so two siblings reaching
    /// the same package never look like a cycle.
    ///
    /// # Performance
    ///
    /// Nothing is memoized between branches: every distinct path is walked,
    /// so the cost grows exponentially with the number of shared
    /// dependencies (diamonds). Fine for fixtures and shallow registry
    /// graphs; [`Self::cycle_groups`] answers the same question in linear
    /// time when the graph is large.
    ///
    /// # Example
    ///
    /// ```rust
    /// use depscope::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_edge("a", "b");
    /// graph.add_edge("b", "a");
    ///
    /// assert!(graph.has_cycles());
    /// ```
    pub fn has_cycles(&self) -> bool {
        self.dependencies()
            .keys()
            .any(|pkg| self.path_reaches_itself(pkg, HashSet::new()))
    }

    fn path_reaches_itself<'a>(&'a self, node: &'a str, mut path: HashSet<&'a str>) -> bool {
        if path.contains(node) {
            return true;
        }
        let Some(deps) = self.dependencies_of(node) else {
            return false;
        };

        path.insert(node);
        deps.iter()
            .any(|dep| self.path_reaches_itself(dep, path.clone()))
    }

    /// Computes a load order: every package after all of its dependencies.
    ///
    /// Depth-first with three-state marking. Roots are taken in sorted name
    /// order and dependencies in sorted order, so the result is
    /// deterministic. Packages that were referenced but never resolved are
    /// included as leaves.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError`] naming the first package reached again while
    /// still in progress. No partial order is returned.
    ///
    /// # Example
    ///
    /// ```rust
    /// use depscope::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_edge("A", "B");
    /// graph.add_edge("A", "C");
    /// graph.add_edge("B", "C");
    /// graph.add_node("C");
    ///
    /// assert_eq!(graph.load_order().unwrap(), vec!["C", "B", "A"]);
    /// ```
    pub fn load_order(&self) -> Result<Vec<String>, CycleError> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order = Vec::with_capacity(self.dependencies().len());

        for pkg in self.dependencies().keys() {
            self.visit_for_order(pkg, &mut marks, &mut order)?;
        }

        Ok(order)
    }

    fn visit_for_order<'a>(
        &'a self,
        node: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<(), CycleError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(CycleError {
                    node: node.to_string(),
                })
            }
            None => {}
        }

        marks.insert(node, Mark::InProgress);
        if let Some(deps) = self.dependencies_of(node) {
            for dep in deps {
                self.visit_for_order(dep, marks, order)?;
            }
        }
        marks.insert(node, Mark::Done);
        order.push(node.to_string());

        Ok(())
    }

    /// Finds every group of packages that forms a cycle.
    ///
    /// Uses strongly connected components: a component is a cycle if it has
    /// more than one package, or one package that depends on itself. For
    /// each group, `nodes` is a real cycle walked along recorded edges from
    /// the smallest member. Groups are sorted by their members.
    ///
    /// # Example
    ///
    /// ```rust
    /// use depscope::graph::DependencyGraph;
    ///
    /// let mut graph = DependencyGraph::new();
    /// graph.add_edge("a", "c");
    /// graph.add_edge("c", "b");
    /// graph.add_edge("b", "a");
    /// graph.add_edge("a", "d");
    ///
    /// let cycles = graph.cycle_groups();
    /// assert_eq!(cycles.len(), 1);
    /// assert_eq!(cycles[0].cycle_path(), "a -> c -> b -> a");
    /// assert_eq!(cycles[0].members, vec!["a", "b", "c"]);
    /// ```
    pub fn cycle_groups(&self) -> Vec<CycleInfo> {
        let (graph, _) = self.to_petgraph();
        let mut cycles: Vec<CycleInfo> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let members: BTreeSet<&str> =
                    scc.iter().map(|&idx| graph[idx].as_str()).collect();
                CycleInfo {
                    nodes: self.cycle_within(&members),
                    members: members.iter().map(|m| m.to_string()).collect(),
                }
            })
            .collect();

        cycles.sort_by(|a, b| a.members.cmp(&b.members));
        cycles
    }

    /// Depth-first walk from the smallest member back to itself, staying
    /// inside `members`. Every member of a strongly connected group reaches
    /// the start, so a shared seen-set is enough to find the way back.
    fn cycle_within(&self, members: &BTreeSet<&str>) -> Vec<String> {
        let Some(&start) = members.first() else {
            return Vec::new();
        };
        let Some(start_deps) = self.dependencies_of(start) else {
            return Vec::new();
        };

        let mut path: Vec<&str> = vec![start];
        let mut seen: HashSet<&str> = HashSet::from([start]);
        let mut stack = vec![start_deps.iter()];

        while let Some(deps) = stack.last_mut() {
            match deps.next() {
                Some(dep) if dep == start => {
                    return path.into_iter().map(str::to_string).collect();
                }
                Some(dep) if members.contains(dep.as_str()) && seen.insert(dep.as_str()) => {
                    if let Some(next) = self.dependencies_of(dep) {
                        path.push(dep);
                        stack.push(next.iter());
                    }
                }
                Some(_) => {}
                None => {
                    stack.pop();
                    path.pop();
                }
            }
        }

        // Not strongly connected after all; report the members as they are.
        members.iter().map(|m| m.to_string()).collect()
    }

    /// Returns the set of package names that are part of any cycle.
    pub fn packages_in_cycles(&self) -> HashSet<String> {
        self.cycle_groups()
            .into_iter()
            .flat_map(|cycle| cycle.members)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_of(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    fn assert_valid_order(graph: &DependencyGraph, order: &[String]) {
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        assert_eq!(position.len(), order.len(), "duplicate entries in {order:?}");
        assert_eq!(order.len(), graph.node_count());

        for (pkg, deps) in graph.dependencies() {
            for dep in deps {
                assert!(
                    position[dep.as_str()] < position[pkg.as_str()],
                    "{dep} must load before {pkg} in {order:?}"
                );
            }
        }
    }

    #[test]
    fn test_has_cycles_no_cycle() {
        let graph = graph_of(&[("A", "B"), ("A", "C"), ("B", "C")]);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_has_cycles_two_node_cycle() {
        let graph = graph_of(&[("A", "B"), ("B", "A")]);
        assert!(graph.has_cycles());
    }

    #[test]
    fn test_has_cycles_self_loop() {
        let graph = graph_of(&[("A", "A")]);
        assert!(graph.has_cycles());
    }

    #[test]
    fn test_has_cycles_diamond_is_not_a_cycle() {
        // Both branches reach "base"; a shared path set would flag this.
        let graph = graph_of(&[
            ("app", "left"),
            ("app", "right"),
            ("left", "base"),
            ("right", "base"),
            ("base", "leaf"),
        ]);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_has_cycles_through_unresolved_package() {
        // "b" was never resolved, so the path stops there.
        let graph = graph_of(&[("a", "b")]);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_has_cycles_empty_graph() {
        assert!(!DependencyGraph::new().has_cycles());
    }

    #[test]
    fn test_load_order_simple_chain() {
        let mut graph = graph_of(&[("A", "B"), ("A", "C"), ("B", "C")]);
        graph.add_node("C");

        let order = graph.load_order().unwrap();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_load_order_includes_unresolved_leaves_once() {
        // "shared" is referenced twice but never resolved (depth cut).
        let graph = graph_of(&[("app", "x"), ("app", "shared"), ("x", "shared")]);

        let order = graph.load_order().unwrap();
        assert_eq!(order.iter().filter(|p| *p == "shared").count(), 1);
        assert_valid_order(&graph, &order);
    }

    #[test]
    fn test_load_order_isolated_node() {
        let mut graph = DependencyGraph::new();
        graph.add_node("alone");

        assert_eq!(graph.load_order().unwrap(), vec!["alone"]);
    }

    #[test]
    fn test_load_order_is_deterministic() {
        let graph = graph_of(&[
            ("zeta", "alpha"),
            ("mid", "alpha"),
            ("mid", "beta"),
            ("beta", "alpha"),
        ]);

        let first = graph.load_order().unwrap();
        let second = graph.load_order().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["alpha", "beta", "mid", "zeta"]);
        assert_valid_order(&graph, &first);
    }

    #[test]
    fn test_load_order_cycle_error() {
        let graph = graph_of(&[("A", "B"), ("B", "A")]);

        let err = graph.load_order().unwrap_err();
        assert_eq!(err.node, "A");
        assert!(err.to_string().contains("Circular dependency"));

        // The graph and cycle check are still usable afterwards.
        assert_eq!(graph.edge_count(), 2);
        assert!(graph.has_cycles());
    }

    #[test]
    fn test_load_order_self_loop_fails() {
        let graph = graph_of(&[("A", "A")]);
        assert_eq!(graph.load_order().unwrap_err().node, "A");
    }

    #[test]
    fn test_cycle_groups_multiple() {
        let graph = graph_of(&[
            ("a", "b"),
            ("b", "a"),
            ("c", "d"),
            ("d", "e"),
            ("e", "c"),
            ("f", "f"),
            ("a", "g"),
        ]);

        let cycles = graph.cycle_groups();
        assert_eq!(cycles.len(), 3);
        assert_eq!(cycles[0].members, vec!["a", "b"]);
        assert_eq!(cycles[1].members, vec!["c", "d", "e"]);
        assert_eq!(cycles[2].members, vec!["f"]);
        assert_eq!(cycles[1].cycle_path(), "c -> d -> e -> c");
        assert_eq!(cycles[2].cycle_path(), "f -> f");

        let in_cycles = graph.packages_in_cycles();
        assert!(in_cycles.contains("e"));
        assert!(!in_cycles.contains("g"));
    }

    #[test]
    fn test_has_cycles_agrees_with_cycle_groups_on_diamond_ladder() {
        // Each rung doubles the number of paths has_cycles walks.
        let mut edges = Vec::new();
        let names: Vec<String> = (0..=12).map(|i| format!("n{i:02}")).collect();
        let lefts: Vec<String> = (0..12).map(|i| format!("l{i:02}")).collect();
        let rights: Vec<String> = (0..12).map(|i| format!("r{i:02}")).collect();
        for i in 0..12 {
            edges.push((names[i].as_str(), lefts[i].as_str()));
            edges.push((names[i].as_str(), rights[i].as_str()));
            edges.push((lefts[i].as_str(), names[i + 1].as_str()));
            edges.push((rights[i].as_str(), names[i + 1].as_str()));
        }
        let mut graph = graph_of(&edges);
        assert!(!graph.has_cycles());
        assert!(graph.cycle_groups().is_empty());

        graph.add_edge("n12", "n00");
        assert!(graph.has_cycles());
        assert_eq!(graph.cycle_groups().len(), 1);
    }

    #[test]
    fn test_cycle_path_follows_recorded_edges() {
        let graph = graph_of(&[("a", "c"), ("c", "b"), ("b", "a")]);

        let cycles = graph.cycle_groups();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members, vec!["a", "b", "c"]);
        assert_eq!(cycles[0].nodes, vec!["a", "c", "b"]);
        assert_eq!(cycles[0].cycle_path(), "a -> c -> b -> a");

        let nodes = &cycles[0].nodes;
        for (i, from) in nodes.iter().enumerate() {
            let to = &nodes[(i + 1) % nodes.len()];
            assert!(
                graph.dependencies_of(from).is_some_and(|deps| deps.contains(to)),
                "{from} -> {to} is not a recorded edge"
            );
        }
    }

    #[test]
    fn test_cycle_group_larger_than_its_cycle() {
        // a <-> b and a <-> c share a group, but no single cycle visits all three
        let graph = graph_of(&[("a", "b"), ("b", "a"), ("a", "c"), ("c", "a")]);

        let cycles = graph.cycle_groups();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].members, vec!["a", "b", "c"]);
        assert_eq!(cycles[0].cycle_path(), "a -> b -> a");
        assert_eq!(cycles[0].len(), 3);
        assert!(graph.packages_in_cycles().contains("c"));
    }

    #[test]
    fn test_cycle_groups_none() {
        let graph = graph_of(&[("a", "b"), ("b", "c")]);
        assert!(graph.cycle_groups().is_empty());
        assert!(graph.packages_in_cycles().is_empty());
    }

    #[test]
    fn test_cycle_info_cycle_path() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let cycle = CycleInfo {
            nodes: names.clone(),
            members: names,
        };
        assert_eq!(cycle.cycle_path(), "a -> b -> c -> a");
        assert_eq!(cycle.len(), 3);
    }

    #[test]
    fn test_cycle_info_empty() {
        let cycle = CycleInfo {
            nodes: vec![],
            members: vec![],
        };
        assert!(cycle.is_empty());
        assert_eq!(cycle.cycle_path(), "");
    }
}
