//! Bounded-depth dependency traversal.
//!
//! A [`Traversal`] owns the state of one walk (visited set, deadline clock)
//! and writes edges into a borrowed [`DependencyGraph`]. Two drivers share
//! the same rules:
//!
//! - a node reached at `depth >= max_depth` is not expanded;
//! - a node already visited in this walk is reported and not expanded again,
//!   which also means a package shared by two parents is expanded only once,
//!   at the depth it was first reached;
//! - a fetch failure only affects the node being expanded, which is then
//!   treated as having no dependencies.
//!
//! [`Traversal::run_recursive`] walks on the call stack.
//! [`Traversal::run_iterative`] replays the same walk from an explicit work
//! queue, so both produce the same visited set and the same edges.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::DependencyGraph;
use crate::source::{DirectDependencies, MetadataSource};

/// Upper bound applied to any requested depth.
pub const MAX_DEPTH_LIMIT: usize = 64;

/// Version token used for every package below the root.
pub const LATEST_VERSION: &str = "latest";

/// Packages expanded during one traversal.
pub type VisitedSet = HashSet<String>;

/// Which driver to use for a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalMode {
    /// Depth-first on the call stack
    #[default]
    Recursive,
    /// Depth-first from an explicit work queue
    Iterative,
}

impl fmt::Display for TraversalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recursive => write!(f, "recursive"),
            Self::Iterative => write!(f, "iterative"),
        }
    }
}

/// One traversal run over a metadata source.
///
/// # Example
///
/// ```rust
/// use depscope::graph::{DependencyGraph, Traversal};
/// use depscope::source::FixtureRepository;
///
/// let repo = FixtureRepository::parse_str("A: B, C\nB: C\nC:").unwrap();
/// let mut graph = DependencyGraph::new();
///
/// let visited = Traversal::new(&mut graph, &repo, 3).run_recursive("A");
///
/// assert_eq!(visited.len(), 3);
/// assert!(!graph.has_cycles());
/// assert_eq!(graph.load_order().unwrap(), vec!["C", "B", "A"]);
/// ```
pub struct Traversal<'g, S> {
    graph: &'g mut DependencyGraph,
    source: S,
    max_depth: usize,
    root_version: String,
    filter: Option<String>,
    deadline: Option<Duration>,
    visited: VisitedSet,
    started: Instant,
    deadline_reported: bool,
}

impl<'g, S: MetadataSource> Traversal<'g, S> {
    /// Prepares a traversal writing into `graph`.
    ///
    /// `max_depth` is clamped to [`MAX_DEPTH_LIMIT`].
    pub fn new(graph: &'g mut DependencyGraph, source: S, max_depth: usize) -> Self {
        let max_depth = if max_depth > MAX_DEPTH_LIMIT {
            warn!(
                requested = max_depth,
                limit = MAX_DEPTH_LIMIT,
                "Requested depth exceeds limit, clamping"
            );
            MAX_DEPTH_LIMIT
        } else {
            max_depth
        };

        Self {
            graph,
            source,
            max_depth,
            root_version: LATEST_VERSION.to_string(),
            filter: None,
            deadline: None,
            visited: VisitedSet::new(),
            started: Instant::now(),
            deadline_reported: false,
        }
    }

    /// Version token for the start package. Everything below it is fetched
    /// as [`LATEST_VERSION`].
    pub fn with_root_version(mut self, version: impl Into<String>) -> Self {
        self.root_version = version.into();
        self
    }

    /// Skips (neither records nor expands) dependencies whose name contains
    /// `substring`. An empty substring disables filtering.
    pub fn with_filter(mut self, substring: impl Into<String>) -> Self {
        let substring = substring.into();
        self.filter = (!substring.is_empty()).then_some(substring);
        self
    }

    /// Stops fetching once `deadline` has elapsed since the run started.
    /// Nodes visited after that are treated as having no dependencies.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The effective (clamped) depth bound.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Runs with the selected driver.
    pub fn run(self, mode: TraversalMode, start: &str) -> VisitedSet {
        match mode {
            TraversalMode::Recursive => self.run_recursive(start),
            TraversalMode::Iterative => self.run_iterative(start),
        }
    }

    /// Depth-first expansion on the call stack.
    pub fn run_recursive(mut self, start: &str) -> VisitedSet {
        self.started = Instant::now();
        self.expand_recursive(start, 0);
        self.visited
    }

    fn expand_recursive(&mut self, package: &str, depth: usize) {
        if !self.enter(package, depth) {
            return;
        }

        for dep in self.expand(package, depth) {
            if self.visited.contains(&dep) {
                debug!(package = %dep, parent = package, "Already visited");
            } else {
                self.expand_recursive(&dep, depth + 1);
            }
        }
    }

    /// Same walk as [`Self::run_recursive`], driven by a work queue of
    /// `(package, depth)` pairs.
    ///
    /// Children go to the front of the queue in declaration order, so a
    /// subtree finishes before its next sibling starts, exactly as on the
    /// call stack.
    pub fn run_iterative(mut self, start: &str) -> VisitedSet {
        self.started = Instant::now();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        queue.push_back((start.to_string(), 0));

        while let Some((package, depth)) = queue.pop_front() {
            if !self.enter(&package, depth) {
                continue;
            }

            let mut children = Vec::new();
            for dep in self.expand(&package, depth) {
                if self.visited.contains(&dep) {
                    debug!(package = %dep, parent = %package, "Already visited");
                } else {
                    children.push((dep, depth + 1));
                }
            }
            for child in children.into_iter().rev() {
                queue.push_front(child);
            }
        }

        self.visited
    }

    /// Applies the depth and already-visited rules and marks the node.
    /// Returns false if the node must not be expanded.
    fn enter(&mut self, package: &str, depth: usize) -> bool {
        if depth >= self.max_depth {
            debug!(package, depth, "Max depth reached");
            return false;
        }
        if self.visited.contains(package) {
            info!(package, depth, "Cyclic dependency detected, not expanding again");
            return false;
        }

        self.visited.insert(package.to_string());
        debug!(package, depth, "Processing");
        true
    }

    /// Resolves a node, records its edges and returns the dependencies to
    /// follow.
    fn expand(&mut self, package: &str, depth: usize) -> Vec<String> {
        let deps = self.fetch(package, depth);
        self.graph.add_node(package);
        debug!(package, count = deps.len(), "Dependencies found");

        let mut follow = Vec::with_capacity(deps.len());
        for (dep, version) in deps {
            if self.is_filtered(&dep) {
                debug!(package, dependency = %dep, "Filtered out");
                continue;
            }
            trace!(package, dependency = %dep, %version, "Recording edge");
            self.graph.add_edge(package, &dep);
            follow.push(dep);
        }
        follow
    }

    fn fetch(&mut self, package: &str, depth: usize) -> DirectDependencies {
        if self.deadline_passed() {
            debug!(package, "Traversal deadline passed, not fetching");
            return DirectDependencies::new();
        }

        let version = if depth == 0 {
            self.root_version.as_str()
        } else {
            LATEST_VERSION
        };

        match self.source.fetch_dependencies(package, version) {
            Ok(deps) => deps,
            Err(e) => {
                warn!(package, depth, error = %e, "Error processing package, treating as having no dependencies");
                DirectDependencies::new()
            }
        }
    }

    fn deadline_passed(&mut self) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        let passed = self.started.elapsed() >= deadline;
        if passed && !self.deadline_reported {
            warn!(?deadline, "Traversal deadline passed, remaining packages get no dependencies");
            self.deadline_reported = true;
        }
        passed
    }

    fn is_filtered(&self, name: &str) -> bool {
        self.filter
            .as_deref()
            .is_some_and(|substring| name.contains(substring))
    }
}

impl DependencyGraph {
    /// Recursive traversal from `start` with a fresh visited set.
    pub fn traverse_recursive<S: MetadataSource>(
        &mut self,
        start: &str,
        max_depth: usize,
        source: S,
    ) -> VisitedSet {
        Traversal::new(self, source, max_depth).run_recursive(start)
    }

    /// Work-queue traversal from `start` with a fresh visited set.
    pub fn traverse_iterative<S: MetadataSource>(
        &mut self,
        start: &str,
        max_depth: usize,
        source: S,
    ) -> VisitedSet {
        Traversal::new(self, source, max_depth).run_iterative(start)
    }
}
