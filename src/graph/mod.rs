//! Graph module for dependency relationship modeling.
//!
//! - [`DependencyGraph`] stores resolved packages and their direct dependencies
//! - [`Traversal`] populates it from a [`crate::source::MetadataSource`]
//! - the analyzer methods (`has_cycles`, `load_order`, `cycle_groups`)
//!   answer questions about the finished graph without any I/O
//!
//! # Example
//!
//! ```rust
//! use depscope::graph::DependencyGraph;
//! use depscope::source::FixtureRepository;
//!
//! let repo = FixtureRepository::parse_str("A: B\nB: A").unwrap();
//! let mut graph = DependencyGraph::new();
//! graph.traverse_iterative("A", 5, &repo);
//!
//! assert!(graph.has_cycles());
//! assert!(graph.load_order().is_err());
//! ```

mod analyzer;
mod dependency_graph;
mod traversal;

pub use analyzer::{CycleError, CycleInfo};
pub use dependency_graph::{Adjacency, DependencyGraph};
pub use traversal::{
    Traversal, TraversalMode, VisitedSet, LATEST_VERSION, MAX_DEPTH_LIMIT,
};
