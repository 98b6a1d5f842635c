//! Terminal output helpers
//!
//! Currently the ASCII dependency tree printed for the `ascii_tree` option.

pub mod tree;

pub use tree::{NodeNote, TreeNode};
