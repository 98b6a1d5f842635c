//! ASCII tree rendering of a dependency graph
//!
//! Builds a `TreeNode` hierarchy from a [`DependencyGraph`] rooted at one
//! package, flattens it, and prints it with box-drawing connectors:
//!
//! ```text
//! A
//! ├── B
//! │   └── C
//! └── C (deduped)
//! ```

use std::collections::HashSet;
use std::fmt;

use crate::graph::DependencyGraph;

/// Why a tree node is a leaf even though the package may have dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeNote {
    /// The package is one of its own ancestors
    Cycle,
    /// Already printed in full earlier in the tree
    Deduped,
    /// Never resolved (cut by the depth limit or filtered traversal)
    NotExpanded,
}

impl fmt::Display for NodeNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle => write!(f, "cycle"),
            Self::Deduped => write!(f, "deduped"),
            Self::NotExpanded => write!(f, "not expanded"),
        }
    }
}

/// A node in the dependency tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Package name
    pub name: String,
    /// Child dependencies
    pub children: Vec<TreeNode>,
    /// Depth in the tree (0 = root)
    pub depth: usize,
    /// Set when the node was cut short
    pub note: Option<NodeNote>,
}

impl TreeNode {
    /// Create a new tree node
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            depth: 0,
            note: None,
        }
    }

    fn with_note(name: impl Into<String>, note: NodeNote) -> Self {
        Self {
            note: Some(note),
            ..Self::new(name)
        }
    }

    /// Add a child node
    pub fn add_child(&mut self, mut child: TreeNode) {
        child.set_depth(self.depth + 1);
        self.children.push(child);
    }

    fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
        for child in &mut self.children {
            child.set_depth(depth + 1);
        }
    }

    /// Check if this node has children
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Total number of nodes in this subtree, including itself
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    /// Always false; a tree has at least its root
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Builds the tree below `root`.
    ///
    /// Every package is expanded at most once; later occurrences are
    /// marked [`NodeNote::Deduped`], back-references to an ancestor
    /// [`NodeNote::Cycle`].
    pub fn from_graph(graph: &DependencyGraph, root: &str) -> Self {
        let mut expanded = HashSet::new();
        let mut ancestors = Vec::new();
        build(graph, root, &mut ancestors, &mut expanded)
    }

    /// Flatten the tree into a list for rendering
    pub fn flatten(&self) -> Vec<FlattenedNode> {
        let mut result = Vec::new();
        self.flatten_recursive(&mut result, &mut Vec::new(), true);
        result
    }

    fn flatten_recursive(
        &self,
        result: &mut Vec<FlattenedNode>,
        ancestors_are_last: &mut Vec<bool>,
        is_last: bool,
    ) {
        result.push(FlattenedNode {
            name: self.name.clone(),
            depth: self.depth,
            is_last_child: is_last,
            ancestors_are_last: ancestors_are_last.clone(),
            note: self.note,
        });

        if self.depth > 0 {
            ancestors_are_last.push(is_last);
        }
        let child_count = self.children.len();
        for (i, child) in self.children.iter().enumerate() {
            child.flatten_recursive(result, ancestors_are_last, i + 1 == child_count);
        }
        if self.depth > 0 {
            ancestors_are_last.pop();
        }
    }

    /// Renders the tree as text, one package per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for node in self.flatten() {
            out.push_str(&node.tree_prefix());
            out.push_str(&node.name);
            if let Some(note) = node.note {
                out.push_str(&format!(" ({})", note));
            }
            out.push('\n');
        }
        out
    }
}

fn build(
    graph: &DependencyGraph,
    name: &str,
    ancestors: &mut Vec<String>,
    expanded: &mut HashSet<String>,
) -> TreeNode {
    let Some(deps) = graph.dependencies_of(name) else {
        return TreeNode::with_note(name, NodeNote::NotExpanded);
    };
    if !expanded.insert(name.to_string()) {
        return TreeNode::with_note(name, NodeNote::Deduped);
    }

    let mut node = TreeNode::new(name);
    ancestors.push(name.to_string());
    for dep in deps {
        let child = if ancestors.iter().any(|a| a == dep) {
            TreeNode::with_note(dep.as_str(), NodeNote::Cycle)
        } else {
            build(graph, dep, ancestors, expanded)
        };
        node.add_child(child);
    }
    ancestors.pop();
    node
}

/// A flattened representation of a tree node for rendering
#[derive(Debug, Clone)]
pub struct FlattenedNode {
    /// Package name
    pub name: String,
    /// Depth in the tree
    pub depth: usize,
    /// Whether this is the last child of its parent
    pub is_last_child: bool,
    /// For each non-root ancestor, whether it was the last of its siblings
    pub ancestors_are_last: Vec<bool>,
    /// Why the node was cut short, if it was
    pub note: Option<NodeNote>,
}

impl FlattenedNode {
    /// Build the tree prefix (indentation and branch lines)
    pub fn tree_prefix(&self) -> String {
        let mut prefix = String::new();

        for &is_last in &self.ancestors_are_last {
            if is_last {
                prefix.push_str("    ");
            } else {
                prefix.push_str("│   ");
            }
        }

        if self.depth > 0 {
            if self.is_last_child {
                prefix.push_str("└── ");
            } else {
                prefix.push_str("├── ");
            }
        }

        prefix
    }
}
