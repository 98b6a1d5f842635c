//! Export functionality for dependency analysis results.
//!
//! This module provides exporters for outputting a finished analysis
//! in various formats: JSON, CSV, and Markdown. The graph itself is
//! written as DOT by [`DependencyGraph::to_dot`].

pub mod csv;
pub mod json;
pub mod markdown;

use crate::compare::OrderComparison;
use crate::graph::{Adjacency, CycleError, CycleInfo, DependencyGraph, TraversalMode};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// JSON format - machine-readable, full data
    Json,
    /// CSV format - one row per package
    Csv,
    /// Markdown format - documentation/reporting
    #[serde(alias = "md")]
    Markdown,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(format!(
                "Unknown export format: '{}'. Valid formats: json, csv, markdown",
                s
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Data container for export operations.
///
/// Holds all the analysis results that can be exported.
#[derive(Debug, Clone)]
pub struct ExportData {
    /// Root package the traversal started from
    pub root_package: String,
    /// Version token the root was fetched with
    pub root_version: String,
    /// Depth bound the traversal ran with
    pub max_depth: usize,
    /// Which traversal driver built the graph
    pub traversal: TraversalMode,
    /// Resolved packages and their direct dependencies
    pub dependencies: Adjacency,
    /// Whether any recorded edge closes a cycle
    pub has_cycles: bool,
    /// Detected circular dependency groups
    pub cycles: Vec<CycleInfo>,
    /// Load order, or the cycle that prevented one
    pub load_order: Result<Vec<String>, CycleError>,
    /// Diff against npm's install order, when it was run
    pub comparison: Option<OrderComparison>,
}

impl ExportData {
    /// Create new export data from a finished graph.
    pub fn new(
        root_package: impl Into<String>,
        root_version: impl Into<String>,
        graph: &DependencyGraph,
    ) -> Self {
        Self {
            root_package: root_package.into(),
            root_version: root_version.into(),
            max_depth: 0,
            traversal: TraversalMode::default(),
            dependencies: graph.snapshot(),
            has_cycles: graph.has_cycles(),
            cycles: graph.cycle_groups(),
            load_order: graph.load_order(),
            comparison: None,
        }
    }

    /// Record the traversal settings that produced the graph.
    pub fn with_traversal(mut self, mode: TraversalMode, max_depth: usize) -> Self {
        self.traversal = mode;
        self.max_depth = max_depth;
        self
    }

    /// Attach an npm comparison result.
    pub fn with_comparison(mut self, comparison: Option<OrderComparison>) -> Self {
        self.comparison = comparison;
        self
    }

    /// Every package name: resolved ones plus unresolved references, sorted.
    pub fn packages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .dependencies
            .iter()
            .flat_map(|(pkg, deps)| {
                std::iter::once(pkg.as_str()).chain(deps.iter().map(String::as_str))
            })
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Number of packages whose dependencies were resolved
    pub fn resolved_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Number of dependency edges
    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(|deps| deps.len()).sum()
    }

    /// Position of a package in the load order, if one exists.
    pub fn load_position(&self, package: &str) -> Option<usize> {
        self.load_order
            .as_ref()
            .ok()?
            .iter()
            .position(|p| p == package)
    }

    /// Whether a package belongs to any cycle group.
    pub fn in_cycle(&self, package: &str) -> bool {
        self.cycles
            .iter()
            .any(|c| c.members.iter().any(|n| n == package))
    }
}

/// Trait for exporters.
pub trait Exporter {
    /// Export the data to the given writer.
    fn export<W: Write>(&self, data: &ExportData, writer: &mut W) -> io::Result<()>;
}

/// Export data in the specified format.
pub fn export<W: Write>(
    format: ExportFormat,
    data: &ExportData,
    writer: &mut W,
) -> io::Result<()> {
    match format {
        ExportFormat::Json => json::JsonExporter.export(data, writer),
        ExportFormat::Csv => csv::CsvExporter.export(data, writer),
        ExportFormat::Markdown => markdown::MarkdownExporter.export(data, writer),
    }
}

/// Export data to a string.
pub fn export_to_string(format: ExportFormat, data: &ExportData) -> io::Result<String> {
    let mut buffer = Vec::new();
    export(format, data, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
