//! JSON export implementation.
//!
//! Exports dependency analysis results in JSON format for machine-readable output.

use super::{ExportData, Exporter};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// JSON exporter implementation.
pub struct JsonExporter;

/// Serializable cycle info for JSON output.
#[derive(Serialize)]
struct JsonCycle<'a> {
    packages: &'a [String],
    path: String,
}

/// Load order, or why there is none.
#[derive(Serialize)]
#[serde(untagged)]
enum JsonLoadOrder<'a> {
    Order { order: &'a [String] },
    Failed { error: String, cycle_at: &'a str },
}

/// Summary statistics for JSON output.
#[derive(Serialize)]
struct JsonSummary {
    packages: usize,
    resolved: usize,
    edges: usize,
    has_cycles: bool,
    cycle_groups: usize,
}

#[derive(Serialize)]
struct JsonComparison<'a> {
    order_matches: bool,
    our_count: usize,
    npm_count: usize,
    common: usize,
    only_ours: Vec<&'a str>,
    only_npm: Vec<&'a str>,
}

/// Root JSON export structure.
#[derive(Serialize)]
struct JsonExport<'a> {
    root: JsonRoot<'a>,
    summary: JsonSummary,
    dependencies: BTreeMap<&'a str, Vec<&'a str>>,
    load_order: JsonLoadOrder<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    circular_dependencies: Vec<JsonCycle<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    npm_comparison: Option<JsonComparison<'a>>,
}

#[derive(Serialize)]
struct JsonRoot<'a> {
    package: &'a str,
    version: &'a str,
    max_depth: usize,
    traversal: String,
}

impl Exporter for JsonExporter {
    fn export<W: Write>(&self, data: &ExportData, writer: &mut W) -> io::Result<()> {
        let dependencies: BTreeMap<&str, Vec<&str>> = data
            .dependencies
            .iter()
            .map(|(pkg, deps)| (pkg.as_str(), deps.iter().map(String::as_str).collect()))
            .collect();

        let load_order = match &data.load_order {
            Ok(order) => JsonLoadOrder::Order { order },
            Err(err) => JsonLoadOrder::Failed {
                error: err.to_string(),
                cycle_at: &err.node,
            },
        };

        let circular_dependencies = data
            .cycles
            .iter()
            .map(|c| JsonCycle {
                packages: &c.members,
                path: c.cycle_path(),
            })
            .collect();

        let npm_comparison = data.comparison.as_ref().map(|c| JsonComparison {
            order_matches: c.order_matches,
            our_count: c.our_len,
            npm_count: c.their_len,
            common: c.common.len(),
            only_ours: c.only_ours.iter().map(String::as_str).collect(),
            only_npm: c.only_theirs.iter().map(String::as_str).collect(),
        });

        let export = JsonExport {
            root: JsonRoot {
                package: &data.root_package,
                version: &data.root_version,
                max_depth: data.max_depth,
                traversal: data.traversal.to_string(),
            },
            summary: JsonSummary {
                packages: data.packages().len(),
                resolved: data.resolved_count(),
                edges: data.edge_count(),
                has_cycles: data.has_cycles,
                cycle_groups: data.cycles.len(),
            },
            dependencies,
            load_order,
            circular_dependencies,
            npm_comparison,
        };

        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        writeln!(writer, "{}", json)
    }
}
