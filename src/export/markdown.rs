//! Markdown export implementation.
//!
//! Exports dependency analysis results in Markdown format for documentation and reporting.

use super::{ExportData, Exporter};
use crate::compare::DIFFERENCE_REASONS;
use std::io::{self, Write};

/// Markdown exporter implementation.
pub struct MarkdownExporter;

impl Exporter for MarkdownExporter {
    fn export<W: Write>(&self, data: &ExportData, writer: &mut W) -> io::Result<()> {
        // Title
        writeln!(writer, "# Dependency Analysis Report")?;
        writeln!(writer)?;
        writeln!(
            writer,
            "**Root:** {}@{} ({} traversal, max depth {})",
            data.root_package, data.root_version, data.traversal, data.max_depth
        )?;
        writeln!(writer)?;

        // Summary section
        writeln!(writer, "## Summary")?;
        writeln!(writer)?;
        writeln!(writer, "| Metric | Count |")?;
        writeln!(writer, "|--------|-------|")?;
        writeln!(writer, "| Packages | {} |", data.packages().len())?;
        writeln!(writer, "| Resolved | {} |", data.resolved_count())?;
        writeln!(writer, "| Edges | {} |", data.edge_count())?;
        writeln!(writer, "| Cycle Groups | {} |", data.cycles.len())?;
        writeln!(writer)?;

        // Dependencies
        writeln!(writer, "## Dependencies")?;
        writeln!(writer)?;
        if data.dependencies.is_empty() {
            writeln!(writer, "(no dependencies)")?;
        } else {
            writeln!(writer, "| Package | Direct Dependencies |")?;
            writeln!(writer, "|---------|---------------------|")?;
            for (pkg, deps) in &data.dependencies {
                let list = if deps.is_empty() {
                    "-".to_string()
                } else {
                    deps.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
                };
                writeln!(writer, "| {} | {} |", pkg, list)?;
            }
        }
        writeln!(writer)?;

        // Load order
        writeln!(writer, "## Load Order")?;
        writeln!(writer)?;
        match &data.load_order {
            Ok(order) => {
                for (i, pkg) in order.iter().enumerate() {
                    writeln!(writer, "{}. {}", i + 1, pkg)?;
                }
            }
            Err(err) => writeln!(writer, "**Error:** {}", err)?,
        }
        writeln!(writer)?;

        // Circular dependencies
        if !data.cycles.is_empty() {
            writeln!(writer, "## Circular Dependencies")?;
            writeln!(writer)?;
            writeln!(
                writer,
                "The following circular dependencies were detected:"
            )?;
            writeln!(writer)?;
            for (i, cycle) in data.cycles.iter().enumerate() {
                writeln!(writer, "{}. `{}`", i + 1, cycle.cycle_path())?;
            }
            writeln!(writer)?;
        }

        if let Some(cmp) = &data.comparison {
            writeln!(writer, "## npm Comparison")?;
            writeln!(writer)?;
            writeln!(writer, "| Metric | Count |")?;
            writeln!(writer, "|--------|-------|")?;
            writeln!(writer, "| Our order | {} |", cmp.our_len)?;
            writeln!(writer, "| npm order | {} |", cmp.their_len)?;
            writeln!(writer, "| Common | {} |", cmp.common.len())?;
            writeln!(writer, "| Only ours | {} |", cmp.only_ours.len())?;
            writeln!(writer, "| Only npm | {} |", cmp.only_theirs.len())?;
            writeln!(writer)?;

            if cmp.order_matches {
                writeln!(writer, "Orders match exactly.")?;
            } else {
                writeln!(writer, "Orders differ. Possible reasons:")?;
                writeln!(writer)?;
                for reason in DIFFERENCE_REASONS {
                    writeln!(writer, "- {}", reason)?;
                }
            }
            writeln!(writer)?;
        }

        // Footer
        writeln!(writer, "---")?;
        writeln!(writer, "*Generated by depscope*")?;

        Ok(())
    }
}
