//! CSV export implementation.
//!
//! One row per package, suitable for spreadsheets.

use super::{ExportData, Exporter};
use std::io::{self, Write};

/// CSV exporter implementation.
pub struct CsvExporter;

impl CsvExporter {
    /// Escape a field value for CSV format.
    ///
    /// Wraps the value in quotes if it contains commas, quotes, or newlines.
    fn escape_field(value: &str) -> String {
        if value.contains(',') || value.contains('"') || value.contains('\n') {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }
}

impl Exporter for CsvExporter {
    fn export<W: Write>(&self, data: &ExportData, writer: &mut W) -> io::Result<()> {
        writeln!(
            writer,
            "name,resolved,dependency_count,dependencies,in_cycle,load_position"
        )?;

        for name in data.packages() {
            let deps = data.dependencies.get(name);
            let dep_list = deps
                .map(|d| d.iter().map(String::as_str).collect::<Vec<_>>().join(";"))
                .unwrap_or_default();
            // Empty when no load order exists
            let position = data
                .load_position(name)
                .map(|p| p.to_string())
                .unwrap_or_default();

            writeln!(
                writer,
                "{},{},{},{},{},{}",
                Self::escape_field(name),
                deps.is_some(),
                deps.map_or(0, |d| d.len()),
                Self::escape_field(&dep_list),
                data.in_cycle(name),
                position
            )?;
        }

        Ok(())
    }
}
