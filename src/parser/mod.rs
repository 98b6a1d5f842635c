//! Parser module for package manifests.
//!
//! The npm registry serves each published version as a JSON document with
//! the same layout as the package's package.json. [`package_json`] decodes
//! either one into [`PackageJson`] and flattens its dependency sections.
//! [`nuspec`] reads the XML manifest packed inside a NuGet package.

pub mod nuspec;
pub mod package_json;
pub mod types;

pub use nuspec::parse_nuspec;
pub use package_json::{extract_dependencies, parse_str, ParseError, ParseResult};

pub use types::{Dependency, DependencyType, PackageJson};
