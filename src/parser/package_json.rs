//! Parser for npm manifests (package.json and registry version documents).

use super::types::{Dependency, DependencyType, PackageJson};

/// Errors that can occur during manifest parsing.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Failed to parse XML content.
    #[error("Failed to parse XML: {0}")]
    XmlError(String),
}

/// Result type alias for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a manifest from a string.
///
/// Unknown fields (scripts, dist, maintainers, ...) are ignored, which is
/// what makes registry documents parse with the package.json model.
///
/// # Example
///
/// ```
/// use depscope::parser::package_json::parse_str;
///
/// let json = r#"{"name": "my-app", "version": "1.0.0", "dist": {"tarball": "x"}}"#;
/// let pkg = parse_str(json).unwrap();
/// assert_eq!(pkg.name, Some("my-app".to_string()));
/// ```
pub fn parse_str(content: &str) -> ParseResult<PackageJson> {
    let pkg: PackageJson = serde_json::from_str(content)?;
    Ok(pkg)
}

/// Extracts all declared dependencies into a flat, typed list.
///
/// Within each category the order is alphabetical.
///
/// # Example
///
/// ```
/// use depscope::parser::package_json::{parse_str, extract_dependencies};
/// use depscope::parser::types::DependencyType;
///
/// let json = r#"{
///     "name": "my-app",
///     "dependencies": {"react": "^18.0.0"},
///     "devDependencies": {"typescript": "^5.0.0"}
/// }"#;
///
/// let pkg = parse_str(json).unwrap();
/// let deps = extract_dependencies(&pkg);
///
/// assert_eq!(deps.len(), 2);
/// assert!(deps.iter().any(|d| d.name == "react" && d.dep_type == DependencyType::Production));
/// ```
pub fn extract_dependencies(pkg: &PackageJson) -> Vec<Dependency> {
    let sections = [
        (&pkg.dependencies, DependencyType::Production),
        (&pkg.dev_dependencies, DependencyType::Development),
        (&pkg.peer_dependencies, DependencyType::Peer),
        (&pkg.optional_dependencies, DependencyType::Optional),
    ];

    sections
        .into_iter()
        .filter_map(|(section, dep_type)| section.as_ref().map(|deps| (deps, dep_type)))
        .flat_map(|(deps, dep_type)| {
            deps.iter()
                .map(move |(name, version)| Dependency::new(name, version, dep_type))
        })
        .collect()
}
