//! Flat-file fixture repository for offline, deterministic runs.
//!
//! The format is line oriented:
//!
//! ```text
//! # comment
//! A: B, C
//! B: C
//! C:
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. A package listed
//! more than once has its dependency lists merged. Unlike registry fetch
//! errors, a malformed fixture is fatal: a half-parsed test repository
//! cannot be trusted.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use tracing::debug;

use super::{DirectDependencies, FetchError, MetadataSource};

/// Version string reported for every fixture dependency.
const FIXTURE_VERSION: &str = "*";

/// Errors that can occur while loading a fixture repository.
#[derive(Debug, thiserror::Error)]
pub enum FixtureParseError {
    /// Failed to read the fixture file from disk.
    #[error("Failed to read fixture: {0}")]
    Io(#[from] std::io::Error),

    /// A non-comment line without the `NAME:` separator.
    #[error("Malformed fixture line {line}: '{content}' (expected 'NAME: DEP1, DEP2')")]
    MalformedLine { line: usize, content: String },

    /// A line whose package name is blank.
    #[error("Empty package name on fixture line {line}")]
    EmptyName { line: usize },
}

/// Parses fixture text into an adjacency mapping.
///
/// Line numbers in errors are 1-based.
///
/// # Example
///
/// ```
/// use depscope::source::fixture::parse_fixture;
///
/// let graph = parse_fixture("A: B, C\n# ignored\n\nB: C").unwrap();
/// assert_eq!(graph["A"].len(), 2);
/// assert!(!graph.contains_key("C"));
/// ```
pub fn parse_fixture(
    content: &str,
) -> Result<HashMap<String, BTreeSet<String>>, FixtureParseError> {
    let mut graph: HashMap<String, BTreeSet<String>> = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((name, deps)) = line.split_once(':') else {
            return Err(FixtureParseError::MalformedLine {
                line: idx + 1,
                content: line.to_string(),
            });
        };

        let name = name.trim();
        if name.is_empty() {
            return Err(FixtureParseError::EmptyName { line: idx + 1 });
        }

        let deps: Vec<&str> = deps
            .split(',')
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .collect();

        // Names are single tokens; a second ':' or inner whitespace means
        // the line was mistyped.
        let malformed = |token: &str| token.contains(':') || token.contains(char::is_whitespace);
        if malformed(name) || deps.iter().any(|d| malformed(d)) {
            return Err(FixtureParseError::MalformedLine {
                line: idx + 1,
                content: line.to_string(),
            });
        }

        graph
            .entry(name.to_string())
            .or_default()
            .extend(deps.into_iter().map(str::to_string));
    }

    Ok(graph)
}

/// Loads a fixture file into an adjacency mapping.
pub fn load_fixture_graph(
    path: &Path,
) -> Result<HashMap<String, BTreeSet<String>>, FixtureParseError> {
    let content = fs::read_to_string(path)?;
    let graph = parse_fixture(&content)?;
    debug!(path = %path.display(), packages = graph.len(), "Loaded fixture repository");
    Ok(graph)
}

/// A [`MetadataSource`] backed by a parsed fixture.
///
/// Packages absent from the fixture resolve to no dependencies rather than
/// an error, so leaves do not need their own `NAME:` line.
#[derive(Debug, Clone, Default)]
pub struct FixtureRepository {
    packages: HashMap<String, BTreeSet<String>>,
}

impl FixtureRepository {
    /// Wraps an already-built adjacency mapping.
    pub fn new(packages: HashMap<String, BTreeSet<String>>) -> Self {
        Self { packages }
    }

    /// Parses fixture text.
    pub fn parse_str(content: &str) -> Result<Self, FixtureParseError> {
        parse_fixture(content).map(Self::new)
    }

    /// Loads a fixture file.
    pub fn from_file(path: &Path) -> Result<Self, FixtureParseError> {
        load_fixture_graph(path).map(Self::new)
    }

    /// Number of packages declared in the fixture.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Returns true if the fixture declares no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl MetadataSource for FixtureRepository {
    fn fetch_dependencies(
        &self,
        package: &str,
        _version: &str,
    ) -> Result<DirectDependencies, FetchError> {
        Ok(self
            .packages
            .get(package)
            .map(|deps| {
                deps.iter()
                    .map(|d| (d.clone(), FIXTURE_VERSION.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
