//! Metadata sources for dependency resolution.
//!
//! A [`MetadataSource`] answers one question: given a package name and a
//! version token, what are its direct dependencies? The traversal in
//! [`crate::graph`] only ever talks to this trait, so the live registry and
//! the offline fixture are interchangeable and picked once at startup.
//!
//! # Sources
//!
//! - [`NpmRegistry`] - live npm registry over HTTP
//! - [`NuGetRegistry`] - live NuGet flat container, reading `.nuspec` files out of `.nupkg` archives
//! - [`FixtureRepository`] - flat-file `NAME: DEP1, DEP2` fixture for offline runs
//!
//! # Example
//!
//! ```
//! use depscope::source::{FixtureRepository, MetadataSource};
//!
//! let repo = FixtureRepository::parse_str("app: lodash, react\nreact:").unwrap();
//! let deps = repo.fetch_dependencies("app", "latest").unwrap();
//! assert_eq!(deps.keys().collect::<Vec<_>>(), vec!["lodash", "react"]);
//! ```

pub mod fixture;
pub mod npm;
pub mod nuget;

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub use fixture::{load_fixture_graph, FixtureParseError, FixtureRepository};
pub use npm::{NpmRegistry, DEFAULT_REGISTRY_URL};
pub use nuget::{NuGetRegistry, DEFAULT_NUGET_URL};

/// Direct dependencies of one package: name -> version string.
///
/// The version is informational only; graph identity is the name. A
/// `BTreeMap` keeps iteration sorted so traversal order is deterministic.
pub type DirectDependencies = BTreeMap<String, String>;

/// Errors a metadata source can report for a single package.
///
/// None of these abort a traversal: the node being expanded is treated as
/// having no dependencies and the walk moves on.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The package (or requested version) does not exist in the source.
    #[error("Package not found: {package}@{version}")]
    NotFound { package: String, version: String },

    /// Transport-level failure talking to the source.
    #[error("Network error fetching {package}: {message}")]
    Network { package: String, message: String },

    /// The source answered but the metadata could not be decoded.
    #[error("Failed to parse metadata for {package}: {message}")]
    Parse { package: String, message: String },

    /// The fetch did not finish in time.
    #[error("Timed out after {elapsed:?} fetching {package}")]
    Timeout { package: String, elapsed: Duration },
}

impl FetchError {
    /// The package this error was reported for.
    pub fn package(&self) -> &str {
        match self {
            Self::NotFound { package, .. }
            | Self::Network { package, .. }
            | Self::Parse { package, .. }
            | Self::Timeout { package, .. } => package,
        }
    }
}

/// Which live registry a run talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    #[default]
    Npm,
    Nuget,
}

impl RegistryKind {
    /// Base URL used when the configuration does not name one.
    pub fn default_url(self) -> &'static str {
        match self {
            Self::Npm => DEFAULT_REGISTRY_URL,
            Self::Nuget => DEFAULT_NUGET_URL,
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npm => write!(f, "npm"),
            Self::Nuget => write!(f, "nuget"),
        }
    }
}

/// Sends a GET and maps transport failures and non-success statuses onto
/// [`FetchError`]. A 404 means the package or version does not exist.
pub(crate) fn get_checked(
    client: &Client,
    url: &str,
    package: &str,
    version: &str,
    timeout: Duration,
) -> Result<Response, FetchError> {
    let started = Instant::now();
    let response = client.get(url).send().map_err(|e| {
        if e.is_timeout() {
            FetchError::Timeout {
                package: package.to_string(),
                elapsed: started.elapsed().min(timeout),
            }
        } else {
            FetchError::Network {
                package: package.to_string(),
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound {
            package: package.to_string(),
            version: version.to_string(),
        });
    }
    if !status.is_success() {
        return Err(FetchError::Network {
            package: package.to_string(),
            message: format!("registry responded with HTTP {}", status),
        });
    }
    Ok(response)
}

/// A place direct dependencies can be looked up from.
pub trait MetadataSource {
    /// Fetches the direct dependencies of `package` at `version`.
    fn fetch_dependencies(
        &self,
        package: &str,
        version: &str,
    ) -> Result<DirectDependencies, FetchError>;
}

impl<S: MetadataSource + ?Sized> MetadataSource for &S {
    fn fetch_dependencies(
        &self,
        package: &str,
        version: &str,
    ) -> Result<DirectDependencies, FetchError> {
        (**self).fetch_dependencies(package, version)
    }
}

impl<S: MetadataSource + ?Sized> MetadataSource for Box<S> {
    fn fetch_dependencies(
        &self,
        package: &str,
        version: &str,
    ) -> Result<DirectDependencies, FetchError> {
        (**self).fetch_dependencies(package, version)
    }
}
