//! Live npm registry client.
//!
//! Fetches `GET {registry}/{name}/{version}` and reads the `dependencies`
//! section of the returned version document. Dev, peer and optional
//! dependencies are not followed.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, trace};

use super::{get_checked, DirectDependencies, FetchError, MetadataSource};
use crate::parser::{extract_dependencies, parse_str, DependencyType};

/// Public npm registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Blocking npm registry client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl NpmRegistry {
    /// Creates a client for `base_url` whose requests give up after `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("depscope/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Builds the version document URL. Scoped names keep their `@` but
    /// have the `/` escaped, as the registry expects.
    pub fn version_url(&self, package: &str, version: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            package.replace('/', "%2F"),
            version
        )
    }
}

impl MetadataSource for NpmRegistry {
    fn fetch_dependencies(
        &self,
        package: &str,
        version: &str,
    ) -> Result<DirectDependencies, FetchError> {
        let url = self.version_url(package, version);
        debug!(%url, "Fetching package metadata");

        let body = get_checked(&self.client, &url, package, version, self.timeout)?
            .text()
            .map_err(|e| FetchError::Network {
                package: package.to_string(),
                message: e.to_string(),
            })?;

        let manifest = parse_str(&body).map_err(|e| FetchError::Parse {
            package: package.to_string(),
            message: e.to_string(),
        })?;

        let mut deps = DirectDependencies::new();
        for dep in extract_dependencies(&manifest) {
            if dep.dep_type == DependencyType::Production {
                deps.insert(dep.name, dep.version);
            } else {
                trace!(package, dependency = %dep, kind = dep.dep_type.label(), "Not following");
            }
        }

        debug!(
            package,
            followed = deps.len(),
            skipped = manifest.unfollowed_count(),
            "Resolved metadata"
        );
        Ok(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION_DOC: &str = r#"{
        "name": "react-dom",
        "version": "18.2.0",
        "dependencies": {"loose-envify": "^1.1.0", "scheduler": "^0.23.0"},
        "peerDependencies": {"react": "^18.2.0"}
    }"#;

    fn registry(url: String) -> NpmRegistry {
        NpmRegistry::new(url, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_version_url() {
        let reg = registry("https://registry.example.com/".to_string());

        assert_eq!(
            reg.version_url("react", "latest"),
            "https://registry.example.com/react/latest"
        );
        assert_eq!(
            reg.version_url("@types/node", "20.1.0"),
            "https://registry.example.com/@types%2Fnode/20.1.0"
        );
    }

    #[test]
    fn test_fetch_runtime_dependencies_only() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/react-dom/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(VERSION_DOC)
            .create();

        let deps = registry(server.url())
            .fetch_dependencies("react-dom", "latest")
            .unwrap();

        mock.assert();
        assert_eq!(
            deps.keys().collect::<Vec<_>>(),
            vec!["loose-envify", "scheduler"]
        );
        assert_eq!(deps["scheduler"], "^0.23.0");
    }

    #[test]
    fn test_fetch_without_dependencies_section() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/left-pad/1.3.0")
            .with_status(200)
            .with_body(r#"{"name": "left-pad", "version": "1.3.0"}"#)
            .create();

        let deps = registry(server.url())
            .fetch_dependencies("left-pad", "1.3.0")
            .unwrap();
        assert!(deps.is_empty());
    }

    #[test]
    fn test_fetch_not_found() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/no-such-package/latest")
            .with_status(404)
            .with_body(r#"{"error": "Not found"}"#)
            .create();

        let err = registry(server.url())
            .fetch_dependencies("no-such-package", "latest")
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_fetch_server_error_is_network() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/flaky/latest")
            .with_status(503)
            .create();

        let err = registry(server.url())
            .fetch_dependencies("flaky", "latest")
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_fetch_garbage_body_is_parse_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/broken/latest")
            .with_status(200)
            .with_body("<html>definitely not json</html>")
            .create();

        let err = registry(server.url())
            .fetch_dependencies("broken", "latest")
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn test_fetch_unreachable_registry_is_network() {
        // Nothing listens on port 9 on loopback in test environments.
        let err = registry("http://127.0.0.1:9".to_string())
            .fetch_dependencies("react", "latest")
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Network { .. } | FetchError::Timeout { .. }
        ));
    }
}
