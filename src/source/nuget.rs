//! Live NuGet registry client.
//!
//! Downloads `GET {base}/{id}/{version}/{id}.{version}.nupkg` from a v3
//! flat container, opens the archive, and reads the dependencies declared
//! in its `.nuspec`. Ids and versions are lowercased, as the flat container
//! expects. The `latest` token is resolved through `{base}/{id}/index.json`.

use std::io::{Cursor, Read, Seek};
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, trace};
use zip::ZipArchive;

use super::{get_checked, DirectDependencies, FetchError, MetadataSource};
use crate::graph::LATEST_VERSION;
use crate::parser::parse_nuspec;

/// Public NuGet v3 flat container.
pub const DEFAULT_NUGET_URL: &str = "https://api.nuget.org/v3-flatcontainer";

/// Body of `{base}/{id}/index.json`: every published version, oldest first.
#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: Vec<String>,
}

/// Blocking NuGet client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct NuGetRegistry {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl NuGetRegistry {
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

    /// URL of the `.nupkg` archive for an exact version.
    pub fn package_url(&self, id: &str, version: &str) -> String {
        let id = id.to_ascii_lowercase();
        let version = version.to_ascii_lowercase();
        format!("{}/{id}/{version}/{id}.{version}.nupkg", self.base_url)
    }

    /// URL of the version listing for `id`.
    pub fn index_url(&self, id: &str) -> String {
        format!("{}/{}/index.json", self.base_url, id.to_ascii_lowercase())
    }

    /// Picks the newest stable version, or the newest prerelease when no
    /// stable one exists.
    fn resolve_latest(&self, id: &str) -> Result<String, FetchError> {
        let url = self.index_url(id);
        debug!(%url, "Resolving latest version");

        let body = get_checked(&self.client, &url, id, LATEST_VERSION, self.timeout)?
            .text()
            .map_err(|e| network(id, e))?;
        let index: VersionIndex = serde_json::from_str(&body).map_err(|e| FetchError::Parse {
            package: id.to_string(),
            message: e.to_string(),
        })?;

        index
            .versions
            .iter()
            .rev()
            .find(|v| !v.contains('-'))
            .or_else(|| index.versions.last())
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                package: id.to_string(),
                version: LATEST_VERSION.to_string(),
            })
    }

    fn download_nuspec(&self, id: &str, version: &str) -> Result<String, FetchError> {
        let url = self.package_url(id, version);
        debug!(%url, "Downloading package");

        let bytes = get_checked(&self.client, &url, id, version, self.timeout)?
            .bytes()
            .map_err(|e| network(id, e))?;
        read_nuspec(Cursor::new(bytes)).map_err(|message| FetchError::Parse {
            package: id.to_string(),
            message,
        })
    }
}

fn network(package: &str, error: reqwest::Error) -> FetchError {
    FetchError::Network {
        package: package.to_string(),
        message: error.to_string(),
    }
}

/// Reads the first `.nuspec` entry of a package archive.
fn read_nuspec<R: Read + Seek>(reader: R) -> Result<String, String> {
    let mut archive = ZipArchive::new(reader).map_err(|e| format!("invalid package archive: {e}"))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| format!("invalid package archive: {e}"))?;
        let name = entry.name().to_string();
        if !name.to_ascii_lowercase().ends_with(".nuspec") {
            continue;
        }
        trace!(entry = %name, "Found manifest");
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| format!("unreadable manifest {name}: {e}"))?;
        return Ok(content);
    }

    Err("package archive contains no .nuspec file".to_string())
}

impl MetadataSource for NuGetRegistry {
    fn fetch_dependencies(
        &self,
        package: &str,
        version: &str,
    ) -> Result<DirectDependencies, FetchError> {
        let version = if version == LATEST_VERSION {
            self.resolve_latest(package)?
        } else {
            version.to_string()
        };

        let nuspec = self.download_nuspec(package, &version)?;
        let deps: DirectDependencies = parse_nuspec(&nuspec)
            .map_err(|e| FetchError::Parse {
                package: package.to_string(),
                message: e.to_string(),
            })?
            .into_iter()
            .map(|dep| (dep.name, dep.version))
            .collect();

        debug!(package, %version, followed = deps.len(), "Resolved metadata");
        Ok(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::{CompressionMethod, ZipWriter};

    const NAMESPACED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>Serilog.Sinks.File</id>
    <version>5.0.0</version>
    <dependencies>
      <group targetFramework=".NETFramework4.5">
        <dependency id="Serilog" version="2.10.0" exclude="Build,Analyzers" />
      </group>
      <group targetFramework=".NETStandard2.0">
        <dependency id="Serilog" version="2.10.0" />
        <dependency id="System.Text.Encoding.Extensions" version="4.3.0" />
      </group>
    </dependencies>
  </metadata>
</package>"#;

    const PLAIN: &str = r#"<package>
  <metadata>
    <id>Demo</id>
    <dependencies>
      <dependency id="Newtonsoft.Json" version="13.0.1" />
    </dependencies>
  </metadata>
</package>"#;

    fn registry(url: String) -> NuGetRegistry {
        NuGetRegistry::new(url, Duration::from_secs(5)).unwrap()
    }

    /// Builds a `.nupkg` holding the given entries.
    fn nupkg(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn serve_package(server: &mut mockito::Server, path: &str, nuspec: &str) -> mockito::Mock {
        server
            .mock("GET", path)
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body(nupkg(&[
                ("_rels/.rels", "<Relationships />"),
                ("demo.nuspec", nuspec),
                ("lib/net6.0/Demo.dll", "binary"),
            ]))
            .create()
    }

    #[test]
    fn test_urls_are_lowercased() {
        let reg = registry("https://nuget.example.com/v3/".to_string());

        assert_eq!(
            reg.package_url("Newtonsoft.Json", "13.0.1-Beta1"),
            "https://nuget.example.com/v3/newtonsoft.json/13.0.1-beta1/newtonsoft.json.13.0.1-beta1.nupkg"
        );
        assert_eq!(
            reg.index_url("Newtonsoft.Json"),
            "https://nuget.example.com/v3/newtonsoft.json/index.json"
        );
    }

    #[test]
    fn test_fetch_plain_dependencies() {
        let mut server = mockito::Server::new();
        let mock = serve_package(&mut server, "/demo/1.0.0/demo.1.0.0.nupkg", PLAIN);

        let deps = registry(server.url())
            .fetch_dependencies("Demo", "1.0.0")
            .unwrap();

        mock.assert();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps["Newtonsoft.Json"], "13.0.1");
    }

    #[test]
    fn test_fetch_grouped_dependencies_with_namespace() {
        let mut server = mockito::Server::new();
        let _mock = serve_package(
            &mut server,
            "/serilog.sinks.file/5.0.0/serilog.sinks.file.5.0.0.nupkg",
            NAMESPACED,
        );

        let deps = registry(server.url())
            .fetch_dependencies("Serilog.Sinks.File", "5.0.0")
            .unwrap();

        assert_eq!(
            deps.keys().collect::<Vec<_>>(),
            vec!["Serilog", "System.Text.Encoding.Extensions"]
        );
        assert_eq!(deps["Serilog"], "2.10.0");
    }

    #[test]
    fn test_fetch_latest_resolves_newest_stable() {
        let mut server = mockito::Server::new();
        let index = server
            .mock("GET", "/demo/index.json")
            .with_status(200)
            .with_body(r#"{"versions": ["1.0.0", "2.0.0", "3.0.0-preview.1"]}"#)
            .create();
        let package = serve_package(&mut server, "/demo/2.0.0/demo.2.0.0.nupkg", PLAIN);

        let deps = registry(server.url())
            .fetch_dependencies("Demo", LATEST_VERSION)
            .unwrap();

        index.assert();
        package.assert();
        assert!(deps.contains_key("Newtonsoft.Json"));
    }

    #[test]
    fn test_fetch_latest_falls_back_to_prerelease() {
        let mut server = mockito::Server::new();
        let _index = server
            .mock("GET", "/demo/index.json")
            .with_status(200)
            .with_body(r#"{"versions": ["0.1.0-alpha"]}"#)
            .create();
        let package = serve_package(
            &mut server,
            "/demo/0.1.0-alpha/demo.0.1.0-alpha.nupkg",
            PLAIN,
        );

        registry(server.url())
            .fetch_dependencies("Demo", LATEST_VERSION)
            .unwrap();
        package.assert();
    }

    #[test]
    fn test_fetch_latest_without_versions_is_not_found() {
        let mut server = mockito::Server::new();
        let _index = server
            .mock("GET", "/demo/index.json")
            .with_status(200)
            .with_body(r#"{"versions": []}"#)
            .create();

        let err = registry(server.url())
            .fetch_dependencies("Demo", LATEST_VERSION)
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_fetch_not_found() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/ghost/1.0.0/ghost.1.0.0.nupkg")
            .with_status(404)
            .create();

        let err = registry(server.url())
            .fetch_dependencies("Ghost", "1.0.0")
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn test_fetch_non_archive_is_parse_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/demo/1.0.0/demo.1.0.0.nupkg")
            .with_status(200)
            .with_body("<html>not a package</html>")
            .create();

        let err = registry(server.url())
            .fetch_dependencies("Demo", "1.0.0")
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }

    #[test]
    fn test_fetch_archive_without_manifest_is_parse_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/demo/1.0.0/demo.1.0.0.nupkg")
            .with_status(200)
            .with_body(nupkg(&[("lib/net6.0/Demo.dll", "binary")]))
            .create();

        let err = registry(server.url())
            .fetch_dependencies("Demo", "1.0.0")
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
        assert!(err.to_string().contains("no .nuspec"));
    }

    #[test]
    fn test_fetch_broken_manifest_is_parse_error() {
        let mut server = mockito::Server::new();
        let _mock = serve_package(
            &mut server,
            "/demo/1.0.0/demo.1.0.0.nupkg",
            "<package><metadata></package>",
        );

        let err = registry(server.url())
            .fetch_dependencies("Demo", "1.0.0")
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
    }
}
