//! NuGet `.nuspec` manifest parsing.
//!
//! Dependencies live under `package/metadata/dependencies`, either directly
//! or inside per-framework `<group>` elements:
//!
//! ```xml
//! <package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
//!   <metadata>
//!     <id>Serilog.Sinks.File</id>
//!     <dependencies>
//!       <group targetFramework=".NETStandard2.0">
//!         <dependency id="Serilog" version="2.10.0" />
//!       </group>
//!     </dependencies>
//!   </metadata>
//! </package>
//! ```
//!
//! Element names are matched on their local part, so the root may carry a
//! default namespace, a prefixed one, or none at all.

use std::borrow::Cow;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::package_json::{ParseError, ParseResult};
use super::types::{Dependency, DependencyType};

/// Parses a `.nuspec` document and returns its dependencies.
///
/// Every framework group is merged. When an id appears more than once the
/// first version wins. Entries without an `id` are skipped and a missing
/// `version` becomes an empty string.
///
/// # Example
///
/// ```
/// use depscope::parser::parse_nuspec;
///
/// let xml = r#"<package><metadata><dependencies>
///     <dependency id="Newtonsoft.Json" version="13.0.1" />
/// </dependencies></metadata></package>"#;
///
/// let deps = parse_nuspec(xml).unwrap();
/// assert_eq!(deps[0].name, "Newtonsoft.Json");
/// assert_eq!(deps[0].version, "13.0.1");
/// ```
pub fn parse_nuspec(content: &str) -> ParseResult<Vec<Dependency>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = Reader::from_str(content);

    // Local names of the open elements, root first.
    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut deps: Vec<Dependency> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_root = true;
                if is_dependency(&open, &e) {
                    push_dependency(&mut deps, &e)?;
                }
                open.push(e.local_name().as_ref().to_vec());
            }
            Ok(Event::Empty(e)) => {
                saw_root = true;
                if is_dependency(&open, &e) {
                    push_dependency(&mut deps, &e)?;
                }
            }
            Ok(Event::End(_)) => {
                open.pop();
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ParseError::XmlError(format!(
                    "{} at byte {}",
                    e,
                    reader.error_position()
                )));
            }
        }
    }

    if !saw_root {
        return Err(ParseError::XmlError("document has no root element".into()));
    }

    Ok(deps)
}

/// `dependency` directly under `metadata/dependencies`, or one `group` deeper.
fn is_dependency(open: &[Vec<u8>], element: &BytesStart<'_>) -> bool {
    if element.local_name().as_ref() != b"dependency" {
        return false;
    }
    let path: Vec<&[u8]> = open.iter().skip(1).map(Vec::as_slice).collect();
    matches!(
        path.as_slice(),
        [b"metadata", b"dependencies"] | [b"metadata", b"dependencies", b"group"]
    )
}

fn push_dependency(deps: &mut Vec<Dependency>, element: &BytesStart<'_>) -> ParseResult<()> {
    let mut id = None;
    let mut version = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ParseError::XmlError(e.to_string()))?;
        let value = attribute_text(&attr.value)?;
        match attr.key.local_name().as_ref() {
            b"id" => id = Some(value),
            b"version" => version = Some(value),
            _ => {}
        }
    }

    let Some(id) = id.filter(|id| !id.trim().is_empty()) else {
        return Ok(());
    };
    if deps.iter().any(|d| d.name == id) {
        return Ok(());
    }
    deps.push(Dependency::new(
        id,
        version.unwrap_or_default(),
        DependencyType::Production,
    ));
    Ok(())
}

fn attribute_text(raw: &Cow<'_, [u8]>) -> ParseResult<String> {
    let text = std::str::from_utf8(raw).map_err(|e| ParseError::XmlError(e.to_string()))?;
    let text = unescape(text).map_err(|e| ParseError::XmlError(e.to_string()))?;
    Ok(text.into_owned())
}
