//! Comparison against a real package manager's install order.
//!
//! Runs an installer (npm by default) on a scratch project that depends on
//! the analyzed package, extracts the order it reports, and diffs it with
//! the computed load order. This is diagnostic only: any failure on the
//! installer side yields "comparison unavailable" rather than an error.

use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default time allowed for `npm install`.
pub const DEFAULT_INSTALL_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reasons the installer side of a comparison can fail.
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    /// Scratch project setup or process spawning failed.
    #[error("I/O error running installer: {0}")]
    Io(#[from] io::Error),

    /// The installer output was not JSON.
    #[error("Installer output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The installer exited unsuccessfully.
    #[error("Installer exited with {status}: {stderr}")]
    InstallFailed { status: ExitStatus, stderr: String },

    /// The installer did not finish in time and was killed.
    #[error("Installer timed out after {0:?}")]
    Timeout(Duration),
}

/// Something that can report the order a package manager installs in.
pub trait InstallOrderProvider {
    /// Installs `package@version` somewhere disposable and returns the
    /// package names in the order the installer reports them.
    fn install_order(&self, package: &str, version: &str) -> Result<Vec<String>, CompareError>;
}

/// Runs `npm install --json` in a temporary project.
#[derive(Debug, Clone)]
pub struct NpmInstaller {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for NpmInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_INSTALL_TIMEOUT)
    }
}

impl NpmInstaller {
    /// npm with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "npm".to_string(),
            args: vec!["install".to_string(), "--json".to_string()],
            timeout,
        }
    }

    /// Replaces the command that is run inside the scratch project.
    pub fn with_command(mut self, program: impl Into<String>, args: &[&str]) -> Self {
        self.program = program.into();
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, CompareError> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if started.elapsed() >= self.timeout {
                // Best effort: the process may already be gone.
                let _ = child.kill();
                let _ = child.wait();
                return Err(CompareError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    })
}

impl InstallOrderProvider for NpmInstaller {
    fn install_order(&self, package: &str, version: &str) -> Result<Vec<String>, CompareError> {
        let project = tempfile::tempdir()?;

        let mut deps = Map::new();
        deps.insert(package.to_string(), Value::String(version.to_string()));
        let manifest = json!({
            "name": "depscope-comparison",
            "version": "1.0.0",
            "private": true,
            "dependencies": Value::Object(deps),
        });
        fs::write(
            project.path().join("package.json"),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        debug!(program = %self.program, args = ?self.args, dir = %project.path().display(), "Running installer");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(project.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain both pipes while waiting so a chatty installer cannot block.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = self.wait_with_timeout(&mut child)?;
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();

        if !status.success() {
            return Err(CompareError::InstallFailed {
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        let output: Value = serde_json::from_str(&stdout)?;
        Ok(extract_install_order(&output))
    }
}

/// Flattens the nested `dependencies` tree of installer JSON output into an
/// order: pre-order, first appearance wins.
///
/// # Example
///
/// ```
/// use depscope::compare::extract_install_order;
/// use serde_json::json;
///
/// let output = json!({
///     "dependencies": {
///         "express": {"dependencies": {"accepts": {}, "body-parser": {}}},
///         "accepts": {}
///     }
/// });
/// assert_eq!(extract_install_order(&output), vec!["accepts", "express", "body-parser"]);
/// ```
pub fn extract_install_order(output: &Value) -> Vec<String> {
    fn walk(deps: &Map<String, Value>, order: &mut Vec<String>, seen: &mut BTreeSet<String>) {
        for (name, info) in deps {
            if seen.insert(name.clone()) {
                order.push(name.clone());
            }
            if let Some(nested) = info.get("dependencies").and_then(Value::as_object) {
                walk(nested, order, seen);
            }
        }
    }

    let mut order = Vec::new();
    let mut seen = BTreeSet::new();
    if let Some(deps) = output.get("dependencies").and_then(Value::as_object) {
        walk(deps, &mut order, &mut seen);
    }
    order
}

/// Result of diffing the computed load order against an installer's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderComparison {
    /// Packages present in both orders
    pub common: BTreeSet<String>,
    /// Packages only in the computed order
    pub only_ours: BTreeSet<String>,
    /// Packages only in the installer's order
    pub only_theirs: BTreeSet<String>,
    /// Whether both sequences are identical
    pub order_matches: bool,
    /// Length of the computed order
    pub our_len: usize,
    /// Length of the installer's order
    pub their_len: usize,
}

/// Well-known reasons the two orders differ.
pub const DIFFERENCE_REASONS: [&str; 5] = [
    "npm also installs peerDependencies and optionalDependencies",
    "npm resolves semantic version ranges; this graph follows the latest version of every package",
    "npm deduplicates and hoists repeated dependencies",
    "this graph is ordered with a plain depth-first topological sort",
    "npm honours package-lock.json and what is already in node_modules",
];

/// Diffs two package orders.
///
/// # Example
///
/// ```
/// use depscope::compare::compare_orders;
///
/// let ours = vec!["c".to_string(), "b".to_string(), "a".to_string()];
/// let theirs = vec!["a".to_string(), "b".to_string(), "d".to_string()];
///
/// let diff = compare_orders(&ours, &theirs);
/// assert_eq!(diff.common.len(), 2);
/// assert!(diff.only_ours.contains("c"));
/// assert!(diff.only_theirs.contains("d"));
/// assert!(!diff.order_matches);
/// ```
pub fn compare_orders(ours: &[String], theirs: &[String]) -> OrderComparison {
    let our_set: BTreeSet<String> = ours.iter().cloned().collect();
    let their_set: BTreeSet<String> = theirs.iter().cloned().collect();

    OrderComparison {
        common: our_set.intersection(&their_set).cloned().collect(),
        only_ours: our_set.difference(&their_set).cloned().collect(),
        only_theirs: their_set.difference(&our_set).cloned().collect(),
        order_matches: ours == theirs,
        our_len: ours.len(),
        their_len: theirs.len(),
    }
}

impl OrderComparison {
    /// Writes a human-readable summary, including likely reasons when the
    /// orders differ.
    pub fn write_summary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "Our load order: {} packages", self.our_len)?;
        writeln!(writer, "npm install order: {} packages", self.their_len)?;
        writeln!(writer)?;
        writeln!(writer, "Common packages: {}", self.common.len())?;
        writeln!(writer, "Only in our order: {}", self.only_ours.len())?;
        writeln!(writer, "Only in npm order: {}", self.only_theirs.len())?;
        writeln!(writer)?;

        if self.order_matches {
            writeln!(writer, "Orders match exactly.")?;
            return Ok(());
        }

        writeln!(writer, "Orders differ.")?;
        if !self.only_ours.is_empty() {
            writeln!(writer, "Packages only in our order: {}", join(&self.only_ours))?;
        }
        if !self.only_theirs.is_empty() {
            writeln!(writer, "Packages only in npm order: {}", join(&self.only_theirs))?;
        }

        writeln!(writer)?;
        writeln!(writer, "Possible reasons:")?;
        for (i, reason) in DIFFERENCE_REASONS.iter().enumerate() {
            writeln!(writer, "{}. {}", i + 1, reason)?;
        }
        Ok(())
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Runs a provider and diffs its order with ours.
pub struct Comparator<P> {
    provider: P,
}

impl<P: InstallOrderProvider> Comparator<P> {
    /// Wraps an install-order provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns `None` when the provider fails; the failure is logged.
    pub fn compare(
        &self,
        package: &str,
        version: &str,
        our_order: &[String],
    ) -> Option<OrderComparison> {
        match self.provider.install_order(package, version) {
            Ok(theirs) => Some(compare_orders(our_order, &theirs)),
            Err(e) => {
                warn!(package, error = %e, "Comparison unavailable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    struct FixedOrder(Vec<String>);

    impl InstallOrderProvider for FixedOrder {
        fn install_order(&self, _: &str, _: &str) -> Result<Vec<String>, CompareError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl InstallOrderProvider for Broken {
        fn install_order(&self, _: &str, _: &str) -> Result<Vec<String>, CompareError> {
            Err(CompareError::Timeout(Duration::from_secs(60)))
        }
    }

    #[test]
    fn test_compare_orders_identical() {
        let order = strings(&["c", "b", "a"]);
        let diff = compare_orders(&order, &order);

        assert!(diff.order_matches);
        assert_eq!(diff.common.len(), 3);
        assert!(diff.only_ours.is_empty());
        assert!(diff.only_theirs.is_empty());
    }

    #[test]
    fn test_compare_orders_same_set_different_sequence() {
        let diff = compare_orders(&strings(&["c", "b", "a"]), &strings(&["a", "b", "c"]));

        assert!(!diff.order_matches);
        assert_eq!(diff.common.len(), 3);
        assert!(diff.only_ours.is_empty());
    }

    #[test]
    fn test_compare_orders_empty_theirs() {
        let diff = compare_orders(&strings(&["a"]), &[]);

        assert_eq!(diff.their_len, 0);
        assert_eq!(diff.only_ours.len(), 1);
        assert!(!diff.order_matches);
    }

    #[test]
    fn test_extract_install_order_nested_dedup() {
        let output = json!({
            "dependencies": {
                "a": {"version": "1.0.0", "dependencies": {"b": {"dependencies": {"c": {}}}}},
                "b": {"version": "2.0.0"},
                "d": {}
            }
        });

        assert_eq!(extract_install_order(&output), strings(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_extract_install_order_without_dependencies() {
        assert!(extract_install_order(&json!({"added": 3})).is_empty());
        assert!(extract_install_order(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_comparator_success_and_unavailable() {
        let ours = strings(&["b", "a"]);

        let diff = Comparator::new(FixedOrder(strings(&["b", "a"])))
            .compare("a", "latest", &ours)
            .unwrap();
        assert!(diff.order_matches);

        assert!(Comparator::new(Broken).compare("a", "latest", &ours).is_none());
    }

    #[test]
    fn test_write_summary_lists_reasons_on_mismatch() {
        let diff = compare_orders(&strings(&["x", "a"]), &strings(&["a", "y"]));
        let mut out = Vec::new();
        diff.write_summary(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Orders differ."));
        assert!(text.contains("Packages only in our order: x"));
        assert!(text.contains("Packages only in npm order: y"));
        assert!(text.contains("Possible reasons:"));
    }

    #[test]
    fn test_write_summary_match() {
        let diff = compare_orders(&strings(&["a"]), &strings(&["a"]));
        let mut out = Vec::new();
        diff.write_summary(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Orders match exactly."));
        assert!(!text.contains("Possible reasons"));
    }

    #[test]
    fn test_missing_installer_is_io_error() {
        let installer = NpmInstaller::new(Duration::from_secs(5))
            .with_command("depscope-no-such-installer", &[]);

        let err = installer.install_order("left-pad", "latest").unwrap_err();
        assert!(matches!(err, CompareError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_installer_json_output() {
        let installer = NpmInstaller::new(Duration::from_secs(10)).with_command(
            "sh",
            &[
                "-c",
                r#"test -f package.json && echo '{"dependencies": {"a": {"dependencies": {"b": {}}}}}'"#,
            ],
        );

        let order = installer.install_order("a", "latest").unwrap();
        assert_eq!(order, strings(&["a", "b"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_installer_failure_exit_code() {
        let installer = NpmInstaller::new(Duration::from_secs(10))
            .with_command("sh", &["-c", "echo boom >&2; exit 3"]);

        match installer.install_order("a", "latest").unwrap_err() {
            CompareError::InstallFailed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_installer_timeout() {
        let installer = NpmInstaller::new(Duration::from_millis(200))
            .with_command("sh", &["-c", "sleep 5"]);

        let err = installer.install_order("a", "latest").unwrap_err();
        assert!(matches!(err, CompareError::Timeout(_)));
    }
}
