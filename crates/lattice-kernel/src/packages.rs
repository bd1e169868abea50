//! Package resolution for notebook code.
//!
//! Before a cell runs, its source is scanned for top-level imports. Each
//! import resolves through three sets: the Python standard library (no-op),
//! a curated known-unsupported set (native-only libraries that can never
//! load — warn and continue), and everything else (install on demand, with
//! a small alias table mapping import names to install names). Installs are
//! memoised per kernel lifetime and retried once with a short backoff.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:import|from)\s+([a-zA-Z_][a-zA-Z0-9_]*)").unwrap());

/// Python standard-library modules commonly seen in notebooks.
const STDLIB: &[&str] = &[
    "abc", "argparse", "asyncio", "base64", "collections", "contextlib", "copy", "csv",
    "dataclasses", "datetime", "enum", "functools", "glob", "hashlib", "heapq", "io",
    "itertools", "json", "logging", "math", "os", "pathlib", "pickle", "random", "re",
    "shutil", "statistics", "string", "struct", "subprocess", "sys", "tempfile", "textwrap",
    "threading", "time", "traceback", "types", "typing", "unittest", "urllib", "uuid",
    "warnings", "weakref",
];

/// Libraries the runtime can never load (native/GUI-only). Importing them
/// produces a structured stderr warning, and execution continues.
const UNSUPPORTED: &[&str] = &["tkinter", "turtle", "torch", "tensorflow", "pyaudio"];

/// Import name → install name for common aliases.
const ALIASES: &[(&str, &str)] = &[
    ("sklearn", "scikit-learn"),
    ("skimage", "scikit-image"),
    ("cv2", "opencv-python"),
    ("PIL", "pillow"),
    ("bs4", "beautifulsoup4"),
    ("yaml", "pyyaml"),
    ("dateutil", "python-dateutil"),
];

/// How an import symbol resolves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackageAction {
    /// Standard library, nothing to do.
    Stdlib,
    /// Known-unsupported: warn and continue.
    Unsupported,
    /// Needs a load; carries the install name (alias-translated).
    Install(String),
}

/// Classify one import symbol.
pub fn classify(symbol: &str) -> PackageAction {
    if STDLIB.contains(&symbol) {
        return PackageAction::Stdlib;
    }
    if UNSUPPORTED.contains(&symbol) {
        return PackageAction::Unsupported;
    }
    let install = ALIASES
        .iter()
        .find(|(import, _)| *import == symbol)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| symbol.to_string());
    PackageAction::Install(install)
}

/// Scan source for top-level import symbols, in order, deduplicated.
pub fn scan_imports(source: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for caps in IMPORT_RE.captures_iter(source) {
        if let Some(symbol) = caps.get(1) {
            if seen.insert(symbol.as_str().to_string()) {
                out.push(symbol.as_str().to_string());
            }
        }
    }
    out
}

/// Attempts per package load.
pub const INSTALL_ATTEMPTS: u32 = 2;
/// Backoff between attempts.
pub const INSTALL_BACKOFF: Duration = Duration::from_millis(500);
/// Soft timeout per install attempt; a timed-out attempt counts as failed
/// and may be retried.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Memoised package state for one kernel lifetime.
#[derive(Default)]
pub struct PackageResolver {
    installed: HashSet<String>,
    /// Warned-about unsupported imports (warn once per kernel).
    warned: HashSet<String>,
}

/// A resolution step the orchestrator surfaces to the cell's stderr.
#[derive(Clone, Debug, PartialEq)]
pub enum PackageEvent {
    UnsupportedWarning { symbol: String },
    InstallFailed { package: String, reason: String },
}

impl PackageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packages from `source` that still need an install, plus the warning
    /// events for unsupported imports.
    pub fn plan(&mut self, source: &str) -> (Vec<String>, Vec<PackageEvent>) {
        let mut installs = Vec::new();
        let mut events = Vec::new();
        for symbol in scan_imports(source) {
            match classify(&symbol) {
                PackageAction::Stdlib => {}
                PackageAction::Unsupported => {
                    if self.warned.insert(symbol.clone()) {
                        warn!(%symbol, "unsupported import requested");
                        events.push(PackageEvent::UnsupportedWarning { symbol });
                    }
                }
                PackageAction::Install(package) => {
                    if !self.installed.contains(&package) {
                        installs.push(package);
                    }
                }
            }
        }
        (installs, events)
    }

    /// Record a successful install so it is never attempted again.
    pub fn mark_installed(&mut self, package: &str) {
        debug!(%package, "package memoised");
        self.installed.insert(package.to_string());
    }

    pub fn is_installed(&self, package: &str) -> bool {
        self.installed.contains(package)
    }

    /// Forget everything (kernel restart).
    pub fn reset(&mut self) {
        self.installed.clear();
        self.warned.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_import_forms() {
        let source = "import numpy as np\nfrom pandas import DataFrame\n  import os\nx = 1\n";
        assert_eq!(scan_imports(source), vec!["numpy", "pandas", "os"]);
    }

    #[test]
    fn test_scan_ignores_mid_line_imports() {
        let source = "s = 'import fake'\nprint('from nowhere import x')\n";
        assert!(scan_imports(source).is_empty());
    }

    #[test]
    fn test_scan_deduplicates() {
        let source = "import numpy\nimport numpy\n";
        assert_eq!(scan_imports(source), vec!["numpy"]);
    }

    #[test]
    fn test_classify_stdlib() {
        assert_eq!(classify("os"), PackageAction::Stdlib);
        assert_eq!(classify("json"), PackageAction::Stdlib);
    }

    #[test]
    fn test_classify_unsupported() {
        assert_eq!(classify("tkinter"), PackageAction::Unsupported);
        assert_eq!(classify("torch"), PackageAction::Unsupported);
    }

    #[test]
    fn test_alias_translation() {
        assert_eq!(classify("sklearn"), PackageAction::Install("scikit-learn".into()));
        assert_eq!(classify("cv2"), PackageAction::Install("opencv-python".into()));
        // Unknown names pass through untranslated.
        assert_eq!(classify("numpy"), PackageAction::Install("numpy".into()));
    }

    #[test]
    fn test_plan_memoises_installs() {
        let mut resolver = PackageResolver::new();
        let (installs, events) = resolver.plan("import numpy\nimport os\n");
        assert_eq!(installs, vec!["numpy"]);
        assert!(events.is_empty());

        resolver.mark_installed("numpy");
        let (installs, _) = resolver.plan("import numpy\n");
        assert!(installs.is_empty());
    }

    #[test]
    fn test_plan_warns_once_per_kernel() {
        let mut resolver = PackageResolver::new();
        let (_, events) = resolver.plan("import tkinter\n");
        assert_eq!(events, vec![PackageEvent::UnsupportedWarning { symbol: "tkinter".into() }]);
        let (_, events) = resolver.plan("import tkinter\n");
        assert!(events.is_empty());
    }

    #[test]
    fn test_reset_forgets() {
        let mut resolver = PackageResolver::new();
        resolver.mark_installed("numpy");
        resolver.reset();
        assert!(!resolver.is_installed("numpy"));
    }
}
