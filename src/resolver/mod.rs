//! Module resolution
//!
//! Turns classified specifiers into something the bundler can consume, and
//! provides the node-style lookup the bundler uses for transitive imports.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, WeighError};
use crate::specifier::{self, ModuleKind, ModuleSpecifier};

mod scan;

pub use scan::{scan_module, ModuleScan};

/// Extensions probed when a path does not name a file directly
const EXTENSIONS: [&str; 3] = ["js", "json", "cjs"];

/// Resolves the modules requested for a run
pub struct Resolver {
    /// Directory packages were installed into
    cache_dir: PathBuf,

    /// Directory local specifiers are relative to
    cwd: PathBuf,
}

impl Resolver {
    /// Create a new resolver
    pub fn new(cache_dir: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            cwd: cwd.into(),
        }
    }

    /// `node_modules` directory inside the cache
    pub fn modules_dir(&self) -> PathBuf {
        self.cache_dir.join("node_modules")
    }

    /// Resolve an installed package to its entry file
    ///
    /// Returns `None` for builtins. A package missing from the cache after
    /// installation is an error.
    pub fn resolve_package(&self, spec: &ModuleSpecifier) -> Result<Option<PathBuf>> {
        if spec.kind() == ModuleKind::Builtin {
            return Ok(None);
        }

        let modules_dir = self.modules_dir();
        debug!("Resolving package '{}' in {}", spec.name(), modules_dir.display());

        match resolve_in_node_modules(&modules_dir, spec.name())? {
            Some(path) => Ok(Some(path)),
            None => Err(WeighError::resolution(
                spec.raw(),
                format!("package not found in {}", modules_dir.display()),
            )),
        }
    }

    /// Pass a builtin through by name
    pub fn resolve_builtin(&self, spec: &ModuleSpecifier) -> Option<String> {
        (spec.kind() == ModuleKind::Builtin).then(|| spec.name().to_string())
    }

    /// Resolve a local specifier against the working directory
    pub fn resolve_file(&self, spec: &ModuleSpecifier) -> Result<PathBuf> {
        let resolved = resolve_relative(spec.name(), &self.cwd)?
            .ok_or_else(|| WeighError::resolution(spec.raw(), "no such file"))?;

        fs::canonicalize(&resolved)
            .map_err(|e| WeighError::resolution(spec.raw(), e.to_string()))
    }
}

/// Resolve a path-like specifier relative to a directory
pub fn resolve_relative(specifier: &str, base_dir: &Path) -> Result<Option<PathBuf>> {
    resolve_path(&base_dir.join(specifier))
}

/// Resolve a path as a file, a file missing its extension, or a directory
fn resolve_path(target: &Path) -> Result<Option<PathBuf>> {
    // Try exact path first
    if target.is_file() {
        return Ok(Some(target.to_path_buf()));
    }

    // Try adding extensions
    for ext in &EXTENSIONS {
        let mut with_ext = target.as_os_str().to_os_string();
        with_ext.push(".");
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.is_file() {
            return Ok(Some(with_ext));
        }
    }

    // Try as a package directory, then as a directory with an index file
    if target.is_dir() {
        if target.join("package.json").is_file() {
            if let Some(entry) = resolve_package_dir(target)? {
                return Ok(Some(entry));
            }
        }

        for ext in &EXTENSIONS {
            let index = target.join(format!("index.{}", ext));
            if index.is_file() {
                return Ok(Some(index));
            }
        }
    }

    Ok(None)
}

/// Resolve a bare import by walking up through `node_modules` directories
pub fn resolve_bare(specifier: &str, from_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = from_dir.to_path_buf();

    loop {
        let node_modules = current.join("node_modules");

        if node_modules.is_dir() {
            if let Some(resolved) = resolve_in_node_modules(&node_modules, specifier)? {
                return Ok(Some(resolved));
            }
        }

        if !current.pop() {
            break;
        }
    }

    Ok(None)
}

/// Resolve a module within a single `node_modules` directory
pub fn resolve_in_node_modules(node_modules: &Path, specifier: &str) -> Result<Option<PathBuf>> {
    let (package_name, subpath) = specifier::package_name(specifier);
    let package_dir = node_modules.join(package_name);

    if !package_dir.is_dir() {
        return Ok(None);
    }

    // If there's a subpath, resolve it directly
    if let Some(sub) = subpath {
        return resolve_relative(sub, &package_dir);
    }

    match resolve_package_dir(&package_dir)? {
        Some(entry) => Ok(Some(entry)),
        None => resolve_relative("index", &package_dir),
    }
}

/// Find the entry file named by a package's manifest
fn resolve_package_dir(package_dir: &Path) -> Result<Option<PathBuf>> {
    let package_json = package_dir.join("package.json");
    if !package_json.is_file() {
        return Ok(None);
    }

    let manifest = read_manifest(&package_json)?;

    // `browser` may also be an object of per-file replacements; only the
    // string form names an entry.
    for field in ["browser", "main"] {
        if let Some(entry) = manifest.get(field).and_then(|v| v.as_str()) {
            let entry = entry.trim_start_matches("./");
            if entry.is_empty() || entry == "." {
                continue;
            }
            if let Some(resolved) = resolve_relative(entry, package_dir)? {
                return Ok(Some(resolved));
            }
        }
    }

    Ok(None)
}

/// Read and parse a `package.json`
pub fn read_manifest(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| WeighError::resolution(path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| {
        WeighError::resolution(path.display().to_string(), format!("invalid package.json: {}", e))
    })
}
