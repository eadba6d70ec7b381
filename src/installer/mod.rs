//! Package installation into the module cache
//!
//! Only package specifiers are ever handed to the installer, and it runs at
//! most once per run.

mod output;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, WeighError};
use crate::resolver;
use crate::specifier::{self, ModuleKind, ModuleSpecifier};

pub use output::parse_install_output;

/// A package the installer reports as present in the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Something that can install packages into a cache directory
///
/// Implementations return the installer's raw stdout.
#[async_trait]
pub trait InstallerBackend: Send + Sync {
    /// Install `packages` (each `name@version`) under `cache_dir`
    async fn install(&self, cache_dir: &Path, packages: &[String]) -> Result<String>;
}

/// Runs `npm install --json --prefix <cache>`
#[derive(Debug, Clone)]
pub struct NpmBackend {
    program: String,
}

impl NpmBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NpmBackend {
    fn default() -> Self {
        Self::new("npm")
    }
}

#[async_trait]
impl InstallerBackend for NpmBackend {
    async fn install(&self, cache_dir: &Path, packages: &[String]) -> Result<String> {
        tokio::fs::create_dir_all(cache_dir).await.map_err(|e| {
            WeighError::Install(format!("cannot create {}: {}", cache_dir.display(), e))
        })?;

        debug!("Running {} install for {}", self.program, packages.join(" "));

        let output = Command::new(&self.program)
            .arg("install")
            .arg("--json")
            .arg("--prefix")
            .arg(cache_dir)
            .args(packages)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| WeighError::Install(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WeighError::Install(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Installs the package subset of a run's specifiers
pub struct PackageInstaller<B> {
    backend: B,
    cache_dir: PathBuf,
}

impl<B: InstallerBackend> PackageInstaller<B> {
    pub fn new(backend: B, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Install every package-kind specifier, returning what was installed
    ///
    /// Returns immediately, without running the backend, when no package is
    /// requested.
    pub async fn install(&self, specifiers: &[ModuleSpecifier]) -> Result<Vec<InstalledPackage>> {
        let packages = normalize(specifiers)?;
        if packages.is_empty() {
            debug!("No packages to install");
            return Ok(Vec::new());
        }

        info!("Installing {} into {}", packages.join(", "), self.cache_dir.display());

        let stdout = self.backend.install(&self.cache_dir, &packages).await?;
        let mut installed = parse_install_output(&stdout)?;

        self.fill_missing_versions(&packages, &mut installed);

        Ok(installed)
    }

    /// Read versions from the cache for packages the output did not list
    fn fill_missing_versions(&self, packages: &[String], installed: &mut Vec<InstalledPackage>) {
        let modules_dir = self.cache_dir.join("node_modules");

        for package in packages {
            let (name, _) = specifier::split(package);
            if installed.iter().any(|p| p.name == name) {
                continue;
            }

            let manifest = modules_dir.join(name).join("package.json");
            if !manifest.is_file() {
                continue;
            }

            if let Some(version) = resolver::read_manifest(&manifest)
                .ok()
                .and_then(|m| m.get("version").and_then(|v| v.as_str()).map(str::to_string))
            {
                installed.push(InstalledPackage {
                    name: name.to_string(),
                    version,
                });
            }
        }
    }
}

/// Turn package specifiers into unique `name@version` install requests
///
/// A package asked for twice with different versions is rejected.
pub fn normalize(specifiers: &[ModuleSpecifier]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut packages = Vec::new();

    for spec in specifiers.iter().filter(|s| s.kind() == ModuleKind::Package) {
        let install_spec = spec.install_spec();
        let (name, version) = specifier::split(&install_spec);
        let version = version.unwrap_or(specifier::LATEST).to_string();

        match seen.get(name) {
            Some(existing) if *existing != version => {
                return Err(WeighError::ConflictingVersions {
                    name: name.to_string(),
                    first: existing.clone(),
                    second: version,
                });
            }
            Some(_) => continue,
            None => {
                seen.insert(name.to_string(), version);
                packages.push(install_spec);
            }
        }
    }

    Ok(packages)
}
