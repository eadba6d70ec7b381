//! A single weighing run
//!
//! Classify → install → resolve → bundle and measure → report. Installation
//! always finishes before anything is resolved.

use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bundler::Bundler;
use crate::config::Config;
use crate::error::{Result, WeighError};
use crate::installer::{InstallerBackend, PackageInstaller};
use crate::measure::{self, MeasurementResult, MinifierCommand};
use crate::report::Reporter;
use crate::resolver::Resolver;
use crate::specifier::{ModuleKind, ModuleSpecifier};
use crate::utils::format_duration;

/// What to weigh and how
#[derive(Debug, Clone)]
pub struct WeighRequest {
    /// Module specifiers as typed by the user
    pub modules: Vec<String>,

    /// Gzip level, `None` for the codec default
    pub gzip_level: Option<u32>,

    /// Minifier arguments given after `--`
    pub minifier_args: Vec<String>,

    /// Directory local specifiers are relative to
    pub cwd: PathBuf,
}

/// Weigh the requested modules, reporting each size as it becomes known
pub async fn weigh<B: InstallerBackend>(
    request: &WeighRequest,
    config: &Config,
    installer: &PackageInstaller<B>,
    reporter: &mut Reporter,
) -> Result<MeasurementResult> {
    let specifiers: Vec<ModuleSpecifier> = request
        .modules
        .iter()
        .map(|raw| ModuleSpecifier::parse(raw))
        .collect();

    reporter.header(&request.modules, &request.minifier_args)?;

    let start = Instant::now();
    let spinner = of_kind(&specifiers, ModuleKind::Package)
        .next()
        .map(|_| install_spinner());
    let installed = installer.install(&specifiers).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let packages = installed?;
    if !packages.is_empty() {
        info!("Installed {} package(s) in {}", packages.len(), format_duration(start.elapsed()));
    }

    let resolver = Resolver::new(installer.cache_dir(), &request.cwd);
    let mut bundler = Bundler::new(&config.env)?;
    let mut files = Vec::new();
    let mut builtins = Vec::new();

    for spec in of_kind(&specifiers, ModuleKind::Package) {
        if let Some(path) = resolver.resolve_package(spec)? {
            debug!("{} -> {}", spec, path.display());
            bundler.add_entry(path);
        }
    }

    for spec in of_kind(&specifiers, ModuleKind::Local) {
        let path = resolver.resolve_file(spec)?;
        bundler.add_entry(&path);
        files.push(path);
    }

    for spec in of_kind(&specifiers, ModuleKind::Builtin) {
        if let Some(name) = resolver.resolve_builtin(spec) {
            bundler.require(&name);
            builtins.push(name);
        }
    }

    reporter.modules(&files, &builtins, &packages)?;

    let minifier: MinifierCommand = config.minifier_command(&request.minifier_args);
    let (events, mut received) = mpsc::unbounded_channel();

    let measuring = measure::measure(&bundler, &minifier, request.gzip_level, events);
    let reporting = async {
        while let Some(measurement) = received.recv().await {
            reporter.measurement(&measurement)?;
        }
        Ok::<_, WeighError>(())
    };

    let (measured, reported) = tokio::join!(measuring, reporting);
    let result = measured?;
    reported?;

    reporter.footer()?;

    Ok(result)
}

fn of_kind(
    specifiers: &[ModuleSpecifier],
    kind: ModuleKind,
) -> impl Iterator<Item = &ModuleSpecifier> {
    specifiers.iter().filter(move |spec| spec.kind() == kind)
}

fn install_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Installing packages...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::io::{self, Write};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Installer that writes a package into the cache and prints fixed output
    #[derive(Clone, Default)]
    struct FakeNpm {
        stdout: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl InstallerBackend for FakeNpm {
        async fn install(&self, cache_dir: &Path, packages: &[String]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for package in packages {
                let (name, _) = crate::specifier::split(package);
                let dir = cache_dir.join("node_modules").join(name);
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join("index.js"), "module.exports = 'installed';\n").unwrap();
            }
            Ok(self.stdout.clone())
        }
    }

    struct Fixture {
        dir: TempDir,
        config: Config,
        output: Buffer,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let mut config = Config::default_config();
            config.cache_dir = Some(dir.path().join("cache"));
            // `tr -s` squeezes runs of spaces and newlines
            config.minifier.program = "tr".to_string();
            config.minifier.args = vec!["-s".to_string(), " \n".to_string()];
            Self {
                dir,
                config,
                output: Buffer::default(),
            }
        }

        fn request(&self, modules: &[&str]) -> WeighRequest {
            WeighRequest {
                modules: modules.iter().map(|m| m.to_string()).collect(),
                gzip_level: None,
                minifier_args: Vec::new(),
                cwd: self.dir.path().to_path_buf(),
            }
        }

        fn installer(&self, backend: FakeNpm) -> PackageInstaller<FakeNpm> {
            PackageInstaller::new(backend, self.config.cache_dir().unwrap())
        }

        fn reporter(&self) -> Reporter {
            Reporter::new(Box::new(self.output.clone()), None)
        }

        fn output(&self) -> String {
            String::from_utf8(self.output.0.lock().clone()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_local_file() {
        colored::control::set_override(false);
        let fixture = Fixture::new();
        std::fs::write(
            fixture.dir.path().join("path.js"),
            "module.exports = function  (a,   b)  {\n\n\n    return   a  +  b;\n};\n".repeat(20),
        )
        .unwrap();
        let backend = FakeNpm::default();

        let result = weigh(
            &fixture.request(&["./path.js"]),
            &fixture.config,
            &fixture.installer(backend.clone()),
            &mut fixture.reporter(),
        )
        .await
        .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(result.raw_bytes > 0);
        assert!(result.minified_bytes <= result.raw_bytes);
        assert!(result.minified_compressed_bytes <= result.minified_bytes);

        let output = fixture.output();
        assert!(output.contains("[module]"));
        assert!(output.contains("path.js"));
        assert!(output.contains("Uncompressed: ~"));
        assert!(output.contains("Minified: "));
        assert!(output.contains("Minified + gzipped (level: default)"));
    }

    #[tokio::test]
    async fn test_builtin_only() {
        colored::control::set_override(false);
        let fixture = Fixture::new();
        let backend = FakeNpm::default();

        let result = weigh(
            &fixture.request(&["fs"]),
            &fixture.config,
            &fixture.installer(backend.clone()),
            &mut fixture.reporter(),
        )
        .await
        .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
        assert!(result.raw_bytes > 0);
        assert!(result.minified_bytes > 0);
        assert!(result.minified_compressed_bytes > 0);
        assert!(fixture.output().contains("[builtin] fs"));
        assert!(!fixture.output().contains("[module]"));
    }

    #[tokio::test]
    async fn test_package_is_installed_and_bundled() {
        colored::control::set_override(false);
        let fixture = Fixture::new();
        let backend = FakeNpm {
            stdout: "> banner\n{\"dependencies\": {\"tiny\": {\"version\": \"1.0.0\"}}}".to_string(),
            ..Default::default()
        };

        let result = weigh(
            &fixture.request(&["tiny@1.0.0", "fs"]),
            &fixture.config,
            &fixture.installer(backend.clone()),
            &mut fixture.reporter(),
        )
        .await
        .unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(result.raw_bytes > 0);
        assert!(fixture.output().contains("[package] tiny@1.0.0"));
    }

    #[tokio::test]
    async fn test_malformed_installer_output_aborts() {
        colored::control::set_override(false);
        let fixture = Fixture::new();
        let backend = FakeNpm {
            stdout: "added 1 package, and audited 2 packages in 1s".to_string(),
            ..Default::default()
        };

        let err = weigh(
            &fixture.request(&["tiny"]),
            &fixture.config,
            &fixture.installer(backend),
            &mut fixture.reporter(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WeighError::Install(_)));
        let output = fixture.output();
        assert!(!output.contains("Uncompressed"));
        assert!(!output.contains("Minified"));
    }

    #[tokio::test]
    async fn test_missing_local_file_aborts() {
        let fixture = Fixture::new();

        let err = weigh(
            &fixture.request(&["./missing.js"]),
            &fixture.config,
            &fixture.installer(FakeNpm::default()),
            &mut fixture.reporter(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WeighError::Resolution { .. }));
        assert!(!fixture.output().contains("Uncompressed"));
    }
}
