//! Command-line interface for weigh
//!
//! `weigh [OPTIONS] <MODULE>... [-- <MINIFIER ARGS>...]`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::installer::{NpmBackend, PackageInstaller};
use crate::report::Reporter;
use crate::session::{self, WeighRequest};

/// Weigh the size cost of adding modules to a JavaScript bundle
#[derive(Parser, Debug)]
#[command(name = "weigh")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Examples:\n  weigh lodash\n  weigh react@18.2.0 react-dom@18.2.0\n  weigh ./src/index.js -g 9\n  weigh moment -- --compress --mangle --toplevel")]
pub struct Cli {
    /// Modules to weigh: `name`, `name@version`, `./file.js` or a builtin
    #[arg(required = true, value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Gzip compression level (0-9); the codec default when omitted
    #[arg(short, long, value_name = "LEVEL", value_parser = clap::value_parser!(u32).range(0..=9))]
    pub gzip_level: Option<u32>,

    /// Path to a weigh.toml config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory packages are installed into
    #[arg(long, env = "WEIGH_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Arguments passed to the minifier instead of the defaults
    #[arg(last = true, value_name = "MINIFIER ARGS")]
    pub minifier_args: Vec<String>,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        print_banner();

        let cwd = std::env::current_dir().context("Failed to read the working directory")?;
        let config = self.load_config(&cwd)?;

        let request = WeighRequest {
            modules: self.modules.clone(),
            gzip_level: self.gzip_level,
            minifier_args: self.minifier_args.clone(),
            cwd,
        };

        let cache_dir = config.cache_dir()?;
        info!("Using module cache at {}", cache_dir.display());

        let installer = PackageInstaller::new(NpmBackend::new(&config.installer.program), cache_dir);
        let mut reporter = Reporter::stdout(self.gzip_level);

        session::weigh(&request, &config, &installer, &mut reporter).await?;

        Ok(())
    }

    /// Load the config file, if any, and apply command-line overrides
    ///
    /// A relative `--cache-dir` is taken from `cwd`, not from the config
    /// file's directory.
    pub fn load_config(&self, cwd: &Path) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Config::load(path)?
            }
            None => Config::default_config(),
        };

        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
            config.root = Some(cwd.to_path_buf());
        }

        Ok(config)
    }
}

/// Print the weigh banner
fn print_banner() {
    eprintln!(
        "{} {}",
        "weigh".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "weigh", "-g", "9", "lodash@4.17.21", "./local.js", "--", "--mangle", "-c",
        ])
        .unwrap();

        assert_eq!(cli.modules, vec!["lodash@4.17.21", "./local.js"]);
        assert_eq!(cli.gzip_level, Some(9));
        assert_eq!(cli.minifier_args, vec!["--mangle", "-c"]);
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["weigh", "fs"]).unwrap();

        assert_eq!(cli.gzip_level, None);
        assert!(cli.minifier_args.is_empty());
        assert!(!cli.verbose);
    }

    #[test]
    fn test_requires_a_module() {
        assert!(Cli::try_parse_from(["weigh"]).is_err());
    }

    fn write_config(dir: &Path) -> PathBuf {
        let conf_dir = dir.join("conf");
        std::fs::create_dir_all(&conf_dir).unwrap();
        let path = conf_dir.join("weigh.toml");
        std::fs::write(&path, "cache_dir = \"from-config\"\n").unwrap();
        path
    }

    #[test]
    fn test_config_cache_dir_is_relative_to_config_file() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        let cli = Cli::try_parse_from([
            OsStr::new("weigh"),
            OsStr::new("--config"),
            config.as_os_str(),
            OsStr::new("fs"),
        ])
        .unwrap();

        let loaded = cli.load_config(&dir.path().join("work")).unwrap();
        assert_eq!(loaded.cache_dir().unwrap(), dir.path().join("conf/from-config"));
    }

    #[test]
    fn test_cache_dir_override_is_relative_to_cwd() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path());
        let cwd = dir.path().join("work");
        let cli = Cli::try_parse_from([
            OsStr::new("weigh"),
            OsStr::new("--config"),
            config.as_os_str(),
            OsStr::new("--cache-dir"),
            OsStr::new("override"),
            OsStr::new("fs"),
        ])
        .unwrap();

        let loaded = cli.load_config(&cwd).unwrap();
        assert_eq!(loaded.cache_dir().unwrap(), cwd.join("override"));

        // Settings other than the cache directory still come from the file
        assert_eq!(loaded.root.as_deref(), Some(cwd.as_path()));
        assert_eq!(loaded.installer.program, "npm");
    }

    #[test]
    fn test_absolute_cache_dir_override() {
        let dir = TempDir::new().unwrap();
        let absolute = dir.path().join("elsewhere");
        let cli = Cli::try_parse_from([
            OsStr::new("weigh"),
            OsStr::new("--cache-dir"),
            absolute.as_os_str(),
            OsStr::new("fs"),
        ])
        .unwrap();

        let loaded = cli.load_config(&dir.path().join("work")).unwrap();
        assert_eq!(loaded.cache_dir().unwrap(), absolute);
    }

    #[test]
    fn test_rejects_out_of_range_level() {
        assert!(Cli::try_parse_from(["weigh", "-g", "12", "fs"]).is_err());
    }
}
