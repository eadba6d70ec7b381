//! Configuration handling for weigh
//!
//! Every setting has a default, so a config file is optional.

mod schema;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::measure::MinifierCommand;

pub use schema::*;

/// Name of the cache directory created next to the executable
pub const CACHE_DIR_NAME: &str = ".cached_modules";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where packages are installed; relative paths are resolved against
    /// the config file's directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Package installer settings
    #[serde(default)]
    pub installer: InstallerConfig,

    /// Minifier settings
    #[serde(default)]
    pub minifier: MinifierConfig,

    /// `process.env` values substituted into bundled code
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,

    /// Directory a relative `cache_dir` is resolved against: the config
    /// file's directory, or the working directory for a command-line override
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

fn default_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("NODE_ENV".to_string(), "production".to_string());
    env
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", canonical_path.display()))?;

        config.root = canonical_path.parent().map(|p| p.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            cache_dir: None,
            installer: InstallerConfig::default(),
            minifier: MinifierConfig::default(),
            env: default_env(),
            root: None,
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.installer.program.trim().is_empty() {
            anyhow::bail!("installer.program must not be empty");
        }
        if self.minifier.program.trim().is_empty() {
            anyhow::bail!("minifier.program must not be empty");
        }
        if self.env.keys().any(|key| key.is_empty()) {
            anyhow::bail!("env keys must not be empty");
        }

        Ok(())
    }

    /// Resolve the package cache directory
    ///
    /// Defaults to a directory next to the running executable.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(match &self.root {
                Some(root) => root.join(dir),
                None => dir.clone(),
            });
        }

        let exe = std::env::current_exe().context("Failed to locate the weigh executable")?;
        let exe_dir = exe
            .parent()
            .context("weigh executable has no parent directory")?;

        Ok(exe_dir.join(CACHE_DIR_NAME))
    }

    /// Minifier invocation, with `overrides` replacing the default arguments
    pub fn minifier_command(&self, overrides: &[String]) -> MinifierCommand {
        let args = if overrides.is_empty() {
            self.minifier.args.clone()
        } else {
            overrides.to_vec()
        };

        MinifierCommand {
            program: self.minifier.program.clone(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default_config();

        assert_eq!(config.installer.program, "npm");
        assert_eq!(
            config.minifier_command(&[]).args,
            vec!["--compress".to_string(), "--mangle".to_string()]
        );
        assert_eq!(config.env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert!(config.cache_dir().unwrap().ends_with(CACHE_DIR_NAME));
    }

    #[test]
    fn test_minifier_override() {
        let config = Config::default_config();
        let command = config.minifier_command(&["-c".to_string()]);

        assert_eq!(command.program, "uglifyjs");
        assert_eq!(command.args, vec!["-c".to_string()]);
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weigh.toml");
        fs::write(
            &path,
            r#"
cache_dir = "modules"

[minifier]
program = "terser"

[env]
NODE_ENV = "staging"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.cache_dir().unwrap(), dir.path().join("modules"));
        assert_eq!(config.minifier.program, "terser");
        assert_eq!(config.minifier.args.len(), 2);
        assert_eq!(config.installer.program, "npm");
        assert_eq!(config.env["NODE_ENV"], "staging");
    }

    #[test]
    fn test_rejects_empty_program() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weigh.toml");
        fs::write(&path, "[installer]\nprogram = \"\"\n").unwrap();

        assert!(Config::load(&path).is_err());
    }
}
