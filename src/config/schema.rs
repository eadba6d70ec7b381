//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Package installer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// npm-compatible executable
    #[serde(default = "default_installer")]
    pub program: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: default_installer(),
        }
    }
}

fn default_installer() -> String {
    "npm".to_string()
}

/// Minifier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinifierConfig {
    /// Executable reading JavaScript on stdin and writing it to stdout
    #[serde(default = "default_minifier")]
    pub program: String,

    /// Arguments used when none are given after `--`
    #[serde(default = "default_minifier_args")]
    pub args: Vec<String>,
}

impl Default for MinifierConfig {
    fn default() -> Self {
        Self {
            program: default_minifier(),
            args: default_minifier_args(),
        }
    }
}

fn default_minifier() -> String {
    "uglifyjs".to_string()
}

fn default_minifier_args() -> Vec<String> {
    vec!["--compress".to_string(), "--mangle".to_string()]
}
