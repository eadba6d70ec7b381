//! Source transforms applied while bundling
//!
//! Substitutes `process.env.*` reads with literal values so environment
//! conditional code collapses the way it would in a production build, and
//! wraps JSON files as CommonJS modules.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, WeighError};

/// Types of modules the bundler can handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Json,
}

impl ModuleType {
    /// Determine module type from a path's extension
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ModuleType::Json,
            _ => ModuleType::JavaScript,
        }
    }
}

/// Applies per-module source transforms
pub struct Transformer {
    /// Compiled `process.env` patterns and their JSON-encoded replacements
    env: Vec<(Regex, String)>,
}

impl Transformer {
    /// Create a transformer substituting the given environment
    pub fn new(env: &BTreeMap<String, String>) -> Result<Self> {
        let mut compiled = Vec::with_capacity(env.len());

        for (key, value) in env {
            let key = regex::escape(key);
            let pattern = format!(
                r#"\bprocess\.env(?:\.{key}\b|\[\s*["']{key}["']\s*\])"#,
                key = key
            );
            let regex = Regex::new(&pattern)
                .map_err(|e| WeighError::Bundle(format!("invalid env key '{}': {}", key, e)))?;
            let literal = serde_json::Value::String(value.clone()).to_string();
            compiled.push((regex, literal));
        }

        Ok(Self { env: compiled })
    }

    /// Transform source code based on module type
    pub fn transform(&self, source: &str, path: &Path) -> Result<String> {
        match ModuleType::detect(path) {
            ModuleType::Json => self.transform_json(source, path),
            ModuleType::JavaScript => Ok(self.substitute_env(source)),
        }
    }

    /// Replace environment reads with their configured values
    fn substitute_env(&self, source: &str) -> String {
        let mut code = source.to_string();

        for (regex, literal) in &self.env {
            if regex.is_match(&code) {
                code = regex.replace_all(&code, literal.as_str()).into_owned();
            }
        }

        code
    }

    /// Transform JSON to JS module
    fn transform_json(&self, source: &str, path: &Path) -> Result<String> {
        debug!("Wrapping JSON: {}", path.display());

        // Validate JSON
        serde_json::from_str::<serde_json::Value>(source)
            .map_err(|e| WeighError::Bundle(format!("invalid JSON in {}: {}", path.display(), e)))?;

        Ok(format!("module.exports = {};", source.trim()))
    }
}
