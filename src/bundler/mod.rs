//! Bundle generation
//!
//! Walks the module graph from the entry points and streams a single
//! CommonJS-style bundle to an async writer, one module at a time.

mod graph;

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, WeighError};
use crate::resolver;
use crate::specifier::{self, ModuleKind};
use crate::transform::{ModuleType, Transformer};

pub use graph::{Module, ModuleGraph, ModuleId, ModuleKey};

/// Module table and loader emitted at the top of every bundle
const RUNTIME_PRELUDE: &str = r#"(function (global) {
  var definitions = {};
  var cache = {};

  function __weigh_define__(id, factory, deps) {
    definitions[id] = { factory: factory, deps: deps };
  }

  function __weigh_require__(id) {
    if (cache[id]) {
      return cache[id].exports;
    }

    var definition = definitions[id];
    if (!definition) {
      var err = new Error("Cannot find module '" + id + "'");
      err.code = "MODULE_NOT_FOUND";
      throw err;
    }

    var module = cache[id] = { exports: {} };
    var localRequire = function (name) {
      return __weigh_require__(name in definition.deps ? definition.deps[name] : name);
    };
    definition.factory.call(module.exports, localRequire, module, module.exports);

    return module.exports;
  }

  global.require = __weigh_require__;
"#;

const RUNTIME_EPILOGUE: &str = "})(typeof self !== \"undefined\" ? self : this);\n";

/// Streams a bundle built from entry files and registered builtins
pub struct Bundler {
    /// Source transforms applied to every loaded file
    transformer: Transformer,

    /// Files executed when the bundle loads
    entries: Vec<PathBuf>,

    /// Builtins placed in the module table without being executed
    builtins: Vec<String>,
}

impl Bundler {
    /// Create a bundler substituting the given `process.env` values
    pub fn new(env: &BTreeMap<String, String>) -> Result<Self> {
        Ok(Self {
            transformer: Transformer::new(env)?,
            entries: Vec::new(),
            builtins: Vec::new(),
        })
    }

    /// Add an entry point
    pub fn add_entry(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.entries.push(path.into());
        self
    }

    /// Make a builtin requirable from the bundle without running it
    pub fn require(&mut self, name: impl Into<String>) -> &mut Self {
        self.builtins.push(name.into());
        self
    }

    /// Build the module graph by traversing from the entry points
    pub async fn build_graph(&self) -> Result<ModuleGraph> {
        let mut graph = ModuleGraph::new();
        let mut pending = VecDeque::new();

        for entry in &self.entries {
            let path = tokio::fs::canonicalize(entry).await.map_err(|e| {
                WeighError::Bundle(format!("cannot open entry {}: {}", entry.display(), e))
            })?;

            let (id, new) = graph.intern(ModuleKey::File(path));
            graph.mark_entry(id);
            if new {
                pending.push_back(id);
            }
        }

        for name in &self.builtins {
            graph.intern(builtin_key(name));
        }

        while let Some(id) = pending.pop_front() {
            let path = match graph.get_module(id).map(|m| &m.key) {
                Some(ModuleKey::File(path)) => path.clone(),
                _ => continue,
            };
            debug!("Loading module {}", path.display());

            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                WeighError::Bundle(format!("cannot read {}: {}", path.display(), e))
            })?;
            let source = self.transformer.transform(&raw, &path)?;

            let dependencies = match ModuleType::detect(&path) {
                ModuleType::Json => Vec::new(),
                ModuleType::JavaScript => {
                    let scan = resolver::scan_module(&source);
                    if scan.module_syntax {
                        return Err(WeighError::Bundle(format!(
                            "{} uses import/export statements; only CommonJS modules can be bundled",
                            path.display()
                        )));
                    }
                    scan.requires
                }
            };
            let dir = path.parent().unwrap_or(Path::new("/"));

            for specifier in dependencies {
                let key = resolve_import(&specifier, dir).await?;
                let is_file = matches!(key, ModuleKey::File(_));

                let (dep_id, new) = graph.intern(key);
                if new && is_file {
                    pending.push_back(dep_id);
                }
                graph.add_dependency(id, specifier, dep_id);
            }

            if let Some(module) = graph.get_module_mut(id) {
                module.source = Some(source);
            }
        }

        debug!("Module graph holds {} modules", graph.len());

        Ok(graph)
    }

    /// Build the bundle and stream it into `out`
    ///
    /// The writer is not shut down; the caller decides when the stream ends.
    pub async fn bundle<W>(&self, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let graph = self.build_graph().await?;

        write_chunk(out, RUNTIME_PRELUDE).await?;

        for (id, module) in graph.iter() {
            let chunk = render_module(&graph, id, module)?;
            write_chunk(out, &chunk).await?;
        }

        for id in graph.entry_modules() {
            if let Some(module) = graph.get_module(id) {
                let chunk = format!("  __weigh_require__({});\n", json_string(&module.runtime_id(id))?);
                write_chunk(out, &chunk).await?;
            }
        }

        write_chunk(out, RUNTIME_EPILOGUE).await?;
        out.flush().await.map_err(WeighError::stream("bundle"))
    }
}

/// Resolve an import found in a file located in `dir`
async fn resolve_import(specifier: &str, dir: &Path) -> Result<ModuleKey> {
    let resolved = match specifier::classify(specifier) {
        ModuleKind::Builtin => return Ok(builtin_key(specifier)),
        ModuleKind::Local => resolver::resolve_relative(specifier, dir)?,
        ModuleKind::Package => resolver::resolve_bare(specifier, dir)?,
    };

    let path = resolved.ok_or_else(|| {
        WeighError::Bundle(format!(
            "Cannot find module '{}' from '{}'",
            specifier,
            dir.display()
        ))
    })?;

    let canonical = tokio::fs::canonicalize(&path)
        .await
        .map_err(|e| WeighError::Bundle(format!("cannot open {}: {}", path.display(), e)))?;

    Ok(ModuleKey::File(canonical))
}

fn builtin_key(name: &str) -> ModuleKey {
    ModuleKey::Builtin(name.strip_prefix("node:").unwrap_or(name).to_string())
}

/// Render one `__weigh_define__` call
fn render_module(graph: &ModuleGraph, id: ModuleId, module: &Module) -> Result<String> {
    let runtime_id = json_string(&module.runtime_id(id))?;

    let chunk = match &module.key {
        ModuleKey::File(path) => {
            let deps: BTreeMap<&str, String> = module
                .dependencies
                .iter()
                .filter_map(|(spec, &dep)| {
                    graph
                        .get_module(dep)
                        .map(|m| (spec.as_str(), m.runtime_id(dep)))
                })
                .collect();
            let deps = serde_json::to_string(&deps)
                .map_err(|e| WeighError::Bundle(format!("cannot encode dependency map: {}", e)))?;

            format!(
                "\n  // {}\n  __weigh_define__({}, function (require, module, exports) {{\n{}\n  }}, {});\n",
                path.display(),
                runtime_id,
                module.source.as_deref().unwrap_or_default(),
                deps
            )
        }
        ModuleKey::Builtin(name) => format!(
            "\n  // builtin: {}\n  __weigh_define__({}, function (require, module, exports) {{}}, {{}});\n",
            name, runtime_id
        ),
    };

    Ok(chunk)
}

fn json_string(value: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| WeighError::Bundle(format!("cannot encode module id: {}", e)))
}

async fn write_chunk<W>(out: &mut W, chunk: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(chunk.as_bytes())
        .await
        .map_err(WeighError::stream("bundle"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn production() -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("NODE_ENV".to_string(), "production".to_string());
        env
    }

    fn write(dir: &Path, rel: &str, content: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    async fn bundle_to_string(bundler: &Bundler) -> Result<String> {
        let mut out = Vec::new();
        bundler.bundle(&mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn test_bundles_local_graph() {
        let dir = TempDir::new().unwrap();
        let entry = write(
            dir.path(),
            "main.js",
            "var dep = require('./dep');\nvar path = require('path');\nif (process.env.NODE_ENV === 'development') { debug(); }\n",
        );
        write(dir.path(), "dep.js", "module.exports = require('./data.json');");
        write(dir.path(), "data.json", "{\"answer\": 42}");
        write(dir.path(), "node_modules/unused/index.js", "throw 1");

        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.add_entry(&entry);

        let graph = bundler.build_graph().await.unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.entry_modules(), vec![0]);

        let output = bundle_to_string(&bundler).await.unwrap();
        assert!(output.starts_with("(function (global)"));
        assert!(output.contains("\"production\" === 'development'"));
        assert!(output.contains("module.exports = {\"answer\": 42};"));
        assert!(output.contains("// builtin: path"));
        assert!(output.contains("__weigh_require__(\"0\");"));
        assert!(!output.contains("throw 1"));
    }

    #[tokio::test]
    async fn test_registered_builtins_are_not_entries() {
        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.require("fs").require("node:events");

        let graph = bundler.build_graph().await.unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.entry_modules().is_empty());

        let output = bundle_to_string(&bundler).await.unwrap();
        assert!(output.contains("__weigh_define__(\"fs\""));
        assert!(output.contains("__weigh_define__(\"events\""));
        assert!(!output.contains("__weigh_require__(\"fs\")"));
    }

    #[tokio::test]
    async fn test_cycles_are_visited_once() {
        let dir = TempDir::new().unwrap();
        let a = write(dir.path(), "a.js", "require('./b');");
        write(dir.path(), "b.js", "require('./a.js');");

        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.add_entry(&a).add_entry(&a);

        let graph = bundler.build_graph().await.unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.entry_modules().len(), 1);
    }

    #[tokio::test]
    async fn test_package_dependencies_resolve_through_node_modules() {
        let dir = TempDir::new().unwrap();
        let cache = dir.path().join("cache/node_modules");
        let entry = write(&cache, "outer/index.js", "module.exports = require('inner');");
        write(&cache, "inner/package.json", r#"{"main": "main.js"}"#);
        write(&cache, "inner/main.js", "module.exports = 1;");

        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.add_entry(&entry);

        let graph = bundler.build_graph().await.unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[tokio::test]
    async fn test_requires_in_comments_and_strings_are_not_dependencies() {
        let dir = TempDir::new().unwrap();
        let entry = write(
            dir.path(),
            "main.js",
            "// usage: var x = require('left-pad');\n\
             var msg = \"call require('foo') first\";\n\
             module.exports = require('./dep');\n",
        );
        write(dir.path(), "dep.js", "/** @example require('absent') */\nmodule.exports = 1;");

        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.add_entry(&entry);

        let graph = bundler.build_graph().await.unwrap();
        assert_eq!(graph.len(), 2);

        let output = bundle_to_string(&bundler).await.unwrap();
        assert!(output.contains("var msg = \"call require('foo') first\";"));
        assert!(output.contains(r#"{"./dep":"#));
    }

    #[tokio::test]
    async fn test_es_modules_are_rejected() {
        let dir = TempDir::new().unwrap();
        let entry = write(dir.path(), "main.js", "module.exports = require('./esm');");
        write(dir.path(), "esm.js", "import dep from './dep';\nexport default dep;");
        write(dir.path(), "dep.js", "module.exports = 1;");

        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.add_entry(&entry);

        let err = bundle_to_string(&bundler).await.unwrap_err();
        match err {
            WeighError::Bundle(message) => assert!(message.contains("esm.js")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_dependency_fails() {
        let dir = TempDir::new().unwrap();
        let entry = write(dir.path(), "main.js", "require('not-installed');");

        let mut bundler = Bundler::new(&production()).unwrap();
        bundler.add_entry(&entry);

        let err = bundle_to_string(&bundler).await.unwrap_err();
        match err {
            WeighError::Bundle(message) => assert!(message.contains("not-installed")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
