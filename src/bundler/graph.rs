//! Module graph data structures

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Unique identifier for a module
pub type ModuleId = usize;

/// What a module in the graph refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleKey {
    /// A source file on disk
    File(PathBuf),
    /// A runtime builtin, emitted as a stub
    Builtin(String),
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    pub key: ModuleKey,

    /// Whether this module is executed when the bundle loads
    pub is_entry: bool,

    /// Transformed source, filled in once the module is loaded
    pub source: Option<String>,

    /// Import specifier -> resolved module
    pub dependencies: BTreeMap<String, ModuleId>,
}

impl Module {
    /// Identifier used for this module in the bundle's runtime table
    ///
    /// Builtins keep their name so they can be required from outside the
    /// bundle.
    pub fn runtime_id(&self, id: ModuleId) -> String {
        match &self.key {
            ModuleKey::File(_) => id.to_string(),
            ModuleKey::Builtin(name) => name.clone(),
        }
    }
}

/// The module dependency graph, in discovery order
#[derive(Debug, Default)]
pub struct ModuleGraph {
    modules: Vec<Module>,

    index: HashMap<ModuleKey, ModuleId>,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module, returning its id and whether it was new
    pub fn intern(&mut self, key: ModuleKey) -> (ModuleId, bool) {
        if let Some(&id) = self.index.get(&key) {
            return (id, false);
        }

        let id = self.modules.len();
        self.index.insert(key.clone(), id);
        self.modules.push(Module {
            key,
            is_entry: false,
            source: None,
            dependencies: BTreeMap::new(),
        });

        (id, true)
    }

    /// Mark a module as an entry point
    pub fn mark_entry(&mut self, id: ModuleId) {
        if let Some(module) = self.modules.get_mut(id) {
            module.is_entry = true;
        }
    }

    /// Record that `from` imports `specifier`, resolved to `to`
    pub fn add_dependency(&mut self, from: ModuleId, specifier: String, to: ModuleId) {
        if let Some(module) = self.modules.get_mut(from) {
            module.dependencies.insert(specifier, to);
        }
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id)
    }

    /// Iterate modules with their ids
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Module)> {
        self.modules.iter().enumerate()
    }

    /// Get entry point modules
    pub fn entry_modules(&self) -> Vec<ModuleId> {
        self.iter()
            .filter(|(_, m)| m.is_entry)
            .map(|(id, _)| id)
            .collect()
    }

    /// Total number of modules
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Check if graph is empty
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
