//! Module specifiers and their classification
//!
//! A specifier is what the user types: `lodash`, `lodash@4.17.21`,
//! `@scope/pkg@1.0.0`, `./local/file.js` or a builtin such as `fs`.
//! Classification is purely syntactic and never touches the filesystem.

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;

/// Version used when a package is requested without one
pub const LATEST: &str = "latest";

/// Core module names the bundler provides shims for
static BUILTINS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "assert",
        "buffer",
        "child_process",
        "cluster",
        "console",
        "constants",
        "crypto",
        "dgram",
        "dns",
        "domain",
        "events",
        "fs",
        "http",
        "http2",
        "https",
        "inspector",
        "module",
        "net",
        "os",
        "path",
        "perf_hooks",
        "process",
        "punycode",
        "querystring",
        "readline",
        "repl",
        "stream",
        "_stream_duplex",
        "_stream_passthrough",
        "_stream_readable",
        "_stream_transform",
        "_stream_writable",
        "string_decoder",
        "sys",
        "timers",
        "tls",
        "tty",
        "url",
        "util",
        "vm",
        "zlib",
        "_process",
    ]
    .into_iter()
    .collect()
});

/// How a specifier gets turned into something the bundler can consume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// A file relative to the working directory, or an absolute path
    Local,
    /// A module provided by the runtime itself
    Builtin,
    /// A third-party package that has to be installed
    Package,
}

/// Classify a module name by its syntactic form
pub fn classify(name: &str) -> ModuleKind {
    if is_local(name) {
        ModuleKind::Local
    } else if is_builtin(name) {
        ModuleKind::Builtin
    } else {
        ModuleKind::Package
    }
}

/// Check whether a name points at the filesystem
pub fn is_local(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('/')
}

/// Check whether a name is a runtime builtin (`node:` prefix allowed)
pub fn is_builtin(name: &str) -> bool {
    let bare = name.strip_prefix("node:").unwrap_or(name);
    BUILTINS.contains(bare)
}

/// Check whether a name has to come from the package registry
pub fn is_package(name: &str) -> bool {
    classify(name) == ModuleKind::Package
}

/// Split a package import path into its package name and sub-path
///
/// `lodash/fp` gives `("lodash", Some("fp"))`, `@babel/core/lib` gives
/// `("@babel/core", Some("lib"))`.
pub fn package_name(spec: &str) -> (&str, Option<&str>) {
    let name_end = if spec.starts_with('@') {
        // Scoped: the name spans the first two segments
        match spec.find('/') {
            Some(scope_end) => spec[scope_end + 1..]
                .find('/')
                .map(|i| scope_end + 1 + i),
            None => None,
        }
    } else {
        spec.find('/')
    };

    match name_end {
        Some(end) => (&spec[..end], Some(&spec[end + 1..]).filter(|s| !s.is_empty())),
        None => (spec, None),
    }
}

/// A module as requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpecifier {
    raw: String,
    name: String,
    version: Option<String>,
}

impl ModuleSpecifier {
    /// Parse a raw specifier, splitting off an `@version` suffix
    pub fn parse(raw: &str) -> Self {
        let (name, version) = split(raw);
        Self {
            raw: raw.to_string(),
            name: name.to_string(),
            version: version.map(str::to_string),
        }
    }

    /// The specifier exactly as given
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Module name without the version
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requested version, `None` meaning latest
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn kind(&self) -> ModuleKind {
        classify(&self.name)
    }

    /// Installer form: `<package name>@<version or latest>`
    pub fn install_spec(&self) -> String {
        let (bare, _) = package_name(&self.name);
        format!("{}@{}", bare, self.version().unwrap_or(LATEST))
    }
}

impl fmt::Display for ModuleSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `name@version` into its parts
///
/// The search for `@` skips the first character so scoped names survive.
/// Local paths are returned whole.
pub fn split(spec: &str) -> (&str, Option<&str>) {
    if is_local(spec) {
        return (spec, None);
    }

    let skip = spec.chars().next().map(char::len_utf8).unwrap_or(0);

    match spec[skip..].find('@') {
        Some(i) => {
            let at = skip + i;
            let version = &spec[at + 1..];
            (&spec[..at], Some(version).filter(|v| !v.is_empty()))
        }
        None => (spec, None),
    }
}
