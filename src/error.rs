//! Error types for a weighing run
//!
//! Every variant is fatal: a run either produces all three sizes or none.

use std::io;

use thiserror::Error;

/// Errors raised while installing, resolving, bundling or measuring modules
#[derive(Debug, Error)]
pub enum WeighError {
    /// The package installer exited unsuccessfully or printed unusable output
    #[error("package installation failed: {0}")]
    Install(String),

    /// The same package was requested with two different versions
    #[error("package '{name}' requested as both {first} and {second}")]
    ConflictingVersions {
        name: String,
        first: String,
        second: String,
    },

    /// A requested file or package could not be located
    #[error("cannot resolve '{specifier}': {reason}")]
    Resolution {
        specifier: String,
        reason: String,
    },

    /// The module graph could not be bundled
    #[error("bundling failed: {0}")]
    Bundle(String),

    /// A streaming stage (bundle output, minifier, gzip) failed
    #[error("{stage} stream failed: {source}")]
    Stream {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// Writing the report failed
    #[error("failed to write report: {0}")]
    Report(#[source] io::Error),
}

impl WeighError {
    pub(crate) fn resolution(specifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            specifier: specifier.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn stream(stage: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Stream { stage, source }
    }
}

/// Result alias used across the library
pub type Result<T, E = WeighError> = std::result::Result<T, E>;
