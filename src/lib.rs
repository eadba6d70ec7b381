//! weigh library
//!
//! Measures what a module costs a bundle: raw, minified, and minified plus
//! gzipped size.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod measure;
pub mod report;
pub mod resolver;
pub mod session;
pub mod specifier;
pub mod transform;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use error::WeighError;
pub use measure::MeasurementResult;
pub use session::{weigh, WeighRequest};
