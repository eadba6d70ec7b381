//! Human-readable run report
//!
//! Line oriented and written to stdout by the CLI. Not a machine-readable
//! format.

use std::io::{self, Write};
use std::path::PathBuf;

use colored::Colorize;

use crate::error::{Result, WeighError};
use crate::installer::InstalledPackage;
use crate::measure::{Measurement, Stage};
use crate::utils::format_size;

/// Writes the report for one run
pub struct Reporter {
    out: Box<dyn Write + Send>,
    gzip_level: Option<u32>,
}

impl Reporter {
    pub fn new(out: Box<dyn Write + Send>, gzip_level: Option<u32>) -> Self {
        Self { out, gzip_level }
    }

    /// Reporter writing to standard output
    pub fn stdout(gzip_level: Option<u32>) -> Self {
        Self::new(Box::new(io::stdout()), gzip_level)
    }

    /// Announce what is about to be weighed
    pub fn header(&mut self, modules: &[String], minifier_args: &[String]) -> Result<()> {
        self.line("")?;
        self.line(&format!("Calculating size of {}", modules.join(", ").bold()))?;
        if !minifier_args.is_empty() {
            self.line(&format!("Using minifier arguments: {}", minifier_args.join(" ")))?;
        }
        self.line("")
    }

    /// List the resolved files, builtins and installed packages
    pub fn modules(
        &mut self,
        files: &[PathBuf],
        builtins: &[String],
        packages: &[InstalledPackage],
    ) -> Result<()> {
        let count = files.len() + builtins.len() + packages.len();
        if count == 0 {
            self.line("Weighing modules: 0")?;
        } else {
            self.line("Weighing modules:")?;
        }

        for file in files {
            self.line(&format!("  {}  {}", "[module]".dimmed(), file.display()))?;
        }
        for builtin in builtins {
            self.line(&format!("  {} {}", "[builtin]".dimmed(), builtin))?;
        }
        for package in packages {
            self.line(&format!(
                "  {} {}@{}",
                "[package]".dimmed(),
                package.name,
                package.version
            ))?;
        }

        self.line("")
    }

    /// Print one stage's size as soon as it is known
    pub fn measurement(&mut self, measurement: &Measurement) -> Result<()> {
        let size = format_size(measurement.bytes);

        let line = match measurement.stage {
            Stage::Raw => format!("Uncompressed: ~{}", size.cyan()),
            Stage::Minified => format!("Minified: {}", size.cyan()),
            Stage::MinifiedCompressed => {
                let level = self
                    .gzip_level
                    .map(|level| level.to_string())
                    .unwrap_or_else(|| "default".to_string());
                format!("Minified + gzipped (level: {}): ~{}", level, size.green().bold())
            }
        };

        self.line(&line)
    }

    /// Close the report
    pub fn footer(&mut self) -> Result<()> {
        self.line("")?;
        self.line(&format!("{}", "Note: these numbers are approximate.".dimmed()))?;
        self.out.flush().map_err(WeighError::Report)
    }

    fn line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line).map_err(WeighError::Report)
    }
}
