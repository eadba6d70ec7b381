//! Normalization of the installer's JSON output

use serde::Deserialize;
use serde_json::Value;

use super::InstalledPackage;
use crate::error::{Result, WeighError};

/// A `dependencies` entry keyed by package name
#[derive(Debug, Deserialize)]
struct DependencyRecord {
    version: String,
}

/// Parse whatever the installer printed into a list of installed packages
///
/// Lines starting with `"> "` (lifecycle script banners) and anything before
/// the first line that opens a JSON value are discarded. Output that still
/// is not JSON fails; JSON of an unexpected shape yields an empty list.
pub fn parse_install_output(stdout: &str) -> Result<Vec<InstalledPackage>> {
    let payload = strip_noise(stdout);
    if payload.trim().is_empty() {
        return Err(WeighError::Install(
            "installer printed no JSON output".to_string(),
        ));
    }

    let value: Value = serde_json::from_str(&payload)
        .map_err(|e| WeighError::Install(format!("unparseable installer output: {}", e)))?;

    Ok(packages_from_value(value))
}

fn strip_noise(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| !line.starts_with("> "))
        .skip_while(|line| {
            let line = line.trim_start();
            !(line.starts_with('{') || line.starts_with('['))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn packages_from_value(value: Value) -> Vec<InstalledPackage> {
    match value {
        Value::Array(records) => records
            .into_iter()
            .filter_map(|record| serde_json::from_value::<InstalledPackage>(record).ok())
            .collect(),
        Value::Object(mut object) => match object.remove("dependencies") {
            Some(Value::Object(dependencies)) => dependencies
                .into_iter()
                .filter_map(|(name, record)| {
                    serde_json::from_value::<DependencyRecord>(record)
                        .ok()
                        .map(|record| InstalledPackage {
                            name,
                            version: record.version,
                        })
                })
                .collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
