//! Size measurement pipeline
//!
//! One bundle stream feeds three counters:
//!
//! ```text
//! bundle -> [raw] -> minifier stdin
//!           minifier stdout -> [minified] -> gzip -> [minified+gzipped] -> sink
//! ```
//!
//! All stages run concurrently on the current task; the first failure aborts
//! the rest and kills the minifier.

mod counter;

use std::fmt;
use std::process::{ExitStatus, Stdio};

use async_compression::tokio::write::GzipEncoder;
use async_compression::Level;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::bundler::Bundler;
use crate::error::{Result, WeighError};

pub use counter::ByteCounter;

/// Pipeline stage a byte count belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Raw,
    Minified,
    MinifiedCompressed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Raw => "raw",
            Stage::Minified => "minified",
            Stage::MinifiedCompressed => "minified+gzipped",
        };
        f.write_str(name)
    }
}

/// A final byte count for one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub stage: Stage,
    pub bytes: u64,
}

/// All three byte counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasurementResult {
    pub raw_bytes: u64,
    pub minified_bytes: u64,
    pub minified_compressed_bytes: u64,
}

/// External minifier invocation: reads JavaScript on stdin, writes to stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinifierCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl MinifierCommand {
    fn spawn(&self) -> Result<tokio::process::Child> {
        debug!("Spawning minifier: {} {}", self.program, self.args.join(" "));

        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WeighError::stream("minifier"))
    }
}

/// Gzip level used by the encoder, `None` for the codec default
fn gzip_quality(level: Option<u32>) -> Level {
    match level {
        Some(level) => Level::Precise(level.min(9) as i32),
        None => Level::Default,
    }
}

/// Bundle, minify and gzip, counting the bytes of each stage
///
/// Each total is sent on `events` as soon as its stream ends, and all three
/// are returned once every stage has finished.
pub async fn measure(
    bundler: &Bundler,
    minifier: &MinifierCommand,
    gzip_level: Option<u32>,
    events: mpsc::UnboundedSender<Measurement>,
) -> Result<MeasurementResult> {
    let mut child = minifier.spawn()?;
    let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
    let mut stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;

    let (raw, raw_rx) = ByteCounter::new(stdin);
    let (compressed, compressed_rx) = ByteCounter::new(tokio::io::sink());
    let gzip = GzipEncoder::with_quality(compressed, gzip_quality(gzip_level));
    let (minified, minified_rx) = ByteCounter::new(gzip);

    let bundling = async move {
        let mut raw = raw;
        bundler.bundle(&mut raw).await?;
        raw.shutdown().await.map_err(WeighError::stream("bundle"))?;
        // Dropping closes the minifier's stdin
        drop(raw);
        Ok::<_, WeighError>(())
    };

    let minifying = async move {
        let mut minified = minified;
        tokio::io::copy(&mut stdout, &mut minified)
            .await
            .map_err(WeighError::stream("minifier"))?;
        minified.shutdown().await.map_err(WeighError::stream("gzip"))?;
        Ok::<_, WeighError>(())
    };

    let exited = async {
        let status = child.wait().await.map_err(WeighError::stream("minifier"))?;
        check_exit(&minifier.program, status)
    };

    let (_, _, _, raw_bytes, minified_bytes, compressed_bytes) = tokio::try_join!(
        bundling,
        minifying,
        exited,
        forward(Stage::Raw, raw_rx, &events),
        forward(Stage::Minified, minified_rx, &events),
        forward(Stage::MinifiedCompressed, compressed_rx, &events),
    )?;

    Ok(MeasurementResult {
        raw_bytes,
        minified_bytes,
        minified_compressed_bytes: compressed_bytes,
    })
}

/// Wait for a counter's total and pass it on as an event
async fn forward(
    stage: Stage,
    total: oneshot::Receiver<u64>,
    events: &mpsc::UnboundedSender<Measurement>,
) -> Result<u64> {
    // A counter only goes away unreported when its stage failed, and that
    // failure is what the join surfaces.
    let bytes = match total.await {
        Ok(bytes) => bytes,
        Err(_) => std::future::pending().await,
    };

    debug!("{} stream ended after {} bytes", stage, bytes);
    let _ = events.send(Measurement { stage, bytes });

    Ok(bytes)
}

fn check_exit(program: &str, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    Err(WeighError::Stream {
        stage: "minifier",
        source: std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{} exited with {}", program, status),
        ),
    })
}

fn missing_pipe(name: &str) -> WeighError {
    WeighError::Stream {
        stage: "minifier",
        source: std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            format!("minifier {} was not captured", name),
        ),
    }
}
