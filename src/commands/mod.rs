//! Thin drivers: one per pipeline stage plus the end-to-end `run`.

pub mod assemble;
pub mod centre;
pub mod emissions;
pub mod fishnet;
pub mod poi;
pub mod population;
pub mod roads;
pub mod run;
pub mod segments;
pub mod transit;
pub mod trips;

use anyhow::Result;

use crate::cli::Cli;
use crate::common::paths::DataDir;
use crate::config::{Peak, PipelineConfig};

/// Load the configuration, size the worker pool and resolve the artifact
/// root. Every command starts here.
pub(crate) fn context(cli: &Cli) -> Result<(PipelineConfig, DataDir)> {
    let cfg = PipelineConfig::load(cli.config.as_deref())?;
    // First caller wins; reruns within one process keep the existing pool.
    let _ = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.effective_workers())
        .build_global();
    Ok((cfg, DataDir::new(&cli.data)))
}

/// The peak windows a command operates on: the requested one, or both.
pub(crate) fn peaks(requested: Option<Peak>) -> Vec<Peak> {
    match requested {
        Some(peak) => vec![peak],
        None => Peak::ALL.to_vec(),
    }
}
