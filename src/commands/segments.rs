use anyhow::Result;

use crate::cli::{Cli, PeakArgs};
use crate::fishnet::Fishnet;
use crate::{segments, trips};

pub fn run(cli: &Cli, args: &PeakArgs) -> Result<()> {
    let (_cfg, dir) = super::context(cli)?;
    let net = Fishnet::read(&dir)?;

    for peak in super::peaks(args.peak) {
        let cleaned = trips::read_cleaned(&dir.od_cleaned(peak))?;
        let (accum, summary) = segments::aggregate(&net, &cleaned)?;
        segments::write_segments(&accum, &dir.grid_segments(peak))?;
        summary.report();
        log::info!("[segments] {peak}: wrote {}", dir.grid_segments(peak).display());
    }
    Ok(())
}
