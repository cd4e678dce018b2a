use anyhow::Result;

use crate::cli::{Cli, PeakArgs};
use crate::fishnet::Fishnet;
use crate::{emissions, segments};

pub fn run(cli: &Cli, args: &PeakArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    let net = Fishnet::read(&dir)?;

    for peak in super::peaks(args.peak) {
        let accum = segments::read_segments(&net, &dir.grid_segments(peak))?;
        let rows = emissions::per_cell_table(&net, &accum, cfg.emission_factor_kg_per_km)?;
        emissions::write_emissions(&rows, &dir.emissions(peak))?;
        let total: f64 = rows.iter().map(|r| r.carbon_reduction_kg).sum();
        log::info!("[emissions] {peak}: {total:.1} kg avoided, wrote {}", dir.emissions(peak).display());
    }
    Ok(())
}
