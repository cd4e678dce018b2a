use anyhow::Result;

use crate::cli::{Cli, PeakArgs};
use crate::fishnet::Fishnet;
use crate::table;

pub fn run(cli: &Cli, args: &PeakArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    let net = Fishnet::read(&dir)?;

    for peak in super::peaks(args.peak) {
        table::build_tables(&net, &dir, &cfg, peak)?;
        log::info!("[assemble] {peak}: wrote {}", dir.final_table(peak).display());
    }
    Ok(())
}
