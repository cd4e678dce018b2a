use anyhow::Result;

use crate::cli::{Cli, FishnetArgs};
use crate::common::fs::require_file_exists;
use crate::{fishnet, ingest};

pub fn run(cli: &Cli, args: &FishnetArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    require_file_exists(&args.districts)?;
    let boundary = ingest::read_boundary(&args.districts, args.epsg, cfg.target_crs)?;
    let net = fishnet::build(&boundary, cfg.cell_size_m, cfg.target_crs)?;
    net.write(&dir)?;
    log::info!("[fishnet] wrote {} cells to {}", net.len(), dir.fishnet_cells().display());
    Ok(())
}
