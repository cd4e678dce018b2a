use anyhow::Result;

use crate::cli::Cli;
use crate::common::crs::Transformer;
use crate::features::centre;
use crate::fishnet::Fishnet;

pub fn run(cli: &Cli) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    let net = Fishnet::read(&dir)?;

    let transformer = Transformer::wgs84_to(cfg.target_crs)?;
    let distances = centre::featurize(&net, cfg.city_centre_lonlat, &transformer)?;
    centre::write_features(&net, &distances, &dir.centre_features())?;
    log::info!("[centre] wrote {}", dir.centre_features().display());
    Ok(())
}
