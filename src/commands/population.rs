use anyhow::Result;

use crate::cli::{Cli, PopulationArgs};
use crate::common::{
    crs::{EPSG_WGS84, Transformer},
    fs::require_file_exists,
};
use crate::features::population::{self, Raster};
use crate::fishnet::Fishnet;

pub fn run(cli: &Cli, args: &PopulationArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    require_file_exists(&args.raster)?;
    let net = Fishnet::read(&dir)?;

    let raster = Raster::from_geotiff(&args.raster)?;
    let to_metric = Transformer::wgs84_to(cfg.target_crs)?;
    let to_geographic = Transformer::new(cfg.target_crs, EPSG_WGS84)?;
    let features =
        population::featurize(&net, &raster, cfg.raster_units, &to_metric, &to_geographic)?;
    population::write_features(&net, &features, &dir.population_features())?;
    log::info!("[population] wrote {}", dir.population_features().display());
    Ok(())
}
