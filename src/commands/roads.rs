use anyhow::Result;

use crate::cli::{Cli, RoadsArgs};
use crate::common::fs::require_file_exists;
use crate::features::roads;
use crate::fishnet::Fishnet;
use crate::ingest;

pub fn run(cli: &Cli, args: &RoadsArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    require_file_exists(&args.roads)?;
    let net = Fishnet::read(&dir)?;

    let lines = ingest::read_roads(&args.roads, args.epsg, cfg.target_crs)?;
    let (lengths_m, summary) = roads::featurize(&net, &lines);
    roads::write_features(&net, &lengths_m, &dir.road_features())?;
    summary.report();
    log::info!("[roads] wrote {}", dir.road_features().display());
    Ok(())
}
