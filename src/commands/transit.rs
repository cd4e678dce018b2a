use anyhow::Result;

use crate::cli::{Cli, TransitArgs};
use crate::common::{crs::Transformer, fs::require_file_exists};
use crate::features::transit::{self, StopKind};
use crate::fishnet::Fishnet;
use crate::ingest;

pub fn run(cli: &Cli, args: &TransitArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    require_file_exists(&args.bus)?;
    require_file_exists(&args.metro)?;
    let net = Fishnet::read(&dir)?;
    let transformer = Transformer::wgs84_to(cfg.target_crs)?;

    let mut stops = ingest::read_stops(&args.bus, StopKind::Bus, 0, &transformer)?;
    let metro =
        ingest::read_stops(&args.metro, StopKind::Metro, stops.len() as u32, &transformer)?;
    stops.extend(metro);

    let (features, summary) = transit::featurize(&net, &stops)?;
    transit::write_features(&net, &features, &dir.transit_features())?;
    summary.report();
    log::info!("[transit] wrote {}", dir.transit_features().display());
    Ok(())
}
