use anyhow::Result;

use crate::cli::{Cli, PoiArgs};
use crate::common::{crs::Transformer, fs::require_file_exists};
use crate::features::poi::{self, PoiClassTable};
use crate::fishnet::Fishnet;
use crate::ingest;

pub fn run(cli: &Cli, args: &PoiArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    require_file_exists(&args.pois)?;
    let net = Fishnet::read(&dir)?;
    let table = match &args.classes {
        Some(path) => PoiClassTable::from_path(path)?,
        None => PoiClassTable::embedded()?,
    };

    let transformer = Transformer::wgs84_to(cfg.target_crs)?;
    let (pois, skipped) = ingest::read_pois(&args.pois, &args.subclass_field, &transformer)?;
    if skipped > 0 {
        log::warn!("[poi] skipped {skipped} unreadable rows in {}", args.pois.display());
    }

    let (counts, summary) = poi::featurize(&net, &pois, &table);
    poi::write_features(&net, &counts, &dir.poi_features())?;
    summary.report();
    log::info!("[poi] wrote {}", dir.poi_features().display());
    Ok(())
}
