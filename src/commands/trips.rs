use anyhow::Result;

use crate::cli::{Cli, TripsArgs};
use crate::common::{crs::Transformer, csv::read_csv, fs::require_file_exists};
use crate::{ingest, trips};

pub fn run(cli: &Cli, args: &TripsArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    require_file_exists(&args.od)?;
    require_file_exists(&args.districts)?;
    let boundary = ingest::read_boundary(&args.districts, args.epsg, cfg.target_crs)?;
    let transformer = Transformer::wgs84_to(cfg.target_crs)?;
    let df = read_csv(&args.od)?;

    for peak in super::peaks(args.peak) {
        let (cleaned, summary) = trips::clean(&df, &cfg, peak, &transformer, &boundary)?;
        trips::write_cleaned(&cleaned, &dir.od_cleaned(peak))?;
        summary.report();
        log::info!("[trips] {peak}: wrote {} trips to {}", cleaned.len(), dir.od_cleaned(peak).display());
    }
    Ok(())
}
