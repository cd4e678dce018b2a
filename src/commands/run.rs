//! End-to-end driver: fishnet, per-peak trip chain, the five independent
//! feature layers (concurrently), then both final tables.

use anyhow::Result;
use rayon::prelude::*;

use crate::cli::{Cli, RunArgs};
use crate::common::crs::{EPSG_WGS84, Transformer};
use crate::common::csv::read_csv;
use crate::config::Peak;
use crate::features::{
    centre,
    poi::{self, PoiClassTable},
    population::{self, Raster},
    roads,
    transit::{self, StopKind},
};
use crate::{emissions, fishnet, ingest, segments, table, trips};

pub fn run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let (cfg, dir) = super::context(cli)?;
    for input in [&args.districts, &args.od, &args.pois, &args.roads, &args.bus, &args.metro, &args.raster] {
        crate::common::fs::require_file_exists(input)?;
    }

    let boundary = ingest::read_boundary(&args.districts, args.epsg, cfg.target_crs)?;
    let net = fishnet::build(&boundary, cfg.cell_size_m, cfg.target_crs)?;
    net.write(&dir)?;
    log::info!("[run] fishnet: {} cells", net.len());

    let to_metric = Transformer::wgs84_to(cfg.target_crs)?;
    let od = read_csv(&args.od)?;
    for peak in Peak::ALL {
        let (cleaned, summary) = trips::clean(&od, &cfg, peak, &to_metric, &boundary)?;
        trips::write_cleaned(&cleaned, &dir.od_cleaned(peak))?;
        summary.report();

        let (accum, summary) = segments::aggregate(&net, &cleaned)?;
        segments::write_segments(&accum, &dir.grid_segments(peak))?;
        summary.report();

        let rows = emissions::per_cell_table(&net, &accum, cfg.emission_factor_kg_per_km)?;
        emissions::write_emissions(&rows, &dir.emissions(peak))?;
    }

    // The five feature layers only share the read-only fishnet; run them
    // concurrently and fail on the first error.
    let net_ref = &net;
    let cfg_ref = &cfg;
    let dir_ref = &dir;
    let tasks: Vec<Box<dyn FnOnce() -> Result<()> + Send + '_>> = vec![
        Box::new(|| {
            let class_table = match &args.classes {
                Some(path) => PoiClassTable::from_path(path)?,
                None => PoiClassTable::embedded()?,
            };
            let transformer = Transformer::wgs84_to(cfg_ref.target_crs)?;
            let (pois, skipped) =
                ingest::read_pois(&args.pois, &args.subclass_field, &transformer)?;
            if skipped > 0 {
                log::warn!("[poi] skipped {skipped} unreadable rows in {}", args.pois.display());
            }
            let (counts, summary) = poi::featurize(net_ref, &pois, &class_table);
            poi::write_features(net_ref, &counts, &dir_ref.poi_features())?;
            summary.report();
            Ok(())
        }),
        Box::new(|| {
            let lines = ingest::read_roads(&args.roads, args.roads_epsg, cfg_ref.target_crs)?;
            let (lengths_m, summary) = roads::featurize(net_ref, &lines);
            roads::write_features(net_ref, &lengths_m, &dir_ref.road_features())?;
            summary.report();
            Ok(())
        }),
        Box::new(|| {
            let transformer = Transformer::wgs84_to(cfg_ref.target_crs)?;
            let mut stops = ingest::read_stops(&args.bus, StopKind::Bus, 0, &transformer)?;
            let metro =
                ingest::read_stops(&args.metro, StopKind::Metro, stops.len() as u32, &transformer)?;
            stops.extend(metro);
            let (features, summary) = transit::featurize(net_ref, &stops)?;
            transit::write_features(net_ref, &features, &dir_ref.transit_features())?;
            summary.report();
            Ok(())
        }),
        Box::new(|| {
            let raster = Raster::from_geotiff(&args.raster)?;
            let to_metric = Transformer::wgs84_to(cfg_ref.target_crs)?;
            let to_geographic = Transformer::new(cfg_ref.target_crs, EPSG_WGS84)?;
            let features = population::featurize(
                net_ref,
                &raster,
                cfg_ref.raster_units,
                &to_metric,
                &to_geographic,
            )?;
            population::write_features(net_ref, &features, &dir_ref.population_features())?;
            Ok(())
        }),
        Box::new(|| {
            let transformer = Transformer::wgs84_to(cfg_ref.target_crs)?;
            let distances = centre::featurize(net_ref, cfg_ref.city_centre_lonlat, &transformer)?;
            centre::write_features(net_ref, &distances, &dir_ref.centre_features())?;
            Ok(())
        }),
    ];
    tasks.into_par_iter().map(|task| task()).collect::<Result<Vec<()>>>()?;

    for peak in Peak::ALL {
        table::build_tables(&net, &dir, &cfg, peak)?;
    }
    log::info!("[run] pipeline complete under {}", dir.root().display());
    Ok(())
}
