//! Distance from each cell centroid to the configured city centre.

use std::path::Path;

use anyhow::{Result, ensure};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};

use crate::common::{crs::Transformer, csv::write_csv};
use crate::fishnet::Fishnet;

/// Euclidean centroid-to-centre distance per cell, km. The centre arrives
/// as WGS84 lon/lat and is projected once.
pub fn featurize(
    net: &Fishnet,
    centre_lonlat: (f64, f64),
    to_metric: &Transformer,
) -> Result<Vec<f64>> {
    let (cx, cy) = to_metric.apply(centre_lonlat.0, centre_lonlat.1)?;
    let size = net.cell_size_m();
    Ok(net
        .cells()
        .iter()
        .map(|cell| {
            let c = cell.centroid(size);
            ((c.x() - cx).powi(2) + (c.y() - cy).powi(2)).sqrt() / 1000.0
        })
        .collect())
}

pub fn to_frame(net: &Fishnet, distances_km: &[f64]) -> Result<DataFrame> {
    ensure!(
        distances_km.len() == net.len(),
        "[features::centre] Distances cover {} cells, fishnet has {}",
        distances_km.len(),
        net.len()
    );
    let ids: Vec<u32> = net.ids().collect();
    let df = DataFrame::new(vec![
        Series::new("grid_id".into(), ids).into(),
        Series::new("distance_to_centre_km".into(), distances_km.to_vec()).into(),
    ])?;
    Ok(df)
}

pub fn write_features(net: &Fishnet, distances_km: &[f64], path: &Path) -> Result<()> {
    write_csv(&to_frame(net, distances_km)?, path)
}
