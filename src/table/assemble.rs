//! Final table assembly.
//!
//! Joins the per-component artifacts on `grid_id`, then walks each row
//! through the linear `joined → imputed → winsorized → standardized`
//! pipeline and writes one raw and one standardized table per peak, plus
//! the sidecar of standardization parameters.

use anyhow::{Context, Result, ensure};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use std::collections::BTreeMap;
use std::path::Path;

use crate::common::{
    csv::{f64_column, read_csv, u32_column, write_csv_bom},
    fs::atomic_write,
    paths::DataDir,
};
use crate::config::{Peak, PipelineConfig};
use crate::fishnet::Fishnet;

use super::post::{StandardizationSidecar, impute_mean, standardize, winsorize};
use super::schema::{FINAL_COLUMNS, GRID_ID, TARGET};

/// Spread one artifact column over the full cell set by grid id. Absent
/// cells stay null (outer-join semantics); an id the fishnet does not know
/// means the artifact was built against a different cell set and is fatal.
fn column_by_grid(
    net: &Fishnet,
    df: &DataFrame,
    source: &Path,
    name: &str,
) -> Result<Vec<Option<f64>>> {
    let ids = u32_column(df, GRID_ID)
        .with_context(|| format!("[table] Bad grid_id column in {}", source.display()))?;
    let values = f64_column(df, name)
        .with_context(|| format!("[table] Bad column {name} in {}", source.display()))?;

    let mut out = vec![None; net.len()];
    for (id, value) in ids.into_iter().zip(values) {
        ensure!(
            net.cell(id).is_some(),
            "[table] grid_id {id} in {} is not in the fishnet; rebuild from the fishnet stage",
            source.display()
        );
        out[(id - 1) as usize] = value;
    }
    Ok(out)
}

/// Outer-join every upstream artifact into the final column order.
pub fn join(net: &Fishnet, dir: &DataDir, peak: Peak) -> Result<Vec<(String, Vec<Option<f64>>)>> {
    let read = |path: &Path| -> Result<DataFrame> {
        read_csv(path).with_context(|| {
            format!("[table] Missing artifact (run the upstream stage first): {}", path.display())
        })
    };

    let emissions_path = dir.emissions(peak);
    let emissions = read(&emissions_path)?;
    let poi_path = dir.poi_features();
    let poi = read(&poi_path)?;
    let road_path = dir.road_features();
    let road = read(&road_path)?;
    let transit_path = dir.transit_features();
    let transit = read(&transit_path)?;
    let population_path = dir.population_features();
    let population = read(&population_path)?;
    let centre_path = dir.centre_features();
    let centre = read(&centre_path)?;

    let nearest_bus_km: Vec<Option<f64>> =
        column_by_grid(net, &transit, &transit_path, "nearest_bus_distance_m")?
            .into_iter()
            .map(|v| v.map(|m| m / 1000.0))
            .collect();

    let mut columns = Vec::with_capacity(FINAL_COLUMNS.len());
    for name in FINAL_COLUMNS {
        let values = match name {
            "carbon_reduction_kg" => column_by_grid(net, &emissions, &emissions_path, name)?,
            "population_density_kpersons_per_km2" => {
                column_by_grid(net, &population, &population_path, name)?
            }
            "road_density_km_per_km2" => column_by_grid(net, &road, &road_path, name)?,
            "metro_count" | "bus_count" => column_by_grid(net, &transit, &transit_path, name)?,
            "distance_to_centre_km" => column_by_grid(net, &centre, &centre_path, name)?,
            "nearest_bus_distance_km" => nearest_bus_km.clone(),
            // POI counts and entropy.
            _ => column_by_grid(net, &poi, &poi_path, name)?,
        };
        columns.push((name.to_string(), values));
    }
    Ok(columns)
}

fn to_frame(net: &Fishnet, columns: &[(String, Vec<f64>)]) -> Result<DataFrame> {
    let ids: Vec<u32> = net.ids().collect();
    let mut series: Vec<polars::prelude::Column> =
        vec![Series::new(GRID_ID.into(), ids).into()];
    for (name, values) in columns {
        series.push(Series::new(name.as_str().into(), values.clone()).into());
    }
    Ok(DataFrame::new(series)?)
}

/// Assemble and write both tables and the sidecar for one peak window.
pub fn build_tables(
    net: &Fishnet,
    dir: &DataDir,
    cfg: &PipelineConfig,
    peak: Peak,
) -> Result<()> {
    let joined = join(net, dir, peak)?;

    let mut dense: Vec<(String, Vec<f64>)> = Vec::with_capacity(joined.len());
    for (name, values) in &joined {
        let (column, filled) = impute_mean(values);
        if filled > 0 {
            log::warn!("[table] {peak}: imputed {filled} missing values in {name}");
        }
        dense.push((name.clone(), column));
    }

    // The target keeps its physical scale until standardization.
    for (name, values) in &mut dense {
        if name != TARGET {
            winsorize(values, cfg.winsorize_low, cfg.winsorize_high);
        }
    }
    write_csv_bom(&to_frame(net, &dense)?, &dir.final_table(peak))?;

    let mut scales = BTreeMap::new();
    let standardized: Vec<(String, Vec<f64>)> = dense
        .iter()
        .map(|(name, values)| {
            let (z, scale) = standardize(values);
            scales.insert(name.clone(), scale);
            (name.clone(), z)
        })
        .collect();
    write_csv_bom(&to_frame(net, &standardized)?, &dir.final_table_standardized(peak))?;

    let sidecar = StandardizationSidecar {
        peak,
        winsorize_low: cfg.winsorize_low,
        winsorize_high: cfg.winsorize_high,
        columns: scales,
    };
    let bytes = serde_json::to_vec_pretty(&sidecar)
        .context("[table] Failed to serialize standardization sidecar")?;
    atomic_write(&dir.standardization_sidecar(peak), &bytes)?;

    log::info!(
        "[table] {peak}: wrote {} rows x {} columns",
        net.len(),
        FINAL_COLUMNS.len() + 1
    );
    Ok(())
}
