//! Per-cell carbon-reduction aggregation.
//!
//! Consumes the segment aggregate, zero-fills over the full cell set and
//! applies the emission factor. Every cell in the fishnet appears exactly
//! once in the output; missing aggregates are zero, not null. Rounding
//! happens only at presentation time.

use std::path::Path;

use anyhow::{Result, ensure};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};

use crate::common::csv::{f64_column, read_csv, u32_column, write_csv};
use crate::fishnet::Fishnet;
use crate::segments::GridAccum;

/// One output row of the emission table.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionRow {
    pub grid_id: u32,
    pub segment_count: u64,
    pub total_length_m: f64,
    pub total_length_km: f64,
    pub carbon_reduction_kg: f64,
}

/// Build the per-cell emission table in ascending grid id, zero-filled.
pub fn per_cell_table(net: &Fishnet, accum: &GridAccum, ef_kg_per_km: f64) -> Result<Vec<EmissionRow>> {
    ensure!(
        accum.counts.len() == net.len(),
        "[emissions] Aggregate covers {} cells, fishnet has {}",
        accum.counts.len(),
        net.len()
    );
    let rows = net
        .ids()
        .map(|id| {
            let i = (id - 1) as usize;
            let total_length_m = accum.lengths_m[i];
            let total_length_km = total_length_m / 1000.0;
            EmissionRow {
                grid_id: id,
                segment_count: accum.counts[i],
                total_length_m,
                total_length_km,
                carbon_reduction_kg: total_length_km * ef_kg_per_km,
            }
        })
        .collect();
    Ok(rows)
}

pub fn to_frame(rows: &[EmissionRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new("grid_id".into(), rows.iter().map(|r| r.grid_id).collect::<Vec<_>>()).into(),
        Series::new("segment_count".into(), rows.iter().map(|r| r.segment_count).collect::<Vec<_>>()).into(),
        Series::new("total_length_m".into(), rows.iter().map(|r| r.total_length_m).collect::<Vec<_>>()).into(),
        Series::new("total_length_km".into(), rows.iter().map(|r| r.total_length_km).collect::<Vec<_>>()).into(),
        Series::new("carbon_reduction_kg".into(), rows.iter().map(|r| r.carbon_reduction_kg).collect::<Vec<_>>()).into(),
    ])?;
    Ok(df)
}

/// Write the emission artifact.
pub fn write_emissions(rows: &[EmissionRow], path: &Path) -> Result<()> {
    write_csv(&to_frame(rows)?, path)
}

/// Read an emission artifact back, checking full grid coverage against the
/// fishnet (a drifted cell set is fatal).
pub fn read_emissions(net: &Fishnet, path: &Path) -> Result<Vec<EmissionRow>> {
    let df = read_csv(path)?;
    ensure!(
        df.height() == net.len(),
        "[emissions] Artifact {} has {} rows, fishnet has {} cells; rebuild from the fishnet stage",
        path.display(),
        df.height(),
        net.len()
    );
    let ids = u32_column(&df, "grid_id")?;
    let counts = u32_column(&df, "segment_count")?;
    let lengths_m = f64_column(&df, "total_length_m")?;
    let lengths_km = f64_column(&df, "total_length_km")?;
    let carbon = f64_column(&df, "carbon_reduction_kg")?;

    (0..df.height())
        .map(|i| {
            let id = ids[i];
            ensure!(
                net.cell(id).is_some(),
                "[emissions] grid_id {id} in {} is not in the fishnet",
                path.display()
            );
            Ok(EmissionRow {
                grid_id: id,
                segment_count: counts[i] as u64,
                total_length_m: lengths_m[i].unwrap_or(0.0),
                total_length_km: lengths_km[i].unwrap_or(0.0),
                carbon_reduction_kg: carbon[i].unwrap_or(0.0),
            })
        })
        .collect()
}
